//! Ordered recovery behavior chain.

use crate::config::NavConfig;
use crate::error::Result;
use crate::geometry::Pose;
use crate::nav::signals::{NavSignals, RecoveryStatus};
use crate::plugins::{PluginContext, PluginRegistry, RecoveryBehavior};

/// The recovery behaviors for one failure episode, run in order.
///
/// The index only moves forward within an episode; the control loop resets
/// it when planning, control, or displacement succeeds again.
pub struct RecoveryChain {
    behaviors: Vec<Box<dyn RecoveryBehavior>>,
    index: usize,
    enabled: bool,
}

impl RecoveryChain {
    pub fn new(behaviors: Vec<Box<dyn RecoveryBehavior>>, enabled: bool) -> Self {
        Self {
            behaviors,
            index: 0,
            enabled,
        }
    }

    /// Build the chain from the configured behavior list.
    ///
    /// A list with duplicate names or an unknown behavior type falls back to
    /// the default chain: conservative costmap clear, in-place rotation,
    /// aggressive costmap clear, in-place rotation (rotations only when
    /// allowed).
    pub(crate) fn from_config(
        config: &NavConfig,
        registry: &PluginRegistry,
        ctx: &PluginContext,
    ) -> Self {
        if !config.recovery_behaviors.is_empty() {
            match Self::from_specs(config, registry, ctx) {
                Ok(chain) => return chain,
                Err(e) => {
                    tracing::error!("invalid recovery behavior list ({}), using defaults", e);
                }
            }
        }
        Self::defaults(config, registry, ctx)
    }

    fn from_specs(
        config: &NavConfig,
        registry: &PluginRegistry,
        ctx: &PluginContext,
    ) -> Result<Self> {
        for (i, spec) in config.recovery_behaviors.iter().enumerate() {
            for other in &config.recovery_behaviors[i + 1..] {
                if spec.name == other.name {
                    return Err(crate::error::NavError::Config(format!(
                        "a recovery behavior named '{}' already exists",
                        spec.name
                    )));
                }
            }
        }

        let mut behaviors = Vec::with_capacity(config.recovery_behaviors.len());
        for spec in &config.recovery_behaviors {
            behaviors.push(registry.recovery(&spec.kind, &spec.name, ctx)?);
        }
        Ok(Self::new(behaviors, config.recovery_behavior_enabled))
    }

    fn defaults(config: &NavConfig, registry: &PluginRegistry, ctx: &PluginContext) -> Self {
        let mut behaviors: Vec<Box<dyn RecoveryBehavior>> = Vec::new();

        // built-in kinds are always registered, so these cannot fail
        if let Ok(clear) = registry.recovery("clear_costmap", "conservative_reset", ctx) {
            behaviors.push(clear);
        }
        if config.clearing_rotation_allowed
            && let Ok(rotate) = registry.recovery("rotate", "rotate_recovery", ctx)
        {
            behaviors.push(rotate);
        }
        if let Ok(clear) = registry.recovery("clear_costmap", "aggressive_reset", ctx) {
            behaviors.push(clear);
        }
        if config.clearing_rotation_allowed
            && let Ok(rotate) = registry.recovery("rotate", "rotate_recovery", ctx)
        {
            behaviors.push(rotate);
        }

        Self::new(behaviors, config.recovery_behavior_enabled)
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Run the behavior at the current index, publish its status record,
    /// and advance. Returns false when disabled or exhausted.
    pub(crate) fn advance_and_run(&mut self, pose: &Pose, signals: &NavSignals) -> bool {
        if !self.enabled || self.index >= self.behaviors.len() {
            return false;
        }

        let total = self.behaviors.len();
        let behavior = &mut self.behaviors[self.index];
        tracing::debug!(
            "executing recovery behavior {} of {}: {}",
            self.index + 1,
            total,
            behavior.name()
        );

        signals.publish_recovery(RecoveryStatus {
            pose: pose.clone(),
            index: self.index,
            total,
            name: behavior.name().to_string(),
        });

        behavior.run();
        self.index += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecoverySpec;
    use crate::costmap::{CostGrid, CostmapHandle};
    use crate::transform::{StaticTransform, TransformBuffer};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingBehavior {
        name: String,
        runs: Arc<AtomicUsize>,
    }

    impl RecoveryBehavior for CountingBehavior {
        fn name(&self) -> &str {
            &self.name
        }

        fn run(&mut self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_context(config: &NavConfig) -> PluginContext {
        let tf: Arc<dyn TransformBuffer> = Arc::new(StaticTransform::localized_at(Pose::new(
            "map", 0.0, 0.0,
        )));
        let grid = CostGrid::new(10, 10, 0.1, 0.0, 0.0);
        let (velocity, _rx) = crossbeam_channel::unbounded();
        PluginContext {
            planner_costmap: CostmapHandle::new(
                "global_costmap",
                "map",
                grid.clone(),
                tf.clone(),
                Duration::from_secs(1),
            ),
            controller_costmap: CostmapHandle::new(
                "local_costmap",
                "map",
                grid,
                tf.clone(),
                Duration::from_secs(1),
            ),
            tf,
            velocity,
            config: config.clone(),
        }
    }

    #[test]
    fn test_chain_advances_and_exhausts() {
        let runs = Arc::new(AtomicUsize::new(0));
        let behaviors: Vec<Box<dyn RecoveryBehavior>> = vec![
            Box::new(CountingBehavior {
                name: "first".into(),
                runs: runs.clone(),
            }),
            Box::new(CountingBehavior {
                name: "second".into(),
                runs: runs.clone(),
            }),
        ];
        let mut chain = RecoveryChain::new(behaviors, true);
        let (signals, monitors) = crate::nav::signals::channels();
        let pose = Pose::new("map", 0.0, 0.0);

        assert!(chain.advance_and_run(&pose, &signals));
        assert!(chain.advance_and_run(&pose, &signals));
        assert!(!chain.advance_and_run(&pose, &signals));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(chain.index(), 2);

        chain.reset();
        assert_eq!(chain.index(), 0);
        assert!(chain.advance_and_run(&pose, &signals));

        let statuses: Vec<_> = monitors.recovery.try_iter().collect();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].name, "first");
        assert_eq!(statuses[0].index, 0);
        assert_eq!(statuses[0].total, 2);
        assert_eq!(statuses[1].name, "second");
        assert_eq!(statuses[2].index, 0);
    }

    #[test]
    fn test_disabled_chain_never_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let behaviors: Vec<Box<dyn RecoveryBehavior>> = vec![Box::new(CountingBehavior {
            name: "only".into(),
            runs: runs.clone(),
        })];
        let mut chain = RecoveryChain::new(behaviors, false);
        let (signals, _monitors) = crate::nav::signals::channels();

        assert!(!chain.advance_and_run(&Pose::new("map", 0.0, 0.0), &signals));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_chain_shape() {
        let config = NavConfig::default();
        let registry = PluginRegistry::new();
        let ctx = test_context(&config);

        let chain = RecoveryChain::from_config(&config, &registry, &ctx);
        assert_eq!(chain.len(), 4);

        let no_rotation = NavConfig {
            clearing_rotation_allowed: false,
            ..Default::default()
        };
        let chain = RecoveryChain::from_config(&no_rotation, &registry, &test_context(&no_rotation));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_duplicate_names_fall_back_to_defaults() {
        let config = NavConfig {
            recovery_behaviors: vec![
                RecoverySpec {
                    name: "twin".into(),
                    kind: "clear_costmap".into(),
                },
                RecoverySpec {
                    name: "twin".into(),
                    kind: "rotate".into(),
                },
            ],
            ..Default::default()
        };
        let registry = PluginRegistry::new();
        let ctx = test_context(&config);

        let chain = RecoveryChain::from_config(&config, &registry, &ctx);
        // fell back to the 4-entry default chain
        assert_eq!(chain.len(), 4);
    }

    #[test]
    fn test_configured_chain_resolves_by_kind() {
        let config = NavConfig {
            recovery_behaviors: vec![RecoverySpec {
                name: "only_clear".into(),
                kind: "clear_costmap".into(),
            }],
            ..Default::default()
        };
        let registry = PluginRegistry::new();
        let ctx = test_context(&config);

        let chain = RecoveryChain::from_config(&config, &registry, &ctx);
        assert_eq!(chain.len(), 1);
    }
}
