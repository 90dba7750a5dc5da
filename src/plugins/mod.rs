//! Pluggable planning, control and recovery capabilities.
//!
//! The coordinator is polymorphic over three small trait surfaces:
//! - [`GlobalPlanner`]: polyline path from start to goal over a cost grid
//! - [`LocalController`]: plan + current state in, velocity command out
//! - [`RecoveryBehavior`]: bounded world-mutating action on failure
//!
//! Concrete implementations are selected at runtime by name through a
//! [`PluginRegistry`], so configuration files can swap them without code
//! changes.

mod clear_costmap;
mod rotate;

pub use clear_costmap::ClearCostmapRecovery;
pub use rotate::RotateRecovery;

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::config::NavConfig;
use crate::costmap::{CostGrid, CostmapHandle};
use crate::error::{NavError, Result};
use crate::geometry::{Plan, Pose, Velocity};
use crate::transform::TransformBuffer;

/// Computes a global plan over a cost grid.
pub trait GlobalPlanner: Send {
    /// Plan from `start` to `goal` over the locked grid.
    ///
    /// A valid plan is nonempty, begins at the robot's current pose and ends
    /// at (the cell nearest to) the goal. The caller holds the costmap mutex
    /// for the duration of the call.
    fn make_plan(&mut self, grid: &CostGrid, start: &Pose, goal: &Pose) -> Result<Plan>;
}

/// Converts a plan and the current state into velocity commands.
pub trait LocalController: Send {
    /// Install a new plan to track. Returns false when the plan cannot be
    /// accepted.
    fn set_plan(&mut self, plan: &Plan) -> bool;

    /// Compute the next velocity command. The caller holds the controller
    /// costmap mutex for the duration of the call.
    fn compute_velocity(&mut self, grid: &CostGrid, pose: &Pose) -> Result<Velocity>;

    /// Whether the end of the installed plan has been reached.
    fn is_goal_reached(&mut self) -> bool;
}

/// A bounded action invoked on failure to improve the next attempt's odds.
pub trait RecoveryBehavior: Send {
    fn name(&self) -> &str;

    /// Run the behavior to completion. Implementations must bound their own
    /// wall-clock duration.
    fn run(&mut self);
}

/// Everything a plugin factory may need to wire an instance.
#[derive(Clone)]
pub struct PluginContext {
    pub planner_costmap: CostmapHandle,
    pub controller_costmap: CostmapHandle,
    pub tf: Arc<dyn TransformBuffer>,
    /// Velocity command stream, for behaviors that move the base.
    pub velocity: Sender<Velocity>,
    pub config: NavConfig,
}

type GlobalPlannerFactory = Box<dyn Fn(&PluginContext) -> Box<dyn GlobalPlanner> + Send + Sync>;
type LocalControllerFactory = Box<dyn Fn(&PluginContext) -> Box<dyn LocalController> + Send + Sync>;
type RecoveryFactory = Box<dyn Fn(&str, &PluginContext) -> Box<dyn RecoveryBehavior> + Send + Sync>;

/// Runtime plugin selection by name.
pub struct PluginRegistry {
    global_planners: HashMap<String, GlobalPlannerFactory>,
    local_controllers: HashMap<String, LocalControllerFactory>,
    recoveries: HashMap<String, RecoveryFactory>,
}

impl PluginRegistry {
    /// Registry with the built-in recovery behavior types
    /// (`clear_costmap`, `rotate`) and no planners or controllers.
    pub fn new() -> Self {
        let mut registry = Self {
            global_planners: HashMap::new(),
            local_controllers: HashMap::new(),
            recoveries: HashMap::new(),
        };

        registry.register_recovery("clear_costmap", |name, ctx| {
            // the aggressive variant clears everything but the footprint
            let reset_distance = if name.contains("aggressive") {
                ctx.config.circumscribed_radius * 4.0
            } else {
                ctx.config.conservative_reset_dist
            };
            Box::new(ClearCostmapRecovery::new(
                name,
                reset_distance,
                vec![ctx.planner_costmap.clone(), ctx.controller_costmap.clone()],
            ))
        });

        registry.register_recovery("rotate", |name, ctx| {
            Box::new(RotateRecovery::new(
                name,
                ctx.tf.clone(),
                ctx.controller_costmap.global_frame(),
                ctx.velocity.clone(),
            ))
        });

        registry
    }

    pub fn register_global_planner<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&PluginContext) -> Box<dyn GlobalPlanner> + Send + Sync + 'static,
    {
        self.global_planners
            .insert(name.to_string(), Box::new(factory));
    }

    pub fn register_local_controller<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&PluginContext) -> Box<dyn LocalController> + Send + Sync + 'static,
    {
        self.local_controllers
            .insert(name.to_string(), Box::new(factory));
    }

    /// Register a recovery behavior type. The factory receives the instance
    /// name from the configuration, so one type can parameterize itself per
    /// entry.
    pub fn register_recovery<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&str, &PluginContext) -> Box<dyn RecoveryBehavior> + Send + Sync + 'static,
    {
        self.recoveries.insert(kind.to_string(), Box::new(factory));
    }

    pub fn global_planner(&self, name: &str, ctx: &PluginContext) -> Result<Box<dyn GlobalPlanner>> {
        self.global_planners
            .get(name)
            .map(|f| f(ctx))
            .ok_or_else(|| NavError::UnknownPlugin(format!("global planner '{}'", name)))
    }

    pub fn local_controller(
        &self,
        name: &str,
        ctx: &PluginContext,
    ) -> Result<Box<dyn LocalController>> {
        self.local_controllers
            .get(name)
            .map(|f| f(ctx))
            .ok_or_else(|| NavError::UnknownPlugin(format!("local controller '{}'", name)))
    }

    pub fn recovery(
        &self,
        kind: &str,
        name: &str,
        ctx: &PluginContext,
    ) -> Result<Box<dyn RecoveryBehavior>> {
        self.recoveries
            .get(kind)
            .map(|f| f(name, ctx))
            .ok_or_else(|| NavError::UnknownPlugin(format!("recovery behavior '{}'", kind)))
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costmap::CostGrid;
    use crate::transform::StaticTransform;
    use std::time::Duration;

    struct NullPlanner;

    impl GlobalPlanner for NullPlanner {
        fn make_plan(&mut self, _grid: &CostGrid, _start: &Pose, _goal: &Pose) -> Result<Plan> {
            Err(NavError::NoPlan)
        }
    }

    fn test_context() -> PluginContext {
        let tf: Arc<dyn TransformBuffer> =
            Arc::new(StaticTransform::localized_at(Pose::new("map", 0.0, 0.0)));
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
            config: NavConfig::default(),
        }
    }

    #[test]
    fn test_resolve_registered_planner() {
        let mut registry = PluginRegistry::new();
        registry.register_global_planner("null", |_ctx| Box::new(NullPlanner));

        let ctx = test_context();
        assert!(registry.global_planner("null", &ctx).is_ok());
        assert!(matches!(
            registry.global_planner("missing", &ctx),
            Err(NavError::UnknownPlugin(_))
        ));
    }

    #[test]
    fn test_builtin_recovery_kinds_available() {
        let registry = PluginRegistry::new();
        let ctx = test_context();

        let clear = registry
            .recovery("clear_costmap", "conservative_reset", &ctx)
            .unwrap();
        assert_eq!(clear.name(), "conservative_reset");

        let rotate = registry.recovery("rotate", "rotate_recovery", &ctx).unwrap();
        assert_eq!(rotate.name(), "rotate_recovery");

        assert!(registry.recovery("warp", "warp_drive", &ctx).is_err());
    }
}
