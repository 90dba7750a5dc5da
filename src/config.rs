//! Configuration loading for YatraNav

use crate::error::{NavError, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure.
///
/// Frequencies are in Hz, patience and timeout values in seconds,
/// distances in meters.
#[derive(Clone, Debug, Deserialize)]
pub struct NavConfig {
    /// Global planning rate in Hz. 0 plans once per accepted goal and
    /// whenever the control loop re-requests a plan.
    #[serde(default = "default_planner_frequency")]
    pub planner_frequency: f64,

    /// Control loop rate in Hz
    #[serde(default = "default_controller_frequency")]
    pub controller_frequency: f64,

    /// Seconds without a valid plan before a planning attempt gives up
    #[serde(default = "default_planner_patience")]
    pub planner_patience: f64,

    /// Seconds without a valid velocity before a control attempt gives up
    #[serde(default = "default_controller_patience")]
    pub controller_patience: f64,

    /// Cap on planning attempts per goal; negative means unlimited
    #[serde(default = "default_max_planning_retries")]
    pub max_planning_retries: i32,

    /// Seconds confined to a small radius before oscillation failure;
    /// 0 disables the check
    #[serde(default = "default_oscillation_timeout")]
    pub oscillation_timeout: f64,

    /// Meters the robot must move to reset the oscillation timer
    #[serde(default = "default_oscillation_distance")]
    pub oscillation_distance: f64,

    /// Window size used by the conservative costmap-clearing recovery (meters)
    #[serde(default = "default_conservative_reset_dist")]
    pub conservative_reset_dist: f64,

    /// Radius cleared around the robot for out-of-band plan requests (meters)
    #[serde(default = "default_clearing_radius")]
    pub clearing_radius: f64,

    /// Inscribed radius of the robot footprint (meters)
    #[serde(default = "default_inscribed_radius")]
    pub inscribed_radius: f64,

    /// Circumscribed radius of the robot footprint (meters)
    #[serde(default = "default_circumscribed_radius")]
    pub circumscribed_radius: f64,

    /// Master switch for running recovery behaviors at all
    #[serde(default = "default_recovery_behavior_enabled")]
    pub recovery_behavior_enabled: bool,

    /// Whether in-place rotations may be part of the default recovery chain
    #[serde(default = "default_clearing_rotation_allowed")]
    pub clearing_rotation_allowed: bool,

    /// Pause costmap updates while no goal is active
    #[serde(default = "default_shutdown_costmaps")]
    pub shutdown_costmaps: bool,

    /// Clear a window around the robot before an out-of-band plan request
    #[serde(default = "default_make_plan_clear_costmap")]
    pub make_plan_clear_costmap: bool,

    /// Append the original unreachable goal to a fallback plan
    #[serde(default = "default_make_plan_add_unreachable_goal")]
    pub make_plan_add_unreachable_goal: bool,

    /// Maximum age of a robot pose before it counts as stale (seconds)
    #[serde(default = "default_transform_tolerance")]
    pub transform_tolerance: f64,

    /// Registry name of the global planner plugin
    #[serde(default = "default_base_global_planner")]
    pub base_global_planner: String,

    /// Registry name of the local controller plugin
    #[serde(default = "default_base_local_planner")]
    pub base_local_planner: String,

    /// Ordered recovery behavior list; empty falls back to the defaults.
    /// Names must be unique within the list.
    #[serde(default)]
    pub recovery_behaviors: Vec<RecoverySpec>,
}

/// One entry of the configured recovery chain.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RecoverySpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

// Default value functions
fn default_planner_frequency() -> f64 {
    0.0
}
fn default_controller_frequency() -> f64 {
    20.0
}
fn default_planner_patience() -> f64 {
    5.0
}
fn default_controller_patience() -> f64 {
    15.0
}
fn default_max_planning_retries() -> i32 {
    -1
}
fn default_oscillation_timeout() -> f64 {
    0.0
}
fn default_oscillation_distance() -> f64 {
    0.5
}
fn default_conservative_reset_dist() -> f64 {
    3.0
}
fn default_inscribed_radius() -> f64 {
    0.325
}
fn default_circumscribed_radius() -> f64 {
    0.46
}
fn default_clearing_radius() -> f64 {
    default_circumscribed_radius()
}
fn default_recovery_behavior_enabled() -> bool {
    true
}
fn default_clearing_rotation_allowed() -> bool {
    true
}
fn default_shutdown_costmaps() -> bool {
    false
}
fn default_make_plan_clear_costmap() -> bool {
    true
}
fn default_make_plan_add_unreachable_goal() -> bool {
    true
}
fn default_transform_tolerance() -> f64 {
    0.3
}
fn default_base_global_planner() -> String {
    "theta_star".to_string()
}
fn default_base_local_planner() -> String {
    "pure_pursuit".to_string()
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            planner_frequency: default_planner_frequency(),
            controller_frequency: default_controller_frequency(),
            planner_patience: default_planner_patience(),
            controller_patience: default_controller_patience(),
            max_planning_retries: default_max_planning_retries(),
            oscillation_timeout: default_oscillation_timeout(),
            oscillation_distance: default_oscillation_distance(),
            conservative_reset_dist: default_conservative_reset_dist(),
            clearing_radius: default_clearing_radius(),
            inscribed_radius: default_inscribed_radius(),
            circumscribed_radius: default_circumscribed_radius(),
            recovery_behavior_enabled: default_recovery_behavior_enabled(),
            clearing_rotation_allowed: default_clearing_rotation_allowed(),
            shutdown_costmaps: default_shutdown_costmaps(),
            make_plan_clear_costmap: default_make_plan_clear_costmap(),
            make_plan_add_unreachable_goal: default_make_plan_add_unreachable_goal(),
            transform_tolerance: default_transform_tolerance(),
            base_global_planner: default_base_global_planner(),
            base_local_planner: default_base_local_planner(),
            recovery_behaviors: Vec::new(),
        }
    }
}

impl NavConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NavError::Config(format!("failed to read config file: {}", e)))?;
        let config: NavConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the control loop relies on.
    pub fn validate(&self) -> Result<()> {
        if self.controller_frequency <= 0.0 {
            return Err(NavError::Config(
                "controller_frequency must be positive".to_string(),
            ));
        }
        if self.planner_frequency < 0.0 {
            return Err(NavError::Config(
                "planner_frequency must not be negative".to_string(),
            ));
        }
        if self.oscillation_distance <= 0.0 && self.oscillation_timeout > 0.0 {
            return Err(NavError::Config(
                "oscillation_distance must be positive when the oscillation check is on"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
