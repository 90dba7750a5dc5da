//! Costmap-clearing recovery behavior.

use crate::costmap::CostmapHandle;
use crate::plugins::RecoveryBehavior;

/// Reverts costmap cells outside a window around the robot to the static
/// layer, wiping obstacles that sensor noise or stale readings left behind.
///
/// A large `reset_distance` is conservative (only far-away obstacles go);
/// a small one is aggressive and clears almost everything the robot is not
/// standing next to.
pub struct ClearCostmapRecovery {
    name: String,
    reset_distance: f64,
    costmaps: Vec<CostmapHandle>,
}

impl ClearCostmapRecovery {
    pub fn new(name: &str, reset_distance: f64, costmaps: Vec<CostmapHandle>) -> Self {
        Self {
            name: name.to_string(),
            reset_distance,
            costmaps,
        }
    }
}

impl RecoveryBehavior for ClearCostmapRecovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) {
        tracing::info!(
            "{}: clearing costmaps outside a {:.2}m window",
            self.name,
            self.reset_distance
        );

        for costmap in &self.costmaps {
            let pose = match costmap.robot_pose() {
                Ok(pose) => pose,
                Err(e) => {
                    tracing::warn!(
                        "{}: cannot clear {}, robot pose unavailable: {}",
                        self.name,
                        costmap.name(),
                        e
                    );
                    continue;
                }
            };

            costmap
                .lock()
                .revert_outside_window(pose.x, pose.y, self.reset_distance);
        }
    }
}
