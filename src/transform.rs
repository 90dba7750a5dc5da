//! Frame transform seam.
//!
//! The coordinator never owns localization. It asks a [`TransformBuffer`]
//! for the robot pose and for goal re-expression, and treats a missing or
//! stale answer as a reason to stop, not to guess.

use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{NavError, Result};
use crate::geometry::Pose;

/// Access to the robot's frame tree.
///
/// Production wires this to the transform stack of the robot; tests and
/// single-frame deployments use [`StaticTransform`].
pub trait TransformBuffer: Send + Sync {
    /// Pose of the robot base expressed in `target_frame`, stamped with the
    /// time it was observed.
    fn robot_pose(&self, target_frame: &str) -> Result<Pose>;

    /// Re-express `pose` in `target_frame`.
    fn transform(&self, pose: &Pose, target_frame: &str) -> Result<Pose>;
}

/// Transform buffer for setups where every frame is coincident.
///
/// Holds one robot pose that external code (odometry, a simulator, a test)
/// updates with [`StaticTransform::set_robot_pose`]. Transforms only relabel
/// the frame id.
pub struct StaticTransform {
    robot: Mutex<Option<Pose>>,
}

impl StaticTransform {
    pub fn new() -> Self {
        Self {
            robot: Mutex::new(None),
        }
    }

    /// Starts out already localized at `pose`.
    pub fn localized_at(pose: Pose) -> Self {
        Self {
            robot: Mutex::new(Some(pose.stamped(Instant::now()))),
        }
    }

    /// Update the robot pose, stamping it with the current time.
    pub fn set_robot_pose(&self, pose: Pose) {
        *self.robot.lock() = Some(pose.stamped(Instant::now()));
    }

    /// Displace the robot pose in the world plane.
    pub fn nudge_robot(&self, dx: f64, dy: f64) {
        let mut guard = self.robot.lock();
        if let Some(pose) = guard.as_mut() {
            pose.x += dx;
            pose.y += dy;
            pose.stamp = Some(Instant::now());
        }
    }
}

impl Default for StaticTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformBuffer for StaticTransform {
    fn robot_pose(&self, target_frame: &str) -> Result<Pose> {
        let guard = self.robot.lock();
        match guard.as_ref() {
            Some(pose) => {
                let mut pose = pose.clone();
                pose.frame_id = target_frame.to_string();
                Ok(pose)
            }
            None => Err(NavError::TransformUnavailable(format!(
                "no robot pose known in frame {}",
                target_frame
            ))),
        }
    }

    fn transform(&self, pose: &Pose, target_frame: &str) -> Result<Pose> {
        let mut out = pose.clone();
        out.frame_id = target_frame.to_string();
        Ok(out)
    }
}
