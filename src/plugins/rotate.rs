//! In-place rotation recovery behavior.

use std::f64::consts::TAU;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::geometry::Velocity;
use crate::plugins::RecoveryBehavior;
use crate::transform::TransformBuffer;
use crate::utils::normalize_angle;

/// Rotates the base one full revolution in place so the sensors re-observe
/// the surroundings.
///
/// Progress is measured from the transform buffer by integrating yaw
/// deltas. The run is bounded by a hard deadline of twice the commanded
/// rotation time, so a base that cannot turn (or a simulation without
/// physics) does not hang the recovery chain.
pub struct RotateRecovery {
    name: String,
    tf: Arc<dyn TransformBuffer>,
    frame: String,
    velocity: Sender<Velocity>,
    angular_speed: f64,
    frequency: f64,
}

impl RotateRecovery {
    pub fn new(
        name: &str,
        tf: Arc<dyn TransformBuffer>,
        frame: &str,
        velocity: Sender<Velocity>,
    ) -> Self {
        Self {
            name: name.to_string(),
            tf,
            frame: frame.to_string(),
            velocity,
            angular_speed: 1.0,
            frequency: 20.0,
        }
    }

    pub fn with_angular_speed(mut self, angular_speed: f64) -> Self {
        self.angular_speed = angular_speed;
        self
    }
}

impl RecoveryBehavior for RotateRecovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) {
        let mut last_yaw = match self.tf.robot_pose(&self.frame) {
            Ok(pose) => pose.orientation.yaw(),
            Err(e) => {
                tracing::warn!("{}: cannot rotate, robot pose unavailable: {}", self.name, e);
                return;
            }
        };

        tracing::info!("{}: rotating one revolution in place", self.name);

        let tick = Duration::from_secs_f64(1.0 / self.frequency);
        let deadline = Instant::now() + Duration::from_secs_f64(2.0 * TAU / self.angular_speed);
        let mut turned = 0.0;

        while turned < TAU {
            if Instant::now() > deadline {
                tracing::warn!(
                    "{}: rotation incomplete after deadline ({:.1} deg turned)",
                    self.name,
                    turned.to_degrees()
                );
                break;
            }

            let _ = self
                .velocity
                .send(Velocity::new(0.0, 0.0, self.angular_speed));

            thread::sleep(tick);

            if let Ok(pose) = self.tf.robot_pose(&self.frame) {
                let yaw = pose.orientation.yaw();
                turned += normalize_angle(yaw - last_yaw).abs();
                last_yaw = yaw;
            }
        }

        let _ = self.velocity.send(Velocity::ZERO);
    }
}
