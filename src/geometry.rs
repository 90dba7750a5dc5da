//! Pose, orientation and velocity types shared across the coordinator.

use std::time::Instant;

/// Unit quaternion orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Pure yaw rotation about the z axis.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw / 2.0;
        Self {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }

    #[inline]
    pub fn norm_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    pub fn normalized(&self) -> Quaternion {
        let n = self.norm_squared().sqrt();
        Quaternion {
            x: self.x / n,
            y: self.y / n,
            z: self.z / n,
            w: self.w / n,
        }
    }

    /// Yaw angle of the rotation, in radians.
    pub fn yaw(&self) -> f64 {
        let siny = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny.atan2(cosy)
    }

    /// Whether this orientation is acceptable as a navigation goal.
    ///
    /// The quaternion must be finite, have a squared norm of at least 1e-6,
    /// and keep the robot upright: after normalization the rotated z axis
    /// has to stay within 1e-3 (in dot product) of vertical.
    pub fn is_valid_goal(&self) -> bool {
        if !self.x.is_finite() || !self.y.is_finite() || !self.z.is_finite() || !self.w.is_finite()
        {
            tracing::error!("quaternion has NaNs or infs, discarding as a navigation goal");
            return false;
        }

        if self.norm_squared() < 1e-6 {
            tracing::error!("quaternion has length close to zero, discarding as navigation goal");
            return false;
        }

        let q = self.normalized();
        // z component of the rotated z axis: R(q) * (0,0,1) dotted with (0,0,1)
        let dot = 1.0 - 2.0 * (q.x * q.x + q.y * q.y);

        if (dot - 1.0).abs() > 1e-3 {
            tracing::error!("quaternion is invalid, its z-axis must be close to vertical");
            return false;
        }

        true
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A stamped pose in a named frame.
#[derive(Clone, Debug)]
pub struct Pose {
    pub frame_id: String,
    /// Observation time, when known. `None` means "latest available".
    pub stamp: Option<Instant>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub orientation: Quaternion,
}

impl Pose {
    /// Pose at (x, y) with identity orientation and no stamp.
    pub fn new(frame_id: &str, x: f64, y: f64) -> Self {
        Self {
            frame_id: frame_id.to_string(),
            stamp: None,
            x,
            y,
            z: 0.0,
            orientation: Quaternion::IDENTITY,
        }
    }

    pub fn with_yaw(mut self, yaw: f64) -> Self {
        self.orientation = Quaternion::from_yaw(yaw);
        self
    }

    pub fn with_orientation(mut self, orientation: Quaternion) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn stamped(mut self, at: Instant) -> Self {
        self.stamp = Some(at);
        self
    }

    /// Planar straight-line distance to another pose.
    #[inline]
    pub fn distance(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// An ordered sequence of poses from the robot to a goal, all in one frame.
/// Valid iff nonempty.
pub type Plan = Vec<Pose>;

/// Body-frame velocity command.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    /// Linear velocity along the base x axis (m/s)
    pub linear_x: f64,
    /// Linear velocity along the base y axis (m/s)
    pub linear_y: f64,
    /// Angular velocity about the base z axis (rad/s)
    pub angular_z: f64,
}

impl Velocity {
    pub const ZERO: Velocity = Velocity {
        linear_x: 0.0,
        linear_y: 0.0,
        angular_z: 0.0,
    };

    pub fn new(linear_x: f64, linear_y: f64, angular_z: f64) -> Self {
        Self {
            linear_x,
            linear_y,
            angular_z,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.linear_x == 0.0 && self.linear_y == 0.0 && self.angular_z == 0.0
    }
}
