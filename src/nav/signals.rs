//! Published signal streams.
//!
//! The coordinator talks to the outside world through a set of channels:
//! velocity commands for the base, per-cycle pose feedback, the currently
//! active goal, recovery status records, and per-goal terminal status
//! events. Observers hold the [`NavMonitors`] half; the coordinator and its
//! worker hold cloned senders.

use std::fmt;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::geometry::{Pose, Velocity};

/// Why a goal was aborted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// No valid plan, even after executing all recovery behaviors
    PlanningFailed,
    /// No valid control, even after executing all recovery behaviors
    ControlFailed,
    /// The robot kept oscillating, even after executing all recovery behaviors
    Oscillating,
    /// The local controller rejected the global plan
    PlanHandoffFailed,
    /// The node is shutting down
    Shutdown,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AbortReason::PlanningFailed => "planning failed after recovery",
            AbortReason::ControlFailed => "control failed after recovery",
            AbortReason::Oscillating => "oscillating after recovery",
            AbortReason::PlanHandoffFailed => "failed to pass plan to the controller",
            AbortReason::Shutdown => "node shutting down",
        };
        f.write_str(text)
    }
}

/// Terminal outcome of one executed goal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavOutcome {
    Succeeded,
    Preempted,
    Rejected(String),
    Aborted(AbortReason),
}

/// Lifecycle event of a goal, keyed by the id assigned at intake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GoalStatus {
    Accepted { id: u64 },
    Preempted { id: u64 },
    Succeeded { id: u64 },
    Aborted { id: u64, reason: AbortReason },
    Rejected { id: u64, reason: String },
}

/// One recovery invocation, published before the behavior runs.
#[derive(Clone, Debug)]
pub struct RecoveryStatus {
    /// Robot pose when the behavior was invoked
    pub pose: Pose,
    /// Index of the behavior in the chain
    pub index: usize,
    /// Chain length
    pub total: usize,
    /// Behavior name
    pub name: String,
}

/// Sender half of the published streams.
#[derive(Clone)]
pub struct NavSignals {
    velocity: Sender<Velocity>,
    feedback: Sender<Pose>,
    current_goal: Sender<Pose>,
    recovery: Sender<RecoveryStatus>,
    status: Sender<GoalStatus>,
}

/// Receiver half of the published streams.
pub struct NavMonitors {
    pub velocity: Receiver<Velocity>,
    pub feedback: Receiver<Pose>,
    pub current_goal: Receiver<Pose>,
    pub recovery: Receiver<RecoveryStatus>,
    pub status: Receiver<GoalStatus>,
}

pub(crate) fn channels() -> (NavSignals, NavMonitors) {
    let (velocity_tx, velocity_rx) = unbounded();
    let (feedback_tx, feedback_rx) = unbounded();
    let (goal_tx, goal_rx) = unbounded();
    let (recovery_tx, recovery_rx) = unbounded();
    let (status_tx, status_rx) = unbounded();

    (
        NavSignals {
            velocity: velocity_tx,
            feedback: feedback_tx,
            current_goal: goal_tx,
            recovery: recovery_tx,
            status: status_tx,
        },
        NavMonitors {
            velocity: velocity_rx,
            feedback: feedback_rx,
            current_goal: goal_rx,
            recovery: recovery_rx,
            status: status_rx,
        },
    )
}

impl NavSignals {
    pub(crate) fn publish_velocity(&self, velocity: Velocity) {
        let _ = self.velocity.send(velocity);
    }

    pub(crate) fn publish_zero_velocity(&self) {
        let _ = self.velocity.send(Velocity::ZERO);
    }

    pub(crate) fn publish_feedback(&self, pose: Pose) {
        let _ = self.feedback.send(pose);
    }

    pub(crate) fn publish_current_goal(&self, goal: Pose) {
        let _ = self.current_goal.send(goal);
    }

    pub(crate) fn publish_recovery(&self, status: RecoveryStatus) {
        let _ = self.recovery.send(status);
    }

    pub(crate) fn publish_status(&self, status: GoalStatus) {
        let _ = self.status.send(status);
    }

    /// Sender for behaviors that command the base directly.
    pub(crate) fn velocity_sender(&self) -> Sender<Velocity> {
        self.velocity.clone()
    }
}
