//! Goal session state shared between the control loop and the planner
//! worker.
//!
//! The control loop owns all per-goal bookkeeping; the worker only sees the
//! fields it needs through [`SessionShared`]: the goal, the run flag, the
//! state machine position, the planning timers, and the condvar it sleeps
//! on. Both sides hold the mutex only for short field accesses, never across
//! a planner, controller, or recovery call.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::NavConfig;
use crate::geometry::Pose;

/// Position of the navigation state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavState {
    /// Waiting for a global plan
    Planning,
    /// Tracking the plan with the local controller
    Controlling,
    /// Running recovery behaviors
    Clearing,
}

/// Which failure sent the state machine into recovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryTrigger {
    Planning,
    Controlling,
    Oscillation,
}

/// Worker-facing planner parameters, updatable through reconfiguration.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PlannerTuning {
    pub frequency: f64,
    pub patience: Duration,
    pub max_retries: i32,
}

impl PlannerTuning {
    pub fn from_config(config: &NavConfig) -> Self {
        Self {
            frequency: config.planner_frequency,
            patience: Duration::from_secs_f64(config.planner_patience),
            max_retries: config.max_planning_retries,
        }
    }
}

/// Fields guarded by the session mutex.
pub(crate) struct SessionState {
    /// Goal the worker plans toward, in the planning frame
    pub goal: Pose,
    /// Bumped whenever the goal changes, so the worker can cut a pacing
    /// sleep short
    pub goal_epoch: u64,
    /// Worker run flag; cleared to suspend planning
    pub run_planner: bool,
    /// Node-level shutdown request
    pub shutdown: bool,
    pub state: NavState,
    pub recovery_trigger: RecoveryTrigger,
    /// Planner attempts for the current goal (not cycles)
    pub planning_retries: u32,
    /// When the last nonempty plan was produced
    pub last_valid_plan: Instant,
    pub tuning: PlannerTuning,
}

/// Session mutex + worker condvar, shared across threads.
pub(crate) struct SessionShared {
    pub state: Mutex<SessionState>,
    pub wake: Condvar,
    /// Set while `execute` is running a goal; gates out-of-band plan
    /// requests
    pub goal_active: AtomicBool,
}

impl SessionShared {
    pub fn new(config: &NavConfig, planning_frame: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState {
                goal: Pose::new(planning_frame, 0.0, 0.0),
                goal_epoch: 0,
                run_planner: false,
                shutdown: false,
                state: NavState::Planning,
                recovery_trigger: RecoveryTrigger::Planning,
                planning_retries: 0,
                last_valid_plan: Instant::now(),
                tuning: PlannerTuning::from_config(config),
            }),
            wake: Condvar::new(),
            goal_active: AtomicBool::new(false),
        })
    }

    pub fn notify(&self) {
        self.wake.notify_all();
    }
}

/// Control-loop-local context for one accepted goal.
///
/// Created on acceptance, dropped on the terminal outcome. Only the control
/// loop reads or writes these fields.
pub(crate) struct GoalSession {
    pub id: u64,
    pub goal: Pose,
    #[allow(dead_code)]
    pub accepted_at: Instant,
    /// When the controller last produced a valid velocity
    pub last_valid_control: Instant,
    /// When the oscillation timer last restarted
    pub last_oscillation_reset: Instant,
    /// Pose the oscillation displacement is measured from
    pub oscillation_anchor: Option<Pose>,
}

impl GoalSession {
    pub fn begin(id: u64, goal: Pose) -> Self {
        let now = Instant::now();
        Self {
            id,
            goal,
            accepted_at: now,
            last_valid_control: now,
            last_oscillation_reset: now,
            oscillation_anchor: None,
        }
    }

    /// Re-arm all timers, as on goal acceptance or replacement.
    pub fn rearm(&mut self, id: u64, goal: Pose) {
        let now = Instant::now();
        self.id = id;
        self.goal = goal;
        self.last_valid_control = now;
        self.last_oscillation_reset = now;
        self.oscillation_anchor = None;
    }
}
