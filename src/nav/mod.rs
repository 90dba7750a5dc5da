//! The navigation coordinator.
//!
//! This module wires the moving parts together:
//! - [`PlanBuffer`]: triple-buffered plan handoff between threads
//! - session: goal state shared by the control loop and the worker
//! - worker: the long-lived global planning thread
//! - [`RecoveryChain`]: ordered failure recovery behaviors
//! - [`Navigator`]: the control loop itself

mod navigator;
mod plan_buffer;
mod recovery;
mod session;
mod signals;
mod worker;

pub use navigator::{NavHandle, Navigator};
pub use plan_buffer::PlanBuffer;
pub use recovery::RecoveryChain;
pub use session::{NavState, RecoveryTrigger};
pub use signals::{AbortReason, GoalStatus, NavMonitors, NavOutcome, RecoveryStatus};
