//! The navigation control loop.
//!
//! [`Navigator::execute`] drives one goal to a terminal outcome: it installs
//! the goal for the planner worker, then cycles at the controller rate
//! through the {planning, controlling, clearing} state machine, handling
//! preemption, oscillation, stale sensor data, and progressive recovery.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::config::NavConfig;
use crate::costmap::CostmapHandle;
use crate::error::{NavError, Result};
use crate::geometry::{Plan, Pose};
use crate::nav::plan_buffer::PlanBuffer;
use crate::nav::recovery::RecoveryChain;
use crate::nav::session::{
    GoalSession, NavState, PlannerTuning, RecoveryTrigger, SessionShared,
};
use crate::nav::signals::{self, AbortReason, GoalStatus, NavMonitors, NavOutcome, NavSignals};
use crate::nav::worker::PlannerWorker;
use crate::plugins::{GlobalPlanner, LocalController, PluginContext, PluginRegistry};
use crate::transform::TransformBuffer;

enum GoalCommand {
    Goal(Pose),
    Cancel,
}

/// Cloneable handle for submitting goals to a running [`Navigator`] from
/// other threads.
#[derive(Clone)]
pub struct NavHandle {
    commands: Sender<GoalCommand>,
    session: Arc<SessionShared>,
}

impl NavHandle {
    /// Submit a structured goal. If a goal is being executed it is preempted
    /// on the next control cycle.
    pub fn send_goal(&self, goal: Pose) {
        let _ = self.commands.send(GoalCommand::Goal(goal));
    }

    /// Compatibility path for tools that only speak bare poses: wraps the
    /// pose in a structured goal and re-sends it.
    pub fn send_simple_goal(&self, pose: Pose) {
        tracing::debug!("wrapping a bare pose goal and re-sending it as a structured goal");
        self.send_goal(pose);
    }

    /// Cancel the active goal; `execute` returns `Preempted`.
    pub fn cancel(&self) {
        let _ = self.commands.send(GoalCommand::Cancel);
    }

    /// Ask the coordinator and its worker to shut down.
    pub fn request_shutdown(&self) {
        self.session.state.lock().shutdown = true;
        self.session.notify();
    }
}

/// The navigation coordinator.
///
/// Owns the two costmaps, the plan buffer, the planner worker, and the
/// local controller. Constructed once; `execute` runs one goal at a time on
/// the calling thread.
pub struct Navigator {
    config: NavConfig,
    planner_costmap: CostmapHandle,
    controller_costmap: CostmapHandle,
    tf: Arc<dyn TransformBuffer>,
    registry: PluginRegistry,
    session: Arc<SessionShared>,
    plan_buffer: Arc<PlanBuffer>,
    planner: Arc<Mutex<Box<dyn GlobalPlanner>>>,
    controller: Box<dyn LocalController>,
    recovery: RecoveryChain,
    signals: NavSignals,
    commands: Receiver<GoalCommand>,
    commands_tx: Sender<GoalCommand>,
    /// Control loop's working copy of the plan (the third buffer slot)
    controller_plan: Plan,
    worker: Option<JoinHandle<()>>,
    goal_counter: u64,
}

impl Navigator {
    pub fn new(
        config: NavConfig,
        planner_costmap: CostmapHandle,
        controller_costmap: CostmapHandle,
        tf: Arc<dyn TransformBuffer>,
        registry: PluginRegistry,
    ) -> Result<(Self, NavMonitors)> {
        config.validate()?;

        let (signals, monitors) = signals::channels();
        let ctx = PluginContext {
            planner_costmap: planner_costmap.clone(),
            controller_costmap: controller_costmap.clone(),
            tf: tf.clone(),
            velocity: signals.velocity_sender(),
            config: config.clone(),
        };

        let planner = Arc::new(Mutex::new(
            registry.global_planner(&config.base_global_planner, &ctx)?,
        ));
        let controller = registry.local_controller(&config.base_local_planner, &ctx)?;
        let recovery = RecoveryChain::from_config(&config, &registry, &ctx);

        let session = SessionShared::new(&config, planner_costmap.global_frame());
        let plan_buffer = Arc::new(PlanBuffer::new());
        let (commands_tx, commands) = unbounded();

        let worker = PlannerWorker::spawn(
            session.clone(),
            plan_buffer.clone(),
            planner_costmap.clone(),
            planner.clone(),
            signals.clone(),
        );

        if config.shutdown_costmaps {
            tracing::debug!("stopping costmaps initially");
            planner_costmap.pause();
            controller_costmap.pause();
        }

        Ok((
            Self {
                config,
                planner_costmap,
                controller_costmap,
                tf,
                registry,
                session,
                plan_buffer,
                planner,
                controller,
                recovery,
                signals,
                commands,
                commands_tx,
                controller_plan: Plan::new(),
                worker: Some(worker),
                goal_counter: 0,
            },
            monitors,
        ))
    }

    /// Handle for goal submission, cancellation and shutdown from other
    /// threads.
    pub fn handle(&self) -> NavHandle {
        NavHandle {
            commands: self.commands_tx.clone(),
            session: self.session.clone(),
        }
    }

    /// Drive the robot to `goal`, blocking until a terminal outcome.
    pub fn execute(&mut self, goal: Pose) -> NavOutcome {
        let id = self.next_goal_id();

        if !goal.orientation.is_valid_goal() {
            let reason = "invalid quaternion".to_string();
            self.signals.publish_status(GoalStatus::Rejected {
                id,
                reason: reason.clone(),
            });
            return NavOutcome::Rejected(reason);
        }

        tracing::info!(
            "received a goal of x: {:.2}, y: {:.2} in frame {}",
            goal.x,
            goal.y,
            goal.frame_id
        );

        self.signals.publish_zero_velocity();

        if self.config.shutdown_costmaps {
            tracing::debug!("starting up costmaps that were shut down previously");
            self.planner_costmap.resume();
            self.controller_costmap.resume();
        }

        let mut session = GoalSession::begin(id, goal.clone());
        self.install_goal(&mut session, id, goal);
        self.session.goal_active.store(true, Ordering::Release);
        self.signals.publish_status(GoalStatus::Accepted { id });

        let outcome = self.control_loop(&mut session);

        self.session.goal_active.store(false, Ordering::Release);
        self.signals.publish_status(match &outcome {
            NavOutcome::Succeeded => GoalStatus::Succeeded { id: session.id },
            NavOutcome::Preempted => GoalStatus::Preempted { id: session.id },
            NavOutcome::Aborted(reason) => GoalStatus::Aborted {
                id: session.id,
                reason: *reason,
            },
            NavOutcome::Rejected(reason) => GoalStatus::Rejected {
                id: session.id,
                reason: reason.clone(),
            },
        });
        outcome
    }

    /// Candidate plan for an external caller, without executing it.
    ///
    /// Only permitted while no goal is active. When the exact goal is
    /// unreachable, searches outward over x and y offsets in both signs up
    /// to `tolerance`, one layer at a time, and returns the first plan
    /// found.
    pub fn make_plan(&mut self, start: Option<Pose>, goal: &Pose, tolerance: f64) -> Result<Plan> {
        if self.session.goal_active.load(Ordering::Acquire) {
            tracing::error!("navigation must be idle to make a plan for an external user");
            return Err(NavError::GoalActive);
        }

        let start = match start {
            Some(pose) => pose,
            None => self.planner_costmap.robot_pose()?,
        };

        if self.config.make_plan_clear_costmap {
            let size = 2.0 * self.config.clearing_radius;
            self.planner_costmap.clear_window_around_robot(size, size)?;
            self.controller_costmap.clear_window_around_robot(size, size)?;
        }

        // a goal that does not map would otherwise silently produce plans
        // toward the map origin
        {
            let grid = self.planner_costmap.lock();
            grid.world_to_map(goal.x, goal.y)?;
        }

        if let Some(plan) = self.plan_attempt(&start, goal) {
            return Ok(plan);
        }
        tracing::debug!(
            "no plan to the exact goal ({:.2}, {:.2}), searching for a feasible goal within {:.2}m",
            goal.x,
            goal.y,
            tolerance
        );

        let resolution = self.planner_costmap.resolution();
        let mut search_increment = resolution * 3.0;
        if tolerance > 0.0 && tolerance < search_increment {
            search_increment = tolerance;
        }

        let mut max_offset = search_increment;
        while max_offset <= tolerance {
            let mut y_offset = 0.0;
            while y_offset <= max_offset {
                let mut x_offset = 0.0;
                while x_offset <= max_offset {
                    // don't search again inside the current outer layer
                    if x_offset < max_offset - 1e-9 && y_offset < max_offset - 1e-9 {
                        x_offset += search_increment;
                        continue;
                    }

                    for y_mult in [-1.0, 1.0] {
                        if y_offset < 1e-9 && y_mult < 0.0 {
                            continue;
                        }
                        for x_mult in [-1.0, 1.0] {
                            if x_offset < 1e-9 && x_mult < 0.0 {
                                continue;
                            }

                            let mut candidate = goal.clone();
                            candidate.x = goal.x + x_offset * x_mult;
                            candidate.y = goal.y + y_offset * y_mult;

                            if let Some(mut plan) = self.plan_attempt(&start, &candidate) {
                                if self.config.make_plan_add_unreachable_goal {
                                    // the local controller may still get there
                                    plan.push(goal.clone());
                                }
                                tracing::debug!(
                                    "found a plan to ({:.2}, {:.2})",
                                    candidate.x,
                                    candidate.y
                                );
                                return Ok(plan);
                            }
                        }
                    }
                    x_offset += search_increment;
                }
                y_offset += search_increment;
            }
            max_offset += search_increment;
        }

        Err(NavError::NoPlan)
    }

    /// Reset both costmaps to their static layers, each under its own mutex.
    pub fn clear_costmaps(&self) {
        self.controller_costmap.reset_layers();
        self.planner_costmap.reset_layers();
    }

    /// Synchronous reconfiguration: updates the worker tuning, clears all
    /// plan buffers, resets the state machine, and swaps the planner or
    /// controller instance when its configured name changed.
    pub fn reconfigure(&mut self, config: NavConfig) -> Result<()> {
        config.validate()?;

        let ctx = PluginContext {
            planner_costmap: self.planner_costmap.clone(),
            controller_costmap: self.controller_costmap.clone(),
            tf: self.tf.clone(),
            velocity: self.signals.velocity_sender(),
            config: config.clone(),
        };

        // create any replacement instances before touching shared state, so
        // a failed lookup leaves the running configuration untouched
        let new_planner = if config.base_global_planner != self.config.base_global_planner {
            tracing::info!("loading global planner {}", config.base_global_planner);
            Some(
                self.registry
                    .global_planner(&config.base_global_planner, &ctx)?,
            )
        } else {
            None
        };
        let new_controller = if config.base_local_planner != self.config.base_local_planner {
            tracing::info!("loading local controller {}", config.base_local_planner);
            Some(
                self.registry
                    .local_controller(&config.base_local_planner, &ctx)?,
            )
        } else {
            None
        };

        {
            let mut state = self.session.state.lock();
            state.tuning = PlannerTuning::from_config(&config);
            state.run_planner = false;
            state.state = NavState::Planning;
            state.recovery_trigger = RecoveryTrigger::Planning;
            state.planning_retries = 0;
        }

        self.plan_buffer.clear();
        self.controller_plan.clear();
        self.recovery.reset();

        if let Some(planner) = new_planner {
            // waits for an in-flight planning attempt to finish
            *self.planner.lock() = planner;
        }
        if let Some(controller) = new_controller {
            self.controller = controller;
        }

        self.signals.publish_zero_velocity();
        self.config = config;
        Ok(())
    }

    /// Shut down the coordinator and join the planner worker.
    pub fn shutdown(mut self) {
        self.begin_shutdown();
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.join()
        {
            tracing::error!("planner thread panicked: {:?}", e);
        }
    }

    fn begin_shutdown(&self) {
        self.session.state.lock().shutdown = true;
        self.session.notify();
    }

    fn next_goal_id(&mut self) -> u64 {
        self.goal_counter += 1;
        self.goal_counter
    }

    /// Express a goal in the planning frame, keeping the original when the
    /// transform fails so downstream checks fail cleanly.
    fn goal_to_global_frame(&self, goal: &Pose) -> Pose {
        let frame = self.planner_costmap.global_frame();
        match self.tf.transform(goal, frame) {
            Ok(pose) => pose,
            Err(e) => {
                tracing::warn!(
                    "failed to transform the goal pose from {} into the {} frame: {}",
                    goal.frame_id,
                    frame,
                    e
                );
                goal.clone()
            }
        }
    }

    /// Install a goal in the shared session, wake the worker, and re-arm all
    /// per-goal counters and anchors.
    fn install_goal(&mut self, session: &mut GoalSession, id: u64, goal: Pose) {
        let goal = self.goal_to_global_frame(&goal);
        {
            let mut state = self.session.state.lock();
            state.goal = goal.clone();
            state.goal_epoch += 1;
            state.run_planner = true;
            state.state = NavState::Planning;
            state.recovery_trigger = RecoveryTrigger::Planning;
            state.planning_retries = 0;
            state.last_valid_plan = Instant::now();
        }
        self.session.notify();
        self.recovery.reset();
        session.rearm(id, goal.clone());
        self.signals.publish_current_goal(goal);
    }

    fn control_loop(&mut self, session: &mut GoalSession) -> NavOutcome {
        loop {
            let cycle_start = Instant::now();
            let period = Duration::from_secs_f64(1.0 / self.config.controller_frequency);

            if self.session.state.lock().shutdown {
                // wake the planner thread so it can exit cleanly
                self.session.notify();
                tracing::warn!("aborting the goal because the node is shutting down");
                return NavOutcome::Aborted(AbortReason::Shutdown);
            }

            // preemption and cancellation, in arrival order
            while let Ok(command) = self.commands.try_recv() {
                match command {
                    GoalCommand::Cancel => {
                        tracing::debug!("preempting the current goal on request");
                        self.reset_state();
                        return NavOutcome::Preempted;
                    }
                    GoalCommand::Goal(new_goal) => {
                        let new_id = self.next_goal_id();
                        if !new_goal.orientation.is_valid_goal() {
                            self.signals.publish_status(GoalStatus::Rejected {
                                id: new_id,
                                reason: "invalid quaternion".to_string(),
                            });
                            continue;
                        }
                        tracing::debug!("goal {} preempted by goal {}", session.id, new_id);
                        self.signals.publish_status(GoalStatus::Preempted { id: session.id });
                        self.install_goal(session, new_id, new_goal);
                        self.signals.publish_status(GoalStatus::Accepted { id: new_id });
                    }
                }
            }

            // the planning frame can change under us; keep the goal
            // expressed in it
            if session.goal.frame_id != self.planner_costmap.global_frame() {
                tracing::debug!(
                    "the planning frame changed to {}, re-transforming the goal",
                    self.planner_costmap.global_frame()
                );
                let goal = session.goal.clone();
                let id = session.id;
                self.install_goal(session, id, goal);
            }

            if let Some(outcome) = self.execute_cycle(session) {
                return outcome;
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < period {
                thread::sleep(period - elapsed);
            } else if self.session.state.lock().state == NavState::Controlling {
                tracing::warn!(
                    "control loop missed its desired rate of {:.2}Hz, the cycle actually took {:.4}s",
                    self.config.controller_frequency,
                    elapsed.as_secs_f64()
                );
            }
        }
    }

    /// One control cycle. Returns the terminal outcome when the goal is
    /// done.
    fn execute_cycle(&mut self, session: &mut GoalSession) -> Option<NavOutcome> {
        let pose = match self.planner_costmap.robot_pose() {
            Ok(pose) => pose,
            Err(e) => {
                tracing::warn!("cannot read the robot pose, holding still: {}", e);
                self.signals.publish_zero_velocity();
                return None;
            }
        };
        self.signals.publish_feedback(pose.clone());

        // moved far enough to reset the oscillation timeout?
        let displaced = match &session.oscillation_anchor {
            Some(anchor) => pose.distance(anchor) >= self.config.oscillation_distance,
            None => true,
        };
        if displaced {
            session.last_oscillation_reset = Instant::now();
            session.oscillation_anchor = Some(pose.clone());
            // if the last recovery was caused by oscillation, start the
            // chain over
            if self.session.state.lock().recovery_trigger == RecoveryTrigger::Oscillation {
                self.recovery.reset();
            }
        }

        // we don't want to drive blind
        if !self.controller_costmap.is_current() {
            tracing::warn!("sensor data is out of date, not commanding the base for safety");
            self.signals.publish_zero_velocity();
            return None;
        }

        // hand a fresh plan to the controller
        if self.plan_buffer.consume(&mut self.controller_plan) {
            tracing::debug!("got a new plan with {} poses", self.controller_plan.len());
            if !self.controller.set_plan(&self.controller_plan) {
                tracing::error!("failed to pass the global plan to the controller, aborting");
                self.reset_state();
                return Some(NavOutcome::Aborted(AbortReason::PlanHandoffFailed));
            }
            if self.session.state.lock().recovery_trigger == RecoveryTrigger::Planning {
                self.recovery.reset();
            }
        }

        let state = self.session.state.lock().state;
        match state {
            NavState::Planning => {
                {
                    let mut s = self.session.state.lock();
                    s.run_planner = true;
                }
                self.session.notify();
                tracing::trace!("waiting for plan, in the planning state");
                None
            }
            NavState::Controlling => self.controlling_cycle(session, &pose),
            NavState::Clearing => self.clearing_cycle(session, &pose),
        }
    }

    fn controlling_cycle(&mut self, session: &mut GoalSession, pose: &Pose) -> Option<NavOutcome> {
        // goal reached wins over everything else this cycle
        if self.controller.is_goal_reached() {
            tracing::info!("goal reached");
            self.reset_state();
            return Some(NavOutcome::Succeeded);
        }

        if self.config.oscillation_timeout > 0.0
            && session.last_oscillation_reset.elapsed()
                > Duration::from_secs_f64(self.config.oscillation_timeout)
        {
            tracing::warn!("robot confined to a small area for too long, entering recovery");
            self.signals.publish_zero_velocity();
            let mut state = self.session.state.lock();
            state.state = NavState::Clearing;
            state.recovery_trigger = RecoveryTrigger::Oscillation;
            return None;
        }

        let velocity = {
            let grid = self.controller_costmap.lock();
            self.controller.compute_velocity(&grid, pose)
        };

        match velocity {
            Ok(velocity) => {
                tracing::debug!(
                    "valid command from the local controller: {:.3}, {:.3}, {:.3}",
                    velocity.linear_x,
                    velocity.linear_y,
                    velocity.angular_z
                );
                session.last_valid_control = Instant::now();
                self.signals.publish_velocity(velocity);
                if self.session.state.lock().recovery_trigger == RecoveryTrigger::Controlling {
                    self.recovery.reset();
                }
            }
            Err(e) => {
                tracing::debug!("the local controller could not find a valid velocity: {}", e);
                let patience = Duration::from_secs_f64(self.config.controller_patience);
                if session.last_valid_control.elapsed() > patience {
                    self.signals.publish_zero_velocity();
                    let mut state = self.session.state.lock();
                    state.state = NavState::Clearing;
                    state.recovery_trigger = RecoveryTrigger::Controlling;
                } else {
                    // within patience: stop and ask for a fresh plan instead
                    self.signals.publish_zero_velocity();
                    let mut state = self.session.state.lock();
                    state.last_valid_plan = Instant::now();
                    state.planning_retries = 0;
                    state.state = NavState::Planning;
                    state.run_planner = true;
                    drop(state);
                    self.session.notify();
                }
            }
        }
        None
    }

    fn clearing_cycle(&mut self, session: &mut GoalSession, pose: &Pose) -> Option<NavOutcome> {
        if self.recovery.advance_and_run(pose, &self.signals) {
            // give the next planning attempt a fresh chance
            session.last_oscillation_reset = Instant::now();
            let mut state = self.session.state.lock();
            state.last_valid_plan = Instant::now();
            state.planning_retries = 0;
            state.state = NavState::Planning;
            None
        } else {
            tracing::error!("all recovery behaviors have failed, aborting");
            let trigger = {
                let mut state = self.session.state.lock();
                state.run_planner = false;
                state.recovery_trigger
            };
            let reason = match trigger {
                RecoveryTrigger::Planning => AbortReason::PlanningFailed,
                RecoveryTrigger::Controlling => AbortReason::ControlFailed,
                RecoveryTrigger::Oscillation => AbortReason::Oscillating,
            };
            self.reset_state();
            Some(NavOutcome::Aborted(reason))
        }
    }

    /// Stop the worker, put the state machine back to its resting position,
    /// and stop the base.
    fn reset_state(&mut self) {
        {
            let mut state = self.session.state.lock();
            state.run_planner = false;
            state.state = NavState::Planning;
            state.recovery_trigger = RecoveryTrigger::Planning;
            state.planning_retries = 0;
        }
        self.recovery.reset();
        self.signals.publish_zero_velocity();

        if self.config.shutdown_costmaps {
            tracing::debug!("stopping costmaps");
            self.planner_costmap.pause();
            self.controller_costmap.pause();
        }
    }

    fn plan_attempt(&self, start: &Pose, goal: &Pose) -> Option<Plan> {
        let grid = self.planner_costmap.lock();
        let mut planner = self.planner.lock();
        match planner.make_plan(&grid, start, goal) {
            Ok(plan) if !plan.is_empty() => Some(plan),
            _ => None,
        }
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        self.begin_shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costmap::CostGrid;
    use crate::geometry::Velocity;
    use crate::transform::StaticTransform;

    struct BoundedPlanner {
        max_x: f64,
    }

    impl GlobalPlanner for BoundedPlanner {
        fn make_plan(&mut self, _grid: &CostGrid, start: &Pose, goal: &Pose) -> Result<Plan> {
            if goal.x <= self.max_x {
                Ok(vec![start.clone(), goal.clone()])
            } else {
                Err(NavError::NoPlan)
            }
        }
    }

    struct IdleController;

    impl LocalController for IdleController {
        fn set_plan(&mut self, _plan: &Plan) -> bool {
            true
        }

        fn compute_velocity(&mut self, _grid: &CostGrid, _pose: &Pose) -> Result<Velocity> {
            Err(NavError::NoVelocity)
        }

        fn is_goal_reached(&mut self) -> bool {
            false
        }
    }

    fn test_navigator(config: NavConfig) -> (Navigator, NavMonitors) {
        let tf: Arc<dyn TransformBuffer> =
            Arc::new(StaticTransform::localized_at(Pose::new("map", 0.5, 0.5)));
        let grid = CostGrid::new(200, 200, 0.05, 0.0, 0.0);
        let planner_costmap = CostmapHandle::new(
            "global_costmap",
            "map",
            grid.clone(),
            tf.clone(),
            Duration::from_secs(5),
        );
        let controller_costmap = CostmapHandle::new(
            "local_costmap",
            "map",
            grid,
            tf.clone(),
            Duration::from_secs(5),
        );

        let mut registry = PluginRegistry::new();
        registry.register_global_planner("bounded", |_ctx| Box::new(BoundedPlanner { max_x: 1.0 }));
        registry.register_local_controller("idle", |_ctx| Box::new(IdleController));

        Navigator::new(config, planner_costmap, controller_costmap, tf, registry).unwrap()
    }

    fn test_config() -> NavConfig {
        NavConfig {
            base_global_planner: "bounded".to_string(),
            base_local_planner: "idle".to_string(),
            make_plan_clear_costmap: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_plugin_name_fails_construction() {
        let tf: Arc<dyn TransformBuffer> = Arc::new(StaticTransform::new());
        let grid = CostGrid::new(10, 10, 0.1, 0.0, 0.0);
        let planner_costmap =
            CostmapHandle::new("global_costmap", "map", grid.clone(), tf.clone(), Duration::from_secs(1));
        let controller_costmap =
            CostmapHandle::new("local_costmap", "map", grid, tf.clone(), Duration::from_secs(1));

        let result = Navigator::new(
            NavConfig::default(),
            planner_costmap,
            controller_costmap,
            tf,
            PluginRegistry::new(),
        );
        assert!(matches!(result, Err(NavError::UnknownPlugin(_))));
    }

    #[test]
    fn test_make_plan_reaches_exact_goal() {
        let (mut navigator, _monitors) = test_navigator(test_config());
        let plan = navigator
            .make_plan(None, &Pose::new("map", 0.9, 0.5), 0.0)
            .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].x, 0.9);
    }

    #[test]
    fn test_make_plan_searches_outward_and_appends_goal() {
        let (mut navigator, _monitors) = test_navigator(test_config());

        // exact goal at x=1.2 is unreachable, the search must fall back to
        // an offset candidate and append the original goal
        let goal = Pose::new("map", 1.2, 0.5);
        let plan = navigator.make_plan(None, &goal, 0.5).unwrap();

        let last = plan.last().unwrap();
        assert_eq!(last.x, 1.2);
        let reached = &plan[plan.len() - 2];
        assert!(reached.x <= 1.0, "candidate {:.2} should be reachable", reached.x);
    }

    #[test]
    fn test_make_plan_without_fallback_goal() {
        let config = NavConfig {
            make_plan_add_unreachable_goal: false,
            ..test_config()
        };
        let (mut navigator, _monitors) = test_navigator(config);

        let goal = Pose::new("map", 1.2, 0.5);
        let plan = navigator.make_plan(None, &goal, 0.5).unwrap();
        assert!(plan.last().unwrap().x <= 1.0);
    }

    #[test]
    fn test_make_plan_off_map_goal_is_an_error() {
        let (mut navigator, _monitors) = test_navigator(test_config());
        // the grid spans 10m; (50, 50) cannot be mapped even with tolerance
        let result = navigator.make_plan(None, &Pose::new("map", 50.0, 50.0), 1.0);
        assert!(matches!(result, Err(NavError::OffMap(_, _))));
    }

    #[test]
    fn test_make_plan_refused_while_goal_active() {
        let (mut navigator, _monitors) = test_navigator(test_config());
        navigator.session.goal_active.store(true, Ordering::Release);
        let result = navigator.make_plan(None, &Pose::new("map", 0.9, 0.5), 0.0);
        assert!(matches!(result, Err(NavError::GoalActive)));
    }

    #[test]
    fn test_clear_costmaps_resets_both_grids() {
        let (navigator, _monitors) = test_navigator(test_config());
        {
            let mut grid = navigator.planner_costmap.lock();
            grid.set_cost(3, 3, crate::costmap::costs::LETHAL);
        }
        {
            let mut grid = navigator.controller_costmap.lock();
            grid.set_cost(4, 4, crate::costmap::costs::LETHAL);
        }

        navigator.clear_costmaps();

        assert_eq!(
            navigator.planner_costmap.lock().cost(3, 3),
            crate::costmap::costs::FREE_SPACE
        );
        assert_eq!(
            navigator.controller_costmap.lock().cost(4, 4),
            crate::costmap::costs::FREE_SPACE
        );
    }

    #[test]
    fn test_reconfigure_swaps_planner_and_tuning() {
        let (mut navigator, _monitors) = test_navigator(test_config());

        let new_config = NavConfig {
            planner_patience: 1.0,
            base_global_planner: "wide".to_string(),
            ..test_config()
        };
        // not registered yet: the rejected config must leave the running
        // one untouched, worker tuning included
        assert!(navigator.reconfigure(new_config.clone()).is_err());
        assert_eq!(navigator.config.base_global_planner, "bounded");
        let tuning = navigator.session.state.lock().tuning;
        assert_eq!(tuning.patience, Duration::from_secs(5));

        navigator
            .registry
            .register_global_planner("wide", |_ctx| Box::new(BoundedPlanner { max_x: 100.0 }));
        navigator.reconfigure(new_config).unwrap();

        let plan = navigator
            .make_plan(None, &Pose::new("map", 5.0, 5.0), 0.0)
            .unwrap();
        assert_eq!(plan[1].x, 5.0);

        let tuning = navigator.session.state.lock().tuning;
        assert_eq!(tuning.patience, Duration::from_secs(1));
    }
}
