//! Planner worker: the long-lived global planning thread.
//!
//! The worker sleeps on the session condvar until the control loop raises
//! the run flag, snapshots the goal, plans from the current robot pose, and
//! hands results to the control loop through the [`PlanBuffer`]. Failure
//! accounting (patience and retry budgets) lives here too; the state
//! transitions it decides are plain field writes under the session mutex
//! that the control loop observes on its next cycle.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::costmap::CostmapHandle;
use crate::geometry::Plan;
use crate::nav::plan_buffer::PlanBuffer;
use crate::nav::session::{NavState, RecoveryTrigger, SessionShared};
use crate::nav::signals::NavSignals;
use crate::plugins::GlobalPlanner;

pub(crate) struct PlannerWorker {
    session: Arc<SessionShared>,
    buffer: Arc<PlanBuffer>,
    costmap: CostmapHandle,
    planner: Arc<Mutex<Box<dyn GlobalPlanner>>>,
    signals: NavSignals,
}

impl PlannerWorker {
    pub fn spawn(
        session: Arc<SessionShared>,
        buffer: Arc<PlanBuffer>,
        costmap: CostmapHandle,
        planner: Arc<Mutex<Box<dyn GlobalPlanner>>>,
        signals: NavSignals,
    ) -> JoinHandle<()> {
        let worker = Self {
            session,
            buffer,
            costmap,
            planner,
            signals,
        };

        thread::Builder::new()
            .name("planner".into())
            .spawn(move || worker.run())
            .expect("failed to spawn planner thread")
    }

    fn run(self) {
        tracing::debug!("planner thread started");
        let mut scratch = Plan::new();

        loop {
            // suspend until there is work
            let (goal, epoch, tuning) = {
                let mut state = self.session.state.lock();
                while !state.run_planner && !state.shutdown {
                    self.session.wake.wait(&mut state);
                }
                if state.shutdown {
                    break;
                }
                (state.goal.clone(), state.goal_epoch, state.tuning)
            };

            let start_time = Instant::now();
            scratch.clear();
            let got_plan = self.plan_once(&goal, &mut scratch);

            if got_plan {
                tracing::debug!("got a plan with {} poses", scratch.len());
                self.buffer.publish(&mut scratch);

                let mut state = self.session.state.lock();
                state.last_valid_plan = Instant::now();
                state.planning_retries = 0;
                if state.run_planner && state.state == NavState::Planning {
                    state.state = NavState::Controlling;
                }
                if tuning.frequency <= 0.0 {
                    // one-shot planning: suspend until re-requested
                    state.run_planner = false;
                }
            } else {
                let mut state = self.session.state.lock();
                if state.state == NavState::Planning {
                    state.planning_retries += 1;
                    let attempt_end = state.last_valid_plan + tuning.patience;
                    let retries_exhausted = tuning.max_retries >= 0
                        && state.planning_retries > tuning.max_retries as u32;

                    if state.run_planner && (Instant::now() > attempt_end || retries_exhausted) {
                        tracing::warn!(
                            "planning failed for {:.1}s over {} attempts, entering recovery",
                            state.last_valid_plan.elapsed().as_secs_f64(),
                            state.planning_retries
                        );
                        state.state = NavState::Clearing;
                        state.recovery_trigger = RecoveryTrigger::Planning;
                        state.run_planner = false;
                        self.signals.publish_zero_velocity();
                    }
                }
            }

            // pace the next attempt; a goal change or shutdown cuts the
            // sleep short
            if tuning.frequency > 0.0 {
                let deadline = start_time + Duration::from_secs_f64(1.0 / tuning.frequency);
                let mut state = self.session.state.lock();
                while state.run_planner && !state.shutdown && state.goal_epoch == epoch {
                    if self
                        .session
                        .wake
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
            }
        }

        tracing::debug!("planner thread exited");
    }

    /// One planning attempt from the current robot pose to `goal`.
    /// Success iff the planner returns a nonempty path.
    fn plan_once(&self, goal: &crate::geometry::Pose, scratch: &mut Plan) -> bool {
        let start = match self.costmap.robot_pose() {
            Ok(pose) => pose,
            Err(e) => {
                tracing::warn!("unable to get starting pose of robot, cannot plan: {}", e);
                return false;
            }
        };

        let grid = self.costmap.lock();
        let mut planner = self.planner.lock();
        match planner.make_plan(&grid, &start, goal) {
            Ok(plan) if !plan.is_empty() => {
                *scratch = plan;
                true
            }
            Ok(_) => {
                tracing::debug!(
                    "planner returned an empty plan to ({:.2}, {:.2})",
                    goal.x,
                    goal.y
                );
                false
            }
            Err(e) => {
                tracing::debug!("failed to plan to ({:.2}, {:.2}): {}", goal.x, goal.y, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavConfig;
    use crate::costmap::CostGrid;
    use crate::error::{NavError, Result};
    use crate::geometry::Pose;
    use crate::nav::session::PlannerTuning;
    use crate::transform::{StaticTransform, TransformBuffer};

    struct LinePlanner;

    impl GlobalPlanner for LinePlanner {
        fn make_plan(&mut self, _grid: &CostGrid, start: &Pose, goal: &Pose) -> Result<Plan> {
            Ok(vec![start.clone(), goal.clone()])
        }
    }

    struct FailingPlanner;

    impl GlobalPlanner for FailingPlanner {
        fn make_plan(&mut self, _grid: &CostGrid, _start: &Pose, _goal: &Pose) -> Result<Plan> {
            Err(NavError::NoPlan)
        }
    }

    fn harness(
        planner: Box<dyn GlobalPlanner>,
        config: &NavConfig,
    ) -> (Arc<SessionShared>, Arc<PlanBuffer>, JoinHandle<()>) {
        let tf: Arc<dyn TransformBuffer> =
            Arc::new(StaticTransform::localized_at(Pose::new("map", 0.0, 0.0)));
        let costmap = CostmapHandle::new(
            "global_costmap",
            "map",
            CostGrid::new(100, 100, 0.05, 0.0, 0.0),
            tf,
            Duration::from_secs(5),
        );
        let session = SessionShared::new(config, "map");
        let buffer = Arc::new(PlanBuffer::new());
        let (signals, _monitors) = crate::nav::signals::channels();

        let handle = PlannerWorker::spawn(
            session.clone(),
            buffer.clone(),
            costmap,
            Arc::new(Mutex::new(planner)),
            signals,
        );
        (session, buffer, handle)
    }

    fn stop(session: &Arc<SessionShared>, handle: JoinHandle<()>) {
        session.state.lock().shutdown = true;
        session.notify();
        handle.join().unwrap();
    }

    #[test]
    fn test_one_shot_plan_reaches_buffer_and_enters_controlling() {
        let config = NavConfig::default(); // planner_frequency = 0
        let (session, buffer, handle) = harness(Box::new(LinePlanner), &config);

        {
            let mut state = session.state.lock();
            state.goal = Pose::new("map", 2.0, 0.0);
            state.goal_epoch += 1;
            state.run_planner = true;
        }
        session.notify();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut working = Plan::new();
        while Instant::now() < deadline && !buffer.consume(&mut working) {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(working.len(), 2);
        assert_eq!(working[1].x, 2.0);

        let state = session.state.lock();
        assert_eq!(state.state, NavState::Controlling);
        assert!(!state.run_planner, "one-shot planning must clear the run flag");
        assert_eq!(state.planning_retries, 0);
        drop(state);

        stop(&session, handle);
    }

    #[test]
    fn test_patience_expiry_requests_clearing() {
        let config = NavConfig {
            planner_patience: 0.1,
            ..Default::default()
        };
        let (session, _buffer, handle) = harness(Box::new(FailingPlanner), &config);

        {
            let mut state = session.state.lock();
            state.tuning = PlannerTuning::from_config(&config);
            state.goal = Pose::new("map", 2.0, 0.0);
            state.goal_epoch += 1;
            state.last_valid_plan = Instant::now();
            state.run_planner = true;
        }
        session.notify();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            {
                let state = session.state.lock();
                if state.state == NavState::Clearing {
                    assert_eq!(state.recovery_trigger, RecoveryTrigger::Planning);
                    assert!(!state.run_planner);
                    assert!(state.planning_retries > 0);
                    break;
                }
            }
            assert!(Instant::now() < deadline, "worker never entered clearing");
            thread::sleep(Duration::from_millis(5));
        }

        stop(&session, handle);
    }

    #[test]
    fn test_retry_budget_requests_clearing() {
        let config = NavConfig {
            planner_patience: 60.0,
            max_planning_retries: 3,
            ..Default::default()
        };
        let (session, _buffer, handle) = harness(Box::new(FailingPlanner), &config);

        {
            let mut state = session.state.lock();
            state.tuning = PlannerTuning::from_config(&config);
            state.goal = Pose::new("map", 2.0, 0.0);
            state.goal_epoch += 1;
            state.last_valid_plan = Instant::now();
            state.run_planner = true;
        }
        session.notify();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            {
                let state = session.state.lock();
                if state.state == NavState::Clearing {
                    assert!(state.planning_retries > 3);
                    break;
                }
            }
            assert!(Instant::now() < deadline, "retry budget never tripped");
            thread::sleep(Duration::from_millis(5));
        }

        stop(&session, handle);
    }
}
