//! Triple-buffered plan handoff between the planner worker and the control
//! loop.
//!
//! Three plan slots exist: the worker's scratch buffer, the `latest` slot
//! inside this type, and the control loop's working copy. Handoff swaps
//! whole `Vec`s under the buffer mutex, so no pose is ever copied across
//! the thread boundary and neither side can observe a torn plan.

use parking_lot::Mutex;

use crate::geometry::Plan;

pub struct PlanBuffer {
    inner: Mutex<Inner>,
}

struct Inner {
    latest: Plan,
    has_new: bool,
}

impl PlanBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                latest: Plan::new(),
                has_new: false,
            }),
        }
    }

    /// Producer side: swap the filled scratch buffer into the latest slot
    /// and flag it. The scratch now holds the previously latest plan and
    /// will be cleared before the next attempt.
    pub fn publish(&self, scratch: &mut Plan) {
        let mut inner = self.inner.lock();
        std::mem::swap(scratch, &mut inner.latest);
        inner.has_new = true;
    }

    /// Consumer side: iff a new plan is available, swap it into the working
    /// copy and clear the flag. Returns whether a new plan was taken.
    pub fn consume(&self, working: &mut Plan) -> bool {
        let mut inner = self.inner.lock();
        if !inner.has_new {
            return false;
        }
        std::mem::swap(working, &mut inner.latest);
        inner.has_new = false;
        true
    }

    /// Drop any pending plan, as on reconfiguration or goal teardown.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.latest.clear();
        inner.has_new = false;
    }
}

impl Default for PlanBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Pose;

    fn plan_to(x: f64) -> Plan {
        vec![Pose::new("map", 0.0, 0.0), Pose::new("map", x, 0.0)]
    }

    #[test]
    fn test_consume_without_publish_is_empty() {
        let buffer = PlanBuffer::new();
        let mut working = Plan::new();
        assert!(!buffer.consume(&mut working));
        assert!(working.is_empty());
    }

    #[test]
    fn test_published_plan_is_consumed_once() {
        let buffer = PlanBuffer::new();
        let mut scratch = plan_to(1.0);
        buffer.publish(&mut scratch);

        let mut working = Plan::new();
        assert!(buffer.consume(&mut working));
        assert_eq!(working.len(), 2);
        assert_eq!(working[1].x, 1.0);

        // the same plan is never handed out twice
        assert!(!buffer.consume(&mut working));
        assert_eq!(working[1].x, 1.0);
    }

    #[test]
    fn test_consumer_sees_newest_plan() {
        let buffer = PlanBuffer::new();

        let mut scratch = plan_to(1.0);
        buffer.publish(&mut scratch);

        scratch.clear();
        scratch.extend(plan_to(2.0));
        buffer.publish(&mut scratch);

        let mut working = Plan::new();
        assert!(buffer.consume(&mut working));
        assert_eq!(working[1].x, 2.0);
        assert!(!buffer.consume(&mut working));
    }

    #[test]
    fn test_clear_drops_pending_plan() {
        let buffer = PlanBuffer::new();
        let mut scratch = plan_to(1.0);
        buffer.publish(&mut scratch);
        buffer.clear();

        let mut working = Plan::new();
        assert!(!buffer.consume(&mut working));
    }
}
