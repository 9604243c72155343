//! Message orders for partial-order reduction.

use relay_solver::Guard;
use relay_values::{EventTag, MessageVS, PrimitiveVS, ValueSummary};

/// A partial order over pending messages: `less_than(a, b)` is the guard
/// under which `a` must be scheduled before `b`. Used by the candidate
/// filters: under `less_than(a, b)`, `b`'s sender is removed.
pub trait MessageOrder {
    fn less_than(&self, a: &MessageVS, b: &MessageVS) -> PrimitiveVS<bool>;
}

/// Receiver-queue order: `a < b` where both messages target the same
/// machine and `a` entered that machine's queue first, witnessed by the
/// senders' vector clocks at send time.
#[derive(Debug, Default)]
pub struct ReceiverQueueOrder;

impl ReceiverQueueOrder {
    pub fn new() -> Self {
        Self
    }
}

impl MessageOrder for ReceiverQueueOrder {
    fn less_than(&self, a: &MessageVS, b: &MessageVS) -> PrimitiveVS<bool> {
        let same_target = a
            .target()
            .symbolic_equals(b.target(), Guard::const_true())
            .true_guard();
        if same_target.is_false() {
            return PrimitiveVS::from_guarded([(
                false,
                a.universe().and(b.universe()),
            )]);
        }
        let before = a.clock().less_than(b.clock(), same_target).true_guard();
        let u = a.universe().and(b.universe());
        PrimitiveVS::from_guarded([(true, before), (false, u.and(before.not()))])
    }
}

/// Interleave order: certain event classes must not be reordered past each
/// other. With no pairs configured this is the identity partial order and
/// the filter built on it keeps every candidate.
#[derive(Debug, Default)]
pub struct InterleaveOrder {
    /// `(first, second)`: a message carrying `first` precedes one carrying
    /// `second`.
    pairs: Vec<(EventTag, EventTag)>,
}

impl InterleaveOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pairs(pairs: Vec<(EventTag, EventTag)>) -> Self {
        Self { pairs }
    }
}

impl MessageOrder for InterleaveOrder {
    fn less_than(&self, a: &MessageVS, b: &MessageVS) -> PrimitiveVS<bool> {
        let u = a.universe().and(b.universe());
        let mut before = Guard::const_false();
        for (first, second) in &self.pairs {
            let g = a
                .event()
                .guard_for(first)
                .and(b.event().guard_for(second));
            before = before.or(g);
        }
        PrimitiveVS::from_guarded([(true, before.and(u)), (false, u.and(before.not()))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_solver::SolverContext;
    use relay_values::{MachineRef, VectorClockVS};
    use std::sync::Arc;

    fn mref(gid: usize) -> MachineRef {
        MachineRef::new(gid, Arc::from("M"), gid as u64)
    }

    fn msg_with_clock(name: &str, target: usize, clock: VectorClockVS) -> MessageVS {
        MessageVS::with_clock(
            PrimitiveVS::new(EventTag::new(name)),
            PrimitiveVS::new(mref(target)),
            None,
            clock,
        )
    }

    #[test]
    fn test_receiver_order_same_target() {
        SolverContext::reset();
        let c1 = VectorClockVS::new().increment(&mref(9), Guard::const_true());
        let c2 = c1.increment(&mref(9), Guard::const_true());
        let a = msg_with_clock("A", 0, c1);
        let b = msg_with_clock("B", 0, c2);
        let order = ReceiverQueueOrder::new();
        assert!(order.less_than(&a, &b).true_guard().is_true());
        assert!(order.less_than(&b, &a).true_guard().is_false());
    }

    #[test]
    fn test_receiver_order_different_targets() {
        SolverContext::reset();
        let c1 = VectorClockVS::new().increment(&mref(9), Guard::const_true());
        let c2 = c1.increment(&mref(9), Guard::const_true());
        let a = msg_with_clock("A", 0, c1);
        let b = msg_with_clock("B", 1, c2);
        let order = ReceiverQueueOrder::new();
        assert!(order.less_than(&a, &b).true_guard().is_false());
    }

    #[test]
    fn test_interleave_identity_by_default() {
        SolverContext::reset();
        let a = msg_with_clock("A", 0, VectorClockVS::new());
        let b = msg_with_clock("B", 0, VectorClockVS::new());
        let order = InterleaveOrder::new();
        assert!(order.less_than(&a, &b).true_guard().is_false());
        assert!(order.less_than(&b, &a).true_guard().is_false());
    }

    #[test]
    fn test_interleave_with_pairs() {
        SolverContext::reset();
        let a = msg_with_clock("A", 0, VectorClockVS::new());
        let b = msg_with_clock("B", 0, VectorClockVS::new());
        let order =
            InterleaveOrder::with_pairs(vec![(EventTag::new("A"), EventTag::new("B"))]);
        assert!(order.less_than(&a, &b).true_guard().is_true());
        assert!(order.less_than(&b, &a).true_guard().is_false());
    }
}
