//! Per-machine symbolic event buffers.
//!
//! A buffer is a `ListVS` of messages. Queue semantics always peeks the
//! head; bag semantics picks the dequeue position with fresh solver
//! variables, so the position itself is symbolic. The peek is cached until
//! the contents change, so the reduction filters and the dequeue all see
//! the same choice.

use crate::error::{EngineError, EngineResult};
use relay_solver::Guard;
use relay_values::{ListVS, MessageVS, PrimitiveVS, ValueSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSemantics {
    /// FIFO: dequeue the head.
    Queue,
    /// Unordered: dequeue any element.
    Bag,
}

#[derive(Debug)]
pub struct EventBuffer {
    semantics: BufferSemantics,
    elements: ListVS<MessageVS>,
    /// Cached (head, position) for the current contents.
    peeked: Option<(MessageVS, PrimitiveVS<i64>)>,
}

impl EventBuffer {
    pub fn new(semantics: BufferSemantics) -> Self {
        Self {
            semantics,
            elements: ListVS::new(Guard::const_true()),
            peeked: None,
        }
    }

    pub fn semantics(&self) -> BufferSemantics {
        self.semantics
    }

    pub fn set_semantics(&mut self, semantics: BufferSemantics) {
        self.semantics = semantics;
        self.peeked = None;
    }

    /// Guard under which the buffer holds at least one message.
    pub fn enabled_cond(&self) -> Guard {
        self.elements.non_empty_universe()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn enqueue(&mut self, msg: MessageVS) {
        if msg.is_empty_vs() {
            return;
        }
        self.elements = self.elements.add(&msg);
        self.peeked = None;
    }

    fn head_position(&self) -> PrimitiveVS<i64> {
        match self.semantics {
            BufferSemantics::Queue => PrimitiveVS::new(0).restrict(self.enabled_cond()),
            BufferSemantics::Bag => {
                // Partition the enabled universe over positions with fresh
                // variables; the last in-range position takes the rest.
                let mut pending = self.enabled_cond();
                let mut entries: Vec<(i64, Guard)> = Vec::new();
                let slots = self.elements.items().len();
                for i in 0..slots {
                    let avail = self.elements.pos_guard(i).and(pending);
                    if avail.is_false() {
                        continue;
                    }
                    let take = if i + 1 == slots {
                        avail
                    } else {
                        avail.and(Guard::new_var())
                    };
                    if !take.is_false() {
                        entries.push((i as i64, take));
                        pending = pending.and(take.not());
                    }
                }
                // Anything not taken falls back to the earliest position.
                for i in 0..slots {
                    let take = self.elements.pos_guard(i).and(pending);
                    if !take.is_false() {
                        entries.push((i as i64, take));
                        pending = pending.and(take.not());
                    }
                }
                PrimitiveVS::from_guarded(entries)
            }
        }
    }

    fn peeked_entry(&mut self) -> EngineResult<(MessageVS, PrimitiveVS<i64>)> {
        if let Some(entry) = &self.peeked {
            return Ok(entry.clone());
        }
        let pos = self.head_position();
        if pos.is_empty_vs() {
            return Err(EngineError::Internal(
                "peek on an empty event buffer".into(),
            ));
        }
        let head = self
            .elements
            .get(&pos)
            .map_err(|e| EngineError::Internal(format!("buffer peek failed: {}", e)))?;
        let entry = (head, pos);
        self.peeked = Some(entry.clone());
        Ok(entry)
    }

    /// The message that would be dequeued, restricted to `pc`.
    pub fn peek(&mut self, pc: Guard) -> EngineResult<MessageVS> {
        let (head, _) = self.peeked_entry()?;
        Ok(head.restrict(pc))
    }

    /// Remove and return the head message under `pc`. Contents are
    /// unchanged outside `pc`.
    pub fn dequeue(&mut self, pc: Guard) -> EngineResult<MessageVS> {
        let (head, pos) = self.peeked_entry()?;
        let pos = pos.restrict(pc);
        if !pos.is_empty_vs() {
            self.elements = self
                .elements
                .remove_at(&pos)
                .map_err(|e| EngineError::Internal(format!("buffer dequeue failed: {}", e)))?;
        }
        self.peeked = None;
        Ok(head.restrict(pc))
    }

    /// Apply a predicate to the head message, restricted to the head's
    /// universe.
    pub fn head_satisfies(
        &mut self,
        pred: impl FnOnce(&MessageVS) -> PrimitiveVS<bool>,
    ) -> EngineResult<PrimitiveVS<bool>> {
        let (head, _) = self.peeked_entry()?;
        Ok(pred(&head).restrict(head.universe()))
    }

    /// Buffer contents, for snapshots.
    pub fn elements(&self) -> &ListVS<MessageVS> {
        &self.elements
    }

    /// Replace contents from a snapshot.
    pub fn set_elements(&mut self, elements: ListVS<MessageVS>) {
        self.elements = elements;
        self.peeked = None;
    }

    pub fn clear(&mut self) {
        self.elements = ListVS::new(Guard::const_true());
        self.peeked = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_solver::SolverContext;
    use relay_values::{EventTag, MachineRef};
    use std::sync::Arc;

    fn msg(name: &str, gid: usize) -> MessageVS {
        MessageVS::new(
            PrimitiveVS::new(EventTag::new(name)),
            PrimitiveVS::new(MachineRef::new(gid, Arc::from("M"), 0)),
            None,
        )
    }

    #[test]
    fn test_queue_fifo_order() {
        SolverContext::reset();
        let mut b = EventBuffer::new(BufferSemantics::Queue);
        assert!(b.is_empty());
        b.enqueue(msg("A", 0));
        b.enqueue(msg("B", 0));
        assert!(b.enabled_cond().is_true());
        let first = b.dequeue(Guard::const_true()).unwrap();
        assert_eq!(first.event().guard_for(&EventTag::new("A")), Guard::const_true());
        let second = b.dequeue(Guard::const_true()).unwrap();
        assert_eq!(second.event().guard_for(&EventTag::new("B")), Guard::const_true());
        assert!(b.is_empty());
    }

    #[test]
    fn test_guarded_dequeue_keeps_rest() {
        SolverContext::reset();
        let g = Guard::new_var();
        let mut b = EventBuffer::new(BufferSemantics::Queue);
        b.enqueue(msg("A", 0));
        let got = b.dequeue(g).unwrap();
        assert_eq!(got.universe(), g);
        // Still enabled where not dequeued.
        assert_eq!(b.enabled_cond(), g.not());
    }

    #[test]
    fn test_bag_covers_whole_universe() {
        SolverContext::reset();
        let mut b = EventBuffer::new(BufferSemantics::Bag);
        b.enqueue(msg("A", 0));
        b.enqueue(msg("B", 0));
        let head = b.peek(Guard::const_true()).unwrap();
        // Every path dequeues something: the head universe is total.
        assert!(head.universe().is_true());
        let a = head.event().guard_for(&EventTag::new("A"));
        let c = head.event().guard_for(&EventTag::new("B"));
        assert!(a.or(c).is_true());
        assert!(a.and(c).is_false());
    }

    #[test]
    fn test_peek_is_stable_until_change() {
        SolverContext::reset();
        let mut b = EventBuffer::new(BufferSemantics::Bag);
        b.enqueue(msg("A", 0));
        b.enqueue(msg("B", 0));
        let h1 = b.peek(Guard::const_true()).unwrap();
        let h2 = b.peek(Guard::const_true()).unwrap();
        let eq = h1.symbolic_equals(&h2, Guard::const_true());
        assert!(eq.true_guard().is_true());
    }

    #[test]
    fn test_peek_empty_is_internal_error() {
        SolverContext::reset();
        let mut b = EventBuffer::new(BufferSemantics::Queue);
        assert!(matches!(
            b.peek(Guard::const_true()),
            Err(EngineError::Internal(_))
        ));
    }
}
