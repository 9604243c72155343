//! The schedule: choices made, backtrack frames, sleep sets, and the
//! machine-creation log.

use crate::machine::MachineSnapshot;
use relay_solver::Guard;
use relay_values::{MachineRef, PrimitiveVS, VsResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One recorded nondeterministic decision: the kind and the summary of
/// possible outcomes, enough for a replay to reconstruct it.
#[derive(Debug, Clone)]
pub enum ChoiceValue {
    Bool(PrimitiveVS<bool>),
    Int(PrimitiveVS<i64>),
    /// Element choices record the chosen index into the container.
    Element(PrimitiveVS<i64>),
    Sender(PrimitiveVS<MachineRef>),
}

impl ChoiceValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ChoiceValue::Bool(_) => "bool",
            ChoiceValue::Int(_) => "integer",
            ChoiceValue::Element(_) => "element",
            ChoiceValue::Sender(_) => "sender",
        }
    }
}

/// Snapshot of the source state at the beginning of a step: encoded
/// per-machine state plus the per-class instance counters.
#[derive(Debug, Clone)]
pub struct Frame {
    pub depth: usize,
    pub choice_depth: usize,
    /// `(arena index, encoded machine snapshot)`.
    pub machines: Vec<(usize, Vec<u8>)>,
    pub counters: Vec<(Arc<str>, PrimitiveVS<i64>)>,
}

impl Frame {
    /// Decode one machine's snapshot out of the frame.
    pub fn machine_snapshot(&self, gid: usize) -> Option<VsResult<MachineSnapshot>> {
        self.machines
            .iter()
            .find(|(g, _)| *g == gid)
            .map(|(_, bytes)| MachineSnapshot::decode(bytes))
    }
}

/// Linear record of the run: choices indexed by choice depth, backtrack
/// frames indexed by step depth, the creation log, and the sleep set.
#[derive(Debug)]
pub struct Schedule {
    choices: Vec<ChoiceValue>,
    frames: BTreeMap<usize, Frame>,
    /// `(class, handle, creation guard)` in allocation order.
    created: Vec<(Arc<str>, MachineRef, Guard)>,
    /// Clock fingerprint -> guard under which that clock is asleep.
    sleep: HashMap<u64, Guard>,
    use_sleep: bool,
}

impl Schedule {
    pub fn new(use_sleep: bool) -> Self {
        Self {
            choices: Vec::new(),
            frames: BTreeMap::new(),
            created: Vec::new(),
            sleep: HashMap::new(),
            use_sleep,
        }
    }

    pub fn size(&self) -> usize {
        self.choices.len()
    }

    /// Record a choice at the given depth, overwriting whatever a
    /// discarded future had recorded there.
    pub fn record(&mut self, choice_depth: usize, value: ChoiceValue) {
        if choice_depth < self.choices.len() {
            self.choices[choice_depth] = value;
            self.choices.truncate(choice_depth + 1);
        } else {
            self.choices.push(value);
        }
    }

    pub fn choice(&self, choice_depth: usize) -> Option<&ChoiceValue> {
        self.choices.get(choice_depth)
    }

    pub fn choices(&self) -> &[ChoiceValue] {
        &self.choices
    }

    pub fn has_frame(&self, depth: usize) -> bool {
        self.frames.contains_key(&depth)
    }

    /// Attach a frame for this depth unless one already exists.
    pub fn set_frame(&mut self, frame: Frame) {
        self.frames.entry(frame.depth).or_insert(frame);
    }

    pub fn frame(&self, depth: usize) -> Option<&Frame> {
        self.frames.get(&depth)
    }

    /// Drop frames at or beyond `depth` (a discarded future).
    pub fn drop_frames_from(&mut self, depth: usize) {
        self.frames.split_off(&depth);
    }

    pub fn make_machine(&mut self, class: Arc<str>, mref: MachineRef, guard: Guard) {
        self.created.push((class, mref, guard));
    }

    /// The `n`th machine created of a class, for replay validation.
    pub fn created_machine(&self, class: &str, n: usize) -> Option<&MachineRef> {
        self.created
            .iter()
            .filter(|(c, _, _)| &**c == class)
            .nth(n)
            .map(|(_, m, _)| m)
    }

    pub fn created_machines(&self) -> &[(Arc<str>, MachineRef, Guard)] {
        &self.created
    }

    // -- sleep sets --

    /// Guard under which the given clock is asleep (false when sleep sets
    /// are off or the clock is unknown).
    pub fn sleep_guard(&self, clock_fp: u64) -> Guard {
        if !self.use_sleep {
            return Guard::const_false();
        }
        self.sleep
            .get(&clock_fp)
            .copied()
            .unwrap_or_else(Guard::const_false)
    }

    /// Put a clock to sleep under `guard` (in addition to wherever it
    /// already sleeps).
    pub fn block(&mut self, clock_fp: u64, guard: Guard) {
        if !self.use_sleep || guard.is_false() {
            return;
        }
        let slot = self
            .sleep
            .entry(clock_fp)
            .or_insert_with(Guard::const_false);
        *slot = slot.or(guard);
    }

    /// Wake a clock everywhere: a dependent action invalidated the sleep
    /// entry.
    pub fn unblock(&mut self, clock_fp: u64) {
        if !self.use_sleep {
            return;
        }
        self.sleep.remove(&clock_fp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_solver::SolverContext;

    #[test]
    fn test_record_overwrites_discarded_future() {
        SolverContext::reset();
        let mut s = Schedule::new(false);
        s.record(0, ChoiceValue::Bool(PrimitiveVS::new(true)));
        s.record(1, ChoiceValue::Int(PrimitiveVS::new(3)));
        assert_eq!(s.size(), 2);
        s.record(0, ChoiceValue::Bool(PrimitiveVS::new(false)));
        // The stale depth-1 entry belongs to a discarded future.
        assert_eq!(s.size(), 1);
        assert!(matches!(s.choice(0), Some(ChoiceValue::Bool(_))));
    }

    #[test]
    fn test_frame_insert_once() {
        SolverContext::reset();
        let mut s = Schedule::new(false);
        let frame = Frame {
            depth: 2,
            choice_depth: 5,
            machines: vec![],
            counters: vec![],
        };
        s.set_frame(frame.clone());
        s.set_frame(Frame {
            choice_depth: 9,
            ..frame
        });
        assert_eq!(s.frame(2).unwrap().choice_depth, 5);
        s.drop_frames_from(2);
        assert!(s.frame(2).is_none());
    }

    #[test]
    fn test_sleep_guard_accumulates() {
        SolverContext::reset();
        let g = Guard::new_var();
        let h = Guard::new_var();
        let mut s = Schedule::new(true);
        assert!(s.sleep_guard(7).is_false());
        s.block(7, g);
        s.block(7, h);
        assert_eq!(s.sleep_guard(7), g.or(h));
        s.unblock(7);
        assert!(s.sleep_guard(7).is_false());
    }

    #[test]
    fn test_sleep_disabled_is_inert() {
        SolverContext::reset();
        let g = Guard::new_var();
        let mut s = Schedule::new(false);
        s.block(7, g);
        assert!(s.sleep_guard(7).is_false());
    }

    #[test]
    fn test_created_machine_lookup() {
        SolverContext::reset();
        let mut s = Schedule::new(false);
        let a = MachineRef::new(0, Arc::from("A"), 0);
        let b = MachineRef::new(1, Arc::from("B"), 0);
        let a1 = MachineRef::new(2, Arc::from("A"), 1);
        s.make_machine(Arc::from("A"), a.clone(), Guard::const_true());
        s.make_machine(Arc::from("B"), b.clone(), Guard::const_true());
        s.make_machine(Arc::from("A"), a1.clone(), Guard::const_true());
        assert_eq!(s.created_machine("A", 0), Some(&a));
        assert_eq!(s.created_machine("A", 1), Some(&a1));
        assert_eq!(s.created_machine("B", 1), None);
    }
}
