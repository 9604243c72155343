//! Vector clocks as value summaries.

use crate::ids::MachineRef;
use crate::map::MapVS;
use crate::primitive::PrimitiveVS;
use crate::{ValueSummary, VsResult};
use relay_solver::Guard;

/// A machine-indexed clock map. Absent components read as zero, so the
/// empty clock is the bottom of the partial order.
#[derive(Clone, Debug)]
pub struct VectorClockVS {
    clocks: MapVS<MachineRef, PrimitiveVS<i64>>,
}

impl VectorClockVS {
    pub fn new() -> Self {
        Self {
            clocks: MapVS::new(Guard::const_true()),
        }
    }

    pub(crate) fn from_map(clocks: MapVS<MachineRef, PrimitiveVS<i64>>) -> Self {
        Self { clocks }
    }

    pub(crate) fn map(&self) -> &MapVS<MachineRef, PrimitiveVS<i64>> {
        &self.clocks
    }

    /// Component for `key`, defaulting to zero where the key is absent.
    pub fn value_of(&self, key: &PrimitiveVS<MachineRef>) -> PrimitiveVS<i64> {
        let present = self.clocks.contains_key(key).true_guard();
        let absent = key.universe().and(present.not());
        let mut out = PrimitiveVS::new(0).restrict(absent);
        if !present.is_false() {
            if let Ok(v) = self.clocks.get(&key.restrict(present)) {
                out = out.merge_with(&v);
            }
        }
        out
    }

    /// Bump the component of `machine` by one under `pc`.
    pub fn increment(&self, machine: &MachineRef, pc: Guard) -> Self {
        let key = PrimitiveVS::new(machine.clone()).restrict(pc);
        let next = self.value_of(&key).add_i64(1);
        Self {
            clocks: self.clocks.put(&key, &next),
        }
    }

    /// Componentwise `<=` over the union of both key sets (absent reads
    /// zero).
    pub fn less_eq(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        // Components absent on our side read zero, which is below
        // everything, so only our keys need checking.
        let mut acc = pc;
        for (i, key_slot) in self.clocks.keys().items().iter().enumerate() {
            if acc.is_false() {
                break;
            }
            let within = self.clocks.keys().pos_guard(i);
            if within.is_false() {
                continue;
            }
            let mine = match self.clocks.values().items().get(i) {
                Some(v) => v.restrict(within),
                None => continue,
            };
            let theirs = other.value_of(&key_slot.restrict(within));
            let le = mine.less_eq(&theirs).true_guard();
            acc = acc.and(le.or(within.not()));
        }
        PrimitiveVS::from_guarded([(true, acc), (false, pc.and(acc.not()))])
    }

    /// Strict happens-before: `<=` holds and the reverse `<=` does not.
    /// Incomparable clocks are ordered by neither side.
    pub fn less_than(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        let le = self.less_eq(other, pc).true_guard();
        let ge = other.less_eq(self, pc).true_guard();
        let lt = le.and(ge.not());
        PrimitiveVS::from_guarded([(true, lt), (false, pc.and(lt.not()))])
    }

    pub(crate) fn decode_parts(
        clocks: MapVS<MachineRef, PrimitiveVS<i64>>,
    ) -> VsResult<Self> {
        Ok(Self { clocks })
    }
}

impl Default for VectorClockVS {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueSummary for VectorClockVS {
    fn is_empty_vs(&self) -> bool {
        self.clocks.is_empty_vs()
    }

    fn universe(&self) -> Guard {
        self.clocks.universe()
    }

    fn restrict(&self, guard: Guard) -> Self {
        Self {
            clocks: self.clocks.restrict(guard),
        }
    }

    fn merge(&self, others: &[Self]) -> Self {
        let maps: Vec<_> = others.iter().map(|o| o.clocks.clone()).collect();
        Self {
            clocks: self.clocks.merge(&maps),
        }
    }

    fn symbolic_equals(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        self.clocks.symbolic_equals(&other.clocks, pc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_solver::SolverContext;
    use std::sync::Arc;

    fn mref(gid: usize) -> MachineRef {
        MachineRef::new(gid, Arc::from("M"), gid as u64)
    }

    #[test]
    fn test_absent_reads_zero() {
        SolverContext::reset();
        let c = VectorClockVS::new();
        let v = c.value_of(&PrimitiveVS::new(mref(0)));
        assert_eq!(v, PrimitiveVS::new(0));
    }

    #[test]
    fn test_increment() {
        SolverContext::reset();
        let c = VectorClockVS::new()
            .increment(&mref(0), Guard::const_true())
            .increment(&mref(0), Guard::const_true());
        let v = c.value_of(&PrimitiveVS::new(mref(0)));
        assert_eq!(v, PrimitiveVS::new(2));
        let other = c.value_of(&PrimitiveVS::new(mref(1)));
        assert_eq!(other, PrimitiveVS::new(0));
    }

    #[test]
    fn test_happens_before() {
        SolverContext::reset();
        let a = VectorClockVS::new().increment(&mref(0), Guard::const_true());
        let b = a.increment(&mref(0), Guard::const_true());
        assert!(a
            .less_than(&b, Guard::const_true())
            .true_guard()
            .is_true());
        assert!(b
            .less_than(&a, Guard::const_true())
            .true_guard()
            .is_false());
        // Not strictly before itself.
        assert!(a
            .less_than(&a, Guard::const_true())
            .true_guard()
            .is_false());
    }

    #[test]
    fn test_incomparable_clocks() {
        SolverContext::reset();
        let a = VectorClockVS::new().increment(&mref(0), Guard::const_true());
        let b = VectorClockVS::new().increment(&mref(1), Guard::const_true());
        assert!(a
            .less_than(&b, Guard::const_true())
            .true_guard()
            .is_false());
        assert!(b
            .less_than(&a, Guard::const_true())
            .true_guard()
            .is_false());
    }

    #[test]
    fn test_guarded_increment() {
        SolverContext::reset();
        let g = Guard::new_var();
        let c = VectorClockVS::new().increment(&mref(0), g);
        let v = c.value_of(&PrimitiveVS::new(mref(0)));
        assert_eq!(v.guard_for(&1), g);
        assert_eq!(v.guard_for(&0), g.not());
    }
}
