//! Set value summaries.

use crate::list::ListVS;
use crate::primitive::PrimitiveVS;
use crate::{ValueSummary, VsResult};
use relay_solver::Guard;

/// A list summary with the invariant that no element is a duplicate of an
/// earlier one under any guard: `add` only takes effect where the element
/// is absent.
#[derive(Clone, Debug)]
pub struct SetVS<T> {
    elements: ListVS<T>,
}

impl<T: ValueSummary> SetVS<T> {
    pub fn new(universe: Guard) -> Self {
        Self {
            elements: ListVS::new(universe),
        }
    }

    pub(crate) fn from_list(elements: ListVS<T>) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &ListVS<T> {
        &self.elements
    }

    pub fn size(&self) -> &PrimitiveVS<i64> {
        self.elements.size()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Universe under which the set is nonempty.
    pub fn non_empty_universe(&self) -> Guard {
        self.elements.non_empty_universe()
    }

    pub fn contains(&self, item: &T) -> PrimitiveVS<bool> {
        self.elements.contains(item)
    }

    /// Add `item` under the guard where it is absent; the set is unchanged
    /// elsewhere, so adding twice is the same as adding once.
    pub fn add(&self, item: &T) -> Self {
        let absent = self.contains(&item.restrict(self.universe())).false_guard();
        Self {
            elements: self
                .elements
                .update_under_guard(absent, &self.elements.add(item)),
        }
    }

    /// Remove `item` where present; no-op elsewhere.
    pub fn remove(&self, item: &T) -> Self {
        let idx = self.elements.index_of(item);
        let idx = idx.restrict(self.elements.in_range(&idx).true_guard());
        if idx.is_empty_vs() {
            return self.clone();
        }
        match self.elements.remove_at(&idx) {
            Ok(elements) => Self { elements },
            // The index was restricted in range above.
            Err(_) => self.clone(),
        }
    }

    /// Get the element at `index` (the iteration surface for choices).
    pub fn get(&self, index: &PrimitiveVS<i64>) -> VsResult<T> {
        self.elements.get(index)
    }
}

impl<T: ValueSummary> ValueSummary for SetVS<T> {
    fn is_empty_vs(&self) -> bool {
        self.elements.is_empty_vs()
    }

    fn universe(&self) -> Guard {
        self.elements.universe()
    }

    fn restrict(&self, guard: Guard) -> Self {
        Self {
            elements: self.elements.restrict(guard),
        }
    }

    fn merge(&self, others: &[Self]) -> Self {
        let lists: Vec<_> = others.iter().map(|o| o.elements.clone()).collect();
        Self {
            elements: self.elements.merge(&lists),
        }
    }

    /// Order-insensitive equality: each side's elements must be contained
    /// in the other under the guard where they are in range.
    fn symbolic_equals(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        let u = pc.and(self.universe()).and(other.universe());
        let mut acc = self
            .elements
            .size()
            .symbolic_equals(other.elements.size(), u)
            .true_guard();
        for (set, cmp) in [(self, other), (other, self)] {
            for (i, it) in set.elements.items().iter().enumerate() {
                if acc.is_false() {
                    break;
                }
                let within = set.elements.pos_guard(i);
                if within.is_false() {
                    continue;
                }
                let present = cmp.contains(&it.restrict(within)).true_guard();
                acc = acc.and(present.or(within.not()));
            }
        }
        PrimitiveVS::from_guarded([(true, acc.and(u)), (false, u.and(acc.not()))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_solver::SolverContext;

    fn int(n: i64) -> PrimitiveVS<i64> {
        PrimitiveVS::new(n)
    }

    #[test]
    fn test_add_is_idempotent() {
        SolverContext::reset();
        let s = SetVS::new(Guard::const_true()).add(&int(1));
        let twice = s.add(&int(1));
        assert_eq!(twice.size().max_value(), Some(1));
        let eq = s.symbolic_equals(&twice, Guard::const_true());
        assert!(eq.true_guard().is_true());
    }

    #[test]
    fn test_contains_after_add() {
        SolverContext::reset();
        let s = SetVS::new(Guard::const_true()).add(&int(1)).add(&int(2));
        assert!(s.contains(&int(1)).true_guard().is_true());
        assert!(s.contains(&int(3)).true_guard().is_false());
        assert_eq!(s.size().max_value(), Some(2));
    }

    #[test]
    fn test_remove() {
        SolverContext::reset();
        let s = SetVS::new(Guard::const_true()).add(&int(1)).add(&int(2));
        let s = s.remove(&int(1));
        assert!(s.contains(&int(1)).true_guard().is_false());
        assert!(s.contains(&int(2)).true_guard().is_true());
        // Removing an absent element is a no-op.
        let same = s.remove(&int(7));
        assert_eq!(same.size().max_value(), Some(1));
    }

    #[test]
    fn test_guarded_add_keeps_universe() {
        SolverContext::reset();
        let g = Guard::new_var();
        let s = SetVS::new(Guard::const_true()).add(&int(1).restrict(g));
        assert!(s.universe().is_true());
        assert_eq!(s.contains(&int(1)).true_guard(), g);
        assert_eq!(s.size().guard_for(&0), g.not());
    }

    #[test]
    fn test_unordered_equality() {
        SolverContext::reset();
        let a = SetVS::new(Guard::const_true()).add(&int(1)).add(&int(2));
        let b = SetVS::new(Guard::const_true()).add(&int(2)).add(&int(1));
        let eq = a.symbolic_equals(&b, Guard::const_true());
        assert!(eq.true_guard().is_true());
    }
}
