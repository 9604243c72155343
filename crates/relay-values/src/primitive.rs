//! Primitive value summaries over concrete scalars.

use crate::{GuardedValue, ValueSummary};
use relay_solver::Guard;
use smallvec::SmallVec;
use std::fmt;
use std::hash::Hash;

/// Requirements on the scalar payload of a [`PrimitiveVS`].
pub trait PrimValue: Clone + Eq + Hash + fmt::Debug {}
impl<T: Clone + Eq + Hash + fmt::Debug> PrimValue for T {}

/// A guarded disjunction of concrete scalars. This is the hot variant:
/// machine handles, event tags, state handles, booleans and integers all
/// flow through it, so entries live inline for the common one-or-two-entry
/// case and all operations are statically dispatched.
#[derive(Clone)]
pub struct PrimitiveVS<T> {
    entries: SmallVec<[GuardedValue<T>; 2]>,
}

impl<T: PrimValue> PrimitiveVS<T> {
    /// A summary holding `value` under the true guard.
    pub fn new(value: T) -> Self {
        Self {
            entries: smallvec::smallvec![GuardedValue::new(Guard::const_true(), value)],
        }
    }

    /// The empty summary (universe false).
    pub fn empty() -> Self {
        Self {
            entries: SmallVec::new(),
        }
    }

    /// Build from `(value, guard)` pairs, canonicalizing as entries arrive.
    /// False-guarded pairs are dropped; equal values are merged under the
    /// disjunction of their guards.
    pub fn from_guarded(pairs: impl IntoIterator<Item = (T, Guard)>) -> Self {
        let mut out = Self::empty();
        for (value, guard) in pairs {
            out.push_entry(value, guard);
        }
        out
    }

    fn push_entry(&mut self, value: T, guard: Guard) {
        if guard.is_false() {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.value == value) {
            entry.guard = entry.guard.or(guard);
        } else {
            self.entries.push(GuardedValue::new(guard, value));
        }
    }

    /// Entries in stable insertion order.
    pub fn guarded_values(&self) -> &[GuardedValue<T>] {
        &self.entries
    }

    /// The guard under which this summary equals `value` (false if absent).
    pub fn guard_for(&self, value: &T) -> Guard {
        self.entries
            .iter()
            .filter(|e| e.value == *value)
            .fold(Guard::const_false(), |g, e| g.or(e.guard))
    }

    /// Apply a unary function to every entry, canonicalizing the result.
    pub fn map<U: PrimValue>(&self, f: impl Fn(&T) -> U) -> PrimitiveVS<U> {
        PrimitiveVS::from_guarded(self.entries.iter().map(|e| (f(&e.value), e.guard)))
    }

    /// Apply a binary function pairwise under the conjunction of entry
    /// guards; the result's universe is the intersection of both universes.
    pub fn map2<U: PrimValue, V: PrimValue>(
        &self,
        other: &PrimitiveVS<U>,
        f: impl Fn(&T, &U) -> V,
    ) -> PrimitiveVS<V> {
        let mut out = PrimitiveVS::empty();
        for a in &self.entries {
            for b in &other.entries {
                let guard = a.guard.and(b.guard);
                if !guard.is_false() {
                    out.push_entry(f(&a.value, &b.value), guard);
                }
            }
        }
        out
    }

    #[cfg(debug_assertions)]
    fn debug_check_disjoint(&self) {
        for (i, a) in self.entries.iter().enumerate() {
            for b in self.entries.iter().skip(i + 1) {
                debug_assert!(
                    a.guard.and(b.guard).is_false(),
                    "overlapping guards in primitive summary: {:?} / {:?}",
                    a.value,
                    b.value
                );
            }
        }
    }
}

impl<T: PrimValue> ValueSummary for PrimitiveVS<T> {
    fn is_empty_vs(&self) -> bool {
        self.entries.is_empty()
    }

    fn universe(&self) -> Guard {
        self.entries
            .iter()
            .fold(Guard::const_false(), |g, e| g.or(e.guard))
    }

    fn restrict(&self, guard: Guard) -> Self {
        if guard.is_true() {
            return self.clone();
        }
        let mut out = Self::empty();
        for e in &self.entries {
            let g = e.guard.and(guard);
            if !g.is_false() {
                out.entries.push(GuardedValue::new(g, e.value.clone()));
            }
        }
        out
    }

    fn merge(&self, others: &[Self]) -> Self {
        let mut out = self.clone();
        for other in others {
            for e in &other.entries {
                out.push_entry(e.value.clone(), e.guard);
            }
        }
        #[cfg(debug_assertions)]
        out.debug_check_disjoint();
        out
    }

    fn symbolic_equals(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        self.map2(other, |a, b| a == b).restrict(pc)
    }
}

/// Equality of canonical forms: same guard for every value. Guard handles
/// are canonical in the default engine, so this is semantic equality.
impl<T: PrimValue> PartialEq for PrimitiveVS<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entries
            .iter()
            .all(|e| other.guard_for(&e.value) == e.guard)
            && other
                .entries
                .iter()
                .all(|e| self.guard_for(&e.value) == e.guard)
    }
}

impl<T: PrimValue> Eq for PrimitiveVS<T> {}

impl<T: PrimValue> fmt::Debug for PrimitiveVS<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VS[")?;
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?} @ {}", e.value, e.guard)?;
        }
        write!(f, "]")
    }
}

impl PrimitiveVS<bool> {
    /// A summary that is true under `guard` and undefined elsewhere.
    pub fn true_under(guard: Guard) -> Self {
        Self::from_guarded([(true, guard)])
    }

    pub fn true_guard(&self) -> Guard {
        self.guard_for(&true)
    }

    pub fn false_guard(&self) -> Guard {
        self.guard_for(&false)
    }

    pub fn is_ever_true(&self) -> bool {
        self.true_guard().is_sat()
    }

    pub fn is_ever_false(&self) -> bool {
        self.false_guard().is_sat()
    }

    pub fn and_vs(&self, other: &Self) -> Self {
        self.map2(other, |a, b| *a && *b)
    }

    pub fn or_vs(&self, other: &Self) -> Self {
        self.map2(other, |a, b| *a || *b)
    }

    pub fn not_vs(&self) -> Self {
        self.map(|b| !b)
    }
}

impl PrimitiveVS<i64> {
    pub fn add(&self, other: &Self) -> Self {
        self.map2(other, |a, b| a + b)
    }

    pub fn add_i64(&self, n: i64) -> Self {
        self.map(|a| a + n)
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.map2(other, |a, b| a - b)
    }

    pub fn less_than(&self, other: &Self) -> PrimitiveVS<bool> {
        self.map2(other, |a, b| a < b)
    }

    pub fn less_eq(&self, other: &Self) -> PrimitiveVS<bool> {
        self.map2(other, |a, b| a <= b)
    }

    pub fn equal_to(&self, other: &Self) -> PrimitiveVS<bool> {
        self.symbolic_equals(other, Guard::const_true())
    }

    /// Largest value across entries, ignoring guards. None when empty.
    pub fn max_value(&self) -> Option<i64> {
        self.entries.iter().map(|e| e.value).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_solver::SolverContext;

    #[test]
    fn test_new_and_universe() {
        SolverContext::reset();
        let v = PrimitiveVS::new(42i64);
        assert!(v.universe().is_true());
        assert!(!v.is_empty_vs());
        assert!(PrimitiveVS::<i64>::empty().is_empty_vs());
    }

    #[test]
    fn test_restrict_true_is_identity() {
        SolverContext::reset();
        let g = Guard::new_var();
        let v = PrimitiveVS::from_guarded([(1i64, g), (2, g.not())]);
        assert_eq!(v.restrict(Guard::const_true()), v);
        assert!(v.restrict(Guard::const_false()).is_empty_vs());
    }

    #[test]
    fn test_restrict_composes() {
        SolverContext::reset();
        let g = Guard::new_var();
        let h = Guard::new_var();
        let v = PrimitiveVS::from_guarded([(1i64, g), (2, g.not())]);
        assert_eq!(v.restrict(g).restrict(h), v.restrict(g.and(h)));
    }

    #[test]
    fn test_split_and_merge_round_trip() {
        SolverContext::reset();
        let g = Guard::new_var();
        let h = Guard::new_var();
        let v = PrimitiveVS::from_guarded([(1i64, h), (2, h.not())]);
        let rejoined = v.restrict(g).merge_with(&v.restrict(g.not()));
        assert_eq!(rejoined, v);
    }

    #[test]
    fn test_update_under_guard() {
        SolverContext::reset();
        let g = Guard::new_var();
        let a = PrimitiveVS::new(1i64);
        let b = PrimitiveVS::new(2i64);
        let updated = a.update_under_guard(g, &b);
        assert_eq!(updated.guard_for(&2), g);
        assert_eq!(updated.guard_for(&1), g.not());
        assert_eq!(
            updated,
            a.restrict(g.not()).merge_with(&b.restrict(g))
        );
    }

    #[test]
    fn test_merge_canonicalizes_equal_values() {
        SolverContext::reset();
        let g = Guard::new_var();
        let a = PrimitiveVS::from_guarded([(7i64, g)]);
        let b = PrimitiveVS::from_guarded([(7i64, g.not())]);
        let merged = a.merge_with(&b);
        assert_eq!(merged.guarded_values().len(), 1);
        assert!(merged.guard_for(&7).is_true());
    }

    #[test]
    fn test_symbolic_equals_reflexive() {
        SolverContext::reset();
        let g = Guard::new_var();
        let v = PrimitiveVS::from_guarded([(1i64, g), (2, g.not())]);
        let eq = v.symbolic_equals(&v, Guard::const_true());
        assert_eq!(eq.true_guard(), v.universe());
        assert!(eq.false_guard().is_false());
    }

    #[test]
    fn test_symbolic_equals_mixed() {
        SolverContext::reset();
        let g = Guard::new_var();
        let a = PrimitiveVS::from_guarded([(1i64, g), (2, g.not())]);
        let b = PrimitiveVS::new(1i64);
        let eq = a.symbolic_equals(&b, Guard::const_true());
        assert_eq!(eq.true_guard(), g);
        assert_eq!(eq.false_guard(), g.not());
    }

    #[test]
    fn test_integer_ops() {
        SolverContext::reset();
        let g = Guard::new_var();
        let bound = PrimitiveVS::from_guarded([(3i64, g), (1, g.not())]);
        assert_eq!(bound.max_value(), Some(3));
        let two = PrimitiveVS::new(2i64);
        let lt = two.less_than(&bound);
        assert_eq!(lt.true_guard(), g);
        assert_eq!(bound.add_i64(1).max_value(), Some(4));
    }

    #[test]
    fn test_boolean_ops() {
        SolverContext::reset();
        let g = Guard::new_var();
        let t = PrimitiveVS::true_under(g);
        assert_eq!(t.true_guard(), g);
        assert!(t.false_guard().is_false());
        let full = PrimitiveVS::from_guarded([(true, g), (false, g.not())]);
        assert_eq!(full.not_vs().true_guard(), g.not());
        assert_eq!(full.and_vs(&full), full);
    }
}
