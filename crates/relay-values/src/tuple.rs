//! Tuple value summaries.

use crate::primitive::PrimitiveVS;
use crate::value::Vs;
use crate::{ValueSummary, VsError, VsResult};
use relay_solver::Guard;

/// Fixed-arity product whose fields all share one universe. Construction
/// restricts every field to the intersection of the field universes.
#[derive(Clone, Debug)]
pub struct TupleVS {
    universe: Guard,
    fields: Vec<Vs>,
}

impl TupleVS {
    pub fn new(fields: Vec<Vs>) -> Self {
        let universe = fields
            .iter()
            .fold(Guard::const_true(), |u, f| u.and(f.universe()));
        let fields = fields.iter().map(|f| f.restrict(universe)).collect();
        Self { universe, fields }
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> VsResult<&Vs> {
        self.fields.get(index).ok_or(VsError::TupleIndex {
            index,
            arity: self.fields.len(),
        })
    }

    /// A copy with field `index` replaced (restricted to the shared
    /// universe).
    pub fn with_field(&self, index: usize, value: &Vs) -> VsResult<Self> {
        if index >= self.fields.len() {
            return Err(VsError::TupleIndex {
                index,
                arity: self.fields.len(),
            });
        }
        let mut fields = self.fields.clone();
        fields[index] = value.restrict(self.universe);
        Ok(Self {
            universe: self.universe,
            fields,
        })
    }

    pub fn fields(&self) -> &[Vs] {
        &self.fields
    }
}

impl ValueSummary for TupleVS {
    fn is_empty_vs(&self) -> bool {
        self.universe.is_false()
    }

    fn universe(&self) -> Guard {
        self.universe
    }

    fn restrict(&self, guard: Guard) -> Self {
        if guard.is_true() {
            return self.clone();
        }
        Self {
            universe: self.universe.and(guard),
            fields: self.fields.iter().map(|f| f.restrict(guard)).collect(),
        }
    }

    fn merge(&self, others: &[Self]) -> Self {
        let mut universe = self.universe;
        let mut fields = self.fields.clone();
        for other in others {
            universe = universe.or(other.universe);
            for (mine, theirs) in fields.iter_mut().zip(&other.fields) {
                *mine = mine.merge_with(theirs);
            }
        }
        Self { universe, fields }
    }

    fn symbolic_equals(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        let u = pc.and(self.universe).and(other.universe);
        let mut acc = if self.fields.len() == other.fields.len() {
            Guard::const_true()
        } else {
            Guard::const_false()
        };
        for (a, b) in self.fields.iter().zip(&other.fields) {
            if acc.is_false() {
                break;
            }
            acc = acc.and(a.symbolic_equals(b, u).true_guard().or(u.not()));
        }
        PrimitiveVS::from_guarded([(true, acc.and(u)), (false, u.and(acc.not()))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_solver::SolverContext;

    #[test]
    fn test_shared_universe() {
        SolverContext::reset();
        let g = Guard::new_var();
        let t = TupleVS::new(vec![Vs::int(1).restrict(g), Vs::bool_vs(true)]);
        assert_eq!(t.universe(), g);
        assert_eq!(t.field(0).unwrap().universe(), g);
        assert_eq!(t.field(1).unwrap().universe(), g);
    }

    #[test]
    fn test_field_access_and_update() {
        SolverContext::reset();
        let t = TupleVS::new(vec![Vs::int(1), Vs::int(2)]);
        assert_eq!(t.arity(), 2);
        let t = t.with_field(1, &Vs::int(9)).unwrap();
        assert_eq!(t.field(1).unwrap().as_int().unwrap(), &PrimitiveVS::new(9));
        assert!(matches!(
            t.field(5),
            Err(VsError::TupleIndex { index: 5, arity: 2 })
        ));
    }

    #[test]
    fn test_symbolic_equals() {
        SolverContext::reset();
        let a = TupleVS::new(vec![Vs::int(1), Vs::int(2)]);
        let b = TupleVS::new(vec![Vs::int(1), Vs::int(2)]);
        let c = TupleVS::new(vec![Vs::int(1), Vs::int(3)]);
        assert!(a
            .symbolic_equals(&b, Guard::const_true())
            .true_guard()
            .is_true());
        assert!(a
            .symbolic_equals(&c, Guard::const_true())
            .true_guard()
            .is_false());
    }
}
