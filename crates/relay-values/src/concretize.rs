//! Concretization: extracting single concrete valuations from summaries.
//!
//! State caching and the transition statistics both need to walk the
//! concrete states inside a symbolic one. The loop is always the same:
//! pick one satisfying entry per summary, conjoining guards as you go,
//! then exclude that assignment's guard and repeat until the path
//! condition is exhausted.

use crate::ids::{EventTag, Key, MachineRef, StateRef};
use crate::list::ListVS;
use crate::map::MapVS;
use crate::primitive::{PrimValue, PrimitiveVS};
use crate::union::UnionTag;
use crate::value::Vs;
use crate::{GuardedValue, ValueSummary};
use relay_solver::Guard;
use std::hash::{Hash, Hasher};

/// One concrete valuation of a summary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Concrete {
    Bool(bool),
    Int(i64),
    Event(EventTag),
    Machine(MachineRef),
    State(StateRef),
    List(Vec<Concrete>),
    Set(Vec<Concrete>),
    Map(Vec<(Key, Concrete)>),
    Tuple(Vec<Concrete>),
    Union(UnionTag, Option<Box<Concrete>>),
}

fn pick_prim<T: PrimValue>(vs: &PrimitiveVS<T>, pc: Guard) -> Option<GuardedValue<T>> {
    for e in vs.guarded_values() {
        let g = e.guard.and(pc);
        if g.is_sat() {
            return Some(GuardedValue::new(g, e.value.clone()));
        }
    }
    None
}

fn pick_list(list: &ListVS<Vs>, pc: Guard) -> Option<GuardedValue<Vec<Concrete>>> {
    let size = pick_prim(list.size(), pc)?;
    let mut acc = size.guard;
    let mut out = Vec::with_capacity(size.value.max(0) as usize);
    for i in 0..size.value.max(0) as usize {
        let elem = concretize(list.items().get(i)?, acc)?;
        acc = elem.guard;
        out.push(elem.value);
    }
    Some(GuardedValue::new(acc, out))
}

fn pick_map(map: &MapVS<Key, Vs>, pc: Guard) -> Option<GuardedValue<Vec<(Key, Concrete)>>> {
    let size = pick_prim(map.keys().size(), pc)?;
    let mut acc = size.guard;
    let mut out = Vec::with_capacity(size.value.max(0) as usize);
    for i in 0..size.value.max(0) as usize {
        let key = pick_prim(map.keys().items().get(i)?, acc)?;
        acc = key.guard;
        let value = concretize(map.values().items().get(i)?, acc)?;
        acc = value.guard;
        out.push((key.value, value.value));
    }
    Some(GuardedValue::new(acc, out))
}

/// Pick one concrete value of `vs` under `pc`. The returned guard is the
/// (satisfiable) condition selecting exactly that value; `None` when the
/// summary is empty under `pc`.
pub fn concretize(vs: &Vs, pc: Guard) -> Option<GuardedValue<Concrete>> {
    if !pc.is_sat() {
        return None;
    }
    match vs {
        Vs::Bool(v) => pick_prim(v, pc).map(|g| GuardedValue::new(g.guard, Concrete::Bool(g.value))),
        Vs::Int(v) => pick_prim(v, pc).map(|g| GuardedValue::new(g.guard, Concrete::Int(g.value))),
        Vs::Event(v) => {
            pick_prim(v, pc).map(|g| GuardedValue::new(g.guard, Concrete::Event(g.value)))
        }
        Vs::Machine(v) => {
            pick_prim(v, pc).map(|g| GuardedValue::new(g.guard, Concrete::Machine(g.value)))
        }
        Vs::State(v) => {
            pick_prim(v, pc).map(|g| GuardedValue::new(g.guard, Concrete::State(g.value)))
        }
        Vs::List(l) => pick_list(l, pc).map(|g| GuardedValue::new(g.guard, Concrete::List(g.value))),
        Vs::Set(s) => {
            pick_list(s.elements(), pc).map(|g| GuardedValue::new(g.guard, Concrete::Set(g.value)))
        }
        Vs::Map(m) => pick_map(m, pc).map(|g| GuardedValue::new(g.guard, Concrete::Map(g.value))),
        Vs::Tuple(t) => {
            let mut acc = pc.and(t.universe());
            if !acc.is_sat() {
                return None;
            }
            let mut out = Vec::with_capacity(t.arity());
            for f in t.fields() {
                let c = concretize(f, acc)?;
                acc = c.guard;
                out.push(c.value);
            }
            Some(GuardedValue::new(acc, Concrete::Tuple(out)))
        }
        Vs::Union(u) => {
            let tag = pick_prim(u.tag(), pc)?;
            match u.payload(&tag.value) {
                Ok(p) if !p.is_empty_vs() => {
                    let c = concretize(&p, tag.guard)?;
                    Some(GuardedValue::new(
                        c.guard,
                        Concrete::Union(tag.value, Some(Box::new(c.value))),
                    ))
                }
                _ => Some(GuardedValue::new(
                    tag.guard,
                    Concrete::Union(tag.value, None),
                )),
            }
        }
    }
}

/// Count the concrete joint valuations of `parts` under `pc` by picking,
/// excluding, and repeating until no assignment remains.
pub fn count_assignments(pc: Guard, parts: &[Vs]) -> usize {
    let mut count = 0;
    let mut seen = Guard::const_false();
    loop {
        let iter_pc = pc.and(seen.not());
        if !iter_pc.is_sat() {
            return count;
        }
        let mut acc = iter_pc;
        let mut progressed = false;
        for p in parts {
            if let Some(gv) = concretize(p, acc) {
                acc = gv.guard;
                progressed = true;
            }
        }
        if !progressed {
            return count;
        }
        count += 1;
        seen = seen.or(acc);
    }
}

/// Hash of a concrete global state, for the distinct-state table.
pub fn fingerprint(state: &[Vec<Concrete>]) -> u64 {
    let mut hasher = ahash::AHasher::default();
    for machine in state {
        machine.len().hash(&mut hasher);
        for value in machine {
            value.hash(&mut hasher);
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_solver::SolverContext;

    #[test]
    fn test_concretize_prim_picks_one() {
        SolverContext::reset();
        let g = Guard::new_var();
        let v = Vs::Int(PrimitiveVS::from_guarded([(1i64, g), (2, g.not())]));
        let c = concretize(&v, Guard::const_true()).unwrap();
        match c.value {
            Concrete::Int(1) => assert_eq!(c.guard, g),
            Concrete::Int(2) => assert_eq!(c.guard, g.not()),
            other => panic!("unexpected pick: {:?}", other),
        }
        // Excluding the picked guard yields the other value.
        let c2 = concretize(&v, c.guard.not()).unwrap();
        assert_ne!(c.value, c2.value);
    }

    #[test]
    fn test_count_assignments_prim() {
        SolverContext::reset();
        let g = Guard::new_var();
        let v = Vs::Int(PrimitiveVS::from_guarded([(1i64, g), (2, g.not())]));
        assert_eq!(count_assignments(Guard::const_true(), &[v.clone()]), 2);
        assert_eq!(count_assignments(g, &[v]), 1);
    }

    #[test]
    fn test_count_assignments_joint() {
        SolverContext::reset();
        let g = Guard::new_var();
        let h = Guard::new_var();
        let a = Vs::Int(PrimitiveVS::from_guarded([(1i64, g), (2, g.not())]));
        let b = Vs::Int(PrimitiveVS::from_guarded([(10i64, h), (20, h.not())]));
        assert_eq!(count_assignments(Guard::const_true(), &[a, b]), 4);
    }

    #[test]
    fn test_concretize_list() {
        SolverContext::reset();
        let g = Guard::new_var();
        let list = match Vs::empty_list(Guard::const_true()) {
            Vs::List(l) => l,
            _ => unreachable!(),
        };
        let list = list.add(&Vs::Int(PrimitiveVS::from_guarded([
            (1i64, g),
            (2, g.not()),
        ])));
        let v = Vs::List(Box::new(list));
        let c = concretize(&v, g).unwrap();
        assert_eq!(c.value, Concrete::List(vec![Concrete::Int(1)]));
    }

    #[test]
    fn test_fingerprint_distinguishes() {
        SolverContext::reset();
        let a = vec![vec![Concrete::Int(1), Concrete::Bool(true)]];
        let b = vec![vec![Concrete::Int(1), Concrete::Bool(false)]];
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
    }
}
