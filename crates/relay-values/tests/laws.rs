//! Algebraic laws of value summaries, checked over randomized shapes.

use proptest::prelude::*;
use relay_solver::{Guard, SolverContext};
use relay_values::{ListVS, PrimitiveVS, SetVS, ValueSummary};

/// Build a guard from two fresh variables according to a small shape index.
fn guard_shape(a: Guard, b: Guard, shape: u8) -> Guard {
    match shape % 6 {
        0 => Guard::const_true(),
        1 => a,
        2 => a.not(),
        3 => a.and(b),
        4 => a.or(b),
        _ => b.not(),
    }
}

/// A primitive summary over up to three values partitioned by a guard pair:
/// v0 under g, v1 under !g & h, v2 under !g & !h. Entries stay disjoint by
/// construction.
fn build_prim(values: [i64; 3], g: Guard, h: Guard) -> PrimitiveVS<i64> {
    PrimitiveVS::from_guarded([
        (values[0], g),
        (values[1], g.not().and(h)),
        (values[2], g.not().and(h.not())),
    ])
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn restrict_true_is_identity(vals in prop::array::uniform3(-5i64..5)) {
        SolverContext::reset();
        let g = Guard::new_var();
        let h = Guard::new_var();
        let a = build_prim(vals, g, h);
        prop_assert_eq!(a.restrict(Guard::const_true()), a.clone());
        prop_assert!(a.restrict(Guard::const_false()).is_empty_vs());
    }

    #[test]
    fn restrict_composes(vals in prop::array::uniform3(-5i64..5), s1 in 0u8..6, s2 in 0u8..6) {
        SolverContext::reset();
        let x = Guard::new_var();
        let y = Guard::new_var();
        let a = build_prim(vals, x, y);
        let g = guard_shape(x, y, s1);
        let h = guard_shape(y, x, s2);
        prop_assert_eq!(a.restrict(g).restrict(h), a.restrict(g.and(h)));
    }

    #[test]
    fn split_merge_round_trip(vals in prop::array::uniform3(-5i64..5), s in 0u8..6) {
        SolverContext::reset();
        let x = Guard::new_var();
        let y = Guard::new_var();
        let a = build_prim(vals, x, y);
        let g = guard_shape(x, y, s);
        let rejoined = a.restrict(g).merge_with(&a.restrict(g.not()));
        prop_assert_eq!(rejoined, a);
    }

    #[test]
    fn update_under_guard_is_restrict_merge(
        vals in prop::array::uniform3(-5i64..5),
        upd in prop::array::uniform3(-5i64..5),
        s in 0u8..6,
    ) {
        SolverContext::reset();
        let x = Guard::new_var();
        let y = Guard::new_var();
        let a = build_prim(vals, x, y);
        let b = build_prim(upd, y, x);
        let g = guard_shape(x, y, s);
        let lhs = a.update_under_guard(g, &b);
        let rhs = a.restrict(g.not()).merge_with(&b.restrict(g));
        prop_assert_eq!(lhs, rhs);
    }

    #[test]
    fn symbolic_equals_self_covers_universe(vals in prop::array::uniform3(-5i64..5), s in 0u8..6) {
        SolverContext::reset();
        let x = Guard::new_var();
        let y = Guard::new_var();
        let a = build_prim(vals, x, y).restrict(guard_shape(x, y, s));
        let eq = a.symbolic_equals(&a, Guard::const_true());
        prop_assert_eq!(eq.true_guard(), a.universe());
        prop_assert!(eq.false_guard().is_false());
    }

    #[test]
    fn set_add_is_idempotent(vals in prop::array::uniform3(-3i64..3), n in -3i64..3) {
        SolverContext::reset();
        let x = Guard::new_var();
        let y = Guard::new_var();
        let mut s = SetVS::new(Guard::const_true());
        for v in vals {
            s = s.add(&PrimitiveVS::new(v));
        }
        let item = PrimitiveVS::new(n).restrict(x.or(y));
        let once = s.add(&item);
        let twice = once.add(&item);
        let eq = once.symbolic_equals(&twice, Guard::const_true());
        prop_assert!(eq.true_guard() == once.universe());
    }

    #[test]
    fn list_get_of_add_is_item(vals in proptest::collection::vec(-5i64..5, 0..4), n in -5i64..5) {
        SolverContext::reset();
        let mut l = ListVS::new(Guard::const_true());
        for v in &vals {
            l = l.add(&PrimitiveVS::new(*v));
        }
        let l = l.add(&PrimitiveVS::new(n));
        let last = l.size().add_i64(-1);
        let got = l.get(&last).unwrap();
        prop_assert_eq!(got, PrimitiveVS::new(n));
    }
}
