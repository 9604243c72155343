//! Reduced ordered BDD engine backing the default boolean algebra.
//!
//! Nodes are hash-consed, so structural equality is handle equality and the
//! constant checks (`is_true`/`is_false`) are exact node-id comparisons.
//! All connectives are built on a memoized if-then-else apply.

use crate::BooleanAlgebra;
use std::collections::HashMap;
use tracing::debug;

/// Node id. 0 is the false terminal, 1 is the true terminal.
pub(crate) const FALSE: u32 = 0;
pub(crate) const TRUE: u32 = 1;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct Node {
    /// Variable index; terminals use `u32::MAX` so every real variable
    /// compares smaller.
    var: u32,
    lo: u32,
    hi: u32,
}

/// Hash-consed ROBDD manager with an ITE memo cache.
pub struct BddEngine {
    nodes: Vec<Node>,
    unique: HashMap<Node, u32>,
    ite_cache: HashMap<(u32, u32, u32), u32>,
    num_vars: u32,
}

impl BddEngine {
    pub fn new() -> Self {
        let terminal = |_| Node {
            var: u32::MAX,
            lo: 0,
            hi: 0,
        };
        Self {
            // Slots 0 and 1 are the terminals; they are never looked up
            // through the unique table.
            nodes: vec![terminal(0), terminal(1)],
            unique: HashMap::new(),
            ite_cache: HashMap::new(),
            num_vars: 0,
        }
    }

    fn var_of(&self, n: u32) -> u32 {
        self.nodes[n as usize].var
    }

    /// Cofactors of `n` with respect to variable `v`, which must be at or
    /// above `n`'s top variable in the order.
    fn cofactors(&self, n: u32, v: u32) -> (u32, u32) {
        let node = self.nodes[n as usize];
        if node.var == v {
            (node.lo, node.hi)
        } else {
            (n, n)
        }
    }

    fn mk(&mut self, var: u32, lo: u32, hi: u32) -> u32 {
        if lo == hi {
            return lo;
        }
        let node = Node { var, lo, hi };
        if let Some(&id) = self.unique.get(&node) {
            return id;
        }
        let id = self.nodes.len() as u32;
        self.nodes.push(node);
        self.unique.insert(node, id);
        id
    }

    fn ite(&mut self, f: u32, g: u32, h: u32) -> u32 {
        if f == TRUE {
            return g;
        }
        if f == FALSE {
            return h;
        }
        if g == h {
            return g;
        }
        if g == TRUE && h == FALSE {
            return f;
        }
        let key = (f, g, h);
        if let Some(&r) = self.ite_cache.get(&key) {
            return r;
        }
        let v = self
            .var_of(f)
            .min(self.var_of(g))
            .min(self.var_of(h));
        let (f0, f1) = self.cofactors(f, v);
        let (g0, g1) = self.cofactors(g, v);
        let (h0, h1) = self.cofactors(h, v);
        let lo = self.ite(f0, g0, h0);
        let hi = self.ite(f1, g1, h1);
        let r = self.mk(v, lo, hi);
        self.ite_cache.insert(key, r);
        r
    }
}

impl Default for BddEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BooleanAlgebra for BddEngine {
    fn const_true(&self) -> u32 {
        TRUE
    }

    fn const_false(&self) -> u32 {
        FALSE
    }

    fn new_var(&mut self) -> u32 {
        let v = self.num_vars;
        self.num_vars += 1;
        self.mk(v, FALSE, TRUE)
    }

    fn and(&mut self, a: u32, b: u32) -> u32 {
        self.ite(a, b, FALSE)
    }

    fn or(&mut self, a: u32, b: u32) -> u32 {
        self.ite(a, TRUE, b)
    }

    fn not(&mut self, a: u32) -> u32 {
        self.ite(a, FALSE, TRUE)
    }

    fn is_sat(&mut self, a: u32) -> bool {
        // ROBDDs are canonical: only the false terminal is unsatisfiable.
        a != FALSE
    }

    fn var_count(&self) -> usize {
        self.num_vars as usize
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn cleanup(&mut self) {
        let dropped = self.ite_cache.len();
        self.ite_cache.clear();
        self.ite_cache.shrink_to_fit();
        debug!(entries = dropped, "dropped apply cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_canonical() {
        let mut e = BddEngine::new();
        let t = e.const_true();
        let f = e.const_false();
        assert_ne!(t, f);
        assert_eq!(e.and(t, t), t);
        assert_eq!(e.or(f, f), f);
        assert_eq!(e.not(t), f);
        assert_eq!(e.not(f), t);
    }

    #[test]
    fn test_var_and_complement() {
        let mut e = BddEngine::new();
        let x = e.new_var();
        let nx = e.not(x);
        assert_eq!(e.and(x, nx), FALSE);
        assert_eq!(e.or(x, nx), TRUE);
        // Double negation is the identity on handles.
        assert_eq!(e.not(nx), x);
    }

    #[test]
    fn test_hash_consing_gives_handle_equality() {
        let mut e = BddEngine::new();
        let x = e.new_var();
        let y = e.new_var();
        let a = e.and(x, y);
        let b = e.and(y, x);
        assert_eq!(a, b);
        // De Morgan: !(x & y) == !x | !y
        let lhs = e.not(a);
        let nx = e.not(x);
        let ny = e.not(y);
        let rhs = e.or(nx, ny);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_is_sat_exact() {
        let mut e = BddEngine::new();
        let x = e.new_var();
        let y = e.new_var();
        let nx = e.not(x);
        let contradiction = e.and(x, nx);
        assert!(!e.is_sat(contradiction));
        let mixed = e.and(x, y);
        assert!(e.is_sat(mixed));
    }

    #[test]
    fn test_cleanup_preserves_nodes() {
        let mut e = BddEngine::new();
        let x = e.new_var();
        let y = e.new_var();
        let a = e.and(x, y);
        e.cleanup();
        // The memo cache is gone but the node store is intact.
        let b = e.and(x, y);
        assert_eq!(a, b);
    }
}
