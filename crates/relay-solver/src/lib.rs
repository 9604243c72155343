//! Path conditions ("guards") for the relay exploration engine.
//!
//! A [`Guard`] is an opaque handle into a boolean algebra. The algebra is
//! pluggable through [`BooleanAlgebra`]; the default is the in-tree ROBDD
//! engine, whose canonicity makes the constant checks exact. Guards are
//! reference-shared handles: operations never mutate their inputs, and
//! equality of handles implies equivalence of formulas (the converse holds
//! for the BDD engine).
//!
//! The engine lives in a per-thread [`SolverContext`] rather than a process
//! global, so tests can install alternative engines without cross-talk.
//! A context must be installed (or the default lazily created) before any
//! guard operation.

pub mod bdd;
pub mod stats;

pub use bdd::BddEngine;
pub use stats::SolverStats;

use std::cell::RefCell;
use std::fmt;
use std::time::Instant;

/// The boolean algebra contract. Total over the five connective operations;
/// `is_sat(g)` is false exactly when `g` is the false constant.
pub trait BooleanAlgebra {
    fn const_true(&self) -> u32;
    fn const_false(&self) -> u32;
    /// Mint a fresh variable, used to split universes at choice points.
    fn new_var(&mut self) -> u32;
    fn and(&mut self, a: u32, b: u32) -> u32;
    fn or(&mut self, a: u32, b: u32) -> u32;
    fn not(&mut self, a: u32) -> u32;
    fn is_sat(&mut self, a: u32) -> bool;
    fn var_count(&self) -> usize;
    fn node_count(&self) -> usize;
    /// Drop caches; semantics of existing handles must be preserved.
    fn cleanup(&mut self);
}

/// Hook invoked after every timed guard operation. Used by engine
/// auto-switching heuristics; must not change observable semantics.
pub type TimingHook = Box<dyn FnMut(&SolverStats)>;

/// Per-thread solver state: the installed engine plus operation statistics.
pub struct SolverContext {
    engine: Box<dyn BooleanAlgebra>,
    stats: SolverStats,
    hook: Option<TimingHook>,
}

impl SolverContext {
    pub fn new(engine: Box<dyn BooleanAlgebra>) -> Self {
        Self {
            engine,
            stats: SolverStats::default(),
            hook: None,
        }
    }

    /// Replace this thread's context with a fresh one over the given engine.
    /// Existing guard handles become meaningless.
    pub fn install(engine: Box<dyn BooleanAlgebra>) {
        CONTEXT.with(|cx| *cx.borrow_mut() = SolverContext::new(engine));
    }

    /// Reset this thread's context to a fresh default BDD engine.
    pub fn reset() {
        Self::install(Box::new(BddEngine::new()));
    }

    /// Snapshot of this thread's solver statistics.
    pub fn stats() -> SolverStats {
        CONTEXT.with(|cx| cx.borrow().stats.clone())
    }

    /// Number of variables minted so far.
    pub fn var_count() -> usize {
        CONTEXT.with(|cx| cx.borrow().engine.var_count())
    }

    /// Number of nodes in the engine's store.
    pub fn node_count() -> usize {
        CONTEXT.with(|cx| cx.borrow().engine.node_count())
    }

    /// Drop engine caches. Invoked by the scheduler when memory pressure
    /// crosses its threshold.
    pub fn cleanup() {
        CONTEXT.with(|cx| cx.borrow_mut().engine.cleanup());
    }

    /// Install a hook run after every timing sample.
    pub fn set_timing_hook(hook: Option<TimingHook>) {
        CONTEXT.with(|cx| cx.borrow_mut().hook = hook);
    }

    fn fire_hook(&mut self) {
        if let Some(hook) = self.hook.as_mut() {
            hook(&self.stats);
        }
    }
}

thread_local! {
    static CONTEXT: RefCell<SolverContext> =
        RefCell::new(SolverContext::new(Box::new(BddEngine::new())));
}

fn with_context<R>(f: impl FnOnce(&mut SolverContext) -> R) -> R {
    CONTEXT.with(|cx| f(&mut cx.borrow_mut()))
}

/// A path condition: an opaque handle into the thread's boolean algebra.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guard(u32);

impl Guard {
    pub fn const_true() -> Guard {
        with_context(|cx| Guard(cx.engine.const_true()))
    }

    pub fn const_false() -> Guard {
        with_context(|cx| Guard(cx.engine.const_false()))
    }

    /// A fresh variable: true on one half of every universe, false on the
    /// other. Each call returns a distinct variable.
    pub fn new_var() -> Guard {
        with_context(|cx| Guard(cx.engine.new_var()))
    }

    pub fn and(self, other: Guard) -> Guard {
        with_context(|cx| {
            let start = Instant::now();
            let r = cx.engine.and(self.0, other.0);
            cx.stats.and_ops += 1;
            cx.stats.record_create(start.elapsed());
            cx.fire_hook();
            Guard(r)
        })
    }

    pub fn or(self, other: Guard) -> Guard {
        with_context(|cx| {
            let start = Instant::now();
            let r = cx.engine.or(self.0, other.0);
            cx.stats.or_ops += 1;
            cx.stats.record_create(start.elapsed());
            cx.fire_hook();
            Guard(r)
        })
    }

    pub fn not(self) -> Guard {
        with_context(|cx| {
            let start = Instant::now();
            let r = cx.engine.not(self.0);
            cx.stats.not_ops += 1;
            cx.stats.record_create(start.elapsed());
            cx.fire_hook();
            Guard(r)
        })
    }

    pub fn implies(self, other: Guard) -> Guard {
        self.not().or(other)
    }

    /// Exact: true iff this guard is the true constant.
    pub fn is_true(self) -> bool {
        with_context(|cx| self.0 == cx.engine.const_true())
    }

    /// Exact: true iff this guard is the false constant.
    pub fn is_false(self) -> bool {
        with_context(|cx| self.0 == cx.engine.const_false())
    }

    pub fn is_sat(self) -> bool {
        with_context(|cx| {
            let start = Instant::now();
            let r = cx.engine.is_sat(self.0);
            cx.stats.is_sat_ops += 1;
            if r {
                cx.stats.is_sat_true += 1;
            }
            cx.stats.record_solve(start.elapsed());
            cx.fire_hook();
            r
        })
    }

    /// Raw handle, for the snapshot codec. Only meaningful against the same
    /// installed context; snapshots never outlive a run.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Rebuild a guard from a raw handle previously obtained via [`raw`]
    /// against the same context.
    ///
    /// [`raw`]: Guard::raw
    pub fn from_raw(raw: u32) -> Guard {
        Guard(raw)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_true() {
            write!(f, "Guard(true)")
        } else if self.is_false() {
            write!(f, "Guard(false)")
        } else {
            write!(f, "Guard(#{})", self.0)
        }
    }
}

// Display mirrors Debug; guards have no readable syntax of their own.
impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
