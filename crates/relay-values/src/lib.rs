//! Value summaries: guard-indexed disjunctions of values.
//!
//! A value summary of type `T` is a finite set of `(guard, value)` pairs with
//! pairwise-disjoint guards. One summary stands for every concrete value it
//! contains, each selected by its path condition; the engine manipulates
//! whole summaries so that a single step covers a set of executions.
//!
//! Every variant satisfies the same capability set, [`ValueSummary`], and
//! maintains three invariants:
//!
//! - entry guards are pairwise disjoint,
//! - no entry carries the false guard,
//! - structurally equal values under different guards are merged into one
//!   entry under the disjunction (canonical form).
//!
//! Summaries are value-semantic: every operation produces a fresh summary
//! and never mutates its inputs. Guards are shared handles from
//! [`relay_solver`].

pub mod concretize;
pub mod encode;
pub mod ids;
pub mod list;
pub mod map;
pub mod message;
pub mod primitive;
pub mod set;
pub mod tuple;
pub mod union;
pub mod value;
pub mod vclock;

pub use concretize::{concretize, count_assignments, fingerprint, Concrete};
pub use ids::{EventKind, EventTag, Key, MachineRef, StateRef};
pub use list::ListVS;
pub use map::MapVS;
pub use message::MessageVS;
pub use primitive::{PrimValue, PrimitiveVS};
pub use set::SetVS;
pub use tuple::TupleVS;
pub use union::{UnionTag, UnionVS};
pub use value::Vs;
pub use vclock::VectorClockVS;

use relay_solver::Guard;
use thiserror::Error;

/// A guard paired with the value it selects.
#[derive(Debug, Clone)]
pub struct GuardedValue<T> {
    pub guard: Guard,
    pub value: T,
}

impl<T> GuardedValue<T> {
    pub fn new(guard: Guard, value: T) -> Self {
        Self { guard, value }
    }
}

/// Errors raised by value-summary operations on behalf of the modeled
/// program (invalid indices, missing keys, payload casts). The engine
/// reports these as program bugs, not engine faults.
#[derive(Debug, Error)]
pub enum VsError {
    #[error("invalid index {index} into sequence of size {size}")]
    InvalidIndex { index: String, size: String },

    #[error("key not found in map: {key}")]
    KeyNotFound { key: String },

    #[error("tuple field {index} out of bounds for arity {arity}")]
    TupleIndex { index: usize, arity: usize },

    #[error("payload type mismatch: expected {expected}, got {actual}")]
    PayloadMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("snapshot decode failed: {0}")]
    Decode(String),
}

pub type VsResult<T> = Result<T, VsError>;

/// The capability set shared by every value-summary variant.
pub trait ValueSummary: Clone + std::fmt::Debug {
    /// Whether the summary contains no entries (universe is false).
    fn is_empty_vs(&self) -> bool;

    /// Disjunction of the entry guards: the condition under which the
    /// summary is defined.
    fn universe(&self) -> Guard;

    /// Conjoin every entry guard with `guard`, dropping entries that become
    /// false. Idempotent; restricting to true is the identity.
    fn restrict(&self, guard: Guard) -> Self;

    /// Union the entries of `self` and `others` and canonicalize. Callers
    /// must guarantee the inputs are disjointly guarded; the idiom is
    /// `a.restrict(g)` on one side and `a.restrict(g.not())` on the other.
    fn merge(&self, others: &[Self]) -> Self;

    /// Structural equality as a boolean summary: true under exactly the
    /// guard (within `pc` and both universes) where the two are equal,
    /// false elsewhere in the intersected universe.
    fn symbolic_equals(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool>;

    fn merge_with(&self, other: &Self) -> Self {
        self.merge(std::slice::from_ref(other))
    }

    /// Replace the part of `self` under `guard` with `update`.
    fn update_under_guard(&self, guard: Guard, update: &Self) -> Self {
        self.restrict(guard.not())
            .merge(std::slice::from_ref(&update.restrict(guard)))
    }
}
