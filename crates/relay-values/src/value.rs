//! The dynamic sum of all value-summary variants.
//!
//! Machine local state is an ordered vector of [`Vs`] fields; union
//! payloads and tuple fields are `Vs` too. Containers stay generic and are
//! instantiated at `Vs` here, so primitives keep static dispatch while the
//! heterogeneous surfaces share one type.

use crate::ids::{EventTag, Key, MachineRef, StateRef};
use crate::list::ListVS;
use crate::map::MapVS;
use crate::primitive::PrimitiveVS;
use crate::set::SetVS;
use crate::tuple::TupleVS;
use crate::union::UnionVS;
use crate::{ValueSummary, VsError, VsResult};
use relay_solver::Guard;

/// A value summary of any variant.
#[derive(Clone, Debug)]
pub enum Vs {
    Bool(PrimitiveVS<bool>),
    Int(PrimitiveVS<i64>),
    Event(PrimitiveVS<EventTag>),
    Machine(PrimitiveVS<MachineRef>),
    State(PrimitiveVS<StateRef>),
    List(Box<ListVS<Vs>>),
    Set(Box<SetVS<Vs>>),
    Map(Box<MapVS<Key, Vs>>),
    Tuple(TupleVS),
    Union(Box<UnionVS>),
}

impl Vs {
    pub fn bool_vs(b: bool) -> Vs {
        Vs::Bool(PrimitiveVS::new(b))
    }

    pub fn int(n: i64) -> Vs {
        Vs::Int(PrimitiveVS::new(n))
    }

    pub fn machine(m: MachineRef) -> Vs {
        Vs::Machine(PrimitiveVS::new(m))
    }

    pub fn event(e: EventTag) -> Vs {
        Vs::Event(PrimitiveVS::new(e))
    }

    pub fn empty_list(universe: Guard) -> Vs {
        Vs::List(Box::new(ListVS::new(universe)))
    }

    pub fn empty_set(universe: Guard) -> Vs {
        Vs::Set(Box::new(SetVS::new(universe)))
    }

    pub fn empty_map(universe: Guard) -> Vs {
        Vs::Map(Box::new(MapVS::new(universe)))
    }

    /// Variant name, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Vs::Bool(_) => "Bool",
            Vs::Int(_) => "Int",
            Vs::Event(_) => "Event",
            Vs::Machine(_) => "Machine",
            Vs::State(_) => "State",
            Vs::List(_) => "List",
            Vs::Set(_) => "Set",
            Vs::Map(_) => "Map",
            Vs::Tuple(_) => "Tuple",
            Vs::Union(_) => "Union",
        }
    }

    pub fn as_bool(&self) -> Option<&PrimitiveVS<bool>> {
        match self {
            Vs::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&PrimitiveVS<i64>> {
        match self {
            Vs::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&PrimitiveVS<EventTag>> {
        match self {
            Vs::Event(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_machine(&self) -> Option<&PrimitiveVS<MachineRef>> {
        match self {
            Vs::Machine(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<&PrimitiveVS<StateRef>> {
        match self {
            Vs::State(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListVS<Vs>> {
        match self {
            Vs::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&SetVS<Vs>> {
        match self {
            Vs::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapVS<Key, Vs>> {
        match self {
            Vs::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&TupleVS> {
        match self {
            Vs::Tuple(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_union(&self) -> Option<&UnionVS> {
        match self {
            Vs::Union(v) => Some(v),
            _ => None,
        }
    }

    /// Like the `as_*` accessors but a model error on mismatch, for
    /// program-facing payload reads.
    pub fn expect_int(&self) -> VsResult<&PrimitiveVS<i64>> {
        self.as_int().ok_or(VsError::PayloadMismatch {
            expected: "Int",
            actual: self.kind_name(),
        })
    }

    pub fn expect_bool(&self) -> VsResult<&PrimitiveVS<bool>> {
        self.as_bool().ok_or(VsError::PayloadMismatch {
            expected: "Bool",
            actual: self.kind_name(),
        })
    }

    pub fn expect_machine(&self) -> VsResult<&PrimitiveVS<MachineRef>> {
        self.as_machine().ok_or(VsError::PayloadMismatch {
            expected: "Machine",
            actual: self.kind_name(),
        })
    }

    fn kind_mismatch(&self, other: &Vs, op: &str) -> ! {
        panic!(
            "value summary kind mismatch in {}: {} vs {}",
            op,
            self.kind_name(),
            other.kind_name()
        )
    }
}

/// Gather the inner summaries of one variant out of a slice of `Vs`,
/// panicking on a mismatch (heterogeneous merges are engine bugs, not
/// model errors).
macro_rules! downcast_all {
    ($selfv:expr, $others:expr, $variant:ident, $op:expr) => {{
        let mut inner = Vec::with_capacity($others.len());
        for o in $others {
            match o {
                Vs::$variant(v) => inner.push((**v).clone()),
                _ => $selfv.kind_mismatch(o, $op),
            }
        }
        inner
    }};
}

macro_rules! downcast_all_flat {
    ($selfv:expr, $others:expr, $variant:ident, $op:expr) => {{
        let mut inner = Vec::with_capacity($others.len());
        for o in $others {
            match o {
                Vs::$variant(v) => inner.push(v.clone()),
                _ => $selfv.kind_mismatch(o, $op),
            }
        }
        inner
    }};
}

impl ValueSummary for Vs {
    fn is_empty_vs(&self) -> bool {
        match self {
            Vs::Bool(v) => v.is_empty_vs(),
            Vs::Int(v) => v.is_empty_vs(),
            Vs::Event(v) => v.is_empty_vs(),
            Vs::Machine(v) => v.is_empty_vs(),
            Vs::State(v) => v.is_empty_vs(),
            Vs::List(v) => v.is_empty_vs(),
            Vs::Set(v) => v.is_empty_vs(),
            Vs::Map(v) => v.is_empty_vs(),
            Vs::Tuple(v) => v.is_empty_vs(),
            Vs::Union(v) => v.is_empty_vs(),
        }
    }

    fn universe(&self) -> Guard {
        match self {
            Vs::Bool(v) => v.universe(),
            Vs::Int(v) => v.universe(),
            Vs::Event(v) => v.universe(),
            Vs::Machine(v) => v.universe(),
            Vs::State(v) => v.universe(),
            Vs::List(v) => v.universe(),
            Vs::Set(v) => v.universe(),
            Vs::Map(v) => v.universe(),
            Vs::Tuple(v) => v.universe(),
            Vs::Union(v) => v.universe(),
        }
    }

    fn restrict(&self, guard: Guard) -> Self {
        match self {
            Vs::Bool(v) => Vs::Bool(v.restrict(guard)),
            Vs::Int(v) => Vs::Int(v.restrict(guard)),
            Vs::Event(v) => Vs::Event(v.restrict(guard)),
            Vs::Machine(v) => Vs::Machine(v.restrict(guard)),
            Vs::State(v) => Vs::State(v.restrict(guard)),
            Vs::List(v) => Vs::List(Box::new(v.restrict(guard))),
            Vs::Set(v) => Vs::Set(Box::new(v.restrict(guard))),
            Vs::Map(v) => Vs::Map(Box::new(v.restrict(guard))),
            Vs::Tuple(v) => Vs::Tuple(v.restrict(guard)),
            Vs::Union(v) => Vs::Union(Box::new(v.restrict(guard))),
        }
    }

    fn merge(&self, others: &[Self]) -> Self {
        match self {
            Vs::Bool(v) => Vs::Bool(v.merge(&downcast_all_flat!(self, others, Bool, "merge"))),
            Vs::Int(v) => Vs::Int(v.merge(&downcast_all_flat!(self, others, Int, "merge"))),
            Vs::Event(v) => Vs::Event(v.merge(&downcast_all_flat!(self, others, Event, "merge"))),
            Vs::Machine(v) => {
                Vs::Machine(v.merge(&downcast_all_flat!(self, others, Machine, "merge")))
            }
            Vs::State(v) => Vs::State(v.merge(&downcast_all_flat!(self, others, State, "merge"))),
            Vs::List(v) => Vs::List(Box::new(v.merge(&downcast_all!(self, others, List, "merge")))),
            Vs::Set(v) => Vs::Set(Box::new(v.merge(&downcast_all!(self, others, Set, "merge")))),
            Vs::Map(v) => Vs::Map(Box::new(v.merge(&downcast_all!(self, others, Map, "merge")))),
            Vs::Tuple(v) => {
                Vs::Tuple(v.merge(&downcast_all_flat!(self, others, Tuple, "merge")))
            }
            Vs::Union(v) => {
                Vs::Union(Box::new(v.merge(&downcast_all!(self, others, Union, "merge"))))
            }
        }
    }

    fn symbolic_equals(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        match (self, other) {
            (Vs::Bool(a), Vs::Bool(b)) => a.symbolic_equals(b, pc),
            (Vs::Int(a), Vs::Int(b)) => a.symbolic_equals(b, pc),
            (Vs::Event(a), Vs::Event(b)) => a.symbolic_equals(b, pc),
            (Vs::Machine(a), Vs::Machine(b)) => a.symbolic_equals(b, pc),
            (Vs::State(a), Vs::State(b)) => a.symbolic_equals(b, pc),
            (Vs::List(a), Vs::List(b)) => a.symbolic_equals(b, pc),
            (Vs::Set(a), Vs::Set(b)) => a.symbolic_equals(b, pc),
            (Vs::Map(a), Vs::Map(b)) => a.symbolic_equals(b, pc),
            (Vs::Tuple(a), Vs::Tuple(b)) => a.symbolic_equals(b, pc),
            (Vs::Union(a), Vs::Union(b)) => a.symbolic_equals(b, pc),
            _ => self.kind_mismatch(other, "symbolic_equals"),
        }
    }
}
