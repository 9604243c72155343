//! Machine definitions and per-instance runtime state.

use crate::buffer::{BufferSemantics, EventBuffer};
use crate::error::{EngineError, EngineResult};
use crate::scheduler::EffectCtx;
use relay_solver::Guard;
use relay_values::encode::{self, Cursor};
use relay_values::{
    EventTag, ListVS, MachineRef, MessageVS, PrimitiveVS, StateRef, VectorClockVS, Vs, VsResult,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Event handler body. Handlers run under a path condition carried by the
/// context and interact with the world only through it.
pub type HandlerFn = Arc<dyn Fn(&mut EffectCtx<'_>) -> EngineResult<()> + Send + Sync>;

/// A declared state of a machine class.
#[derive(Debug, Clone)]
pub struct StateDecl {
    pub name: Arc<str>,
    pub hot: bool,
}

/// What a machine does with an event in a given state.
#[derive(Clone)]
pub enum Reaction {
    /// Drop the event.
    Ignore,
    /// Halt the machine.
    Halt,
    /// Transition to the given state (running its entry handler).
    Goto(u32),
    /// Run a handler.
    Handle(HandlerFn),
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reaction::Ignore => write!(f, "Ignore"),
            Reaction::Halt => write!(f, "Halt"),
            Reaction::Goto(s) => write!(f, "Goto({})", s),
            Reaction::Handle(_) => write!(f, "Handle(..)"),
        }
    }
}

/// Static description of a machine class: states, initial fields, and the
/// transition table. State 0 is the start state.
pub struct MachineDef {
    class: Arc<str>,
    states: Vec<StateDecl>,
    init_fields: Vec<Vs>,
    transitions: HashMap<(u32, EventTag), Reaction>,
    entries: HashMap<u32, HandlerFn>,
}

impl std::fmt::Debug for MachineDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineDef")
            .field("class", &self.class)
            .field("states", &self.states)
            .field("fields", &self.init_fields.len())
            .field("transitions", &self.transitions.len())
            .finish()
    }
}

impl MachineDef {
    pub fn builder(class: &str) -> MachineDefBuilder {
        MachineDefBuilder {
            class: Arc::from(class),
            states: Vec::new(),
            init_fields: Vec::new(),
            transitions: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    pub fn class(&self) -> &Arc<str> {
        &self.class
    }

    pub fn num_fields(&self) -> usize {
        self.init_fields.len()
    }

    pub fn state_idx(&self, name: &str) -> Option<u32> {
        self.states
            .iter()
            .position(|s| &*s.name == name)
            .map(|i| i as u32)
    }

    pub fn state_ref(&self, idx: u32) -> StateRef {
        let decl = &self.states[idx as usize];
        StateRef::new(idx, decl.name.clone(), decl.hot)
    }

    pub fn start_state(&self) -> StateRef {
        self.state_ref(0)
    }

    pub(crate) fn init_fields(&self) -> Vec<Vs> {
        self.init_fields.clone()
    }

    pub(crate) fn reaction(&self, state: u32, event: &EventTag) -> Option<&Reaction> {
        self.transitions.get(&(state, event.clone()))
    }

    pub(crate) fn entry(&self, state: u32) -> Option<&HandlerFn> {
        self.entries.get(&state)
    }
}

/// Builder for [`MachineDef`]. Misconfigured tables (unknown state names,
/// no states) are programming errors and panic at build time.
pub struct MachineDefBuilder {
    class: Arc<str>,
    states: Vec<StateDecl>,
    init_fields: Vec<Vs>,
    transitions: HashMap<(u32, EventTag), Reaction>,
    entries: HashMap<u32, HandlerFn>,
}

impl MachineDefBuilder {
    pub fn state(mut self, name: &str) -> Self {
        self.states.push(StateDecl {
            name: Arc::from(name),
            hot: false,
        });
        self
    }

    pub fn hot_state(mut self, name: &str) -> Self {
        self.states.push(StateDecl {
            name: Arc::from(name),
            hot: true,
        });
        self
    }

    pub fn field(mut self, init: Vs) -> Self {
        self.init_fields.push(init);
        self
    }

    fn idx(&self, state: &str) -> u32 {
        self.states
            .iter()
            .position(|s| &*s.name == state)
            .unwrap_or_else(|| panic!("unknown state '{}' in class {}", state, self.class))
            as u32
    }

    pub fn on(mut self, state: &str, event: EventTag, reaction: Reaction) -> Self {
        let idx = self.idx(state);
        self.transitions.insert((idx, event), reaction);
        self
    }

    pub fn on_handle(
        self,
        state: &str,
        event: EventTag,
        handler: impl Fn(&mut EffectCtx<'_>) -> EngineResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on(state, event, Reaction::Handle(Arc::new(handler)))
    }

    pub fn on_goto(self, state: &str, event: EventTag, target: &str) -> Self {
        let target = self.idx(target);
        self.on(state, event, Reaction::Goto(target))
    }

    pub fn on_ignore(self, state: &str, event: EventTag) -> Self {
        self.on(state, event, Reaction::Ignore)
    }

    pub fn on_halt(self, state: &str, event: EventTag) -> Self {
        self.on(state, event, Reaction::Halt)
    }

    pub fn entry(
        mut self,
        state: &str,
        handler: impl Fn(&mut EffectCtx<'_>) -> EngineResult<()> + Send + Sync + 'static,
    ) -> Self {
        let idx = self.idx(state);
        self.entries.insert(idx, Arc::new(handler));
        self
    }

    pub fn build(self) -> Arc<MachineDef> {
        assert!(
            !self.states.is_empty(),
            "machine class {} declares no states",
            self.class
        );
        Arc::new(MachineDef {
            class: self.class,
            states: self.states,
            init_fields: self.init_fields,
            transitions: self.transitions,
            entries: self.entries,
        })
    }
}

/// A machine instance: identity, control state, fields, send buffer, and
/// vector clock. Owned by the scheduler's arena; value summaries refer to
/// it through [`MachineRef`] handles only.
#[derive(Debug)]
pub struct Machine {
    def: Arc<MachineDef>,
    mref: MachineRef,
    current_state: PrimitiveVS<StateRef>,
    fields: Vec<Vs>,
    halted: Guard,
    started: Guard,
    pub(crate) buffer: EventBuffer,
    pub(crate) clock: VectorClockVS,
}

impl Machine {
    pub(crate) fn new(def: Arc<MachineDef>, mref: MachineRef, semantics: BufferSemantics) -> Self {
        let current_state = PrimitiveVS::new(def.start_state());
        let fields = def.init_fields();
        Self {
            def,
            mref,
            current_state,
            fields,
            halted: Guard::const_false(),
            started: Guard::const_false(),
            buffer: EventBuffer::new(semantics),
            clock: VectorClockVS::new(),
        }
    }

    pub fn def(&self) -> &Arc<MachineDef> {
        &self.def
    }

    pub fn mref(&self) -> &MachineRef {
        &self.mref
    }

    pub fn current_state(&self) -> &PrimitiveVS<StateRef> {
        &self.current_state
    }

    pub(crate) fn set_current_state(&mut self, state: PrimitiveVS<StateRef>) {
        self.current_state = state;
    }

    pub fn halted_cond(&self) -> Guard {
        self.halted
    }

    pub fn has_halted(&self) -> PrimitiveVS<bool> {
        PrimitiveVS::from_guarded([(true, self.halted), (false, self.halted.not())])
    }

    pub(crate) fn set_halted(&mut self, guard: Guard) {
        self.halted = self.halted.or(guard);
    }

    pub fn started_cond(&self) -> Guard {
        self.started
    }

    pub(crate) fn set_started(&mut self, guard: Guard) {
        self.started = self.started.or(guard);
    }

    pub fn field(&self, idx: usize) -> EngineResult<&Vs> {
        self.fields.get(idx).ok_or_else(|| {
            EngineError::Model(format!(
                "machine {} has no field {}",
                self.mref, idx
            ))
        })
    }

    pub(crate) fn set_field(&mut self, idx: usize, value: Vs) -> EngineResult<()> {
        match self.fields.get_mut(idx) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EngineError::Model(format!(
                "machine {} has no field {}",
                self.mref, idx
            ))),
        }
    }

    /// Local state as an ordered vector: the declared fields followed by
    /// the control state.
    pub fn local_state(&self) -> Vec<Vs> {
        let mut out = self.fields.clone();
        out.push(Vs::State(self.current_state.clone()));
        out
    }

    pub fn set_local_state(&mut self, mut state: Vec<Vs>) -> EngineResult<()> {
        if state.len() != self.fields.len() + 1 {
            return Err(EngineError::Internal(format!(
                "local state arity mismatch for {}: got {}, expected {}",
                self.mref,
                state.len(),
                self.fields.len() + 1
            )));
        }
        match state.pop() {
            Some(Vs::State(s)) => self.current_state = s,
            other => {
                return Err(EngineError::Internal(format!(
                    "local state for {} must end with a control state, got {:?}",
                    self.mref, other
                )))
            }
        }
        self.fields = state;
        Ok(())
    }

    /// Restore the freshly-created condition of the machine.
    pub fn reset(&mut self) {
        self.current_state = PrimitiveVS::new(self.def.start_state());
        self.fields = self.def.init_fields();
        self.halted = Guard::const_false();
        self.started = Guard::const_false();
        self.buffer.clear();
        self.clock = VectorClockVS::new();
    }

    pub(crate) fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            fields: self.fields.clone(),
            state: self.current_state.clone(),
            halted: self.halted,
            started: self.started,
            buffer: self.buffer.elements().clone(),
            clock: self.clock.clone(),
        }
    }

    pub(crate) fn restore(&mut self, snap: MachineSnapshot) {
        self.fields = snap.fields;
        self.current_state = snap.state;
        self.halted = snap.halted;
        self.started = snap.started;
        self.buffer.set_elements(snap.buffer);
        self.clock = snap.clock;
    }
}

/// Everything needed to put a machine back the way it was: fields, control
/// state, halt/start conditions, buffer contents, and clock.
#[derive(Debug, Clone)]
pub struct MachineSnapshot {
    pub fields: Vec<Vs>,
    pub state: PrimitiveVS<StateRef>,
    pub halted: Guard,
    pub started: Guard,
    pub buffer: ListVS<MessageVS>,
    pub clock: VectorClockVS,
}

impl MachineSnapshot {
    /// Serialize through the explicit binary snapshot format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode::put_len(&mut out, self.fields.len());
        for f in &self.fields {
            encode::put_vs(&mut out, f);
        }
        encode::put_vs(&mut out, &Vs::State(self.state.clone()));
        encode::put_guard(&mut out, self.halted);
        encode::put_guard(&mut out, self.started);
        encode::put_message_list(&mut out, &self.buffer);
        encode::put_vclock(&mut out, &self.clock);
        out
    }

    pub fn decode(buf: &[u8]) -> VsResult<Self> {
        let mut cur = Cursor::new(buf);
        let n = cur.len()?;
        let mut fields = Vec::with_capacity(n);
        for _ in 0..n {
            fields.push(encode::get_vs(&mut cur)?);
        }
        let state = match encode::get_vs(&mut cur)? {
            Vs::State(s) => s,
            other => {
                return Err(relay_values::VsError::Decode(format!(
                    "expected control state in snapshot, got {}",
                    other.kind_name()
                )))
            }
        };
        let halted = encode::get_guard(&mut cur)?;
        let started = encode::get_guard(&mut cur)?;
        let buffer = encode::get_message_list(&mut cur)?;
        let clock = encode::get_vclock(&mut cur)?;
        Ok(Self {
            fields,
            state,
            halted,
            started,
            buffer,
            clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_solver::SolverContext;
    use relay_values::ValueSummary;

    fn def() -> Arc<MachineDef> {
        MachineDef::builder("Cell")
            .state("Init")
            .state("Ready")
            .field(Vs::int(0))
            .on_goto("Init", EventTag::new("GO"), "Ready")
            .on_ignore("Ready", EventTag::new("GO"))
            .build()
    }

    fn machine() -> Machine {
        let d = def();
        let mref = MachineRef::new(0, d.class().clone(), 0);
        Machine::new(d, mref, BufferSemantics::Queue)
    }

    #[test]
    fn test_def_lookup() {
        let d = def();
        assert_eq!(d.state_idx("Ready"), Some(1));
        assert_eq!(d.state_idx("Nope"), None);
        assert!(d.reaction(0, &EventTag::new("GO")).is_some());
        assert!(d.reaction(1, &EventTag::new("STOP")).is_none());
        assert_eq!(d.start_state().name(), "Init");
    }

    #[test]
    fn test_machine_initial_state() {
        SolverContext::reset();
        let m = machine();
        assert_eq!(m.current_state().guarded_values().len(), 1);
        assert!(m.halted_cond().is_false());
        assert!(m.has_halted().false_guard().is_true());
        assert!(m.field(0).is_ok());
        assert!(m.field(3).is_err());
    }

    #[test]
    fn test_local_state_round_trip() {
        SolverContext::reset();
        let mut m = machine();
        let mut state = m.local_state();
        assert_eq!(state.len(), 2);
        state[0] = Vs::int(42);
        m.set_local_state(state).unwrap();
        assert_eq!(m.field(0).unwrap().as_int().unwrap(), &PrimitiveVS::new(42));
    }

    #[test]
    fn test_snapshot_encode_round_trip() {
        SolverContext::reset();
        let g = Guard::new_var();
        let mut m = machine();
        m.set_field(0, Vs::Int(PrimitiveVS::new(5).restrict(g))).unwrap();
        m.set_halted(g);
        let snap = m.snapshot();
        let decoded = MachineSnapshot::decode(&snap.encode()).unwrap();
        assert_eq!(decoded.halted, g);
        assert_eq!(decoded.fields.len(), 1);
        let eq = decoded.fields[0].symbolic_equals(&snap.fields[0], Guard::const_true());
        assert_eq!(eq.true_guard(), g);
    }

    #[test]
    fn test_reset() {
        SolverContext::reset();
        let g = Guard::new_var();
        let mut m = machine();
        m.set_field(0, Vs::int(9)).unwrap();
        m.set_halted(g);
        m.reset();
        assert!(m.halted_cond().is_false());
        assert_eq!(m.field(0).unwrap().as_int().unwrap(), &PrimitiveVS::new(0));
    }
}
