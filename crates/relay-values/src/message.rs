//! Message value summaries.

use crate::ids::{EventTag, MachineRef};
use crate::primitive::PrimitiveVS;
use crate::union::UnionVS;
use crate::vclock::VectorClockVS;
use crate::{ValueSummary, VsResult};
use relay_solver::Guard;

/// A pending event delivery: event tag, target machine, optional payload,
/// and the sender's vector clock at send time.
#[derive(Clone, Debug)]
pub struct MessageVS {
    event: PrimitiveVS<EventTag>,
    target: PrimitiveVS<MachineRef>,
    payload: Option<UnionVS>,
    clock: VectorClockVS,
}

impl MessageVS {
    pub fn new(
        event: PrimitiveVS<EventTag>,
        target: PrimitiveVS<MachineRef>,
        payload: Option<UnionVS>,
    ) -> Self {
        Self {
            event,
            target,
            payload,
            clock: VectorClockVS::new(),
        }
    }

    pub fn with_clock(
        event: PrimitiveVS<EventTag>,
        target: PrimitiveVS<MachineRef>,
        payload: Option<UnionVS>,
        clock: VectorClockVS,
    ) -> Self {
        Self {
            event,
            target,
            payload,
            clock,
        }
    }

    pub fn event(&self) -> &PrimitiveVS<EventTag> {
        &self.event
    }

    pub fn target(&self) -> &PrimitiveVS<MachineRef> {
        &self.target
    }

    pub fn payload(&self) -> Option<&UnionVS> {
        self.payload.as_ref()
    }

    pub fn clock(&self) -> &VectorClockVS {
        &self.clock
    }

    /// Guard under which this message is a machine-creation step.
    pub fn is_create(&self) -> PrimitiveVS<bool> {
        self.event.map(|e| e.is_create())
    }

    /// Guard under which this message carries a synchronous event.
    pub fn is_sync(&self) -> PrimitiveVS<bool> {
        self.event.map(|e| e.is_sync())
    }

    /// Guard under which this message is addressed to `target`.
    pub fn targets(&self, target: &MachineRef) -> Guard {
        self.target.guard_for(target)
    }

    pub(crate) fn decode_parts(
        event: PrimitiveVS<EventTag>,
        target: PrimitiveVS<MachineRef>,
        payload: Option<UnionVS>,
        clock: VectorClockVS,
    ) -> VsResult<Self> {
        Ok(Self {
            event,
            target,
            payload,
            clock,
        })
    }
}

impl ValueSummary for MessageVS {
    fn is_empty_vs(&self) -> bool {
        self.event.is_empty_vs() && self.target.is_empty_vs()
    }

    fn universe(&self) -> Guard {
        self.event.universe().or(self.target.universe())
    }

    fn restrict(&self, guard: Guard) -> Self {
        Self {
            event: self.event.restrict(guard),
            target: self.target.restrict(guard),
            payload: self
                .payload
                .as_ref()
                .map(|p| p.restrict(guard))
                .filter(|p| !p.is_empty_vs()),
            clock: self.clock.restrict(guard),
        }
    }

    fn merge(&self, others: &[Self]) -> Self {
        let event = self
            .event
            .merge(&others.iter().map(|o| o.event.clone()).collect::<Vec<_>>());
        let target = self
            .target
            .merge(&others.iter().map(|o| o.target.clone()).collect::<Vec<_>>());
        let clock = self
            .clock
            .merge(&others.iter().map(|o| o.clock.clone()).collect::<Vec<_>>());
        let payloads: Vec<UnionVS> = others
            .iter()
            .filter_map(|o| o.payload.clone())
            .collect();
        let payload = match self.payload.clone() {
            Some(p) => Some(p.merge(&payloads)),
            None => payloads
                .split_first()
                .map(|(first, rest)| first.merge(rest)),
        };
        Self {
            event,
            target,
            payload,
            clock,
        }
    }

    fn symbolic_equals(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        let u = pc.and(self.universe()).and(other.universe());
        let mut acc = self
            .event
            .symbolic_equals(&other.event, u)
            .true_guard()
            .and(self.target.symbolic_equals(&other.target, u).true_guard());
        acc = match (&self.payload, &other.payload) {
            (Some(a), Some(b)) => acc.and(a.symbolic_equals(b, u).true_guard().or(u.not())),
            (None, None) => acc,
            _ => Guard::const_false(),
        };
        PrimitiveVS::from_guarded([(true, acc.and(u)), (false, u.and(acc.not()))])
    }
}
