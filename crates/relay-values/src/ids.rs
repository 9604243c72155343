//! Handles stored inside value summaries: event tags, machine references,
//! state references, and concrete map keys.
//!
//! Handles are identities, never owned pointers: a [`MachineRef`] is an
//! arena index plus display metadata, stable for the whole run.

use std::fmt;
use std::sync::Arc;

/// Delivery class of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Ordinary asynchronous event.
    Async,
    /// Synchronous event: its delivery is prioritized over ordinary sends.
    Sync,
    /// The machine-creation event minted by `create`.
    Create,
}

/// An event name plus its delivery class.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventTag {
    name: Arc<str>,
    kind: EventKind,
}

impl EventTag {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            kind: EventKind::Async,
        }
    }

    pub fn sync(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            kind: EventKind::Sync,
        }
    }

    /// The distinguished machine-creation event.
    pub fn create() -> Self {
        Self {
            name: Arc::from("$create"),
            kind: EventKind::Create,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_create(&self) -> bool {
        self.kind == EventKind::Create
    }

    pub fn is_sync(&self) -> bool {
        self.kind == EventKind::Sync
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Handle to a machine instance: arena index plus class/instance metadata
/// for display. Identity is the arena index alone.
#[derive(Clone, Debug)]
pub struct MachineRef {
    gid: usize,
    class: Arc<str>,
    instance: u64,
}

impl MachineRef {
    pub fn new(gid: usize, class: Arc<str>, instance: u64) -> Self {
        Self {
            gid,
            class,
            instance,
        }
    }

    /// Arena index in the scheduler's machine list.
    pub fn gid(&self) -> usize {
        self.gid
    }

    pub fn class(&self) -> &Arc<str> {
        &self.class
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }
}

impl PartialEq for MachineRef {
    fn eq(&self, other: &Self) -> bool {
        self.gid == other.gid
    }
}

impl Eq for MachineRef {}

impl std::hash::Hash for MachineRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.gid.hash(state);
    }
}

impl PartialOrd for MachineRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MachineRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.gid.cmp(&other.gid)
    }
}

impl fmt::Display for MachineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.class, self.instance)
    }
}

/// Handle to a declared state of a machine class.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StateRef {
    idx: u32,
    name: Arc<str>,
    hot: bool,
}

impl StateRef {
    pub fn new(idx: u32, name: Arc<str>, hot: bool) -> Self {
        Self { idx, name, hot }
    }

    pub fn idx(&self) -> u32 {
        self.idx
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hot states carry a liveness obligation: remaining in one at the end
    /// of execution is a violation.
    pub fn is_hot(&self) -> bool {
        self.hot
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Concrete scalar usable as a map key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Event(EventTag),
    Machine(MachineRef),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{}", b),
            Key::Int(n) => write!(f, "{}", n),
            Key::Str(s) => write!(f, "\"{}\"", s),
            Key::Event(e) => write!(f, "{}", e),
            Key::Machine(m) => write!(f, "{}", m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_ref_identity_is_gid() {
        let a = MachineRef::new(3, Arc::from("Server"), 0);
        let b = MachineRef::new(3, Arc::from("Server"), 0);
        let c = MachineRef::new(4, Arc::from("Server"), 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "Server(0)");
    }

    #[test]
    fn test_event_kinds() {
        let e = EventTag::new("PING");
        assert!(!e.is_create());
        assert!(!e.is_sync());
        assert!(EventTag::create().is_create());
        assert!(EventTag::sync("LOCK").is_sync());
        assert_eq!(EventTag::new("PING"), e);
        assert_ne!(EventTag::sync("PING"), e);
    }
}
