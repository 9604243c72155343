//! The program-under-test contract.

use crate::machine::MachineDef;
use relay_values::EventTag;
use std::collections::HashMap;
use std::sync::Arc;

/// A program of communicating state machines: the entry machine, the
/// observing monitors, and the event-to-monitor listener map.
#[derive(Debug, Clone)]
pub struct Program {
    main: Arc<MachineDef>,
    monitors: Vec<Arc<MachineDef>>,
    listeners: HashMap<EventTag, Vec<usize>>,
}

impl Program {
    pub fn new(main: Arc<MachineDef>) -> Self {
        Self {
            main,
            monitors: Vec::new(),
            listeners: HashMap::new(),
        }
    }

    /// Register a monitor listening on the given events. Returns `self`
    /// for chaining, mirroring the machine builder.
    pub fn with_monitor(mut self, monitor: Arc<MachineDef>, observes: &[EventTag]) -> Self {
        let idx = self.monitors.len();
        self.monitors.push(monitor);
        for event in observes {
            self.listeners.entry(event.clone()).or_default().push(idx);
        }
        self
    }

    pub fn start(&self) -> &Arc<MachineDef> {
        &self.main
    }

    pub fn monitors(&self) -> &[Arc<MachineDef>] {
        &self.monitors
    }

    /// Indices (into [`monitors`](Self::monitors)) of the monitors
    /// listening for `event`.
    pub fn listeners_for(&self, event: &EventTag) -> &[usize] {
        self.listeners
            .get(event)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_registration() {
        let main = MachineDef::builder("Main").state("Init").build();
        let mon = MachineDef::builder("Watch").state("Idle").build();
        let x = EventTag::new("X");
        let p = Program::new(main).with_monitor(mon, &[x.clone()]);
        assert_eq!(p.monitors().len(), 1);
        assert_eq!(p.listeners_for(&x), &[0]);
        assert!(p.listeners_for(&EventTag::new("Y")).is_empty());
    }
}
