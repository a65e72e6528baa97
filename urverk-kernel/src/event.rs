//! ## urverk-kernel::event
//! **Event values**
//!
//! Immutable after creation. λ produces [`OutputEvent`]s bound to a source
//! output port; routing clones them into [`ExternalEvent`]s with the target
//! input port bound. An event lives from the call that emits it to the
//! transition that consumes it, never past the end of the bag.

use urverk_core::value::{Map, Value};

/// Emitted by a model's output function, bound to one of its output ports.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputEvent {
    pub port: String,
    pub attributes: Map,
}

/// An inbound event queued for delivery on a target input port.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalEvent {
    /// Target input port on the receiving model.
    pub port: String,
    /// Path of the emitting model; `None` for kernel-injected events.
    pub source: Option<String>,
    pub attributes: Map,
}

impl ExternalEvent {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn on_port(&self, port: &str) -> bool {
        self.port == port
    }
}

/// Collector handed to λ; keeps emission order.
#[derive(Debug, Default)]
pub struct OutputEvents {
    events: Vec<OutputEvent>,
}

impl OutputEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits an event with an attribute map.
    pub fn emit(&mut self, port: impl Into<String>, attributes: Map) {
        self.events.push(OutputEvent {
            port: port.into(),
            attributes,
        });
    }

    /// Emits a bare event (no payload), the common signalling case.
    pub fn emit_empty(&mut self, port: impl Into<String>) {
        self.emit(port, Map::new());
    }

    /// Emits an event with a single attribute named `value`.
    pub fn emit_value(&mut self, port: impl Into<String>, value: Value) {
        let mut attributes = Map::new();
        attributes.insert("value", value);
        self.emit(port, attributes);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_vec(self) -> Vec<OutputEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emission_order_is_kept() {
        let mut out = OutputEvents::new();
        out.emit_empty("b");
        out.emit_value("a", Value::Integer(1));
        let events = out.into_vec();
        assert_eq!(events[0].port, "b");
        assert_eq!(events[1].port, "a");
        assert_eq!(events[1].attributes.get("value"), Some(&Value::Integer(1)));
    }
}
