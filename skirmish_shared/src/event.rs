//! Event and messaging system.
//!
//! A small named-event node. Every stateful object (entities, client
//! sessions) owns one and exposes it through [`Observable`].
//! - Events are identified by name (`"entity.die"`, `"client.disconnect"`).
//! - Arguments are positional JSON values.
//! - Handlers run synchronously, in attach order, on the triggering thread.

use std::collections::HashMap;

use serde_json::Value;

/// Boxed event handler.
pub type Handler = Box<dyn FnMut(&[Value]) + Send>;

/// Named event node.
#[derive(Default)]
pub struct EventNode {
    handlers: HashMap<String, Vec<Handler>>,
}

impl EventNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a handler for an event name.
    pub fn on<F>(&mut self, event: &str, handler: F)
    where
        F: FnMut(&[Value]) + Send + 'static,
    {
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    /// Detaches every handler for an event name.
    pub fn off(&mut self, event: &str) {
        self.handlers.remove(event);
    }

    /// Invokes the handlers of an event. Returns how many ran.
    pub fn trigger(&mut self, event: &str, args: &[Value]) -> usize {
        match self.handlers.get_mut(event) {
            Some(handlers) => {
                for handler in handlers.iter_mut() {
                    handler(args);
                }
                handlers.len()
            }
            None => 0,
        }
    }

    /// Number of handlers attached to an event name.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<_> = self.handlers.keys().collect();
        events.sort();
        f.debug_struct("EventNode").field("events", &events).finish()
    }
}

/// Capability for objects that emit named events.
pub trait Observable {
    fn events(&mut self) -> &mut EventNode;

    fn on<F>(&mut self, event: &str, handler: F)
    where
        F: FnMut(&[Value]) + Send + 'static,
        Self: Sized,
    {
        self.events().on(event, handler);
    }

    fn trigger(&mut self, event: &str, args: &[Value]) -> usize {
        self.events().trigger(event, args)
    }
}
