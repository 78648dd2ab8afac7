//! In-process fan-out of agent events.
//!
//! Handlers run synchronously on the emitting task, in subscription order.
//! The handler list is snapshotted before each delivery, so a handler may
//! subscribe or unsubscribe (itself included) without deadlocking.

use std::sync::{Arc, Mutex, PoisonError};

use crate::stream_event::AgentEvent;

type Handler = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// An ordered set of event handlers.
#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<Mutex<Registry>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. It stays registered until the returned handle's
    /// [`Subscription::unsubscribe`] is called.
    pub fn subscribe(&self, handler: impl Fn(&AgentEvent) + Send + Sync + 'static) -> Subscription {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every current handler.
    pub fn emit(&self, event: &AgentEvent) {
        let handlers: Vec<Handler> = {
            let registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            registry.handlers.iter().map(|(_, h)| h.clone()).collect()
        };
        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.len())
            .finish()
    }
}

/// Handle for removing a handler.
///
/// Dropping the handle leaves the handler registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: std::sync::Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.handlers.retain(|(id, _)| *id != self.id);
        }
    }
}
