// src/manager/events.rs

//! Public events published by the module manager.
//!
//! Delivery is depth-1 per event kind and publication never blocks the
//! event loop: `GlobalChanged` and `AmbiguousState` are idempotent and
//! deduplicate while undelivered, and pending `ModulesChanged` payloads
//! are unioned by module name. The consumer always drains the most
//! recent folded state.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

/// Kinds of module change reported in `ModulesChanged`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Module values changed; the module should be re-run
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleChange {
    pub name: String,
    pub change: ChangeType,
}

impl ModuleChange {
    pub fn changed(name: impl Into<String>) -> Self {
        Self { name: name.into(), change: ChangeType::Changed }
    }
}

/// Events delivered to the outer operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Global values or the effective enabled set changed; a full
    /// discovery pass is needed
    GlobalChanged,
    /// Values of individual modules changed
    ModulesChanged(Vec<ModuleChange>),
    /// A reconciliation could not complete; its input is retained and can
    /// be replayed with `retry`
    AmbiguousState,
}

/// Undelivered events, folded by kind
#[derive(Debug, Default)]
struct Pending {
    global: bool,
    changes: Vec<ModuleChange>,
    ambiguous: bool,
}

impl Pending {
    fn fold(&mut self, event: Event) {
        match event {
            Event::GlobalChanged => self.global = true,
            Event::AmbiguousState => self.ambiguous = true,
            Event::ModulesChanged(changes) => {
                for change in changes {
                    if !self.changes.iter().any(|c| c.name == change.name) {
                        self.changes.push(change);
                    }
                }
            }
        }
    }

    fn pop(&mut self) -> Option<Event> {
        if self.global {
            self.global = false;
            return Some(Event::GlobalChanged);
        }
        if !self.changes.is_empty() {
            return Some(Event::ModulesChanged(std::mem::take(&mut self.changes)));
        }
        if self.ambiguous {
            self.ambiguous = false;
            return Some(Event::AmbiguousState);
        }
        None
    }
}

struct Shared {
    pending: Mutex<Pending>,
    notify: Notify,
}

/// Create the publisher/receiver pair for the public event channel
pub fn event_channel() -> (EventPublisher, EventReceiver) {
    let shared = Arc::new(Shared {
        pending: Mutex::new(Pending::default()),
        notify: Notify::new(),
    });
    (
        EventPublisher { shared: shared.clone() },
        EventReceiver { shared },
    )
}

/// Non-blocking, coalescing publisher
pub struct EventPublisher {
    shared: Arc<Shared>,
}

impl EventPublisher {
    pub fn publish(&self, event: Event) {
        debug!("publish event {:?}", event);
        self.shared
            .pending
            .lock()
            .expect("event pending lock")
            .fold(event);
        self.shared.notify.notify_one();
    }
}

/// Consumer end handed to the outer operator
pub struct EventReceiver {
    shared: Arc<Shared>,
}

impl EventReceiver {
    /// Wait for the next event. Events of the same kind published while
    /// the consumer was busy arrive folded into one.
    pub async fn recv(&mut self) -> Event {
        loop {
            if let Some(event) = self.shared.pending.lock().expect("event pending lock").pop() {
                return event;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Take a pending event without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        self.shared.pending.lock().expect("event pending lock").pop()
    }
}
