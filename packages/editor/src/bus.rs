//! # Change Notification Bus
//!
//! Fan-out of model changes to every subscribed listener.
//!
//! Delivery is ordered: events are queued and handed out one at a time, so
//! an edit issued by a listener while it reacts to an event is delivered
//! only after every listener has seen the current one.
//!
//! A listener never hears about edits it issued itself while reacting to a
//! notification. The bus tracks which listener is currently running and tags
//! everything enqueued meanwhile with it; delivery skips the tagged listener
//! and nobody else.
//!
//! The bus lives on the interactive thread and is not `Send`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

pub type ListenerId = u64;

/// One model change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChangeEvent {
    Added {
        parent: String,
        index: usize,
        node: String,
    },
    Removed {
        parent: String,
        index: usize,
        node: String,
    },
    Moved {
        node: String,
        old_parent: String,
        old_index: usize,
        new_parent: String,
        new_index: usize,
    },
    AttributeChanged {
        node: String,
        name: String,
        old: Option<String>,
        new: Option<String>,
    },
    TextChanged {
        node: String,
        old: Option<String>,
        new: Option<String>,
    },
    /// The whole model was replaced
    Reloaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Moved,
    Set,
    Reloaded,
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Added { .. } => ChangeKind::Added,
            ChangeEvent::Removed { .. } => ChangeKind::Removed,
            ChangeEvent::Moved { .. } => ChangeKind::Moved,
            ChangeEvent::AttributeChanged { .. } | ChangeEvent::TextChanged { .. } => ChangeKind::Set,
            ChangeEvent::Reloaded => ChangeKind::Reloaded,
        }
    }

    /// The element the event is about
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ChangeEvent::Added { node, .. }
            | ChangeEvent::Removed { node, .. }
            | ChangeEvent::Moved { node, .. }
            | ChangeEvent::AttributeChanged { node, .. }
            | ChangeEvent::TextChanged { node, .. } => Some(node),
            ChangeEvent::Reloaded => None,
        }
    }
}

pub trait ChangeListener {
    fn on_event(&self, event: &ChangeEvent);
}

/// An event together with the ids of every element it touches
///
/// `scope` holds the ancestry of the affected elements; scoped subscribers
/// receive the event when their root is in it. An empty scope reaches
/// everyone.
#[derive(Debug, Clone)]
pub struct Notification {
    pub event: ChangeEvent,
    pub scope: Vec<String>,
}

impl Notification {
    pub fn new(event: ChangeEvent, scope: Vec<String>) -> Self {
        Self { event, scope }
    }

    pub fn global(event: ChangeEvent) -> Self {
        Self {
            event,
            scope: Vec::new(),
        }
    }
}

struct Entry {
    id: ListenerId,
    scope: Option<String>,
    listener: Rc<dyn ChangeListener>,
}

struct Queued {
    notification: Notification,
    origin: Option<ListenerId>,
}

#[derive(Default)]
struct BusState {
    listeners: RefCell<Vec<Entry>>,
    queue: RefCell<VecDeque<Queued>>,
    dispatching: Cell<bool>,
    /// Listener whose callback is on the stack
    applying: Cell<Option<ListenerId>>,
    next_id: Cell<ListenerId>,
}

impl BusState {
    fn is_subscribed(&self, id: ListenerId) -> bool {
        self.listeners.borrow().iter().any(|e| e.id == id)
    }

    fn remove(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|e| e.id != id);
    }
}

#[derive(Clone, Default)]
pub struct ChangeBus {
    state: Rc<BusState>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for the whole model, or for the subtree below `scope`
    pub fn subscribe(&self, scope: Option<&str>, listener: Rc<dyn ChangeListener>) -> Subscription {
        let id = self.state.next_id.get() + 1;
        self.state.next_id.set(id);
        self.state.listeners.borrow_mut().push(Entry {
            id,
            scope: scope.map(str::to_string),
            listener,
        });
        tracing::trace!(listener = id, ?scope, "subscribed");

        Subscription {
            id,
            bus: Rc::downgrade(&self.state),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state.listeners.borrow().len()
    }

    pub fn is_dispatching(&self) -> bool {
        self.state.dispatching.get()
    }

    pub fn notify(&self, notification: Notification) {
        self.publish(vec![notification]);
    }

    /// Queue a batch of notifications and deliver them in order
    ///
    /// When called from inside a listener callback, the batch is delivered
    /// after the event currently being dispatched.
    pub fn publish(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }

        let origin = self.state.applying.get();
        {
            let mut queue = self.state.queue.borrow_mut();
            queue.extend(
                notifications
                    .into_iter()
                    .map(|notification| Queued { notification, origin }),
            );
        }

        if self.state.dispatching.get() {
            return;
        }
        self.dispatch();
    }

    fn dispatch(&self) {
        let _dispatching = DispatchGuard::enter(&self.state);

        loop {
            let next = self.state.queue.borrow_mut().pop_front();
            let Some(queued) = next else { break };

            let targets: Vec<(ListenerId, Rc<dyn ChangeListener>)> = self
                .state
                .listeners
                .borrow()
                .iter()
                .filter(|e| in_scope(e.scope.as_deref(), &queued.notification.scope))
                .map(|e| (e.id, e.listener.clone()))
                .collect();

            for (id, listener) in targets {
                if queued.origin == Some(id) {
                    continue;
                }
                // Unsubscribed by an earlier listener of this same event
                if !self.state.is_subscribed(id) {
                    continue;
                }

                let _applying = ApplyingGuard::enter(&self.state, id);
                listener.on_event(&queued.notification.event);
            }
        }
    }
}

fn in_scope(subscribed: Option<&str>, touched: &[String]) -> bool {
    match subscribed {
        None => true,
        Some(_) if touched.is_empty() => true,
        Some(root) => touched.iter().any(|id| id == root),
    }
}

struct DispatchGuard<'a> {
    state: &'a BusState,
}

impl<'a> DispatchGuard<'a> {
    fn enter(state: &'a BusState) -> Self {
        state.dispatching.set(true);
        Self { state }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.state.dispatching.set(false);
    }
}

/// Marks `listener` as the one reacting right now, restoring the outer mark on drop
struct ApplyingGuard<'a> {
    state: &'a BusState,
    previous: Option<ListenerId>,
}

impl<'a> ApplyingGuard<'a> {
    fn enter(state: &'a BusState, listener: ListenerId) -> Self {
        let previous = state.applying.replace(Some(listener));
        Self { state, previous }
    }
}

impl Drop for ApplyingGuard<'_> {
    fn drop(&mut self) {
        self.state.applying.set(self.previous);
    }
}

/// Keeps a listener registered; dropping it unsubscribes
pub struct Subscription {
    id: ListenerId,
    bus: Weak<BusState>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.bus.upgrade() {
            state.remove(self.id);
            tracing::trace!(listener = self.id, "unsubscribed");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
