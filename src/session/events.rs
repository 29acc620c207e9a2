//! Observer registry for session changes.
//!
//! Listeners run synchronously on the task that changed the state, after the
//! state lock has been released, so a listener may call back into the
//! controller's read methods.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock,
};

use serde::Serialize;

use super::state::SessionSnapshot;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionEventKind {
    LoadStarted,
    LoadFinished,
    RecordAdded,
    RecordDeleted,
    RecordsCleared,
    /// A durable write failed and the optimistic change was undone.
    RolledBack,
    RefreshStarted,
    RefreshFinished,
    ErrorCleared,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub snapshot: SessionSnapshot,
}

pub type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl Listeners {
    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push((id, listener));
        id
    }

    /// Returns whether the id was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit(&self, event: &SessionEvent) {
        // Copy out so listeners can (un)subscribe without deadlocking.
        let listeners: Vec<Listener> = match self.entries.read() {
            Ok(guard) => guard.iter().map(|(_, l)| l.clone()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(_, l)| l.clone()).collect(),
        };

        for listener in listeners {
            listener(event);
        }
    }
}
