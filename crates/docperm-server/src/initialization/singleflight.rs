//! Per-path state table for deduplicating concurrent initializations.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use docperm_domain::{InitStatus, ResourcePath};
use tokio::sync::broadcast;

/// Outcome shared with every caller waiting on the same path.
///
/// Errors travel as their rendered message so the outcome can be cloned
/// to each follower.
pub type InitOutcome = Result<(), String>;

/// Tracked state of a path. Absence from the table means not initialized.
enum PathState {
    /// An initialization is in flight; subscribe to learn its outcome.
    Initializing(broadcast::Sender<InitOutcome>),
    /// The resource is known to exist.
    Initialized,
}

/// Result of trying to join the initialization of a path.
pub enum InitSlot {
    /// The path is already initialized.
    Ready,
    /// We won the race and must run the initialization.
    /// Contains the sender to broadcast the outcome.
    Leader(broadcast::Sender<InitOutcome>),
    /// Another task is initializing; wait for its outcome.
    Follower(broadcast::Receiver<InitOutcome>),
}

/// Lock-sharded table of path states.
///
/// All transitions go through DashMap's entry API so that checking the
/// state and registering as leader or follower happen atomically.
#[derive(Default)]
pub struct PathStates {
    states: DashMap<ResourcePath, PathState>,
}

impl PathStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, path: &ResourcePath) -> InitStatus {
        match self.states.get(path).as_deref() {
            None => InitStatus::NotInitialized,
            Some(PathState::Initializing(_)) => InitStatus::Initializing,
            Some(PathState::Initialized) => InitStatus::Initialized,
        }
    }

    /// Atomically inspect the path and join or start its initialization.
    pub fn acquire(&self, path: &ResourcePath) -> InitSlot {
        if let Some(state) = self.states.get(path) {
            if matches!(*state, PathState::Initialized) {
                return InitSlot::Ready;
            }
        }

        match self.states.entry(path.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                PathState::Initialized => InitSlot::Ready,
                PathState::Initializing(tx) => InitSlot::Follower(tx.subscribe()),
            },
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(PathState::Initializing(tx.clone()));
                InitSlot::Leader(tx)
            }
        }
    }

    /// Record the leader's outcome. Success marks the path initialized,
    /// failure forgets it so the next caller starts over.
    fn finish(&self, path: &ResourcePath, outcome: &InitOutcome) {
        match outcome {
            Ok(()) => {
                self.states.insert(path.clone(), PathState::Initialized);
            }
            Err(_) => {
                self.abandon(path);
            }
        }
    }

    /// Drop an in-flight marker without touching a completed one.
    fn abandon(&self, path: &ResourcePath) {
        self.states
            .remove_if(path, |_, state| matches!(state, PathState::Initializing(_)));
    }
}

/// RAII guard held by the leader.
///
/// If the leader's future is dropped or panics before finishing, the
/// in-flight marker is removed; waiting followers then see the channel
/// close and retry.
pub struct LeaderGuard<'a> {
    states: &'a PathStates,
    path: ResourcePath,
    completed: bool,
}

impl<'a> LeaderGuard<'a> {
    pub fn new(states: &'a PathStates, path: ResourcePath) -> Self {
        Self {
            states,
            path,
            completed: false,
        }
    }

    /// Publish the outcome to the table and to every follower.
    pub fn complete(mut self, sender: broadcast::Sender<InitOutcome>, outcome: InitOutcome) {
        self.states.finish(&self.path, &outcome);
        self.completed = true;
        // No receivers just means nobody was waiting.
        let _ = sender.send(outcome);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.states.abandon(&self.path);
        }
    }
}
