use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use crate::adapters::source::{
    SnapshotEvent, SnapshotHandler, SnapshotSource, SourceError, Subscription, TreePath,
};

#[derive(Default)]
struct PathChannel {
    latest: Option<Value>,
    revision: u64,
    subscribers: HashMap<Uuid, Arc<SnapshotHandler>>,
}

/// Process-local snapshot hub: remembers the latest snapshot per path and
/// fans each publish out to the registered subscribers. Serves as the
/// delivery stage for the replay and stream sources and as the test double
/// for the remote store.
#[derive(Clone, Default)]
pub struct InMemorySource {
    registry: Arc<Mutex<HashMap<TreePath, PathChannel>>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot for one path and delivers it to every
    /// subscriber. Returns the new revision.
    pub fn publish(&self, path: TreePath, value: Option<Value>) -> Result<u64, SourceError> {
        let (revision, handlers) = {
            let mut registry = self
                .registry
                .lock()
                .map_err(|_| SourceError::RegistryPoisoned)?;
            let channel = registry.entry(path).or_default();
            channel.revision += 1;
            channel.latest = value.clone();
            let handlers: Vec<Arc<SnapshotHandler>> =
                channel.subscribers.values().cloned().collect();
            (channel.revision, handlers)
        };

        // Deliver outside the lock so a handler may subscribe or publish.
        for handler in handlers {
            handler(SnapshotEvent {
                revision,
                value: value.clone(),
            });
        }

        Ok(revision)
    }
}

impl SnapshotSource for InMemorySource {
    fn subscribe(
        &self,
        path: TreePath,
        handler: SnapshotHandler,
    ) -> Result<Subscription, SourceError> {
        let id = Uuid::new_v4();
        let handler = Arc::new(handler);

        let initial = {
            let mut registry = self
                .registry
                .lock()
                .map_err(|_| SourceError::RegistryPoisoned)?;
            let channel = registry.entry(path).or_default();
            channel.subscribers.insert(id, Arc::clone(&handler));
            SnapshotEvent {
                revision: channel.revision,
                value: channel.latest.clone(),
            }
        };

        // The contract fires immediately with the current snapshot.
        handler(initial);

        let registry = Arc::clone(&self.registry);
        let release = Box::new(move || {
            if let Ok(mut registry) = registry.lock()
                && let Some(channel) = registry.get_mut(&path)
            {
                channel.subscribers.remove(&id);
            }
        });

        Ok(Subscription::new(id, release))
    }
}
