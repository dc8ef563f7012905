use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// The three fixed subtree roots under one device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreePath {
    AccessLog,
    Sessions,
    CurrentStatus,
}

impl TreePath {
    pub const ALL: [TreePath; 3] = [Self::AccessLog, Self::Sessions, Self::CurrentStatus];

    pub fn segment(&self) -> &'static str {
        match self {
            Self::AccessLog => "accessLog",
            Self::Sessions => "sessions",
            Self::CurrentStatus => "currentStatus",
        }
    }

    /// Full store path for a device, e.g. `users/f77c7551/sessions`.
    pub fn for_device(&self, device_id: &str) -> String {
        format!("users/{device_id}/{}", self.segment())
    }
}

/// One pushed full-subtree replacement. `value` is `None` when the subtree
/// holds no data. Revisions increase monotonically per path so consumers can
/// discard superseded in-flight snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotEvent {
    pub revision: u64,
    pub value: Option<Value>,
}

pub type SnapshotHandler = Box<dyn Fn(SnapshotEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("snapshot source i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot source payload was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot stream request failed: {0}")]
    Stream(String),
    #[error("subscriber registry lock poisoned")]
    RegistryPoisoned,
}

/// Path-scoped subscription contract of the remote store. Subscribing fires
/// the handler immediately with the current snapshot, then again on every
/// change, until the returned handle is released.
pub trait SnapshotSource: Send + Sync {
    fn subscribe(
        &self,
        path: TreePath,
        handler: SnapshotHandler,
    ) -> Result<Subscription, SourceError>;
}

/// Release handle for one subscription. `unsubscribe` is idempotent and runs
/// on drop as well, so the channel is released exactly once on every exit
/// path.
pub struct Subscription {
    id: Uuid,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(id: Uuid, release: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            id,
            release: Some(release),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("released", &self.release.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use uuid::Uuid;

    use super::{Subscription, TreePath};

    #[test]
    fn renders_device_scoped_paths() {
        assert_eq!(
            TreePath::AccessLog.for_device("f77c7551"),
            "users/f77c7551/accessLog"
        );
        assert_eq!(
            TreePath::Sessions.for_device("f77c7551"),
            "users/f77c7551/sessions"
        );
        assert_eq!(
            TreePath::CurrentStatus.for_device("f77c7551"),
            "users/f77c7551/currentStatus"
        );
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let releases = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&releases);
        let mut subscription = Subscription::new(
            Uuid::new_v4(),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        subscription.unsubscribe();
        subscription.unsubscribe();
        drop(subscription);

        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_releases_exactly_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&releases);

        {
            let _subscription = Subscription::new(
                Uuid::new_v4(),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
