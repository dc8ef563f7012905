use std::fs;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::adapters::memory::InMemorySource;
use crate::adapters::source::{
    SnapshotHandler, SnapshotSource, SourceError, Subscription, TreePath,
};

#[derive(Debug, Clone, Deserialize)]
struct ScriptFile {
    #[serde(default = "default_loop")]
    loop_forever: bool,
    frames: Vec<Value>,
}

fn default_loop() -> bool {
    true
}

/// File-driven snapshot source: replays scripted full-subtree frames into a
/// hub at a fixed interval, so the dashboard can run without the hosted
/// store. Each frame is an object with any of the three subtree keys; a key
/// that is present but null empties that subtree, an absent key leaves the
/// prior snapshot in place.
pub struct ReplaySource {
    hub: InMemorySource,
    stop_flag: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ReplaySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySource")
            .field("stopped", &self.stop_flag.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ReplaySource {
    pub fn start(script_path: &str, interval: Duration) -> Result<Self, SourceError> {
        let content = fs::read_to_string(script_path)?;
        let script: ScriptFile = serde_json::from_str(&content)?;

        if script.frames.is_empty() {
            return Err(SourceError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "replay script must contain at least one frame",
            )));
        }

        let hub = InMemorySource::new();
        let stop_flag = Arc::new(AtomicBool::new(false));

        let worker_hub = hub.clone();
        let worker_stop = Arc::clone(&stop_flag);
        let worker = std::thread::spawn(move || {
            replay_loop(&script, &worker_hub, &worker_stop, interval);
        });

        Ok(Self {
            hub,
            stop_flag,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let handle = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::warn!("replay worker thread panicked");
        }
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

impl SnapshotSource for ReplaySource {
    fn subscribe(
        &self,
        path: TreePath,
        handler: SnapshotHandler,
    ) -> Result<Subscription, SourceError> {
        self.hub.subscribe(path, handler)
    }
}

fn replay_loop(
    script: &ScriptFile,
    hub: &InMemorySource,
    stop_flag: &AtomicBool,
    interval: Duration,
) {
    loop {
        for frame in &script.frames {
            if stop_flag.load(Ordering::Relaxed) {
                return;
            }
            publish_frame(hub, frame);
            std::thread::sleep(interval);
        }

        if !script.loop_forever {
            return;
        }
    }
}

fn publish_frame(hub: &InMemorySource, frame: &Value) {
    let Some(subtrees) = frame.as_object() else {
        tracing::warn!("replay frame is not an object; skipping");
        return;
    };

    for path in TreePath::ALL {
        if let Some(snapshot) = subtrees.get(path.segment()) {
            let value = (!snapshot.is_null()).then(|| snapshot.clone());
            if let Err(error) = hub.publish(path, value) {
                tracing::warn!(error = %error, path = path.segment(), "replay publish failed");
            }
        }
    }
}
