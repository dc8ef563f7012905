use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::Value;

use crate::adapters::memory::InMemorySource;
use crate::adapters::source::{
    SnapshotHandler, SnapshotSource, SourceError, Subscription, TreePath,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One server-sent event from the store's streaming REST endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Replace the subtree at `path` with `data`.
    Put { path: String, data: Value },
    /// Shallow-merge the children of `data` into the subtree at `path`.
    Patch { path: String, data: Value },
    KeepAlive,
    /// The server ended the stream; the client must reconnect.
    Cancel,
    AuthRevoked,
}

/// Streams each subscribed path from the hosted store's REST endpoint
/// (`GET {base}/{path}.json` with `Accept: text/event-stream`), folds the
/// put/patch events into a cached subtree, and publishes the full snapshot
/// into a hub after every change. On stream failure the prior snapshot stays
/// visible and the worker reconnects after a short delay.
pub struct RtdbSource {
    base_url: String,
    device_id: String,
    hub: InMemorySource,
    stop_flag: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    streaming: Mutex<HashSet<TreePath>>,
}

impl RtdbSource {
    pub fn new(base_url: &str, device_id: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            device_id: device_id.to_string(),
            hub: InMemorySource::new(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            streaming: Mutex::new(HashSet::new()),
        }
    }

    /// Signals every stream worker to exit at its next reconnect check.
    /// Workers blocked in a read finish when the server closes or times out
    /// the connection; they are not joined here.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    pub fn stream_url(&self, path: TreePath) -> String {
        format!("{}/{}.json", self.base_url, path.for_device(&self.device_id))
    }

    fn ensure_stream(&self, path: TreePath) -> Result<(), SourceError> {
        let mut streaming = self
            .streaming
            .lock()
            .map_err(|_| SourceError::RegistryPoisoned)?;
        if !streaming.insert(path) {
            return Ok(());
        }
        drop(streaming);

        let url = self.stream_url(path);
        let hub = self.hub.clone();
        let stop_flag = Arc::clone(&self.stop_flag);
        let worker = std::thread::spawn(move || {
            stream_worker(&url, path, &hub, &stop_flag);
        });

        self.workers
            .lock()
            .map_err(|_| SourceError::RegistryPoisoned)?
            .push(worker);
        Ok(())
    }
}

impl Drop for RtdbSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SnapshotSource for RtdbSource {
    fn subscribe(
        &self,
        path: TreePath,
        handler: SnapshotHandler,
    ) -> Result<Subscription, SourceError> {
        self.ensure_stream(path)?;
        self.hub.subscribe(path, handler)
    }
}

fn stream_worker(url: &str, path: TreePath, hub: &InMemorySource, stop_flag: &AtomicBool) {
    let client = match reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(None)
        .build()
    {
        Ok(client) => client,
        Err(error) => {
            tracing::error!(error = %error, "failed to build streaming http client");
            return;
        }
    };

    let mut cache = Value::Null;

    while !stop_flag.load(Ordering::Relaxed) {
        match open_stream(&client, url) {
            Ok(response) => {
                tracing::info!(path = path.segment(), "snapshot stream connected");
                if let Err(error) = consume_stream(response, path, hub, &mut cache, stop_flag) {
                    tracing::warn!(error = %error, path = path.segment(), "snapshot stream interrupted");
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, path = path.segment(), "snapshot stream connect failed");
            }
        }

        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(RECONNECT_DELAY);
    }
}

fn open_stream(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<reqwest::blocking::Response, SourceError> {
    let response = client
        .get(url)
        .header("Accept", "text/event-stream")
        .send()
        .map_err(|error| SourceError::Stream(error.to_string()))?;

    if !response.status().is_success() {
        return Err(SourceError::Stream(format!(
            "stream request returned status {}",
            response.status()
        )));
    }

    Ok(response)
}

fn consume_stream(
    response: reqwest::blocking::Response,
    path: TreePath,
    hub: &InMemorySource,
    cache: &mut Value,
    stop_flag: &AtomicBool,
) -> Result<(), SourceError> {
    let reader = BufReader::new(response);
    let mut event_name = String::new();
    let mut data_lines: Vec<String> = Vec::new();

    for line in reader.lines() {
        if stop_flag.load(Ordering::Relaxed) {
            return Ok(());
        }
        let line = line?;

        if line.is_empty() {
            if !event_name.is_empty() {
                let frame = parse_frame(&event_name, &data_lines.join("\n"))?;
                dispatch_frame(frame, path, hub, cache)?;
            }
            event_name.clear();
            data_lines.clear();
        } else if let Some(name) = line.strip_prefix("event:") {
            event_name = name.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.trim_start().to_string());
        }
    }

    Err(SourceError::Stream("stream ended".to_string()))
}

fn dispatch_frame(
    frame: StreamEvent,
    path: TreePath,
    hub: &InMemorySource,
    cache: &mut Value,
) -> Result<(), SourceError> {
    match frame {
        StreamEvent::Put { path: at, data } => {
            apply_put(cache, &at, data);
            publish_cache(hub, path, cache)?;
        }
        StreamEvent::Patch { path: at, data } => {
            apply_patch(cache, &at, data);
            publish_cache(hub, path, cache)?;
        }
        StreamEvent::KeepAlive => {}
        StreamEvent::Cancel => {
            return Err(SourceError::Stream("stream cancelled by server".to_string()));
        }
        StreamEvent::AuthRevoked => {
            return Err(SourceError::Stream("stream credentials revoked".to_string()));
        }
    }
    Ok(())
}

fn publish_cache(hub: &InMemorySource, path: TreePath, cache: &Value) -> Result<(), SourceError> {
    let value = (!cache.is_null()).then(|| cache.clone());
    hub.publish(path, value)?;
    Ok(())
}

/// Parses one assembled SSE frame into a stream event.
pub fn parse_frame(event_name: &str, data: &str) -> Result<StreamEvent, SourceError> {
    match event_name {
        "keep-alive" => Ok(StreamEvent::KeepAlive),
        "cancel" => Ok(StreamEvent::Cancel),
        "auth_revoked" => Ok(StreamEvent::AuthRevoked),
        "put" | "patch" => {
            let body: Value = serde_json::from_str(data)?;
            let at = body
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or("/")
                .to_string();
            let data = body.get("data").cloned().unwrap_or(Value::Null);
            if event_name == "put" {
                Ok(StreamEvent::Put { path: at, data })
            } else {
                Ok(StreamEvent::Patch { path: at, data })
            }
        }
        other => Err(SourceError::Stream(format!(
            "unknown stream event: {other}"
        ))),
    }
}

/// Replaces the subtree at `path` ("/" for the whole cache). Writing null
/// removes the addressed child.
pub fn apply_put(cache: &mut Value, path: &str, data: Value) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        *cache = data;
        return;
    }

    set_child(cache, &segments, data);
}

/// Shallow-merges the children of `data` below `path`; null children remove
/// their key.
pub fn apply_patch(cache: &mut Value, path: &str, data: Value) {
    let Value::Object(children) = data else {
        return;
    };

    let base: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for (key, value) in children {
        let mut segments = base.clone();
        segments.push(&key);
        set_child(cache, &segments, value);
    }
}

fn set_child(cache: &mut Value, segments: &[&str], data: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut node = cache;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(serde_json::Map::new());
        }
        let Some(entries) = node.as_object_mut() else {
            return;
        };
        node = entries.entry(segment.to_string()).or_insert(Value::Null);
    }

    if !node.is_object() {
        *node = Value::Object(serde_json::Map::new());
    }
    let Some(entries) = node.as_object_mut() else {
        return;
    };
    if data.is_null() {
        entries.remove(*last);
    } else {
        entries.insert(last.to_string(), data);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::adapters::source::TreePath;

    use super::{RtdbSource, StreamEvent, apply_patch, apply_put, parse_frame};

    #[test]
    fn builds_device_scoped_stream_urls() {
        let source = RtdbSource::new("https://lab.example.app/", "f77c7551");

        assert_eq!(
            source.stream_url(TreePath::Sessions),
            "https://lab.example.app/users/f77c7551/sessions.json"
        );
    }

    #[test]
    fn parses_put_frame() {
        let frame = parse_frame("put", r#"{"path":"/","data":{"1":{"startTime":100}}}"#)
            .expect("put frame should parse");

        assert_eq!(
            frame,
            StreamEvent::Put {
                path: "/".to_string(),
                data: json!({"1": {"startTime": 100}}),
            }
        );
    }

    #[test]
    fn parses_patch_and_control_frames() {
        let patch = parse_frame("patch", r#"{"path":"/2","data":{"status":"completed"}}"#)
            .expect("patch frame should parse");
        assert_eq!(
            patch,
            StreamEvent::Patch {
                path: "/2".to_string(),
                data: json!({"status": "completed"}),
            }
        );

        assert_eq!(
            parse_frame("keep-alive", "null").expect("keep-alive should parse"),
            StreamEvent::KeepAlive
        );
        assert_eq!(
            parse_frame("cancel", "null").expect("cancel should parse"),
            StreamEvent::Cancel
        );
        assert_eq!(
            parse_frame("auth_revoked", "credential expired").expect("auth_revoked should parse"),
            StreamEvent::AuthRevoked
        );
    }

    #[test]
    fn rejects_unknown_event_names() {
        assert!(parse_frame("rewind", "null").is_err());
    }

    #[test]
    fn put_at_root_replaces_everything() {
        let mut cache = json!({"old": true});

        apply_put(&mut cache, "/", json!({"1": {"startTime": 100}}));

        assert_eq!(cache, json!({"1": {"startTime": 100}}));
    }

    #[test]
    fn put_at_child_path_sets_only_that_child() {
        let mut cache = json!({"1": {"startTime": 100}});

        apply_put(&mut cache, "/2", json!({"startTime": 200}));

        assert_eq!(
            cache,
            json!({"1": {"startTime": 100}, "2": {"startTime": 200}})
        );
    }

    #[test]
    fn put_null_removes_the_child() {
        let mut cache = json!({"1": {"startTime": 100}, "2": {"startTime": 200}});

        apply_put(&mut cache, "/1", Value::Null);

        assert_eq!(cache, json!({"2": {"startTime": 200}}));
    }

    #[test]
    fn put_creates_missing_intermediate_objects() {
        let mut cache = Value::Null;

        apply_put(&mut cache, "/2/energyUsed", json!(5.5));

        assert_eq!(cache, json!({"2": {"energyUsed": 5.5}}));
    }

    #[test]
    fn patch_merges_children_shallowly() {
        let mut cache = json!({"2": {"startTime": 200, "status": "active"}});

        apply_patch(
            &mut cache,
            "/2",
            json!({"status": "completed", "energyUsed": 7.25}),
        );

        assert_eq!(
            cache,
            json!({"2": {"startTime": 200, "status": "completed", "energyUsed": 7.25}})
        );
    }

    #[test]
    fn patch_with_null_child_removes_the_key() {
        let mut cache = json!({"2": {"startTime": 200, "endReason": "manual"}});

        apply_patch(&mut cache, "/2", json!({"endReason": null}));

        assert_eq!(cache, json!({"2": {"startTime": 200}}));
    }

    #[test]
    fn patch_with_non_object_data_is_ignored() {
        let mut cache = json!({"keep": 1});

        apply_patch(&mut cache, "/", json!(42));

        assert_eq!(cache, json!({"keep": 1}));
    }
}
