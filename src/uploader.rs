//! Finalizer and uploader
//!
//! Turns a finalized connection into a named, serialized object and writes
//! it to every configured sink. Each connection uploads as its own spawned
//! task with no shared mutable state; a semaphore bounds the fan-out so a
//! burst of simultaneously finalizing connections cannot spawn unbounded
//! concurrent writes. `shutdown` drains every outstanding task so the
//! process never exits mid-write.

use crate::aggregate::{FinalizedConn, EVENT_TYPE_ACCEPT};
use crate::sink::Sink;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug)]
pub enum UploadError {
    /// No `accept` event in the retained payload, so no object name can be
    /// derived. Possible when the payload was truncated or the connection
    /// never reached that stage.
    MissingAnchor { conn_id: i64 },
    /// The anchor event exists but lacks a field the object name needs.
    MissingAnchorField { conn_id: i64, field: &'static str },
    Serialization(serde_json::Error),
}

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        UploadError::Serialization(err)
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::MissingAnchor { conn_id } => {
                write!(f, "no accept event retained for connection {}", conn_id)
            }
            UploadError::MissingAnchorField { conn_id, field } => {
                write!(
                    f,
                    "accept event for connection {} has no {} field",
                    conn_id, field
                )
            }
            UploadError::Serialization(e) => write!(f, "serialization error: {}", e),
        }
    }
}

impl std::error::Error for UploadError {}

/// The uploaded object. `num_events` is the true per-connection count and
/// may exceed `payload.len()` when the retention cap truncated the record.
#[derive(Serialize)]
struct ObjectEnvelope<'a> {
    id: &'a str,
    host: &'a str,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    num_events: u64,
    conn_id: i64,
    sent_pn: i64,
    acked_pn: i64,
    payload: &'a [Map<String, Value>],
}

/// Derive the object name from the `accept` anchor event:
/// `{host}-{dcid}-{time}`, stable and human-decodable.
pub fn object_name(host: &str, conn: &FinalizedConn) -> Result<String, UploadError> {
    let anchor = conn
        .events
        .iter()
        .find(|e| e.get("type").and_then(Value::as_str) == Some(EVENT_TYPE_ACCEPT))
        .ok_or(UploadError::MissingAnchor {
            conn_id: conn.conn_id,
        })?;

    let dcid = anchor
        .get("dcid")
        .ok_or(UploadError::MissingAnchorField {
            conn_id: conn.conn_id,
            field: "dcid",
        })?;
    let time = anchor
        .get("time")
        .ok_or(UploadError::MissingAnchorField {
            conn_id: conn.conn_id,
            field: "time",
        })?;

    Ok(format!(
        "{}-{}-{}",
        host,
        render_value(dcid),
        render_value(time)
    ))
}

// Strings render without quotes so names stay readable.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Build the object name and serialized envelope for one finalized
/// connection.
pub fn build_object(host: &str, conn: &FinalizedConn) -> Result<(String, Vec<u8>), UploadError> {
    let name = object_name(host, conn)?;
    let envelope = ObjectEnvelope {
        id: &name,
        host,
        start_time: conn.start_time_ms.and_then(millis_to_datetime),
        end_time: conn.end_time_ms.and_then(millis_to_datetime),
        num_events: conn.total_events,
        conn_id: conn.conn_id,
        sent_pn: conn.sent_pn,
        acked_pn: conn.acked_pn,
        payload: &conn.events,
    };
    let bytes = serde_json::to_vec(&envelope)?;
    Ok((name, bytes))
}

pub struct Uploader {
    host: String,
    sinks: Arc<Vec<Box<dyn Sink>>>,
    limit: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl Uploader {
    pub fn new(host: String, sinks: Vec<Box<dyn Sink>>, max_concurrent: usize) -> Self {
        Self {
            host,
            sinks: Arc::new(sinks),
            limit: Arc::new(Semaphore::new(max_concurrent)),
            tasks: JoinSet::new(),
        }
    }

    /// Spawn the upload task for one finalized connection. Never blocks
    /// the caller; the concurrency limit is acquired inside the task.
    pub fn dispatch(&mut self, conn: FinalizedConn) {
        let host = self.host.clone();
        let sinks = Arc::clone(&self.sinks);
        let limit = Arc::clone(&self.limit);

        self.tasks.spawn(async move {
            let _permit = match limit.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // semaphore closed, shutting down
            };

            let (name, bytes) = match build_object(&host, &conn) {
                Ok(built) => built,
                Err(e) => {
                    log::error!("Abandoning upload for connection {}: {}", conn.conn_id, e);
                    return;
                }
            };

            // Every sink is attempted independently; one failing does not
            // cancel the others, and nothing is retried.
            for sink in sinks.iter() {
                match sink.write(&name, &bytes).await {
                    Ok(()) => log::info!(
                        "Uploaded \"{}\" to {} sink ({} bytes, {} events)",
                        name,
                        sink.kind(),
                        bytes.len(),
                        conn.events.len()
                    ),
                    Err(e) => log::error!(
                        "Failed to upload \"{}\" to {} sink ({} bytes): {}",
                        name,
                        sink.kind(),
                        bytes.len(),
                        e
                    ),
                }
            }
        });
    }

    /// Wait for every outstanding upload to finish, success or failure.
    pub async fn shutdown(mut self) {
        let outstanding = self.tasks.len();
        if outstanding > 0 {
            log::info!("Draining {} outstanding uploads", outstanding);
        }
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                log::error!("Upload task failed: {}", e);
            }
        }
    }
}
