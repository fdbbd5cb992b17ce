//! Full-pipeline tests: JSONL lines in, uploaded objects out.

use async_trait::async_trait;
use quictrace_collector::sink::{LocalDirSink, Sink, SinkError};
use quictrace_collector::{Collector, Uploader};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Records every write so tests can inspect what would have reached
/// durable storage.
struct MemorySink {
    records: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemorySink {
    fn new() -> (Self, Arc<Mutex<Vec<(String, Vec<u8>)>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                records: Arc::clone(&records),
            },
            records,
        )
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, object_name: &str, data: &[u8]) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap()
            .push((object_name.to_string(), data.to_vec()));
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// A sink that always fails, for checking failure isolation.
struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    async fn write(&self, _object_name: &str, _data: &[u8]) -> Result<(), SinkError> {
        Err(SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "sink unavailable",
        )))
    }

    fn kind(&self) -> &'static str {
        "failing"
    }
}

async fn run_pipeline(
    lines: &[&str],
    table_capacity: usize,
    max_events: usize,
    sinks: Vec<Box<dyn Sink>>,
) {
    let mut collector = Collector::new(table_capacity, max_events);
    let mut uploader = Uploader::new("testhost".to_string(), sinks, 4);
    for line in lines {
        if let Some(finalized) = collector.ingest_line(line) {
            uploader.dispatch(finalized);
        }
    }
    uploader.shutdown().await;
}

#[tokio::test]
async fn single_connection_uploads_named_object() {
    let (sink, records) = MemorySink::new();
    run_pipeline(
        &[
            r#"{"conn":1,"type":"accept","dcid":"abc","time":100}"#,
            r#"{"conn":1,"type":"packet-sent","pn":5,"time":101}"#,
            r#"{"conn":1,"type":"free","time":200}"#,
        ],
        10,
        1000,
        vec![Box::new(sink)],
    )
    .await;

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let (name, bytes) = &records[0];
    assert_eq!(name, "testhost-abc-100");

    let envelope: Value = serde_json::from_slice(bytes).unwrap();
    assert_eq!(envelope["sent_pn"], 5);
    assert_eq!(envelope["acked_pn"], -1);
    assert_eq!(envelope["num_events"], 3);
    assert_eq!(envelope["conn_id"], 1);
    assert_eq!(envelope["payload"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn payload_preserves_event_order_under_cap() {
    let (sink, records) = MemorySink::new();
    run_pipeline(
        &[
            r#"{"conn":4,"type":"accept","dcid":"ord","time":10}"#,
            r#"{"conn":4,"type":"packet-sent","pn":0,"time":11}"#,
            r#"{"conn":4,"type":"packet-acked","pn":0,"time":12}"#,
            r#"{"conn":4,"type":"packet-sent","pn":1,"time":13}"#,
            r#"{"conn":4,"type":"free","time":14}"#,
        ],
        10,
        1000,
        vec![Box::new(sink)],
    )
    .await;

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let envelope: Value = serde_json::from_slice(&records[0].1).unwrap();
    let types: Vec<&str> = envelope["payload"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap())
        .collect();
    assert_eq!(
        types,
        ["accept", "packet-sent", "packet-acked", "packet-sent", "free"]
    );
}

#[tokio::test]
async fn exactly_one_upload_despite_trailing_events() {
    let (sink, records) = MemorySink::new();
    run_pipeline(
        &[
            r#"{"conn":1,"type":"accept","dcid":"abc","time":100}"#,
            r#"{"conn":1,"type":"free","time":200}"#,
            r#"{"conn":1,"type":"packet-sent","pn":9,"time":201}"#,
            r#"{"conn":1,"type":"free","time":202}"#,
        ],
        10,
        1000,
        vec![Box::new(sink)],
    )
    .await;

    assert_eq!(records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn over_cap_connection_keeps_true_count_and_terminal_event() {
    let (sink, records) = MemorySink::new();
    let mut lines = vec![r#"{"conn":1,"type":"accept","dcid":"abc","time":1}"#.to_string()];
    for pn in 0..6 {
        lines.push(format!(
            r#"{{"conn":1,"type":"packet-sent","pn":{},"time":{}}}"#,
            pn,
            pn + 2
        ));
    }
    lines.push(r#"{"conn":1,"type":"free","time":50}"#.to_string());
    let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();

    run_pipeline(&line_refs, 10, 3, vec![Box::new(sink)]).await;

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let envelope: Value = serde_json::from_slice(&records[0].1).unwrap();
    // 1 accept + 6 packet-sent + 1 free truly seen; 3 retained + terminal.
    assert_eq!(envelope["num_events"], 8);
    let payload = envelope["payload"].as_array().unwrap();
    assert_eq!(payload.len(), 4);
    assert_eq!(payload.last().unwrap()["type"], "free");
}

#[tokio::test]
async fn evicted_connection_is_never_uploaded() {
    let (sink, records) = MemorySink::new();
    run_pipeline(
        &[
            r#"{"conn":1,"type":"accept","dcid":"aaa","time":1}"#,
            r#"{"conn":2,"type":"accept","dcid":"bbb","time":2}"#,
            // Capacity 2: inserting conn 3 evicts conn 1 and its events.
            r#"{"conn":3,"type":"accept","dcid":"ccc","time":3}"#,
            // Conn 1 reappears as a fresh entry; its free finalizes an
            // entry with no accept anchor, so the upload is abandoned.
            r#"{"conn":1,"type":"free","time":9}"#,
            r#"{"conn":2,"type":"free","time":10}"#,
        ],
        2,
        1000,
        vec![Box::new(sink)],
    )
    .await;

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0, "testhost-bbb-2");
}

#[tokio::test]
async fn malformed_and_conn_less_lines_do_not_disturb_others() {
    let (sink, records) = MemorySink::new();
    run_pipeline(
        &[
            "not-json",
            r#"{"type":"free"}"#,
            r#"{"conn":"oops","type":"free"}"#,
            r#"{"conn":2,"type":"accept","dcid":"ok","time":7}"#,
            r#"{"conn":2,"type":"free","time":8}"#,
        ],
        10,
        1000,
        vec![Box::new(sink)],
    )
    .await;

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0, "testhost-ok-7");
}

#[tokio::test]
async fn concurrent_connections_upload_independently() {
    let (sink, records) = MemorySink::new();
    let mut lines = Vec::new();
    for conn_id in 0..20 {
        lines.push(format!(
            r#"{{"conn":{},"type":"accept","dcid":"d{}","time":{}}}"#,
            conn_id, conn_id, conn_id
        ));
        lines.push(format!(
            r#"{{"conn":{},"type":"packet-sent","pn":{},"time":{}}}"#,
            conn_id,
            conn_id,
            conn_id + 100
        ));
    }
    for conn_id in 0..20 {
        lines.push(format!(
            r#"{{"conn":{},"type":"free","time":{}}}"#,
            conn_id,
            conn_id + 200
        ));
    }
    let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();

    run_pipeline(&line_refs, 100, 1000, vec![Box::new(sink)]).await;

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 20);
    // No ordering guarantee across connections, so check the set.
    let names: Vec<&str> = records.iter().map(|(n, _)| n.as_str()).collect();
    for conn_id in 0..20 {
        let expected = format!("testhost-d{}-{}", conn_id, conn_id);
        assert!(names.contains(&expected.as_str()));
    }
}

#[tokio::test]
async fn one_failing_sink_does_not_cancel_the_other() {
    let (sink, records) = MemorySink::new();
    run_pipeline(
        &[
            r#"{"conn":1,"type":"accept","dcid":"abc","time":100}"#,
            r#"{"conn":1,"type":"free","time":200}"#,
        ],
        10,
        1000,
        vec![Box::new(FailingSink), Box::new(sink)],
    )
    .await;

    assert_eq!(records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn local_sink_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    run_pipeline(
        &[
            r#"{"conn":1,"type":"accept","dcid":"abc","time":100}"#,
            r#"{"conn":1,"type":"free","time":200}"#,
        ],
        10,
        1000,
        vec![Box::new(LocalDirSink::new(dir.path().to_path_buf()))],
    )
    .await;

    let bytes = std::fs::read(dir.path().join("testhost-abc-100.json")).unwrap();
    let envelope: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(envelope["id"], "testhost-abc-100");
    assert_eq!(envelope["host"], "testhost");
}
