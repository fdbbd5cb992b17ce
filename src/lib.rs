//! quictrace-collector - connection event aggregator for QUIC tracer output
//!
//! Reads newline-delimited JSON trace events on stdin, groups them by
//! connection in a bounded LRU table, and uploads each completed
//! connection's record to the configured storage sinks.
//!
//! # Architecture
//!
//! ```text
//! stdin (JSONL) → event::decode_line
//!     ↓
//! conn_table::ConnTable (bounded, LRU eviction)
//!     ↓
//! aggregate::ConnAggregate (in-place updates, finalize on "free")
//!     ↓
//! uploader::Uploader (one bounded task per connection)
//!     ↓
//! sink::LocalDirSink / sink::ObjectStoreSink
//! ```

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod conn_table;
pub mod event;
pub mod sink;
pub mod uploader;

pub use aggregate::{ConnAggregate, FinalizedConn};
pub use collector::Collector;
pub use config::Config;
pub use conn_table::ConnTable;
pub use event::{decode_line, TraceEvent};
pub use sink::{LocalDirSink, ObjectStoreSink, Sink, SinkError};
pub use uploader::{UploadError, Uploader};
