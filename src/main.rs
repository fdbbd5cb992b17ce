//! Collector binary
//!
//! Reads tracer output from stdin until end of stream, then waits for
//! every outstanding upload before exiting.
//!
//! ## Environment Variables
//!
//! - COLLECTOR_HOST - host label for object names (default: OS hostname)
//! - COLLECTOR_LOCAL_DIR - local directory sink (optional)
//! - COLLECTOR_OBJECT_STORE_URL - object store base URL sink (optional)
//! - CONN_TABLE_CAPACITY - max live connections (default: 10000)
//! - MAX_EVENTS_PER_CONN - per-connection payload cap (default: 100000)
//! - MAX_CONCURRENT_UPLOADS - upload fan-out limit (default: 16)
//! - RUST_LOG - logging level (optional, default: info)
//!
//! At least one of the two sinks must be configured.

use quictrace_collector::sink::{LocalDirSink, ObjectStoreSink, Sink};
use quictrace_collector::{Collector, Config, Uploader};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let config = Config::from_env()?;

    log::info!("🚀 Starting quictrace-collector");
    log::info!("   Host label: {}", config.host);
    log::info!("   Table capacity: {}", config.table_capacity);
    log::info!("   Payload cap: {} events/conn", config.max_events_per_conn);
    log::info!("   Upload fan-out: {}", config.max_concurrent_uploads);

    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    if let Some(dir) = &config.local_dir {
        std::fs::create_dir_all(dir)?;
        log::info!("   Local sink: {}", dir.display());
        sinks.push(Box::new(LocalDirSink::new(dir.clone())));
    }
    if let Some(url) = &config.object_store_url {
        log::info!("   Object store sink: {}", url);
        sinks.push(Box::new(ObjectStoreSink::new(url.clone())));
    }

    let mut collector = Collector::new(config.table_capacity, config.max_events_per_conn);
    let mut uploader = Uploader::new(config.host.clone(), sinks, config.max_concurrent_uploads);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(finalized) = collector.ingest_line(&line) {
            uploader.dispatch(finalized);
        }
    }

    log::info!(
        "End of input: {} lines ingested, {} connections finalized",
        collector.lines_ingested(),
        collector.conns_finalized()
    );

    uploader.shutdown().await;
    log::info!("✅ All uploads drained, exiting");
    Ok(())
}
