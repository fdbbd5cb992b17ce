//! Configuration loaded from environment variables

use std::env;
use std::path::PathBuf;

pub const DEFAULT_TABLE_CAPACITY: usize = 10_000;
pub const DEFAULT_MAX_EVENTS_PER_CONN: usize = 100_000;
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 16;

#[derive(Debug)]
pub struct Config {
    /// Host label used in object names. Defaults to the OS hostname.
    pub host: String,
    pub local_dir: Option<PathBuf>,
    pub object_store_url: Option<String>,
    pub table_capacity: usize,
    pub max_events_per_conn: usize,
    pub max_concurrent_uploads: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// At least one of COLLECTOR_LOCAL_DIR and COLLECTOR_OBJECT_STORE_URL
    /// must be set, otherwise uploads would have nowhere to go.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let host = env::var("COLLECTOR_HOST")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(default_host);

        let local_dir = env::var("COLLECTOR_LOCAL_DIR")
            .ok()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);

        let object_store_url = env::var("COLLECTOR_OBJECT_STORE_URL")
            .ok()
            .filter(|u| !u.is_empty());

        if local_dir.is_none() && object_store_url.is_none() {
            return Err(
                "no sink configured: set COLLECTOR_LOCAL_DIR and/or COLLECTOR_OBJECT_STORE_URL"
                    .into(),
            );
        }

        Ok(Self {
            host,
            local_dir,
            object_store_url,
            table_capacity: env::var("CONN_TABLE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TABLE_CAPACITY),
            max_events_per_conn: env::var("MAX_EVENTS_PER_CONN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_EVENTS_PER_CONN),
            max_concurrent_uploads: env::var("MAX_CONCURRENT_UPLOADS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONCURRENT_UPLOADS),
        })
    }
}

fn default_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}
