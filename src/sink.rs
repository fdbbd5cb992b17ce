//! Storage sink abstraction
//!
//! A sink accepts one named, serialized connection record and writes it to
//! durable storage. The uploader treats every configured sink identically
//! through the trait object; local-directory and remote object-store sinks
//! may both be active at once.

use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Http(reqwest::Error),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        SinkError::Http(err)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "IO error: {}", e),
            SinkError::Http(e) => write!(f, "HTTP error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Write one serialized record under the given object name.
    async fn write(&self, object_name: &str, data: &[u8]) -> Result<(), SinkError>;

    /// Sink kind for logging.
    fn kind(&self) -> &'static str;
}

/// Writes each record as `{dir}/{object_name}.json`. The directory is
/// created by the binary at startup.
pub struct LocalDirSink {
    dir: PathBuf,
}

impl LocalDirSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl Sink for LocalDirSink {
    async fn write(&self, object_name: &str, data: &[u8]) -> Result<(), SinkError> {
        let path = self.dir.join(format!("{}.json", object_name));
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

/// PUTs each record to `{base_url}/{object_name}` on a remote object store.
pub struct ObjectStoreSink {
    base_url: String,
    client: reqwest::Client,
}

impl ObjectStoreSink {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Sink for ObjectStoreSink {
    async fn write(&self, object_name: &str, data: &[u8]) -> Result<(), SinkError> {
        let url = format!("{}/{}", self.base_url, object_name);
        let response = self.client.put(&url).body(data.to_vec()).send().await?;
        response.error_for_status()?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "object-store"
    }
}
