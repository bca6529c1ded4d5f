pub mod azure;
pub mod disk;
pub mod gcs;
pub mod memory;
pub mod s3;
pub mod transport;

use crate::error::HubResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use tokio::io::AsyncRead;

/// A boxed byte stream passed into `perform_write`. Drivers consume it to
/// end-of-input; they must not leave a partially-readable object visible at
/// `path` on error (best-effort — callers must not rely on its absence, §4.1).
pub type WriteStream = std::pin::Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// A boxed byte stream returned by `perform_read`; callers must consume or
/// drop it promptly.
pub type ReadStream = std::pin::Pin<Box<dyn AsyncRead + Send + Unpin>>;

#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub storage_top_level: String,
    pub path: String,
    pub content_type: String,
    pub content_length: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ObjectKey {
    pub storage_top_level: String,
    pub path: String,
}

/// File metadata plus an opened stream, returned by `perform_read`.
pub struct FileInfo {
    pub stream: ReadStream,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Metadata without an opened stream, returned by `perform_stat`.
#[derive(Debug, Clone)]
pub struct Stat {
    pub exists: bool,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// A single listed entry name plus optional stat metadata (§3 ListPage).
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub name: String,
    pub stat: Option<Stat>,
}

/// `entries` uses `None` for the archival-filtering null sentinel described
/// in §3/§4.6: a page emptied entirely by archival filtering still carries
/// its cursor forward rather than silently terminating pagination.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<Option<ListEntry>>,
    pub page: Option<String>,
}

/// Operations every backend implements (§4.1). Object-safe via `async_trait`
/// so drivers can be stored as `Arc<dyn Driver>` behind a single call site.
#[async_trait]
pub trait Driver: fmt::Debug + Send + Sync {
    async fn ensure_initialized(&self) -> HubResult<()>;

    async fn perform_write(&self, req: WriteRequest, stream: WriteStream) -> HubResult<String>;

    async fn perform_delete(&self, key: ObjectKey) -> HubResult<()>;

    async fn perform_rename(&self, key: ObjectKey, new_path: String) -> HubResult<()>;

    async fn perform_read(&self, key: ObjectKey) -> HubResult<FileInfo>;

    async fn perform_stat(&self, key: ObjectKey) -> HubResult<Stat>;

    async fn list_files(&self, path_prefix: &str, page: Option<&str>) -> HubResult<ListPage>;

    async fn list_files_stat(&self, path_prefix: &str, page: Option<&str>) -> HubResult<ListPage>;

    fn get_read_url_prefix(&self) -> String;

    async fn dispose(&self) -> HubResult<()> {
        Ok(())
    }
}

/// Reads an object fully into memory. Used by the revocation clock for its
/// tiny `.authTimestamp` JSON documents, where streaming would be overkill.
pub async fn read_to_bytes(driver: &dyn Driver, key: ObjectKey) -> HubResult<Bytes> {
    use tokio::io::AsyncReadExt;
    let mut info = driver.perform_read(key).await?;
    let mut buf = Vec::new();
    info.stream
        .read_to_end(&mut buf)
        .await
        .map_err(|e| crate::error::HubError::Driver(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// The five backend kinds, selected at process start by a tagged enum
/// rather than a string-keyed registry (§9 redesign flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Disk,
    Memory,
    S3,
    Azure,
    Gcs,
}

impl DriverKind {
    /// Parses a `DRIVER_KIND` environment value; anything unrecognized
    /// falls back to `Disk` rather than failing startup.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "memory" => DriverKind::Memory,
            "s3" => DriverKind::S3,
            "azure" => DriverKind::Azure,
            "gcs" => DriverKind::Gcs,
            _ => DriverKind::Disk,
        }
    }
}
