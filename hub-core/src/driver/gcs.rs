use crate::driver::transport::{HttpTransport, Method, TransportRequest};
use crate::driver::{
    Driver, FileInfo, ListEntry, ListPage, ObjectKey, ReadStream, Stat, WriteRequest, WriteStream,
};
use crate::error::{HubError, HubResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Google Cloud Storage backend. Writes are a single simple upload (the
/// upload ceiling keeps this well under the resumable threshold); listing
/// uses GCS's `pageToken`; rename uses GCS's native server-side `copy` +
/// `delete` (§4.1.1).
#[derive(Debug)]
pub struct GcsDriver {
    transport: Arc<dyn HttpTransport>,
    api_base: String,
    bucket: String,
    read_url_prefix: String,
}

impl GcsDriver {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        api_base: impl Into<String>,
        bucket: impl Into<String>,
        read_url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            api_base: api_base.into(),
            bucket: bucket.into(),
            read_url_prefix: read_url_prefix.into(),
        }
    }

    fn object_name(storage_top_level: &str, path: &str) -> String {
        format!("{storage_top_level}/{path}")
    }

    fn upload_url(&self, storage_top_level: &str, path: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.api_base.trim_end_matches('/'),
            self.bucket,
            Self::object_name(storage_top_level, path)
        )
    }

    fn object_url(&self, storage_top_level: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.api_base.trim_end_matches('/'),
            self.bucket,
            urlencode(&Self::object_name(storage_top_level, path))
        )
    }

    fn media_url(&self, storage_top_level: &str, path: &str) -> String {
        format!("{}?alt=media", self.object_url(storage_top_level, path))
    }

    fn copy_url(&self, source_name: &str, dest_storage_top_level: &str, dest_path: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}/copyTo/b/{}/o/{}",
            self.api_base.trim_end_matches('/'),
            self.bucket,
            urlencode(source_name),
            self.bucket,
            urlencode(&Self::object_name(dest_storage_top_level, dest_path))
        )
    }

    fn list_url(&self, path_prefix: &str, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/storage/v1/b/{}/o?prefix={}/",
            self.api_base.trim_end_matches('/'),
            self.bucket,
            path_prefix
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={token}"));
        }
        url
    }
}

fn urlencode(s: &str) -> String {
    s.replace('/', "%2F")
}

#[async_trait]
impl Driver for GcsDriver {
    async fn ensure_initialized(&self) -> HubResult<()> {
        Ok(())
    }

    async fn perform_write(&self, req: WriteRequest, mut stream: WriteStream) -> HubResult<String> {
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .map_err(crate::error::classify_copy_error)?;
        let url = self.upload_url(&req.storage_top_level, &req.path);
        let request = TransportRequest::new(Method::Post, url)
            .with_header("Content-Type", req.content_type.clone())
            .with_body(Bytes::from(buf));
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| HubError::Driver(e.0))?;
        if !response.is_success() {
            return Err(HubError::Driver(format!(
                "GCS simple upload failed with status {}",
                response.status
            )));
        }
        Ok(format!(
            "{}/{}/{}",
            self.read_url_prefix.trim_end_matches('/'),
            req.storage_top_level,
            req.path
        ))
    }

    async fn perform_delete(&self, key: ObjectKey) -> HubResult<()> {
        let url = self.object_url(&key.storage_top_level, &key.path);
        let response = self
            .transport
            .execute(TransportRequest::new(Method::Delete, url))
            .await
            .map_err(|e| HubError::Driver(e.0))?;
        if response.is_not_found() {
            return Err(HubError::DoesNotExist(key.path));
        }
        if !response.is_success() {
            return Err(HubError::Driver(format!(
                "GCS delete failed with status {}",
                response.status
            )));
        }
        Ok(())
    }

    async fn perform_rename(&self, key: ObjectKey, new_path: String) -> HubResult<()> {
        let source_name = Self::object_name(&key.storage_top_level, &key.path);
        let copy_url = self.copy_url(&source_name, &key.storage_top_level, &new_path);
        let response = self
            .transport
            .execute(TransportRequest::new(Method::Post, copy_url))
            .await
            .map_err(|e| HubError::Driver(e.0))?;
        if response.is_not_found() {
            return Err(HubError::DoesNotExist(key.path.clone()));
        }
        if !response.is_success() {
            return Err(HubError::Driver(format!(
                "GCS copyTo failed with status {}",
                response.status
            )));
        }
        self.perform_delete(key).await
    }

    async fn perform_read(&self, key: ObjectKey) -> HubResult<FileInfo> {
        let url = self.media_url(&key.storage_top_level, &key.path);
        let response = self
            .transport
            .execute(TransportRequest::new(Method::Get, url))
            .await
            .map_err(|e| HubError::Driver(e.0))?;
        if response.is_not_found() {
            return Err(HubError::DoesNotExist(key.path));
        }
        if !response.is_success() {
            return Err(HubError::Driver(format!(
                "GCS media download failed with status {}",
                response.status
            )));
        }
        let content_type = response.header("content-type").map(|s| s.to_string());
        let etag = response.header("etag").map(|s| s.to_string());
        let len = response.body.len() as u64;
        let stream: ReadStream = Box::pin(std::io::Cursor::new(response.body));
        Ok(FileInfo {
            stream,
            content_type,
            content_length: Some(len),
            etag,
            last_modified: None,
        })
    }

    async fn perform_stat(&self, key: ObjectKey) -> HubResult<Stat> {
        let url = self.object_url(&key.storage_top_level, &key.path);
        let response = self
            .transport
            .execute(TransportRequest::new(Method::Get, url))
            .await
            .map_err(|e| HubError::Driver(e.0))?;
        if response.is_not_found() {
            return Ok(Stat {
                exists: false,
                content_type: None,
                content_length: None,
                etag: None,
                last_modified: None,
            });
        }
        Ok(Stat {
            exists: response.is_success(),
            content_type: response.header("content-type").map(|s| s.to_string()),
            content_length: Some(response.body.len() as u64),
            etag: response.header("etag").map(|s| s.to_string()),
            last_modified: None,
        })
    }

    async fn list_files(&self, path_prefix: &str, page: Option<&str>) -> HubResult<ListPage> {
        let url = self.list_url(path_prefix, page);
        let response = self
            .transport
            .execute(TransportRequest::new(Method::Get, url))
            .await
            .map_err(|e| HubError::Driver(e.0))?;
        if !response.is_success() {
            return Err(HubError::Driver(format!(
                "GCS list objects failed with status {}",
                response.status
            )));
        }
        parse_list_response(&response.body, path_prefix)
    }

    async fn list_files_stat(&self, path_prefix: &str, page: Option<&str>) -> HubResult<ListPage> {
        let plain = self.list_files(path_prefix, page).await?;
        let mut entries = Vec::with_capacity(plain.entries.len());
        for entry in plain.entries {
            let Some(entry) = entry else {
                entries.push(None);
                continue;
            };
            let stat = self
                .perform_stat(ObjectKey {
                    storage_top_level: path_prefix.to_string(),
                    path: entry.name.clone(),
                })
                .await
                .ok();
            entries.push(Some(ListEntry {
                name: entry.name,
                stat,
            }));
        }
        Ok(ListPage {
            entries,
            page: plain.page,
        })
    }

    fn get_read_url_prefix(&self) -> String {
        self.read_url_prefix.clone()
    }
}

/// Parses a JSON rendering of GCS's object listing (`{"items": [...],
/// "nextPageToken": "..."}`), analogous to the S3/Azure parsers.
fn parse_list_response(body: &Bytes, path_prefix: &str) -> HubResult<ListPage> {
    #[derive(serde::Deserialize)]
    struct Raw {
        #[serde(default)]
        items: Vec<String>,
        #[serde(default, rename = "nextPageToken")]
        next_page_token: Option<String>,
    }
    let raw: Raw = serde_json::from_slice(body).map_err(|e| HubError::Driver(e.to_string()))?;
    let prefix = format!("{path_prefix}/");
    let entries = raw
        .items
        .into_iter()
        .filter_map(|k| k.strip_prefix(&prefix).map(|s| s.to_string()))
        .map(|name| Some(ListEntry { name, stat: None }))
        .collect();
    Ok(ListPage {
        entries,
        page: raw.next_page_token,
    })
}
