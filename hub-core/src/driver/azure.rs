use crate::driver::transport::{HttpTransport, Method, TransportRequest};
use crate::driver::{
    Driver, FileInfo, ListEntry, ListPage, ObjectKey, ReadStream, Stat, WriteRequest, WriteStream,
};
use crate::error::{HubError, HubResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Azure Blob Storage backend. Writes are `put_block_blob`; listing uses
/// Azure's continuation (marker) token; rename is copy-then-delete,
/// mirroring S3 (§4.1.1).
#[derive(Debug)]
pub struct AzureDriver {
    transport: Arc<dyn HttpTransport>,
    account_url: String,
    container: String,
    read_url_prefix: String,
}

impl AzureDriver {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        account_url: impl Into<String>,
        container: impl Into<String>,
        read_url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            account_url: account_url.into(),
            container: container.into(),
            read_url_prefix: read_url_prefix.into(),
        }
    }

    fn blob_url(&self, storage_top_level: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.account_url.trim_end_matches('/'),
            self.container,
            storage_top_level,
            path
        )
    }

    fn list_url(&self, path_prefix: &str, marker: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}?restype=container&comp=list&prefix={}/",
            self.account_url.trim_end_matches('/'),
            self.container,
            path_prefix
        );
        if let Some(marker) = marker {
            url.push_str(&format!("&marker={marker}"));
        }
        url
    }
}

#[async_trait]
impl Driver for AzureDriver {
    async fn ensure_initialized(&self) -> HubResult<()> {
        Ok(())
    }

    async fn perform_write(&self, req: WriteRequest, mut stream: WriteStream) -> HubResult<String> {
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .map_err(crate::error::classify_copy_error)?;
        let url = self.blob_url(&req.storage_top_level, &req.path);
        let request = TransportRequest::new(Method::Put, url)
            .with_header("x-ms-blob-type", "BlockBlob")
            .with_header("Content-Type", req.content_type.clone())
            .with_body(Bytes::from(buf));
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| HubError::Driver(e.0))?;
        if !response.is_success() {
            return Err(HubError::Driver(format!(
                "Azure PutBlockBlob failed with status {}",
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
        let url = self.blob_url(&key.storage_top_level, &key.path);
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
                "Azure DeleteBlob failed with status {}",
                response.status
            )));
        }
        Ok(())
    }

    async fn perform_rename(&self, key: ObjectKey, new_path: String) -> HubResult<()> {
        let source_url = self.blob_url(&key.storage_top_level, &key.path);
        let dest_url = self.blob_url(&key.storage_top_level, &new_path);
        let copy_request =
            TransportRequest::new(Method::Put, dest_url).with_header("x-ms-copy-source", source_url);
        let response = self
            .transport
            .execute(copy_request)
            .await
            .map_err(|e| HubError::Driver(e.0))?;
        if response.is_not_found() {
            return Err(HubError::DoesNotExist(key.path.clone()));
        }
        if !response.is_success() {
            return Err(HubError::Driver(format!(
                "Azure copy failed with status {}",
                response.status
            )));
        }
        self.perform_delete(key).await
    }

    async fn perform_read(&self, key: ObjectKey) -> HubResult<FileInfo> {
        let url = self.blob_url(&key.storage_top_level, &key.path);
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
                "Azure GetBlob failed with status {}",
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
        let url = self.blob_url(&key.storage_top_level, &key.path);
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
                "Azure ListBlobs failed with status {}",
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

/// Parses a JSON rendering of Azure's blob listing (`{"blobs": [...],
/// "nextMarker": "..."}`), analogous to the S3 driver's parser.
fn parse_list_response(body: &Bytes, path_prefix: &str) -> HubResult<ListPage> {
    #[derive(serde::Deserialize)]
    struct Raw {
        #[serde(default)]
        blobs: Vec<String>,
        #[serde(default, rename = "nextMarker")]
        next_marker: Option<String>,
    }
    let raw: Raw = serde_json::from_slice(body).map_err(|e| HubError::Driver(e.to_string()))?;
    let prefix = format!("{path_prefix}/");
    let entries = raw
        .blobs
        .into_iter()
        .filter_map(|k| k.strip_prefix(&prefix).map(|s| s.to_string()))
        .map(|name| Some(ListEntry { name, stat: None }))
        .collect();
    Ok(ListPage {
        entries,
        page: raw.next_marker,
    })
}
