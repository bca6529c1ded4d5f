use crate::driver::{
    Driver, FileInfo, ListEntry, ListPage, ObjectKey, ReadStream, Stat, WriteRequest, WriteStream,
};
use crate::error::{HubError, HubResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

#[derive(Clone)]
struct Object {
    bytes: Bytes,
    content_type: Option<String>,
    last_modified: chrono::DateTime<Utc>,
}

fn full_key(storage_top_level: &str, path: &str) -> String {
    format!("{storage_top_level}/{path}")
}

/// An in-process backend over a `BTreeMap`, primarily for tests and local
/// development (§4.1.1). Its read URL prefix is a synthetic `mem://` scheme.
#[derive(Debug)]
pub struct MemoryDriver {
    objects: RwLock<BTreeMap<String, Object>>,
    page_size: usize,
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: 100,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn ensure_initialized(&self) -> HubResult<()> {
        Ok(())
    }

    async fn perform_write(&self, req: WriteRequest, mut stream: WriteStream) -> HubResult<String> {
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .map_err(crate::error::classify_copy_error)?;
        let key = full_key(&req.storage_top_level, &req.path);
        self.objects.write().await.insert(
            key,
            Object {
                bytes: Bytes::from(buf),
                content_type: Some(req.content_type),
                last_modified: Utc::now(),
            },
        );
        Ok(format!("mem://{}/{}", req.storage_top_level, req.path))
    }

    async fn perform_delete(&self, key: ObjectKey) -> HubResult<()> {
        let full = full_key(&key.storage_top_level, &key.path);
        self.objects
            .write()
            .await
            .remove(&full)
            .map(|_| ())
            .ok_or_else(|| HubError::DoesNotExist(key.path.clone()))
    }

    async fn perform_rename(&self, key: ObjectKey, new_path: String) -> HubResult<()> {
        let full = full_key(&key.storage_top_level, &key.path);
        let mut objects = self.objects.write().await;
        let object = objects
            .remove(&full)
            .ok_or_else(|| HubError::DoesNotExist(key.path.clone()))?;
        let new_full = full_key(&key.storage_top_level, &new_path);
        objects.insert(new_full, object);
        Ok(())
    }

    async fn perform_read(&self, key: ObjectKey) -> HubResult<FileInfo> {
        let full = full_key(&key.storage_top_level, &key.path);
        let objects = self.objects.read().await;
        let object = objects
            .get(&full)
            .ok_or_else(|| HubError::DoesNotExist(key.path.clone()))?
            .clone();
        let stream: ReadStream = Box::pin(std::io::Cursor::new(object.bytes.clone()));
        Ok(FileInfo {
            content_length: Some(object.bytes.len() as u64),
            content_type: object.content_type,
            etag: None,
            last_modified: Some(object.last_modified),
            stream,
        })
    }

    async fn perform_stat(&self, key: ObjectKey) -> HubResult<Stat> {
        let full = full_key(&key.storage_top_level, &key.path);
        let objects = self.objects.read().await;
        match objects.get(&full) {
            Some(object) => Ok(Stat {
                exists: true,
                content_type: object.content_type.clone(),
                content_length: Some(object.bytes.len() as u64),
                etag: None,
                last_modified: Some(object.last_modified),
            }),
            None => Ok(Stat {
                exists: false,
                content_type: None,
                content_length: None,
                etag: None,
                last_modified: None,
            }),
        }
    }

    async fn list_files(&self, path_prefix: &str, page: Option<&str>) -> HubResult<ListPage> {
        let full_prefix = format!("{path_prefix}/");
        let objects = self.objects.read().await;
        let mut names: Vec<String> = objects
            .keys()
            .filter_map(|k| k.strip_prefix(&full_prefix).map(|s| s.to_string()))
            .collect();
        names.sort();

        let offset: usize = page.and_then(|p| p.parse().ok()).unwrap_or(0);
        let chunk: Vec<Option<ListEntry>> = names
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|name| {
                Some(ListEntry {
                    name: name.clone(),
                    stat: None,
                })
            })
            .collect();
        let next_offset = offset + chunk.len();
        let page = if next_offset < names.len() {
            Some(next_offset.to_string())
        } else {
            None
        };
        Ok(ListPage {
            entries: chunk,
            page,
        })
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
        "mem://".to_string()
    }
}
