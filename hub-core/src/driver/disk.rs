use crate::driver::{
    Driver, FileInfo, ListEntry, ListPage, ObjectKey, ReadStream, Stat, WriteRequest, WriteStream,
};
use crate::error::{HubError, HubResult};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufReader};

/// The local-filesystem backend (§4.1.1). `storage_top_level` (the
/// principal) and `path` join onto `storage_root` with traversal rejected;
/// renames use `tokio::fs::rename`, atomic on same-filesystem moves.
#[derive(Debug, Clone)]
pub struct DiskDriver {
    storage_root: PathBuf,
    read_url_prefix: String,
    page_size: usize,
}

impl DiskDriver {
    pub fn new(storage_root: impl Into<PathBuf>, read_url_prefix: impl Into<String>) -> Self {
        Self {
            storage_root: storage_root.into(),
            read_url_prefix: read_url_prefix.into(),
            page_size: 100,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn resolve(&self, key: &ObjectKey) -> HubResult<PathBuf> {
        let relative = format!("{}/{}", key.storage_top_level, key.path);
        reject_traversal(&relative)?;
        Ok(self.storage_root.join(relative))
    }

    fn prefix_dir(&self, path_prefix: &str) -> PathBuf {
        self.storage_root.join(path_prefix)
    }
}

fn reject_traversal(relative: &str) -> HubResult<()> {
    let path = Path::new(relative);
    for component in path.components() {
        if matches!(component, Component::ParentDir | Component::RootDir) {
            return Err(HubError::Driver(format!("path escapes storage root: {relative}")));
        }
    }
    Ok(())
}

fn not_found(e: &std::io::Error, path: &str) -> HubError {
    if e.kind() == std::io::ErrorKind::NotFound {
        HubError::DoesNotExist(path.to_string())
    } else {
        HubError::Driver(e.to_string())
    }
}

#[async_trait]
impl Driver for DiskDriver {
    async fn ensure_initialized(&self) -> HubResult<()> {
        fs::create_dir_all(&self.storage_root)
            .await
            .map_err(|e| HubError::Driver(e.to_string()))
    }

    async fn perform_write(&self, req: WriteRequest, mut stream: WriteStream) -> HubResult<String> {
        let key = ObjectKey {
            storage_top_level: req.storage_top_level.clone(),
            path: req.path.clone(),
        };
        let target = self.resolve(&key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HubError::Driver(e.to_string()))?;
        }

        let mut file = fs::File::create(&target)
            .await
            .map_err(|e| HubError::Driver(e.to_string()))?;
        let result = tokio::io::copy(&mut stream, &mut file).await;
        match result {
            Ok(_) => {
                file.flush().await.map_err(|e| HubError::Driver(e.to_string()))?;
                Ok(format!(
                    "{}/{}/{}",
                    self.read_url_prefix.trim_end_matches('/'),
                    req.storage_top_level,
                    req.path
                ))
            }
            Err(e) => {
                let _ = fs::remove_file(&target).await;
                Err(crate::error::classify_copy_error(e))
            }
        }
    }

    async fn perform_delete(&self, key: ObjectKey) -> HubResult<()> {
        let target = self.resolve(&key)?;
        fs::remove_file(&target)
            .await
            .map_err(|e| not_found(&e, &key.path))
    }

    async fn perform_rename(&self, key: ObjectKey, new_path: String) -> HubResult<()> {
        let source = self.resolve(&key)?;
        let dest_key = ObjectKey {
            storage_top_level: key.storage_top_level.clone(),
            path: new_path,
        };
        let dest = self.resolve(&dest_key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HubError::Driver(e.to_string()))?;
        }
        fs::rename(&source, &dest)
            .await
            .map_err(|e| not_found(&e, &key.path))
    }

    async fn perform_read(&self, key: ObjectKey) -> HubResult<FileInfo> {
        let target = self.resolve(&key)?;
        let metadata = fs::metadata(&target).await.map_err(|e| not_found(&e, &key.path))?;
        let file = fs::File::open(&target).await.map_err(|e| not_found(&e, &key.path))?;
        let stream: ReadStream = Box::pin(BufReader::new(file));
        Ok(FileInfo {
            stream,
            content_type: None,
            content_length: Some(metadata.len()),
            etag: None,
            last_modified: metadata.modified().ok().map(chrono::DateTime::<chrono::Utc>::from),
        })
    }

    async fn perform_stat(&self, key: ObjectKey) -> HubResult<Stat> {
        let target = self.resolve(&key)?;
        match fs::metadata(&target).await {
            Ok(metadata) => Ok(Stat {
                exists: true,
                content_type: None,
                content_length: Some(metadata.len()),
                etag: None,
                last_modified: metadata.modified().ok().map(chrono::DateTime::<chrono::Utc>::from),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Stat {
                exists: false,
                content_type: None,
                content_length: None,
                etag: None,
                last_modified: None,
            }),
            Err(e) => Err(HubError::Driver(e.to_string())),
        }
    }

    async fn list_files(&self, path_prefix: &str, page: Option<&str>) -> HubResult<ListPage> {
        let names = self.sorted_relative_paths(path_prefix).await?;
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
        self.read_url_prefix.clone()
    }
}

impl DiskDriver {
    async fn sorted_relative_paths(&self, path_prefix: &str) -> HubResult<Vec<String>> {
        let root = self.prefix_dir(path_prefix);
        let mut out = Vec::new();
        walk(&root, &root, &mut out).await?;
        out.sort();
        Ok(out)
    }
}

fn walk<'a>(
    root: &'a Path,
    dir: &'a Path,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = HubResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut read_dir = match fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(HubError::Driver(e.to_string())),
        };
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| HubError::Driver(e.to_string()))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| HubError::Driver(e.to_string()))?;
            if file_type.is_dir() {
                walk(root, &path, out).await?;
            } else if file_type.is_file() {
                if let Ok(relative) = path.strip_prefix(root) {
                    out.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(())
    })
}
