use crate::driver::{Driver, FileInfo, ObjectKey, ReadStream, Stat};
use crate::error::HubResult;
use crate::lock::SingleFlight;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of a gateway GET: either the object is absent (caller returns
/// 404) or present with its stream and the headers to emit (§4.7).
pub enum GetOutcome {
    NotFound,
    Found {
        stream: ReadStream,
        headers: ReadHeaders,
    },
}

/// Outcome of a gateway HEAD: same as GET but without an opened stream.
pub enum HeadOutcome {
    NotFound,
    Found { headers: ReadHeaders },
}

#[derive(Debug, Clone, Default)]
pub struct ReadHeaders {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl From<&FileInfo> for ReadHeaders {
    fn from(info: &FileInfo) -> Self {
        Self {
            content_type: info.content_type.clone(),
            content_length: info.content_length,
            etag: info.etag.clone(),
            last_modified: info.last_modified,
        }
    }
}

impl From<&Stat> for ReadHeaders {
    fn from(stat: &Stat) -> Self {
        Self {
            content_type: stat.content_type.clone(),
            content_length: stat.content_length,
            etag: stat.etag.clone(),
            last_modified: stat.last_modified,
        }
    }
}

/// Strips a single trailing slash from the path component before lookup
/// (§4.7); repeated trailing slashes collapse too, matching how a client
/// would normalize before comparing against a stored key.
fn normalize_path(path: &str) -> &str {
    path.trim_end_matches('/')
}

/// `GET /<bucket>/<key>`: no authentication, calls `perform_read`, and
/// returns 404 semantics via `GetOutcome::NotFound` on a missing object.
pub async fn handle_get(driver: &Arc<dyn Driver>, bucket: &str, key: &str) -> HubResult<GetOutcome> {
    let path = normalize_path(key);
    let object_key = ObjectKey {
        storage_top_level: bucket.to_string(),
        path: path.to_string(),
    };
    match driver.perform_read(object_key).await {
        Ok(info) => {
            let headers = ReadHeaders::from(&info);
            Ok(GetOutcome::Found {
                stream: info.stream,
                headers,
            })
        }
        Err(e) if e.is_does_not_exist() => Ok(GetOutcome::NotFound),
        Err(e) => Err(e),
    }
}

/// `HEAD /<bucket>/<key>`: as `handle_get` but via `perform_stat`, coalesced
/// through `flight` so concurrent HEADs for the same key share one driver
/// round-trip instead of each issuing their own (§4.4).
pub async fn handle_head(
    driver: &Arc<dyn Driver>,
    flight: &Arc<SingleFlight<HubResult<Stat>>>,
    bucket: &str,
    key: &str,
) -> HubResult<HeadOutcome> {
    let path = normalize_path(key);
    let coalesce_key = format!("{bucket}/{path}");
    let object_key = ObjectKey {
        storage_top_level: bucket.to_string(),
        path: path.to_string(),
    };

    let stat = flight
        .run(&coalesce_key, || async { driver.perform_stat(object_key).await })
        .await?;

    if !stat.exists {
        return Ok(HeadOutcome::NotFound);
    }
    Ok(HeadOutcome::Found {
        headers: ReadHeaders::from(&stat),
    })
}

/// Formats a timestamp as an RFC 7231 IMF-fixdate, the format HTTP
/// `Last-Modified` headers use (§4.7).
pub fn format_last_modified(ts: DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryDriver;
    use crate::driver::WriteRequest;

    #[tokio::test]
    async fn get_missing_object_is_not_found() {
        let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
        let outcome = handle_get(&driver, "principal1", "foo/bar").await.unwrap();
        assert!(matches!(outcome, GetOutcome::NotFound));
    }

    #[tokio::test]
    async fn get_present_object_returns_headers() {
        let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
        driver
            .perform_write(
                WriteRequest {
                    storage_top_level: "principal1".to_string(),
                    path: "foo/bar".to_string(),
                    content_type: "text/plain".to_string(),
                    content_length: Some(5),
                },
                Box::pin(&b"hello"[..]),
            )
            .await
            .unwrap();

        let outcome = handle_get(&driver, "principal1", "foo/bar").await.unwrap();
        match outcome {
            GetOutcome::Found { headers, .. } => {
                assert_eq!(headers.content_length, Some(5));
            }
            GetOutcome::NotFound => panic!("expected object to be found"),
        }
    }

    #[tokio::test]
    async fn head_strips_trailing_slash() {
        let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
        driver
            .perform_write(
                WriteRequest {
                    storage_top_level: "principal1".to_string(),
                    path: "foo/bar".to_string(),
                    content_type: "text/plain".to_string(),
                    content_length: Some(5),
                },
                Box::pin(&b"hello"[..]),
            )
            .await
            .unwrap();

        let flight = Arc::new(SingleFlight::new());
        let outcome = handle_head(&driver, &flight, "principal1", "foo/bar/").await.unwrap();
        assert!(matches!(outcome, HeadOutcome::Found { .. }));
    }

    #[tokio::test]
    async fn concurrent_heads_for_the_same_key_share_one_driver_call() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        #[derive(Debug)]
        struct CountingDriver {
            inner: MemoryDriver,
            stat_calls: Arc<AtomicUsize>,
        }

        #[async_trait::async_trait]
        impl Driver for CountingDriver {
            async fn ensure_initialized(&self) -> HubResult<()> {
                self.inner.ensure_initialized().await
            }
            async fn perform_write(
                &self,
                req: WriteRequest,
                stream: crate::driver::WriteStream,
            ) -> HubResult<String> {
                self.inner.perform_write(req, stream).await
            }
            async fn perform_read(&self, key: ObjectKey) -> HubResult<FileInfo> {
                self.inner.perform_read(key).await
            }
            async fn perform_stat(&self, key: ObjectKey) -> HubResult<Stat> {
                self.stat_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                self.inner.perform_stat(key).await
            }
            async fn perform_delete(&self, key: ObjectKey) -> HubResult<()> {
                self.inner.perform_delete(key).await
            }
            async fn perform_rename(&self, key: ObjectKey, new_path: String) -> HubResult<()> {
                self.inner.perform_rename(key, new_path).await
            }
            async fn list_files(
                &self,
                path_prefix: &str,
                page: Option<&str>,
            ) -> HubResult<crate::driver::ListPage> {
                self.inner.list_files(path_prefix, page).await
            }
            async fn list_files_stat(
                &self,
                path_prefix: &str,
                page: Option<&str>,
            ) -> HubResult<crate::driver::ListPage> {
                self.inner.list_files_stat(path_prefix, page).await
            }
            fn get_read_url_prefix(&self) -> String {
                self.inner.get_read_url_prefix()
            }
        }

        let stat_calls = Arc::new(AtomicUsize::new(0));
        let driver: Arc<dyn Driver> = Arc::new(CountingDriver {
            inner: MemoryDriver::new(),
            stat_calls: stat_calls.clone(),
        });
        driver
            .perform_write(
                WriteRequest {
                    storage_top_level: "principal1".to_string(),
                    path: "foo/bar".to_string(),
                    content_type: "text/plain".to_string(),
                    content_length: Some(5),
                },
                Box::pin(&b"hello"[..]),
            )
            .await
            .unwrap();

        let flight = Arc::new(SingleFlight::new());
        let driver2 = driver.clone();
        let flight2 = flight.clone();
        let first = tokio::spawn(async move { handle_head(&driver2, &flight2, "principal1", "foo/bar").await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = handle_head(&driver, &flight, "principal1", "foo/bar").await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert!(matches!(first, HeadOutcome::Found { .. }));
        assert!(matches!(second, HeadOutcome::Found { .. }));
        assert_eq!(stat_calls.load(Ordering::SeqCst), 1);
    }
}
