use crate::config::{finite_positive, HubConfig};
use crate::driver::{Driver, ObjectKey, WriteRequest, WriteStream};
use crate::error::{HubError, HubResult, PayloadTooLargeMarker, ValidationError};
use crate::path::ObjectPath;
use crate::principal::Principal;
use crate::proof::ProofChecker;
use crate::revocation::RevocationClock;
use crate::token::{self, HubUrlPolicy};
use rand::Rng;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// An `AsyncRead` pass-through that forwards bytes unchanged while counting
/// them, destroying the stream with a `PayloadTooLargeMarker` error the
/// moment the running total exceeds `effective_limit` (§4.5 step 8, §9
/// redesign flag on stream pass-through).
struct ByteCountingReader<R> {
    inner: R,
    counted: u64,
    effective_limit: u64,
}

impl<R> ByteCountingReader<R> {
    fn new(inner: R, effective_limit: u64) -> Self {
        Self {
            inner,
            counted: 0,
            effective_limit,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ByteCountingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let read = (buf.filled().len() - before) as u64;
                this.counted += read;
                if this.counted > this.effective_limit {
                    return Poll::Ready(Err(io::Error::other(PayloadTooLargeMarker)));
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// Draws a 10-character historical-name suffix from `[0-9A-Za-z]` (§6).
pub(crate) fn random_history_suffix() -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..10)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Rewrites a driver-native URL onto the hub's configured public read
/// prefix when the two differ and the URL begins with the driver's own
/// prefix (§4.1). Idempotent: applying it twice equals applying it once,
/// because a URL already rewritten no longer starts with `driver_prefix`
/// unless the two prefixes coincide.
pub fn rewrite_url(url: &str, driver_prefix: &str, hub_prefix: &str) -> String {
    let driver_prefix = driver_prefix.trim_end_matches('/');
    let hub_prefix = hub_prefix.trim_end_matches('/');
    if driver_prefix == hub_prefix {
        return url.to_string();
    }
    match url.strip_prefix(driver_prefix) {
        Some(rest) => format!("{hub_prefix}{rest}"),
        None => url.to_string(),
    }
}

pub struct UploadRequest<'a> {
    pub principal: &'a str,
    pub path: &'a str,
    pub authorization_header: &'a str,
    pub content_type: Option<&'a str>,
    pub content_length: Option<u64>,
}

/// Runs the ordered upload pipeline of §4.5 and returns the rewritten
/// public read URL on success.
pub async fn handle_request(
    req: UploadRequest<'_>,
    body: WriteStream,
    driver: &Arc<dyn Driver>,
    revocation: &RevocationClock,
    proof_checker: &dyn ProofChecker,
    hub_url_policy: HubUrlPolicy<'_>,
    config: &HubConfig,
    now_unix: i64,
) -> HubResult<String> {
    let principal = Principal::parse(req.principal)?;
    let object_path = ObjectPath::parse(req.path)?;

    // Step 1-2: revocation lookup, then auth verification.
    let revoked_before = revocation.get(principal.as_str()).await?;
    let whitelist: Option<Vec<Principal>> = config
        .writer_whitelist
        .as_ref()
        .map(|names| names.iter().filter_map(|n| Principal::parse(n).ok()).collect());
    let verified = token::verify(
        req.authorization_header,
        &principal,
        hub_url_policy,
        revoked_before,
        whitelist.as_deref(),
        now_unix,
    )?;

    // Step 3: default content type.
    let content_type = req
        .content_type
        .filter(|s| !s.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();

    if object_path.is_reserved() {
        return Err(HubError::ConflictingName(object_path.as_str().to_string()));
    }

    // Step 4: scope enforcement.
    if !verified.scopes.authorizes_write(object_path.as_str()) {
        return Err(ValidationError::ScopeDenied.into());
    }
    let archival = verified.scopes.is_archival();

    // Step 5: social-proof check.
    proof_checker
        .check(principal.as_str(), object_path.as_str())
        .await?;

    // Step 6: declared-length precheck.
    if let Some(declared) = finite_positive(req.content_length) {
        if declared > config.max_file_upload_size_bytes {
            return Err(HubError::PayloadTooLarge(format!(
                "declared length {declared} exceeds limit {}",
                config.max_file_upload_size_bytes
            )));
        }
    }

    // Step 7: archival rename, swallowing a missing prior object.
    if archival {
        let historical = object_path.historical_sibling(now_unix as u64, &random_history_suffix());
        let rename_result = driver
            .perform_rename(
                ObjectKey {
                    storage_top_level: principal.as_str().to_string(),
                    path: object_path.as_str().to_string(),
                },
                historical.as_str().to_string(),
            )
            .await;
        match rename_result {
            Ok(()) => tracing::debug!(
                principal = principal.as_str(),
                path = object_path.as_str(),
                "archived prior object"
            ),
            Err(e) if e.is_does_not_exist() => {}
            Err(e) => return Err(e),
        }
    }

    // Step 8: byte-counting pass-through over the effective limit.
    let effective_limit =
        finite_positive(req.content_length).unwrap_or(config.max_file_upload_size_bytes);
    let counted_stream: WriteStream = Box::pin(ByteCountingReader::new(body, effective_limit));

    // Step 9: write via the driver; overflow surfaces as the driver's I/O error.
    let write_req = WriteRequest {
        storage_top_level: principal.as_str().to_string(),
        path: object_path.as_str().to_string(),
        content_type,
        content_length: req.content_length,
    };
    let raw_url = driver.perform_write(write_req, counted_stream).await?;

    // Step 10: URL rewrite.
    let url = rewrite_url(&raw_url, &driver.get_read_url_prefix(), &config.read_url_prefix);
    tracing::info!(
        principal = principal.as_str(),
        path = object_path.as_str(),
        archival,
        "object written"
    );
    Ok(url)
}
