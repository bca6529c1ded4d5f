/// Process-wide configuration, injected by reference into every call
/// rather than read from a global singleton (§9 redesign flag).
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// This hub's own canonical name, used for the `hubUrl` claim check.
    pub server_name: String,
    /// Additional hub names a token's `hubUrl` claim may pin to.
    pub valid_hub_urls: Vec<String>,
    /// When set, step 6 of §4.2 rejects tokens whose `hubUrl` claim doesn't
    /// match `server_name` or one of `valid_hub_urls`.
    pub require_correct_hub_url: bool,
    /// Upper bound on upload size, enforced against both declared and
    /// observed length (§4.5). Default is `20 * 1024 * 1024` bytes.
    pub max_file_upload_size_bytes: u64,
    /// If non-empty, restricts writers to these principals (§4.2 step 8).
    pub writer_whitelist: Option<Vec<String>>,
    /// Public read URL prefix the hub rewrites driver URLs onto (§4.1).
    pub read_url_prefix: String,
    /// Capacity of the in-memory revocation-clock LRU (§4.3).
    pub revocation_cache_capacity: usize,
    /// Returned verbatim in `GET /hub_info`'s `challenge_text` field.
    pub challenge_text: String,
    /// Returned verbatim in `GET /hub_info`'s `latest_auth_version` field.
    pub latest_auth_version: String,
}

/// Correct MiB conversion (§9 decision): `1024 * 1024`, not the source's
/// `1024/1024` bug. No code path should divide by `1024 / 1024`.
pub const BYTES_PER_MEBIBYTE: u64 = 1024 * 1024;

pub const DEFAULT_MAX_UPLOAD_SIZE_BYTES: u64 = 20 * BYTES_PER_MEBIBYTE;

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_string(),
            valid_hub_urls: Vec::new(),
            require_correct_hub_url: false,
            max_file_upload_size_bytes: DEFAULT_MAX_UPLOAD_SIZE_BYTES,
            writer_whitelist: None,
            read_url_prefix: "http://localhost:3000".to_string(),
            revocation_cache_capacity: 50_000,
            challenge_text: String::new(),
            latest_auth_version: "v1".to_string(),
        }
    }
}

/// Both the declared-length precheck and the observed-overflow fallback
/// require strictly positive values to count as "finite" (§9 decision):
/// `Some(0)` is treated as not-finite and falls through to the configured
/// ceiling.
pub fn finite_positive(len: Option<u64>) -> Option<u64> {
    len.filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_is_not_finite() {
        assert_eq!(finite_positive(Some(0)), None);
    }

    #[test]
    fn positive_length_is_finite() {
        assert_eq!(finite_positive(Some(5)), Some(5));
    }

    #[test]
    fn missing_length_is_not_finite() {
        assert_eq!(finite_positive(None), None);
    }

    #[test]
    fn default_ceiling_uses_correct_mib_divisor() {
        assert_eq!(DEFAULT_MAX_UPLOAD_SIZE_BYTES, 20 * 1024 * 1024);
    }
}
