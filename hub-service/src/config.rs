use hub_core::config::DEFAULT_MAX_UPLOAD_SIZE_BYTES;
use hub_core::driver::DriverKind;
use hub_core::HubConfig;
use std::sync::Arc;

/// Everything read from the environment at process start: the `HubConfig`
/// the core needs plus the binary-only concerns (bind address, TLS paths,
/// which driver to build).
pub struct ServiceConfig {
    pub hub: HubConfig,
    pub driver_kind: DriverKind,
    pub disk_storage_root: String,
    pub s3_endpoint: String,
    pub s3_bucket: String,
    pub azure_account_url: String,
    pub azure_container: String,
    pub gcs_api_base: String,
    pub gcs_bucket: String,
    pub addr: String,
    pub http_redirect_addr: String,
    pub cert_path: String,
    pub key_path: String,
}

impl ServiceConfig {
    pub fn init() -> Self {
        let max_upload_mib: u64 = envmnt::get_or("MAX_FILE_UPLOAD_SIZE_MIB", "20")
            .parse()
            .unwrap_or(20);
        let max_file_upload_size_bytes = max_upload_mib
            .checked_mul(hub_core::config::BYTES_PER_MEBIBYTE)
            .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE_BYTES);

        let writer_whitelist = envmnt::get_or("WHITELISTED_WRITERS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        let writer_whitelist = if writer_whitelist.is_empty() {
            None
        } else {
            Some(writer_whitelist)
        };

        let valid_hub_urls = envmnt::get_or("VALID_HUB_URLS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let hub = HubConfig {
            server_name: envmnt::get_or("SERVER_NAME", "localhost"),
            valid_hub_urls,
            require_correct_hub_url: envmnt::get_or("REQUIRE_CORRECT_HUB_URL", "false")
                .parse()
                .unwrap_or(false),
            max_file_upload_size_bytes,
            writer_whitelist,
            read_url_prefix: envmnt::get_or("READ_URL_PREFIX", "http://localhost:3000"),
            revocation_cache_capacity: envmnt::get_or("REVOCATION_CACHE_CAPACITY", "50000")
                .parse()
                .unwrap_or(50_000),
            challenge_text: envmnt::get_or("CHALLENGE_TEXT", ""),
            latest_auth_version: envmnt::get_or("LATEST_AUTH_VERSION", "v1"),
        };

        Self {
            hub,
            driver_kind: DriverKind::parse(&envmnt::get_or("DRIVER_KIND", "disk")),
            disk_storage_root: envmnt::get_or("DISK_STORAGE_ROOT", "./hub-storage"),
            s3_endpoint: envmnt::get_or("S3_ENDPOINT", ""),
            s3_bucket: envmnt::get_or("S3_BUCKET", ""),
            azure_account_url: envmnt::get_or("AZURE_ACCOUNT_URL", ""),
            azure_container: envmnt::get_or("AZURE_CONTAINER", ""),
            gcs_api_base: envmnt::get_or("GCS_API_BASE", "https://storage.googleapis.com"),
            gcs_bucket: envmnt::get_or("GCS_BUCKET", ""),
            addr: envmnt::get_or("SERVER_ADDR", "0.0.0.0:443"),
            http_redirect_addr: envmnt::get_or("SERVER_HTTP_REDIRECT_ADDR", "0.0.0.0:80"),
            cert_path: envmnt::get_or("SERVER_CERT_PATH", "cert.pem"),
            key_path: envmnt::get_or("SERVER_KEY_PATH", "key.pem"),
        }
    }

    /// Builds the concrete `Driver` trait object named by `driver_kind`
    /// (§9: a single match at startup, no string dispatch inside request
    /// handling).
    pub fn build_driver(&self) -> Arc<dyn hub_core::driver::Driver> {
        match self.driver_kind {
            DriverKind::Disk => Arc::new(hub_core::driver::disk::DiskDriver::new(
                self.disk_storage_root.clone(),
                self.hub.read_url_prefix.clone(),
            )),
            DriverKind::Memory => Arc::new(hub_core::driver::memory::MemoryDriver::new()),
            DriverKind::S3 => {
                let transport = Arc::new(hub_core::driver::transport::ReqwestTransport::new());
                Arc::new(hub_core::driver::s3::S3Driver::new(
                    transport,
                    self.s3_endpoint.clone(),
                    self.s3_bucket.clone(),
                    self.hub.read_url_prefix.clone(),
                ))
            }
            DriverKind::Azure => {
                let transport = Arc::new(hub_core::driver::transport::ReqwestTransport::new());
                Arc::new(hub_core::driver::azure::AzureDriver::new(
                    transport,
                    self.azure_account_url.clone(),
                    self.azure_container.clone(),
                    self.hub.read_url_prefix.clone(),
                ))
            }
            DriverKind::Gcs => {
                let transport = Arc::new(hub_core::driver::transport::ReqwestTransport::new());
                Arc::new(hub_core::driver::gcs::GcsDriver::new(
                    transport,
                    self.gcs_api_base.clone(),
                    self.gcs_bucket.clone(),
                    self.hub.read_url_prefix.clone(),
                ))
            }
        }
    }
}
