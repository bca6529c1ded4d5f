use hub_core::driver::{Driver, Stat};
use hub_core::lock::SingleFlight;
use hub_core::revocation::RevocationClock;
use hub_core::token::HubUrlPolicy;
use hub_core::{HubConfig, HubResult};
use std::sync::Arc;

use crate::config::ServiceConfig;

/// Everything a request handler needs, constructed once in `main` and
/// cloned into each worker via `web::Data` (§6.1).
#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<dyn Driver>,
    pub config: HubConfig,
    pub revocation: Arc<RevocationClock>,
    pub stat_coalescer: Arc<SingleFlight<HubResult<Stat>>>,
}

impl AppState {
    pub fn new(service_config: &ServiceConfig) -> Self {
        let driver = service_config.build_driver();
        let revocation = Arc::new(RevocationClock::new(
            driver.clone(),
            service_config.hub.revocation_cache_capacity,
        ));
        Self {
            driver,
            config: service_config.hub.clone(),
            revocation,
            stat_coalescer: Arc::new(SingleFlight::new()),
        }
    }

    pub fn hub_url_policy(&self) -> HubUrlPolicy<'_> {
        HubUrlPolicy {
            server_name: &self.config.server_name,
            valid_hub_urls: &self.config.valid_hub_urls,
            require_correct_hub_url: self.config.require_correct_hub_url,
        }
    }
}
