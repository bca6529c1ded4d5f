//! Core auth, driver, and upload pipeline for a multi-tenant write-through
//! storage gateway: authenticated principals upload, delete, list, and
//! rename objects beneath a per-principal namespace backed by a pluggable
//! object store, fronted by a companion read gateway.

pub mod config;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod ops;
pub mod path;
pub mod principal;
pub mod proof;
pub mod revocation;
pub mod token;
pub mod upload;

pub use config::HubConfig;
pub use error::{HubError, HubResult, ValidationError};
pub use path::ObjectPath;
pub use principal::Principal;
