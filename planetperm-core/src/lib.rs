pub mod models;
pub mod repository;
pub mod service;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

#[cfg(test)]
pub mod test_helpers;

pub use config::Config;
pub use error::{Error, Result};
pub use cache::{InvalidationBus, InvalidationMessage};
pub use repository::{MemoryRepository, PermissionRepository};
pub use service::PermissionService;
