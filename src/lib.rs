//! Quill legacy workspace migration
//!
//! Detects legacy Quill workspaces, converts their configuration, caches and
//! templates into the current layout with backup and rollback support, and
//! manages the migrated response cache.

pub use crate::cache_mgmt::CacheManagementService;
pub use crate::config::Settings;
pub use crate::migration::{
    MigrationEngine, MigrationError, MigrationRequest, MigrationResult, MigrationType,
};

// Re-export commonly used dependencies for tests
pub use serde_json;

pub mod cache_mgmt;
pub mod config;
pub mod migration;
pub mod server;
