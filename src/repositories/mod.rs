//! # Repository Layer
//!
//! Thin SeaORM wrappers over the bookkeeping tables. Every method returns
//! `anyhow::Result` and writes at most one row.

pub mod api_log;
pub mod credential;
pub mod entity_description;
pub mod sync_checkpoint;
pub mod tenant;

pub use api_log::ApiLogRepository;
pub use credential::CredentialRepository;
pub use entity_description::EntityDescriptionRepository;
pub use sync_checkpoint::CheckpointRepository;
pub use tenant::TenantRepository;
