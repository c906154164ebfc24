//! # Data Models
//!
//! SeaORM entities for the bookkeeping tables. Synced provider rows are not
//! modelled here; they are written through [`crate::entity_store`].

pub mod credential;
pub mod entity_description;
pub mod provider_api_log;
pub mod sync_checkpoint;
pub mod tenant;

pub use credential::Entity as Credential;
pub use entity_description::Entity as EntityDescription;
pub use provider_api_log::Entity as ProviderApiLog;
pub use sync_checkpoint::Entity as SyncCheckpoint;
pub use tenant::Entity as Tenant;
