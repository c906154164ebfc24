//! # CRM Sync Library
//!
//! Incremental, resumable sync of tenant CRM data (Salesforce, Outreach,
//! Google Calendar) into relational tables, with checkpoints, credential
//! refresh and per-resource failure isolation.

pub mod config;
pub mod connectors;
pub mod db;
pub mod entity_store;
pub mod error;
pub mod fetch;
pub mod mapper;
pub mod models;
pub mod paginator;
pub mod repositories;
pub mod sync_driver;
pub mod sync_orchestrator;
pub mod telemetry;
pub mod token_refresh;
pub use migration;
