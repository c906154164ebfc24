//! Connectors module
//!
//! This module provides the provider adapters:
//! - The `Provider` trait every adapter implements
//! - The registry mapping provider slugs to configured adapters
//! - Salesforce, Outreach and Google Calendar implementations

pub mod google_calendar;
pub mod outreach;
pub mod registry;
pub mod salesforce;
pub mod trait_;

pub use google_calendar::GoogleCalendarProvider;
pub use outreach::OutreachProvider;
pub use registry::{Registry, RegistryError};
pub use salesforce::SalesforceProvider;
pub use trait_::{FieldCatalog, FieldDescriptor, Provider, SyncTarget, TargetContext};
