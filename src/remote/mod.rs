//! Remote analytics service access
//!
//! The audit only talks to the services through these two traits, so the
//! pipeline can be driven against in-memory fakes.

pub mod query;
pub mod rest;

use anyhow::Result;

use crate::models::{Event, EventSearchResponse, ValidationResponse};

pub use query::{Condition, EventSearchQuery, Paging};
pub use rest::RestClient;

/// Instance the events are read from
#[async_trait::async_trait]
pub trait SourceApi: Send + Sync {
    async fn search_events(&self, query: &EventSearchQuery) -> Result<EventSearchResponse>;
}

/// Instance whose schemas the events are validated against
#[async_trait::async_trait]
pub trait TargetApi: Send + Sync {
    /// Event-type key -> failures; types missing from the map passed
    async fn validate_events(&self, events: &[Event]) -> Result<ValidationResponse>;

    /// `Ok(false)` when the target answered with a non-success status
    async fn create_scope(&self, scope: &str) -> Result<bool>;

    /// Identifiers of every declared scope
    async fn list_scopes(&self) -> Result<Vec<String>>;
}
