//! Event Schema Audit Library
//!
//! Exposes the audit pipeline for the CLI binary and the integration tests.

pub mod audit;
pub mod config;
pub mod models;
pub mod remote;

pub use audit::{AuditOutcome, AuditSummary, ErrorReport, ValidationOrchestrator};
pub use config::{AuditSettings, ConnectionsConfig, HostConfig, PaginationMode};
