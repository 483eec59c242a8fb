//! Event Schema Audit
//!
//! Reads events page by page from the source instance, reshapes them, has the
//! target validate each batch and folds the failures into one report.
//! Scopes the target does not know about can be created on the fly.

pub mod fetcher;
pub mod mapper;
pub mod missing_scope;
pub mod orchestrator;
pub mod reconciler;
pub mod report;
pub mod validator;

pub use fetcher::{event_timestamp, within_retention, EventFetcher, PaginationState};
pub use mapper::{map_event, map_events, SYSTEM_SCOPE};
pub use missing_scope::{MissingScopeExtractor, TextualScopeExtractor};
pub use orchestrator::{AuditOutcome, AuditSummary, ValidationOrchestrator};
pub use reconciler::ScopeReconciler;
pub use report::ErrorReport;
pub use validator::TargetValidator;
