//! Batch schema validation against the target

use anyhow::{Context, Result};
use tracing::debug;

use super::report::ErrorReport;
use crate::models::Event;
use crate::remote::TargetApi;

/// Submits normalized batches to the target's validation endpoint
pub struct TargetValidator<'a> {
    target: &'a dyn TargetApi,
}

impl<'a> TargetValidator<'a> {
    pub fn new(target: &'a dyn TargetApi) -> Self {
        Self { target }
    }

    pub async fn validate(&self, events: &[Event]) -> Result<ErrorReport> {
        let raw = self
            .target
            .validate_events(events)
            .await
            .with_context(|| format!("Validation of {} events failed", events.len()))?;
        let report = ErrorReport::from(raw);
        debug!(
            events = events.len(),
            failing_types = report.len(),
            errors = report.error_count(),
            "batch validated"
        );
        Ok(report)
    }
}
