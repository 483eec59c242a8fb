//! Audit driver
//!
//! fetch -> map -> validate -> detect missing scopes -> reconcile -> re-validate
//! -> merge, one page at a time until the source is exhausted.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::fetcher::EventFetcher;
use super::mapper::map_events;
use super::missing_scope::{MissingScopeExtractor, TextualScopeExtractor};
use super::reconciler::ScopeReconciler;
use super::report::ErrorReport;
use super::validator::TargetValidator;
use crate::config::AuditSettings;
use crate::remote::{SourceApi, TargetApi};

#[derive(Debug, Clone)]
pub struct AuditSummary {
    pub report: ErrorReport,
    pub events_processed: u64,
    /// Fetched by offset paging but older than the retention window
    pub events_out_of_window: u64,
    pub batches: u64,
    /// Scopes created on the target during the run, in creation order
    pub scopes_created: Vec<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum AuditOutcome {
    /// Every page was validated
    Completed(AuditSummary),
    /// Scopes are missing on the target and automatic creation is off
    MissingScopes(Vec<String>),
}

pub struct ValidationOrchestrator<'a> {
    fetcher: EventFetcher<'a>,
    validator: TargetValidator<'a>,
    reconciler: ScopeReconciler<'a>,
    extractor: Box<dyn MissingScopeExtractor + 'a>,
    create_scopes: bool,
}

impl<'a> ValidationOrchestrator<'a> {
    pub fn new(
        source: &'a dyn SourceApi,
        target: &'a dyn TargetApi,
        settings: &AuditSettings,
    ) -> Self {
        Self {
            fetcher: EventFetcher::new(source, settings),
            validator: TargetValidator::new(target),
            reconciler: ScopeReconciler::from_settings(target, settings),
            extractor: Box::new(TextualScopeExtractor),
            create_scopes: settings.create_scopes,
        }
    }

    pub fn with_extractor(mut self, extractor: impl MissingScopeExtractor + 'a) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub async fn run(mut self) -> Result<AuditOutcome> {
        let started = Instant::now();
        let mut report = ErrorReport::new();
        let mut events_processed: u64 = 0;
        let mut batches: u64 = 0;
        let mut scopes_created: Vec<String> = Vec::new();

        loop {
            let raw = self
                .fetcher
                .next_page()
                .await
                .context("Failed to fetch events from source")?;
            if raw.is_empty() {
                break;
            }

            batches += 1;
            events_processed += raw.len() as u64;
            info!(batch = batches, events_processed, "Analyzing the events");

            let events = map_events(raw);
            let mut validated = self.validator.validate(&events).await?;

            let missing = self.extractor.missing_scopes(&validated);
            if !missing.is_empty() {
                warn!(
                    ?missing,
                    "The following scopes are missing on the target instance"
                );
                if !self.create_scopes {
                    return Ok(AuditOutcome::MissingScopes(missing));
                }

                // sequential; a failure leaves earlier scopes created
                for scope in &missing {
                    self.reconciler.reconcile(scope).await?;
                }
                scopes_created.extend(missing);

                validated = self
                    .validator
                    .validate(&events)
                    .await
                    .context("Re-validation after scope creation failed")?;
                let unresolved = self.extractor.missing_scopes(&validated);
                if !unresolved.is_empty() {
                    warn!(
                        ?unresolved,
                        "scope errors remain after reconciliation, keeping them in the report"
                    );
                }
            }

            report.merge(validated);
            debug!(
                batch = batches,
                event_types = report.len(),
                errors = report.error_count(),
                "report updated"
            );
        }

        Ok(AuditOutcome::Completed(AuditSummary {
            report,
            events_processed,
            events_out_of_window: self.fetcher.events_out_of_window(),
            batches,
            scopes_created,
            elapsed: started.elapsed(),
        }))
    }
}
