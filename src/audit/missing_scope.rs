//! Missing scope detection
//!
//! The target does not report unknown scopes with a dedicated error code; the
//! scope identifier only appears inside the free-text message. Detection sits
//! behind [`MissingScopeExtractor`] so a structured implementation can replace
//! the text scan without touching the orchestrator.

use tracing::{debug, warn};

use super::report::ErrorReport;

pub const UNKNOWN_SCOPE_MARKER: &str = "unknown scope value at";
pub const SCOPE_VALUE_DELIMITER: &str = " for value ";

pub trait MissingScopeExtractor: Send + Sync {
    /// Distinct scope identifiers in first-seen order
    fn missing_scopes(&self, report: &ErrorReport) -> Vec<String>;
}

/// Recovers scope identifiers from "Unknown scope value at ... for value <scope>"
#[derive(Debug, Clone, Copy, Default)]
pub struct TextualScopeExtractor;

impl TextualScopeExtractor {
    /// `None` when the message is not an unknown-scope failure or carries no value
    pub fn parse_message(message: &str) -> Option<&str> {
        if !Self::is_unknown_scope(message) {
            return None;
        }
        Self::scope_value(message)
    }

    fn is_unknown_scope(message: &str) -> bool {
        message.to_lowercase().contains(UNKNOWN_SCOPE_MARKER)
    }

    fn scope_value(message: &str) -> Option<&str> {
        let (_, scope) = message.split_once(SCOPE_VALUE_DELIMITER)?;
        // anything after a second delimiter is not part of the value
        let scope = scope.split(SCOPE_VALUE_DELIMITER).next().unwrap_or_default();
        if scope.is_empty() {
            return None;
        }
        Some(scope)
    }
}

impl MissingScopeExtractor for TextualScopeExtractor {
    fn missing_scopes(&self, report: &ErrorReport) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        for message in report.messages() {
            if !Self::is_unknown_scope(message) {
                continue;
            }
            match Self::scope_value(message) {
                Some(scope) => {
                    if !scopes.iter().any(|s| s == scope) {
                        scopes.push(scope.to_string());
                    }
                }
                // left in the report so it shows up for the operator
                None => warn!(message, "unknown scope error without a scope value"),
            }
        }
        if !scopes.is_empty() {
            debug!(?scopes, "missing scopes detected");
        }
        scopes
    }
}
