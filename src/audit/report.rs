//! Error report accumulated over an audit run
//!
//! Keys are event types, values the distinct validation errors seen for that
//! type. Merging is a per-key set union, so it is idempotent, commutative and
//! only grows with genuinely new errors. Entries keep the order the target
//! first reported them in; only the written JSON is sorted.

use anyhow::{Context, Result};
use indexmap::{IndexMap, IndexSet};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::path::Path;

use crate::models::{ValidationError, ValidationResponse};

// IndexMap/IndexSet equality ignores order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorReport {
    errors: IndexMap<String, IndexSet<ValidationError>>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of event types with at least one error
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().map(IndexSet::len).sum()
    }

    pub fn get(&self, event_type: &str) -> Option<&IndexSet<ValidationError>> {
        self.errors.get(event_type)
    }

    /// Every error message in first-seen order
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.errors
            .values()
            .flat_map(|set| set.iter().map(|e| e.error.as_str()))
    }

    pub fn insert(&mut self, event_type: impl Into<String>, error: ValidationError) -> bool {
        self.errors.entry(event_type.into()).or_default().insert(error)
    }

    /// Union `incoming` into `self`
    pub fn merge(&mut self, incoming: ErrorReport) {
        if self.errors.is_empty() {
            self.errors = incoming.errors;
            return;
        }
        for (event_type, errors) in incoming.errors {
            self.errors.entry(event_type).or_default().extend(errors);
        }
    }

    pub fn merged(mut self, incoming: ErrorReport) -> Self {
        self.merge(incoming);
        self
    }

    /// Pretty JSON with four-space indentation
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut buf = Vec::with_capacity(1024);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser).context("Failed to serialize error report")?;
        String::from_utf8(buf).context("Error report is not valid UTF-8")
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json_pretty()?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))
    }
}

/// Raw validator output; empty error lists add nothing
impl From<ValidationResponse> for ErrorReport {
    fn from(raw: ValidationResponse) -> Self {
        let errors = raw
            .into_iter()
            .filter(|(_, errors)| !errors.is_empty())
            .map(|(event_type, errors)| (event_type, errors.into_iter().collect()))
            .collect();
        Self { errors }
    }
}

impl FromIterator<(String, ValidationError)> for ErrorReport {
    fn from_iter<I: IntoIterator<Item = (String, ValidationError)>>(iter: I) -> Self {
        let mut report = ErrorReport::new();
        for (event_type, error) in iter {
            report.insert(event_type, error);
        }
        report
    }
}

// Sorted by event type, then error, so equal reports write identical files
impl Serialize for ErrorReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut types: Vec<(&String, &IndexSet<ValidationError>)> = self.errors.iter().collect();
        types.sort_by(|a, b| a.0.cmp(b.0));

        let mut map = serializer.serialize_map(Some(types.len()))?;
        for (event_type, errors) in types {
            let mut list: Vec<&ValidationError> = errors.iter().collect();
            list.sort();
            map.serialize_entry(event_type, &list)?;
        }
        map.end()
    }
}
