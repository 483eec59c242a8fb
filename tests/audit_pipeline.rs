//! End-to-end tests for the audit pipeline
//!
//! The source and target instances are in-memory fakes: the source serves
//! scripted pages, the target validates scopes against its declared list the
//! way the real schema service does.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{json, Value};

use event_schema_audit::audit::{ErrorReport, MissingScopeExtractor, SYSTEM_SCOPE};
use event_schema_audit::models::{Event, EventSearchResponse, ValidationError, ValidationResponse};
use event_schema_audit::remote::{EventSearchQuery, SourceApi, TargetApi};
use event_schema_audit::{AuditOutcome, AuditSettings, PaginationMode, ValidationOrchestrator};

struct FakeSource {
    pages: Mutex<VecDeque<Vec<Event>>>,
    requests: Mutex<usize>,
    /// 1-based request number that fails
    fail_on: Option<usize>,
}

impl FakeSource {
    fn new(pages: Vec<Vec<Event>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            requests: Mutex::new(0),
            fail_on: None,
        }
    }

    fn failing_on(mut self, request: usize) -> Self {
        self.fail_on = Some(request);
        self
    }
}

#[async_trait::async_trait]
impl SourceApi for FakeSource {
    async fn search_events(&self, _query: &EventSearchQuery) -> Result<EventSearchResponse> {
        let mut requests = self.requests.lock();
        *requests += 1;
        if self.fail_on == Some(*requests) {
            anyhow::bail!("POST /events/search 503 Service Unavailable: ");
        }
        let list = self.pages.lock().pop_front().unwrap_or_default();
        Ok(EventSearchResponse {
            list,
            scroll_identifier: Some(format!("cursor-{}", *requests)),
            total_size: None,
        })
    }
}

struct FakeTarget {
    declared: Mutex<HashSet<String>>,
    rejected: HashSet<String>,
    /// Errors reported for every event of a type, independent of scope
    type_errors: HashMap<String, String>,
    validated_batches: Mutex<Vec<Vec<Event>>>,
    created: Mutex<Vec<String>>,
    /// 1-based validation call that fails
    fail_validation_on: Option<usize>,
    /// Accept creations but never list them
    hide_created: bool,
}

impl FakeTarget {
    fn new() -> Self {
        Self {
            declared: Mutex::new([SYSTEM_SCOPE.to_string()].into_iter().collect()),
            rejected: HashSet::new(),
            type_errors: HashMap::new(),
            validated_batches: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            fail_validation_on: None,
            hide_created: false,
        }
    }

    fn failing_validation_on(mut self, call: usize) -> Self {
        self.fail_validation_on = Some(call);
        self
    }

    fn hiding_created_scopes(mut self) -> Self {
        self.hide_created = true;
        self
    }

    fn rejecting(mut self, scope: &str) -> Self {
        self.rejected.insert(scope.to_string());
        self
    }

    fn with_type_error(mut self, event_type: &str, error: &str) -> Self {
        self.type_errors
            .insert(event_type.to_string(), error.to_string());
        self
    }

    fn validations(&self) -> usize {
        self.validated_batches.lock().len()
    }
}

#[async_trait::async_trait]
impl TargetApi for FakeTarget {
    async fn validate_events(&self, events: &[Event]) -> Result<ValidationResponse> {
        let calls = {
            let mut batches = self.validated_batches.lock();
            batches.push(events.to_vec());
            batches.len()
        };
        if self.fail_validation_on == Some(calls) {
            anyhow::bail!("POST /jsonSchema/validateEvents 500 Internal Server Error: ");
        }
        let declared = self.declared.lock().clone();

        let mut result = ValidationResponse::new();
        for event in events {
            let event_type = event["eventType"].as_str().unwrap_or_default().to_string();
            if let Some(scope) = event.get("scope").and_then(Value::as_str) {
                if !declared.contains(scope) {
                    result.entry(event_type.clone()).or_default().push(
                        ValidationError::new(format!(
                            "Unknown scope value at #/scope for value {}",
                            scope
                        )),
                    );
                }
            }
            if let Some(error) = self.type_errors.get(&event_type) {
                result
                    .entry(event_type.clone())
                    .or_default()
                    .push(ValidationError::new(error.clone()));
            }
        }
        Ok(result)
    }

    async fn create_scope(&self, scope: &str) -> Result<bool> {
        if self.rejected.contains(scope) {
            return Ok(false);
        }
        self.created.lock().push(scope.to_string());
        if !self.hide_created {
            self.declared.lock().insert(scope.to_string());
        }
        Ok(true)
    }

    async fn list_scopes(&self) -> Result<Vec<String>> {
        Ok(self.declared.lock().iter().cloned().collect())
    }
}

fn settings(create_scopes: bool) -> AuditSettings {
    AuditSettings {
        batch_size: 100,
        create_scopes,
        scope_timeout: Duration::from_millis(50),
        scope_poll_interval: Duration::from_millis(1),
        ..AuditSettings::default()
    }
}

fn view(scope: &str) -> Event {
    json!({"eventType": "view", "scope": scope, "timeStamp": chrono::Utc::now().to_rfc3339()})
}

fn completed(outcome: AuditOutcome) -> event_schema_audit::AuditSummary {
    match outcome {
        AuditOutcome::Completed(summary) => summary,
        AuditOutcome::MissingScopes(scopes) => panic!("unexpected hard stop on {:?}", scopes),
    }
}

#[tokio::test]
async fn clean_run_ends_on_empty_page_with_empty_report() {
    let page: Vec<Event> = (0..100).map(|_| view(SYSTEM_SCOPE)).collect();
    let source = FakeSource::new(vec![page, vec![]]);
    let target = FakeTarget::new();

    let summary = completed(
        ValidationOrchestrator::new(&source, &target, &settings(false))
            .run()
            .await
            .unwrap(),
    );

    assert!(summary.report.is_empty());
    assert_eq!(summary.events_processed, 100);
    assert_eq!(summary.batches, 1);
    assert_eq!(*source.requests.lock(), 2);
    assert_eq!(target.validations(), 1);
}

#[tokio::test]
async fn missing_scope_without_auto_creation_stops_the_run() {
    let source = FakeSource::new(vec![vec![view("beta")], vec![view(SYSTEM_SCOPE)], vec![]]);
    let target = FakeTarget::new();

    let outcome = ValidationOrchestrator::new(&source, &target, &settings(false))
        .run()
        .await
        .unwrap();

    match outcome {
        AuditOutcome::MissingScopes(scopes) => assert_eq!(scopes, vec!["beta"]),
        AuditOutcome::Completed(_) => panic!("run should stop on missing scope"),
    }
    assert!(target.created.lock().is_empty());
    // later pages are never requested
    assert_eq!(*source.requests.lock(), 1);
}

#[tokio::test]
async fn auto_created_scope_is_followed_by_one_revalidation() {
    let source = FakeSource::new(vec![vec![view("beta"), view("beta")], vec![]]);
    let target = FakeTarget::new().with_type_error("view", "Missing property: source");

    let summary = completed(
        ValidationOrchestrator::new(&source, &target, &settings(true))
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(target.validations(), 2);
    assert_eq!(*target.created.lock(), vec!["beta"]);
    assert_eq!(summary.scopes_created, vec!["beta"]);

    // only the second pass is merged
    let view_errors = summary.report.get("view").unwrap();
    assert_eq!(view_errors.len(), 1);
    assert!(view_errors.contains(&ValidationError::new("Missing property: source")));
    assert!(summary
        .report
        .messages()
        .all(|m| !m.contains("Unknown scope value")));

    // both passes validated the same normalized batch
    let batches = target.validated_batches.lock();
    assert_eq!(batches[0], batches[1]);
}

#[tokio::test]
async fn scopes_are_created_in_first_seen_order() {
    let source = FakeSource::new(vec![vec![view("gamma"), view("beta"), view("gamma")], vec![]]);
    let target = FakeTarget::new();

    let summary = completed(
        ValidationOrchestrator::new(&source, &target, &settings(true))
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(*target.created.lock(), vec!["gamma", "beta"]);
    assert_eq!(summary.scopes_created, vec!["gamma", "beta"]);
}

#[tokio::test]
async fn rejected_first_scope_aborts_before_any_creation() {
    let source = FakeSource::new(vec![vec![view("gamma"), view("beta")], vec![]]);
    let target = FakeTarget::new().rejecting("gamma");

    let err = ValidationOrchestrator::new(&source, &target, &settings(true))
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("gamma"));
    assert!(target.created.lock().is_empty());
    assert_eq!(target.validations(), 1);
    assert_eq!(*source.requests.lock(), 1);
}

#[tokio::test]
async fn rejected_later_scope_leaves_earlier_ones_created() {
    let source = FakeSource::new(vec![vec![view("beta"), view("gamma")], vec![]]);
    let target = FakeTarget::new().rejecting("gamma");

    let err = ValidationOrchestrator::new(&source, &target, &settings(true))
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("gamma"));
    // creation is not transactional
    assert_eq!(*target.created.lock(), vec!["beta"]);
    assert_eq!(target.validations(), 1);
}

#[tokio::test]
async fn scope_that_never_appears_aborts_the_run() {
    let source = FakeSource::new(vec![vec![view("beta")], vec![view(SYSTEM_SCOPE)], vec![]]);
    let target = FakeTarget::new().hiding_created_scopes();

    let err = ValidationOrchestrator::new(&source, &target, &settings(true))
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("beta"));
    assert_eq!(*target.created.lock(), vec!["beta"]);
    assert_eq!(target.validations(), 1);
    assert_eq!(*source.requests.lock(), 1);
}

#[tokio::test]
async fn source_failure_aborts_the_run() {
    let source = FakeSource::new(vec![
        vec![view(SYSTEM_SCOPE)],
        vec![view(SYSTEM_SCOPE)],
        vec![view(SYSTEM_SCOPE)],
        vec![],
    ])
    .failing_on(2);
    let target = FakeTarget::new();

    let err = ValidationOrchestrator::new(&source, &target, &settings(false))
        .run()
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("503"));
    assert_eq!(*source.requests.lock(), 2);
    assert_eq!(target.validations(), 1);
}

#[tokio::test]
async fn validation_failure_aborts_the_run() {
    let source = FakeSource::new(vec![vec![view(SYSTEM_SCOPE)], vec![view(SYSTEM_SCOPE)], vec![]]);
    let target = FakeTarget::new().failing_validation_on(1);

    let err = ValidationOrchestrator::new(&source, &target, &settings(false))
        .run()
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("500"));
    assert_eq!(*source.requests.lock(), 1);
    assert_eq!(target.validations(), 1);
}

#[tokio::test]
async fn revalidation_failure_aborts_the_run() {
    let source = FakeSource::new(vec![vec![view("beta")], vec![view(SYSTEM_SCOPE)], vec![]]);
    let target = FakeTarget::new().failing_validation_on(2);

    let err = ValidationOrchestrator::new(&source, &target, &settings(true))
        .run()
        .await
        .unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("Re-validation after scope creation failed"));
    assert!(message.contains("500"));
    assert_eq!(*target.created.lock(), vec!["beta"]);
    assert_eq!(target.validations(), 2);
    assert_eq!(*source.requests.lock(), 1);
}

#[tokio::test]
async fn errors_are_merged_and_deduplicated_across_pages() {
    let form = json!({"eventType": "form", "properties": {"email": "a@b.c"}});
    let source = FakeSource::new(vec![
        vec![view(SYSTEM_SCOPE), form.clone()],
        vec![form.clone(), view(SYSTEM_SCOPE)],
        vec![form],
        vec![],
    ]);
    let target = FakeTarget::new()
        .with_type_error("form", "Unknown property fields")
        .with_type_error("view", "Missing property: source");

    let summary = completed(
        ValidationOrchestrator::new(&source, &target, &settings(false))
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.events_processed, 5);
    assert_eq!(summary.report.len(), 2);
    assert_eq!(summary.report.error_count(), 2);
}

#[tokio::test]
async fn events_are_normalized_before_validation() {
    let login = json!({
        "eventType": "login",
        "scope": "acme",
        "source": {"scope": "acme"},
        "target": {"scope": "acme"}
    });
    let page_view = json!({
        "eventType": "view",
        "target": {"properties": {"interests": {"golf": 1}}}
    });
    let source = FakeSource::new(vec![vec![login, page_view], vec![]]);
    let target = FakeTarget::new();

    let summary = completed(
        ValidationOrchestrator::new(&source, &target, &settings(false))
            .run()
            .await
            .unwrap(),
    );
    assert!(summary.report.is_empty());

    let batches = target.validated_batches.lock();
    assert_eq!(batches[0][0]["scope"], SYSTEM_SCOPE);
    assert_eq!(batches[0][0]["source"]["scope"], SYSTEM_SCOPE);
    assert_eq!(
        batches[0][1]["flattenedProperties"]["interests"],
        json!({"golf": 1})
    );
}

#[tokio::test]
async fn offset_pagination_stops_at_retention_window() {
    let now = chrono::Utc::now();
    let aged = |days: i64| {
        json!({
            "eventType": "view",
            "timeStamp": (now - chrono::Duration::days(days)).to_rfc3339()
        })
    };
    let source = FakeSource::new(vec![
        vec![aged(1), aged(5)],
        vec![aged(6), aged(90)],
        vec![aged(91)],
    ]);
    let target = FakeTarget::new();
    let settings = AuditSettings {
        pagination: PaginationMode::Offset,
        ..settings(false)
    };

    let summary = completed(
        ValidationOrchestrator::new(&source, &target, &settings)
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(*source.requests.lock(), 2);
    assert_eq!(summary.events_processed, 3);
    assert_eq!(summary.events_out_of_window, 1);
}

struct NoScopeDetection;

impl MissingScopeExtractor for NoScopeDetection {
    fn missing_scopes(&self, _report: &ErrorReport) -> Vec<String> {
        Vec::new()
    }
}

#[tokio::test]
async fn scope_detection_is_replaceable() {
    let source = FakeSource::new(vec![vec![view("beta")], vec![]]);
    let target = FakeTarget::new();

    let summary = completed(
        ValidationOrchestrator::new(&source, &target, &settings(false))
            .with_extractor(NoScopeDetection)
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.report.error_count(), 1);
    assert!(target.created.lock().is_empty());
}

#[tokio::test]
async fn completed_report_is_written_as_json() {
    let source = FakeSource::new(vec![vec![view(SYSTEM_SCOPE)], vec![]]);
    let target = FakeTarget::new().with_type_error("view", "Missing property: source");

    let summary = completed(
        ValidationOrchestrator::new(&source, &target, &settings(false))
            .run()
            .await
            .unwrap(),
    );

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("errors.json");
    summary.report.write_json(&out).unwrap();

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(
        written,
        json!({"view": [{"error": "Missing property: source"}]})
    );
}
