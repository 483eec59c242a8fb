//! Data Models
//!
//! Events are kept as raw JSON: the audit only reshapes a handful of known
//! fields and must forward everything else untouched.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Opaque event record as returned by the source
pub type Event = Value;

pub const EVENT_TYPE_FIELD: &str = "eventType";
pub const TIMESTAMP_FIELD: &str = "timeStamp";

/// Event types never submitted for validation
pub const EXCLUDED_EVENT_TYPES: [&str; 3] = ["sessionCreated", "goal", "sessionReassigned"];

/// One validation failure reported by the target
///
/// Identity is structural: the message plus any extra fields the target sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub error: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ValidationError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Map::new(),
        }
    }

    // serde_json's Map is key-ordered, so this rendering is canonical
    fn details_key(&self) -> String {
        if self.details.is_empty() {
            String::new()
        } else {
            Value::Object(self.details.clone()).to_string()
        }
    }
}

impl PartialEq for ValidationError {
    fn eq(&self, other: &Self) -> bool {
        self.error == other.error && self.details == other.details
    }
}

impl Eq for ValidationError {}

impl Hash for ValidationError {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.error.hash(state);
        self.details_key().hash(state);
    }
}

impl PartialOrd for ValidationError {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ValidationError {
    fn cmp(&self, other: &Self) -> Ordering {
        self.error
            .cmp(&other.error)
            .then_with(|| self.details_key().cmp(&other.details_key()))
    }
}

/// `POST /jsonSchema/validateEvents` response, event types in the order sent
pub type ValidationResponse = IndexMap<String, Vec<ValidationError>>;

/// `POST /events/search` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSearchResponse {
    pub list: Vec<Event>,
    #[serde(default)]
    pub scroll_identifier: Option<String>,
    #[serde(default)]
    pub total_size: Option<i64>,
}

/// Item of the `GET /scopes` listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeItem {
    pub item_id: String,
    pub item_type: String,
}

impl ScopeItem {
    pub const ITEM_TYPE: &'static str = "scope";

    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            item_type: Self::ITEM_TYPE.to_string(),
        }
    }
}
