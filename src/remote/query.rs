//! Event search query body for `POST /events/search`

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::models::{EVENT_TYPE_FIELD, EXCLUDED_EVENT_TYPES, TIMESTAMP_FIELD};

pub const NEWEST_FIRST: &str = "timeStamp:desc";

/// Condition tree understood by the source's query engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub parameter_values: Map<String, Value>,
}

impl Condition {
    fn new(condition_type: &str, parameter_values: Value) -> Self {
        let parameter_values = match parameter_values {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            condition_type: condition_type.to_string(),
            parameter_values,
        }
    }

    pub fn and(sub_conditions: Vec<Condition>) -> Self {
        Self::new(
            "booleanCondition",
            json!({ "operator": "and", "subConditions": sub_conditions }),
        )
    }

    pub fn property_not_in(property: &str, values: &[&str]) -> Self {
        Self::new(
            "eventPropertyCondition",
            json!({
                "comparisonOperator": "notIn",
                "propertyName": property,
                "propertyValues": values,
            }),
        )
    }

    /// `timeStamp > now-<days>d`, evaluated by the source
    pub fn newer_than_days(days: u32) -> Self {
        Self::new(
            "eventPropertyCondition",
            json!({
                "comparisonOperator": "greaterThan",
                "propertyName": TIMESTAMP_FIELD,
                "propertyValueDateExpr": format!("now-{}d", days),
            }),
        )
    }

    pub fn excluded_event_types() -> Self {
        Self::property_not_in(EVENT_TYPE_FIELD, &EXCLUDED_EVENT_TYPES)
    }
}

/// Paging part of the query; exactly one flavour per request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Paging {
    #[serde(rename_all = "camelCase")]
    Scroll {
        /// `null` on the first request
        scroll_identifier: Option<String>,
        scroll_time_validity: String,
    },
    Offset { offset: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSearchQuery {
    pub sortby: String,
    pub limit: u32,
    #[serde(flatten)]
    pub paging: Paging,
    pub condition: Condition,
}

impl EventSearchQuery {
    pub fn scroll(
        limit: u32,
        scroll_identifier: Option<String>,
        scroll_time_validity: &str,
        limit_of_days: u32,
    ) -> Self {
        Self {
            sortby: NEWEST_FIRST.to_string(),
            limit,
            paging: Paging::Scroll {
                scroll_identifier,
                scroll_time_validity: scroll_time_validity.to_string(),
            },
            condition: Condition::and(vec![
                Condition::excluded_event_types(),
                Condition::newer_than_days(limit_of_days),
            ]),
        }
    }

    pub fn offset(limit: u32, offset: u32) -> Self {
        Self {
            sortby: NEWEST_FIRST.to_string(),
            limit,
            paging: Paging::Offset { offset },
            condition: Condition::and(vec![Condition::excluded_event_types()]),
        }
    }
}
