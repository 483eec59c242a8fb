//! Event normalization
//!
//! Reshapes source events into the layout the target schemas expect. Only
//! `login`, `view` and `form` events are touched; every nested lookup
//! short-circuits, so missing or null fields leave the event as it was.

use serde_json::{Map, Value};

use crate::models::{Event, EVENT_TYPE_FIELD};

/// The only scope the target accepts on login events
pub const SYSTEM_SCOPE: &str = "systemsite";

const SCOPE: &str = "scope";
const FLATTENED_PROPERTIES: &str = "flattenedProperties";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Login,
    View,
    Form,
    Other,
}

impl EventKind {
    fn of(event: &Event) -> Self {
        match event.get(EVENT_TYPE_FIELD).and_then(Value::as_str) {
            Some("login") => EventKind::Login,
            Some("view") => EventKind::View,
            Some("form") => EventKind::Form,
            _ => EventKind::Other,
        }
    }
}

pub fn map_event(mut event: Event) -> Event {
    match EventKind::of(&event) {
        EventKind::Login => map_login(&mut event),
        EventKind::View => map_view(&mut event),
        EventKind::Form => map_form(&mut event),
        EventKind::Other => {}
    }
    event
}

pub fn map_events(events: Vec<Event>) -> Vec<Event> {
    events.into_iter().map(map_event).collect()
}

/// Source data uses loose truthiness: `""`, `0`, `false` and `null` count as absent
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(true, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Set `flattenedProperties.<key>`, replacing a non-object container
fn insert_flattened(event: &mut Map<String, Value>, key: &str, value: Value) {
    if let Some(Value::Object(flattened)) = event.get_mut(FLATTENED_PROPERTIES) {
        flattened.insert(key.to_string(), value);
        return;
    }
    let mut flattened = Map::new();
    flattened.insert(key.to_string(), value);
    event.insert(FLATTENED_PROPERTIES.to_string(), Value::Object(flattened));
}

fn map_login(event: &mut Event) {
    let Some(obj) = event.as_object_mut() else {
        return;
    };
    if !is_present(obj.get(SCOPE)) {
        return;
    }

    obj.insert(SCOPE.to_string(), Value::from(SYSTEM_SCOPE));
    for nested in ["source", "target"] {
        if let Some(Value::Object(item)) = obj.get_mut(nested) {
            item.insert(SCOPE.to_string(), Value::from(SYSTEM_SCOPE));
        }
    }
}

fn take_target_property(event: &mut Event, pointer: &str, key: &str) -> Option<Value> {
    let parent = event.pointer_mut(pointer)?.as_object_mut()?;
    if !is_present(parent.get(key)) {
        return None;
    }
    parent.remove(key)
}

fn map_view(event: &mut Event) {
    if !event.is_object() {
        return;
    }

    let interests = take_target_property(event, "/target/properties", "interests");
    let url_parameters = take_target_property(event, "/target/properties/pageInfo", "parameters");

    let Some(obj) = event.as_object_mut() else {
        return;
    };
    if let Some(interests) = interests {
        insert_flattened(obj, "interests", interests);
    }
    if let Some(parameters) = url_parameters {
        insert_flattened(obj, "URLParameters", parameters);
    }
}

fn map_form(event: &mut Event) {
    let Some(obj) = event.as_object_mut() else {
        return;
    };
    if !is_present(obj.get("properties")) {
        return;
    }

    let fields = obj.insert("properties".to_string(), Value::Object(Map::new()));
    if let Some(fields) = fields {
        insert_flattened(obj, "fields", fields);
    }
}
