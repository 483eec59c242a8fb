//! Source event paging
//!
//! One fetcher walks the source with exactly one strategy. Pages must be
//! requested in strict sequence: each request depends on the previous answer.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

use crate::config::{AuditSettings, PaginationMode};
use crate::models::{Event, TIMESTAMP_FIELD};
use crate::remote::{EventSearchQuery, SourceApi};

#[derive(Debug, Clone, PartialEq)]
pub enum PaginationState {
    /// Server-held scroll context
    Scroll {
        scroll_identifier: Option<String>,
        scroll_time_validity: String,
    },
    /// Client-held position, stopped once pages fall out of the retention window
    Offset {
        offset: u32,
        last_timestamp: Option<DateTime<Utc>>,
    },
}

impl PaginationState {
    pub fn initial(settings: &AuditSettings) -> Self {
        match settings.pagination {
            PaginationMode::Scroll => PaginationState::Scroll {
                scroll_identifier: None,
                scroll_time_validity: settings.scroll_time_validity.clone(),
            },
            PaginationMode::Offset => PaginationState::Offset {
                offset: 0,
                last_timestamp: None,
            },
        }
    }
}

/// `timeStamp` as RFC 3339 text or epoch milliseconds
pub fn event_timestamp(event: &Event) -> Option<DateTime<Utc>> {
    match event.get(TIMESTAMP_FIELD)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// An event exactly `window` old is still retained
pub fn within_retention(
    timestamp: DateTime<Utc>,
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> bool {
    now - timestamp <= window
}

pub struct EventFetcher<'a> {
    source: &'a dyn SourceApi,
    batch_size: u32,
    limit_of_days: u32,
    retention_window: chrono::Duration,
    state: PaginationState,
    exhausted: bool,
    pages: u64,
    out_of_window: u64,
}

impl<'a> EventFetcher<'a> {
    pub fn new(source: &'a dyn SourceApi, settings: &AuditSettings) -> Self {
        Self {
            source,
            batch_size: settings.batch_size,
            limit_of_days: settings.limit_of_days,
            retention_window: settings.retention_window(),
            state: PaginationState::initial(settings),
            exhausted: false,
            pages: 0,
            out_of_window: 0,
        }
    }

    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages
    }

    /// Events the source returned but that were older than the retention window
    pub fn events_out_of_window(&self) -> u64 {
        self.out_of_window
    }

    /// Next page of raw events; empty once the source is exhausted
    pub async fn next_page(&mut self) -> Result<Vec<Event>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let query = match &self.state {
            PaginationState::Scroll {
                scroll_identifier,
                scroll_time_validity,
            } => EventSearchQuery::scroll(
                self.batch_size,
                scroll_identifier.clone(),
                scroll_time_validity,
                self.limit_of_days,
            ),
            PaginationState::Offset { offset, .. } => {
                EventSearchQuery::offset(self.batch_size, *offset)
            }
        };

        let response = self.source.search_events(&query).await?;
        self.pages += 1;
        let mut events = response.list;

        if events.is_empty() {
            debug!(page = self.pages, "source returned an empty page");
            self.exhausted = true;
            return Ok(events);
        }

        let window = self.retention_window;
        match &mut self.state {
            PaginationState::Scroll {
                scroll_identifier, ..
            } => match response.scroll_identifier {
                Some(next) => *scroll_identifier = Some(next),
                None => {
                    debug!(page = self.pages, "scroll closed by source");
                    self.exhausted = true;
                }
            },
            PaginationState::Offset {
                offset,
                last_timestamp,
            } => {
                let returned = u32::try_from(events.len()).unwrap_or(u32::MAX);
                *offset = offset.saturating_add(returned);
                *last_timestamp = events.last().and_then(event_timestamp);

                let now = Utc::now();
                if let Some(oldest) = *last_timestamp {
                    if !within_retention(oldest, now, window) {
                        debug!(page = self.pages, %oldest, "retention window reached");
                        self.exhausted = true;
                    }
                }
                let fetched = events.len();
                events.retain(|e| {
                    event_timestamp(e).map_or(true, |ts| within_retention(ts, now, window))
                });
                let dropped = (fetched - events.len()) as u64;
                if dropped > 0 {
                    self.out_of_window += dropped;
                    debug!(
                        page = self.pages,
                        dropped,
                        total_dropped = self.out_of_window,
                        "events outside retention window skipped"
                    );
                }
            }
        }

        Ok(events)
    }
}
