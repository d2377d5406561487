//! Session timeline derivation
//!
//! Builds the ordered page-view timeline from a sorted event stream, along with
//! the session bounds every detector measures against. A page interval runs
//! from its page view to the next page view, or to the session end for the
//! last page.

use crate::types::{Event, EventKind, PageView};
use chrono::{DateTime, Utc};

/// One page view together with the time the visitor spent on it
#[derive(Debug, Clone, PartialEq)]
pub struct PageInterval<'a> {
    /// Position in the page-view timeline
    pub index: usize,
    pub url: Option<&'a str>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PageInterval<'_> {
    /// Time on page in milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }

    /// Inclusive containment on both ends
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// URL, or `(unknown)` for display
    pub fn display_url(&self) -> &str {
        self.url.unwrap_or("(unknown)")
    }
}

/// Sorted events plus derived page views and session bounds
#[derive(Debug, Clone)]
pub struct SessionTimeline {
    events: Vec<Event>,
    page_views: Vec<PageView>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl SessionTimeline {
    /// Build a timeline from events already sorted by timestamp
    pub fn new(events: Vec<Event>) -> Self {
        let page_views = extract_page_views(&events);
        let start = events.first().map(|e| e.timestamp);
        let end = events.last().map(|e| e.timestamp);

        Self {
            events,
            page_views,
            start,
            end,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn page_views(&self) -> &[PageView] {
        &self.page_views
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// First event timestamp
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// Last event timestamp
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// `end - start` in milliseconds, 0 without events
    pub fn duration_ms(&self) -> i64 {
        match (self.start, self.end) {
            (Some(start), Some(end)) => (end - start).num_milliseconds(),
            _ => 0,
        }
    }

    /// Duration rounded to whole seconds (half up)
    pub fn duration_secs(&self) -> i64 {
        (self.duration_ms() + 500).div_euclid(1000)
    }

    /// Events of one kind, in order
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Number of events of one kind
    pub fn count_of(&self, kind: EventKind) -> usize {
        self.events_of(kind).count()
    }

    /// Page intervals in timeline order
    pub fn page_intervals(&self) -> Vec<PageInterval<'_>> {
        let Some(session_end) = self.end else {
            return Vec::new();
        };

        self.page_views
            .iter()
            .enumerate()
            .map(|(index, view)| {
                let end = self
                    .page_views
                    .get(index + 1)
                    .map(|next| next.timestamp)
                    .unwrap_or(session_end);
                PageInterval {
                    index,
                    url: view.url.as_deref(),
                    start: view.timestamp,
                    end,
                }
            })
            .collect()
    }

    /// The final page interval
    pub fn last_interval(&self) -> Option<PageInterval<'_>> {
        self.page_intervals().pop()
    }

    /// Events falling inside a page interval (inclusive bounds)
    pub fn events_during(&self, interval: &PageInterval<'_>) -> impl Iterator<Item = &Event> + '_ {
        let (start, end) = (interval.start, interval.end);
        self.events
            .iter()
            .filter(move |e| e.timestamp >= start && e.timestamp <= end)
    }

    /// Deepest scroll reading inside a page interval, 0 without readings
    pub fn max_scroll_depth(&self, interval: &PageInterval<'_>) -> f64 {
        self.events_during(interval)
            .filter(|e| e.kind == EventKind::Scroll)
            .map(|e| e.scroll_depth.unwrap_or(0.0))
            .fold(0.0, f64::max)
    }

    /// URLs of all page views, skipping views without one
    pub fn page_urls(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.page_views.iter().filter_map(|p| p.url.as_deref())
    }
}

/// Collect one page view per page-view event, in order
fn extract_page_views(events: &[Event]) -> Vec<PageView> {
    events
        .iter()
        .filter(|e| e.kind == EventKind::PageView)
        .map(|e| PageView {
            url: e.url.clone(),
            timestamp: e.timestamp,
        })
        .collect()
}
