//! Page-level analysis
//!
//! Collects what visitors did on one URL across many sessions: time on page,
//! bounces, scroll reach, click targets, the pages around it and the
//! frustration signals raised while it was open.

use crate::normalizer::EventNormalizer;
use crate::overview::{percentage, ElementCount, OrderedCounter, PageCount, SessionInput};
use crate::timeline::SessionTimeline;
use crate::types::{Event, EventKind, PageView};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A view shorter than this counts as a bounce
const BOUNCE_MS: i64 = 10_000;

const TOP_CLICK_ELEMENTS: usize = 20;
const TOP_PAGES: usize = 10;
const MAX_FRUSTRATION_EVENTS: usize = 50;

/// Scroll readings on the page bucketed by depth percentage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollDepthDistribution {
    #[serde(rename = "0-25")]
    pub quarter: usize,
    #[serde(rename = "25-50")]
    pub half: usize,
    #[serde(rename = "50-75")]
    pub three_quarters: usize,
    #[serde(rename = "75-100")]
    pub full: usize,
}

impl ScrollDepthDistribution {
    fn add(&mut self, depth: f64) {
        let bucket = if depth < 25.0 {
            &mut self.quarter
        } else if depth < 50.0 {
            &mut self.half
        } else if depth < 75.0 {
            &mut self.three_quarters
        } else {
            &mut self.full
        };
        *bucket += 1;
    }
}

/// A rage click, dead click or JS error raised while the page was open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrustrationEvent {
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub element: Option<String>,
    pub message: Option<String>,
}

impl FrustrationEvent {
    fn from_event(session_id: &str, event: &Event) -> Option<Self> {
        matches!(
            event.kind,
            EventKind::RageClick | EventKind::DeadClick | EventKind::JsError
        )
        .then(|| Self {
            session_id: session_id.to_string(),
            kind: event.kind,
            timestamp: event.timestamp,
            element: event.element.clone(),
            message: event.message.clone(),
        })
    }
}

/// Behavior on one URL across a set of sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub page: String,
    pub views: usize,
    /// Mean time on page in whole seconds
    pub avg_time_on_page: i64,
    /// Views that were the session's only page view or lasted under 10s, in percent
    pub bounce_rate: u8,
    pub scroll_depth_distribution: ScrollDepthDistribution,
    pub click_hotspots: Vec<ElementCount>,
    pub common_next_pages: Vec<PageCount>,
    pub common_prev_pages: Vec<PageCount>,
    pub frustration_events: Vec<FrustrationEvent>,
}

impl PageAnalysis {
    /// Analyze every view of `page_url` in the given sessions
    pub fn from_sessions(page_url: &str, sessions: &[SessionInput]) -> Self {
        let mut views = 0usize;
        let mut total_time_ms = 0i64;
        let mut bounces = 0usize;
        let mut depths = ScrollDepthDistribution::default();
        let mut clicks = OrderedCounter::default();
        let mut next_pages = OrderedCounter::default();
        let mut prev_pages = OrderedCounter::default();
        let mut frustration_events = Vec::new();

        for session in sessions {
            let timeline = SessionTimeline::new(EventNormalizer::normalize(&session.events));
            let page_views = timeline.page_views();

            for interval in timeline
                .page_intervals()
                .iter()
                .filter(|interval| interval.url == Some(page_url))
            {
                views += 1;
                let time_on_page = interval.duration_ms();
                total_time_ms += time_on_page;
                if page_views.len() == 1 || time_on_page < BOUNCE_MS {
                    bounces += 1;
                }

                for event in timeline.events_during(interval) {
                    match event.kind {
                        EventKind::Scroll => {
                            if let Some(depth) = event.scroll_depth.filter(|d| *d > 0.0) {
                                depths.add(depth);
                            }
                        }
                        kind if kind.is_click_like() && !event.element_str().is_empty() => {
                            clicks.add(event.element_str());
                        }
                        _ => {}
                    }
                    if frustration_events.len() < MAX_FRUSTRATION_EVENTS {
                        frustration_events
                            .extend(FrustrationEvent::from_event(&session.session_id, event));
                    }
                }

                let prev = interval.index.checked_sub(1).and_then(|i| page_views.get(i));
                if let Some(url) = prev.and_then(known_url) {
                    prev_pages.add(url);
                }
                if let Some(url) = page_views.get(interval.index + 1).and_then(known_url) {
                    next_pages.add(url);
                }
            }
        }

        let avg_time_on_page = if views > 0 {
            (total_time_ms as f64 / views as f64 / 1000.0).round() as i64
        } else {
            0
        };

        Self {
            page: page_url.to_string(),
            views,
            avg_time_on_page,
            bounce_rate: percentage(bounces, views),
            scroll_depth_distribution: depths,
            click_hotspots: clicks
                .top(TOP_CLICK_ELEMENTS)
                .into_iter()
                .map(|(element, count)| ElementCount { element, count })
                .collect(),
            common_next_pages: to_page_counts(next_pages),
            common_prev_pages: to_page_counts(prev_pages),
            frustration_events,
        }
    }
}

fn known_url(view: &PageView) -> Option<&str> {
    view.url.as_deref().filter(|url| !url.is_empty())
}

fn to_page_counts(counter: OrderedCounter) -> Vec<PageCount> {
    counter
        .top(TOP_PAGES)
        .into_iter()
        .map(|(page, count)| PageCount { page, count })
        .collect()
}
