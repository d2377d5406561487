//! Behavioral pattern detectors
//!
//! Each detector is a pure function of the session timeline and the pattern
//! tables: it reads the sorted events and page views and returns candidate
//! insights. Detectors never see each other's output; the pipeline
//! concatenates their candidates in a fixed order.
//!
//! Pipeline order: frustration → confusion → hesitation → exit intent →
//! form abandonment → dead end → speed browsing → deep engagement

mod confusion;
mod dead_end;
mod engagement;
mod exit_intent;
mod form_abandonment;
mod frustration;
mod hesitation;
mod speed_browsing;

pub use confusion::ConfusionDetector;
pub use dead_end::DeadEndDetector;
pub use engagement::DeepEngagementDetector;
pub use exit_intent::{ExitIntentDetector, ExitRule};
pub use form_abandonment::FormAbandonmentDetector;
pub use frustration::FrustrationDetector;
pub use hesitation::HesitationDetector;
pub use speed_browsing::SpeedBrowsingDetector;

use crate::error::AnalysisError;
use crate::patterns::Patterns;
use crate::timeline::SessionTimeline;
use crate::types::{Event, EventKind, Insight, PageView};
use chrono::{DateTime, Utc};

/// Read-only inputs shared by every detector
#[derive(Debug, Clone, Copy)]
pub struct DetectorContext<'a> {
    pub timeline: &'a SessionTimeline,
    pub patterns: &'a Patterns,
}

impl<'a> DetectorContext<'a> {
    pub fn new(timeline: &'a SessionTimeline, patterns: &'a Patterns) -> Self {
        Self { timeline, patterns }
    }

    /// Timestamp of the last event
    pub fn session_end(&self) -> Result<DateTime<Utc>, AnalysisError> {
        self.timeline.end().ok_or_else(|| {
            AnalysisError::InsufficientEvents("session has no timestamped events".to_string())
        })
    }

    /// Add-to-cart style action: a matching selector or event name, or a
    /// custom event whose name mentions the cart
    pub fn is_cart_action(&self, event: &Event) -> bool {
        let text = format!("{} {}", event.element_str(), event.name_str());
        self.patterns.cart_action.is_match(&text)
            || (event.kind == EventKind::Custom && self.patterns.cart_event.is_match(event.name_str()))
    }

    /// Whether any cart action happened anywhere in the session
    pub fn has_cart_action(&self) -> bool {
        self.timeline.events().iter().any(|e| self.is_cart_action(e))
    }

    /// Page views on product detail pages, in order
    pub fn product_views(&self) -> Vec<&'a PageView> {
        self.timeline
            .page_views()
            .iter()
            .filter(|p| {
                p.url
                    .as_deref()
                    .is_some_and(|url| self.patterns.is_product_page(url))
            })
            .collect()
    }
}

/// A behavioral pattern detector
pub trait PatternDetector: Send + Sync {
    /// Stable detector name, used in logs
    fn name(&self) -> &'static str;

    /// Produce candidate insights for one session
    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError>;
}

/// All detectors in pipeline order
pub fn default_detectors() -> Vec<Box<dyn PatternDetector>> {
    vec![
        Box::new(FrustrationDetector),
        Box::new(ConfusionDetector),
        Box::new(HesitationDetector),
        Box::new(ExitIntentDetector::default()),
        Box::new(FormAbandonmentDetector),
        Box::new(DeadEndDetector),
        Box::new(SpeedBrowsingDetector),
        Box::new(DeepEngagementDetector),
    ]
}

/// First A→B→A→B window in the page-view sequence, with A ≠ B and both
/// URLs known. Returns the window's start index and the two URLs.
pub(crate) fn find_back_and_forth(page_views: &[PageView]) -> Option<(usize, &str, &str)> {
    page_views.windows(4).enumerate().find_map(|(i, w)| {
        let a = w[0].url.as_deref()?;
        let b = w[1].url.as_deref()?;
        let c = w[2].url.as_deref()?;
        let d = w[3].url.as_deref()?;
        (a == c && b == d && a != b).then_some((i, a, b))
    })
}

/// Milliseconds to whole seconds, rounded half up
pub(crate) fn round_secs(ms: i64) -> i64 {
    (ms as f64 / 1000.0).round() as i64
}

/// Render a reading without a trailing `.0` for whole numbers
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers shared by the detector tests

    use crate::patterns::Patterns;
    use crate::timeline::SessionTimeline;
    use crate::types::{Event, EventKind};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    pub fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    pub fn at(secs: i64) -> DateTime<Utc> {
        at_ms(secs * 1000)
    }

    pub fn page(secs: i64, url: &str) -> Event {
        Event::new(EventKind::PageView, at(secs)).with_url(url)
    }

    pub fn event(kind: EventKind, secs: i64) -> Event {
        Event::new(kind, at(secs))
    }

    pub fn timeline(mut events: Vec<Event>) -> SessionTimeline {
        crate::normalizer::sort_events(&mut events);
        SessionTimeline::new(events)
    }

    pub fn patterns() -> &'static Patterns {
        Patterns::builtin()
    }
}
