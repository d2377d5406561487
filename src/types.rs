//! Session analysis data types
//!
//! This module defines the canonical events that flow through the analysis
//! pipeline and the insights, scores and results it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Summary returned when a session has no usable events
pub const NO_EVENTS_SUMMARY: &str = "No events recorded for this session.";

/// Interaction event kinds captured by the session recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PageView,
    Click,
    MouseMove,
    DomMutation,
    Scroll,
    Resize,
    Input,
    FormSubmit,
    RageClick,
    DeadClick,
    JsError,
    Custom,
    /// Input focus reported as a standalone event
    Focus,
    /// Unrecognized kind; still part of the timeline
    Other,
}

impl EventKind {
    /// Map the recorder's numeric event code.
    ///
    /// ```text
    ///   1 = page view        5 = scroll           9  = rage click
    ///   2 = click            6 = resize          10  = dead click
    ///   3 = mouse move       7 = input           11  = JS error
    ///   4 = DOM mutation     8 = form submit     12  = custom event
    /// ```
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => EventKind::PageView,
            2 => EventKind::Click,
            3 => EventKind::MouseMove,
            4 => EventKind::DomMutation,
            5 => EventKind::Scroll,
            6 => EventKind::Resize,
            7 => EventKind::Input,
            8 => EventKind::FormSubmit,
            9 => EventKind::RageClick,
            10 => EventKind::DeadClick,
            11 => EventKind::JsError,
            12 => EventKind::Custom,
            _ => EventKind::Other,
        }
    }

    /// Map a string event name, accepting the aliases used by older trackers
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if let Ok(code) = name.parse::<i64>() {
            return Self::from_code(code);
        }
        match name.to_ascii_lowercase().as_str() {
            "page_view" | "pageview" => EventKind::PageView,
            "click" => EventKind::Click,
            "mouse_move" | "mousemove" => EventKind::MouseMove,
            "dom_mutation" | "mutation" => EventKind::DomMutation,
            "scroll" => EventKind::Scroll,
            "resize" => EventKind::Resize,
            "input" => EventKind::Input,
            "focus" => EventKind::Focus,
            "form_submit" | "submit" => EventKind::FormSubmit,
            "rage_click" => EventKind::RageClick,
            "dead_click" => EventKind::DeadClick,
            "js_error" | "error" => EventKind::JsError,
            "custom" => EventKind::Custom,
            _ => EventKind::Other,
        }
    }

    /// Any click-like kind, including the pre-classified rage and dead clicks
    pub fn is_click_like(&self) -> bool {
        matches!(
            self,
            EventKind::Click | EventKind::RageClick | EventKind::DeadClick
        )
    }
}

/// A canonical interaction event.
///
/// Produced by the normalizer from arbitrary recorder payloads; every optional
/// field has already been resolved through its synonym chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind
    pub kind: EventKind,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Page URL the event happened on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// CSS selector or element description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    /// Form field identifier (selector, element or field name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Typed value for input events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Scroll depth percentage (0-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_depth: Option<f64>,
    /// Error message for JS errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Script source for JS errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Script line for JS errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    /// Custom event name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Field action (`focus` / `blur`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl Event {
    /// Create a bare event of the given kind
    pub fn new(kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            timestamp,
            url: None,
            element: None,
            field: None,
            value: None,
            scroll_depth: None,
            message: None,
            source: None,
            line: None,
            name: None,
            action: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        let element = element.into();
        self.field = Some(element.clone());
        self.element = Some(element);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_scroll_depth(mut self, depth: f64) -> Self {
        self.scroll_depth = Some(depth);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Timestamp in epoch milliseconds
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Element selector, empty when unknown
    pub fn element_str(&self) -> &str {
        self.element.as_deref().unwrap_or("")
    }

    /// Custom event name, empty when unknown
    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// Session-level context supplied by the storage layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Session identifier
    #[serde(default, alias = "session_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Visitor country
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Session start as recorded by the ingestion layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Session duration in seconds as recorded by the ingestion layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Any other columns, carried through untouched
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl SessionMeta {
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A navigation to a URL, derived from a page view event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    /// Page URL, if the recorder captured one
    pub url: Option<String>,
    /// When the page was opened
    pub timestamp: DateTime<Utc>,
}

/// Behavioral pattern family an insight belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Frustration,
    Confusion,
    Hesitation,
    ExitIntent,
    FormAbandonment,
    DeadEnd,
    SpeedBrowsing,
    Engagement,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::Frustration => "frustration",
            InsightType::Confusion => "confusion",
            InsightType::Hesitation => "hesitation",
            InsightType::ExitIntent => "exit_intent",
            InsightType::FormAbandonment => "form_abandonment",
            InsightType::DeadEnd => "dead_end",
            InsightType::SpeedBrowsing => "speed_browsing",
            InsightType::Engagement => "engagement",
        }
    }
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insight severity. Variant order is ranking order: `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Sort rank, 0 = most severe
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Critical or high
    pub fn is_urgent(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected behavioral pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Pattern family
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// When the pattern started (or the session end, for exit patterns)
    pub timestamp: Option<DateTime<Utc>>,
    pub recommendation: String,
    /// Element the pattern is anchored to
    #[serde(default)]
    pub element: Option<String>,
    /// Page the pattern is anchored to
    #[serde(default)]
    pub page: Option<String>,
    /// Number of occurrences folded into this insight
    pub count: u32,
}

impl Insight {
    /// Start an insight; description, recommendation and anchors are filled in
    /// with the `with_*` setters.
    pub fn new(insight_type: InsightType, severity: Severity, title: impl Into<String>) -> Self {
        Self {
            insight_type,
            severity,
            title: title.into(),
            description: String::new(),
            timestamp: None,
            recommendation: String::new(),
            element: None,
            page: None,
            count: 1,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = recommendation.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Anchor to an element; empty selectors are dropped
    pub fn with_element(mut self, element: Option<&str>) -> Self {
        self.element = non_empty(element);
        self
    }

    /// Anchor to a page; empty URLs are dropped
    pub fn with_page(mut self, page: Option<&str>) -> Self {
        self.page = non_empty(page);
        self
    }

    /// Occurrence count; zero is stored as one, overflow saturates
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = u32::try_from(count.max(1)).unwrap_or(u32::MAX);
        self
    }

    /// Deduplication key: `(type, title, page)` with a missing page as ""
    pub fn dedup_key(&self) -> (InsightType, &str, &str) {
        (
            self.insight_type,
            self.title.as_str(),
            self.page.as_deref().unwrap_or(""),
        )
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Session quality scores, each in 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub engagement: u8,
    pub frustration: u8,
    pub conversion: u8,
}

/// Final output of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Deduplicated insights, most severe first
    pub insights: Vec<Insight>,
    pub score: Score,
    pub summary: String,
}

impl AnalysisResult {
    /// Result for a session without usable events
    pub fn empty() -> Self {
        Self {
            insights: Vec::new(),
            score: Score::default(),
            summary: NO_EVENTS_SUMMARY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_codes_and_names() {
        assert_eq!(EventKind::from_code(1), EventKind::PageView);
        assert_eq!(EventKind::from_code(9), EventKind::RageClick);
        assert_eq!(EventKind::from_code(42), EventKind::Other);

        assert_eq!(EventKind::from_name("pageview"), EventKind::PageView);
        assert_eq!(EventKind::from_name("submit"), EventKind::FormSubmit);
        assert_eq!(EventKind::from_name("11"), EventKind::JsError);
        assert_eq!(EventKind::from_name("Focus"), EventKind::Focus);
        assert_eq!(EventKind::from_name("hover"), EventKind::Other);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::Low < Severity::Info);
        assert_eq!(Severity::Critical.rank(), 0);
        assert_eq!(Severity::Info.rank(), 4);
        assert!(Severity::High.is_urgent());
        assert!(!Severity::Medium.is_urgent());
    }

    #[test]
    fn test_insight_serialization() {
        let insight = Insight::new(InsightType::ExitIntent, Severity::High, "Error-driven exit")
            .with_page(Some("/checkout"))
            .with_element(Some(""));

        let json = serde_json::to_value(&insight).unwrap();
        assert_eq!(json["type"], "exit_intent");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["page"], "/checkout");
        assert!(json["element"].is_null());
        assert_eq!(json["count"], 1);
    }

    #[test]
    fn test_insight_count_floor() {
        let insight =
            Insight::new(InsightType::FormAbandonment, Severity::Medium, "Form abandoned").with_count(0);
        assert_eq!(insight.count, 1);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_insight_count_saturates() {
        let insight = Insight::new(InsightType::Frustration, Severity::High, "Rage click detected")
            .with_count(u32::MAX as usize + 7);
        assert_eq!(insight.count, u32::MAX);
    }

    #[test]
    fn test_session_meta_deserialization() {
        let json = r#"{
            "session_id": "sess-1",
            "country": "CZ",
            "started_at": "2024-01-15T14:00:00Z",
            "browser": "Firefox"
        }"#;

        let meta: SessionMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.id.as_deref(), Some("sess-1"));
        assert_eq!(meta.country.as_deref(), Some("CZ"));
        assert_eq!(meta.extra["browser"], "Firefox");
    }

    #[test]
    fn test_empty_result() {
        let result = AnalysisResult::empty();
        assert!(result.insights.is_empty());
        assert_eq!(result.score, Score::default());
        assert_eq!(result.summary, NO_EVENTS_SUMMARY);
    }
}
