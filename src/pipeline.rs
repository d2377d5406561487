//! Pipeline orchestration
//!
//! This module provides the public API for Session Lens. It runs one recorded
//! session through the staged analysis:
//!
//! 1. EventNormalizer - canonical events, sorted, bad timestamps dropped
//! 2. SessionTimeline - page views and session bounds
//! 3. PatternDetectors - candidate insights, each detector isolated
//! 4. SessionScorer - scores over the timeline and the candidates
//! 5. InsightAggregator - dedupe and severity ordering
//! 6. SessionSummarizer - narrative over the final insights

use crate::aggregator::InsightAggregator;
use crate::detectors::{default_detectors, DetectorContext, PatternDetector};
use crate::error::AnalysisError;
use crate::normalizer::{sort_events, EventNormalizer};
use crate::overview::{InsightOverview, SessionAnalysis, SessionInput};
use crate::page::PageAnalysis;
use crate::patterns::{PatternConfig, Patterns};
use crate::scorer::SessionScorer;
use crate::summary::{SessionSummarizer, SummaryInput};
use crate::timeline::SessionTimeline;
use crate::trends::Trends;
use crate::types::{AnalysisResult, Event, EventKind, Insight, SessionMeta};
use chrono::NaiveDate;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};

/// Analyze one session from raw recorder records.
///
/// Never fails: records without a usable timestamp are skipped and a failing
/// detector contributes no insights.
///
/// # Example
/// ```ignore
/// let result = analyze(&events, &SessionMeta::default().with_country("CZ"));
/// println!("{}", result.summary);
/// ```
pub fn analyze(events: &[Value], meta: &SessionMeta) -> AnalysisResult {
    SessionAnalyzer::new().analyze(events, meta)
}

/// Analyze one session from already-normalized events (any order)
pub fn analyze_events(events: Vec<Event>, meta: &SessionMeta) -> AnalysisResult {
    SessionAnalyzer::new().analyze_events(events, meta)
}

/// Analyze a session given as JSON.
///
/// # Arguments
/// * `events_json` - JSON array of recorder records
/// * `meta_json` - Optional session metadata object
///
/// # Returns
/// The `AnalysisResult` serialized as JSON
pub fn analyze_json(events_json: &str, meta_json: Option<&str>) -> Result<String, AnalysisError> {
    let events = parse_events(events_json)?;
    let meta = match meta_json {
        Some(json) => parse_meta(json)?,
        None => SessionMeta::default(),
    };
    let result = analyze(&events, &meta);
    Ok(serde_json::to_string(&result)?)
}

/// Build a cross-session overview from a JSON array of
/// `{"session_id", "meta", "events"}` objects
pub fn overview_json(sessions_json: &str) -> Result<String, AnalysisError> {
    let sessions: Vec<SessionInput> = serde_json::from_str(sessions_json)?;
    let overview = SessionAnalyzer::new().overview(sessions);
    Ok(serde_json::to_string(&overview)?)
}

/// Analyze one URL across a JSON array of `{"session_id", "meta", "events"}`
/// objects
pub fn page_analysis_json(page_url: &str, sessions_json: &str) -> Result<String, AnalysisError> {
    let sessions: Vec<SessionInput> = serde_json::from_str(sessions_json)?;
    let analysis = SessionAnalyzer::new().page_analysis(page_url, &sessions);
    Ok(serde_json::to_string(&analysis)?)
}

/// Daily trends over the `days` ending on `today`, from a JSON array of
/// session objects
pub fn trends_json(sessions_json: &str, days: u32, today: NaiveDate) -> Result<String, AnalysisError> {
    let sessions: Vec<SessionInput> = serde_json::from_str(sessions_json)?;
    let trends = SessionAnalyzer::new().trends(sessions, days, today);
    Ok(serde_json::to_string(&trends)?)
}

/// Parse a `YYYY-MM-DD` calendar day
pub fn parse_day(day: &str) -> Result<NaiveDate, AnalysisError> {
    NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d")
        .map_err(|e| AnalysisError::ParseError(format!("invalid day '{}': {}", day, e)))
}

/// Parse a JSON array of raw recorder records
pub fn parse_events(json: &str) -> Result<Vec<Value>, AnalysisError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Array(records) => Ok(records),
        other => Err(AnalysisError::ParseError(format!(
            "expected an array of events, got {}",
            json_kind(&other)
        ))),
    }
}

/// Parse session metadata; `null` yields the empty metadata
pub fn parse_meta(json: &str) -> Result<SessionMeta, AnalysisError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Null => Ok(SessionMeta::default()),
        value @ Value::Object(_) => Ok(serde_json::from_value(value)?),
        other => Err(AnalysisError::ParseError(format!(
            "expected a metadata object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Reusable analyzer holding a compiled pattern set and the detector list.
///
/// Holds no per-session state: one instance can analyze any number of
/// sessions, and separate instances can run on separate threads.
pub struct SessionAnalyzer {
    patterns: Option<Patterns>,
    detectors: Vec<Box<dyn PatternDetector>>,
}

impl Default for SessionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAnalyzer {
    /// Analyzer with the built-in pattern tables and all detectors
    pub fn new() -> Self {
        Self {
            patterns: None,
            detectors: default_detectors(),
        }
    }

    /// Use a custom compiled pattern set
    pub fn with_patterns(mut self, patterns: Patterns) -> Self {
        self.patterns = Some(patterns);
        self
    }

    /// Compile a pattern configuration and use it
    pub fn from_config(config: &PatternConfig) -> Result<Self, AnalysisError> {
        Ok(Self::new().with_patterns(Patterns::compile(config)?))
    }

    /// Replace the detector list
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn PatternDetector>>) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn patterns(&self) -> &Patterns {
        self.patterns.as_ref().unwrap_or_else(|| Patterns::builtin())
    }

    /// Analyze raw recorder records
    pub fn analyze(&self, records: &[Value], meta: &SessionMeta) -> AnalysisResult {
        let events = EventNormalizer::normalize(records);
        self.analyze_sorted(events, meta)
    }

    /// Analyze canonical events in any order
    pub fn analyze_events(&self, mut events: Vec<Event>, meta: &SessionMeta) -> AnalysisResult {
        sort_events(&mut events);
        self.analyze_sorted(events, meta)
    }

    /// Analyze one session and keep what a cross-session overview needs
    pub fn analyze_session(
        &self,
        session_id: impl Into<String>,
        records: &[Value],
        meta: SessionMeta,
    ) -> SessionAnalysis {
        let events = EventNormalizer::normalize(records);
        let had_input = events.iter().any(|e| e.kind == EventKind::Input);
        let errors = events.iter().filter(|e| e.kind == EventKind::JsError).count();
        let result = self.analyze_sorted(events, &meta);

        SessionAnalysis {
            session_id: session_id.into(),
            meta,
            had_input,
            errors,
            result,
        }
    }

    fn analyze_all(&self, sessions: Vec<SessionInput>) -> Vec<SessionAnalysis> {
        sessions
            .into_iter()
            .map(|s| self.analyze_session(s.session_id, &s.events, s.meta))
            .collect()
    }

    /// Analyze a batch of sessions and roll them up
    pub fn overview(&self, sessions: Vec<SessionInput>) -> InsightOverview {
        let analyses = self.analyze_all(sessions);
        tracing::info!(sessions = analyses.len(), "Building insight overview");
        InsightOverview::from_sessions(&analyses)
    }

    /// Behavior on one URL across sessions; needs no detector run
    pub fn page_analysis(&self, page_url: &str, sessions: &[SessionInput]) -> PageAnalysis {
        tracing::info!(page = page_url, sessions = sessions.len(), "Building page analysis");
        PageAnalysis::from_sessions(page_url, sessions)
    }

    /// Analyze a batch of sessions and bucket them by start day
    pub fn trends(&self, sessions: Vec<SessionInput>, days: u32, today: NaiveDate) -> Trends {
        let analyses = self.analyze_all(sessions);
        tracing::info!(sessions = analyses.len(), days, %today, "Building trends");
        Trends::from_sessions(&analyses, days, today)
    }

    fn analyze_sorted(&self, events: Vec<Event>, meta: &SessionMeta) -> AnalysisResult {
        let span = tracing::info_span!(
            "analyze_session",
            session_id = meta.id.as_deref().unwrap_or(""),
            events = events.len()
        );
        let _guard = span.enter();

        if events.is_empty() {
            tracing::debug!("No usable events; returning empty result");
            return AnalysisResult::empty();
        }

        let timeline = SessionTimeline::new(events);
        let patterns = self.patterns();
        tracing::debug!(
            page_views = timeline.page_views().len(),
            duration_ms = timeline.duration_ms(),
            "Built session timeline"
        );

        // Stage 3: detect
        let ctx = DetectorContext::new(&timeline, patterns);
        let candidates = self.run_detectors(&ctx);

        // Stage 4: score, reading the candidates before deduplication
        let score = SessionScorer::score(&timeline, patterns, &candidates);

        // Stage 5: aggregate
        let insights = InsightAggregator::aggregate(candidates);

        // Stage 6: summarize
        let summary = SessionSummarizer::summarize(&SummaryInput {
            timeline: &timeline,
            meta,
            insights: &insights,
            score,
            patterns,
        });

        tracing::debug!(
            insights = insights.len(),
            engagement = score.engagement,
            frustration = score.frustration,
            conversion = score.conversion,
            "Session analyzed"
        );

        AnalysisResult {
            insights,
            score,
            summary,
        }
    }

    /// Run every detector in order, concatenating their candidates
    fn run_detectors(&self, ctx: &DetectorContext<'_>) -> Vec<Insight> {
        let mut candidates = Vec::new();

        for detector in &self.detectors {
            match run_isolated(detector.as_ref(), ctx) {
                Ok(found) => {
                    tracing::debug!(
                        detector = detector.name(),
                        candidates = found.len(),
                        "Detector finished"
                    );
                    candidates.extend(found);
                }
                Err(e) => {
                    tracing::warn!(
                        detector = detector.name(),
                        error = %e,
                        "Detector failed; skipping its insights"
                    );
                }
            }
        }

        candidates
    }
}

/// Run one detector, turning a panic into `DetectorFailed`
fn run_isolated(
    detector: &dyn PatternDetector,
    ctx: &DetectorContext<'_>,
) -> Result<Vec<Insight>, AnalysisError> {
    panic::catch_unwind(AssertUnwindSafe(|| detector.detect(ctx))).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        Err(AnalysisError::DetectorFailed {
            detector: detector.name().to_string(),
            reason,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::FrustrationDetector;
    use crate::types::{InsightType, NO_EVENTS_SUMMARY};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct FailingDetector;

    impl PatternDetector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&self, _ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
            Err(AnalysisError::InsufficientEvents("always".to_string()))
        }
    }

    struct PanickingDetector;

    impl PatternDetector for PanickingDetector {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn detect(&self, _ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
            panic!("detector bug")
        }
    }

    fn rage_session() -> Vec<Value> {
        let mut events = vec![json!({
            "event_type": 1,
            "timestamp": "2024-01-15T14:00:00Z",
            "data": {"url": "/cart"}
        })];
        for ms in [100, 200, 300, 400, 500] {
            events.push(json!({
                "event_type": 9,
                "timestamp": 1_705_327_200_000i64 + ms,
                "data": {"url": "/cart", "selector": "button.buy"}
            }));
        }
        events
    }

    #[test]
    fn test_empty_input() {
        let result = analyze(&[], &SessionMeta::default());
        assert_eq!(result, AnalysisResult::empty());
        assert_eq!(result.summary, NO_EVENTS_SUMMARY);
    }

    #[test]
    fn test_only_bad_timestamps_is_empty() {
        let events = vec![json!({"event_type": 2, "timestamp": "yesterday"})];
        assert_eq!(analyze(&events, &SessionMeta::default()), AnalysisResult::empty());
    }

    #[test]
    fn test_failing_detectors_are_isolated() {
        let analyzer = SessionAnalyzer::new().with_detectors(vec![
            Box::new(FailingDetector),
            Box::new(PanickingDetector),
            Box::new(FrustrationDetector),
        ]);

        let result = analyzer.analyze(&rage_session(), &SessionMeta::default());
        assert_eq!(result.insights.len(), 1);
        assert_eq!(result.insights[0].insight_type, InsightType::Frustration);
        assert_eq!(result.insights[0].count, 5);
    }

    #[test]
    fn test_run_isolated_reports_panic_reason() {
        let timeline = SessionTimeline::new(Vec::new());
        let ctx = DetectorContext::new(&timeline, Patterns::builtin());
        let err = run_isolated(&PanickingDetector, &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Detector 'panicking' failed: detector bug"
        );
    }

    #[test]
    fn test_analyze_json_roundtrip_shape() {
        let events = serde_json::to_string(&rage_session()).unwrap();
        let out = analyze_json(&events, Some(r#"{"country": "CZ"}"#)).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();

        assert!(value["insights"].is_array());
        assert_eq!(value["insights"][0]["type"], "frustration");
        assert_eq!(value["insights"][0]["severity"], "critical");
        assert!(value["summary"]
            .as_str()
            .unwrap()
            .starts_with("This visitor from CZ"));
    }

    #[test]
    fn test_analyze_json_rejects_non_array() {
        let err = analyze_json(r#"{"events": []}"#, None).unwrap_err();
        assert!(matches!(err, AnalysisError::ParseError(_)));

        let err = analyze_json("[", None).unwrap_err();
        assert!(matches!(err, AnalysisError::JsonError(_)));
    }

    #[test]
    fn test_overview_json() {
        let sessions = json!([
            {"session_id": "a", "meta": {"country": "CZ"}, "events": rage_session()},
            {"session_id": "b", "events": []}
        ]);
        let out = overview_json(&sessions.to_string()).unwrap();
        let overview: InsightOverview = serde_json::from_str(&out).unwrap();

        assert_eq!(overview.total_sessions, 2);
        assert_eq!(overview.frustration_hotspots[0].page, "/cart");
        assert_eq!(overview.sessions_needing_attention[0].session_id, "a");
    }

    #[test]
    fn test_parse_meta_null() {
        assert_eq!(parse_meta("null").unwrap(), SessionMeta::default());
        assert!(parse_meta("[]").is_err());
    }

    #[test]
    fn test_custom_patterns() {
        let mut config = PatternConfig::default();
        config.conversion_page = vec![crate::patterns::PatternRule::new("signup", "signup")];
        let analyzer = SessionAnalyzer::from_config(&config).unwrap();

        let events = vec![
            json!({"event_type": "page_view", "timestamp": 0, "url": "/"}),
            json!({"event_type": "page_view", "timestamp": 20_000, "url": "/signup"}),
            json!({"event_type": "scroll", "timestamp": 40_000, "scrollDepth": 10}),
        ];
        let result = analyzer.analyze(&events, &SessionMeta::default());
        assert!(result
            .insights
            .iter()
            .any(|i| i.title == "Abandoned at /signup"));
    }

    #[test]
    fn test_analyze_session_tracks_form_input() {
        let events = vec![
            json!({"event_type": 1, "timestamp": 0, "url": "/contact"}),
            json!({"event_type": 7, "timestamp": 1_000, "selector": "#email", "value": "a"}),
        ];
        let analysis =
            SessionAnalyzer::new().analyze_session("s-1", &events, SessionMeta::default());
        assert_eq!(analysis.session_id, "s-1");
        assert!(analysis.had_input);
        assert!(analysis
            .result
            .insights
            .iter()
            .any(|i| i.insight_type == InsightType::FormAbandonment));
    }

    #[test]
    fn test_analyze_session_counts_errors() {
        let events = vec![
            json!({"event_type": 1, "timestamp": 0, "url": "/"}),
            json!({"event_type": 11, "timestamp": 1_000, "message": "a"}),
            json!({"event_type": "js_error", "timestamp": 2_000, "message": "b"}),
        ];
        let analysis =
            SessionAnalyzer::new().analyze_session("s-2", &events, SessionMeta::default());
        assert_eq!(analysis.errors, 2);
        assert!(!analysis.had_input);
    }

    #[test]
    fn test_page_analysis_json() {
        let sessions = json!([{"session_id": "a", "events": rage_session()}]);
        let out = page_analysis_json("/cart", &sessions.to_string()).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["views"], 1);
        assert_eq!(value["bounce_rate"], 100);
        assert_eq!(value["click_hotspots"][0]["element"], "button.buy");
        assert_eq!(value["click_hotspots"][0]["count"], 5);
        assert_eq!(value["frustration_events"].as_array().unwrap().len(), 5);
        assert_eq!(value["frustration_events"][0]["type"], "rage_click");
    }

    #[test]
    fn test_trends_json() {
        let sessions = json!([
            {"session_id": "a", "meta": {"started_at": "2024-01-15T14:00:00Z"}, "events": rage_session()},
            {"session_id": "b", "meta": {"started_at": "2024-01-14 09:00:00"}, "events": []}
        ]);
        let today = parse_day("2024-01-15").unwrap();
        let out = trends_json(&sessions.to_string(), 2, today).unwrap();
        let trends: Trends = serde_json::from_str(&out).unwrap();

        assert_eq!(trends.daily.len(), 2);
        assert_eq!(trends.daily[0].sessions, 1);
        assert_eq!(trends.daily[0].frustrated_sessions, 0);
        assert_eq!(trends.daily[1].sessions, 1);
        assert_eq!(trends.daily[1].frustrated_sessions, 1);
        assert_eq!(
            trends.top_growing_issues[0].title,
            "High frustration - repeated rage clicks"
        );
    }

    #[test]
    fn test_parse_day_rejects_garbage() {
        assert!(matches!(
            parse_day("15/01/2024"),
            Err(AnalysisError::ParseError(_))
        ));
    }
}
