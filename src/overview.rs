//! Cross-session insight overview
//!
//! Rolls many per-session analysis results up into a site-wide health view:
//! recurring issues, frustration hotspots, exit and dead-end pages, and the
//! sessions most in need of a replay.

use crate::types::{AnalysisResult, InsightType, SessionMeta, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Frustration score at which a session counts as frustrated
pub(crate) const ATTENTION_FRUSTRATION: u8 = 40;
/// Affected sessions at which a medium issue becomes high
const PROMOTE_TO_HIGH: usize = 10;
/// Affected sessions at which a high issue becomes critical
const PROMOTE_TO_CRITICAL: usize = 20;

const TOP_ISSUES: usize = 20;
const TOP_PAGES: usize = 10;
const TOP_ELEMENTS: usize = 5;
const TOP_ATTENTION: usize = 20;

/// One recorded session as submitted for a batch overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInput {
    pub session_id: String,
    #[serde(default)]
    pub meta: SessionMeta,
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

/// One analyzed session, as the overview consumes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalysis {
    pub session_id: String,
    #[serde(default)]
    pub meta: SessionMeta,
    /// Whether the session contained any form input
    #[serde(default)]
    pub had_input: bool,
    /// Number of JS errors recorded
    #[serde(default)]
    pub errors: usize,
    pub result: AnalysisResult,
}

/// An issue recurring across sessions, keyed by (type, title)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopIssue {
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    /// Severity of the first occurrence, promoted by reach
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub affected_sessions: Vec<String>,
    /// Total occurrences
    pub count: usize,
    pub page: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCount {
    pub element: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrustrationHotspot {
    pub page: String,
    pub count: usize,
    pub top_elements: Vec<ElementCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    pub page: String,
    pub count: usize,
}

/// A high-frustration session worth replaying
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionSession {
    pub session_id: String,
    pub frustration_score: u8,
    pub engagement_score: u8,
    pub started_at: Option<String>,
    pub duration: Option<f64>,
    pub country: Option<String>,
    /// Title of the session's most severe insight
    pub top_issue: Option<String>,
}

/// Site-wide roll-up of many session analyses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightOverview {
    pub total_sessions: usize,
    /// 0-100, higher is healthier
    pub health_score: u8,
    /// Percentage of sessions with frustration score of 40 or more
    pub frustration_rate: u8,
    pub avg_engagement: u8,
    pub issues_found: usize,
    pub top_issues: Vec<TopIssue>,
    pub frustration_hotspots: Vec<FrustrationHotspot>,
    pub common_exit_pages: Vec<PageCount>,
    pub sessions_needing_attention: Vec<AttentionSession>,
    /// Form-abandonment insights per session with form input, as a percentage
    pub form_abandonment_rate: u8,
    pub dead_end_pages: Vec<PageCount>,
}

impl Default for InsightOverview {
    fn default() -> Self {
        Self {
            total_sessions: 0,
            health_score: 100,
            frustration_rate: 0,
            avg_engagement: 0,
            issues_found: 0,
            top_issues: Vec::new(),
            frustration_hotspots: Vec::new(),
            common_exit_pages: Vec::new(),
            sessions_needing_attention: Vec::new(),
            form_abandonment_rate: 0,
            dead_end_pages: Vec::new(),
        }
    }
}

/// Counter keeping first-seen order, so ties sort deterministically
#[derive(Debug, Default)]
pub(crate) struct OrderedCounter {
    counts: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

impl OrderedCounter {
    pub(crate) fn add(&mut self, key: &str) {
        match self.index.get(key) {
            Some(&i) => self.counts[i].1 += 1,
            None => {
                self.index.insert(key.to_string(), self.counts.len());
                self.counts.push((key.to_string(), 1));
            }
        }
    }

    pub(crate) fn top(mut self, n: usize) -> Vec<(String, usize)> {
        self.counts.sort_by(|a, b| b.1.cmp(&a.1));
        self.counts.truncate(n);
        self.counts
    }
}

#[derive(Debug, Default)]
struct HotspotAccumulator {
    pages: Vec<(String, usize, OrderedCounter)>,
    index: HashMap<String, usize>,
}

impl HotspotAccumulator {
    fn add(&mut self, page: &str, element: Option<&str>) {
        let i = match self.index.get(page) {
            Some(&i) => i,
            None => {
                self.index.insert(page.to_string(), self.pages.len());
                self.pages
                    .push((page.to_string(), 0, OrderedCounter::default()));
                self.pages.len() - 1
            }
        };
        let entry = &mut self.pages[i];
        entry.1 += 1;
        if let Some(element) = element.filter(|e| !e.is_empty()) {
            entry.2.add(element);
        }
    }

    fn top(mut self, n: usize) -> Vec<FrustrationHotspot> {
        self.pages.sort_by(|a, b| b.1.cmp(&a.1));
        self.pages
            .into_iter()
            .take(n)
            .map(|(page, count, elements)| FrustrationHotspot {
                page,
                count,
                top_elements: elements
                    .top(TOP_ELEMENTS)
                    .into_iter()
                    .map(|(element, count)| ElementCount { element, count })
                    .collect(),
            })
            .collect()
    }
}

impl InsightOverview {
    /// Build the overview from per-session analyses
    pub fn from_sessions(sessions: &[SessionAnalysis]) -> Self {
        if sessions.is_empty() {
            return Self::default();
        }

        let mut issues: Vec<TopIssue> = Vec::new();
        let mut issue_index: HashMap<(InsightType, String), usize> = HashMap::new();
        let mut hotspots = HotspotAccumulator::default();
        let mut exit_pages = OrderedCounter::default();
        let mut dead_end_pages = OrderedCounter::default();
        let mut abandoned = 0usize;
        let mut sessions_with_input = 0usize;
        let mut attention: Vec<AttentionSession> = Vec::new();

        for session in sessions {
            let result = &session.result;
            for insight in &result.insights {
                let key = (insight.insight_type, insight.title.clone());
                let i = *issue_index.entry(key).or_insert_with(|| {
                    issues.push(TopIssue {
                        insight_type: insight.insight_type,
                        severity: insight.severity,
                        title: insight.title.clone(),
                        description: insight.description.clone(),
                        recommendation: insight.recommendation.clone(),
                        affected_sessions: Vec::new(),
                        count: 0,
                        page: insight.page.clone(),
                    });
                    issues.len() - 1
                });
                let issue = &mut issues[i];
                issue.count += 1;
                if !issue.affected_sessions.contains(&session.session_id) {
                    issue.affected_sessions.push(session.session_id.clone());
                }
                promote(issue);

                let page = insight.page.as_deref();
                match insight.insight_type {
                    InsightType::Frustration => {
                        if let Some(page) = page {
                            hotspots.add(page, insight.element.as_deref());
                        }
                    }
                    InsightType::ExitIntent => {
                        if let Some(page) = page {
                            exit_pages.add(page);
                        }
                    }
                    InsightType::DeadEnd => {
                        if let Some(page) = page {
                            dead_end_pages.add(page);
                        }
                    }
                    InsightType::FormAbandonment => abandoned += 1,
                    _ => {}
                }
            }

            if result.score.frustration >= ATTENTION_FRUSTRATION {
                attention.push(AttentionSession {
                    session_id: session.session_id.clone(),
                    frustration_score: result.score.frustration,
                    engagement_score: result.score.engagement,
                    started_at: session.meta.started_at.clone(),
                    duration: session.meta.duration,
                    country: session.meta.country.clone(),
                    top_issue: result.insights.first().map(|i| i.title.clone()),
                });
            }
            if session.had_input {
                sessions_with_input += 1;
            }
        }

        let total = sessions.len();
        let avg_engagement = rounded_mean(sessions.iter().map(|s| s.result.score.engagement));
        let avg_frustration = rounded_mean(sessions.iter().map(|s| s.result.score.frustration));
        let health = 100.0 - avg_frustration as f64 * 0.6 + avg_engagement as f64 * 0.4;
        let frustration_rate = percentage(attention.len(), total);

        issues.sort_by(|a, b| b.affected_sessions.len().cmp(&a.affected_sessions.len()));
        issues.truncate(TOP_ISSUES);

        attention.sort_by(|a, b| b.frustration_score.cmp(&a.frustration_score));
        attention.truncate(TOP_ATTENTION);

        let to_pages = |counter: OrderedCounter| -> Vec<PageCount> {
            counter
                .top(TOP_PAGES)
                .into_iter()
                .map(|(page, count)| PageCount { page, count })
                .collect()
        };

        Self {
            total_sessions: total,
            health_score: health.clamp(0.0, 100.0).round() as u8,
            frustration_rate,
            avg_engagement,
            issues_found: issues.len(),
            top_issues: issues,
            frustration_hotspots: hotspots.top(TOP_PAGES),
            common_exit_pages: to_pages(exit_pages),
            sessions_needing_attention: attention,
            form_abandonment_rate: percentage(abandoned, sessions_with_input),
            dead_end_pages: to_pages(dead_end_pages),
        }
    }
}

/// Raise severity with the number of affected sessions
fn promote(issue: &mut TopIssue) {
    let reach = issue.affected_sessions.len();
    if reach >= PROMOTE_TO_HIGH && issue.severity == Severity::Medium {
        issue.severity = Severity::High;
    }
    if reach >= PROMOTE_TO_CRITICAL && issue.severity == Severity::High {
        issue.severity = Severity::Critical;
    }
}

pub(crate) fn rounded_mean(values: impl Iterator<Item = u8>) -> u8 {
    let (sum, n) = values.fold((0u64, 0u64), |(sum, n), v| (sum + v as u64, n + 1));
    if n == 0 {
        return 0;
    }
    (sum as f64 / n as f64).round() as u8
}

/// `part / whole` as a rounded percentage, capped at 100
pub(crate) fn percentage(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round().min(100.0) as u8
}
