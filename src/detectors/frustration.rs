//! Frustration detection
//!
//! - rage-click clusters grouped by (page, element)
//! - dead-click clusters grouped by (page, element)
//! - JS errors the visitor left right after
//! - rapid back-and-forth between two pages

use super::{find_back_and_forth, DetectorContext, PatternDetector};
use crate::error::AnalysisError;
use crate::types::{Event, EventKind, Insight, InsightType, Severity};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// An error counts as the exit cause when no navigation follows within this window
const ERROR_EXIT_WINDOW_MS: i64 = 10_000;

/// Click cluster on one element of one page
#[derive(Debug)]
struct ClickCluster<'a> {
    page: &'a str,
    element: &'a str,
    count: usize,
    first: DateTime<Utc>,
}

/// Group events by (page, element), keeping first-seen order
fn cluster_by_page_element<'a>(events: impl Iterator<Item = &'a Event>) -> Vec<ClickCluster<'a>> {
    let mut clusters: Vec<ClickCluster<'a>> = Vec::new();
    let mut index: HashMap<(&'a str, &'a str), usize> = HashMap::new();

    for event in events {
        let page = event.url.as_deref().unwrap_or("(unknown)");
        let element = event.element_str();
        match index.get(&(page, element)) {
            Some(&i) => clusters[i].count += 1,
            None => {
                index.insert((page, element), clusters.len());
                clusters.push(ClickCluster {
                    page,
                    element,
                    count: 1,
                    first: event.timestamp,
                });
            }
        }
    }

    clusters
}

pub struct FrustrationDetector;

impl FrustrationDetector {
    fn rage_clicks(ctx: &DetectorContext<'_>) -> Vec<Insight> {
        cluster_by_page_element(ctx.timeline.events_of(EventKind::RageClick))
            .into_iter()
            .map(|cluster| {
                let severity = match cluster.count {
                    n if n >= 5 => Severity::Critical,
                    n if n >= 3 => Severity::High,
                    _ => Severity::Medium,
                };
                let title = if cluster.count >= 3 {
                    "High frustration - repeated rage clicks"
                } else {
                    "Rage click detected"
                };
                let element = if cluster.element.is_empty() {
                    "page element"
                } else {
                    cluster.element
                };

                Insight::new(InsightType::Frustration, severity, title)
                    .with_description(format!(
                        "{} rage click(s) on \"{}\" at {}.",
                        cluster.count, element, cluster.page
                    ))
                    .with_recommendation(
                        "Check if the element is responsive and provides proper visual feedback on click.",
                    )
                    .at(cluster.first)
                    .with_element(Some(cluster.element))
                    .with_page(Some(cluster.page))
                    .with_count(cluster.count)
            })
            .collect()
    }

    fn dead_clicks(ctx: &DetectorContext<'_>) -> Vec<Insight> {
        cluster_by_page_element(ctx.timeline.events_of(EventKind::DeadClick))
            .into_iter()
            .map(|cluster| {
                let severity = if cluster.count >= 5 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let element = if cluster.element.is_empty() {
                    "element"
                } else {
                    cluster.element
                };

                Insight::new(
                    InsightType::Frustration,
                    severity,
                    "UI element appears clickable but is not",
                )
                .with_description(format!(
                    "{} dead click(s) on \"{}\" at {}. Users expect this element to be interactive.",
                    cluster.count, element, cluster.page
                ))
                .with_recommendation(
                    "Either make this element interactive or change its styling so it does not appear clickable.",
                )
                .at(cluster.first)
                .with_element(Some(cluster.element))
                .with_page(Some(cluster.page))
                .with_count(cluster.count)
            })
            .collect()
    }

    fn error_exits(ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
        let session_end = ctx.session_end()?;
        let window = Duration::milliseconds(ERROR_EXIT_WINDOW_MS);
        let events = ctx.timeline.events();

        let insights = ctx
            .timeline
            .events_of(EventKind::JsError)
            .filter(|err| err.timestamp >= session_end - window)
            .filter(|err| {
                !events.iter().any(|e| {
                    e.kind == EventKind::PageView
                        && e.timestamp > err.timestamp
                        && e.timestamp <= err.timestamp + window
                })
            })
            .map(|err| {
                let message = err.message.as_deref().unwrap_or("");
                let mut location = String::new();
                if let Some(source) = &err.source {
                    location.push_str(&format!(" in {}", source));
                }
                if let Some(line) = &err.line {
                    location.push_str(&format!(" line {}", line));
                }

                let recommendation = match &err.source {
                    Some(_) => format!("Fix the JavaScript error{}.", location),
                    None => "Investigate and fix the JavaScript error causing users to leave."
                        .to_string(),
                };

                Insight::new(
                    InsightType::Frustration,
                    Severity::Critical,
                    "JavaScript error caused user to leave",
                )
                .with_description(format!(
                    "Error \"{}\"{} occurred and the user left within seconds.",
                    message, location
                ))
                .with_recommendation(recommendation)
                .at(err.timestamp)
                .with_page(err.url.as_deref())
            })
            .collect();

        Ok(insights)
    }

    fn back_and_forth(ctx: &DetectorContext<'_>) -> Option<Insight> {
        let page_views = ctx.timeline.page_views();
        let (i, a, b) = find_back_and_forth(page_views)?;

        Some(
            Insight::new(
                InsightType::Frustration,
                Severity::Medium,
                "Rapid back-and-forth navigation",
            )
            .with_description(format!(
                "User navigated back and forth between \"{}\" and \"{}\" multiple times, suggesting confusion.",
                a, b
            ))
            .with_recommendation(
                "Review the relationship between these pages. Users may be unable to find what they need.",
            )
            .at(page_views[i].timestamp)
            .with_page(Some(a)),
        )
    }
}

impl PatternDetector for FrustrationDetector {
    fn name(&self) -> &'static str {
        "frustration"
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
        let mut insights = Self::rage_clicks(ctx);
        insights.extend(Self::dead_clicks(ctx));
        insights.extend(Self::error_exits(ctx)?);
        insights.extend(Self::back_and_forth(ctx));
        Ok(insights)
    }
}
