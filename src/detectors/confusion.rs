//! Confusion detection
//!
//! - the same URL visited three or more times
//! - an A→B→A→B navigation loop
//! - long stays without scrolling
//! - scrolling to the bottom and straight back up
//! - repeated quick exits

use super::{find_back_and_forth, round_secs, DetectorContext, PatternDetector};
use crate::error::AnalysisError;
use crate::types::{EventKind, Insight, InsightType, Severity};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const REVISIT_THRESHOLD: usize = 3;
const IDLE_PAGE_THRESHOLD_MS: i64 = 30_000;
const BOTTOM_DEPTH: f64 = 90.0;
const BACK_UP_DEPTH: f64 = 50.0;
const QUICK_EXIT_MS: i64 = 5_000;
const QUICK_EXIT_THRESHOLD: usize = 3;

pub struct ConfusionDetector;

impl ConfusionDetector {
    fn revisits(ctx: &DetectorContext<'_>) -> Vec<Insight> {
        let mut visits: Vec<(&str, usize, DateTime<Utc>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for view in ctx.timeline.page_views() {
            let Some(url) = view.url.as_deref() else {
                continue;
            };
            match index.get(url) {
                Some(&i) => visits[i].1 += 1,
                None => {
                    index.insert(url, visits.len());
                    visits.push((url, 1, view.timestamp));
                }
            }
        }

        visits
            .into_iter()
            .filter(|(_, count, _)| *count >= REVISIT_THRESHOLD)
            .map(|(url, count, first)| {
                Insight::new(
                    InsightType::Confusion,
                    Severity::Medium,
                    "User seems lost - revisiting pages",
                )
                .with_description(format!(
                    "The page \"{}\" was visited {} times during this session, suggesting the user could not find what they needed.",
                    url, count
                ))
                .with_recommendation("Improve the information architecture and navigation on this page.")
                .at(first)
                .with_page(Some(url))
                .with_count(count)
            })
            .collect()
    }

    fn navigation_loop(ctx: &DetectorContext<'_>) -> Option<Insight> {
        let page_views = ctx.timeline.page_views();
        let (i, a, b) = find_back_and_forth(page_views)?;

        Some(
            Insight::new(
                InsightType::Confusion,
                Severity::Medium,
                "Navigation confusion detected",
            )
            .with_description(format!(
                "User navigated in a loop: \"{a}\" -> \"{b}\" -> \"{a}\" -> \"{b}\"."
            ))
            .with_recommendation(
                "Check if the navigation between these pages is clear and the content meets user expectations.",
            )
            .at(page_views[i].timestamp)
            .with_page(Some(a)),
        )
    }

    fn idle_without_scroll(ctx: &DetectorContext<'_>) -> Vec<Insight> {
        ctx.timeline
            .page_intervals()
            .iter()
            .filter(|interval| interval.duration_ms() > IDLE_PAGE_THRESHOLD_MS)
            .filter(|interval| {
                !ctx.timeline
                    .events_during(interval)
                    .any(|e| e.kind == EventKind::Scroll)
            })
            .map(|interval| {
                Insight::new(
                    InsightType::Confusion,
                    Severity::Low,
                    "User may be confused or idle",
                )
                .with_description(format!(
                    "Spent {}s on \"{}\" with no scrolling, suggesting confusion or distraction.",
                    round_secs(interval.duration_ms()),
                    interval.display_url()
                ))
                .with_recommendation(
                    "Ensure the page content is clear, with a visible call-to-action above the fold.",
                )
                .at(interval.start)
                .with_page(interval.url)
            })
            .collect()
    }

    fn bottom_then_up(ctx: &DetectorContext<'_>) -> Option<Insight> {
        let mut reached_bottom = false;

        for scroll in ctx.timeline.events_of(EventKind::Scroll) {
            let Some(depth) = scroll.scroll_depth else {
                continue;
            };
            if depth >= BOTTOM_DEPTH {
                reached_bottom = true;
            } else if reached_bottom && depth < BACK_UP_DEPTH {
                return Some(
                    Insight::new(
                        InsightType::Confusion,
                        Severity::Low,
                        "User may not have found what they were looking for",
                    )
                    .with_description(
                        "The user scrolled to the bottom of the page and then scrolled back up, suggesting the content did not meet their expectations.",
                    )
                    .with_recommendation(
                        "Review the page content. Consider better content structure or a search feature.",
                    )
                    .at(scroll.timestamp)
                    .with_page(scroll.url.as_deref()),
                );
            }
        }

        None
    }

    fn quick_exits(ctx: &DetectorContext<'_>) -> Option<Insight> {
        let quick = ctx
            .timeline
            .page_intervals()
            .iter()
            .filter(|interval| interval.duration_ms() < QUICK_EXIT_MS)
            .count();
        if quick < QUICK_EXIT_THRESHOLD {
            return None;
        }

        let mut insight = Insight::new(
            InsightType::Confusion,
            Severity::Medium,
            "Content not matching expectations",
        )
        .with_description(format!(
            "{} pages were exited in under 5 seconds, suggesting the content does not match what the user expected.",
            quick
        ))
        .with_recommendation(
            "Review page titles, meta descriptions, and navigation labels to ensure they accurately describe the content.",
        )
        .with_count(quick);
        if let Some(first) = ctx.timeline.page_views().first() {
            insight = insight.at(first.timestamp);
        }
        Some(insight)
    }
}

impl PatternDetector for ConfusionDetector {
    fn name(&self) -> &'static str {
        "confusion"
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
        let mut insights = Self::revisits(ctx);
        insights.extend(Self::navigation_loop(ctx));
        insights.extend(Self::idle_without_scroll(ctx));
        insights.extend(Self::bottom_then_up(ctx));
        insights.extend(Self::quick_exits(ctx));
        Ok(insights)
    }
}
