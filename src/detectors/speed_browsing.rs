//! Speed-browsing detection

use super::{DetectorContext, PatternDetector};
use crate::error::AnalysisError;
use crate::types::{Insight, InsightType, Severity};

const MIN_PAGE_VIEWS: usize = 3;
const SPEED_PAGE_MS: i64 = 3_000;
const LOW_SCROLL_DEPTH: f64 = 25.0;
const PAGE_COUNT_THRESHOLD: usize = 3;

pub struct SpeedBrowsingDetector;

impl PatternDetector for SpeedBrowsingDetector {
    fn name(&self) -> &'static str {
        "speed_browsing"
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
        let page_views = ctx.timeline.page_views();
        if page_views.len() < MIN_PAGE_VIEWS {
            return Ok(Vec::new());
        }
        let first_view = page_views[0].timestamp;
        let total = page_views.len();

        let intervals = ctx.timeline.page_intervals();
        let speed_pages = intervals
            .iter()
            .filter(|interval| interval.duration_ms() < SPEED_PAGE_MS)
            .count();
        let low_scroll_pages = intervals
            .iter()
            .filter(|interval| ctx.timeline.max_scroll_depth(interval) < LOW_SCROLL_DEPTH)
            .count();

        let mut insights = Vec::new();
        if speed_pages >= PAGE_COUNT_THRESHOLD {
            insights.push(
                Insight::new(
                    InsightType::SpeedBrowsing,
                    Severity::Low,
                    "User is scanning, not reading",
                )
                .with_description(format!(
                    "{} out of {} pages were viewed for less than 3 seconds each.",
                    speed_pages, total
                ))
                .with_recommendation(
                    "Improve page headlines, visual hierarchy, and above-the-fold content to capture attention quickly.",
                )
                .at(first_view)
                .with_count(speed_pages),
            );
        }

        // at least half of all page views
        if low_scroll_pages >= PAGE_COUNT_THRESHOLD && low_scroll_pages * 2 >= total {
            insights.push(
                Insight::new(
                    InsightType::SpeedBrowsing,
                    Severity::Low,
                    "Content not engaging - minimal scroll depth",
                )
                .with_description(format!(
                    "{} pages had less than 25% scroll depth, suggesting the content above the fold is not engaging enough.",
                    low_scroll_pages
                ))
                .with_recommendation(
                    "Review above-the-fold content. Add compelling visuals, clear value propositions, and engaging CTAs.",
                )
                .at(first_view)
                .with_count(low_scroll_pages),
            );
        }

        Ok(insights)
    }
}
