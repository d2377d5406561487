//! Deep-engagement detection
//!
//! Positive signals only; every insight here has severity `info`.

use super::{format_number, DetectorContext, PatternDetector};
use crate::error::AnalysisError;
use crate::timeline::PageInterval;
use crate::types::{EventKind, Insight, InsightType, Severity};

const HIGH_SCROLL_DEPTH: f64 = 80.0;
const DEEP_PAGE_MS: i64 = 180_000;
const DEEP_PAGE_INTERACTIONS: usize = 3;
const PURCHASE_INTENT_PRODUCT_VIEWS: usize = 2;

pub struct DeepEngagementDetector;

impl DeepEngagementDetector {
    fn high_scroll(ctx: &DetectorContext<'_>, intervals: &[PageInterval<'_>]) -> Vec<Insight> {
        intervals
            .iter()
            .filter_map(|interval| {
                let depth = ctx.timeline.max_scroll_depth(interval);
                (depth >= HIGH_SCROLL_DEPTH).then(|| {
                    Insight::new(InsightType::Engagement, Severity::Info, "High scroll engagement")
                        .with_description(format!(
                            "User scrolled to {}% depth on \"{}\".",
                            format_number(depth),
                            interval.display_url()
                        ))
                        .with_recommendation(
                            "This page is performing well in terms of engagement. Consider what makes it work and apply those patterns elsewhere.",
                        )
                        .at(interval.start)
                        .with_page(interval.url)
                })
            })
            .collect()
    }

    fn long_interactive_pages(
        ctx: &DetectorContext<'_>,
        intervals: &[PageInterval<'_>],
    ) -> Vec<Insight> {
        intervals
            .iter()
            .filter(|interval| interval.duration_ms() > DEEP_PAGE_MS)
            .filter_map(|interval| {
                let interactions = ctx
                    .timeline
                    .events_during(interval)
                    .filter(|e| {
                        matches!(
                            e.kind,
                            EventKind::Click
                                | EventKind::Scroll
                                | EventKind::Input
                                | EventKind::FormSubmit
                        )
                    })
                    .count();
                (interactions >= DEEP_PAGE_INTERACTIONS).then(|| {
                    let minutes = (interval.duration_ms() as f64 / 60_000.0).round() as i64;
                    Insight::new(InsightType::Engagement, Severity::Info, "Deep engagement detected")
                        .with_description(format!(
                            "User spent {}m on \"{}\" with {} interactions.",
                            minutes,
                            interval.display_url(),
                            interactions
                        ))
                        .with_recommendation(
                            "This page is highly engaging. Ensure the conversion path from this page is optimized.",
                        )
                        .at(interval.start)
                        .with_page(interval.url)
                })
            })
            .collect()
    }

    fn purchase_intent(ctx: &DetectorContext<'_>) -> Option<Insight> {
        let product_views = ctx.product_views();
        if product_views.len() < PURCHASE_INTENT_PRODUCT_VIEWS || !ctx.has_cart_action() {
            return None;
        }

        Some(
            Insight::new(InsightType::Engagement, Severity::Info, "High purchase intent")
                .with_description(format!(
                    "User viewed {} product pages and added items to cart.",
                    product_views.len()
                ))
                .with_recommendation(
                    "Ensure the checkout flow is frictionless. Consider upsell/cross-sell opportunities.",
                )
                .at(product_views[0].timestamp)
                .with_count(product_views.len()),
        )
    }
}

impl PatternDetector for DeepEngagementDetector {
    fn name(&self) -> &'static str {
        "deep_engagement"
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
        let intervals = ctx.timeline.page_intervals();
        let mut insights = Self::high_scroll(ctx, &intervals);
        insights.extend(Self::long_interactive_pages(ctx, &intervals));
        insights.extend(Self::purchase_intent(ctx));
        Ok(insights)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::types::Event;
    use pretty_assertions::assert_eq;

    fn detect(events: Vec<Event>) -> Vec<Insight> {
        let tl = timeline(events);
        DeepEngagementDetector
            .detect(&DetectorContext::new(&tl, patterns()))
            .unwrap()
    }

    #[test]
    fn test_high_scroll_per_page() {
        let insights = detect(vec![
            page(0, "/blog/a"),
            event(EventKind::Scroll, 5).with_scroll_depth(87.5),
            page(10, "/blog/b"),
            event(EventKind::Scroll, 15).with_scroll_depth(40.0),
            page(20, "/blog/c"),
            event(EventKind::Scroll, 25).with_scroll_depth(100.0),
        ]);

        assert_eq!(insights.len(), 2);
        assert_eq!(
            insights[0].description,
            "User scrolled to 87.5% depth on \"/blog/a\"."
        );
        assert_eq!(
            insights[1].description,
            "User scrolled to 100% depth on \"/blog/c\"."
        );
        assert!(insights.iter().all(|i| i.severity == Severity::Info));
    }

    #[test]
    fn test_long_page_with_interactions() {
        let insights = detect(vec![
            page(0, "/docs"),
            event(EventKind::Click, 30),
            event(EventKind::Input, 60),
            event(EventKind::MouseMove, 90),
            event(EventKind::Click, 240),
        ]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Deep engagement detected");
        assert_eq!(
            insights[0].description,
            "User spent 4m on \"/docs\" with 3 interactions."
        );
    }

    #[test]
    fn test_long_page_without_enough_interactions() {
        let insights = detect(vec![
            page(0, "/docs"),
            event(EventKind::Click, 30),
            event(EventKind::MouseMove, 240),
        ]);
        assert!(insights.is_empty());
    }

    #[test]
    fn test_purchase_intent() {
        let insights = detect(vec![
            page(0, "/product/1"),
            page(10, "/product/2"),
            event(EventKind::Click, 15).with_element("button.add-to-cart"),
        ]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "High purchase intent");
        assert_eq!(insights[0].count, 2);
        assert_eq!(insights[0].timestamp, Some(at(0)));
    }

    #[test]
    fn test_product_views_without_cart() {
        let insights = detect(vec![page(0, "/product/1"), page(10, "/product/2")]);
        assert!(insights.is_empty());
    }
}
