//! Hesitation detection
//!
//! - lingering over a call-to-action without clicking it
//! - reaching the pricing section and scrolling away
//! - focusing an input and not typing
//! - revisiting product pages without any cart action

use super::{round_secs, DetectorContext, PatternDetector};
use crate::error::AnalysisError;
use crate::types::{Event, EventKind, Insight, InsightType, Severity};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

const CTA_HOVER_MIN_MS: i64 = 3_000;
const CTA_CLICK_GRACE_MS: i64 = 2_000;
const PRICING_DEPTH_MIN: f64 = 50.0;
const PRICING_DEPTH_MAX: f64 = 80.0;
const PRICING_LOOKAHEAD_MS: i64 = 5_000;
const PRICING_SCROLL_BACK: f64 = 20.0;
const INPUT_IDLE_MS: i64 = 5_000;
const PRODUCT_REVISIT_THRESHOLD: usize = 2;

/// Hover span over one element, merged across the whole session
#[derive(Debug)]
struct HoverSpan<'a> {
    element: &'a str,
    page: Option<&'a str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

pub struct HesitationDetector;

impl HesitationDetector {
    fn cta_hover(ctx: &DetectorContext<'_>) -> Vec<Insight> {
        let mut spans: Vec<HoverSpan<'_>> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for hover in ctx.timeline.events_of(EventKind::MouseMove) {
            let element = hover.element_str();
            if element.is_empty() || !ctx.patterns.cta.is_match(element) {
                continue;
            }
            match index.get(element) {
                Some(&i) => {
                    let span = &mut spans[i];
                    span.start = span.start.min(hover.timestamp);
                    span.end = span.end.max(hover.timestamp);
                }
                None => {
                    index.insert(element, spans.len());
                    spans.push(HoverSpan {
                        element,
                        page: hover.url.as_deref(),
                        start: hover.timestamp,
                        end: hover.timestamp,
                    });
                }
            }
        }

        let grace = Duration::milliseconds(CTA_CLICK_GRACE_MS);
        spans
            .into_iter()
            .filter(|span| (span.end - span.start).num_milliseconds() > CTA_HOVER_MIN_MS)
            .filter(|span| {
                !ctx.timeline.events().iter().any(|e| {
                    matches!(e.kind, EventKind::Click | EventKind::RageClick)
                        && e.element_str() == span.element
                        && e.timestamp >= span.start
                        && e.timestamp <= span.end + grace
                })
            })
            .map(|span| {
                let hover_ms = (span.end - span.start).num_milliseconds();
                Insight::new(InsightType::Hesitation, Severity::Medium, "Hesitation before CTA")
                    .with_description(format!(
                        "User hovered over \"{}\" for {}s without clicking, showing hesitation.",
                        span.element,
                        round_secs(hover_ms)
                    ))
                    .with_recommendation(
                        "Consider improving the CTA copy, adding social proof, or reducing friction near this element.",
                    )
                    .at(span.start)
                    .with_element(Some(span.element))
                    .with_page(span.page)
            })
            .collect()
    }

    fn pricing_scroll_away(ctx: &DetectorContext<'_>) -> Option<Insight> {
        let lookahead = Duration::milliseconds(PRICING_LOOKAHEAD_MS);
        let scrolls: Vec<&Event> = ctx.timeline.events_of(EventKind::Scroll).collect();

        scrolls.iter().find_map(|scroll| {
            let url = scroll.url.as_deref().unwrap_or("");
            let depth = scroll.scroll_depth?;
            if !ctx.patterns.pricing.is_match(url)
                || depth <= PRICING_DEPTH_MIN
                || depth >= PRICING_DEPTH_MAX
            {
                return None;
            }

            let scrolled_away = scrolls.iter().any(|next| {
                next.timestamp > scroll.timestamp
                    && next.timestamp <= scroll.timestamp + lookahead
                    && next
                        .scroll_depth
                        .is_some_and(|d| d <= depth - PRICING_SCROLL_BACK)
            });
            if !scrolled_away {
                return None;
            }

            Some(
                Insight::new(InsightType::Hesitation, Severity::Medium, "Price/CTA hesitation")
                    .with_description(format!(
                        "User scrolled to pricing section on \"{}\" and then scrolled away, indicating hesitation.",
                        url
                    ))
                    .with_recommendation(
                        "Consider adding testimonials, a money-back guarantee, or clearer value proposition near pricing.",
                    )
                    .at(scroll.timestamp)
                    .with_page(Some(url)),
            )
        })
    }

    fn idle_input(ctx: &DetectorContext<'_>) -> Result<Option<Insight>, AnalysisError> {
        let session_end = ctx.session_end()?;
        let inputs: Vec<&Event> = ctx
            .timeline
            .events()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Input | EventKind::Focus))
            .collect();

        for (i, focus) in inputs.iter().enumerate() {
            if focus.value.is_some() {
                continue;
            }

            let field = focus.element_str();
            let next_on_field = inputs[i + 1..].iter().find(|e| e.element_str() == field);
            let gap_ms = match next_on_field {
                Some(next) => (next.timestamp - focus.timestamp).num_milliseconds(),
                None => (session_end - focus.timestamp).num_milliseconds(),
            };

            if gap_ms > INPUT_IDLE_MS {
                let label = if field.is_empty() { "form field" } else { field };
                return Ok(Some(
                    Insight::new(InsightType::Hesitation, Severity::Low, "Form hesitation")
                        .with_description(format!(
                            "User focused on input \"{}\" but did not type for {}s.",
                            label,
                            round_secs(gap_ms)
                        ))
                        .with_recommendation(
                            "Review the field label and placeholder text. Consider adding helper text or examples.",
                        )
                        .at(focus.timestamp)
                        .with_element(Some(field)),
                ));
            }
        }

        Ok(None)
    }

    fn product_revisits(ctx: &DetectorContext<'_>) -> Vec<Insight> {
        if ctx.has_cart_action() {
            return Vec::new();
        }

        let mut visits: Vec<(&str, usize, DateTime<Utc>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for view in ctx.product_views() {
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
            .filter(|(_, count, _)| *count >= PRODUCT_REVISIT_THRESHOLD)
            .map(|(url, count, first)| {
                Insight::new(InsightType::Hesitation, Severity::Medium, "Purchase hesitation")
                    .with_description(format!(
                        "User visited product page \"{}\" {} times without adding to cart.",
                        url, count
                    ))
                    .with_recommendation(
                        "Consider adding reviews, better product images, or a limited-time offer to encourage conversion.",
                    )
                    .at(first)
                    .with_page(Some(url))
                    .with_count(count)
            })
            .collect()
    }
}

impl PatternDetector for HesitationDetector {
    fn name(&self) -> &'static str {
        "hesitation"
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
        let mut insights = Self::cta_hover(ctx);
        insights.extend(Self::pricing_scroll_away(ctx));
        insights.extend(Self::idle_input(ctx)?);
        insights.extend(Self::product_revisits(ctx));
        Ok(insights)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn detect(events: Vec<Event>) -> Vec<Insight> {
        let tl = timeline(events);
        HesitationDetector
            .detect(&DetectorContext::new(&tl, patterns()))
            .unwrap()
    }

    fn hover(secs: i64, element: &str) -> Event {
        event(EventKind::MouseMove, secs)
            .with_url("/landing")
            .with_element(element)
    }

    #[test]
    fn test_cta_hover_without_click() {
        let insights = detect(vec![
            page(0, "/landing"),
            hover(1, "button.signup"),
            hover(3, "button.signup"),
            hover(6, "button.signup"),
            hover(7, "div.hero"),
            hover(20, "div.hero"),
        ]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Hesitation before CTA");
        assert_eq!(insights[0].element.as_deref(), Some("button.signup"));
        assert!(insights[0].description.contains("for 5s"));
    }

    #[test]
    fn test_cta_hover_followed_by_click() {
        let insights = detect(vec![
            page(0, "/landing"),
            hover(1, "button.signup"),
            hover(6, "button.signup"),
            event(EventKind::Click, 7).with_element("button.signup"),
        ]);
        assert!(insights.is_empty());
    }

    #[test]
    fn test_cta_hover_merges_across_visits() {
        let insights = detect(vec![
            page(0, "/landing"),
            hover(1, "a.buy-now"),
            event(EventKind::Click, 2).with_element("a.buy-now"),
            page(10, "/landing"),
            hover(30, "a.buy-now"),
        ]);

        // One span from 1s to 30s; the click at 2s falls inside it
        assert!(insights.is_empty());
    }

    #[test]
    fn test_pricing_scroll_away() {
        let insights = detect(vec![
            page(0, "/pricing"),
            event(EventKind::Scroll, 5)
                .with_url("/pricing")
                .with_scroll_depth(65.0),
            event(EventKind::Scroll, 8)
                .with_url("/pricing")
                .with_scroll_depth(45.0),
        ]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Price/CTA hesitation");
        assert_eq!(insights[0].page.as_deref(), Some("/pricing"));
    }

    #[test]
    fn test_pricing_scroll_back_too_late() {
        let insights = detect(vec![
            page(0, "/pricing"),
            event(EventKind::Scroll, 5)
                .with_url("/pricing")
                .with_scroll_depth(65.0),
            event(EventKind::Scroll, 11)
                .with_url("/pricing")
                .with_scroll_depth(10.0),
        ]);
        assert!(insights.iter().all(|i| i.title != "Price/CTA hesitation"));
    }

    #[test]
    fn test_input_focus_without_typing() {
        let insights = detect(vec![
            page(0, "/signup"),
            event(EventKind::Focus, 1).with_element("input#email"),
            event(EventKind::Input, 9)
                .with_element("input#email")
                .with_value("a@b.c"),
            event(EventKind::Focus, 10).with_element("input#phone"),
            event(EventKind::Click, 30),
        ]);

        let form: Vec<_> = insights
            .iter()
            .filter(|i| i.title == "Form hesitation")
            .collect();
        assert_eq!(form.len(), 1);
        assert_eq!(form[0].element.as_deref(), Some("input#email"));
        assert!(form[0].description.contains("for 8s"));
    }

    #[test]
    fn test_product_revisits_without_cart() {
        let insights = detect(vec![
            page(0, "/product/42"),
            page(30, "/"),
            page(60, "/product/42"),
            event(EventKind::Scroll, 70),
        ]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Purchase hesitation");
        assert_eq!(insights[0].count, 2);
    }

    #[test]
    fn test_product_revisits_with_cart_action() {
        let insights = detect(vec![
            page(0, "/product/42"),
            page(30, "/"),
            page(60, "/product/42"),
            event(EventKind::Click, 70).with_element("button.add-to-cart"),
        ]);
        assert!(insights.is_empty());
    }
}
