//! Session scoring
//!
//! Computes the engagement, frustration and conversion scores. Each score is a
//! sum of capped components, clamped to 0-100 and rounded. The frustration
//! score reads the confusion candidates produced by the detectors, so the
//! scorer takes the candidate list as an explicit input.

use crate::patterns::Patterns;
use crate::timeline::SessionTimeline;
use crate::types::{EventKind, Insight, InsightType, Score};

/// Session length at which time points max out (5 minutes)
const FULL_TIME_MS: f64 = 300_000.0;

/// Points per funnel stage reached
const FUNNEL_STAGE_POINTS: f64 = 15.0;

/// Session scorer
pub struct SessionScorer;

impl SessionScorer {
    /// Score one session from its timeline and the detector candidates
    pub fn score(timeline: &SessionTimeline, patterns: &Patterns, candidates: &[Insight]) -> Score {
        Score {
            engagement: engagement_score(timeline),
            frustration: frustration_score(timeline, candidates),
            conversion: conversion_score(timeline, patterns),
        }
    }
}

/// Engagement score
///
/// Formula:
/// `min(30, pages*5) + min(30, duration_ms/300000*30) + min(20, avg_depth*0.2) + min(20, interactions*2)`
///
/// Interactions are clicks, inputs and form submits. Scroll events without a
/// depth reading count as 0 in the average.
fn engagement_score(timeline: &SessionTimeline) -> u8 {
    let page_points = (timeline.page_views().len() as f64 * 5.0).min(30.0);
    let time_points = (timeline.duration_ms() as f64 / FULL_TIME_MS * 30.0).min(30.0);
    let scroll_points = (average_scroll_depth(timeline) * 0.2).min(20.0);

    let interactions = timeline.count_of(EventKind::Click)
        + timeline.count_of(EventKind::Input)
        + timeline.count_of(EventKind::FormSubmit);
    let interaction_points = (interactions as f64 * 2.0).min(20.0);

    clamp_score(page_points + time_points + scroll_points + interaction_points)
}

/// Frustration score
///
/// Formula:
/// `min(40, rage*10) + min(20, dead*5) + min(20, errors*10) + min(20, confusion*5)`
fn frustration_score(timeline: &SessionTimeline, candidates: &[Insight]) -> u8 {
    let rage = (timeline.count_of(EventKind::RageClick) as f64 * 10.0).min(40.0);
    let dead = (timeline.count_of(EventKind::DeadClick) as f64 * 5.0).min(20.0);
    let errors = (timeline.count_of(EventKind::JsError) as f64 * 10.0).min(20.0);

    let confusion_count = candidates
        .iter()
        .filter(|i| i.insight_type == InsightType::Confusion)
        .count();
    let confusion = (confusion_count as f64 * 5.0).min(20.0);

    clamp_score(rage + dead + errors + confusion)
}

/// Conversion score
///
/// Formula:
/// `funnel_stages*15 + min(20, cart_activity*10) + min(25, submits*12)`
fn conversion_score(timeline: &SessionTimeline, patterns: &Patterns) -> u8 {
    let stages = patterns.funnel_stages_reached(timeline.page_urls()).len();
    let funnel = stages as f64 * FUNNEL_STAGE_POINTS;

    let cart_activity = timeline
        .events()
        .iter()
        .filter(|e| {
            let text = format!("{} {}", e.element_str(), e.name_str());
            patterns.cart_activity.is_match(&text)
        })
        .count();
    let cart = (cart_activity as f64 * 10.0).min(20.0);

    let submits = (timeline.count_of(EventKind::FormSubmit) as f64 * 12.0).min(25.0);

    clamp_score(funnel + cart + submits)
}

/// Mean of all scroll-depth readings, 0 without scroll events
fn average_scroll_depth(timeline: &SessionTimeline) -> f64 {
    let (sum, count) = timeline
        .events_of(EventKind::Scroll)
        .fold((0.0, 0usize), |(sum, count), e| {
            (sum + e.scroll_depth.unwrap_or(0.0), count + 1)
        });
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::*;
    use crate::types::{Event, Severity};

    fn score(events: Vec<Event>, candidates: &[Insight]) -> Score {
        SessionScorer::score(&timeline(events), patterns(), candidates)
    }

    #[test]
    fn test_empty_timeline_scores_zero() {
        assert_eq!(score(Vec::new(), &[]), Score::default());
    }

    #[test]
    fn test_bounce_engagement() {
        let s = score(vec![page(0, "/"), event(EventKind::MouseMove, 5)], &[]);
        // 5 page points + 0.5 time points
        assert_eq!(s.engagement, 6);
    }

    #[test]
    fn test_engagement_components_cap() {
        let mut events = Vec::new();
        for i in 0..10 {
            events.push(page(i * 60, &format!("/p{i}")));
            events.push(event(EventKind::Click, i * 60 + 1));
            events.push(event(EventKind::Input, i * 60 + 2));
            events.push(event(EventKind::Scroll, i * 60 + 3).with_scroll_depth(100.0));
        }
        assert_eq!(score(events, &[]).engagement, 100);
    }

    #[test]
    fn test_scroll_without_depth_lowers_average() {
        let s = score(
            vec![
                event(EventKind::Scroll, 0).with_scroll_depth(100.0),
                event(EventKind::Scroll, 0),
            ],
            &[],
        );
        // average depth 50 -> 10 points
        assert_eq!(s.engagement, 10);
    }

    #[test]
    fn test_frustration_counts_confusion_candidates() {
        let mut events = vec![page(0, "/")];
        events.extend((0..5).map(|_| event(EventKind::RageClick, 1)));
        events.push(event(EventKind::DeadClick, 2));
        events.push(event(EventKind::JsError, 3));

        let confusion = Insight::new(InsightType::Confusion, Severity::Low, "x");
        let candidates = vec![confusion.clone(), confusion.clone(), confusion];
        // 40 + 5 + 10 + 15
        assert_eq!(score(events, &candidates).frustration, 70);
    }

    #[test]
    fn test_frustration_clamped() {
        let mut events = Vec::new();
        events.extend((0..20).map(|s| event(EventKind::RageClick, s)));
        events.extend((0..20).map(|s| event(EventKind::DeadClick, s)));
        events.extend((0..20).map(|s| event(EventKind::JsError, s)));
        let confusion = vec![Insight::new(InsightType::Confusion, Severity::Low, "x"); 10];
        assert_eq!(score(events, &confusion).frustration, 100);
    }

    #[test]
    fn test_conversion_funnel_stages_count_once() {
        let s = score(
            vec![
                page(0, "/"),
                page(10, "/product/1"),
                page(20, "/product/2"),
                page(30, "/cart"),
            ],
            &[],
        );
        // landing, product, cart
        assert_eq!(s.conversion, 45);
    }

    #[test]
    fn test_conversion_cart_activity_and_submits() {
        let s = score(
            vec![
                page(0, "/thank-you"),
                event(EventKind::Click, 1).with_element("button.add-to-cart"),
                event(EventKind::Custom, 2).with_name("cart_viewed"),
                event(EventKind::Click, 3).with_element("#kosik"),
                event(EventKind::FormSubmit, 4),
                event(EventKind::FormSubmit, 5),
                event(EventKind::FormSubmit, 6),
            ],
            &[],
        );
        // thank-you stage 15 + cart min(20, 30) + submits min(25, 36)
        assert_eq!(s.conversion, 60);
    }
}
