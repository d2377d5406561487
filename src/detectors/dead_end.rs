//! Dead-end detection on the final page

use super::{DetectorContext, PatternDetector};
use crate::error::AnalysisError;
use crate::types::{Insight, InsightType, Severity};

/// Minimum time on the final page before a dead end is considered
const DEAD_END_MIN_MS: i64 = 10_000;

pub struct DeadEndDetector;

impl PatternDetector for DeadEndDetector {
    fn name(&self) -> &'static str {
        "dead_end"
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
        let Some(last_page) = ctx.timeline.last_interval() else {
            return Ok(Vec::new());
        };
        let Some(url) = last_page.url.filter(|u| !u.is_empty()) else {
            return Ok(Vec::new());
        };
        if last_page.duration_ms() <= DEAD_END_MIN_MS {
            return Ok(Vec::new());
        }

        let Some(last_click) = ctx
            .timeline
            .events()
            .iter()
            .filter(|e| e.kind.is_click_like() && e.timestamp >= last_page.start)
            .last()
        else {
            return Ok(Vec::new());
        };

        let element = last_click.element_str();
        if ctx.patterns.is_navigational(element) {
            return Ok(Vec::new());
        }

        let shown = if element.is_empty() {
            "a non-interactive element"
        } else {
            element
        };
        Ok(vec![Insight::new(
            InsightType::DeadEnd,
            Severity::Medium,
            "No clear next step on page",
        )
        .with_description(format!(
            "The last click on \"{}\" was on \"{}\", suggesting there is no clear call-to-action.",
            url, shown
        ))
        .with_recommendation(
            "Add a clear call-to-action or navigation element to guide users to the next step.",
        )
        .at(last_click.timestamp)
        .with_page(Some(url))
        .with_element(Some(element))])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::types::{Event, EventKind};

    fn detect(events: Vec<Event>) -> Vec<Insight> {
        let tl = timeline(events);
        DeadEndDetector
            .detect(&DetectorContext::new(&tl, patterns()))
            .unwrap()
    }

    #[test]
    fn test_last_click_on_plain_element() {
        let insights = detect(vec![
            page(0, "/"),
            page(10, "/features"),
            event(EventKind::Click, 12).with_element("a.nav-home"),
            event(EventKind::Click, 20).with_element("div.feature-card"),
            event(EventKind::Scroll, 30),
        ]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].page.as_deref(), Some("/features"));
        assert_eq!(insights[0].element.as_deref(), Some("div.feature-card"));
        assert_eq!(insights[0].timestamp, Some(at(20)));
    }

    #[test]
    fn test_last_click_on_navigation() {
        let insights = detect(vec![
            page(0, "/features"),
            event(EventKind::Click, 5).with_element("div.card"),
            event(EventKind::Click, 8).with_element("span.btn-more"),
            event(EventKind::Scroll, 30),
        ]);
        assert!(insights.is_empty());
    }

    #[test]
    fn test_element_missing() {
        let insights = detect(vec![
            page(0, "/features"),
            event(EventKind::DeadClick, 5),
            event(EventKind::Scroll, 30),
        ]);

        assert_eq!(insights.len(), 1);
        assert!(insights[0]
            .description
            .contains("was on \"a non-interactive element\""));
        assert_eq!(insights[0].element, None);
    }

    #[test]
    fn test_short_final_page() {
        let insights = detect(vec![
            page(0, "/features"),
            event(EventKind::Click, 5).with_element("div.card"),
        ]);
        assert!(insights.is_empty());
    }

    #[test]
    fn test_final_page_without_url() {
        let insights = detect(vec![
            Event::new(EventKind::PageView, at(0)),
            event(EventKind::Click, 5).with_element("div.card"),
            event(EventKind::Scroll, 30),
        ]);
        assert!(insights.is_empty());
    }
}
