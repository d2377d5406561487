//! Exit-intent detection
//!
//! Classifies why the visitor left by looking at the end of the session. The
//! prioritized rules form a decision table: they are evaluated top to bottom
//! and the first rule that applies is the only one reported. Rules in the
//! independent table are evaluated on their own regardless of that outcome.

use super::{DetectorContext, PatternDetector};
use crate::error::AnalysisError;
use crate::types::{Event, EventKind, Insight, InsightType, Severity};
use chrono::{DateTime, Duration, Utc};

const BOUNCE_MAX_SECS: i64 = 10;
const EXIT_WINDOW_MS: i64 = 15_000;
const LOST_MIN_PAGES: usize = 6;
const LOST_MIN_SECS: i64 = 120;

/// Facts about the end of a session that exit rules decide on
#[derive(Debug, Clone)]
pub struct ExitFacts<'a> {
    /// URL of the final page view, empty when unknown
    pub last_url: &'a str,
    pub page_count: usize,
    /// Session duration rounded to whole seconds
    pub duration_secs: i64,
    pub session_end: DateTime<Utc>,
    /// Latest JS error inside the exit window
    pub last_error: Option<&'a Event>,
    /// Latest rage click inside the exit window
    pub last_rage_click: Option<&'a Event>,
    /// Final page matches a conversion-page pattern
    pub on_conversion_page: bool,
}

impl<'a> ExitFacts<'a> {
    /// Gather the facts; `None` when the session has no page views
    pub fn gather(ctx: &DetectorContext<'a>) -> Result<Option<Self>, AnalysisError> {
        let Some(last_page) = ctx.timeline.page_views().last() else {
            return Ok(None);
        };
        let session_end = ctx.session_end()?;
        let window_start = session_end - Duration::milliseconds(EXIT_WINDOW_MS);
        let last_in_window = |kind: EventKind| {
            ctx.timeline
                .events_of(kind)
                .filter(|e| e.timestamp >= window_start)
                .last()
        };
        let last_url = last_page.url.as_deref().unwrap_or("");

        Ok(Some(Self {
            last_url,
            page_count: ctx.timeline.page_views().len(),
            duration_secs: ctx.timeline.duration_secs(),
            session_end,
            last_error: last_in_window(EventKind::JsError),
            last_rage_click: last_in_window(EventKind::RageClick),
            on_conversion_page: ctx.patterns.conversion_page.is_match(last_url),
        }))
    }

    fn exit_insight(&self, severity: Severity, title: impl Into<String>) -> Insight {
        Insight::new(InsightType::ExitIntent, severity, title)
            .at(self.session_end)
            .with_page(Some(self.last_url))
    }
}

/// One row of the exit decision table
#[derive(Clone, Copy)]
pub struct ExitRule {
    pub name: &'static str,
    applies: fn(&ExitFacts<'_>) -> bool,
    build: fn(&ExitFacts<'_>) -> Insight,
}

impl ExitRule {
    pub const fn new(
        name: &'static str,
        applies: fn(&ExitFacts<'_>) -> bool,
        build: fn(&ExitFacts<'_>) -> Insight,
    ) -> Self {
        Self {
            name,
            applies,
            build,
        }
    }

    /// Build the insight when the rule applies
    pub fn evaluate(&self, facts: &ExitFacts<'_>) -> Option<Insight> {
        (self.applies)(facts).then(|| (self.build)(facts))
    }
}

impl std::fmt::Debug for ExitRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitRule").field("name", &self.name).finish()
    }
}

fn bounce() -> ExitRule {
    ExitRule::new(
        "bounce",
        |f| f.duration_secs < BOUNCE_MAX_SECS && f.page_count == 1,
        |f| {
            f.exit_insight(Severity::Medium, "Bounce - content mismatch")
                .with_description(format!(
                    "Session lasted only {}s with a single page view, suggesting the content did not match the user's expectations.",
                    f.duration_secs
                ))
                .with_recommendation(
                    "Review the landing page content and traffic sources. Ensure the page matches ad/search intent.",
                )
        },
    )
}

fn error_driven() -> ExitRule {
    ExitRule::new(
        "error_driven",
        |f| f.last_error.is_some(),
        |f| {
            let message = f
                .last_error
                .and_then(|e| e.message.as_deref())
                .unwrap_or("Unknown error");
            f.exit_insight(Severity::High, "Error-driven exit")
                .with_description(format!(
                    "User left the site shortly after encountering an error: \"{}\" on \"{}\".",
                    message, f.last_url
                ))
                .with_recommendation("Fix the JavaScript error to prevent users from leaving.")
        },
    )
}

fn frustration_driven() -> ExitRule {
    ExitRule::new(
        "frustration_driven",
        |f| f.last_rage_click.is_some(),
        |f| {
            let element = f
                .last_rage_click
                .and_then(|e| e.element.as_deref())
                .unwrap_or("unknown element");
            f.exit_insight(Severity::High, "Frustration-driven exit")
                .with_description(format!(
                    "User left after rage-clicking on \"{}\". The last rage click was on \"{}\".",
                    f.last_url, element
                ))
                .with_recommendation(
                    "Investigate what the user was trying to do and ensure the interface is responsive.",
                )
        },
    )
}

fn abandoned_conversion_page() -> ExitRule {
    ExitRule::new(
        "abandoned_conversion_page",
        |f| f.on_conversion_page,
        |f| {
            f.exit_insight(Severity::High, format!("Abandoned at {}", f.last_url))
                .with_description(format!(
                    "User was on \"{}\" (a conversion-critical page) when they left the site.",
                    f.last_url
                ))
                .with_recommendation(
                    "Review the page for friction points. Consider exit-intent popups, simplified checkout, or trust badges.",
                )
        },
    )
}

fn could_not_find() -> ExitRule {
    ExitRule::new(
        "could_not_find",
        |f| f.page_count >= LOST_MIN_PAGES && f.duration_secs > LOST_MIN_SECS,
        |f| {
            let minutes = (f.duration_secs as f64 / 60.0).round() as i64;
            f.exit_insight(Severity::Low, "Could not find what they needed")
                .with_description(format!(
                    "User viewed {} pages over {}m but still left from \"{}\".",
                    f.page_count, minutes, f.last_url
                ))
                .with_recommendation(
                    "Consider improving site search, navigation, or adding a chatbot to help users find content.",
                )
        },
    )
}

/// Exit-intent detector driven by two rule tables
#[derive(Debug, Clone)]
pub struct ExitIntentDetector {
    /// Evaluated in order, first match wins
    prioritized: Vec<ExitRule>,
    /// Always evaluated
    independent: Vec<ExitRule>,
}

impl ExitIntentDetector {
    pub fn new(prioritized: Vec<ExitRule>, independent: Vec<ExitRule>) -> Self {
        Self {
            prioritized,
            independent,
        }
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.prioritized
            .iter()
            .chain(&self.independent)
            .map(|rule| rule.name)
    }
}

impl Default for ExitIntentDetector {
    fn default() -> Self {
        Self::new(
            vec![
                bounce(),
                error_driven(),
                frustration_driven(),
                abandoned_conversion_page(),
            ],
            vec![could_not_find()],
        )
    }
}

impl PatternDetector for ExitIntentDetector {
    fn name(&self) -> &'static str {
        "exit_intent"
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
        let Some(facts) = ExitFacts::gather(ctx)? else {
            return Ok(Vec::new());
        };

        let mut insights: Vec<Insight> = self
            .prioritized
            .iter()
            .find_map(|rule| rule.evaluate(&facts))
            .into_iter()
            .collect();
        insights.extend(self.independent.iter().filter_map(|rule| rule.evaluate(&facts)));
        Ok(insights)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use pretty_assertions::assert_eq;

    fn detect(events: Vec<Event>) -> Vec<Insight> {
        let tl = timeline(events);
        ExitIntentDetector::default()
            .detect(&DetectorContext::new(&tl, patterns()))
            .unwrap()
    }

    #[test]
    fn test_rule_order() {
        let names: Vec<_> = ExitIntentDetector::default().rule_names().collect();
        assert_eq!(
            names,
            vec![
                "bounce",
                "error_driven",
                "frustration_driven",
                "abandoned_conversion_page",
                "could_not_find"
            ]
        );
    }

    #[test]
    fn test_no_page_views() {
        let insights = detect(vec![event(EventKind::Click, 0), event(EventKind::Click, 3)]);
        assert!(insights.is_empty());
    }

    #[test]
    fn test_bounce() {
        let insights = detect(vec![page(0, "/blog/post"), event(EventKind::Scroll, 5)]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Bounce - content mismatch");
        assert_eq!(insights[0].severity, Severity::Medium);
        assert_eq!(insights[0].timestamp, Some(at(5)));
        assert_eq!(insights[0].page.as_deref(), Some("/blog/post"));
    }

    #[test]
    fn test_bounce_takes_priority_over_conversion_page() {
        let insights = detect(vec![page(0, "/cart"), event(EventKind::Click, 4)]);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Bounce - content mismatch");
    }

    #[test]
    fn test_error_driven_exit() {
        let insights = detect(vec![
            page(0, "/"),
            page(20, "/checkout"),
            event(EventKind::JsError, 50).with_message("first"),
            event(EventKind::JsError, 55).with_message("Payment widget failed"),
            event(EventKind::Click, 60),
        ]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Error-driven exit");
        assert!(insights[0].description.contains("\"Payment widget failed\" on \"/checkout\""));
    }

    #[test]
    fn test_error_without_message() {
        let insights = detect(vec![page(0, "/"), event(EventKind::JsError, 50)]);
        assert!(insights[0].description.contains("\"Unknown error\""));
    }

    #[test]
    fn test_frustration_driven_exit() {
        let insights = detect(vec![
            page(0, "/pricing"),
            event(EventKind::RageClick, 40),
            event(EventKind::Click, 50),
        ]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Frustration-driven exit");
        assert!(insights[0].description.ends_with("\"unknown element\"."));
    }

    #[test]
    fn test_abandoned_at_conversion_page() {
        let insights = detect(vec![page(0, "/"), page(10, "/product/7"), event(EventKind::Scroll, 40)]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Abandoned at /product/7");
        assert_eq!(insights[0].severity, Severity::High);
    }

    #[test]
    fn test_could_not_find_is_independent() {
        let mut events: Vec<Event> = (0..6).map(|i| page(i * 30, &format!("/docs/{i}"))).collect();
        events.push(page(180, "/order/status"));
        events.push(event(EventKind::Scroll, 200));
        let insights = detect(events);

        let titles: Vec<_> = insights.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Abandoned at /order/status", "Could not find what they needed"]
        );
        assert!(insights[1].description.contains("viewed 7 pages over 3m"));
    }
}
