//! Narrative summary
//!
//! Assembles a short plain-language description of a session from the final
//! insight list, the scores and the session metadata. Every clause is optional;
//! missing data drops the clause rather than failing.

use crate::patterns::Patterns;
use crate::timeline::SessionTimeline;
use crate::types::{Insight, InsightType, Score, SessionMeta};

const PRODUCT_INTEREST_MIN_VIEWS: usize = 2;
const HEALTHY_ENGAGEMENT: u8 = 70;

/// Exit clause keyed on a phrase of the exit insight title, first match wins
const EXIT_CLAUSES: &[(&str, &str)] = &[
    ("Error-driven", "They left after encountering a JavaScript error."),
    ("Frustration-driven", "They left due to frustration."),
    (
        "Abandoned",
        "They abandoned the session at a critical conversion page.",
    ),
    (
        "Bounce",
        "The session was a bounce - the content likely did not match their expectations.",
    ),
];

/// Inputs the summary is built from
pub struct SummaryInput<'a> {
    pub timeline: &'a SessionTimeline,
    pub meta: &'a SessionMeta,
    /// Final insights, most severe first
    pub insights: &'a [Insight],
    pub score: Score,
    pub patterns: &'a Patterns,
}

pub struct SessionSummarizer;

impl SessionSummarizer {
    pub fn summarize(input: &SummaryInput<'_>) -> String {
        let clauses = [
            Some(opening(input)),
            behavior_clause(input.insights),
            product_interest(input),
            exit_clause(input.insights),
            closing(input),
        ];

        clauses.into_iter().flatten().collect::<Vec<_>>().join(" ")
    }
}

fn opening(input: &SummaryInput<'_>) -> String {
    let visitor = match input.meta.country.as_deref().filter(|c| !c.is_empty()) {
        Some(country) => format!("This visitor from {}", country),
        None => "This visitor".to_string(),
    };
    let pages = input.timeline.page_views().len();
    let plural = if pages == 1 { "" } else { "s" };

    format!(
        "{} spent {} browsing {} page{}.",
        visitor,
        format_duration(input.timeline.duration_ms()),
        pages,
        plural
    )
}

/// `"{m}m {s}s"`, or `"{s}s"` under a minute
fn format_duration(ms: i64) -> String {
    let ms = ms.max(0);
    let mins = ms / 60_000;
    let secs = (ms % 60_000) / 1_000;
    if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

fn behavior_clause(insights: &[Insight]) -> Option<String> {
    let mut frustrations = insights
        .iter()
        .filter(|i| i.insight_type == InsightType::Frustration);

    if let Some(top) = frustrations.next() {
        let title = top.title.to_lowercase();
        return Some(match top.page.as_deref() {
            Some(page) => format!("They showed frustration on {}: {}.", page, title),
            None => format!("They showed frustration: {}.", title),
        });
    }

    let engagements: Vec<&Insight> = insights
        .iter()
        .filter(|i| i.insight_type == InsightType::Engagement)
        .collect();
    if engagements.is_empty() {
        return None;
    }

    let pages: Vec<&str> = engagements
        .iter()
        .filter_map(|i| i.page.as_deref())
        .take(2)
        .collect();
    Some(if pages.is_empty() {
        "The session showed good overall engagement.".to_string()
    } else {
        format!("They showed strong engagement on {}.", pages.join(" and "))
    })
}

fn product_interest(input: &SummaryInput<'_>) -> Option<String> {
    let views = input
        .timeline
        .page_urls()
        .filter(|url| input.patterns.is_product_page(url))
        .count();
    (views >= PRODUCT_INTEREST_MIN_VIEWS)
        .then(|| format!("They showed high interest in product pages ({} views).", views))
}

fn exit_clause(insights: &[Insight]) -> Option<String> {
    let exit = insights
        .iter()
        .find(|i| i.insight_type == InsightType::ExitIntent)?;
    EXIT_CLAUSES
        .iter()
        .find(|(phrase, _)| exit.title.contains(phrase))
        .map(|(_, clause)| clause.to_string())
}

fn closing(input: &SummaryInput<'_>) -> Option<String> {
    match input.insights.iter().find(|i| i.severity.is_urgent()) {
        Some(urgent) if !urgent.recommendation.is_empty() => {
            Some(format!("Recommendation: {}", urgent.recommendation))
        }
        Some(_) => None,
        None if input.score.engagement > HEALTHY_ENGAGEMENT => {
            Some("Overall, this was a healthy session with good engagement.".to_string())
        }
        None => None,
    }
}
