//! Day-by-day trends over a window of analyzed sessions
//!
//! Sessions are bucketed by the calendar day (UTC) of their `started_at`.
//! The window ends on a caller-supplied day so results do not depend on the
//! wall clock. Issues are compared between the older and the newer half of
//! the window to surface the ones that are growing.

use crate::normalizer::parse_timestamp_str;
use crate::overview::{percentage, rounded_mean, SessionAnalysis, ATTENTION_FRUSTRATION};
use crate::types::{InsightType, Severity};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_TREND_DAYS: u32 = 30;
const MAX_TREND_DAYS: u32 = 90;
const TOP_GROWING: usize = 10;

/// One day of the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub sessions: usize,
    /// Sessions with a frustration score of 40 or more
    pub frustrated_sessions: usize,
    pub frustration_rate: u8,
    pub avg_engagement: u8,
    pub avg_frustration: u8,
    pub errors: usize,
    /// JS errors per 100 sessions; not capped
    pub error_rate: u64,
}

/// An issue seen more often in the newer half of the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowingIssue {
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub title: String,
    pub severity: Severity,
    /// Percent increase over the older half; 100 when it is new
    pub growth: i64,
    pub recent_count: usize,
    pub previous_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trends {
    pub days: u32,
    pub daily: Vec<DailyTrend>,
    pub top_growing_issues: Vec<GrowingIssue>,
}

#[derive(Debug, Default)]
struct DayBucket {
    sessions: usize,
    frustrated: usize,
    errors: usize,
    engagement: Vec<u8>,
    frustration: Vec<u8>,
}

#[derive(Debug)]
struct IssueGrowth {
    insight_type: InsightType,
    title: String,
    severity: Severity,
    first_half: usize,
    second_half: usize,
}

impl Trends {
    /// Roll sessions up over the `days` ending on `today` (clamped to 1..=90).
    ///
    /// Sessions without a parsable `started_at`, or starting outside the
    /// window, are ignored.
    pub fn from_sessions(sessions: &[SessionAnalysis], days: u32, today: NaiveDate) -> Self {
        let days = days.clamp(1, MAX_TREND_DAYS);
        if sessions.is_empty() {
            return Self {
                days,
                daily: Vec::new(),
                top_growing_issues: Vec::new(),
            };
        }

        let first_day = today - Duration::days(i64::from(days) - 1);
        let window_end = Utc.from_utc_datetime(&(today + Duration::days(1)).and_time(NaiveTime::MIN));
        let midpoint = window_end - Duration::hours(12 * i64::from(days));

        let mut buckets: Vec<DayBucket> = (0..days).map(|_| DayBucket::default()).collect();
        let mut issues: Vec<IssueGrowth> = Vec::new();
        let mut issue_index: HashMap<(InsightType, &str), usize> = HashMap::new();

        for session in sessions {
            let Some(started) = started_at(session) else {
                continue;
            };
            let offset = (started.date_naive() - first_day).num_days();
            let Some(bucket) = usize::try_from(offset).ok().and_then(|i| buckets.get_mut(i)) else {
                continue;
            };

            let score = session.result.score;
            bucket.sessions += 1;
            bucket.engagement.push(score.engagement);
            bucket.frustration.push(score.frustration);
            bucket.errors += session.errors;
            if score.frustration >= ATTENTION_FRUSTRATION {
                bucket.frustrated += 1;
            }

            let recent = started >= midpoint;
            for insight in &session.result.insights {
                if matches!(insight.severity, Severity::Low | Severity::Info) {
                    continue;
                }
                let i = *issue_index
                    .entry((insight.insight_type, insight.title.as_str()))
                    .or_insert_with(|| {
                        issues.push(IssueGrowth {
                            insight_type: insight.insight_type,
                            title: insight.title.clone(),
                            severity: insight.severity,
                            first_half: 0,
                            second_half: 0,
                        });
                        issues.len() - 1
                    });
                if recent {
                    issues[i].second_half += 1;
                } else {
                    issues[i].first_half += 1;
                }
            }
        }

        let daily = buckets
            .into_iter()
            .enumerate()
            .map(|(i, bucket)| DailyTrend {
                date: first_day + Duration::days(i as i64),
                sessions: bucket.sessions,
                frustrated_sessions: bucket.frustrated,
                frustration_rate: percentage(bucket.frustrated, bucket.sessions),
                avg_engagement: rounded_mean(bucket.engagement.into_iter()),
                avg_frustration: rounded_mean(bucket.frustration.into_iter()),
                errors: bucket.errors,
                error_rate: if bucket.sessions > 0 {
                    (bucket.errors as f64 / bucket.sessions as f64 * 100.0).round() as u64
                } else {
                    0
                },
            })
            .collect();

        let mut growing: Vec<GrowingIssue> = issues
            .into_iter()
            .filter(|issue| issue.second_half > issue.first_half)
            .map(|issue| GrowingIssue {
                growth: growth(issue.first_half, issue.second_half),
                insight_type: issue.insight_type,
                title: issue.title,
                severity: issue.severity,
                recent_count: issue.second_half,
                previous_count: issue.first_half,
            })
            .collect();
        growing.sort_by(|a, b| b.growth.cmp(&a.growth));
        growing.truncate(TOP_GROWING);

        Self {
            days,
            daily,
            top_growing_issues: growing,
        }
    }
}

fn started_at(session: &SessionAnalysis) -> Option<DateTime<Utc>> {
    session
        .meta
        .started_at
        .as_deref()
        .and_then(|s| parse_timestamp_str(s.trim()))
}

fn growth(previous: usize, recent: usize) -> i64 {
    if previous == 0 {
        return 100;
    }
    ((recent as f64 - previous as f64) / previous as f64 * 100.0).round() as i64
}
