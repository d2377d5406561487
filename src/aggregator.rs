//! Insight aggregation
//!
//! Folds the detector candidates into the final insight list: deduplicated by
//! `(type, title, page)` keeping the first occurrence, then ordered by
//! severity with detector emission order preserved among equals.

use crate::types::Insight;
use std::collections::HashSet;

pub struct InsightAggregator;

impl InsightAggregator {
    pub fn aggregate(candidates: Vec<Insight>) -> Vec<Insight> {
        let mut seen = HashSet::new();
        let mut insights: Vec<Insight> = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let key = {
                let (kind, title, page) = candidate.dedup_key();
                (kind, title.to_string(), page.to_string())
            };
            if seen.insert(key) {
                insights.push(candidate);
            }
        }

        // stable
        insights.sort_by_key(|i| i.severity.rank());
        insights
    }
}
