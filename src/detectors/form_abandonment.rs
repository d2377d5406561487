//! Form abandonment detection

use super::{DetectorContext, PatternDetector};
use crate::error::AnalysisError;
use crate::types::{EventKind, Insight, InsightType, Severity};
use std::collections::{HashMap, HashSet};

const LONG_FORM_FIELDS: usize = 3;

pub struct FormAbandonmentDetector;

impl FormAbandonmentDetector {
    /// Typed into fields but never submitted anything
    fn unsubmitted(ctx: &DetectorContext<'_>) -> Option<Insight> {
        let timeline = ctx.timeline;
        let first_input = timeline.events_of(EventKind::Input).next()?;
        if timeline.count_of(EventKind::FormSubmit) > 0 {
            return None;
        }

        let fields: HashSet<&str> = timeline
            .events_of(EventKind::Input)
            .filter_map(|e| e.field.as_deref())
            .filter(|f| !f.is_empty())
            .collect();
        let long_form = fields.len() >= LONG_FORM_FIELDS;
        // input without a resolvable field name still touched one field
        let field_count = fields.len().max(1);

        let (severity, recommendation) = if long_form {
            (
                Severity::High,
                "The form may be too long or confusing. Consider reducing the number of fields or adding progress indicators.",
            )
        } else {
            (
                Severity::Medium,
                "Review the form for friction points. Ensure validation messages are clear.",
            )
        };

        Some(
            Insight::new(InsightType::FormAbandonment, severity, "Form abandoned")
                .with_description(format!(
                    "User interacted with {} form field(s) but never submitted the form.",
                    field_count
                ))
                .with_recommendation(recommendation)
                .at(first_input.timestamp)
                .with_count(field_count),
        )
    }

    /// Fields focused and blurred again with no typing in between
    fn blurred_untouched(ctx: &DetectorContext<'_>) -> Vec<Insight> {
        // field -> received input since focus
        let mut open: HashMap<&str, bool> = HashMap::new();
        let mut insights = Vec::new();

        for event in ctx.timeline.events() {
            match event.action.as_deref() {
                Some("focus") => {
                    let field = event.element_str();
                    if !field.is_empty() {
                        open.insert(field, false);
                    }
                }
                Some("blur") => {
                    let field = event.element_str();
                    if let Some(had_input) = open.remove(field) {
                        if !had_input {
                            insights.push(
                                Insight::new(
                                    InsightType::FormAbandonment,
                                    Severity::Low,
                                    "Field label may be unclear",
                                )
                                .with_description(format!(
                                    "User focused on \"{}\" and left it without typing, suggesting the field label or purpose is unclear.",
                                    field
                                ))
                                .with_recommendation(
                                    "Review the field label, placeholder text, and consider adding helper text.",
                                )
                                .at(event.timestamp)
                                .with_element(Some(field)),
                            );
                        }
                    }
                }
                _ if event.kind == EventKind::Input => {
                    let typed_into = event.field.as_deref().unwrap_or("");
                    if let Some(had_input) = open.get_mut(typed_into) {
                        *had_input = true;
                    }
                }
                _ => {}
            }
        }

        insights
    }
}

impl PatternDetector for FormAbandonmentDetector {
    fn name(&self) -> &'static str {
        "form_abandonment"
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Insight>, AnalysisError> {
        let mut insights: Vec<Insight> = Self::unsubmitted(ctx).into_iter().collect();
        insights.extend(Self::blurred_untouched(ctx));
        Ok(insights)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::types::Event;

    fn detect(events: Vec<Event>) -> Vec<Insight> {
        let tl = timeline(events);
        FormAbandonmentDetector
            .detect(&DetectorContext::new(&tl, patterns()))
            .unwrap()
    }

    fn input(secs: i64, field: &str) -> Event {
        event(EventKind::Input, secs)
            .with_element(field)
            .with_value("x")
    }

    fn field_action(secs: i64, field: &str, action: &str) -> Event {
        event(EventKind::Other, secs)
            .with_element(field)
            .with_action(action)
    }

    #[test]
    fn test_long_form_abandoned() {
        let insights = detect(vec![
            page(0, "/signup"),
            input(1, "#name"),
            input(2, "#email"),
            input(3, "#email"),
            input(4, "#phone"),
        ]);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].severity, Severity::High);
        assert_eq!(insights[0].count, 3);
        assert_eq!(insights[0].timestamp, Some(at(1)));
    }

    #[test]
    fn test_short_form_abandoned() {
        let insights = detect(vec![input(1, "#email")]);
        assert_eq!(insights[0].severity, Severity::Medium);
        assert_eq!(insights[0].count, 1);
    }

    #[test]
    fn test_submitted_form_is_fine() {
        let insights = detect(vec![
            input(1, "#email"),
            event(EventKind::FormSubmit, 2),
        ]);
        assert!(insights.is_empty());
    }

    #[test]
    fn test_input_without_field_counts_one_field() {
        let insights = detect(vec![event(EventKind::Input, 1).with_value("x")]);
        assert!(insights[0].description.contains("with 1 form field(s)"));
        assert_eq!(insights[0].count, 1);
    }

    #[test]
    fn test_blur_without_input_each_occurrence() {
        let insights = detect(vec![
            field_action(1, "#coupon", "focus"),
            field_action(2, "#coupon", "blur"),
            field_action(3, "#vat", "focus"),
            field_action(4, "#vat", "blur"),
            field_action(5, "#coupon", "focus"),
            field_action(6, "#coupon", "blur"),
        ]);

        assert_eq!(insights.len(), 3);
        assert!(insights.iter().all(|i| i.title == "Field label may be unclear"));
        assert_eq!(insights[1].element.as_deref(), Some("#vat"));
    }

    #[test]
    fn test_blur_after_typing_is_fine() {
        let insights = detect(vec![
            field_action(1, "#email", "focus"),
            input(2, "#email"),
            field_action(3, "#email", "blur"),
            event(EventKind::FormSubmit, 4),
        ]);
        assert!(insights.is_empty());
    }
}
