//! Pure evaluation of trigger conditions against a context.
//!
//! Conditions that need data from outside the note (batch size, cost,
//! sentiment, concept count) are reported as [`ConditionCheck::NeedsSignal`]
//! and resolved by the caller.

use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::clock::elapsed_between;

use super::context::TriggerContext;
use super::rule::{ConditionValue, TriggerCondition, TriggerConditionType, TriggerOperator};

/// Externally supplied measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    BatchSize,
    CostEstimate,
    Sentiment,
    ConceptCount,
}

impl SignalKind {
    pub fn for_condition(kind: TriggerConditionType) -> Option<Self> {
        match kind {
            TriggerConditionType::BatchSize => Some(Self::BatchSize),
            TriggerConditionType::CostThreshold => Some(Self::CostEstimate),
            TriggerConditionType::SentimentThreshold => Some(Self::Sentiment),
            TriggerConditionType::ConceptCount => Some(Self::ConceptCount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionCheck {
    Decided(bool),
    NeedsSignal(SignalKind),
}

/// Evaluate what can be decided from the context alone.
pub fn check_condition(
    condition: &TriggerCondition,
    context: &TriggerContext,
    now: DateTime<Utc>,
) -> ConditionCheck {
    let decided = match condition.kind {
        TriggerConditionType::ContentLength => {
            let length = context.note_content.chars().count() as f64;
            compare_number(condition, length)
        }

        TriggerConditionType::TimeInterval => {
            let elapsed = elapsed_between(context.timestamp, now).as_millis() as f64;
            compare_number(condition, elapsed)
        }

        TriggerConditionType::KeywordPresence => keyword_presence(condition, &context.note_content),

        TriggerConditionType::ContentChange => {
            let ratio = content_change_ratio(
                &context.note_content,
                context.previous_content.as_deref(),
            );
            compare_number(condition, ratio)
        }

        TriggerConditionType::BatchSize
        | TriggerConditionType::CostThreshold
        | TriggerConditionType::SentimentThreshold
        | TriggerConditionType::ConceptCount => {
            return match SignalKind::for_condition(condition.kind) {
                Some(signal) => ConditionCheck::NeedsSignal(signal),
                None => ConditionCheck::Decided(false),
            };
        }

        TriggerConditionType::Unknown => {
            tracing::warn!("Unknown trigger condition type, evaluating as false");
            false
        }
    };

    ConditionCheck::Decided(decided)
}

/// Compare an externally supplied value. A missing signal never matches.
pub fn compare_signal(condition: &TriggerCondition, signal: Option<f64>) -> bool {
    match signal {
        Some(value) if value.is_finite() => compare_number(condition, value),
        _ => false,
    }
}

/// Fraction of condition weight that matched. `matched` is parallel to
/// `conditions`.
pub fn confidence(conditions: &[TriggerCondition], matched: &[bool]) -> f64 {
    let total: f64 = conditions.iter().map(|c| c.weight).sum();
    if total <= 0.0 {
        return 1.0;
    }

    let hit: f64 = conditions
        .iter()
        .zip(matched)
        .filter(|(_, &m)| m)
        .map(|(c, _)| c.weight)
        .sum();

    hit / total
}

/// Relative size change between two versions of the content.
pub fn content_change_ratio(current: &str, previous: Option<&str>) -> f64 {
    let current_len = current.chars().count() as f64;
    match previous {
        Some(previous) => {
            let previous_len = previous.chars().count() as f64;
            (current_len - previous_len).abs() / previous_len.max(1.0)
        }
        None if current_len > 0.0 => 1.0,
        None => 0.0,
    }
}

fn compare_number(condition: &TriggerCondition, lhs: f64) -> bool {
    match condition.value {
        ConditionValue::Number(rhs) => condition.operator.compare(lhs, rhs).unwrap_or(false),
        _ => false,
    }
}

fn keyword_presence(condition: &TriggerCondition, content: &str) -> bool {
    let terms = condition.value.as_terms();
    let haystack = content.to_lowercase();

    match condition.operator {
        TriggerOperator::Contains => terms
            .iter()
            .any(|t| haystack.contains(&t.to_lowercase())),
        TriggerOperator::NotContains => !terms
            .iter()
            .any(|t| haystack.contains(&t.to_lowercase())),
        TriggerOperator::Matches => terms.iter().any(|pattern| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => re.is_match(content),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "Invalid keyword pattern");
                    false
                }
            }
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::context::ChangeType;
    use chrono::Duration;

    fn ctx(content: &str) -> TriggerContext {
        TriggerContext::new("u1", ChangeType::Updated, Utc::now()).with_note("n1", content)
    }

    fn numeric(kind: TriggerConditionType, op: TriggerOperator, value: f64) -> TriggerCondition {
        TriggerCondition::new(kind, op, ConditionValue::Number(value))
    }

    fn keyword(op: TriggerOperator, value: ConditionValue) -> TriggerCondition {
        TriggerCondition::new(TriggerConditionType::KeywordPresence, op, value)
    }

    #[test]
    fn test_content_length() {
        let cond = numeric(
            TriggerConditionType::ContentLength,
            TriggerOperator::GreaterThan,
            500.0,
        );
        let long = ctx(&"a".repeat(600));
        let short = ctx(&"a".repeat(100));

        assert_eq!(check_condition(&cond, &long, Utc::now()), ConditionCheck::Decided(true));
        assert_eq!(check_condition(&cond, &short, Utc::now()), ConditionCheck::Decided(false));
    }

    #[test]
    fn test_content_length_counts_chars() {
        let cond = numeric(
            TriggerConditionType::ContentLength,
            TriggerOperator::Equals,
            3.0,
        );
        assert_eq!(check_condition(&cond, &ctx("日本語"), Utc::now()), ConditionCheck::Decided(true));
    }

    #[test]
    fn test_time_interval() {
        let cond = numeric(
            TriggerConditionType::TimeInterval,
            TriggerOperator::GreaterThanOrEqual,
            60_000.0,
        );
        let context = ctx("x");
        let later = context.timestamp + Duration::minutes(2);

        assert_eq!(check_condition(&cond, &context, later), ConditionCheck::Decided(true));
        assert_eq!(
            check_condition(&cond, &context, context.timestamp),
            ConditionCheck::Decided(false)
        );
    }

    #[test]
    fn test_keyword_contains_case_insensitive() {
        let cond = keyword(
            TriggerOperator::Contains,
            ConditionValue::List(vec!["Deadline".into(), "urgent".into()]),
        );
        assert_eq!(
            check_condition(&cond, &ctx("the DEADLINE is friday"), Utc::now()),
            ConditionCheck::Decided(true)
        );
        assert_eq!(
            check_condition(&cond, &ctx("nothing here"), Utc::now()),
            ConditionCheck::Decided(false)
        );
    }

    #[test]
    fn test_keyword_not_contains() {
        let cond = keyword(TriggerOperator::NotContains, ConditionValue::Text("draft".into()));
        assert_eq!(
            check_condition(&cond, &ctx("final version"), Utc::now()),
            ConditionCheck::Decided(true)
        );
        assert_eq!(
            check_condition(&cond, &ctx("DRAFT notes"), Utc::now()),
            ConditionCheck::Decided(false)
        );
    }

    #[test]
    fn test_keyword_matches_regex() {
        let cond = keyword(
            TriggerOperator::Matches,
            ConditionValue::Text(r"todo:\s*\w+".into()),
        );
        assert_eq!(
            check_condition(&cond, &ctx("TODO: write tests"), Utc::now()),
            ConditionCheck::Decided(true)
        );
    }

    #[test]
    fn test_content_change_ratio() {
        assert_eq!(content_change_ratio("abcdef", Some("abc")), 1.0);
        assert_eq!(content_change_ratio("abc", Some("abc")), 0.0);
        assert_eq!(content_change_ratio("abc", None), 1.0);
        assert_eq!(content_change_ratio("", None), 0.0);
        assert_eq!(content_change_ratio("ab", Some("")), 2.0);
    }

    #[test]
    fn test_signal_conditions_defer() {
        let cond = numeric(
            TriggerConditionType::SentimentThreshold,
            TriggerOperator::LessThan,
            -0.5,
        );
        assert_eq!(
            check_condition(&cond, &ctx("x"), Utc::now()),
            ConditionCheck::NeedsSignal(SignalKind::Sentiment)
        );
        assert!(compare_signal(&cond, Some(-0.8)));
        assert!(!compare_signal(&cond, None));
    }

    #[test]
    fn test_unknown_condition_is_false() {
        let cond = numeric(TriggerConditionType::Unknown, TriggerOperator::GreaterThan, 1.0);
        assert_eq!(check_condition(&cond, &ctx("x"), Utc::now()), ConditionCheck::Decided(false));
    }

    #[test]
    fn test_confidence_is_weight_fraction() {
        let conditions = vec![
            numeric(TriggerConditionType::ContentLength, TriggerOperator::GreaterThan, 1.0)
                .with_weight(1.0),
            numeric(TriggerConditionType::ContentLength, TriggerOperator::GreaterThan, 1.0)
                .with_weight(3.0),
        ];
        assert_eq!(confidence(&conditions, &[true, true]), 1.0);
        assert_eq!(confidence(&conditions, &[false, true]), 0.75);

        let weightless = vec![conditions[0].clone().with_weight(0.0)];
        assert_eq!(confidence(&weightless, &[true]), 1.0);
    }
}
