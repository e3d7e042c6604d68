//! Heuristic ranking of alternative services.
//!
//! | Component | Contribution |
//! |-----------|--------------|
//! | availability | +100 if available, -100 otherwise |
//! | latency | `max(0, 100 - response_time_ms / 50)` |
//! | error rate | `100 * (1 - error_rate)` |
//! | failures | `-10` per consecutive failure |
//!
//! The total is clamped at zero.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::health::ServiceHealth;
use crate::types::ServiceKey;

/// Number of services returned by default.
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 3;

/// A candidate service with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredService {
    pub service: ServiceKey,
    pub score: f64,
    pub health: ServiceHealth,
}

pub fn score_service(health: &ServiceHealth) -> f64 {
    let availability = if health.available { 100.0 } else { -100.0 };
    let latency = (100.0 - health.response_time_ms / 50.0).max(0.0);
    let reliability = 100.0 * (1.0 - health.error_rate);
    let failures = 10.0 * f64::from(health.consecutive_failures);

    (availability + latency + reliability - failures).max(0.0)
}

/// Rank every service other than `original`, skipping excluded providers.
///
/// Sorted by descending score; equal scores prefer the faster service,
/// then the input order.
pub fn rank_services(
    candidates: &[ServiceHealth],
    original: &ServiceKey,
    exclude_providers: &[String],
    limit: usize,
) -> Vec<ScoredService> {
    let mut scored: Vec<ScoredService> = candidates
        .iter()
        .filter(|h| &h.service != original)
        .filter(|h| !exclude_providers.iter().any(|p| p == &h.service.provider))
        .map(|h| ScoredService {
            service: h.service.clone(),
            score: score_service(h),
            health: h.clone(),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.health
                    .response_time_ms
                    .partial_cmp(&b.health.response_time_ms)
                    .unwrap_or(Ordering::Equal)
            })
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallOutcome;
    use chrono::Utc;
    use proptest::prelude::*;

    fn health(provider: &str, model: &str, latency: f64, failures: u32) -> ServiceHealth {
        let now = Utc::now();
        let mut h = ServiceHealth::new(ServiceKey::new(provider, model), now);
        h.apply(&CallOutcome::success(latency), now);
        for _ in 0..failures {
            h.apply(&CallOutcome::failure("err"), now);
        }
        h
    }

    #[test]
    fn test_perfect_service_score() {
        let h = health("openai", "gpt-4o", 0.0, 0);
        assert_eq!(score_service(&h), 300.0);
    }

    #[test]
    fn test_score_components() {
        // unavailable, 2 failures, 1000ms: -100 + 80 + 80 - 20
        let h = health("openai", "gpt-4o", 1000.0, 2);
        assert!((score_service(&h) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        let h = health("openai", "gpt-4o", 20_000.0, 10);
        assert_eq!(score_service(&h), 0.0);
    }

    #[test]
    fn test_rank_excludes_original_and_providers() {
        let candidates = vec![
            health("anthropic", "haiku", 200.0, 0),
            health("openai", "gpt-4o", 100.0, 0),
            health("providerX", "m1", 50.0, 0),
            health("groq", "llama", 300.0, 0),
            health("ollama", "mistral", 900.0, 0),
        ];
        let original = ServiceKey::new("openai", "gpt-4o");

        let ranked = rank_services(&candidates, &original, &["providerX".to_string()], 3);
        assert_eq!(ranked.len(), 3);
        assert!(ranked.iter().all(|s| s.service.provider != "providerX"));
        assert!(ranked.iter().all(|s| s.service != original));
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(ranked[0].service.provider, "anthropic");
    }

    #[test]
    fn test_ties_keep_input_order() {
        let candidates = vec![
            health("a", "m", 100.0, 0),
            health("b", "m", 100.0, 0),
        ];
        let ranked = rank_services(&candidates, &ServiceKey::new("z", "m"), &[], 3);
        assert_eq!(ranked[0].service.provider, "a");
        assert_eq!(ranked[1].service.provider, "b");
    }

    proptest! {
        #[test]
        fn prop_faster_service_never_ranked_lower(
            slow in 0.0f64..20_000.0,
            delta in 0.001f64..5_000.0,
            failures in 0u32..12,
            slow_first in any::<bool>(),
        ) {
            let fast = slow - delta;
            prop_assume!(fast >= 0.0);

            let slow_health = health("slow", "m", slow, failures);
            let fast_health = health("fast", "m", fast, failures);
            let candidates = if slow_first {
                vec![slow_health, fast_health]
            } else {
                vec![fast_health, slow_health]
            };

            let ranked = rank_services(&candidates, &ServiceKey::new("origin", "m"), &[], 3);
            prop_assert_eq!(ranked[0].service.provider.as_str(), "fast");
        }
    }
}
