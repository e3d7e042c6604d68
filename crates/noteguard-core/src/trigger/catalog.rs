//! Ordered registry of trigger rules.

use chrono::{DateTime, Utc};

use crate::catalog::CatalogError;

use super::rule::{TriggerRule, TriggerRulePatch};

#[derive(Debug, Clone)]
struct Registered {
    seq: u64,
    rule: TriggerRule,
}

/// Rules kept in evaluation order: ascending priority, then registration
/// order.
#[derive(Debug, Clone, Default)]
pub struct TriggerRuleCatalog {
    entries: Vec<Registered>,
    next_seq: u64,
}

impl TriggerRuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(
        rules: impl IntoIterator<Item = TriggerRule>,
        now: DateTime<Utc>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for rule in rules {
            catalog.add(rule, now)?;
        }
        Ok(catalog)
    }

    /// Register a rule, stamping its creation time. Duplicate ids are
    /// rejected.
    pub fn add(&mut self, mut rule: TriggerRule, now: DateTime<Utc>) -> Result<(), CatalogError> {
        rule.validate()?;

        if self.contains(&rule.id) {
            return Err(CatalogError::DuplicateId(rule.id));
        }

        rule.metadata.created_at = now;
        rule.metadata.updated_at = now;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Registered { seq, rule });
        self.sort();
        Ok(())
    }

    /// Apply a patch. The patched rule is validated before it replaces the
    /// current one, so a bad patch leaves the catalog untouched.
    pub fn update(
        &mut self,
        id: &str,
        patch: &TriggerRulePatch,
        now: DateTime<Utc>,
    ) -> Result<TriggerRule, CatalogError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.rule.id == id)
            .ok_or_else(|| CatalogError::UnknownRule(id.to_string()))?;

        let mut updated = patch.apply_to(&entry.rule);
        updated.validate()?;
        updated.metadata.updated_at = now;

        entry.rule = updated.clone();
        self.sort();
        Ok(updated)
    }

    /// Remove a rule. Unknown ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<TriggerRule> {
        let index = self.entries.iter().position(|e| e.rule.id == id)?;
        Some(self.entries.remove(index).rule)
    }

    pub fn get(&self, id: &str) -> Option<&TriggerRule> {
        self.entries.iter().map(|e| &e.rule).find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ordered(&self) -> impl Iterator<Item = &TriggerRule> {
        self.entries.iter().map(|e| &e.rule)
    }

    /// Enabled rules in evaluation order.
    pub fn enabled(&self) -> impl Iterator<Item = &TriggerRule> {
        self.ordered().filter(|r| r.enabled)
    }

    /// Bump the trigger counter. Returns false if the rule was removed in
    /// the meantime.
    pub fn record_trigger(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        match self.entries.iter_mut().find(|e| e.rule.id == id) {
            Some(entry) => {
                entry.rule.metadata.trigger_count += 1;
                entry.rule.metadata.last_triggered = Some(now);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sort(&mut self) {
        self.entries.sort_by_key(|e| (e.rule.priority, e.seq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::rule::{
        ConditionValue, RuleMetadata, TriggerAction, TriggerActionType, TriggerCondition,
        TriggerConditionType, TriggerOperator,
    };

    fn rule(id: &str, priority: u8) -> TriggerRule {
        TriggerRule {
            id: id.to_string(),
            name: format!("rule {}", id),
            enabled: true,
            priority,
            conditions: vec![TriggerCondition::new(
                TriggerConditionType::ContentLength,
                TriggerOperator::GreaterThan,
                ConditionValue::Number(10.0),
            )],
            actions: vec![TriggerAction::new(TriggerActionType::LogEvent)],
            metadata: RuleMetadata::default(),
        }
    }

    fn ids(catalog: &TriggerRuleCatalog) -> Vec<&str> {
        catalog.ordered().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_add_stamps_metadata_and_orders() {
        let now = Utc::now();
        let catalog =
            TriggerRuleCatalog::from_rules([rule("b", 5), rule("a", 2), rule("c", 2)], now).unwrap();

        assert_eq!(ids(&catalog), vec!["a", "c", "b"]);
        let a = catalog.get("a").unwrap();
        assert_eq!(a.metadata.created_at, now);
        assert_eq!(a.metadata.trigger_count, 0);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = TriggerRuleCatalog::new();
        catalog.add(rule("a", 1), Utc::now()).unwrap();
        assert!(matches!(
            catalog.add(rule("a", 3), Utc::now()),
            Err(CatalogError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_update_unknown_rule() {
        let mut catalog = TriggerRuleCatalog::new();
        let err = catalog
            .update("ghost", &TriggerRulePatch::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownRule(id) if id == "ghost"));
    }

    #[test]
    fn test_invalid_patch_leaves_rule_untouched() {
        let mut catalog = TriggerRuleCatalog::from_rules([rule("a", 1)], Utc::now()).unwrap();
        let patch = TriggerRulePatch {
            priority: Some(42),
            ..Default::default()
        };
        assert!(catalog.update("a", &patch, Utc::now()).is_err());
        assert_eq!(catalog.get("a").unwrap().priority, 1);
    }

    #[test]
    fn test_disabled_rules_skipped() {
        let mut catalog =
            TriggerRuleCatalog::from_rules([rule("a", 1), rule("b", 2)], Utc::now()).unwrap();
        let patch = TriggerRulePatch {
            enabled: Some(false),
            ..Default::default()
        };
        catalog.update("a", &patch, Utc::now()).unwrap();

        let enabled: Vec<_> = catalog.enabled().map(|r| r.id.as_str()).collect();
        assert_eq!(enabled, vec!["b"]);
    }

    #[test]
    fn test_record_trigger() {
        let now = Utc::now();
        let mut catalog = TriggerRuleCatalog::from_rules([rule("a", 1)], now).unwrap();

        assert!(catalog.record_trigger("a", now));
        assert!(catalog.record_trigger("a", now));
        assert!(!catalog.record_trigger("ghost", now));

        let meta = &catalog.get("a").unwrap().metadata;
        assert_eq!(meta.trigger_count, 2);
        assert_eq!(meta.last_triggered, Some(now));
    }
}
