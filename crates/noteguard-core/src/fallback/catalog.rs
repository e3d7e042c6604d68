//! Ordered registry of fallback strategies.

use crate::catalog::CatalogError;

use super::strategy::FallbackStrategy;

#[derive(Debug, Clone)]
struct Registered {
    seq: u64,
    strategy: FallbackStrategy,
}

/// Strategies kept in evaluation order: ascending priority, then
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct FallbackStrategyCatalog {
    entries: Vec<Registered>,
    next_seq: u64,
}

impl FallbackStrategyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a list, validating each entry.
    pub fn from_strategies(
        strategies: impl IntoIterator<Item = FallbackStrategy>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for strategy in strategies {
            catalog.add(strategy)?;
        }
        Ok(catalog)
    }

    /// Register a new strategy. Duplicate ids are rejected.
    pub fn add(&mut self, strategy: FallbackStrategy) -> Result<(), CatalogError> {
        strategy.validate()?;

        if self.contains(&strategy.id) {
            return Err(CatalogError::DuplicateId(strategy.id));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Registered { seq, strategy });
        self.sort();
        Ok(())
    }

    /// Replace a registered strategy, keeping its registration order.
    pub fn update(&mut self, strategy: FallbackStrategy) -> Result<(), CatalogError> {
        strategy.validate()?;

        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.strategy.id == strategy.id)
            .ok_or_else(|| CatalogError::UnknownStrategy(strategy.id.clone()))?;
        entry.strategy = strategy;
        self.sort();
        Ok(())
    }

    /// Remove a strategy. Unknown ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<FallbackStrategy> {
        let index = self.entries.iter().position(|e| e.strategy.id == id)?;
        Some(self.entries.remove(index).strategy)
    }

    pub fn get(&self, id: &str) -> Option<&FallbackStrategy> {
        self.entries
            .iter()
            .map(|e| &e.strategy)
            .find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Strategies in evaluation order.
    pub fn ordered(&self) -> impl Iterator<Item = &FallbackStrategy> {
        self.entries.iter().map(|e| &e.strategy)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sort(&mut self) {
        self.entries
            .sort_by_key(|e| (e.strategy.priority, e.seq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::strategy::{
        FallbackAction, FallbackCondition, FallbackConditionType,
    };
    use crate::types::ComparisonOperator;
    use std::time::Duration;

    fn strategy(id: &str, priority: u32) -> FallbackStrategy {
        FallbackStrategy {
            id: id.to_string(),
            name: id.to_string(),
            priority,
            conditions: vec![FallbackCondition::new(
                FallbackConditionType::ErrorRate,
                ComparisonOperator::Gte,
                0.3,
            )],
            actions: vec![FallbackAction::UseCache],
            recovery_actions: vec![],
            cooldown_period: Duration::from_secs(60),
        }
    }

    fn ids(catalog: &FallbackStrategyCatalog) -> Vec<&str> {
        catalog.ordered().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_ordering_by_priority_then_registration() {
        let catalog = FallbackStrategyCatalog::from_strategies([
            strategy("late", 5),
            strategy("first", 1),
            strategy("second", 1),
            strategy("middle", 3),
        ])
        .unwrap();

        assert_eq!(ids(&catalog), vec!["first", "second", "middle", "late"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = FallbackStrategyCatalog::new();
        catalog.add(strategy("S1", 1)).unwrap();
        assert!(matches!(
            catalog.add(strategy("S1", 2)),
            Err(CatalogError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_update_reorders() {
        let mut catalog =
            FallbackStrategyCatalog::from_strategies([strategy("a", 1), strategy("b", 2)]).unwrap();
        catalog.update(strategy("a", 9)).unwrap();
        assert_eq!(ids(&catalog), vec!["b", "a"]);
    }

    #[test]
    fn test_update_unknown() {
        let mut catalog = FallbackStrategyCatalog::new();
        assert!(matches!(
            catalog.update(strategy("ghost", 1)),
            Err(CatalogError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut catalog = FallbackStrategyCatalog::from_strategies([strategy("a", 1)]).unwrap();
        assert!(catalog.remove("ghost").is_none());
        assert_eq!(catalog.len(), 1);
        assert!(catalog.remove("a").is_some());
        assert!(catalog.is_empty());
    }
}
