//! Trigger engine: evaluates note events against the rule catalog and
//! dispatches the actions of matching rules.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use noteguard_core::trigger::{check_condition, compare_signal, confidence, ConditionCheck};
use noteguard_core::{
    AuditLog, CatalogError, Clock, ExecutedAction, MatchedRule, SignalKind, TriggerAction,
    TriggerContext, TriggerLogEntry, TriggerResult, TriggerRule, TriggerRuleCatalog,
    TriggerRulePatch,
};

use crate::config::RuntimeConfig;
use crate::executor::{
    execute_with_timeout, ActionCommand, ActionExecutor, TriggerCommand, TriggerInvocation,
};
use crate::signals::TriggerSignals;

pub struct TriggerEngine {
    rules: RwLock<TriggerRuleCatalog>,
    log: AuditLog<TriggerLogEntry>,
    executor: Arc<dyn ActionExecutor>,
    signals: Arc<dyn TriggerSignals>,
    clock: Arc<dyn Clock>,
    action_timeout: Duration,
    max_action_delay: Duration,
}

impl TriggerEngine {
    pub fn new(
        rules: TriggerRuleCatalog,
        executor: Arc<dyn ActionExecutor>,
        signals: Arc<dyn TriggerSignals>,
        clock: Arc<dyn Clock>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            rules: RwLock::new(rules),
            log: AuditLog::new(config.trigger_audit_capacity),
            executor,
            signals,
            clock,
            action_timeout: config.action_timeout,
            max_action_delay: config.max_action_delay,
        }
    }

    /// Evaluate every enabled rule against `context`.
    ///
    /// A rule matches only if all of its conditions hold. Actions of
    /// matching rules run in declared order; a failed action is recorded in
    /// the result and does not stop the rest.
    pub async fn evaluate(&self, context: TriggerContext) -> TriggerResult {
        let started = Instant::now();
        let now = self.clock.now();
        let rules: Vec<TriggerRule> = self.rules.read().enabled().cloned().collect();

        let mut result = TriggerResult::empty(context);

        for rule in &rules {
            let Some(matched) = self.match_rule(rule, &result.context, now).await else {
                continue;
            };

            self.rules.write().record_trigger(&rule.id, self.clock.now());
            tracing::debug!(
                rule = %rule.id,
                confidence = matched.confidence,
                "Trigger rule matched"
            );

            for action in &rule.actions {
                let executed = self.execute_action(rule, action, &result.context).await;
                result.executed_actions.push(executed);
            }
            result.matched_rules.push(matched);
        }

        result.triggered = !result.matched_rules.is_empty();
        result.sort_matches();
        result.processing_time = started.elapsed();

        if result.triggered {
            tracing::info!(
                user = %result.context.user_id,
                note = result.context.note_id.as_deref().unwrap_or(""),
                rules = result.matched_rules.len(),
                failed = result.failed_actions(),
                "Trigger rules fired"
            );
            self.log.append(TriggerLogEntry::from_result(&result, now));
        }

        result
    }

    pub fn add_rule(&self, rule: TriggerRule) -> Result<(), CatalogError> {
        let now = self.clock.now();
        self.rules.write().add(rule, now)
    }

    pub fn update_rule(&self, id: &str, patch: &TriggerRulePatch) -> Result<TriggerRule, CatalogError> {
        let now = self.clock.now();
        self.rules.write().update(id, patch, now)
    }

    /// Unknown ids are a no-op.
    pub fn remove_rule(&self, id: &str) -> Option<TriggerRule> {
        self.rules.write().remove(id)
    }

    pub fn rule(&self, id: &str) -> Option<TriggerRule> {
        self.rules.read().get(id).cloned()
    }

    /// Registered rules in evaluation order.
    pub fn rules(&self) -> Vec<TriggerRule> {
        self.rules.read().ordered().cloned().collect()
    }

    pub fn log(&self) -> &AuditLog<TriggerLogEntry> {
        &self.log
    }

    async fn match_rule(
        &self,
        rule: &TriggerRule,
        context: &TriggerContext,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<MatchedRule> {
        let mut matched = Vec::with_capacity(rule.conditions.len());

        for condition in &rule.conditions {
            let hit = match check_condition(condition, context, now) {
                ConditionCheck::Decided(hit) => hit,
                ConditionCheck::NeedsSignal(kind) => {
                    let signal = self.fetch_signal(kind, context).await;
                    compare_signal(condition, signal)
                }
            };

            if !hit {
                return None;
            }
            matched.push(hit);
        }

        Some(MatchedRule {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            priority: rule.priority,
            matched_conditions: rule.conditions.clone(),
            confidence: confidence(&rule.conditions, &matched),
            actions: rule.actions.clone(),
        })
    }

    async fn fetch_signal(&self, kind: SignalKind, context: &TriggerContext) -> Option<f64> {
        match tokio::time::timeout(self.action_timeout, self.signals.signal(kind, context)).await {
            Ok(signal) => signal,
            Err(_) => {
                tracing::warn!(signal = ?kind, timeout = ?self.action_timeout, "Signal lookup timed out");
                None
            }
        }
    }

    async fn execute_action(
        &self,
        rule: &TriggerRule,
        action: &TriggerAction,
        context: &TriggerContext,
    ) -> ExecutedAction {
        if let Some(requested) = action.delay {
            let delay = requested.min(self.max_action_delay);
            if delay < requested {
                tracing::warn!(
                    rule = %rule.id,
                    action = %action.kind,
                    requested = ?requested,
                    applied = ?delay,
                    "Action delay exceeds max_action_delay, capping"
                );
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let executed_at = self.clock.now();
        let invocation = TriggerInvocation {
            rule_id: rule.id.clone(),
            user_id: context.user_id.clone(),
            note_id: context.note_id.clone(),
            requested_at: executed_at,
        };
        let outcome = match TriggerCommand::from_action(action, invocation, context) {
            Ok(command) => {
                let command = ActionCommand::Trigger(command);
                execute_with_timeout(self.executor.as_ref(), &command, self.action_timeout).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(output) => ExecutedAction {
                rule_id: rule.id.clone(),
                action: action.kind,
                success: true,
                error: None,
                output: output.value,
                executed_at,
            },
            Err(e) => {
                tracing::warn!(
                    rule = %rule.id,
                    action = %action.kind,
                    error = %e,
                    "Trigger action failed"
                );
                ExecutedAction {
                    rule_id: rule.id.clone(),
                    action: action.kind,
                    success: false,
                    error: Some(e.to_string()),
                    output: None,
                    executed_at,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ActionError, ActionOutput};
    use crate::signals::{MetadataSignals, NoSignals};
    use async_trait::async_trait;
    use chrono::Utc;
    use noteguard_core::{
        ChangeType, ConditionValue, ManualClock, RuleMetadata, TriggerActionType,
        TriggerCondition, TriggerConditionType, TriggerOperator, MAX_SCHEDULE_DELAY_MINUTES,
    };
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingExecutor {
        commands: Mutex<Vec<ActionCommand>>,
        failing: Vec<&'static str>,
    }

    #[async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn execute(&self, command: &ActionCommand) -> Result<ActionOutput, ActionError> {
            self.commands.lock().push(command.clone());
            if self.failing.contains(&command.name()) {
                return Err(ActionError::Failed("downstream unavailable".to_string()));
            }
            Ok(ActionOutput::none())
        }
    }

    fn length_condition(min: f64) -> TriggerCondition {
        TriggerCondition::new(
            TriggerConditionType::ContentLength,
            TriggerOperator::GreaterThan,
            ConditionValue::Number(min),
        )
    }

    fn keyword_condition(word: &str) -> TriggerCondition {
        TriggerCondition::new(
            TriggerConditionType::KeywordPresence,
            TriggerOperator::Contains,
            ConditionValue::Text(word.to_string()),
        )
    }

    fn rule(id: &str, priority: u8, conditions: Vec<TriggerCondition>) -> TriggerRule {
        TriggerRule {
            id: id.to_string(),
            name: id.to_string(),
            enabled: true,
            priority,
            conditions,
            actions: vec![TriggerAction::new(TriggerActionType::AnalyzeNote)],
            metadata: RuleMetadata::default(),
        }
    }

    fn engine_with(
        rules: Vec<TriggerRule>,
        executor: Arc<RecordingExecutor>,
        signals: Arc<dyn TriggerSignals>,
    ) -> TriggerEngine {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let now = clock.now();
        TriggerEngine::new(
            TriggerRuleCatalog::from_rules(rules, now).unwrap(),
            executor,
            signals,
            clock,
            &RuntimeConfig::default(),
        )
    }

    fn engine(rules: Vec<TriggerRule>) -> (TriggerEngine, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::default());
        (engine_with(rules, executor.clone(), Arc::new(NoSignals)), executor)
    }

    fn context(content: &str) -> TriggerContext {
        TriggerContext::new("u1", ChangeType::Updated, Utc::now()).with_note("n1", content)
    }

    #[tokio::test]
    async fn test_long_note_matches_with_full_confidence() {
        let (engine, executor) = engine(vec![rule("long", 3, vec![length_condition(500.0)])]);

        let result = engine.evaluate(context(&"x".repeat(600))).await;

        assert!(result.triggered);
        assert_eq!(result.matched_rules.len(), 1);
        assert_eq!(result.matched_rules[0].confidence, 1.0);
        assert_eq!(result.executed_actions.len(), 1);
        assert!(result.executed_actions[0].success);
        assert_eq!(executor.commands.lock().len(), 1);
        assert_eq!(engine.log().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_match_does_not_trigger() {
        let conditions = vec![
            length_condition(10.0).with_weight(1.0),
            keyword_condition("deadline").with_weight(1.0),
        ];
        let (engine, executor) = engine(vec![rule("both", 1, conditions)]);

        let result = engine.evaluate(context("a fairly long note without the word")).await;

        assert!(!result.triggered);
        assert!(result.matched_rules.is_empty());
        assert!(executor.commands.lock().is_empty());
        assert!(engine.log().is_empty());
    }

    #[tokio::test]
    async fn test_weights_do_not_change_matched_confidence() {
        let conditions = vec![
            length_condition(1.0).with_weight(0.2),
            keyword_condition("deadline").with_weight(5.0),
        ];
        let (engine, _) = engine(vec![rule("weighted", 1, conditions)]);

        let result = engine.evaluate(context("deadline friday")).await;
        assert_eq!(result.matched_rules[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn test_matches_sorted_by_priority() {
        let (engine, _) = engine(vec![
            rule("low", 8, vec![length_condition(1.0)]),
            rule("high", 2, vec![length_condition(1.0)]),
            rule("mid", 5, vec![length_condition(1.0)]),
        ]);

        let result = engine.evaluate(context("hello world")).await;
        let order: Vec<_> = result.matched_rules.iter().map(|m| m.rule_id.as_str()).collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_disabled_rule_skipped() {
        let mut disabled = rule("off", 1, vec![length_condition(1.0)]);
        disabled.enabled = false;
        let (engine, _) = engine(vec![disabled]);

        let result = engine.evaluate(context("hello world")).await;
        assert!(!result.triggered);
    }

    #[tokio::test]
    async fn test_trigger_metadata_updated() {
        let (engine, _) = engine(vec![rule("long", 3, vec![length_condition(1.0)])]);

        engine.evaluate(context("hello")).await;
        engine.evaluate(context("hello again")).await;

        let stored = engine.rule("long").unwrap();
        assert_eq!(stored.metadata.trigger_count, 2);
        assert!(stored.metadata.last_triggered.is_some());
    }

    #[tokio::test]
    async fn test_failed_action_does_not_block_others() {
        let mut r = rule("multi", 1, vec![length_condition(1.0)]);
        r.actions = vec![
            TriggerAction::new(TriggerActionType::TriggerWebhook)
                .with_parameter("url", "https://hooks.example.com/notes"),
            TriggerAction::new(TriggerActionType::LogEvent),
        ];
        let executor = Arc::new(RecordingExecutor {
            failing: vec!["trigger_webhook"],
            ..Default::default()
        });
        let engine = engine_with(vec![r], executor.clone(), Arc::new(NoSignals));

        let result = engine.evaluate(context("hello")).await;

        assert!(result.triggered);
        assert_eq!(result.executed_actions.len(), 2);
        assert!(!result.executed_actions[0].success);
        assert!(result.executed_actions[0]
            .error
            .as_deref()
            .unwrap()
            .contains("downstream unavailable"));
        assert!(result.executed_actions[1].success);
        assert_eq!(engine.log().recent(1)[0].actions_failed, 1);
    }

    #[tokio::test]
    async fn test_signal_conditions() {
        let batch = TriggerCondition::new(
            TriggerConditionType::BatchSize,
            TriggerOperator::GreaterThanOrEqual,
            ConditionValue::Number(10.0),
        );
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine_with(
            vec![rule("batch", 4, vec![batch])],
            executor,
            Arc::new(MetadataSignals),
        );

        let mut ctx = context("");
        ctx.metadata.insert("batch_size".to_string(), json!(12));
        assert!(engine.evaluate(ctx).await.triggered);

        // Missing signal evaluates false
        assert!(!engine.evaluate(context("")).await.triggered);
    }

    #[tokio::test]
    async fn test_unknown_condition_never_matches() {
        let unknown: TriggerCondition = serde_json::from_value(json!({
            "type": "reading_level",
            "operator": "greater_than",
            "value": 1
        }))
        .unwrap();
        let (engine, _) = engine(vec![rule("unknown", 1, vec![unknown])]);

        assert!(!engine.evaluate(context("anything")).await.triggered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_delay_is_capped() {
        let mut r = rule("delayed", 1, vec![length_condition(1.0)]);
        r.actions = vec![TriggerAction::new(TriggerActionType::LogEvent)
            .with_delay(Duration::from_secs(3600))];
        let (engine, _) = engine(vec![r]);

        let started = Instant::now();
        let result = engine.evaluate(context("hello")).await;

        assert!(result.executed_actions[0].success);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_schedule_analysis_delay_limits() {
        let (engine, executor) = engine(Vec::new());

        let mut too_far = rule("too-far", 1, vec![length_condition(1.0)]);
        too_far.actions = vec![TriggerAction::new(TriggerActionType::ScheduleAnalysis)
            .with_parameter("delay_minutes", 1.0e12)];
        assert!(matches!(
            engine.add_rule(too_far),
            Err(CatalogError::InvalidRule { .. })
        ));

        let mut yearly = rule("yearly", 1, vec![length_condition(1.0)]);
        yearly.actions = vec![TriggerAction::new(TriggerActionType::ScheduleAnalysis)
            .with_parameter("delay_minutes", MAX_SCHEDULE_DELAY_MINUTES)];
        engine.add_rule(yearly).unwrap();

        let result = engine.evaluate(context("hello")).await;
        assert!(result.triggered);
        assert!(result.executed_actions[0].success);

        let commands = executor.commands.lock().clone();
        match &commands[0] {
            ActionCommand::Trigger(TriggerCommand::ScheduleAnalysis {
                invocation, run_at, ..
            }) => {
                assert_eq!(*run_at - invocation.requested_at, chrono::TimeDelta::days(365));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rule_management() {
        let (engine, _) = engine(vec![rule("a", 1, vec![length_condition(1.0)])]);

        assert!(matches!(
            engine.add_rule(rule("a", 2, vec![length_condition(1.0)])),
            Err(CatalogError::DuplicateId(_))
        ));
        engine.add_rule(rule("b", 2, vec![length_condition(1.0)])).unwrap();

        let patch = TriggerRulePatch {
            priority: Some(9),
            ..Default::default()
        };
        assert_eq!(engine.update_rule("a", &patch).unwrap().priority, 9);
        assert!(matches!(
            engine.update_rule("ghost", &patch),
            Err(CatalogError::UnknownRule(_))
        ));

        let ids: Vec<_> = engine.rules().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "a"]);

        assert!(engine.remove_rule("ghost").is_none());
        assert!(engine.remove_rule("a").is_some());
        assert_eq!(engine.rules().len(), 1);
    }
}
