// Alert engine - evaluates every rule each tick, arbitrates the active
// messages onto the two dashboard channels and handles the cancel button.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::cancel::{CancelAction, CancelController};
use super::catalog::RuleCatalog;
use super::instance::{compose_text, MessageInstance};
use super::model::CancelPolicy;
use super::registry::EvaluatorRegistry;
use super::selector::{select_channels, OutputSnapshot, RecencyStack};
use super::store::{MessageStore, Suppression};
use crate::core::model::SignalSource;

/// Engine tuning - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Two cancel presses closer than this clear every message
    #[serde(default = "default_double_tap_window_ms")]
    pub double_tap_window_ms: u64,
    /// How long the clear-all pulse stays raised in the snapshot
    #[serde(default = "default_clear_all_pulse_ms")]
    pub clear_all_pulse_ms: u64,
}

fn default_double_tap_window_ms() -> u64 {
    350
}

fn default_clear_all_pulse_ms() -> u64 {
    1_500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            double_tap_window_ms: default_double_tap_window_ms(),
            clear_all_pulse_ms: default_clear_all_pulse_ms(),
        }
    }
}

impl EngineConfig {
    pub fn double_tap_window(&self) -> Duration {
        Duration::from_millis(self.double_tap_window_ms)
    }

    pub fn clear_all_pulse(&self) -> Duration {
        Duration::from_millis(self.clear_all_pulse_ms)
    }
}

/// Alert engine state
pub struct AlertEngine {
    /// Rules, shared read-only with every active instance
    catalog: RuleCatalog,
    /// One bound evaluator per rule
    registry: EvaluatorRegistry,
    /// Configuration
    config: EngineConfig,
    /// Active instances, cooldowns and suppressions
    store: MessageStore,
    /// Rule keys by how recently they were on screen, for single dismissal
    recency: RecencyStack,
    /// Single/double press tracking
    cancel: CancelController,
    /// When the last clear-all happened, while the pulse is still showing
    pulse_raised_at: Option<Duration>,
    /// Output as of the last tick or cancel
    snapshot: OutputSnapshot,
}

impl AlertEngine {
    pub fn new(catalog: RuleCatalog, mut registry: EvaluatorRegistry, config: EngineConfig) -> Self {
        registry.bind(&catalog);
        let snapshot = OutputSnapshot {
            unresolved_bindings: registry.unresolved().to_vec(),
            ..OutputSnapshot::default()
        };
        Self {
            catalog,
            registry,
            cancel: CancelController::new(config.double_tap_window()),
            config,
            store: MessageStore::new(),
            recency: RecencyStack::new(),
            pulse_raised_at: None,
            snapshot,
        }
    }

    /// Engine over the default catalog and the built-in evaluators.
    pub fn with_defaults() -> Self {
        Self::new(
            super::catalog::default_catalog(),
            EvaluatorRegistry::builtin(),
            EngineConfig::default(),
        )
    }

    pub fn snapshot(&self) -> &OutputSnapshot {
        &self.snapshot
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Advance the engine by one step.
    pub fn tick(&mut self, signals: &dyn SignalSource, now: Duration) -> &OutputSnapshot {
        // Pass 1: triggers. Every evaluator sees every tick, active or not.
        for rule in self.catalog.iter() {
            let key = rule.key();
            let result = self.registry.evaluate(rule, signals, now);

            if !result.triggered {
                if rule.persistence.clears_on_state() && self.store.remove(&key, now).is_some() {
                    self.recency.forget(&key);
                    log::debug!("State clear: {}", rule.id);
                }
                continue;
            }

            let token = result.token.unwrap_or_default();
            if self.store.is_cooling_down(&key, now) {
                continue;
            }
            if self.store.is_suppressed(&key, &token, now) {
                continue;
            }

            let text = compose_text(rule, &token, result.text.as_deref());
            match self.store.get_mut(&key) {
                Some(instance) => instance.refresh(token, text, now),
                None => {
                    log::debug!("Activated {}: {}", rule.id, text);
                    let instance = MessageInstance::activate(rule.clone(), token, text, now);
                    self.store.insert(key, instance);
                }
            }
        }

        // Pass 2: natural clears.
        for key in self.store.active_keys() {
            let expired = self.store.get(&key).is_some_and(|inst| inst.is_expired(now));
            if expired && self.store.remove(&key, now).is_some() {
                self.recency.forget(&key);
                log::debug!("Natural clear: {}", key);
            }
        }

        self.refresh_outputs(now);
        &self.snapshot
    }

    /// Cancel button handler: single press dismisses the latest message,
    /// a double press clears them all.
    pub fn on_cancel_pressed(&mut self, now: Duration) -> &OutputSnapshot {
        match self.cancel.on_press(now) {
            CancelAction::DismissLatest => {
                if let Some(key) = self.latest_shown() {
                    self.dismiss(&key, now);
                }
            }
            CancelAction::ClearAll => {
                let keys = self.clear_all_order();
                log::debug!("Clear all: {} messages", keys.len());
                for key in keys {
                    self.dismiss(&key, now);
                }
                self.recency.clear();
                self.pulse_raised_at = Some(now);
            }
        }
        self.refresh_outputs(now);
        &self.snapshot
    }

    /// Forget everything the session accumulated, including evaluator latches.
    pub fn reset_session(&mut self) {
        self.store.clear();
        self.recency.clear();
        self.cancel.reset();
        self.pulse_raised_at = None;
        self.registry.reset_all();
        self.snapshot = OutputSnapshot {
            unresolved_bindings: self.registry.unresolved().to_vec(),
            ..OutputSnapshot::default()
        };
        log::info!("Alert session reset");
    }

    /// Most recently shown message that is still active, else the most
    /// recently updated one.
    fn latest_shown(&self) -> Option<String> {
        if let Some(key) = self.recency.iter().find(|key| self.store.contains(key)) {
            return Some(key.clone());
        }
        self.store
            .active()
            .max_by(|(ka, a), (kb, b)| a.updated_at.cmp(&b.updated_at).then(kb.cmp(ka)))
            .map(|(key, _)| key.clone())
    }

    /// Every active key, least important first, so the message the primary
    /// slot would pick is dismissed last and ends up as `last_cancelled`.
    fn clear_all_order(&self) -> Vec<String> {
        let mut active: Vec<(&String, &MessageInstance)> = self.store.active().collect();
        active.sort_by(|(ka, a), (kb, b)| {
            a.rule
                .priority
                .value()
                .cmp(&b.rule.priority.value())
                .then(a.updated_at.cmp(&b.updated_at))
                .then(kb.cmp(ka))
        });
        active.into_iter().map(|(key, _)| key.clone()).collect()
    }

    fn dismiss(&mut self, key: &str, now: Duration) {
        let Some(instance) = self.store.remove(key, now) else {
            return;
        };
        self.recency.forget(key);

        let rule = &instance.rule;
        let suppression = match rule.cancel_policy {
            CancelPolicy::SilenceForDelay => {
                let delay = rule.cancel_delay();
                (!delay.is_zero()).then(|| Suppression::Until(now + delay))
            }
            CancelPolicy::SuppressUntilStateChange => Some(Suppression::WhileToken(instance.token.clone())),
            CancelPolicy::SuppressUntilSessionEnd => Some(Suppression::Session),
        };
        if let Some(suppression) = suppression {
            self.store.suppress(key.to_string(), suppression);
        }

        log::debug!("Dismissed {}", rule.id);
        self.snapshot.last_cancelled = Some(rule.id.clone());
    }

    fn refresh_outputs(&mut self, now: Duration) {
        let (primary, secondary) = select_channels(&self.store, &mut self.recency);

        if let Some(raised_at) = self.pulse_raised_at {
            if now.saturating_sub(raised_at) >= self.config.clear_all_pulse() {
                self.pulse_raised_at = None;
            }
        }

        self.snapshot.primary = primary;
        self.snapshot.secondary = secondary;
        self.snapshot.active_count = self.store.active_count();
        self.snapshot.clear_all_pulse = self.pulse_raised_at.is_some();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{PersistencePolicy, Priority, RuleRecord};
    use crate::core::alerts::triggers::{signals, Evaluation, Evaluator};
    use crate::core::model::SignalFrame;

    /// Fires while `test.<id>` is true, with the token from `test.<id>.token`.
    struct SignalDriven;

    impl Evaluator for SignalDriven {
        fn evaluate(&mut self, rule: &RuleRecord, signals: &dyn SignalSource, _now: Duration) -> Evaluation {
            let on = signals.try_get_bool(&format!("test.{}", rule.id)) == Some(true);
            let eval = Evaluation::when(on);
            match signals.try_get_text(&format!("test.{}.token", rule.id)) {
                Some(token) => eval.with_token(token),
                None => eval,
            }
        }
    }

    fn rule(id: &str, priority: Priority, persistence: PersistencePolicy) -> RuleRecord {
        let mut rule = RuleRecord::new(id, "test.signal");
        rule.priority = priority;
        rule.persistence = persistence;
        rule.template = format!("{} {{value}}", id);
        rule
    }

    fn engine(rules: Vec<RuleRecord>) -> AlertEngine {
        let mut registry = EvaluatorRegistry::new();
        registry.register("test.signal", || Box::new(SignalDriven));
        AlertEngine::new(RuleCatalog::new(rules).unwrap(), registry, EngineConfig::default())
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn on(id: &str) -> SignalFrame {
        SignalFrame::new().with(format!("test.{}", id), true)
    }

    #[test]
    fn test_engine_activates_and_renders() {
        let mut engine = engine(vec![rule("a", Priority::Med, PersistencePolicy::ClearOnStateChange)]);
        let frame = on("a").with("test.a.token", "44");

        let snapshot = engine.tick(&frame, ms(0));
        let primary = snapshot.primary.as_ref().unwrap();
        assert_eq!(primary.rule_id, "a");
        assert_eq!(primary.text, "a 44");
        assert_eq!(snapshot.active_count, 1);
        assert!(snapshot.secondary.is_none());
    }

    #[test]
    fn test_engine_state_clear() {
        let mut engine = engine(vec![rule("a", Priority::Med, PersistencePolicy::ClearOnStateChange)]);
        engine.tick(&on("a"), ms(0));
        let snapshot = engine.tick(&SignalFrame::new(), ms(100));
        assert_eq!(snapshot.active_count, 0);
        assert!(snapshot.primary.is_none());
    }

    #[test]
    fn test_engine_delay_policy_outlives_trigger() {
        let mut r = rule("a", Priority::Med, PersistencePolicy::ClearAfterDelay);
        r.persistence_delay_ms = 1_000;
        let mut engine = engine(vec![r]);

        engine.tick(&on("a"), ms(0));
        assert_eq!(engine.tick(&SignalFrame::new(), ms(500)).active_count, 1);
        assert_eq!(engine.tick(&SignalFrame::new(), ms(1_000)).active_count, 0);
    }

    #[test]
    fn test_engine_refresh_keeps_first_deadline() {
        let mut r = rule("a", Priority::Med, PersistencePolicy::ClearAfterDelay);
        r.persistence_delay_ms = 1_000;
        let mut engine = engine(vec![r]);

        engine.tick(&on("a"), ms(0));
        engine.tick(&on("a"), ms(600));
        // Still triggering, but the deadline from the first activation holds.
        assert_eq!(engine.tick(&on("a"), ms(1_000)).active_count, 0);
    }

    #[test]
    fn test_engine_persist_policies_survive_untrigger() {
        let mut engine = engine(vec![
            rule("a", Priority::Med, PersistencePolicy::PersistUntilSessionEnd),
            rule("b", Priority::Low, PersistencePolicy::PersistUntilManualCancel),
        ]);
        engine.tick(&on("a").with("test.b", true), ms(0));
        let snapshot = engine.tick(&SignalFrame::new(), ms(3_600_000));
        assert_eq!(snapshot.active_count, 2);

        engine.reset_session();
        assert_eq!(engine.snapshot().active_count, 0);
    }

    #[test]
    fn test_engine_cooldown_respected() {
        let mut r = rule("a", Priority::Med, PersistencePolicy::ClearOnStateChange);
        r.cooldown_ms = 5_000;
        let mut engine = engine(vec![r]);

        engine.tick(&on("a"), ms(0));
        engine.tick(&SignalFrame::new(), ms(1_000));
        assert_eq!(engine.tick(&on("a"), ms(5_999)).active_count, 0);
        assert_eq!(engine.tick(&on("a"), ms(6_000)).active_count, 1);
    }

    #[test]
    fn test_engine_dismiss_applies_silence() {
        let mut r = rule("a", Priority::Med, PersistencePolicy::ClearOnStateChange);
        r.cancel_policy = CancelPolicy::SilenceForDelay;
        r.cancel_delay_ms = 2_000;
        let mut engine = engine(vec![r]);

        engine.tick(&on("a"), ms(0));
        let snapshot = engine.on_cancel_pressed(ms(100));
        assert_eq!(snapshot.active_count, 0);
        assert_eq!(snapshot.last_cancelled.as_deref(), Some("a"));

        assert_eq!(engine.tick(&on("a"), ms(2_099)).active_count, 0);
        assert_eq!(engine.tick(&on("a"), ms(2_100)).active_count, 1);
    }

    #[test]
    fn test_engine_zero_silence_allows_immediate_return() {
        let mut r = rule("a", Priority::Med, PersistencePolicy::ClearOnStateChange);
        r.cancel_delay_ms = 0;
        let mut engine = engine(vec![r]);

        engine.tick(&on("a"), ms(0));
        engine.on_cancel_pressed(ms(100));
        assert_eq!(engine.tick(&on("a"), ms(200)).active_count, 1);
    }

    #[test]
    fn test_engine_dismisses_what_was_shown_last() {
        let mut engine = engine(vec![
            rule("low", Priority::Low, PersistencePolicy::ClearOnStateChange),
            rule("high", Priority::High, PersistencePolicy::ClearOnStateChange),
        ]);
        engine.tick(&on("low").with("test.high", true), ms(0));

        let snapshot = engine.on_cancel_pressed(ms(1_000));
        assert_eq!(snapshot.last_cancelled.as_deref(), Some("high"));
        assert_eq!(snapshot.primary.as_ref().unwrap().rule_id, "low");
    }

    #[test]
    fn test_engine_clear_all_pulse_decays() {
        let mut engine = engine(vec![
            rule("a", Priority::Med, PersistencePolicy::ClearOnStateChange),
            rule("b", Priority::Med, PersistencePolicy::ClearOnStateChange),
        ]);
        engine.tick(&on("a").with("test.b", true), ms(0));

        engine.on_cancel_pressed(ms(1_000));
        let snapshot = engine.on_cancel_pressed(ms(1_100));
        assert_eq!(snapshot.active_count, 0);
        assert!(snapshot.clear_all_pulse);

        assert!(engine.tick(&SignalFrame::new(), ms(2_000)).clear_all_pulse);
        assert!(!engine.tick(&SignalFrame::new(), ms(2_600)).clear_all_pulse);
    }

    #[test]
    fn test_engine_clear_all_reports_most_important_last() {
        for _ in 0..20 {
            let mut engine = engine(vec![
                rule("c", Priority::Low, PersistencePolicy::ClearOnStateChange),
                rule("b", Priority::High, PersistencePolicy::ClearOnStateChange),
                rule("a", Priority::Med, PersistencePolicy::ClearOnStateChange),
                rule("d", Priority::High, PersistencePolicy::ClearOnStateChange),
                rule("e", Priority::Med, PersistencePolicy::ClearOnStateChange),
            ]);
            let frame = on("a")
                .with("test.b", true)
                .with("test.c", true)
                .with("test.d", true)
                .with("test.e", true);
            engine.tick(&frame, ms(0));

            // First press takes "b" (High, lowest key); the rest go in the clear-all.
            assert_eq!(engine.on_cancel_pressed(ms(1_000)).last_cancelled.as_deref(), Some("b"));
            let snapshot = engine.on_cancel_pressed(ms(1_100));
            assert_eq!(snapshot.active_count, 0);
            assert_eq!(snapshot.last_cancelled.as_deref(), Some("d"));
        }
    }

    #[test]
    fn test_engine_cancel_with_nothing_active() {
        let mut engine = engine(vec![rule("a", Priority::Med, PersistencePolicy::ClearOnStateChange)]);
        let snapshot = engine.on_cancel_pressed(ms(0));
        assert_eq!(snapshot.active_count, 0);
        assert!(snapshot.last_cancelled.is_none());
    }

    #[test]
    fn test_engine_reports_unresolved_bindings() {
        let rules = vec![
            RuleRecord::new("known", "fuel.under_one_lap"),
            RuleRecord::new("unknown", "tyres.overheating"),
        ];
        let mut engine = AlertEngine::new(
            RuleCatalog::new(rules).unwrap(),
            EvaluatorRegistry::builtin(),
            EngineConfig::default(),
        );
        let frame = SignalFrame::new().with(signals::FUEL_LAPS_REMAINING, 0.4);
        let snapshot = engine.tick(&frame, ms(0));
        assert_eq!(snapshot.unresolved_bindings, vec!["tyres.overheating".to_string()]);
        assert_eq!(snapshot.active_count, 1);

        engine.reset_session();
        assert_eq!(engine.snapshot().unresolved_bindings.len(), 1);
    }

    #[test]
    fn test_engine_defaults_survive_empty_signals() {
        let mut engine = AlertEngine::with_defaults();
        let snapshot = engine.tick(&SignalFrame::new(), ms(0));
        assert_eq!(snapshot.active_count, 0);
        assert!(snapshot.unresolved_bindings.is_empty());
    }

    #[test]
    fn test_engine_config_defaults_from_sparse_json() {
        let config: EngineConfig = serde_json::from_str(r#"{"clear_all_pulse_ms": 900}"#).unwrap();
        assert_eq!(config.double_tap_window_ms, 350);
        assert_eq!(config.clear_all_pulse(), ms(900));
    }
}
