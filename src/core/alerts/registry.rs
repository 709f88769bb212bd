// Evaluator registry: maps evaluator identifiers to constructors and binds
// one evaluator instance to every rule of a catalog.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use super::catalog::RuleCatalog;
use super::model::{rule_key, RuleRecord};
use super::triggers::{
    signals, Condition, Evaluation, Evaluator, FasterCarBehind, FuelPitWindow, FuelUnderOneLap,
    MissingEvaluator, PersonalBest, PitLimiterOff, PositionChange, PushToPassAvailable,
    SessionFlag, Threshold, SESSION_FLAGS,
};
use crate::core::model::SignalSource;

type Constructor = Box<dyn Fn() -> Box<dyn Evaluator> + Send>;

pub struct EvaluatorRegistry {
    /// Evaluator factories by case-folded identifier
    constructors: HashMap<String, Constructor>,
    /// Bound evaluators, one per rule key. Each rule gets its own instance so
    /// stateful evaluators never see a tick twice.
    bound: HashMap<String, Box<dyn Evaluator>>,
    /// Evaluator identifiers no constructor matched, sorted
    unresolved: Vec<String>,
    /// One warn-once flag per unresolved binding, shared by its stand-ins
    missing_warned: HashMap<String, Arc<AtomicBool>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            bound: HashMap::new(),
            unresolved: Vec::new(),
            missing_warned: HashMap::new(),
        }
    }

    /// Registry preloaded with every built-in dashboard evaluator.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("fuel.under_one_lap", || Box::new(FuelUnderOneLap));
        registry.register("fuel.pit_window", || Box::new(FuelPitWindow));
        for flag in SESSION_FLAGS {
            registry.register(format!("flag.{}", flag), move || Box::new(SessionFlag::new(flag)));
        }
        registry.register("position.changed", || Box::new(PositionChange::new()));
        registry.register("push_to_pass.available", || Box::new(PushToPassAvailable::new()));
        registry.register("traffic.faster_car_behind", || Box::new(FasterCarBehind::new(1.0)));
        registry.register("pit.limiter_off", || Box::new(PitLimiterOff));
        registry.register("engine.water_temp_high", || {
            Box::new(Threshold::new(signals::WATER_TEMP, Condition::GreaterThan, 110.0))
        });
        registry.register("lap.personal_best", || Box::new(PersonalBest::new()));
        registry
    }

    /// Add or replace a constructor. Identifiers are case-insensitive.
    pub fn register<F>(&mut self, id: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Evaluator> + Send + 'static,
    {
        self.constructors.insert(rule_key(&id.into()), Box::new(constructor));
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.constructors.contains_key(&rule_key(id))
    }

    /// Instantiate an evaluator for every rule. Unknown bindings get a
    /// `MissingEvaluator` and are listed in `unresolved`.
    pub fn bind(&mut self, catalog: &RuleCatalog) {
        self.bound.clear();
        self.unresolved.clear();
        self.missing_warned.clear();

        for rule in catalog.iter() {
            let binding = rule_key(&rule.evaluator);
            let evaluator: Box<dyn Evaluator> = match self.constructors.get(&binding) {
                Some(constructor) => constructor(),
                None => {
                    let flag = self.missing_warned.entry(binding).or_insert_with(|| {
                        self.unresolved.push(rule.evaluator.clone());
                        Arc::new(AtomicBool::new(false))
                    });
                    Box::new(MissingEvaluator::sharing(rule.evaluator.clone(), flag.clone()))
                }
            };
            self.bound.insert(rule.key(), evaluator);
        }
        self.unresolved.sort();
    }

    pub fn evaluate(&mut self, rule: &RuleRecord, signals: &dyn SignalSource, now: Duration) -> Evaluation {
        match self.bound.get_mut(&rule.key()) {
            Some(evaluator) => evaluator.evaluate(rule, signals, now),
            None => Evaluation::idle(),
        }
    }

    /// Clear latches and history of every bound evaluator.
    pub fn reset_all(&mut self) {
        for evaluator in self.bound.values_mut() {
            evaluator.reset();
        }
    }

    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
