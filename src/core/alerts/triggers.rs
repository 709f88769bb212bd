// Evaluator contract and the built-in dashboard predicates.
//
// Every evaluator is asked about its rule on every tick, active or not, so
// stateful ones (position, personal best, push-to-pass latch) see every
// sample. Absent or unconvertible signals always mean "not triggered".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::model::RuleRecord;
use crate::core::model::SignalSource;

/// Result of asking an evaluator about its rule for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub triggered: bool,
    /// Which underlying entity fired the rule (car number, sector, ...).
    pub token: Option<String>,
    /// Literal text that replaces the rule template for this tick.
    pub text: Option<String>,
}

impl Evaluation {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn fired() -> Self {
        Self {
            triggered: true,
            ..Self::default()
        }
    }

    pub fn when(triggered: bool) -> Self {
        Self {
            triggered,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Pluggable predicate bound to a rule.
///
/// Stateless evaluators only implement `evaluate`. Evaluators that keep
/// latches or history across ticks override `reset`, which the engine calls
/// on session reset and never per tick.
pub trait Evaluator: Send {
    fn evaluate(&mut self, rule: &RuleRecord, signals: &dyn SignalSource, now: Duration) -> Evaluation;

    fn reset(&mut self) {}
}

/// Stand-in for a binding the registry could not resolve. Never fires.
pub struct MissingEvaluator {
    /// Unresolved evaluator identifier, for the warning
    binding: String,
    /// Shared by every stand-in for the same binding so the warning is logged once
    warned: Arc<AtomicBool>,
}

impl MissingEvaluator {
    pub fn new(binding: impl Into<String>) -> Self {
        Self::sharing(binding, Arc::new(AtomicBool::new(false)))
    }

    pub fn sharing(binding: impl Into<String>, warned: Arc<AtomicBool>) -> Self {
        Self {
            binding: binding.into(),
            warned,
        }
    }

    pub fn has_warned(&self) -> bool {
        self.warned.load(Ordering::Relaxed)
    }
}

impl Evaluator for MissingEvaluator {
    fn evaluate(&mut self, rule: &RuleRecord, _signals: &dyn SignalSource, _now: Duration) -> Evaluation {
        if !self.warned.swap(true, Ordering::Relaxed) {
            log::warn!(
                "Rule '{}' is bound to unknown evaluator '{}'; it will never fire",
                rule.id,
                self.binding
            );
        }
        Evaluation::idle()
    }
}

pub mod signals {
    pub const FUEL_LAPS_REMAINING: &str = "fuel.laps_remaining";
    pub const POSITION: &str = "race.position";
    pub const PUSH_TO_PASS_COUNT: &str = "push_to_pass.count";
    pub const FASTER_CAR_GAP: &str = "traffic.faster_car_gap";
    pub const FASTER_CAR_NUMBER: &str = "traffic.faster_car_number";
    pub const PIT_IN_LANE: &str = "pit.in_lane";
    pub const PIT_LIMITER_ON: &str = "pit.limiter_on";
    pub const WATER_TEMP: &str = "engine.water_temp";
    pub const LAP_COMPLETED: &str = "lap.completed";
    pub const LAP_LAST_TIME: &str = "lap.last_time";
}

/// Fuel left for less than one full lap.
pub struct FuelUnderOneLap;

impl Evaluator for FuelUnderOneLap {
    fn evaluate(&mut self, _rule: &RuleRecord, signals: &dyn SignalSource, _now: Duration) -> Evaluation {
        match signals.try_get_f64(signals::FUEL_LAPS_REMAINING) {
            Some(laps) if laps < 1.0 => Evaluation::fired().with_token(format!("{:.1}", laps)),
            _ => Evaluation::idle(),
        }
    }
}

/// Lower-severity pit reminder: between one and three laps of fuel left.
/// Below one lap the critical rule takes over, so the two never overlap.
pub struct FuelPitWindow;

impl Evaluator for FuelPitWindow {
    fn evaluate(&mut self, _rule: &RuleRecord, signals: &dyn SignalSource, _now: Duration) -> Evaluation {
        match signals.try_get_f64(signals::FUEL_LAPS_REMAINING) {
            Some(laps) if (1.0..3.0).contains(&laps) => {
                Evaluation::fired().with_token(format!("{:.1}", laps))
            }
            _ => Evaluation::idle(),
        }
    }
}

/// Session flag shown to the driver, read from `flags.<name>`.
pub struct SessionFlag {
    signal: String,
    detail_signal: String,
}

impl SessionFlag {
    pub fn new(flag: &str) -> Self {
        Self {
            signal: format!("flags.{}", flag),
            detail_signal: format!("flags.{}.detail", flag),
        }
    }
}

impl Evaluator for SessionFlag {
    fn evaluate(&mut self, _rule: &RuleRecord, signals: &dyn SignalSource, _now: Duration) -> Evaluation {
        if signals.try_get_bool(&self.signal) != Some(true) {
            return Evaluation::idle();
        }
        let eval = Evaluation::fired();
        match signals.try_get_text(&self.detail_signal) {
            Some(detail) => eval.with_token(detail),
            None => eval,
        }
    }
}

pub const SESSION_FLAGS: &[&str] = &[
    "yellow",
    "blue",
    "green",
    "white",
    "checkered",
    "black",
    "meatball",
];

/// Fires on the tick the race position differs from the last one seen.
pub struct PositionChange {
    last_position: Option<i64>,
}

impl PositionChange {
    pub fn new() -> Self {
        Self { last_position: None }
    }
}

impl Default for PositionChange {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for PositionChange {
    fn evaluate(&mut self, _rule: &RuleRecord, signals: &dyn SignalSource, _now: Duration) -> Evaluation {
        let Some(position) = signals.try_get_i64(signals::POSITION).filter(|p| *p > 0) else {
            return Evaluation::idle();
        };
        let previous = self.last_position.replace(position);
        match previous {
            Some(prev) if prev != position => {
                let verb = if position < prev { "Gained" } else { "Lost" };
                Evaluation::fired()
                    .with_token(position.to_string())
                    .with_text(format!("{} a place: P{}", verb, position))
            }
            _ => Evaluation::idle(),
        }
    }

    fn reset(&mut self) {
        self.last_position = None;
    }
}

/// Latch: fires once per session, the first tick push-to-pass is available.
pub struct PushToPassAvailable {
    fired: bool,
}

impl PushToPassAvailable {
    pub fn new() -> Self {
        Self { fired: false }
    }
}

impl Default for PushToPassAvailable {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for PushToPassAvailable {
    fn evaluate(&mut self, _rule: &RuleRecord, signals: &dyn SignalSource, _now: Duration) -> Evaluation {
        if self.fired {
            return Evaluation::idle();
        }
        match signals.try_get_i64(signals::PUSH_TO_PASS_COUNT) {
            Some(count) if count > 0 => {
                self.fired = true;
                Evaluation::fired().with_token(count.to_string())
            }
            _ => Evaluation::idle(),
        }
    }

    fn reset(&mut self) {
        self.fired = false;
    }
}

/// Faster-class car closing in. The token is the car number, so a cancel
/// with `SuppressUntilStateChange` only silences that particular car.
pub struct FasterCarBehind {
    max_gap_secs: f64,
}

impl FasterCarBehind {
    pub fn new(max_gap_secs: f64) -> Self {
        Self { max_gap_secs }
    }
}

impl Evaluator for FasterCarBehind {
    fn evaluate(&mut self, _rule: &RuleRecord, signals: &dyn SignalSource, _now: Duration) -> Evaluation {
        let Some(gap) = signals.try_get_f64(signals::FASTER_CAR_GAP) else {
            return Evaluation::idle();
        };
        if gap < 0.0 || gap >= self.max_gap_secs {
            return Evaluation::idle();
        }
        match signals.try_get_text(signals::FASTER_CAR_NUMBER) {
            Some(car) => Evaluation::fired().with_token(car),
            None => Evaluation::idle(),
        }
    }
}

/// In the pit lane without the speed limiter engaged.
pub struct PitLimiterOff;

impl Evaluator for PitLimiterOff {
    fn evaluate(&mut self, _rule: &RuleRecord, signals: &dyn SignalSource, _now: Duration) -> Evaluation {
        let in_lane = signals.try_get_bool(signals::PIT_IN_LANE);
        let limiter = signals.try_get_bool(signals::PIT_LIMITER_ON);
        Evaluation::when(in_lane == Some(true) && limiter == Some(false))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
}

impl Condition {
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::LessOrEqual => value <= threshold,
        }
    }
}

/// Generic single-signal threshold check. The token is the rounded value.
pub struct Threshold {
    signal: String,
    condition: Condition,
    threshold: f64,
}

impl Threshold {
    pub fn new(signal: impl Into<String>, condition: Condition, threshold: f64) -> Self {
        Self {
            signal: signal.into(),
            condition,
            threshold,
        }
    }
}

impl Evaluator for Threshold {
    fn evaluate(&mut self, _rule: &RuleRecord, signals: &dyn SignalSource, _now: Duration) -> Evaluation {
        match signals.try_get_f64(&self.signal) {
            Some(value) if self.condition.evaluate(value, self.threshold) => {
                Evaluation::fired().with_token(format!("{:.0}", value))
            }
            _ => Evaluation::idle(),
        }
    }
}

/// Fires on the tick a newly completed lap beats the session best.
pub struct PersonalBest {
    best_secs: Option<f64>,
    last_lap: Option<i64>,
}

impl PersonalBest {
    pub fn new() -> Self {
        Self {
            best_secs: None,
            last_lap: None,
        }
    }
}

impl Default for PersonalBest {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for PersonalBest {
    fn evaluate(&mut self, _rule: &RuleRecord, signals: &dyn SignalSource, _now: Duration) -> Evaluation {
        let (Some(lap), Some(time)) = (
            signals.try_get_i64(signals::LAP_COMPLETED),
            signals.try_get_f64(signals::LAP_LAST_TIME),
        ) else {
            return Evaluation::idle();
        };
        if self.last_lap == Some(lap) || time <= 0.0 {
            return Evaluation::idle();
        }
        self.last_lap = Some(lap);

        // The first timed lap only seeds the best.
        let improved = self.best_secs.map(|best| time < best);
        if improved.unwrap_or(true) {
            self.best_secs = Some(time);
        }
        if improved == Some(true) {
            Evaluation::fired()
                .with_token(lap.to_string())
                .with_text(format!("Personal best: {}", format_lap_time(time)))
        } else {
            Evaluation::idle()
        }
    }

    fn reset(&mut self) {
        self.best_secs = None;
        self.last_lap = None;
    }
}

fn format_lap_time(secs: f64) -> String {
    let total_millis = (secs * 1000.0).round() as u64;
    let minutes = total_millis / 60_000;
    let seconds = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{}:{:02}.{:03}", minutes, seconds, millis)
}
