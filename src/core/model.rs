use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type SignalName = String;

/// A single telemetry value as delivered by the simulator bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SignalValue {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Int(i) => *i as f64,
            Self::Float(f) => *f,
            Self::Text(s) => s.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(s) => s.trim().parse().ok(),
            other => {
                let f = other.as_f64()?;
                (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
                    .then_some(f as i64)
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Float(f) => f.is_finite().then_some(*f != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Read-only view over the simulator signals for one tick.
///
/// Every accessor returns `None` when the signal is absent or cannot be
/// converted to the requested type. Implementations must never panic.
pub trait SignalSource {
    fn lookup(&self, name: &str) -> Option<SignalValue>;

    fn try_get_f64(&self, name: &str) -> Option<f64> {
        self.lookup(name)?.as_f64()
    }

    fn try_get_i64(&self, name: &str) -> Option<i64> {
        self.lookup(name)?.as_i64()
    }

    fn try_get_bool(&self, name: &str) -> Option<bool> {
        self.lookup(name)?.as_bool()
    }

    fn try_get_text(&self, name: &str) -> Option<String> {
        let text = self.lookup(name)?.as_text();
        (!text.is_empty()).then_some(text)
    }
}

/// Plain map-backed signal snapshot. Used by the replay path and by tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalFrame {
    values: HashMap<SignalName, SignalValue>,
}

impl SignalFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<SignalName>, value: impl Into<SignalValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<SignalName>, value: impl Into<SignalValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Overlay another frame on top of this one (sample-and-hold merge).
    pub fn merge(&mut self, newer: &SignalFrame) {
        for (name, value) in &newer.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SignalSource for SignalFrame {
    fn lookup(&self, name: &str) -> Option<SignalValue> {
        self.values.get(name).cloned()
    }
}

impl From<bool> for SignalValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SignalValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for SignalValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercion() {
        let frame = SignalFrame::new()
            .with("fuel.laps_remaining", 2.5)
            .with("position", "4")
            .with("flags.yellow", 1);

        assert_eq!(frame.try_get_f64("fuel.laps_remaining"), Some(2.5));
        assert_eq!(frame.try_get_i64("position"), Some(4));
        assert_eq!(frame.try_get_bool("flags.yellow"), Some(true));
    }

    #[test]
    fn test_missing_or_unconvertible_is_none() {
        let frame = SignalFrame::new()
            .with("fuel.laps_remaining", "lots")
            .with("lap.last_time", f64::NAN);

        assert_eq!(frame.try_get_f64("fuel.laps_remaining"), None);
        assert_eq!(frame.try_get_f64("lap.last_time"), None);
        assert_eq!(frame.try_get_f64("does.not.exist"), None);
        assert_eq!(frame.try_get_i64("fuel.laps_remaining"), None);
        assert_eq!(frame.try_get_bool("fuel.laps_remaining"), None);
    }

    #[test]
    fn test_fractional_float_is_not_an_integer() {
        let frame = SignalFrame::new().with("position", 3.5);
        assert_eq!(frame.try_get_i64("position"), None);
    }

    #[test]
    fn test_empty_text_is_not_found() {
        let frame = SignalFrame::new().with("traffic.faster_car_number", "");
        assert_eq!(frame.try_get_text("traffic.faster_car_number"), None);
    }

    #[test]
    fn test_merge_overwrites_and_keeps() {
        let mut held = SignalFrame::new().with("a", 1).with("b", 2);
        held.merge(&SignalFrame::new().with("b", 3));
        assert_eq!(held.try_get_i64("a"), Some(1));
        assert_eq!(held.try_get_i64("b"), Some(3));
        assert_eq!(held.len(), 2);
    }

    #[test]
    fn test_frame_deserializes_untagged_values() {
        let frame: SignalFrame =
            serde_json::from_str(r#"{"pit.in_lane": true, "position": 3, "gap": 0.8, "car": "44"}"#)
                .unwrap();
        assert_eq!(frame.lookup("pit.in_lane"), Some(SignalValue::Bool(true)));
        assert_eq!(frame.lookup("position"), Some(SignalValue::Int(3)));
        assert_eq!(frame.lookup("gap"), Some(SignalValue::Float(0.8)));
        assert_eq!(frame.try_get_text("car"), Some("44".to_string()));
    }
}
