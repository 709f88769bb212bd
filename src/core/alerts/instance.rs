// Live occurrence of an active rule and the text it displays.

use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::{NoExpand, Regex};

use super::model::{PersistencePolicy, RuleRecord};

lazy_static! {
    /// Every spelling dashboards have used for "the value". All of them bind
    /// to the same single token.
    static ref PLACEHOLDER: Regex =
        Regex::new(r"(?i)\{\s*(?:value|token)\s*\}|\{0\}|%s").expect("Invalid placeholder regex");
}

/// Resolve the text shown for a rule this tick.
///
/// An evaluator-supplied override wins verbatim. Otherwise every placeholder
/// in the template is replaced by the token. An empty template falls back to
/// the rule identifier.
pub fn compose_text(rule: &RuleRecord, token: &str, text_override: Option<&str>) -> String {
    if let Some(text) = text_override.filter(|t| !t.is_empty()) {
        return text.to_string();
    }
    if rule.template.trim().is_empty() {
        return rule.id.clone();
    }
    PLACEHOLDER
        .replace_all(&rule.template, NoExpand(token))
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct MessageInstance {
    /// Shared catalog record
    pub rule: Arc<RuleRecord>,
    /// Display text as of the last refresh
    pub text: String,
    /// Evaluator correlation token (empty if none)
    pub token: String,
    pub activated_at: Duration,
    pub updated_at: Duration,
    /// Natural-clear deadline, clear-after-delay rules only
    pub clear_at: Option<Duration>,
    /// Earliest time a natural clear may hide the message
    pub visible_until: Option<Duration>,
}

impl MessageInstance {
    pub fn activate(rule: Arc<RuleRecord>, token: String, text: String, now: Duration) -> Self {
        let clear_at = natural_clear_deadline(&rule, now);
        let visible_until = min_visible_deadline(&rule, now);
        Self {
            rule,
            text,
            token,
            activated_at: now,
            updated_at: now,
            clear_at,
            visible_until,
        }
    }

    /// Keep an already visible instance current. Deadlines stay anchored to
    /// the first activation and are only filled in if still unset.
    pub fn refresh(&mut self, token: String, text: String, now: Duration) {
        self.token = token;
        self.text = text;
        self.updated_at = now;
        if self.clear_at.is_none() {
            self.clear_at = natural_clear_deadline(&self.rule, now);
        }
        if self.visible_until.is_none() {
            self.visible_until = min_visible_deadline(&self.rule, now);
        }
    }

    /// Natural clear is due and the minimum on-time has been served.
    pub fn is_expired(&self, now: Duration) -> bool {
        if self.rule.persistence != PersistencePolicy::ClearAfterDelay {
            return false;
        }
        let clear_due = self.clear_at.is_some_and(|at| now >= at);
        let min_served = self.visible_until.map_or(true, |at| now >= at);
        clear_due && min_served
    }
}

fn natural_clear_deadline(rule: &RuleRecord, now: Duration) -> Option<Duration> {
    (rule.persistence == PersistencePolicy::ClearAfterDelay && rule.persistence_delay_ms > 0)
        .then(|| now + rule.persistence_delay())
}

fn min_visible_deadline(rule: &RuleRecord, now: Duration) -> Option<Duration> {
    (rule.min_on_time_ms > 0).then(|| now + rule.min_on_time())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_with_template(template: &str) -> RuleRecord {
        let mut rule = RuleRecord::new("traffic.faster_car", "traffic.faster_car_behind");
        rule.template = template.to_string();
        rule
    }

    #[test]
    fn test_all_placeholder_spellings_bind_the_token() {
        let rule = rule_with_template("Car {value} / {Token} / {0} / %s / { value }");
        assert_eq!(compose_text(&rule, "44", None), "Car 44 / 44 / 44 / 44 / 44");
    }

    #[test]
    fn test_override_wins() {
        let rule = rule_with_template("Car {value}");
        assert_eq!(compose_text(&rule, "44", Some("Gained a place: P3")), "Gained a place: P3");
        assert_eq!(compose_text(&rule, "44", Some("")), "Car 44");
    }

    #[test]
    fn test_empty_template_falls_back_to_id() {
        let rule = rule_with_template("   ");
        assert_eq!(compose_text(&rule, "44", None), "traffic.faster_car");
    }

    #[test]
    fn test_missing_token_leaves_no_trailing_space() {
        let rule = rule_with_template("YELLOW FLAG {value}");
        assert_eq!(compose_text(&rule, "", None), "YELLOW FLAG");
    }

    #[test]
    fn test_token_is_inserted_literally() {
        let rule = rule_with_template("Gap {value}");
        assert_eq!(compose_text(&rule, "$1.5", None), "Gap $1.5");
    }

    #[test]
    fn test_deadlines_anchor_to_activation() {
        let mut rule = RuleRecord::new("fuel.low", "fuel.under_one_lap");
        rule.persistence_delay_ms = 2_000;
        rule.min_on_time_ms = 3_000;
        let rule = Arc::new(rule);

        let mut inst = MessageInstance::activate(rule, String::new(), "Fuel".into(), Duration::from_secs(10));
        assert_eq!(inst.clear_at, Some(Duration::from_secs(12)));
        assert_eq!(inst.visible_until, Some(Duration::from_secs(13)));

        inst.refresh("0.5".into(), "Fuel 0.5".into(), Duration::from_secs(11));
        assert_eq!(inst.clear_at, Some(Duration::from_secs(12)));
        assert_eq!(inst.updated_at, Duration::from_secs(11));
        assert_eq!(inst.activated_at, Duration::from_secs(10));

        assert!(!inst.is_expired(Duration::from_secs(12)));
        assert!(inst.is_expired(Duration::from_secs(13)));
    }

    #[test]
    fn test_zero_delay_never_expires() {
        let mut rule = RuleRecord::new("flag.black", "flag.black");
        rule.persistence_delay_ms = 0;
        let inst = MessageInstance::activate(Arc::new(rule), String::new(), "Black".into(), Duration::ZERO);
        assert_eq!(inst.clear_at, None);
        assert!(!inst.is_expired(Duration::from_secs(3600)));
    }

    #[test]
    fn test_state_policies_have_no_deadline() {
        let mut rule = RuleRecord::new("pit.limiter", "pit.limiter_off");
        rule.persistence = PersistencePolicy::ClearOnStateChange;
        let inst = MessageInstance::activate(Arc::new(rule), String::new(), "Limiter".into(), Duration::ZERO);
        assert_eq!(inst.clear_at, None);
        assert!(!inst.is_expired(Duration::from_secs(3600)));
    }
}
