// Rule catalog: validated, shared, read-only set of rule records, plus the
// JSON file store and the built-in default catalog.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use super::model::{CancelPolicy, PersistencePolicy, Priority, RuleRecord, StyleOverrides};
use super::triggers::SESSION_FLAGS;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Catalog {path} is not a valid rule list: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Rule identifier '{0}' is used more than once (identifiers are case-insensitive)")]
    DuplicateId(String),

    #[error("Rule bound to evaluator '{0}' has an empty identifier")]
    EmptyId(String),
}

#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<Arc<RuleRecord>>,
}

impl RuleCatalog {
    /// Build a catalog, rejecting empty or duplicate identifiers.
    pub fn new(rules: Vec<RuleRecord>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            let key = rule.key();
            if key.is_empty() {
                return Err(CatalogError::EmptyId(rule.evaluator.clone()));
            }
            if !seen.insert(key) {
                return Err(CatalogError::DuplicateId(rule.id.clone()));
            }
        }
        Ok(Self {
            rules: rules.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RuleRecord>> {
        self.rules.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<RuleRecord>> {
        let key = super::model::rule_key(id);
        self.rules.iter().find(|rule| rule.key() == key)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn records(&self) -> Vec<RuleRecord> {
        self.rules.iter().map(|rule| (**rule).clone()).collect()
    }
}

/// Persists the catalog as a pretty-printed JSON array of rule records.
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<RuleCatalog, CatalogError> {
        let content = fs::read_to_string(&self.path).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })?;
        let rules: Vec<RuleRecord> =
            serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
                path: self.path.clone(),
                source,
            })?;
        RuleCatalog::new(rules)
    }

    /// Never fails: any load problem falls back to the built-in catalog.
    pub fn load_or_default(&self) -> RuleCatalog {
        match self.load() {
            Ok(catalog) => {
                log::info!("Loaded {} rules from {}", catalog.len(), self.path.display());
                catalog
            }
            Err(e) => {
                log::warn!("{}; using the default catalog", e);
                default_catalog()
            }
        }
    }

    pub fn save(&self, catalog: &RuleCatalog) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&catalog.records())?;
        fs::write(&self.path, content)
    }
}

/// One rule per built-in evaluator, tuned for a typical GT race dash.
pub fn default_catalog() -> RuleCatalog {
    let mut rules = Vec::new();

    let mut fuel_critical = RuleRecord::new("fuel.critical", "fuel.under_one_lap");
    fuel_critical.category = "Fuel".into();
    fuel_critical.priority = Priority::High;
    fuel_critical.secondary_enabled = true;
    fuel_critical.persistence = PersistencePolicy::ClearOnStateChange;
    fuel_critical.cancel_policy = CancelPolicy::SilenceForDelay;
    fuel_critical.cancel_delay_ms = 60_000;
    fuel_critical.min_on_time_ms = 3_000;
    fuel_critical.template = "FUEL: {value} LAPS LEFT".into();
    rules.push(fuel_critical);

    let mut fuel_window = RuleRecord::new("fuel.pit_window", "fuel.pit_window");
    fuel_window.category = "Fuel".into();
    fuel_window.priority = Priority::Med;
    fuel_window.persistence = PersistencePolicy::ClearAfterDelay;
    fuel_window.persistence_delay_ms = 8_000;
    fuel_window.cancel_policy = CancelPolicy::SuppressUntilSessionEnd;
    fuel_window.cooldown_ms = 120_000;
    fuel_window.template = "Box soon: {value} laps of fuel".into();
    rules.push(fuel_window);

    for flag in SESSION_FLAGS {
        let mut rule = RuleRecord::new(format!("flag.{}", flag), format!("flag.{}", flag));
        rule.category = "Flags".into();
        rule.priority = match *flag {
            "black" | "meatball" | "yellow" => Priority::High,
            "blue" => Priority::Med,
            _ => Priority::Low,
        };
        rule.secondary_enabled = true;
        rule.persistence = PersistencePolicy::ClearOnStateChange;
        rule.cancel_policy = CancelPolicy::SuppressUntilStateChange;
        rule.min_on_time_ms = 2_000;
        rule.template = format!("{} FLAG {{value}}", flag.to_uppercase());
        if *flag == "yellow" || *flag == "white" {
            rule.style = StyleOverrides {
                text_color: Some("#FF000000".into()),
                ..StyleOverrides::default()
            };
        }
        rules.push(rule);
    }

    let mut position = RuleRecord::new("race.position_changed", "position.changed");
    position.category = "Race".into();
    position.priority = Priority::Low;
    position.persistence = PersistencePolicy::ClearAfterDelay;
    position.persistence_delay_ms = 3_000;
    position.min_on_time_ms = 1_500;
    rules.push(position);

    let mut push = RuleRecord::new("push_to_pass.ready", "push_to_pass.available");
    push.category = "Race".into();
    push.priority = Priority::Med;
    push.persistence = PersistencePolicy::ClearAfterDelay;
    push.persistence_delay_ms = 5_000;
    push.template = "Push-to-pass ready ({value})".into();
    rules.push(push);

    let mut traffic = RuleRecord::new("traffic.faster_car", "traffic.faster_car_behind");
    traffic.category = "Traffic".into();
    traffic.priority = Priority::Med;
    traffic.secondary_enabled = true;
    traffic.persistence = PersistencePolicy::ClearOnStateChange;
    traffic.cancel_policy = CancelPolicy::SuppressUntilStateChange;
    traffic.min_on_time_ms = 1_000;
    traffic.template = "Faster car behind: #{value}".into();
    rules.push(traffic);

    let mut limiter = RuleRecord::new("pit.limiter_off", "pit.limiter_off");
    limiter.category = "Pit".into();
    limiter.priority = Priority::High;
    limiter.persistence = PersistencePolicy::ClearOnStateChange;
    limiter.cancel_policy = CancelPolicy::SilenceForDelay;
    limiter.cancel_delay_ms = 10_000;
    limiter.template = "PIT LIMITER OFF".into();
    rules.push(limiter);

    let mut water = RuleRecord::new("engine.water_temp", "engine.water_temp_high");
    water.category = "Engine".into();
    water.priority = Priority::Med;
    water.persistence = PersistencePolicy::ClearOnValueDecrease;
    water.cancel_policy = CancelPolicy::SilenceForDelay;
    water.cancel_delay_ms = 30_000;
    water.cooldown_ms = 10_000;
    water.template = "Water temp {value}°C".into();
    rules.push(water);

    let mut best = RuleRecord::new("lap.personal_best", "lap.personal_best");
    best.category = "Timing".into();
    best.priority = Priority::Low;
    best.persistence = PersistencePolicy::ClearAfterDelay;
    best.persistence_delay_ms = 4_000;
    best.min_on_time_ms = 2_000;
    rules.push(best);

    // Built-in records are unique by construction.
    RuleCatalog {
        rules: rules.into_iter().map(Arc::new).collect(),
    }
}
