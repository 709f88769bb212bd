// Display style resolution for a selected message.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::model::{Priority, RuleRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStyle {
    pub text_color: String,
    pub background_color: String,
    pub outline_color: String,
    pub font_size: f32,
}

lazy_static! {
    /// Identifiers in the flag category: `flag.yellow`, `Flags_Blue`, `flag-meatball`...
    static ref FLAG_RULE: Regex = Regex::new(r"(?i)^flags?[._\-]").expect("Invalid flag regex");

    /// Checked in order; the first keyword found in the identifier wins.
    static ref FLAG_BACKGROUNDS: Vec<(&'static str, &'static str)> = vec![
        ("meatball", "#FFFF6D00"),
        ("checkered", "#FF9E9E9E"),
        ("yellow", "#FFFFD600"),
        ("blue", "#FF1E88E5"),
        ("green", "#FF2E7D32"),
        ("white", "#FFFFFFFF"),
        ("red", "#FFD50000"),
        ("black", "#FF000000"),
    ];
}

fn tier_default(priority: Priority) -> ResolvedStyle {
    let (text, background, outline, font_size) = match priority {
        Priority::High => ("#FFFFFFFF", "#FFC62828", "#FFFF8A80", 30.0),
        Priority::Med => ("#FF000000", "#FFFFA000", "#FFFFE082", 26.0),
        Priority::Low => ("#FFFFFFFF", "#FF37474F", "#FF90A4AE", 22.0),
    };
    ResolvedStyle {
        text_color: text.to_string(),
        background_color: background.to_string(),
        outline_color: outline.to_string(),
        font_size,
    }
}

fn flag_background(rule_id: &str) -> Option<&'static str> {
    if !FLAG_RULE.is_match(rule_id) {
        return None;
    }
    let id = rule_id.to_lowercase();
    FLAG_BACKGROUNDS
        .iter()
        .find(|(keyword, _)| id.contains(keyword))
        .map(|(_, color)| *color)
}

/// Rule overrides win verbatim; anything unset comes from the priority tier,
/// except flag rules, whose background follows the flag colour.
pub fn resolve_style(rule: &RuleRecord) -> ResolvedStyle {
    let mut style = tier_default(rule.priority);

    if let Some(color) = &rule.style.text_color {
        style.text_color = color.clone();
    }
    if let Some(color) = &rule.style.outline_color {
        style.outline_color = color.clone();
    }
    if let Some(size) = rule.style.font_size {
        style.font_size = size;
    }
    match &rule.style.background_color {
        Some(color) => style.background_color = color.clone(),
        None => {
            if let Some(color) = flag_background(&rule.id) {
                style.background_color = color.to_string();
            }
        }
    }
    style
}
