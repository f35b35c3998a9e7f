// src/config/rules.rs
//! Trigger rules per category, with built-in defaults and an optional
//! TOML/JSON override file.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, Weekday};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::category::Category;

pub const ENV_RULES_PATH: &str = "RULES_PATH";
pub const DEFAULT_RULES_TOML: &str = "config/rules.toml";
pub const DEFAULT_RULES_JSON: &str = "config/rules.json";

/// Longest accepted tolerance window: one week.
pub const MAX_TOLERANCE_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A local wall-clock time, every day or only on `weekday`.
    Absolute {
        hour: u32,
        minute: u32,
        weekday: Option<Weekday>,
    },
    /// Relative to an event's time; negative fires before the event.
    EventRelative { offset_minutes: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[serde(alias = "ONCE_PER_DAY")]
    OncePerDay,
    #[serde(alias = "ONCE_PER_EVENT")]
    OncePerEvent,
    #[serde(alias = "ONCE_PER_WEEK")]
    OncePerWeek,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerRule {
    pub trigger: Trigger,
    pub tolerance_minutes: i64,
    pub cardinality: Cardinality,
}

impl TriggerRule {
    pub fn daily_at(hour: u32, minute: u32, tolerance_minutes: i64) -> Self {
        Self {
            trigger: Trigger::Absolute {
                hour,
                minute,
                weekday: None,
            },
            tolerance_minutes,
            cardinality: Cardinality::OncePerDay,
        }
    }

    pub fn weekly_on(weekday: Weekday, hour: u32, minute: u32, tolerance_minutes: i64) -> Self {
        Self {
            trigger: Trigger::Absolute {
                hour,
                minute,
                weekday: Some(weekday),
            },
            tolerance_minutes,
            cardinality: Cardinality::OncePerWeek,
        }
    }

    pub fn per_event(offset_minutes: i64, tolerance_minutes: i64) -> Self {
        Self {
            trigger: Trigger::EventRelative { offset_minutes },
            tolerance_minutes,
            cardinality: Cardinality::OncePerEvent,
        }
    }

    pub fn tolerance(&self) -> Duration {
        Duration::minutes(self.tolerance_minutes)
    }

    pub fn is_event_scoped(&self) -> bool {
        matches!(self.trigger, Trigger::EventRelative { .. })
    }

    pub fn validate(&self) -> Result<()> {
        if self.tolerance_minutes <= 0 || self.tolerance_minutes > MAX_TOLERANCE_MINUTES {
            bail!(
                "tolerance_minutes must be in 1..={MAX_TOLERANCE_MINUTES}, got {}",
                self.tolerance_minutes
            );
        }
        match (self.trigger, self.cardinality) {
            (Trigger::Absolute { hour, minute, .. }, Cardinality::OncePerDay | Cardinality::OncePerWeek) => {
                if hour > 23 || minute > 59 {
                    bail!("invalid trigger time {hour:02}:{minute:02}");
                }
                Ok(())
            }
            (Trigger::EventRelative { offset_minutes }, Cardinality::OncePerEvent) => {
                if offset_minutes.abs() > MAX_TOLERANCE_MINUTES {
                    bail!(
                        "offset_minutes must be within ±{MAX_TOLERANCE_MINUTES}, got {offset_minutes}"
                    );
                }
                Ok(())
            }
            (Trigger::Absolute { .. }, Cardinality::OncePerEvent) => {
                bail!("once_per_event needs an event-relative trigger (offset_minutes)")
            }
            (Trigger::EventRelative { .. }, c) => {
                bail!("{c:?} needs an absolute trigger (hour/minute)")
            }
        }
    }
}

/// One rule per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryRules {
    pub daily: TriggerRule,
    pub reminder: TriggerRule,
    pub results: TriggerRule,
    pub weekly: TriggerRule,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self {
            daily: TriggerRule::daily_at(0, 1, 180),
            reminder: TriggerRule::per_event(-30, 30),
            // Starts late in the evening and runs past midnight.
            results: TriggerRule::daily_at(23, 30, 120),
            weekly: TriggerRule::weekly_on(Weekday::Sun, 18, 0, 180),
        }
    }
}

impl CategoryRules {
    pub fn get(&self, category: Category) -> &TriggerRule {
        match category {
            Category::Daily => &self.daily,
            Category::Reminder => &self.reminder,
            Category::Results => &self.results,
            Category::Weekly => &self.weekly,
        }
    }

    fn get_mut(&mut self, category: Category) -> &mut TriggerRule {
        match category {
            Category::Daily => &mut self.daily,
            Category::Reminder => &mut self.reminder,
            Category::Results => &mut self.results,
            Category::Weekly => &mut self.weekly,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for c in Category::ALL {
            self.get(c)
                .validate()
                .with_context(|| format!("rule for category `{c}`"))?;
        }
        Ok(())
    }
}

/// A partial rule as written in the rules file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    hour: Option<u32>,
    minute: Option<u32>,
    weekday: Option<String>,
    offset_minutes: Option<i64>,
    tolerance_minutes: Option<i64>,
    cardinality: Option<Cardinality>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesFile {
    daily: Option<RawRule>,
    reminder: Option<RawRule>,
    results: Option<RawRule>,
    weekly: Option<RawRule>,
}

impl RawRule {
    fn merge_into(self, base: TriggerRule) -> Result<TriggerRule> {
        let absolute_fields = self.hour.is_some() || self.minute.is_some() || self.weekday.is_some();
        if absolute_fields && self.offset_minutes.is_some() {
            bail!("a rule takes either hour/minute/weekday or offset_minutes, not both");
        }

        let weekday = self
            .weekday
            .as_deref()
            .map(|w| w.parse::<Weekday>().map_err(|_| anyhow!("invalid weekday `{w}`")))
            .transpose()?;

        let trigger = match (self.offset_minutes, base.trigger) {
            (Some(offset_minutes), _) => Trigger::EventRelative { offset_minutes },
            (None, Trigger::Absolute { hour, minute, weekday: base_wd }) => Trigger::Absolute {
                hour: self.hour.unwrap_or(hour),
                minute: self.minute.unwrap_or(minute),
                weekday: weekday.or(base_wd),
            },
            (None, Trigger::EventRelative { .. }) if absolute_fields => Trigger::Absolute {
                hour: self.hour.unwrap_or(0),
                minute: self.minute.unwrap_or(0),
                weekday,
            },
            (None, t) => t,
        };

        // Switching trigger kind without naming a cardinality picks the natural one.
        let kind_changed = matches!(
            (trigger, base.trigger),
            (Trigger::EventRelative { .. }, Trigger::Absolute { .. })
                | (Trigger::Absolute { .. }, Trigger::EventRelative { .. })
        );
        let cardinality = match (self.cardinality, trigger) {
            (Some(c), _) => c,
            (None, _) if !kind_changed => base.cardinality,
            (None, Trigger::EventRelative { .. }) => Cardinality::OncePerEvent,
            (None, Trigger::Absolute { weekday: Some(_), .. }) => Cardinality::OncePerWeek,
            (None, Trigger::Absolute { .. }) => Cardinality::OncePerDay,
        };

        let rule = TriggerRule {
            trigger,
            tolerance_minutes: self.tolerance_minutes.unwrap_or(base.tolerance_minutes),
            cardinality,
        };
        rule.validate()?;
        Ok(rule)
    }
}

fn apply(file: RulesFile, mut rules: CategoryRules) -> Result<CategoryRules> {
    let sections = [
        (Category::Daily, file.daily),
        (Category::Reminder, file.reminder),
        (Category::Results, file.results),
        (Category::Weekly, file.weekly),
    ];
    for (category, raw) in sections {
        if let Some(raw) = raw {
            let merged = raw
                .merge_into(*rules.get(category))
                .with_context(|| format!("rule for category `{category}`"))?;
            *rules.get_mut(category) = merged;
        }
    }
    Ok(rules)
}

/// Parse rule overrides (TOML or JSON) on top of the defaults.
pub fn parse_rules(s: &str, hint_ext: &str) -> Result<CategoryRules> {
    let file: RulesFile = if hint_ext == "json" {
        serde_json::from_str(s).context("parsing rules json")?
    } else {
        match toml::from_str(s) {
            Ok(f) => f,
            Err(toml_err) => serde_json::from_str(s)
                .map_err(|_| anyhow!(toml_err))
                .context("parsing rules toml")?,
        }
    };
    apply(file, CategoryRules::default())
}

pub fn load_rules_from(path: &Path) -> Result<CategoryRules> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading rules from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_rules(&content, ext.as_str())
}

/// Rules via env var + fallbacks:
/// 1) $RULES_PATH
/// 2) config/rules.toml
/// 3) config/rules.json
/// 4) built-in defaults
pub fn load_rules_default<F>(lookup: F) -> Result<CategoryRules>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(p) = lookup(ENV_RULES_PATH).filter(|p| !p.trim().is_empty()) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!("{ENV_RULES_PATH} points to non-existent path {}", pb.display());
        }
        return load_rules_from(&pb);
    }
    for candidate in [DEFAULT_RULES_TOML, DEFAULT_RULES_JSON] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_rules_from(&pb);
        }
    }
    Ok(CategoryRules::default())
}
