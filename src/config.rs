use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::event::ClockOrder;
use crate::lineup::SubstitutionOrder;
use crate::metric::ResponseMetric;
use crate::ridge::SolverKind;

pub const DEFAULT_ALPHA: f64 = 200.0;
pub const DEFAULT_MIN_STINT_POSSESSIONS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RapmConfig {
    /// Ridge strength. Large by default because the design has far more
    /// players than independent lineup combinations.
    pub alpha: f64,
    /// Stints with fewer estimated possessions are discarded before the fit.
    pub min_stint_possessions: u32,
    pub response_metric: ResponseMetric,
    pub clock_order: ClockOrder,
    pub substitution_order: SubstitutionOrder,
    pub solver: SolverKind,
    /// Only the first `max_games` games of the event table are processed.
    #[serde(default)]
    pub max_games: Option<usize>,
}

impl Default for RapmConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            min_stint_possessions: DEFAULT_MIN_STINT_POSSESSIONS,
            response_metric: ResponseMetric::default(),
            clock_order: ClockOrder::default(),
            substitution_order: SubstitutionOrder::default(),
            solver: SolverKind::default(),
            max_games: None,
        }
    }
}

impl RapmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by `RAPM_*` keys. Values that do not parse are
    /// logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = read(&lookup, "RAPM_ALPHA", |s| {
            s.parse::<f64>().ok().filter(|a| a.is_finite() && *a >= 0.0)
        }) {
            cfg.alpha = v;
        }
        if let Some(v) = read(&lookup, "RAPM_MIN_STINT_POSSESSIONS", |s| s.parse::<u32>().ok()) {
            cfg.min_stint_possessions = v;
        }
        if let Some(v) = read(&lookup, "RAPM_RESPONSE_METRIC", ResponseMetric::parse) {
            cfg.response_metric = v;
        }
        if let Some(v) = read(&lookup, "RAPM_CLOCK_ORDER", ClockOrder::parse) {
            cfg.clock_order = v;
        }
        if let Some(v) = read(&lookup, "RAPM_SUBSTITUTION_ORDER", SubstitutionOrder::parse) {
            cfg.substitution_order = v;
        }
        if let Some(v) = read(&lookup, "RAPM_SOLVER", SolverKind::parse) {
            cfg.solver = v;
        }
        if let Some(v) = read(&lookup, "RAPM_MAX_GAMES", |s| {
            s.parse::<usize>().ok().filter(|n| *n > 0)
        }) {
            cfg.max_games = Some(v);
        }

        cfg
    }
}

fn read<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = parse(trimmed);
    if parsed.is_none() {
        warn!(key, value = trimmed, "ignoring unparseable config value");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let cfg = RapmConfig::from_lookup(|_| None);
        assert_eq!(cfg, RapmConfig::default());
        assert_eq!(cfg.alpha, 200.0);
        assert_eq!(cfg.min_stint_possessions, 4);
        assert_eq!(cfg.response_metric, ResponseMetric::PtsPerPossDiff);
        assert_eq!(cfg.clock_order, ClockOrder::Chronological);
    }

    #[test]
    fn env_overrides() {
        let cfg = RapmConfig::from_lookup(lookup(&[
            ("RAPM_ALPHA", "50"),
            ("RAPM_MIN_STINT_POSSESSIONS", "2"),
            ("RAPM_RESPONSE_METRIC", "net_rating"),
            ("RAPM_CLOCK_ORDER", "legacy-string"),
            ("RAPM_SUBSTITUTION_ORDER", "in_out"),
            ("RAPM_SOLVER", "cg"),
            ("RAPM_MAX_GAMES", "20"),
        ]));
        assert_eq!(cfg.alpha, 50.0);
        assert_eq!(cfg.min_stint_possessions, 2);
        assert_eq!(cfg.response_metric, ResponseMetric::NetRating);
        assert_eq!(cfg.clock_order, ClockOrder::LegacyString);
        assert_eq!(cfg.substitution_order, SubstitutionOrder::InOut);
        assert_eq!(cfg.solver, SolverKind::ConjugateGradient);
        assert_eq!(cfg.max_games, Some(20));
    }

    #[test]
    fn bad_values_fall_back() {
        let cfg = RapmConfig::from_lookup(lookup(&[
            ("RAPM_ALPHA", "-3"),
            ("RAPM_RESPONSE_METRIC", "vibes"),
            ("RAPM_MAX_GAMES", "0"),
        ]));
        assert_eq!(cfg, RapmConfig::default());
    }
}
