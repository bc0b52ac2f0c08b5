use crate::event::Event;

/// Turns the events of one stint into a possession count (always >= 1).
pub trait PossessionEstimator: Send + Sync {
    fn estimate(&self, events: &[Event]) -> u32;
}

/// Heuristic proxy: every non-null home or away action description counts as
/// half a possession. This is not a real possession count; shots, rebounds
/// and turnovers are not inspected.
#[derive(Debug, Clone, Copy)]
pub struct DescriptionCountEstimator {
    pub home_weight: f64,
    pub away_weight: f64,
}

impl Default for DescriptionCountEstimator {
    fn default() -> Self {
        Self {
            home_weight: 0.5,
            away_weight: 0.5,
        }
    }
}

impl PossessionEstimator for DescriptionCountEstimator {
    fn estimate(&self, events: &[Event]) -> u32 {
        let home = events.iter().filter(|e| e.has_home_action()).count() as f64;
        let away = events.iter().filter(|e| e.has_away_action()).count() as f64;
        let raw = (self.home_weight * home + self.away_weight * away).round();
        if raw.is_finite() && raw >= 1.0 {
            raw.min(f64::from(u32::MAX)) as u32
        } else {
            1
        }
    }
}
