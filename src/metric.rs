use serde::{Deserialize, Serialize};

use crate::stint::Stint;

/// Regression target computed per stint. Segmentation never depends on it.
pub trait TargetMetric {
    fn name(&self) -> &'static str;
    fn target(&self, stint: &Stint) -> f64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseMetric {
    /// Team-A minus team-B points per possession.
    #[default]
    PtsPerPossDiff,
    /// Same differential scaled to 100 possessions.
    NetRating,
}

impl ResponseMetric {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "pts-per-poss-diff" => Some(Self::PtsPerPossDiff),
            "net-rating" => Some(Self::NetRating),
            _ => None,
        }
    }
}

impl TargetMetric for ResponseMetric {
    fn name(&self) -> &'static str {
        match self {
            ResponseMetric::PtsPerPossDiff => "pts_per_poss_diff",
            ResponseMetric::NetRating => "net_rating",
        }
    }

    fn target(&self, stint: &Stint) -> f64 {
        match self {
            ResponseMetric::PtsPerPossDiff => stint.pts_per_poss_diff,
            ResponseMetric::NetRating => 100.0 * stint.pts_per_poss_diff,
        }
    }
}
