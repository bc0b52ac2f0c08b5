use serde::{Deserialize, Serialize};

use crate::event::PlayerId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRating {
    #[serde(rename = "PLAYER_ID")]
    pub player_id: PlayerId,
    #[serde(rename = "RAPM")]
    pub rating: f64,
}

/// Pairs coefficients with their column players and sorts best first; ties
/// go to the lower player id.
pub fn leaderboard(players: &[PlayerId], coefficients: &[f64]) -> Vec<PlayerRating> {
    let mut rows: Vec<PlayerRating> = players
        .iter()
        .zip(coefficients)
        .map(|(&player_id, &rating)| PlayerRating { player_id, rating })
        .collect();
    rows.sort_by(|a, b| {
        b.rating
            .total_cmp(&a.rating)
            .then(a.player_id.cmp(&b.player_id))
    });
    rows
}
