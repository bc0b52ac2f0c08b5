use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::{Event, GameId, PlayerId, TeamId};
use crate::lineup::{LineupError, LineupTracker, SubstitutionOrder, SubstitutionWarning};
use crate::possession::PossessionEstimator;

/// A lineup-stable run of events. `pts_diff` is team A minus team B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stint {
    #[serde(rename = "GAME_ID")]
    pub game_id: GameId,
    #[serde(rename = "PERIOD")]
    pub period: u32,
    pub start_idx: usize,
    pub end_idx: usize,
    #[serde(rename = "teamA")]
    pub team_a: TeamId,
    #[serde(rename = "teamB")]
    pub team_b: TeamId,
    #[serde(rename = "players_teamA")]
    pub players_team_a: Vec<PlayerId>,
    #[serde(rename = "players_teamB")]
    pub players_team_b: Vec<PlayerId>,
    pub possessions: u32,
    pub pts_diff: i32,
    pub pts_per_poss_diff: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StintDropReason {
    NoParseableScore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedStint {
    pub game_id: GameId,
    pub start_idx: usize,
    pub end_idx: usize,
    pub reason: StintDropReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StintOutcome {
    Recorded(Stint),
    Dropped(DroppedStint),
}

/// Which team is "A". The score string is home-away, so team A is always
/// read as the home side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideAssignment {
    pub team_a: TeamId,
    pub team_b: TeamId,
    /// False when the home team could not be identified from the events and
    /// team A fell back to the lower team id.
    pub inferred: bool,
}

impl SideAssignment {
    /// Finds the home team from the first event whose only description is on
    /// one side and whose primary participant belongs to one of the teams.
    pub fn infer(teams: [TeamId; 2], events: &[Event]) -> Self {
        for event in events {
            let Some(team) = event.team_id else {
                continue;
            };
            let Some(slot) = teams.iter().position(|&t| t == team) else {
                continue;
            };
            let home_slot = match (event.has_home_action(), event.has_away_action()) {
                (true, false) => slot,
                (false, true) => 1 - slot,
                _ => continue,
            };
            return Self {
                team_a: teams[home_slot],
                team_b: teams[1 - home_slot],
                inferred: true,
            };
        }
        Self {
            team_a: teams[0],
            team_b: teams[1],
            inferred: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameSegmentation {
    pub game_id: GameId,
    pub sides: SideAssignment,
    pub outcomes: Vec<StintOutcome>,
    pub substitution_warnings: Vec<SubstitutionWarning>,
}

impl GameSegmentation {
    pub fn stints(&self) -> impl Iterator<Item = &Stint> {
        self.outcomes.iter().filter_map(|o| match o {
            StintOutcome::Recorded(s) => Some(s),
            StintOutcome::Dropped(_) => None,
        })
    }

    pub fn dropped(&self) -> impl Iterator<Item = &DroppedStint> {
        self.outcomes.iter().filter_map(|o| match o {
            StintOutcome::Dropped(d) => Some(d),
            StintOutcome::Recorded(_) => None,
        })
    }
}

pub struct StintSegmenter<'a> {
    estimator: &'a dyn PossessionEstimator,
    substitution_order: SubstitutionOrder,
}

impl<'a> StintSegmenter<'a> {
    pub fn new(
        estimator: &'a dyn PossessionEstimator,
        substitution_order: SubstitutionOrder,
    ) -> Self {
        Self {
            estimator,
            substitution_order,
        }
    }

    /// Splits one game's events (already in game order) at every
    /// substitution. Each stint carries the rosters that were on court when
    /// it began.
    pub fn segment_game(
        &self,
        game_id: &str,
        events: &[Event],
        starting: &BTreeMap<TeamId, BTreeSet<PlayerId>>,
    ) -> Result<GameSegmentation, LineupError> {
        let mut tracker = LineupTracker::initialize(game_id, starting)?;
        let sides = SideAssignment::infer(tracker.teams(), events);
        if !sides.inferred {
            debug!(game_id, team_a = sides.team_a, "home team not inferable; using lower team id");
        }

        let mut outcomes = Vec::new();
        let mut substitution_warnings = Vec::new();
        let mut last_index = 0usize;

        for (idx, event) in events.iter().enumerate() {
            if !event.is_substitution() {
                continue;
            }
            if idx > last_index {
                outcomes.push(self.close_stint(events, last_index, idx - 1, &tracker, sides));
            }

            let (player_out, player_in) = self.substitution_order.players(event);
            if let Err(issue) = tracker.apply_substitution(event.team_id, player_out, player_in) {
                warn!(game_id, event_index = idx, ?issue, "substitution issue");
                substitution_warnings.push(SubstitutionWarning {
                    game_id: game_id.to_string(),
                    event_index: idx,
                    issue,
                });
            }
            last_index = idx + 1;
        }

        if last_index < events.len() {
            outcomes.push(self.close_stint(events, last_index, events.len() - 1, &tracker, sides));
        }

        Ok(GameSegmentation {
            game_id: game_id.to_string(),
            sides,
            outcomes,
            substitution_warnings,
        })
    }

    fn close_stint(
        &self,
        events: &[Event],
        start_idx: usize,
        end_idx: usize,
        tracker: &LineupTracker,
        sides: SideAssignment,
    ) -> StintOutcome {
        let span = &events[start_idx..=end_idx];
        let start = span.iter().find_map(Event::parsed_score);
        let end = span.iter().rev().find_map(Event::parsed_score);
        let (Some((start_home, start_away)), Some((end_home, end_away))) = (start, end) else {
            debug!(game_id = tracker.game_id(), start_idx, end_idx, "stint has no parseable score");
            return StintOutcome::Dropped(DroppedStint {
                game_id: tracker.game_id().to_string(),
                start_idx,
                end_idx,
                reason: StintDropReason::NoParseableScore,
            });
        };

        let pts_diff = (end_home - start_home) - (end_away - start_away);
        let possessions = self.estimator.estimate(span).max(1);
        let roster = |team| {
            tracker
                .on_court(team)
                .map(|set| set.iter().copied().collect::<Vec<_>>())
                .unwrap_or_default()
        };

        StintOutcome::Recorded(Stint {
            game_id: tracker.game_id().to_string(),
            period: span[0].period,
            start_idx,
            end_idx,
            team_a: sides.team_a,
            team_b: sides.team_b,
            players_team_a: roster(sides.team_a),
            players_team_b: roster(sides.team_b),
            possessions,
            pts_diff,
            pts_per_poss_diff: f64::from(pts_diff) / f64::from(possessions),
        })
    }
}
