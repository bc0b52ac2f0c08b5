use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::{Event, GameId, PlayerId, TeamId, game_id_any, id_any};

pub const ROSTER_SIZE: usize = 5;

/// One row of the starting-lineup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarterRow {
    #[serde(rename = "GAME_ID", deserialize_with = "game_id_any")]
    pub game_id: GameId,
    #[serde(rename = "TEAM_ID", deserialize_with = "id_any")]
    pub team_id: TeamId,
    #[serde(rename = "PLAYER_ID", deserialize_with = "id_any")]
    pub player_id: PlayerId,
}

/// Starting rosters keyed by game, then by team.
pub type StartingLineups = HashMap<GameId, BTreeMap<TeamId, BTreeSet<PlayerId>>>;

pub fn starting_lineups(rows: &[StarterRow]) -> StartingLineups {
    let mut out: StartingLineups = HashMap::new();
    for row in rows {
        out.entry(row.game_id.clone())
            .or_default()
            .entry(row.team_id)
            .or_default()
            .insert(row.player_id);
    }
    out
}

/// Which participant column of a substitution row leaves the court.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SubstitutionOrder {
    /// `PLAYER1_ID` leaves, `PLAYER2_ID` enters.
    #[default]
    OutIn,
    /// `PLAYER1_ID` enters, `PLAYER2_ID` leaves.
    InOut,
}

impl SubstitutionOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "out-in" => Some(Self::OutIn),
            "in-out" => Some(Self::InOut),
            _ => None,
        }
    }

    /// `(player_out, player_in)` for a substitution row.
    pub fn players(self, event: &Event) -> (Option<PlayerId>, Option<PlayerId>) {
        match self {
            SubstitutionOrder::OutIn => (event.player1_id, event.player2_id),
            SubstitutionOrder::InOut => (event.player2_id, event.player1_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstitutionIssue {
    MissingTeam,
    MissingOutgoing,
    MissingIncoming,
    UnknownTeam(TeamId),
    /// Applied anyway; the roster grows past five.
    OutgoingNotOnCourt(PlayerId),
}

impl SubstitutionIssue {
    /// Whether the substitution was ignored rather than applied.
    pub fn ignored(self) -> bool {
        !matches!(self, SubstitutionIssue::OutgoingNotOnCourt(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstitutionWarning {
    pub game_id: GameId,
    pub event_index: usize,
    pub issue: SubstitutionIssue,
}

/// Why a game produced no stints at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineupError {
    MissingLineup,
    TeamCount(usize),
}

/// The two on-court rosters of one game. Each game owns its own tracker;
/// rosters only change through [`LineupTracker::apply_substitution`].
#[derive(Debug, Clone)]
pub struct LineupTracker {
    game_id: GameId,
    teams: [TeamId; 2],
    on_court: [BTreeSet<PlayerId>; 2],
}

impl LineupTracker {
    pub fn initialize(
        game_id: &str,
        starting: &BTreeMap<TeamId, BTreeSet<PlayerId>>,
    ) -> Result<Self, LineupError> {
        if starting.len() != 2 {
            return Err(LineupError::TeamCount(starting.len()));
        }
        let mut iter = starting.iter();
        let (Some((&team_a, roster_a)), Some((&team_b, roster_b))) = (iter.next(), iter.next())
        else {
            return Err(LineupError::TeamCount(starting.len()));
        };
        for (team, roster) in [(team_a, roster_a), (team_b, roster_b)] {
            if roster.len() != ROSTER_SIZE {
                warn!(
                    game_id,
                    team_id = team,
                    size = roster.len(),
                    "starting roster is not five players"
                );
            }
        }
        Ok(Self {
            game_id: game_id.to_string(),
            teams: [team_a, team_b],
            on_court: [roster_a.clone(), roster_b.clone()],
        })
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Team ids in ascending order.
    pub fn teams(&self) -> [TeamId; 2] {
        self.teams
    }

    pub fn on_court(&self, team_id: TeamId) -> Option<&BTreeSet<PlayerId>> {
        self.slot(team_id).map(|slot| &self.on_court[slot])
    }

    fn slot(&self, team_id: TeamId) -> Option<usize> {
        self.teams.iter().position(|&t| t == team_id)
    }

    /// Swaps `player_out` for `player_in`. Missing ids or an unknown team leave
    /// the roster unchanged; an outgoing player who is not on court is
    /// tolerated and reported.
    pub fn apply_substitution(
        &mut self,
        team_id: Option<TeamId>,
        player_out: Option<PlayerId>,
        player_in: Option<PlayerId>,
    ) -> Result<(), SubstitutionIssue> {
        let team_id = team_id.ok_or(SubstitutionIssue::MissingTeam)?;
        let player_out = player_out.ok_or(SubstitutionIssue::MissingOutgoing)?;
        let player_in = player_in.ok_or(SubstitutionIssue::MissingIncoming)?;
        let slot = self
            .slot(team_id)
            .ok_or(SubstitutionIssue::UnknownTeam(team_id))?;

        let roster = &mut self.on_court[slot];
        let was_on_court = roster.remove(&player_out);
        roster.insert(player_in);
        debug!(
            game_id = %self.game_id,
            team_id,
            player_out,
            player_in,
            "substitution applied"
        );
        if was_on_court {
            Ok(())
        } else {
            Err(SubstitutionIssue::OutgoingNotOnCourt(player_out))
        }
    }
}
