use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RapmConfig;
use crate::design::build_design;
use crate::error::RapmResult;
use crate::event::{EventTable, GameId, MalformedRow, group_by_game, sort_game_events};
use crate::lineup::{LineupError, StartingLineups, SubstitutionWarning};
use crate::metric::TargetMetric;
use crate::possession::{DescriptionCountEstimator, PossessionEstimator};
use crate::ratings::{PlayerRating, leaderboard};
use crate::ridge::{self, SolverKind};
use crate::stint::{DroppedStint, GameSegmentation, Stint, StintSegmenter};

/// Why a whole game was excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Lineup(LineupError),
    /// Some of the game's event rows could not be parsed.
    MalformedRows(usize),
}

impl From<LineupError> for SkipReason {
    fn from(err: LineupError) -> Self {
        SkipReason::Lineup(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedGame {
    pub game_id: GameId,
    pub reason: SkipReason,
}

/// Everything the segmentation stage excluded, and why.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunDiagnostics {
    pub games_seen: usize,
    pub games_segmented: usize,
    pub games_with_fallback_sides: usize,
    pub stints_recorded: usize,
    pub stints_below_min_possessions: usize,
    pub skipped_games: Vec<SkippedGame>,
    pub dropped_stints: Vec<DroppedStint>,
    pub substitution_warnings: Vec<SubstitutionWarning>,
    /// Unparseable event rows, including those that named no game.
    pub malformed_rows: Vec<MalformedRow>,
}

impl RunDiagnostics {
    fn absorb(&mut self, seg: GameSegmentation) {
        self.games_segmented += 1;
        if !seg.sides.inferred {
            self.games_with_fallback_sides += 1;
        }
        self.dropped_stints.extend(seg.dropped().cloned());
        self.substitution_warnings.extend(seg.substitution_warnings);
    }
}

/// Counts-only view of [`RunDiagnostics`], stored alongside the stint table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsSummary {
    pub games_seen: usize,
    pub games_segmented: usize,
    pub games_skipped: usize,
    pub games_with_fallback_sides: usize,
    pub stints_recorded: usize,
    pub stints_dropped_no_score: usize,
    pub stints_below_min_possessions: usize,
    pub substitution_warnings: usize,
    #[serde(default)]
    pub malformed_rows: usize,
}

impl From<&RunDiagnostics> for DiagnosticsSummary {
    fn from(d: &RunDiagnostics) -> Self {
        Self {
            games_seen: d.games_seen,
            games_segmented: d.games_segmented,
            games_skipped: d.skipped_games.len(),
            games_with_fallback_sides: d.games_with_fallback_sides,
            stints_recorded: d.stints_recorded,
            stints_dropped_no_score: d.dropped_stints.len(),
            stints_below_min_possessions: d.stints_below_min_possessions,
            substitution_warnings: d.substitution_warnings.len(),
            malformed_rows: d.malformed_rows.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StintBuild {
    /// Stints of every game, concatenated in game order, already filtered by
    /// the possession minimum.
    pub stints: Vec<Stint>,
    pub diagnostics: RunDiagnostics,
}

pub fn build_stints(
    events: impl Into<EventTable>,
    lineups: &StartingLineups,
    cfg: &RapmConfig,
) -> StintBuild {
    build_stints_with(events, lineups, cfg, &DescriptionCountEstimator::default())
}

/// Segments every game in parallel. Each game gets its own lineup tracker;
/// results are collected in the order games first appear in `events`.
/// A game with any malformed row is excluded as a whole.
pub fn build_stints_with(
    events: impl Into<EventTable>,
    lineups: &StartingLineups,
    cfg: &RapmConfig,
    estimator: &dyn PossessionEstimator,
) -> StintBuild {
    let EventTable { events, malformed } = events.into();
    let mut bad_rows: HashMap<GameId, usize> = HashMap::new();
    let mut bad_order: Vec<GameId> = Vec::new();
    for row in &malformed {
        let Some(game_id) = &row.game_id else {
            warn!(row = row.row, error = %row.error, "unparseable event row without a game id");
            continue;
        };
        let count = bad_rows.entry(game_id.clone()).or_insert_with(|| {
            bad_order.push(game_id.clone());
            0
        });
        *count += 1;
    }

    let mut games = group_by_game(events);
    let known: HashSet<GameId> = games.iter().map(|(id, _)| id.clone()).collect();
    games.extend(
        bad_order
            .into_iter()
            .filter(|id| !known.contains(id))
            .map(|id| (id, Vec::new())),
    );
    if let Some(max) = cfg.max_games {
        games.truncate(max);
    }
    let segmenter = StintSegmenter::new(estimator, cfg.substitution_order);

    let results: Vec<(GameId, Result<GameSegmentation, SkipReason>)> = games
        .into_par_iter()
        .map(|(game_id, mut events)| {
            if let Some(&rows) = bad_rows.get(&game_id) {
                return (game_id, Err(SkipReason::MalformedRows(rows)));
            }
            sort_game_events(&mut events, cfg.clock_order);
            let res = match lineups.get(&game_id) {
                Some(starting) => segmenter.segment_game(&game_id, &events, starting),
                None => Err(LineupError::MissingLineup),
            };
            (game_id, res.map_err(SkipReason::from))
        })
        .collect();

    let mut diagnostics = RunDiagnostics {
        games_seen: results.len(),
        malformed_rows: malformed,
        ..Default::default()
    };
    let mut stints = Vec::new();
    for (game_id, res) in results {
        match res {
            Ok(seg) => {
                stints.extend(seg.stints().cloned());
                diagnostics.absorb(seg);
            }
            Err(reason) => {
                warn!(game_id = %game_id, ?reason, "skipping game");
                diagnostics.skipped_games.push(SkippedGame { game_id, reason });
            }
        }
    }

    diagnostics.stints_recorded = stints.len();
    stints.retain(|s| s.possessions >= cfg.min_stint_possessions);
    diagnostics.stints_below_min_possessions = diagnostics.stints_recorded - stints.len();

    info!(
        games = diagnostics.games_seen,
        segmented = diagnostics.games_segmented,
        skipped = diagnostics.skipped_games.len(),
        recorded = diagnostics.stints_recorded,
        kept = stints.len(),
        dropped_no_score = diagnostics.dropped_stints.len(),
        malformed_rows = diagnostics.malformed_rows.len(),
        substitution_warnings = diagnostics.substitution_warnings.len(),
        "stints built"
    );

    StintBuild {
        stints,
        diagnostics,
    }
}

#[derive(Debug, Clone)]
pub struct RapmFit {
    pub ratings: Vec<PlayerRating>,
    pub solver: SolverKind,
    pub iterations: Option<usize>,
    pub stints: usize,
    pub players: usize,
}

/// Builds the design from `stints` and solves the ridge problem. Fails on an
/// empty stint collection and on a singular system.
pub fn fit_ratings(stints: &[Stint], cfg: &RapmConfig) -> RapmResult<RapmFit> {
    let design = build_design(stints, &cfg.response_metric)?;
    let fit = ridge::fit(&design.x, &design.y, &design.w, cfg.alpha, cfg.solver)?;
    info!(
        stints = stints.len(),
        players = design.players.len(),
        nnz = design.x.nnz(),
        alpha = cfg.alpha,
        metric = cfg.response_metric.name(),
        solver = ?fit.solver,
        "ridge fit complete"
    );
    Ok(RapmFit {
        ratings: leaderboard(&design.players, &fit.coefficients),
        solver: fit.solver,
        iterations: fit.iterations,
        stints: stints.len(),
        players: design.players.len(),
    })
}
