//! Seeded play-by-play generator with known player impacts, used by the
//! `synth` command, the benches and the end-to-end tests.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::event::{Event, PlayerId, SUBSTITUTION_EVENT_TYPE, TeamId};
use crate::lineup::{ROSTER_SIZE, StarterRow};

const PERIOD_TENTHS: u32 = 7200;
const FIRST_TEAM_ID: TeamId = 1_610_612_737;
const MADE_SHOT: i64 = 1;
const MISSED_SHOT: i64 = 2;
/// League-average points per possession the simulation is centred on.
const BASE_POINTS_PER_POSSESSION: f64 = 1.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub games: usize,
    pub teams: usize,
    pub roster_size: usize,
    pub periods: u32,
    pub possessions_per_period: u32,
    /// Chance that a substitution precedes any given possession.
    pub substitution_rate: f64,
    /// Player impacts are drawn uniformly from `[-spread, spread]` points
    /// per possession.
    pub impact_spread: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            games: 40,
            teams: 6,
            roster_size: 9,
            periods: 4,
            possessions_per_period: 48,
            substitution_rate: 0.08,
            impact_spread: 0.15,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticSeason {
    pub events: Vec<Event>,
    pub starters: Vec<StarterRow>,
    pub true_impacts: BTreeMap<PlayerId, f64>,
}

struct Side {
    team: TeamId,
    on_court: Vec<PlayerId>,
    bench: Vec<PlayerId>,
}

pub fn generate(cfg: &SyntheticConfig) -> SyntheticSeason {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let teams = cfg.teams.max(2);
    let roster_size = cfg.roster_size.max(ROSTER_SIZE);
    let sub_rate = cfg.substitution_rate.clamp(0.0, 1.0);
    let spread = cfg.impact_spread.abs();

    let rosters: Vec<(TeamId, Vec<PlayerId>)> = (0..teams)
        .map(|t| {
            let team = FIRST_TEAM_ID + t as TeamId;
            let players = (0..roster_size)
                .map(|k| 1_000 + (t * 100 + k) as PlayerId)
                .collect();
            (team, players)
        })
        .collect();

    let mut true_impacts = BTreeMap::new();
    for (_, players) in &rosters {
        for &p in players {
            let impact = if spread > 0.0 {
                rng.gen_range(-spread..=spread)
            } else {
                0.0
            };
            true_impacts.insert(p, impact);
        }
    }

    let mut events = Vec::new();
    let mut starters = Vec::new();
    for g in 0..cfg.games {
        let game_id = format!("00223{:05}", g + 1);
        let home = rng.gen_range(0..teams);
        let away = (home + rng.gen_range(1..teams)) % teams;

        let mut sides = [home, away].map(|t| {
            let (team, mut players) = rosters[t].clone();
            players.shuffle(&mut rng);
            let bench = players.split_off(ROSTER_SIZE);
            Side {
                team,
                on_court: players,
                bench,
            }
        });
        for side in &sides {
            starters.extend(side.on_court.iter().map(|&player_id| StarterRow {
                game_id: game_id.clone(),
                team_id: side.team,
                player_id,
            }));
        }

        simulate_game(
            &mut rng,
            &game_id,
            &mut sides,
            cfg,
            sub_rate,
            &true_impacts,
            &mut events,
        );
    }

    SyntheticSeason {
        events,
        starters,
        true_impacts,
    }
}

fn simulate_game(
    rng: &mut StdRng,
    game_id: &str,
    sides: &mut [Side; 2],
    cfg: &SyntheticConfig,
    sub_rate: f64,
    impacts: &BTreeMap<PlayerId, f64>,
    out: &mut Vec<Event>,
) {
    let mut score = [0u32; 2];
    let step = PERIOD_TENTHS / (cfg.possessions_per_period + 1);
    let base = Event {
        game_id: game_id.to_string(),
        period: 1,
        clock: None,
        event_type: None,
        player1_id: None,
        player2_id: None,
        team_id: None,
        score: None,
        home_description: None,
        away_description: None,
    };

    for period in 1..=cfg.periods.max(1) {
        out.push(Event {
            period,
            clock: Some(format_clock(PERIOD_TENTHS)),
            event_type: Some(12),
            score: Some(format!("{} - {}", score[0], score[1])),
            ..base.clone()
        });

        for k in 0..cfg.possessions_per_period {
            let remaining = PERIOD_TENTHS.saturating_sub((k + 1) * step);
            let clock = format_clock(remaining);

            if rng.gen_bool(sub_rate) {
                let s = usize::from(rng.gen_bool(0.5));
                let side = &mut sides[s];
                if !side.bench.is_empty() {
                    let out_slot = rng.gen_range(0..side.on_court.len());
                    let in_slot = rng.gen_range(0..side.bench.len());
                    std::mem::swap(&mut side.on_court[out_slot], &mut side.bench[in_slot]);
                    let (player_in, player_out) = (side.on_court[out_slot], side.bench[in_slot]);
                    let text = format!("SUB: {player_in} FOR {player_out}");
                    out.push(Event {
                        period,
                        clock: Some(clock.clone()),
                        event_type: Some(SUBSTITUTION_EVENT_TYPE),
                        player1_id: Some(player_out),
                        player2_id: Some(player_in),
                        team_id: Some(side.team),
                        home_description: (s == 0).then(|| text.clone()),
                        away_description: (s == 1).then_some(text),
                        ..base.clone()
                    });
                }
            }

            let offense = (k as usize + period as usize) % 2;
            let defense = 1 - offense;
            let lineup_edge = |s: usize| -> f64 {
                sides[s]
                    .on_court
                    .iter()
                    .map(|p| impacts.get(p).copied().unwrap_or(0.0))
                    .sum()
            };
            let expected =
                BASE_POINTS_PER_POSSESSION + lineup_edge(offense) - lineup_edge(defense);
            let p_score = (expected / 2.2).clamp(0.05, 0.95);
            let shooter = sides[offense].on_court[rng.gen_range(0..ROSTER_SIZE)];

            let (event_type, text) = if rng.gen_bool(p_score) {
                let pts = if rng.gen_bool(0.2) { 3 } else { 2 };
                score[offense] += pts;
                (MADE_SHOT, format!("{shooter} makes {pts}-pt shot"))
            } else {
                (MISSED_SHOT, format!("{shooter} misses shot"))
            };
            out.push(Event {
                period,
                clock: Some(clock),
                event_type: Some(event_type),
                player1_id: Some(shooter),
                team_id: Some(sides[offense].team),
                score: Some(format!("{} - {}", score[0], score[1])),
                home_description: (offense == 0).then(|| text.clone()),
                away_description: (offense == 1).then_some(text),
                ..base.clone()
            });
        }
    }
}

fn format_clock(tenths: u32) -> String {
    let seconds = tenths / 10;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::group_by_game;
    use crate::lineup::starting_lineups;

    fn small() -> SyntheticConfig {
        SyntheticConfig {
            games: 3,
            teams: 4,
            possessions_per_period: 10,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn same_seed_same_season() {
        let a = generate(&small());
        let b = generate(&small());
        assert_eq!(a.events, b.events);
        assert_eq!(a.starters, b.starters);
        assert_eq!(a.true_impacts, b.true_impacts);
    }

    #[test]
    fn every_game_has_two_full_starting_units() {
        let season = generate(&small());
        let lineups = starting_lineups(&season.starters);
        assert_eq!(lineups.len(), 3);
        for teams in lineups.values() {
            assert_eq!(teams.len(), 2);
            assert!(teams.values().all(|p| p.len() == ROSTER_SIZE));
        }
        assert_eq!(group_by_game(season.events).len(), 3);
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(7200), "12:00");
        assert_eq!(format_clock(6555), "10:55");
        assert_eq!(format_clock(9), "0:00");
    }
}
