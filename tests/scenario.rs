use std::path::PathBuf;

use rapm_stints::config::RapmConfig;
use rapm_stints::lineup::{LineupError, starting_lineups};
use rapm_stints::pipeline::{SkipReason, build_stints, fit_ratings};
use rapm_stints::ridge::SolverKind;
use rapm_stints::tables::{load_events, load_starters};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn scenario_config() -> RapmConfig {
    RapmConfig {
        alpha: 1.0,
        min_stint_possessions: 1,
        solver: SolverKind::Cholesky,
        ..RapmConfig::default()
    }
}

#[test]
fn two_stints_around_one_substitution() {
    let events =
        load_events(&fixture("scenario_events.json")).expect("events fixture should load");
    let starters =
        load_starters(&fixture("scenario_starters.json")).expect("starters fixture should load");
    let lineups = starting_lineups(&starters);

    let build = build_stints(events, &lineups, &scenario_config());
    assert_eq!(build.stints.len(), 2);

    let first = &build.stints[0];
    assert_eq!(first.game_id, "0022300001");
    assert_eq!((first.team_a, first.team_b), (100, 200));
    assert_eq!((first.start_idx, first.end_idx), (0, 1));
    assert_eq!(first.players_team_a, vec![1, 2, 3, 4, 5]);
    assert_eq!(first.players_team_b, vec![6, 7, 8, 9, 10]);
    assert_eq!(first.pts_diff, 2);
    assert_eq!(first.possessions, 2);
    assert!((first.pts_per_poss_diff - 1.0).abs() < 1e-12);

    let second = &build.stints[1];
    assert_eq!((second.start_idx, second.end_idx), (3, 4));
    assert_eq!(second.players_team_a, vec![1, 2, 3, 5, 11]);
    assert_eq!(second.pts_diff, -1);
    assert_eq!(second.possessions, 1);
    assert!((second.pts_per_poss_diff + 1.0).abs() < 1e-12);
}

#[test]
fn game_without_lineup_is_skipped_and_recorded() {
    let events = load_events(&fixture("scenario_events.json")).unwrap();
    let starters = load_starters(&fixture("scenario_starters.json")).unwrap();
    let build = build_stints(events, &starting_lineups(&starters), &scenario_config());

    let diag = &build.diagnostics;
    assert_eq!(diag.games_seen, 2);
    assert_eq!(diag.games_segmented, 1);
    assert_eq!(diag.skipped_games.len(), 1);
    assert_eq!(diag.skipped_games[0].game_id, "0022300002");
    assert_eq!(
        diag.skipped_games[0].reason,
        SkipReason::Lineup(LineupError::MissingLineup)
    );
    assert!(diag.substitution_warnings.is_empty());
    assert_eq!(diag.games_with_fallback_sides, 0);
}

#[test]
fn ratings_cover_every_player() {
    let events = load_events(&fixture("scenario_events.json")).unwrap();
    let starters = load_starters(&fixture("scenario_starters.json")).unwrap();
    let cfg = scenario_config();
    let build = build_stints(events, &starting_lineups(&starters), &cfg);

    let fit = fit_ratings(&build.stints, &cfg).expect("fit should succeed");
    assert_eq!(fit.players, 11);
    assert_eq!(fit.stints, 2);
    assert_eq!(fit.ratings.len(), 11);

    // Player 4 only shares the +1.0 stint, player 11 only the -1.0 one.
    assert_eq!(fit.ratings.first().map(|r| r.player_id), Some(4));
    assert_eq!(fit.ratings.last().map(|r| r.player_id), Some(11));

    // Closed form at alpha = 1 for the players on court in both stints.
    for row in &fit.ratings {
        match row.player_id {
            1 | 2 | 3 | 5 => assert!((row.rating - 1.0 / 69.0).abs() < 1e-9),
            6..=10 => assert!((row.rating + 1.0 / 69.0).abs() < 1e-9),
            4 => assert!((row.rating - 40.0 / 69.0).abs() < 1e-9),
            11 => assert!((row.rating + 39.0 / 69.0).abs() < 1e-9),
            other => panic!("unexpected player {other}"),
        }
    }
}

#[test]
fn min_possessions_filters_short_stints() {
    let events = load_events(&fixture("scenario_events.json")).unwrap();
    let starters = load_starters(&fixture("scenario_starters.json")).unwrap();
    let cfg = RapmConfig {
        min_stint_possessions: 2,
        ..scenario_config()
    };
    let build = build_stints(events, &starting_lineups(&starters), &cfg);
    assert_eq!(build.stints.len(), 1);
    assert_eq!(build.diagnostics.stints_recorded, 2);
    assert_eq!(build.diagnostics.stints_below_min_possessions, 1);
}

#[test]
fn numeric_and_padded_game_ids_name_the_same_game() {
    let events = load_events(&fixture("scenario_events.json")).unwrap();
    let starters = load_starters(&fixture("scenario_starters_numeric_ids.json")).unwrap();
    assert!(starters.iter().all(|r| r.game_id == "0022300001"));

    let build = build_stints(events, &starting_lineups(&starters), &scenario_config());
    assert_eq!(build.stints.len(), 2);
    assert_eq!(build.diagnostics.games_segmented, 1);
    assert_eq!(build.diagnostics.skipped_games.len(), 1);
    assert_eq!(build.diagnostics.skipped_games[0].game_id, "0022300002");
}

#[test]
fn unparseable_row_excludes_only_its_game() {
    let events =
        load_events(&fixture("malformed_events.json")).expect("bad rows should not fail the load");
    assert_eq!(events.events.len(), 3);
    assert_eq!(events.malformed.len(), 2);

    let starters = load_starters(&fixture("scenario_starters.json")).unwrap();
    let build = build_stints(events, &starting_lineups(&starters), &scenario_config());

    assert_eq!(build.stints.len(), 1);
    assert_eq!(build.stints[0].game_id, "0022300001");
    assert_eq!(build.stints[0].pts_diff, 2);

    let diag = &build.diagnostics;
    assert_eq!(diag.games_seen, 2);
    assert_eq!(diag.games_segmented, 1);
    assert_eq!(diag.skipped_games.len(), 1);
    assert_eq!(diag.skipped_games[0].game_id, "0022300003");
    assert_eq!(diag.skipped_games[0].reason, SkipReason::MalformedRows(1));
    assert_eq!(diag.malformed_rows.len(), 2);
    assert_eq!(diag.malformed_rows[1].game_id, None);
}
