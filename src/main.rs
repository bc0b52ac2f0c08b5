//! RAPM command line: segments play-by-play into stints and fits player
//! ratings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rapm_stints::config::RapmConfig;
use rapm_stints::event::ClockOrder;
use rapm_stints::lineup::{SubstitutionOrder, starting_lineups};
use rapm_stints::metric::ResponseMetric;
use rapm_stints::pipeline::{self, DiagnosticsSummary, StintBuild};
use rapm_stints::ratings::PlayerRating;
use rapm_stints::ridge::SolverKind;
use rapm_stints::stint::Stint;
use rapm_stints::synthetic::{self, SyntheticConfig};
use rapm_stints::tables::{self, ARTIFACT_VERSION, StintArtifact};

#[derive(Parser)]
#[command(name = "rapm_stints")]
#[command(about = "Stint segmentation and ridge-regularized plus-minus", long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

/// Flags layered over the `RAPM_*` environment.
#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Ridge regularization strength
    #[arg(long, global = true)]
    alpha: Option<f64>,
    /// Drop stints with fewer estimated possessions
    #[arg(long, global = true)]
    min_possessions: Option<u32>,
    #[arg(long, global = true, value_enum)]
    metric: Option<ResponseMetric>,
    #[arg(long, global = true, value_enum)]
    clock_order: Option<ClockOrder>,
    #[arg(long, global = true, value_enum)]
    substitution_order: Option<SubstitutionOrder>,
    #[arg(long, global = true, value_enum)]
    solver: Option<SolverKind>,
    /// Only process the first N games of the event table
    #[arg(long, global = true)]
    max_games: Option<usize>,
}

impl ConfigArgs {
    fn apply(&self, mut cfg: RapmConfig) -> Result<RapmConfig> {
        if let Some(alpha) = self.alpha {
            if !alpha.is_finite() || alpha < 0.0 {
                bail!("--alpha must be finite and >= 0 (got {alpha})");
            }
            cfg.alpha = alpha;
        }
        if let Some(v) = self.min_possessions {
            cfg.min_stint_possessions = v;
        }
        if let Some(v) = self.metric {
            cfg.response_metric = v;
        }
        if let Some(v) = self.clock_order {
            cfg.clock_order = v;
        }
        if let Some(v) = self.substitution_order {
            cfg.substitution_order = v;
        }
        if let Some(v) = self.solver {
            cfg.solver = v;
        }
        if let Some(v) = self.max_games {
            cfg.max_games = (v > 0).then_some(v);
        }
        Ok(cfg)
    }
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Play-by-play table (.parquet or .json)
    #[arg(long)]
    events: PathBuf,
    /// Starting-lineup table (.parquet or .json)
    #[arg(long)]
    starters: PathBuf,
    /// Write per-game skips, dropped stints and substitution warnings here
    #[arg(long)]
    diagnostics: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Segment play-by-play into stints and write the stint table
    BuildStints {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "data/processed/stints.json")]
        out: PathBuf,
    },
    /// Fit ratings from a stint table written by `build-stints`
    Fit {
        #[arg(long, default_value = "data/processed/stints.json")]
        stints: PathBuf,
        #[arg(long, default_value = "data/processed/rapm.json")]
        out: PathBuf,
        /// Leaderboard rows to print
        #[arg(long, default_value = "20")]
        top: usize,
    },
    /// Build stints and fit ratings in one pass
    Run {
        #[command(flatten)]
        input: InputArgs,
        /// Also keep the intermediate stint table
        #[arg(long)]
        stints_out: Option<PathBuf>,
        #[arg(long, default_value = "data/processed/rapm.json")]
        out: PathBuf,
        #[arg(long, default_value = "20")]
        top: usize,
    },
    /// Generate a seeded synthetic season with known player impacts
    Synth {
        #[arg(long, default_value = "data/synthetic")]
        out_dir: PathBuf,
        #[arg(long, default_value = "40")]
        games: usize,
        #[arg(long, default_value = "6")]
        teams: usize,
        #[arg(long, default_value = "7")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = cli.overrides.apply(RapmConfig::from_env())?;

    match cli.command {
        Command::BuildStints { input, out } => {
            let build = build_from_tables(&input, &cfg)?;
            write_stint_artifact(&out, &cfg, &build)?;
        }
        Command::Fit { stints, out, top } => {
            let artifact = tables::read_stint_artifact(&stints)?;
            let mut rows = artifact.stints;
            if cfg.min_stint_possessions > artifact.config.min_stint_possessions {
                let before = rows.len();
                rows.retain(|s| s.possessions >= cfg.min_stint_possessions);
                info!(
                    removed = before - rows.len(),
                    min = cfg.min_stint_possessions,
                    "re-applied possession minimum"
                );
            }
            fit_and_report(&rows, &cfg, &out, top)?;
        }
        Command::Run {
            input,
            stints_out,
            out,
            top,
        } => {
            let build = build_from_tables(&input, &cfg)?;
            if let Some(path) = stints_out {
                write_stint_artifact(&path, &cfg, &build)?;
            }
            fit_and_report(&build.stints, &cfg, &out, top)?;
        }
        Command::Synth {
            out_dir,
            games,
            teams,
            seed,
        } => {
            let season = synthetic::generate(&SyntheticConfig {
                games,
                teams,
                seed,
                ..SyntheticConfig::default()
            });
            tables::write_json_atomic(&out_dir.join("events.json"), &season.events)?;
            tables::write_json_atomic(&out_dir.join("starters.json"), &season.starters)?;
            tables::write_json_atomic(&out_dir.join("true_impacts.json"), &season.true_impacts)?;
            info!(
                dir = %out_dir.display(),
                games,
                events = season.events.len(),
                players = season.true_impacts.len(),
                "synthetic season written"
            );
        }
    }
    Ok(())
}

fn build_from_tables(input: &InputArgs, cfg: &RapmConfig) -> Result<StintBuild> {
    let events = tables::load_events(&input.events)?;
    let starters = tables::load_starters(&input.starters)?;
    let lineups = starting_lineups(&starters);
    let build = pipeline::build_stints(events, &lineups, cfg);
    if let Some(path) = &input.diagnostics {
        tables::write_json_atomic(path, &build.diagnostics)
            .with_context(|| format!("write diagnostics {}", path.display()))?;
    }
    if build.stints.is_empty() {
        warn!("no stints survived segmentation");
    }
    Ok(build)
}

fn write_stint_artifact(path: &Path, cfg: &RapmConfig, build: &StintBuild) -> Result<()> {
    let artifact = StintArtifact {
        version: ARTIFACT_VERSION,
        generated_at: chrono::Utc::now().to_rfc3339(),
        config: cfg.clone(),
        diagnostics: Some(DiagnosticsSummary::from(&build.diagnostics)),
        stints: build.stints.clone(),
    };
    tables::write_json_atomic(path, &artifact)?;
    info!(path = %path.display(), stints = build.stints.len(), "stint table written");
    Ok(())
}

fn fit_and_report(stints: &[Stint], cfg: &RapmConfig, out: &Path, top: usize) -> Result<()> {
    let fit = pipeline::fit_ratings(stints, cfg).context("ridge fit failed")?;
    let meta = tables::write_rating_table(out, &fit, cfg)?;
    info!(
        path = %out.display(),
        meta = %meta.display(),
        players = fit.players,
        "rating table written"
    );
    print_leaderboard(&fit.ratings, top);
    Ok(())
}

fn print_leaderboard(ratings: &[PlayerRating], top: usize) {
    println!("{:>4}  {:>10}  {:>10}", "rank", "PLAYER_ID", "RAPM");
    for (rank, row) in ratings.iter().take(top).enumerate() {
        println!("{:>4}  {:>10}  {:>+10.4}", rank + 1, row.player_id, row.rating);
    }
}
