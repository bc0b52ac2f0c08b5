use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::{Row, RowAccessor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RapmConfig;
use crate::event::{Event, EventTable, GameId, MalformedRow, canonical_game_id};
use crate::lineup::StarterRow;
use crate::metric::TargetMetric;
use crate::pipeline::{DiagnosticsSummary, RapmFit};
use crate::ratings::PlayerRating;
use crate::ridge::SolverKind;
use crate::stint::Stint;

pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StintArtifact {
    pub version: u32,
    pub generated_at: String,
    pub config: RapmConfig,
    #[serde(default)]
    pub diagnostics: Option<DiagnosticsSummary>,
    pub stints: Vec<Stint>,
}

/// Run metadata written next to the rating table. The table itself holds
/// only `PLAYER_ID`/`RAPM` rows so identical inputs give identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRunMeta {
    pub version: u32,
    pub generated_at: String,
    pub alpha: f64,
    pub response_metric: String,
    pub solver: SolverKind,
    pub iterations: Option<usize>,
    pub stints: usize,
    pub players: usize,
}

impl RatingRunMeta {
    pub fn new(fit: &RapmFit, cfg: &RapmConfig) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            alpha: cfg.alpha,
            response_metric: cfg.response_metric.name().to_string(),
            solver: fit.solver,
            iterations: fit.iterations,
            stints: fit.stints,
            players: fit.players,
        }
    }
}

/// `rapm.json` -> `rapm.meta.json`.
pub fn rating_meta_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ratings".to_string());
    path.with_file_name(format!("{stem}.meta.json"))
}

/// Writes the rating rows to `path` and the run metadata to
/// [`rating_meta_path`].
pub fn write_rating_table(path: &Path, fit: &RapmFit, cfg: &RapmConfig) -> Result<PathBuf> {
    write_json_atomic(path, &fit.ratings)?;
    let meta_path = rating_meta_path(path);
    write_json_atomic(&meta_path, &RatingRunMeta::new(fit, cfg))?;
    Ok(meta_path)
}

pub fn read_rating_table(path: &Path) -> Result<Vec<PlayerRating>> {
    read_json(path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFormat {
    Parquet,
    Json,
}

fn table_format(path: &Path) -> Result<TableFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "parquet" | "pq" => Ok(TableFormat::Parquet),
        "json" => Ok(TableFormat::Json),
        _ => bail!(
            "unsupported table format for {} (expected .parquet or .json)",
            path.display()
        ),
    }
}

/// Loads the event table. Rows that fail to parse are returned in
/// [`EventTable::malformed`] rather than failing the load.
pub fn load_events(path: &Path) -> Result<EventTable> {
    let table = match table_format(path)? {
        TableFormat::Json => {
            let rows = read_json::<Vec<serde_json::Value>>(path)?;
            EventTable::from_json_rows(&rows)
        }
        TableFormat::Parquet => read_parquet_events(path)?,
    };
    info!(
        path = %path.display(),
        rows = table.events.len(),
        malformed = table.malformed.len(),
        "loaded event table"
    );
    Ok(table)
}

pub fn load_starters(path: &Path) -> Result<Vec<StarterRow>> {
    let rows = match table_format(path)? {
        TableFormat::Json => read_json::<Vec<StarterRow>>(path)?,
        TableFormat::Parquet => read_parquet_starters(path)?,
    };
    info!(path = %path.display(), rows = rows.len(), "loaded starting-lineup table");
    Ok(rows)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Writes pretty JSON next to `path` and renames it into place.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let raw = serde_json::to_string_pretty(value).context("serialize artifact")?;
    fs::write(&tmp, raw).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    debug!(path = %path.display(), "artifact written");
    Ok(())
}

pub fn read_stint_artifact(path: &Path) -> Result<StintArtifact> {
    let artifact = read_json::<StintArtifact>(path)?;
    if artifact.version != ARTIFACT_VERSION {
        bail!(
            "stint artifact {} has version {} (expected {})",
            path.display(),
            artifact.version,
            ARTIFACT_VERSION
        );
    }
    Ok(artifact)
}

struct Columns {
    names: Vec<String>,
}

impl Columns {
    fn of(reader: &SerializedFileReader<fs::File>) -> Self {
        let names = reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        Self { names }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    fn require(&self, name: &str, path: &Path) -> Result<usize> {
        self.find(name)
            .ok_or_else(|| anyhow!("{} has no {name} column", path.display()))
    }
}

fn open_parquet(path: &Path) -> Result<SerializedFileReader<fs::File>> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    SerializedFileReader::new(file)
        .with_context(|| format!("open parquet reader {}", path.display()))
}

fn read_parquet_events(path: &Path) -> Result<EventTable> {
    let reader = open_parquet(path)?;
    let cols = Columns::of(&reader);
    let game = cols.require("GAME_ID", path)?;
    let period = cols.require("PERIOD", path)?;
    let clock = cols.find("PCTIMESTRING");
    let event_type = cols.find("EVENTMSGTYPE");
    let player1 = cols.find("PLAYER1_ID");
    let player2 = cols.find("PLAYER2_ID");
    let team = cols.find("PLAYER1_TEAM_ID");
    let score = cols.find("SCORE");
    let home = cols.find("HOMEDESCRIPTION");
    let away = cols.find("VISITORDESCRIPTION");

    let mut table = EventTable::default();
    let iter = reader.get_row_iter(None).context("iterate event rows")?;
    for (idx, row) in iter.enumerate() {
        let row = row.context("read event row")?;
        let game_id = read_game_id(&row, game);
        let period = read_u64(&row, Some(period)).and_then(|p| u32::try_from(p).ok());
        let (Some(game_id), Some(period)) = (game_id.clone(), period) else {
            table.malformed.push(MalformedRow {
                row: idx,
                error: if game_id.is_none() {
                    "missing GAME_ID".to_string()
                } else {
                    "missing or non-integer PERIOD".to_string()
                },
                game_id,
            });
            continue;
        };
        table.events.push(Event {
            game_id,
            period,
            clock: read_text(&row, clock),
            event_type: read_i64(&row, event_type),
            player1_id: read_u64(&row, player1),
            player2_id: read_u64(&row, player2),
            team_id: read_u64(&row, team),
            score: read_text(&row, score),
            home_description: read_text(&row, home),
            away_description: read_text(&row, away),
        });
    }
    if !table.malformed.is_empty() {
        debug!(path = %path.display(), rows = table.malformed.len(), "unparseable event rows");
    }
    Ok(table)
}

fn read_parquet_starters(path: &Path) -> Result<Vec<StarterRow>> {
    let reader = open_parquet(path)?;
    let cols = Columns::of(&reader);
    let game = cols.require("GAME_ID", path)?;
    let team = cols.require("TEAM_ID", path)?;
    let player = cols.require("PLAYER_ID", path)?;

    let mut out = Vec::new();
    let iter = reader.get_row_iter(None).context("iterate starter rows")?;
    for row in iter {
        let row = row.context("read starter row")?;
        let (Some(game_id), Some(team_id), Some(player_id)) = (
            read_game_id(&row, game),
            read_u64(&row, Some(team)),
            read_u64(&row, Some(player)),
        ) else {
            continue;
        };
        out.push(StarterRow {
            game_id,
            team_id,
            player_id,
        });
    }
    Ok(out)
}

fn read_game_id(row: &Row, idx: usize) -> Option<GameId> {
    if let Ok(v) = row.get_double(idx) {
        return (v.is_finite() && v >= 0.0 && v.fract() == 0.0)
            .then(|| canonical_game_id(&format!("{v:.0}")));
    }
    read_text(row, Some(idx))
        .filter(|s| !s.trim().is_empty())
        .map(|s| canonical_game_id(&s))
}

fn read_i64(row: &Row, idx: Option<usize>) -> Option<i64> {
    let idx = idx?;
    if let Ok(v) = row.get_long(idx) {
        return Some(v);
    }
    if let Ok(v) = row.get_int(idx) {
        return Some(i64::from(v));
    }
    if let Ok(v) = row.get_double(idx) {
        return (v.is_finite() && v.fract() == 0.0).then_some(v as i64);
    }
    if let Ok(s) = row.get_string(idx) {
        return s.trim().parse::<i64>().ok();
    }
    None
}

fn read_u64(row: &Row, idx: Option<usize>) -> Option<u64> {
    if let Some(v) = read_i64(row, idx) {
        return u64::try_from(v).ok();
    }
    let s = row.get_string(idx?).ok()?;
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
        .map(|v| v as u64)
}

fn read_text(row: &Row, idx: Option<usize>) -> Option<String> {
    let idx = idx?;
    if let Ok(s) = row.get_string(idx) {
        return Some(s.clone());
    }
    read_i64(row, Some(idx)).map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parquet::data_type::{ByteArray, ByteArrayType, DataType, DoubleType, Int32Type, Int64Type};
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
    use parquet::schema::parser::parse_message_type;

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rapm_stints_tables_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn write_column<T: DataType>(col: &mut SerializedColumnWriter<'_>, values: &[Option<T::T>])
    where
        T::T: Clone,
    {
        let defs: Vec<i16> = values.iter().map(|v| i16::from(v.is_some())).collect();
        let data: Vec<T::T> = values.iter().flatten().cloned().collect();
        col.typed::<T>().write_batch(&data, Some(&defs), None).unwrap();
    }

    fn text(values: &[Option<&str>]) -> Vec<Option<ByteArray>> {
        values.iter().map(|v| v.map(ByteArray::from)).collect()
    }

    /// Writes one row group; `fill` is called once per column in schema order.
    fn write_parquet(
        path: &Path,
        schema: &str,
        mut fill: impl FnMut(usize, &mut SerializedColumnWriter<'_>),
    ) {
        let schema = Arc::new(parse_message_type(schema).unwrap());
        let props = Arc::new(WriterProperties::builder().build());
        let file = fs::File::create(path).unwrap();
        let mut writer = SerializedFileWriter::new(file, schema, props).unwrap();
        let mut group = writer.next_row_group().unwrap();
        let mut idx = 0;
        while let Some(mut col) = group.next_column().unwrap() {
            fill(idx, &mut col);
            col.close().unwrap();
            idx += 1;
        }
        group.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn parquet_events_with_mixed_column_types() {
        let path = scratch("events.parquet");
        write_parquet(
            &path,
            "message events {
                OPTIONAL BINARY GAME_ID (UTF8);
                OPTIONAL DOUBLE PERIOD;
                OPTIONAL BINARY PCTIMESTRING (UTF8);
                OPTIONAL INT32 EVENTMSGTYPE;
                OPTIONAL INT64 PLAYER1_ID;
                OPTIONAL DOUBLE player2_id;
                OPTIONAL BINARY PLAYER1_TEAM_ID (UTF8);
                OPTIONAL BINARY SCORE (UTF8);
                OPTIONAL BINARY HOMEDESCRIPTION (UTF8);
                OPTIONAL BINARY VISITORDESCRIPTION (UTF8);
            }",
            |idx, col| match idx {
                0 => write_column::<ByteArrayType>(
                    col,
                    &text(&[
                        Some("0022300001"),
                        Some("22300001"),
                        Some("0022300001"),
                        Some("0022300002"),
                        None,
                    ]),
                ),
                1 => write_column::<DoubleType>(
                    col,
                    &[Some(1.0), Some(1.0), Some(2.0), None, Some(1.0)],
                ),
                2 => write_column::<ByteArrayType>(
                    col,
                    &text(&[Some("12:00"), Some("11:40"), Some("11:05"), Some("10:00"), None]),
                ),
                3 => write_column::<Int32Type>(col, &[Some(12), Some(1), Some(8), Some(1), None]),
                4 => write_column::<Int64Type>(col, &[None, Some(201939), Some(4), None, None]),
                5 => write_column::<DoubleType>(col, &[None, None, Some(11.0), None, None]),
                6 => write_column::<ByteArrayType>(
                    col,
                    &text(&[None, Some("1610612744"), Some("100"), None, None]),
                ),
                7 => write_column::<ByteArrayType>(
                    col,
                    &text(&[Some("0 - 0"), Some("2 - 0"), None, None, None]),
                ),
                8 => write_column::<ByteArrayType>(
                    col,
                    &text(&[None, Some("Layup"), Some("SUB: 11 FOR 4"), None, None]),
                ),
                _ => write_column::<ByteArrayType>(col, &text(&[None; 5])),
            },
        );

        let table = load_events(&path).unwrap();
        assert_eq!(table.events.len(), 3);
        assert!(table.events.iter().all(|e| e.game_id == "0022300001"));

        let shot = &table.events[1];
        assert_eq!(shot.period, 1);
        assert_eq!(shot.clock.as_deref(), Some("11:40"));
        assert_eq!(shot.event_type, Some(1));
        assert_eq!(shot.player1_id, Some(201939));
        assert_eq!(shot.team_id, Some(1610612744));
        assert_eq!(shot.parsed_score(), Some((2, 0)));
        assert_eq!(shot.home_description.as_deref(), Some("Layup"));
        assert_eq!(shot.away_description, None);

        let sub = &table.events[2];
        assert!(sub.is_substitution());
        assert_eq!(sub.period, 2);
        assert_eq!((sub.player1_id, sub.player2_id), (Some(4), Some(11)));
        assert_eq!(sub.team_id, Some(100));
        assert_eq!(sub.score, None);

        assert_eq!(table.malformed.len(), 2);
        assert_eq!(table.malformed[0].row, 3);
        assert_eq!(table.malformed[0].game_id.as_deref(), Some("0022300002"));
        assert_eq!(table.malformed[1].row, 4);
        assert_eq!(table.malformed[1].game_id, None);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn parquet_starters_with_numeric_and_text_ids() {
        let path = scratch("starters.parquet");
        write_parquet(
            &path,
            "message starters {
                OPTIONAL INT64 GAME_ID;
                OPTIONAL DOUBLE TEAM_ID;
                OPTIONAL BINARY PLAYER_ID (UTF8);
            }",
            |idx, col| match idx {
                0 => write_column::<Int64Type>(col, &[Some(22300001), Some(22300001), None]),
                1 => write_column::<DoubleType>(col, &[Some(100.0), Some(200.0), Some(100.0)]),
                _ => write_column::<ByteArrayType>(
                    col,
                    &text(&[Some("1"), Some(" 6 "), Some("2")]),
                ),
            },
        );

        let rows = load_starters(&path).unwrap();
        assert_eq!(
            rows,
            vec![
                StarterRow {
                    game_id: "0022300001".into(),
                    team_id: 100,
                    player_id: 1,
                },
                StarterRow {
                    game_id: "0022300001".into(),
                    team_id: 200,
                    player_id: 6,
                },
            ]
        );

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn rating_meta_sits_next_to_the_table() {
        assert_eq!(
            rating_meta_path(Path::new("data/processed/rapm.json")),
            Path::new("data/processed/rapm.meta.json")
        );
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            table_format(Path::new("data/raw/pbp.parquet")).unwrap(),
            TableFormat::Parquet
        );
        assert_eq!(
            table_format(Path::new("pbp.JSON")).unwrap(),
            TableFormat::Json
        );
        assert!(table_format(Path::new("pbp.csv")).is_err());
    }
}
