use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

pub type GameId = String;
pub type TeamId = u64;
pub type PlayerId = u64;

/// `EVENTMSGTYPE` code of a substitution in the play-by-play schema.
pub const SUBSTITUTION_EVENT_TYPE: i64 = 8;

/// One row of the play-by-play log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "GAME_ID", deserialize_with = "game_id_any")]
    pub game_id: GameId,
    #[serde(rename = "PERIOD", deserialize_with = "period_any")]
    pub period: u32,
    #[serde(rename = "PCTIMESTRING", default)]
    pub clock: Option<String>,
    #[serde(rename = "EVENTMSGTYPE", default)]
    pub event_type: Option<i64>,
    #[serde(rename = "PLAYER1_ID", default, deserialize_with = "opt_id_any")]
    pub player1_id: Option<PlayerId>,
    #[serde(rename = "PLAYER2_ID", default, deserialize_with = "opt_id_any")]
    pub player2_id: Option<PlayerId>,
    #[serde(rename = "PLAYER1_TEAM_ID", default, deserialize_with = "opt_id_any")]
    pub team_id: Option<TeamId>,
    #[serde(rename = "SCORE", default)]
    pub score: Option<String>,
    #[serde(rename = "HOMEDESCRIPTION", default)]
    pub home_description: Option<String>,
    #[serde(rename = "VISITORDESCRIPTION", default)]
    pub away_description: Option<String>,
}

impl Event {
    pub fn is_substitution(&self) -> bool {
        self.event_type == Some(SUBSTITUTION_EVENT_TYPE)
    }

    /// Running `(home, away)` score, if this row carries a parseable one.
    pub fn parsed_score(&self) -> Option<(i32, i32)> {
        self.score.as_deref().and_then(parse_score)
    }

    pub fn has_home_action(&self) -> bool {
        self.home_description.is_some()
    }

    pub fn has_away_action(&self) -> bool {
        self.away_description.is_some()
    }

    pub fn clock_tenths(&self) -> Option<u32> {
        self.clock.as_deref().and_then(parse_clock)
    }
}

/// How events are ordered inside a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ClockOrder {
    /// Remaining time descending, i.e. real game order.
    #[default]
    Chronological,
    /// Plain ascending string sort of the clock text. Not chronological for
    /// countdown clocks; only useful to reproduce older stint tables.
    LegacyString,
}

impl ClockOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "chronological" => Some(Self::Chronological),
            "legacy-string" | "legacy" | "string" => Some(Self::LegacyString),
            _ => None,
        }
    }
}

/// Parses a "home-away" score string such as `"54 - 49"`.
pub fn parse_score(raw: &str) -> Option<(i32, i32)> {
    let (home, away) = raw.split_once('-')?;
    let home = home.trim().parse::<i32>().ok()?;
    let away = away.trim().parse::<i32>().ok()?;
    if home < 0 || away < 0 {
        return None;
    }
    Some((home, away))
}

/// Parses a countdown clock into tenths of a second remaining.
///
/// Accepts `MM:SS`, `MM:SS.t`, bare seconds (`45.3`) and the ISO-8601
/// duration form used by newer feeds (`PT11M45.00S`).
pub fn parse_clock(raw: &str) -> Option<u32> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let (minutes, seconds) = if let Some(rest) = s.strip_prefix("PT") {
        let rest = rest.strip_suffix('S').unwrap_or(rest);
        match rest.split_once('M') {
            Some((m, sec)) => (m, if sec.is_empty() { "0" } else { sec }),
            None => ("0", rest),
        }
    } else if let Some((m, sec)) = s.split_once(':') {
        (m, sec)
    } else {
        ("0", s)
    };

    let minutes = minutes.trim().parse::<u32>().ok()?;
    let seconds = seconds.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let tenths = f64::from(minutes) * 600.0 + (seconds * 10.0).round();
    if tenths > f64::from(u32::MAX) {
        return None;
    }
    Some(tenths as u32)
}

/// Splits a mixed event table into per-game streams, keeping games in the
/// order they first appear and events in their input order.
pub fn group_by_game(events: Vec<Event>) -> Vec<(GameId, Vec<Event>)> {
    let mut index: HashMap<GameId, usize> = HashMap::new();
    let mut games: Vec<(GameId, Vec<Event>)> = Vec::new();
    for event in events {
        match index.get(&event.game_id) {
            Some(&slot) => games[slot].1.push(event),
            None => {
                index.insert(event.game_id.clone(), games.len());
                games.push((event.game_id.clone(), vec![event]));
            }
        }
    }
    games
}

/// A row of the event table that could not be read. `game_id` is set when the
/// row still names its game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRow {
    pub row: usize,
    pub game_id: Option<GameId>,
    pub error: String,
}

/// Parsed event rows plus the rows that failed to parse.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    pub events: Vec<Event>,
    pub malformed: Vec<MalformedRow>,
}

impl From<Vec<Event>> for EventTable {
    fn from(events: Vec<Event>) -> Self {
        Self {
            events,
            malformed: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct RowGameId {
    #[serde(rename = "GAME_ID", deserialize_with = "game_id_any")]
    game_id: GameId,
}

impl EventTable {
    /// Deserializes each JSON row on its own, so a bad row is recorded
    /// instead of failing the whole table.
    pub fn from_json_rows(rows: &[serde_json::Value]) -> Self {
        let mut table = Self::default();
        for (row, value) in rows.iter().enumerate() {
            match Event::deserialize(value) {
                Ok(event) => table.events.push(event),
                Err(err) => table.malformed.push(MalformedRow {
                    row,
                    game_id: RowGameId::deserialize(value).ok().map(|r| r.game_id),
                    error: err.to_string(),
                }),
            }
        }
        table
    }
}

/// Orders one game's events by period, then by clock. The sort is stable, so
/// events sharing a timestamp keep their input order.
pub fn sort_game_events(events: &mut [Event], order: ClockOrder) {
    match order {
        ClockOrder::Chronological => {
            events.sort_by_cached_key(|e| {
                let clock = e.clock_tenths();
                (e.period, clock.is_none(), Reverse(clock.unwrap_or(0)))
            });
        }
        ClockOrder::LegacyString => {
            events.sort_by(|a, b| {
                a.period.cmp(&b.period).then_with(|| match (&a.clock, &b.clock) {
                    (Some(x), Some(y)) => x.cmp(y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
            });
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Float(f64),
    Str(String),
}

impl IdRepr {
    fn describe(&self) -> String {
        match self {
            IdRepr::Int(v) => v.to_string(),
            IdRepr::Float(v) => v.to_string(),
            IdRepr::Str(s) => format!("{s:?}"),
        }
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            IdRepr::Int(v) => u64::try_from(*v).ok(),
            IdRepr::Float(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 => Some(*v as u64),
            IdRepr::Float(_) => None,
            IdRepr::Str(s) => {
                let t = s.trim();
                t.parse::<u64>()
                    .ok()
                    .or_else(|| t.parse::<f64>().ok().and_then(|v| IdRepr::Float(v).as_u64()))
            }
        }
    }
}

pub(crate) fn opt_id_any<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<IdRepr>::deserialize(deserializer)?;
    Ok(raw.and_then(|r| r.as_u64()))
}

pub(crate) fn id_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = IdRepr::deserialize(deserializer)?;
    raw.as_u64()
        .ok_or_else(|| serde::de::Error::custom("expected a non-negative integer id"))
}

pub(crate) fn game_id_any<'de, D>(deserializer: D) -> Result<GameId, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = IdRepr::deserialize(deserializer)?;
    if let Some(v) = raw.as_u64() {
        return Ok(numeric_game_id(v));
    }
    match raw {
        IdRepr::Str(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        other => Err(serde::de::Error::custom(format!(
            "bad game id {}",
            other.describe()
        ))),
    }
}

pub(crate) fn period_any<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = IdRepr::deserialize(deserializer)?;
    raw.as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| serde::de::Error::custom("expected a whole-number period"))
}

/// Width of a league game id such as `0022300001`.
pub const GAME_ID_WIDTH: usize = 10;

/// Canonical text form of a numeric game id: zero-padded to
/// [`GAME_ID_WIDTH`], so `22300001`, `"22300001"` and `"0022300001"` all
/// name the same game.
pub fn numeric_game_id(id: u64) -> GameId {
    format!("{id:0width$}", width = GAME_ID_WIDTH)
}

/// Applies [`numeric_game_id`] to ids that are entirely digits and leaves
/// any other id as trimmed text.
pub fn canonical_game_id(raw: &str) -> GameId {
    let trimmed = raw.trim();
    match IdRepr::Str(trimmed.to_string()).as_u64() {
        Some(v) => numeric_game_id(v),
        None => trimmed.to_string(),
    }
}
