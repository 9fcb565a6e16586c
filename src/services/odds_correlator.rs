//! Historical odds snapshots and the ATS / over-under outcome they imply.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::models::{BettingOutcome, CanonicalEvent, OddsSnapshot, Side, TotalResult};
use crate::utils::{
    canonical_timestamp, normalize_key, normalize_matchup, resolve, resolve_f64, resolve_str,
    team_names_match, FieldPath,
};

/// Separates the matchup and the start time in a correlation key.
pub const KEY_DELIMITER: char = '|';

const RECORD_LISTS: &[FieldPath] = &[&["data"], &["games"], &["odds"], &["items"]];
const MATCHUP: &[FieldPath] = &[&["matchup"]];
const HOME_TEAM: &[FieldPath] = &[&["home_team"], &["homeTeam"]];
const AWAY_TEAM: &[FieldPath] = &[&["away_team"], &["awayTeam"]];
const START_TIME: &[FieldPath] = &[
    &["commenceTime"],
    &["commence_time"],
    &["startTime"],
    &["start_time"],
    &["date"],
];
const FAVORITE: &[FieldPath] = &[&["favoriteTeam"], &["favorite_team"], &["fav_team"]];
const UNDERDOG: &[FieldPath] = &[
    &["underdogTeam"],
    &["underdog_team"],
    &["dog_team"],
];
const SPREAD: &[FieldPath] = &[&["favoriteSpread"], &["fav_spread"], &["spread"]];
const TOTAL: &[FieldPath] = &[&["total"], &["total_line"], &["overUnder"]];

/// Build the lookup key for a matchup and start time. `None` when either
/// half is blank.
pub fn correlation_key(matchup: &str, start_time: &str) -> Option<String> {
    let matchup = normalize_matchup(matchup);
    let start = canonical_timestamp(start_time);
    if matchup.is_empty() || matchup == "@" || start.is_empty() {
        return None;
    }
    Some(format!("{}{}{}", matchup, KEY_DELIMITER, start))
}

/// Matchup string for an event in the `away@home` form used by snapshots.
pub fn event_matchup(event: &CanonicalEvent) -> String {
    format!("{}@{}", event.team(Side::Away), event.team(Side::Home))
}

/// Read one odds record. Records without a usable key are ignored.
pub fn snapshot_from_record(record: &Value) -> Option<OddsSnapshot> {
    let matchup = resolve_str(record, MATCHUP).or_else(|| {
        let home = resolve_str(record, HOME_TEAM)?;
        let away = resolve_str(record, AWAY_TEAM)?;
        Some(format!("{}@{}", away, home))
    })?;
    let start_time = resolve_str(record, START_TIME)?;

    Some(OddsSnapshot {
        matchup,
        start_time,
        favorite_team: resolve_str(record, FAVORITE),
        underdog_team: resolve_str(record, UNDERDOG),
        favorite_spread: resolve_f64(record, SPREAD),
        // 0 was the "no line" sentinel in the snapshot writers.
        total: resolve_f64(record, TOTAL).filter(|line| *line > 0.0),
    })
}

/// In-memory index of every odds snapshot available to a run.
#[derive(Debug, Default)]
pub struct OddsIndex {
    snapshots: HashMap<String, OddsSnapshot>,
}

impl OddsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Insert a snapshot, replacing any earlier one with the same key.
    /// Returns `false` when the snapshot has no usable key.
    pub fn insert(&mut self, snapshot: OddsSnapshot) -> bool {
        let Some(key) = correlation_key(&snapshot.matchup, &snapshot.start_time) else {
            return false;
        };
        if self.snapshots.insert(key, snapshot).is_some() {
            tracing::trace!("Odds: later snapshot replaced an earlier one");
        }
        true
    }

    /// Index every record in a snapshot document (a bare array or an
    /// envelope such as `{"timestamp": ..., "data": [...]}`).
    pub fn ingest_document(&mut self, document: &Value) -> usize {
        let records = match document {
            Value::Array(items) => Some(items),
            other => resolve(other, RECORD_LISTS).and_then(Value::as_array),
        };
        let mut indexed = 0;
        for snapshot in records.into_iter().flatten().filter_map(snapshot_from_record) {
            if self.insert(snapshot) {
                indexed += 1;
            }
        }
        indexed
    }

    /// Load every `*.json` file in `dir`, in file-name order so that later
    /// files win on key collisions. A missing or empty directory yields an
    /// empty index.
    pub async fn load_dir(dir: &Path) -> Self {
        let mut index = Self::new();

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Odds: snapshot dir {} unavailable ({}); ATS/O-U disabled", dir.display(), e);
                return index;
            }
        };

        let mut files: Vec<PathBuf> = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        files.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Odds: failed listing {}: {}", dir.display(), e);
                    break;
                }
            }
        }
        files.sort();

        for path in &files {
            let text = match tokio::fs::read_to_string(path).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Odds: skipping unreadable {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<Value>(&text) {
                Ok(document) => {
                    let n = index.ingest_document(&document);
                    tracing::debug!("Odds: {} records from {}", n, path.display());
                }
                Err(e) => tracing::warn!("Odds: skipping malformed {}: {}", path.display(), e),
            }
        }

        tracing::info!("Odds: indexed {} snapshots from {} files", index.len(), files.len());
        index
    }

    pub fn lookup(&self, event: &CanonicalEvent) -> Option<&OddsSnapshot> {
        let key = correlation_key(&event_matchup(event), &event.start_time)?;
        self.snapshots.get(&key)
    }

    /// Betting outcome for `event`, if a snapshot matches and supports one.
    pub fn correlate(&self, event: &CanonicalEvent) -> Option<BettingOutcome> {
        let Some(snapshot) = self.lookup(event) else {
            let label = event.name.clone().unwrap_or_else(|| event_matchup(event));
            tracing::debug!("Odds: no snapshot for {} at {}", label, event.start_time);
            return None;
        };
        derive_outcome(event, snapshot)
    }
}

/// Map a snapshot team name onto one side of the event: exact normalised
/// match first, then a fuzzy match that must single out one side.
fn resolve_side(event: &CanonicalEvent, team: &str) -> Option<Side> {
    let wanted = normalize_key(team);
    if wanted == normalize_key(&event.home_team) {
        return Some(Side::Home);
    }
    if wanted == normalize_key(&event.away_team) {
        return Some(Side::Away);
    }
    match (
        team_names_match(team, &event.home_team),
        team_names_match(team, &event.away_team),
    ) {
        (true, false) => Some(Side::Home),
        (false, true) => Some(Side::Away),
        _ => None,
    }
}

/// Derive the favorite, ATS and O/U results. Ties against the number are
/// scored as "not covered" / "not over".
pub fn derive_outcome(event: &CanonicalEvent, snapshot: &OddsSnapshot) -> Option<BettingOutcome> {
    let fav_side = snapshot.favorite_team.as_deref().and_then(|t| resolve_side(event, t));
    let dog_side = snapshot.underdog_team.as_deref().and_then(|t| resolve_side(event, t));
    let favorite = match (fav_side, dog_side) {
        (Some(fav), Some(dog)) if fav != dog => Some(fav),
        _ => None,
    };

    let ats_cover = match (favorite, snapshot.favorite_spread) {
        (Some(fav), Some(spread)) => {
            let dog = fav.opposite();
            let margin = event.score(fav) - event.score(dog);
            Some(if margin > spread.abs() { fav } else { dog })
        }
        _ => None,
    };

    let total = snapshot.total.map(|line| {
        if event.total_points() > line {
            TotalResult::Over
        } else {
            TotalResult::Under
        }
    });

    let outcome = BettingOutcome { favorite, ats_cover, total };
    (!outcome.is_empty()).then_some(outcome)
}
