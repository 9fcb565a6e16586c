use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Nfl,
    Ncaaf,
    Nba,
    Ncaab,
    Mlb,
    Nhl,
    Ufc,
}

impl League {
    /// Processing order for a full run.
    pub const ALL: [League; 7] = [
        League::Nfl,
        League::Ncaaf,
        League::Nba,
        League::Ncaab,
        League::Mlb,
        League::Nhl,
        League::Ufc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            League::Nfl => "nfl",
            League::Ncaaf => "ncaaf",
            League::Nba => "nba",
            League::Ncaab => "ncaab",
            League::Mlb => "mlb",
            League::Nhl => "nhl",
            League::Ufc => "ufc",
        }
    }

    /// Sport/league path segment used by ESPN-style feeds.
    pub fn feed_path(&self) -> &'static str {
        match self {
            League::Nfl => "football/leagues/nfl",
            League::Ncaaf => "football/leagues/college-football",
            League::Nba => "basketball/leagues/nba",
            League::Ncaab => "basketball/leagues/mens-college-basketball",
            League::Mlb => "baseball/leagues/mlb",
            League::Nhl => "hockey/leagues/nhl",
            League::Ufc => "mma/leagues/ufc",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown league '{0}' (expected one of nfl, ncaaf, nba, ncaab, mlb, nhl, ufc)")]
pub struct UnknownLeague(pub String);

impl FromStr for League {
    type Err = UnknownLeague;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nfl" => Ok(League::Nfl),
            "ncaaf" | "college-football" | "cfb" => Ok(League::Ncaaf),
            "nba" => Ok(League::Nba),
            "ncaab" | "mens-college-basketball" | "cbb" => Ok(League::Ncaab),
            "mlb" => Ok(League::Mlb),
            "nhl" => Ok(League::Nhl),
            "ufc" | "mma" | "arts" => Ok(League::Ufc),
            other => Err(UnknownLeague(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PenaltyCounts {
    pub home: f64,
    pub away: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfficialAssignment {
    pub id: String,
    pub name: String,
    pub role: String,
    pub crew_id: Option<String>,
}

/// One completed contest reduced to the fields the trend pass needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    pub sport: League,
    pub name: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub home_score: f64,
    pub away_score: f64,
    pub completed: bool,
    pub penalties: PenaltyCounts,
    pub officials: Vec<OfficialAssignment>,
    /// Canonicalised start time (see `utils::canonical_timestamp`).
    pub start_time: String,
}

impl CanonicalEvent {
    pub fn total_points(&self) -> f64 {
        self.home_score + self.away_score
    }

    pub fn score(&self, side: Side) -> f64 {
        match side {
            Side::Home => self.home_score,
            Side::Away => self.away_score,
        }
    }

    pub fn team(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home_team,
            Side::Away => &self.away_team,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OddsSnapshot {
    pub matchup: String,
    pub start_time: String,
    pub favorite_team: Option<String>,
    pub underdog_team: Option<String>,
    /// Signed line on the favorite (normally negative).
    pub favorite_spread: Option<f64>,
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalResult {
    Over,
    Under,
}

/// Betting result derived for one event. Each part is absent when the
/// snapshot could not support it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BettingOutcome {
    /// Side the snapshot names as favorite, when both teams resolve.
    pub favorite: Option<Side>,
    /// Side that covered the spread.
    pub ats_cover: Option<Side>,
    pub total: Option<TotalResult>,
}

impl BettingOutcome {
    pub fn is_empty(&self) -> bool {
        self.favorite.is_none() && self.ats_cover.is_none() && self.total.is_none()
    }

    /// Whether the favorite won outright. Ties are not wins.
    pub fn favorite_won(&self, event: &CanonicalEvent) -> Option<bool> {
        self.favorite
            .map(|fav| event.score(fav) > event.score(fav.opposite()))
    }

    pub fn favorite_covered(&self) -> Option<bool> {
        match (self.favorite, self.ats_cover) {
            (Some(fav), Some(side)) => Some(fav == side),
            _ => None,
        }
    }
}

// Report types

/// Rate and count figures shared by official and crew profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendMetrics {
    pub games_seen: u32,
    pub home_penalties: f64,
    pub away_penalties: f64,
    pub penalties_per_game: f64,
    pub home_penalty_bias_pct: f64,
    pub avg_total_points: f64,
    pub totals_samples: u32,
    pub over_rate: Option<f64>,
    pub under_rate: Option<f64>,
    pub ats_samples: u32,
    pub ats_home_cover_rate: Option<f64>,
    pub ats_away_cover_rate: Option<f64>,
    pub favorite_samples: u32,
    /// Favorite won outright, over `favoriteSamples`.
    pub su_favorite_rate: Option<f64>,
    /// Favorite covered, over `atsSamples`.
    pub ats_favorite_cover_rate: Option<f64>,
    pub sports: BTreeMap<String, u32>,
    pub last_seen: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficialTrend {
    pub id: String,
    pub name: String,
    pub roles: BTreeMap<String, u32>,
    pub crew_ids: BTreeSet<String>,
    #[serde(flatten)]
    pub metrics: TrendMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewTrend {
    pub crew_id: String,
    #[serde(flatten)]
    pub metrics: TrendMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub leagues_requested: u32,
    pub leagues_failed: Vec<String>,
    pub events_seen: u32,
    pub events_used: u32,
    pub events_skipped: u32,
    pub events_with_odds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub generated_at: String,
    pub source: String,
    pub notes: String,
    pub stats: RunStats,
    pub officials: Vec<OfficialTrend>,
    pub crews: Vec<CrewTrend>,
}
