use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::models::League;
use crate::services::LastSeenPolicy;

const DEFAULT_EVENTS_DIR: &str = "data/events";
const DEFAULT_ODDS_DIR: &str = "data/odds_snapshots";
const DEFAULT_OUTPUT: &str = "referee_trends.json";
const DEFAULT_FEED_RETRIES: u32 = 3;

/// Settings for one aggregation run. Environment first, CLI flags on top.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub events_dir: PathBuf,
    pub feed_url: Option<String>,
    pub feed_retries: u32,
    pub odds_dir: PathBuf,
    pub output: PathBuf,
    pub csv_dir: Option<PathBuf>,
    pub leagues: Vec<League>,
    pub last_seen: LastSeenPolicy,
    pub source_label: Option<String>,
    pub notes: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            events_dir: PathBuf::from(DEFAULT_EVENTS_DIR),
            feed_url: None,
            feed_retries: DEFAULT_FEED_RETRIES,
            odds_dir: PathBuf::from(DEFAULT_ODDS_DIR),
            output: PathBuf::from(DEFAULT_OUTPUT),
            csv_dir: None,
            leagues: League::ALL.to_vec(),
            last_seen: LastSeenPolicy::default(),
            source_label: None,
            notes: None,
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a comma-separated league list, keeping order and dropping repeats.
pub fn parse_leagues(raw: &str) -> Result<Vec<League>> {
    let mut leagues = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let league: League = part.parse()?;
        if !leagues.contains(&league) {
            leagues.push(league);
        }
    }
    Ok(leagues)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = env_nonempty("REFTRENDS_EVENTS_DIR") {
            config.events_dir = PathBuf::from(dir);
        }
        config.feed_url = env_nonempty("REFTRENDS_FEED_URL");
        if let Some(retries) = env_nonempty("REFTRENDS_FEED_RETRIES") {
            config.feed_retries = retries
                .parse::<u32>()
                .with_context(|| format!("REFTRENDS_FEED_RETRIES must be a number, got '{}'", retries))?
                .clamp(1, 6);
        }
        if let Some(dir) = env_nonempty("REFTRENDS_ODDS_DIR") {
            config.odds_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_nonempty("REFTRENDS_OUTPUT") {
            config.output = PathBuf::from(path);
        }
        config.csv_dir = env_nonempty("REFTRENDS_CSV_DIR").map(PathBuf::from);
        if let Some(list) = env_nonempty("REFTRENDS_LEAGUES") {
            config.leagues = parse_leagues(&list).context("invalid REFTRENDS_LEAGUES")?;
        }
        if let Some(policy) = env_nonempty("REFTRENDS_LAST_SEEN") {
            config.last_seen = LastSeenPolicy::from_str(&policy, true)
                .map_err(|e| anyhow::anyhow!("invalid REFTRENDS_LAST_SEEN: {}", e))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_leagues() {
        let leagues = parse_leagues("nba, NFL,,nba,mma").expect("valid list");
        assert_eq!(leagues, vec![League::Nba, League::Nfl, League::Ufc]);
        assert!(parse_leagues("nfl,cricket").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.leagues.len(), League::ALL.len());
        assert_eq!(config.last_seen, LastSeenPolicy::Processed);
        assert_eq!(config.output, PathBuf::from("referee_trends.json"));
        assert_eq!(config.feed_url, None);
    }
}
