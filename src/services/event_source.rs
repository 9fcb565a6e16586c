use std::path::{Path, PathBuf};

use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::models::League;
use crate::utils::{resolve, FieldPath};

const EVENT_LISTS: &[FieldPath] = &[&["data"], &["events"], &["items"], &["games"]];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no event file for {league} under {}", .dir.display())]
    Missing { league: League, dir: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid event document for {league}: {source}")]
    Parse {
        league: League,
        #[source]
        source: serde_json::Error,
    },
    #[error("feed request for {league} failed: {source}")]
    Http {
        league: League,
        #[source]
        source: reqwest::Error,
    },
    #[error("feed for {league} returned HTTP {status}")]
    Status { league: League, status: StatusCode },
}

/// Supplies the raw events of one league per call.
///
/// Implementations return a finite, possibly empty list; an error means the
/// league is unavailable for this run.
#[allow(async_fn_in_trait)]
pub trait EventSource {
    /// Human-readable label recorded as the report's `source`.
    fn describe(&self) -> String;

    async fn fetch_league(&self, league: League) -> Result<Vec<Value>, SourceError>;
}

/// Pull the event list out of a feed document: a bare array or an envelope
/// such as `{"timestamp": ..., "count": ..., "data": [...]}`.
pub fn extract_events(document: Value) -> Vec<Value> {
    match document {
        Value::Array(items) => items,
        other => resolve(&other, EVENT_LISTS)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

/// Reads per-league dumps (`nfl.json`, or `nfl_latest.json` as written by
/// the fetch jobs) from a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidates(&self, league: League) -> [PathBuf; 2] {
        [
            self.dir.join(format!("{}.json", league)),
            self.dir.join(format!("{}_latest.json", league)),
        ]
    }
}

impl EventSource for DirectorySource {
    fn describe(&self) -> String {
        format!("dir:{}", self.dir.display())
    }

    async fn fetch_league(&self, league: League) -> Result<Vec<Value>, SourceError> {
        for path in self.candidates(league) {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    let document: Value = serde_json::from_str(&text)
                        .map_err(|source| SourceError::Parse { league, source })?;
                    return Ok(extract_events(document));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(SourceError::Io { path, source }),
            }
        }
        Err(SourceError::Missing {
            league,
            dir: self.dir.clone(),
        })
    }
}

/// Fetches each league's completed events from an HTTP feed.
///
/// `base_url` is either a template containing `{league}` or a prefix that
/// the league tag is appended to.
pub struct HttpFeedSource {
    client: Client,
    base_url: String,
    max_attempts: u32,
}

impl HttpFeedSource {
    pub fn new(base_url: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn url_for(&self, league: League) -> String {
        if self.base_url.contains("{league}") {
            self.base_url.replace("{league}", league.as_str())
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), league)
        }
    }
}

impl EventSource for HttpFeedSource {
    fn describe(&self) -> String {
        format!("feed:{}", self.base_url)
    }

    async fn fetch_league(&self, league: League) -> Result<Vec<Value>, SourceError> {
        let url = self.url_for(league);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let resp = self
                .client
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/json")
                .timeout(std::time::Duration::from_secs(12))
                .send()
                .await
                .map_err(|source| SourceError::Http { league, source })?;

            let status = resp.status();
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempts < self.max_attempts {
                let wait = 600 * u64::from(attempts);
                tracing::warn!(
                    "Feed {} returned {}, retrying in {}ms (attempt {}/{})",
                    league, status, wait, attempts, self.max_attempts
                );
                tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
                continue;
            }

            if !status.is_success() {
                return Err(SourceError::Status { league, status });
            }

            let document: Value = resp
                .json()
                .await
                .map_err(|source| SourceError::Http { league, source })?;
            return Ok(extract_events(document));
        }
    }
}
