use serde_json::Value;

use crate::models::{League, RunStats, TrendReport};
use crate::services::aggregator::{Aggregator, LastSeenPolicy};
use crate::services::event_source::EventSource;
use crate::services::finalizer::build_report;
use crate::services::normalizer::normalize;
use crate::services::odds_correlator::OddsIndex;

/// One aggregation run: normalise, correlate, aggregate, then finalise.
pub struct TrendEngine {
    odds: OddsIndex,
    aggregator: Aggregator,
    stats: RunStats,
}

impl TrendEngine {
    pub fn new(odds: OddsIndex, policy: LastSeenPolicy) -> Self {
        Self {
            odds,
            aggregator: Aggregator::new(policy),
            stats: RunStats::default(),
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Process leagues strictly in the given order. A league whose source
    /// fails contributes nothing and the run carries on.
    pub async fn run<S: EventSource>(&mut self, source: &S, leagues: &[League]) {
        for &league in leagues {
            self.ingest_league(source, league).await;
        }
    }

    pub async fn ingest_league<S: EventSource>(&mut self, source: &S, league: League) {
        self.stats.leagues_requested += 1;

        let events = match source.fetch_league(league).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("Source unavailable for {}: {}", league, e);
                self.stats.leagues_failed.push(league.to_string());
                return;
            }
        };

        let used_before = self.stats.events_used;
        for raw in &events {
            self.ingest_event(raw, league);
        }
        tracing::info!(
            "{}: {} events fetched, {} used",
            league,
            events.len(),
            self.stats.events_used - used_before
        );
    }

    pub fn ingest_event(&mut self, raw: &Value, league: League) {
        self.stats.events_seen += 1;

        let event = match normalize(raw, league) {
            Ok(event) => event,
            Err(reason) => {
                let id = raw.get("id").map(Value::to_string).unwrap_or_default();
                tracing::debug!("Skipping {} event {}: {}", league, id, reason);
                self.stats.events_skipped += 1;
                return;
            }
        };

        let outcome = self.odds.correlate(&event);
        if outcome.is_some() {
            self.stats.events_with_odds += 1;
        }
        self.aggregator.record(&event, outcome.as_ref());
        self.stats.events_used += 1;
    }

    pub fn finish(self, source: &str, notes: &str, generated_at: String) -> TrendReport {
        build_report(self.aggregator, self.stats, source, notes, generated_at)
    }
}
