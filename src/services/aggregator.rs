use std::collections::{BTreeMap, BTreeSet, HashMap};

use clap::ValueEnum;

use crate::models::{BettingOutcome, CanonicalEvent, League, Side, TotalResult};

/// How `lastSeen` is updated when an official appears again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LastSeenPolicy {
    /// Overwrite with every processed event (retrieval order).
    #[default]
    Processed,
    /// Keep the greatest start time seen.
    Latest,
}

/// Running counts shared by official and crew accumulators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendCounters {
    pub games_seen: u32,
    pub home_penalties: f64,
    pub away_penalties: f64,
    pub total_points_sum: f64,
    pub totals_count: u32,
    pub over_count: u32,
    pub under_count: u32,
    pub ats_count: u32,
    pub home_cover_count: u32,
    pub away_cover_count: u32,
    /// Events whose snapshot named a favorite on one side of the game.
    pub favorite_count: u32,
    pub favorite_win_count: u32,
    pub favorite_cover_count: u32,
    pub sport_counts: BTreeMap<League, u32>,
    pub last_seen: String,
}

impl TrendCounters {
    fn apply(&mut self, event: &CanonicalEvent, outcome: Option<&BettingOutcome>, policy: LastSeenPolicy) {
        self.games_seen += 1;
        self.home_penalties += event.penalties.home;
        self.away_penalties += event.penalties.away;
        self.total_points_sum += event.total_points();
        self.totals_count += 1;

        if let Some(outcome) = outcome {
            match outcome.total {
                Some(TotalResult::Over) => self.over_count += 1,
                Some(TotalResult::Under) => self.under_count += 1,
                None => {}
            }
            if let Some(side) = outcome.ats_cover {
                self.ats_count += 1;
                match side {
                    Side::Home => self.home_cover_count += 1,
                    Side::Away => self.away_cover_count += 1,
                }
            }
            if let Some(won) = outcome.favorite_won(event) {
                self.favorite_count += 1;
                self.favorite_win_count += u32::from(won);
            }
            if outcome.favorite_covered() == Some(true) {
                self.favorite_cover_count += 1;
            }
        }

        *self.sport_counts.entry(event.sport).or_insert(0) += 1;

        let newer = match policy {
            LastSeenPolicy::Processed => true,
            LastSeenPolicy::Latest => event.start_time > self.last_seen,
        };
        if newer {
            self.last_seen = event.start_time.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfficialAccumulator {
    pub id: String,
    pub name: String,
    pub role_counts: BTreeMap<String, u32>,
    pub crew_ids_seen: BTreeSet<String>,
    pub counters: TrendCounters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrewAccumulator {
    pub crew_id: String,
    pub counters: TrendCounters,
}

/// Insert-or-update store that remembers first-encounter order.
#[derive(Debug)]
struct Ledger<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Ledger<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Ledger<T> {
    fn upsert_with(&mut self, key: &str, create: impl FnOnce() -> T) -> &mut T {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.entries.push(create());
                self.index.insert(key.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[slot]
    }
}

/// Folds canonical events into per-official and per-crew accumulators.
///
/// Owned by a single run; nothing survives once it is finalised.
#[derive(Debug, Default)]
pub struct Aggregator {
    officials: Ledger<OfficialAccumulator>,
    crews: Ledger<CrewAccumulator>,
    policy: LastSeenPolicy,
}

impl Aggregator {
    pub fn new(policy: LastSeenPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Apply one event to every official entry on it. An entry with a crew id
    /// replays the same update against that crew, so a crew listed on three
    /// entries is updated three times.
    pub fn record(&mut self, event: &CanonicalEvent, outcome: Option<&BettingOutcome>) {
        if !event.completed {
            return;
        }
        let policy = self.policy;

        for official in &event.officials {
            let entry = self.officials.upsert_with(&official.id, || OfficialAccumulator {
                id: official.id.clone(),
                name: official.name.clone(),
                role_counts: BTreeMap::new(),
                crew_ids_seen: BTreeSet::new(),
                counters: TrendCounters::default(),
            });
            entry.name = official.name.clone();
            *entry.role_counts.entry(official.role.clone()).or_insert(0) += 1;
            entry.counters.apply(event, outcome, policy);

            let Some(crew_id) = official.crew_id.as_deref() else {
                continue;
            };
            entry.crew_ids_seen.insert(crew_id.to_string());

            let crew = self.crews.upsert_with(crew_id, || CrewAccumulator {
                crew_id: crew_id.to_string(),
                counters: TrendCounters::default(),
            });
            crew.counters.apply(event, outcome, policy);
        }
    }

    pub fn officials(&self) -> &[OfficialAccumulator] {
        &self.officials.entries
    }

    pub fn crews(&self) -> &[CrewAccumulator] {
        &self.crews.entries
    }

    pub fn into_parts(self) -> (Vec<OfficialAccumulator>, Vec<CrewAccumulator>) {
        (self.officials.entries, self.crews.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OfficialAssignment, PenaltyCounts};

    fn official(id: &str, crew: Option<&str>) -> OfficialAssignment {
        OfficialAssignment {
            id: id.to_string(),
            name: format!("Official {}", id),
            role: "Referee".to_string(),
            crew_id: crew.map(str::to_string),
        }
    }

    fn event(sport: League, start: &str, officials: Vec<OfficialAssignment>) -> CanonicalEvent {
        CanonicalEvent {
            sport,
            name: None,
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            home_score: 24.0,
            away_score: 17.0,
            completed: true,
            penalties: PenaltyCounts { home: 5.0, away: 3.0 },
            officials,
            start_time: start.to_string(),
        }
    }

    fn assert_invariants(counters: &TrendCounters) {
        assert!(counters.ats_count <= counters.games_seen);
        assert_eq!(counters.home_cover_count + counters.away_cover_count, counters.ats_count);
        assert!(counters.over_count + counters.under_count <= counters.totals_count);
        assert!(counters.favorite_win_count <= counters.favorite_count);
        assert!(counters.favorite_cover_count <= counters.ats_count);
        assert!(counters.home_penalties >= 0.0 && counters.away_penalties >= 0.0);
    }

    #[test]
    fn test_single_event_without_odds() {
        let mut agg = Aggregator::new(LastSeenPolicy::Processed);
        agg.record(&event(League::Nfl, "2024-09-08T17:00:00Z", vec![official("1", None)]), None);

        assert_eq!(agg.officials().len(), 1);
        assert!(agg.crews().is_empty());
        let c = &agg.officials()[0].counters;
        assert_eq!(c.games_seen, 1);
        assert_eq!(c.totals_count, 1);
        assert_eq!(c.total_points_sum, 41.0);
        assert_eq!(c.ats_count, 0);
        assert_eq!(c.over_count + c.under_count, 0);
        assert_eq!((c.home_penalties, c.away_penalties), (5.0, 3.0));
        assert_invariants(c);
    }

    #[test]
    fn test_outcome_counters() {
        let mut agg = Aggregator::new(LastSeenPolicy::Processed);
        let ev = event(League::Nfl, "t1", vec![official("1", Some("C"))]);
        let covered = BettingOutcome {
            favorite: Some(Side::Home),
            ats_cover: Some(Side::Home),
            total: Some(TotalResult::Under),
        };
        let total_only = BettingOutcome { favorite: None, ats_cover: None, total: Some(TotalResult::Over) };
        let dog_covered = BettingOutcome {
            favorite: Some(Side::Home),
            ats_cover: Some(Side::Away),
            total: None,
        };
        agg.record(&ev, Some(&covered));
        agg.record(&ev, Some(&total_only));
        agg.record(&ev, Some(&dog_covered));
        agg.record(&ev, None);

        let c = &agg.officials()[0].counters;
        assert_eq!(c.games_seen, 4);
        assert_eq!(c.totals_count, 4);
        assert_eq!((c.over_count, c.under_count), (1, 1));
        assert_eq!((c.ats_count, c.home_cover_count, c.away_cover_count), (2, 1, 1));
        // Home favorite won 24-17 both times, covered once.
        assert_eq!((c.favorite_count, c.favorite_win_count, c.favorite_cover_count), (2, 2, 1));
        assert_invariants(c);
        assert_eq!(&agg.crews()[0].counters, c);
    }

    #[test]
    fn test_same_official_across_leagues() {
        let mut agg = Aggregator::new(LastSeenPolicy::Processed);
        agg.record(&event(League::Nfl, "t1", vec![official("9", None)]), None);
        agg.record(&event(League::Ncaaf, "t2", vec![official("9", None)]), None);

        let acc = &agg.officials()[0];
        assert_eq!(acc.counters.games_seen, 2);
        assert_eq!(acc.counters.sport_counts.len(), 2);
        assert_eq!(acc.counters.sport_counts[&League::Nfl], 1);
        assert_eq!(acc.counters.sport_counts[&League::Ncaaf], 1);
        assert_eq!(acc.role_counts["Referee"], 2);
    }

    #[test]
    fn test_crew_replayed_per_official_entry() {
        let mut agg = Aggregator::new(LastSeenPolicy::Processed);
        let ev = event(
            League::Nba,
            "t1",
            vec![
                official("a", Some("C7")),
                official("b", Some("C7")),
                official("c", Some("C7")),
                official("d", None),
            ],
        );
        agg.record(&ev, None);

        assert_eq!(agg.officials().len(), 4);
        assert_eq!(agg.crews().len(), 1);
        let crew = &agg.crews()[0].counters;
        assert_eq!(crew.games_seen, 3);
        assert_eq!(crew.home_penalties, 15.0);
        assert_eq!(crew.away_penalties, 9.0);
        assert_eq!(crew.totals_count, 3);
        assert_eq!(crew.sport_counts[&League::Nba], 3);
        assert_invariants(crew);
        assert!(agg.officials()[0].crew_ids_seen.contains("C7"));
        assert!(agg.officials()[3].crew_ids_seen.is_empty());
    }

    #[test]
    fn test_encounter_order_and_name_last_write() {
        let mut agg = Aggregator::new(LastSeenPolicy::Processed);
        agg.record(&event(League::Nhl, "t1", vec![official("x", None), official("y", None)]), None);
        let mut renamed = official("x", None);
        renamed.name = "X. Renamed".to_string();
        agg.record(&event(League::Nhl, "t2", vec![renamed]), None);

        let ids: Vec<_> = agg.officials().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["x", "y"]);
        assert_eq!(agg.officials()[0].name, "X. Renamed");
    }

    #[test]
    fn test_last_seen_policies() {
        let later = event(League::Mlb, "2024-06-02T00:00:00Z", vec![official("u", None)]);
        let earlier = event(League::Mlb, "2024-06-01T00:00:00Z", vec![official("u", None)]);

        let mut processed = Aggregator::new(LastSeenPolicy::Processed);
        processed.record(&later, None);
        processed.record(&earlier, None);
        assert_eq!(processed.officials()[0].counters.last_seen, "2024-06-01T00:00:00Z");

        let mut latest = Aggregator::new(LastSeenPolicy::Latest);
        latest.record(&later, None);
        latest.record(&earlier, None);
        assert_eq!(latest.officials()[0].counters.last_seen, "2024-06-02T00:00:00Z");
    }

    #[test]
    fn test_incomplete_event_ignored() {
        let mut agg = Aggregator::new(LastSeenPolicy::Processed);
        let mut ev = event(League::Nfl, "t1", vec![official("1", Some("C"))]);
        ev.completed = false;
        agg.record(&ev, None);
        assert!(agg.officials().is_empty());
        assert!(agg.crews().is_empty());
    }
}
