//! Reduces heterogeneous event payloads to a [`CanonicalEvent`].
//!
//! Two payload families are understood: ESPN-style events (a `competitions`
//! array whose first entry carries `competitors`, `officials` and `status`)
//! and the flat game records written by the old fetch scripts
//! (`home_team` / `home_score` / `officials` at the top level). Every field
//! is read through an ordered alias list, so new shapes are usually one more
//! path in the right constant.

use serde_json::Value;
use thiserror::Error;

use crate::models::{CanonicalEvent, League, OfficialAssignment, PenaltyCounts, Side};
use crate::utils::{
    canonical_timestamp, normalize_key, resolve, resolve_bool, resolve_str, value_to_f64,
    FieldPath,
};

/// Lower-cased statistic names that count towards a team's penalty total.
pub const PENALTY_STATS: [&str; 4] = ["penalties", "fouls", "personalfouls", "penalty-minutes"];

pub const DEFAULT_ROLE: &str = "Official";

const COMPLETED: &[FieldPath] = &[
    &["status", "type", "completed"],
    &["status", "completed"],
    &["completed"],
];
const STATE: &[FieldPath] = &[&["status", "type", "state"], &["status", "state"], &["state"]];
const START_TIME: &[FieldPath] = &[
    &["date"],
    &["startDate"],
    &["startTime"],
    &["start_time"],
    &["commence_time"],
    &["commenceTime"],
    &["date_utc"],
];
const EVENT_NAME: &[FieldPath] = &[&["name"], &["shortName"], &["matchup"]];

const HOME_AWAY: &[FieldPath] = &[&["homeAway"], &["home_away"], &["side"]];
const COMPETITOR_TEAM: &[FieldPath] = &[
    &["team", "displayName"],
    &["team", "name"],
    &["team", "shortDisplayName"],
    &["team", "abbreviation"],
    &["displayName"],
    &["name"],
];
const STAT_NAME: &[FieldPath] = &[&["name"], &["label"]];

const FLAT_HOME_TEAM: &[FieldPath] = &[
    &["home_team", "name"],
    &["home_team", "displayName"],
    &["home_team"],
    &["homeTeam"],
];
const FLAT_AWAY_TEAM: &[FieldPath] = &[
    &["away_team", "name"],
    &["away_team", "displayName"],
    &["away_team"],
    &["awayTeam"],
];
const FLAT_HOME_SCORE: &[FieldPath] = &[&["home_score"], &["homeScore"]];
const FLAT_AWAY_SCORE: &[FieldPath] = &[&["away_score"], &["awayScore"]];
const FLAT_HOME_STATS: &[FieldPath] = &[&["home_statistics"], &["homeStatistics"]];
const FLAT_AWAY_STATS: &[FieldPath] = &[&["away_statistics"], &["awayStatistics"]];

const OFFICIAL_LISTS: &[FieldPath] = &[&["officials"], &["referees"], &["refs"]];
const OFFICIAL_ID: &[FieldPath] = &[
    &["id"],
    &["officialId"],
    &["official_id"],
    &["person", "id"],
];
const OFFICIAL_NAME: &[FieldPath] = &[
    &["displayName"],
    &["fullName"],
    &["name"],
    &["person", "fullName"],
    &["person", "displayName"],
];
const OFFICIAL_ROLE: &[FieldPath] = &[
    &["position", "displayName"],
    &["position", "name"],
    &["position"],
    &["role", "displayName"],
    &["role", "name"],
    &["role"],
    &["type"],
];
const CREW_ID: &[FieldPath] = &[
    &["crewId"],
    &["crew_id"],
    &["crew", "id"],
    &["crew", "name"],
    &["crew"],
];

/// Why an event was left out of the aggregation pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("event is not completed")]
    NotCompleted,
    #[error("no competitor tagged {0}")]
    MissingCompetitor(Side),
    #[error("{0} competitor has no team name")]
    MissingTeamName(Side),
    #[error("{side} score '{raw}' is not a non-negative number")]
    InvalidScore { side: Side, raw: String },
    #[error("no officials listed")]
    NoOfficials,
}

/// Team-level view of one side, independent of the payload family.
struct TeamSide<'a> {
    name: String,
    score: Option<&'a Value>,
    statistics: Vec<&'a Value>,
}

/// Normalise one raw event for `sport`.
pub fn normalize(raw: &Value, sport: League) -> Result<CanonicalEvent, SkipReason> {
    let comp = competition(raw);

    if !is_completed(comp, raw) {
        return Err(SkipReason::NotCompleted);
    }

    let home = team_side(comp, raw, Side::Home)?;
    let away = team_side(comp, raw, Side::Away)?;

    let home_score = parse_score(home.score, Side::Home)?;
    let away_score = parse_score(away.score, Side::Away)?;

    let officials = extract_officials(comp, raw);
    if officials.is_empty() {
        return Err(SkipReason::NoOfficials);
    }

    let start_time = resolve_str(comp, START_TIME)
        .or_else(|| resolve_str(raw, START_TIME))
        .map(|ts| canonical_timestamp(&ts))
        .unwrap_or_default();

    Ok(CanonicalEvent {
        sport,
        name: resolve_str(raw, EVENT_NAME),
        penalties: PenaltyCounts {
            home: penalty_total(&home.statistics),
            away: penalty_total(&away.statistics),
        },
        home_team: home.name,
        away_team: away.name,
        home_score,
        away_score,
        completed: true,
        officials,
        start_time,
    })
}

/// First entry of `competitions`, or the event itself for flat payloads.
fn competition(raw: &Value) -> &Value {
    raw.get("competitions")
        .and_then(|c| c.get(0))
        .unwrap_or(raw)
}

fn is_completed(comp: &Value, raw: &Value) -> bool {
    if let Some(flag) = resolve_bool(comp, COMPLETED).or_else(|| resolve_bool(raw, COMPLETED)) {
        return flag;
    }
    resolve_str(comp, STATE)
        .or_else(|| resolve_str(raw, STATE))
        .is_some_and(|state| matches!(state.to_ascii_lowercase().as_str(), "post" | "final"))
}

fn team_side<'a>(comp: &'a Value, raw: &'a Value, side: Side) -> Result<TeamSide<'a>, SkipReason> {
    match comp.get("competitors").and_then(Value::as_array) {
        Some(competitors) => competitor_side(competitors, raw, side),
        None => flat_side(raw, side),
    }
}

fn competitor_side<'a>(
    competitors: &'a [Value],
    raw: &'a Value,
    side: Side,
) -> Result<TeamSide<'a>, SkipReason> {
    let competitor = competitors
        .iter()
        .find(|c| {
            resolve_str(c, HOME_AWAY).is_some_and(|tag| tag.eq_ignore_ascii_case(side.as_str()))
        })
        .ok_or(SkipReason::MissingCompetitor(side))?;

    let name = resolve_str(competitor, COMPETITOR_TEAM).ok_or(SkipReason::MissingTeamName(side))?;

    let mut statistics = stat_entries(competitor.get("statistics"));
    statistics.extend(boxscore_statistics(raw, side, &name));

    Ok(TeamSide {
        name,
        score: resolve(competitor, &[&["score"]]),
        statistics,
    })
}

fn flat_side(raw: &Value, side: Side) -> Result<TeamSide<'_>, SkipReason> {
    let (team_paths, score_paths, stat_paths) = match side {
        Side::Home => (FLAT_HOME_TEAM, FLAT_HOME_SCORE, FLAT_HOME_STATS),
        Side::Away => (FLAT_AWAY_TEAM, FLAT_AWAY_SCORE, FLAT_AWAY_STATS),
    };

    if resolve(raw, team_paths).is_none() {
        return Err(SkipReason::MissingCompetitor(side));
    }
    let name = resolve_str(raw, team_paths).ok_or(SkipReason::MissingTeamName(side))?;

    Ok(TeamSide {
        name,
        score: resolve(raw, score_paths),
        statistics: stat_entries(resolve(raw, stat_paths)),
    })
}

/// Absent scores count as 0; present but unusable ones reject the event.
fn parse_score(score: Option<&Value>, side: Side) -> Result<f64, SkipReason> {
    let Some(value) = score else {
        return Ok(0.0);
    };
    match value_to_f64(value) {
        Some(points) if points >= 0.0 => Ok(points),
        _ => Err(SkipReason::InvalidScore {
            side,
            raw: value.to_string(),
        }),
    }
}

/// Flatten a statistics array, descending one level into category blocks
/// (`{"name": "general", "stats": [...]}`).
fn stat_entries(list: Option<&Value>) -> Vec<&Value> {
    let Some(items) = list.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .flat_map(|item| match item.get("stats").and_then(Value::as_array) {
            Some(nested) => nested.iter().collect::<Vec<_>>(),
            None => vec![item],
        })
        .collect()
}

/// Statistics from a `boxscore.teams` block matched by side tag or team name.
fn boxscore_statistics<'a>(raw: &'a Value, side: Side, team_name: &str) -> Vec<&'a Value> {
    let Some(teams) = raw
        .get("boxscore")
        .and_then(|b| b.get("teams"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let wanted = normalize_key(team_name);
    teams
        .iter()
        .filter(|team| {
            let tagged = resolve_str(team, HOME_AWAY)
                .is_some_and(|tag| tag.eq_ignore_ascii_case(side.as_str()));
            let named = resolve_str(team, COMPETITOR_TEAM)
                .is_some_and(|name| normalize_key(&name) == wanted);
            tagged || named
        })
        .flat_map(|team| stat_entries(team.get("statistics")))
        .collect()
}

fn penalty_total(statistics: &[&Value]) -> f64 {
    statistics
        .iter()
        .filter(|stat| {
            resolve_str(stat, STAT_NAME)
                .is_some_and(|name| PENALTY_STATS.contains(&name.to_lowercase().as_str()))
        })
        .map(|stat| value_to_f64(stat).unwrap_or(0.0).max(0.0))
        .sum()
}

fn extract_officials(comp: &Value, raw: &Value) -> Vec<OfficialAssignment> {
    let list = resolve(comp, OFFICIAL_LISTS)
        .or_else(|| resolve(raw, OFFICIAL_LISTS))
        .and_then(Value::as_array);
    let Some(entries) = list else {
        return Vec::new();
    };

    let event_crew = resolve_str(comp, CREW_ID).or_else(|| resolve_str(raw, CREW_ID));

    entries
        .iter()
        .filter_map(|entry| official_from_entry(entry, event_crew.as_deref()))
        .collect()
}

fn official_from_entry(entry: &Value, event_crew: Option<&str>) -> Option<OfficialAssignment> {
    match entry {
        Value::String(name) => {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(OfficialAssignment {
                id: normalize_key(name),
                name: name.to_string(),
                role: DEFAULT_ROLE.to_string(),
                crew_id: event_crew.map(str::to_string),
            })
        }
        Value::Object(_) => {
            let name = resolve_str(entry, OFFICIAL_NAME)?;
            let id = resolve_str(entry, OFFICIAL_ID).unwrap_or_else(|| normalize_key(&name));
            Some(OfficialAssignment {
                id,
                role: resolve_str(entry, OFFICIAL_ROLE).unwrap_or_else(|| DEFAULT_ROLE.to_string()),
                crew_id: resolve_str(entry, CREW_ID).or_else(|| event_crew.map(str::to_string)),
                name,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn espn_event() -> Value {
        json!({
            "id": "401671789",
            "name": "New York Jets at Buffalo Bills",
            "date": "2024-09-08T17:00Z",
            "competitions": [{
                "status": {"type": {"completed": true, "state": "post"}},
                "competitors": [
                    {
                        "homeAway": "home",
                        "score": "24",
                        "team": {"displayName": "Buffalo Bills"},
                        "statistics": [
                            {"name": "penalties", "displayValue": "6"},
                            {"name": "totalYards", "value": 388}
                        ]
                    },
                    {
                        "homeAway": "away",
                        "score": {"value": 17.0},
                        "team": {"displayName": "New York Jets"},
                        "statistics": [{"name": "Penalties", "value": 4}]
                    }
                ],
                "officials": [
                    {"id": "77", "displayName": "Shawn Hochuli", "position": {"displayName": "Referee"}, "crewId": "C1"},
                    {"person": {"fullName": "  Terry   Killens "}, "role": "Umpire"},
                    {"position": {"name": "Line Judge"}}
                ]
            }]
        })
    }

    #[test]
    fn test_normalize_espn_event() {
        let event = normalize(&espn_event(), League::Nfl).expect("event should normalise");
        assert_eq!(event.home_team, "Buffalo Bills");
        assert_eq!(event.away_team, "New York Jets");
        assert_eq!(event.home_score, 24.0);
        assert_eq!(event.away_score, 17.0);
        assert_eq!(event.total_points(), 41.0);
        assert_eq!(event.penalties, PenaltyCounts { home: 6.0, away: 4.0 });
        assert_eq!(event.start_time, "2024-09-08T17:00:00Z");
        assert_eq!(event.sport, League::Nfl);
        assert!(event.completed);
    }

    #[test]
    fn test_officials_aliases_and_dropped_entries() {
        let event = normalize(&espn_event(), League::Nfl).expect("event should normalise");
        assert_eq!(event.officials.len(), 2, "nameless entry is dropped");

        let referee = &event.officials[0];
        assert_eq!(referee.id, "77");
        assert_eq!(referee.role, "Referee");
        assert_eq!(referee.crew_id.as_deref(), Some("C1"));

        let umpire = &event.officials[1];
        assert_eq!(umpire.id, "terry killens");
        assert_eq!(umpire.name, "Terry   Killens");
        assert_eq!(umpire.role, "Umpire");
        assert_eq!(umpire.crew_id, None);
    }

    #[test]
    fn test_incomplete_event_skipped() {
        let mut raw = espn_event();
        raw["competitions"][0]["status"]["type"]["completed"] = json!(false);
        assert_eq!(normalize(&raw, League::Nfl), Err(SkipReason::NotCompleted));
    }

    #[test]
    fn test_state_post_counts_as_completed() {
        let mut raw = espn_event();
        raw["competitions"][0]["status"] = json!({"type": {"state": "post"}});
        assert!(normalize(&raw, League::Nfl).is_ok());
    }

    #[test]
    fn test_missing_home_tag_skipped() {
        let mut raw = espn_event();
        raw["competitions"][0]["competitors"][0]["homeAway"] = json!("neutral");
        assert_eq!(
            normalize(&raw, League::Nfl),
            Err(SkipReason::MissingCompetitor(Side::Home))
        );
    }

    #[test]
    fn test_bad_score_skipped_but_absent_score_is_zero() {
        let mut raw = espn_event();
        raw["competitions"][0]["competitors"][1]["score"] = json!("-3");
        assert!(matches!(
            normalize(&raw, League::Nfl),
            Err(SkipReason::InvalidScore { side: Side::Away, .. })
        ));

        let mut raw = espn_event();
        raw["competitions"][0]["competitors"][1]
            .as_object_mut()
            .expect("competitor is an object")
            .remove("score");
        let event = normalize(&raw, League::Nfl).expect("absent score defaults");
        assert_eq!(event.away_score, 0.0);
    }

    #[test]
    fn test_no_officials_skipped() {
        let mut raw = espn_event();
        raw["competitions"][0]["officials"] = json!([{"role": "Referee"}]);
        assert_eq!(normalize(&raw, League::Nfl), Err(SkipReason::NoOfficials));
    }

    #[test]
    fn test_penalty_vocabulary_and_bad_values() {
        let mut raw = espn_event();
        raw["competitions"][0]["competitors"][0]["statistics"] = json!([
            {"name": "fouls", "value": 12},
            {"name": "personalFouls", "displayValue": "3"},
            {"name": "penalty-minutes", "value": "n/a"},
            {"name": "turnovers", "value": 9},
            {"name": "general", "stats": [{"name": "PENALTIES", "value": 2}]}
        ]);
        let event = normalize(&raw, League::Nba).expect("event should normalise");
        assert_eq!(event.penalties.home, 17.0);
    }

    #[test]
    fn test_boxscore_statistics_are_merged() {
        let mut raw = espn_event();
        raw["boxscore"] = json!({"teams": [
            {"team": {"displayName": "New York Jets"}, "statistics": [{"name": "penalties", "value": 3}]},
            {"homeAway": "home", "statistics": [{"name": "penalties", "value": 1}]}
        ]});
        let event = normalize(&raw, League::Nfl).expect("event should normalise");
        assert_eq!(event.penalties, PenaltyCounts { home: 7.0, away: 7.0 });
    }

    #[test]
    fn test_flat_record_with_event_crew() {
        let raw = json!({
            "sport": "nhl",
            "name": "Rangers at Bruins",
            "date_utc": "2024-10-12T23:00:00Z",
            "completed": true,
            "home_team": {"name": "Boston Bruins"},
            "away_team": "New York Rangers",
            "home_score": 3,
            "away_score": 2.0,
            "home_statistics": [{"name": "penalty-minutes", "value": 8}],
            "crew": {"id": "NHL-12"},
            "referees": ["Wes McCauley", {"fullName": "Kyle Rehman", "crewId": "NHL-9"}]
        });
        let event = normalize(&raw, League::Nhl).expect("flat record should normalise");
        assert_eq!(event.home_team, "Boston Bruins");
        assert_eq!(event.away_team, "New York Rangers");
        assert_eq!(event.penalties, PenaltyCounts { home: 8.0, away: 0.0 });
        assert_eq!(event.officials[0].id, "wes mccauley");
        assert_eq!(event.officials[0].role, DEFAULT_ROLE);
        assert_eq!(event.officials[0].crew_id.as_deref(), Some("NHL-12"));
        assert_eq!(event.officials[1].crew_id.as_deref(), Some("NHL-9"));
    }

    #[test]
    fn test_flat_record_without_team_is_missing_competitor() {
        let raw = json!({"completed": true, "home_team": "A", "officials": ["X"]});
        assert_eq!(
            normalize(&raw, League::Nfl),
            Err(SkipReason::MissingCompetitor(Side::Away))
        );
    }

    #[test]
    fn test_flat_record_role_object() {
        let raw = json!({
            "completed": true,
            "date_utc": "2024-09-08T17:00:00Z",
            "home_team": "Buffalo Bills",
            "away_team": "New York Jets",
            "home_score": 24,
            "away_score": 17,
            "officials": [
                {"name": "Bill Vinovich", "role": {"name": "Referee", "displayName": "Referee"}},
                {"name": "Mike Carr", "role": {"name": "Umpire"}},
                {"name": "Sarah Thomas", "role": "Down Judge"}
            ]
        });
        let event = normalize(&raw, League::Nfl).expect("flat record should normalise");
        let roles: Vec<_> = event.officials.iter().map(|o| o.role.as_str()).collect();
        assert_eq!(roles, ["Referee", "Umpire", "Down Judge"]);
    }
}
