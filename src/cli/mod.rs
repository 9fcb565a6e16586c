use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};

use crate::config::Config;
use crate::models::{League, TrendReport};
use crate::services::{
    write_csv, write_report, DirectorySource, EventSource, HttpFeedSource, OddsIndex, TrendEngine,
};

const DEFAULT_NOTES: &str = "Penalty and point figures are event-level team totals shared by every \
official on the game. ATS rates cover only games with a matched odds snapshot; pushes count as \
non-covers and exact totals as unders.";
const EMPTY_NOTES: &str = "No completed events with officials were found. Add league event dumps \
(or a feed URL) to enable trends.";

pub async fn build_trends(config: &Config) -> Result<()> {
    println!("🧮 Building officiating trends for {} leagues...", config.leagues.len());

    let odds = OddsIndex::load_dir(&config.odds_dir).await;
    if odds.is_empty() {
        println!("⚠️  No odds snapshots in {}; ATS and O/U rates will be empty", config.odds_dir.display());
    } else {
        println!("📥 Loaded {} odds snapshots", odds.len());
    }

    let report = match &config.feed_url {
        Some(url) => {
            let source = HttpFeedSource::new(url.clone(), config.feed_retries);
            run_pass(&source, odds, config).await
        }
        None => {
            let source = DirectorySource::new(config.events_dir.clone());
            run_pass(&source, odds, config).await
        }
    };

    // The CSV export goes first so a failure there leaves no report behind.
    if let Some(dir) = &config.csv_dir {
        write_csv(&report, dir).with_context(|| format!("could not write CSV export to {}", dir.display()))?;
        println!("✅ Wrote CSV export to {}", dir.display());
    }

    write_report(&report, &config.output)
        .await
        .with_context(|| format!("could not write report to {}", config.output.display()))?;
    println!(
        "✅ Wrote {} ({} officials, {} crews)",
        config.output.display(),
        report.officials.len(),
        report.crews.len()
    );

    print_summary(&report);
    Ok(())
}

async fn run_pass<S: EventSource>(source: &S, odds: OddsIndex, config: &Config) -> TrendReport {
    let mut engine = TrendEngine::new(odds, config.last_seen);
    engine.run(source, &config.leagues).await;

    let stats = engine.stats();
    tracing::info!(
        "Run complete: {} events seen, {} used, {} skipped, {} with odds, {} leagues failed",
        stats.events_seen,
        stats.events_used,
        stats.events_skipped,
        stats.events_with_odds,
        stats.leagues_failed.len()
    );
    tracing::info!(
        "Aggregated {} officials and {} crews",
        engine.aggregator().officials().len(),
        engine.aggregator().crews().len()
    );

    let notes = match &config.notes {
        Some(notes) => notes.clone(),
        None if stats.events_used == 0 => EMPTY_NOTES.to_string(),
        None => DEFAULT_NOTES.to_string(),
    };
    let label = config.source_label.clone().unwrap_or_else(|| source.describe());
    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    engine.finish(&label, &notes, generated_at)
}

fn print_summary(report: &TrendReport) {
    let stats = &report.stats;
    println!(
        "📊 {} events seen, {} used, {} skipped, {} matched to odds",
        stats.events_seen, stats.events_used, stats.events_skipped, stats.events_with_odds
    );
    if !stats.leagues_failed.is_empty() {
        println!("⚠️  Unavailable leagues: {}", stats.leagues_failed.join(", "));
    }

    if report.officials.is_empty() {
        println!("📭 No officials to report.");
        return;
    }

    println!("\n🏁 Most active officials:");
    for (i, official) in report.officials.iter().take(5).enumerate() {
        let m = &official.metrics;
        println!(
            "{}. {} ({} games) | {:.3} pen/game | avg total {:.3} | ATS home {} | fav SU {}",
            i + 1,
            official.name,
            m.games_seen,
            m.penalties_per_game,
            m.avg_total_points,
            m.ats_home_cover_rate
                .map_or("n/a".to_string(), |r| format!("{:.2}%", r)),
            m.su_favorite_rate
                .map_or("n/a".to_string(), |r| format!("{:.2}%", r))
        );
    }
}

pub fn show_leagues(config: &Config) {
    println!("🏆 Supported leagues:\n");
    let feed = config.feed_url.as_ref().map(|url| HttpFeedSource::new(url.clone(), 1));
    for league in League::ALL {
        let location = match &feed {
            Some(feed) => feed.url_for(league),
            None => DirectorySource::new(config.events_dir.clone())
                .dir()
                .join(format!("{}.json", league))
                .display()
                .to_string(),
        };
        let selected = if config.leagues.contains(&league) { "•" } else { " " };
        println!("   {} {:<6} {:<45} {}", selected, league, league.feed_path(), location);
    }
    println!("\n💡 Use 'reftrends build --leagues nfl,nba' to limit a run");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_build_trends_end_to_end() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let root = tmp.path();
        let events_dir = root.join("events");
        let odds_dir = root.join("odds");
        tokio::fs::create_dir_all(&events_dir).await.expect("events dir");
        tokio::fs::create_dir_all(&odds_dir).await.expect("odds dir");

        let event = json!({
            "id": "1",
            "home_team": "Boston Celtics",
            "away_team": "Miami Heat",
            "home_score": 110,
            "away_score": 101,
            "completed": true,
            "date_utc": "2024-02-01T00:30:00Z",
            "officials": [{"fullName": "Scott Foster", "position": "Crew Chief", "crewId": "N1"}]
        });
        tokio::fs::write(events_dir.join("nba_latest.json"), json!({"data": [event]}).to_string())
            .await
            .expect("write events");
        let odds = json!([{
            "matchup": "Miami Heat@Boston Celtics",
            "commence_time": "2024-02-01T00:30:00Z",
            "favorite_team": "Boston Celtics",
            "underdog_team": "Miami Heat",
            "fav_spread": -8.5,
            "total": 215.5
        }]);
        tokio::fs::write(odds_dir.join("odds_1.json"), odds.to_string())
            .await
            .expect("write odds");

        let config = Config {
            events_dir,
            odds_dir,
            output: root.join("out").join("referee_trends.json"),
            csv_dir: Some(root.join("csv")),
            leagues: vec![League::Nba, League::Nhl],
            ..Config::default()
        };
        build_trends(&config).await.expect("run succeeds");

        let text = tokio::fs::read_to_string(&config.output).await.expect("report");
        let report: TrendReport = serde_json::from_str(&text).expect("valid report");
        assert_eq!(report.stats.leagues_failed, vec!["nhl".to_string()]);
        assert_eq!(report.officials.len(), 1);
        let m = &report.officials[0].metrics;
        assert_eq!(m.ats_home_cover_rate, Some(100.0));
        assert_eq!(m.under_rate, Some(100.0));
        assert_eq!(m.su_favorite_rate, Some(100.0));
        assert_eq!(report.crews[0].crew_id, "N1");
        assert_eq!(report.notes, DEFAULT_NOTES);
        assert!(root.join("csv").join("crews.csv").exists());
    }

    #[tokio::test]
    async fn test_empty_corpus_still_writes_report() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let root = tmp.path();
        let config = Config {
            events_dir: root.join("missing-events"),
            odds_dir: root.join("missing-odds"),
            output: root.join("referee_trends.json"),
            ..Config::default()
        };
        build_trends(&config).await.expect("run succeeds");

        let text = tokio::fs::read_to_string(&config.output).await.expect("report");
        let report: TrendReport = serde_json::from_str(&text).expect("valid report");
        assert!(report.officials.is_empty());
        assert!(report.crews.is_empty());
        assert_eq!(report.notes, EMPTY_NOTES);
        assert_eq!(report.stats.leagues_failed.len(), League::ALL.len());
    }

    #[tokio::test]
    async fn test_unwritable_output_is_fatal() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let root = tmp.path();
        // A regular file where a directory is expected.
        let blocker = root.join("blocker");
        tokio::fs::write(&blocker, "x").await.expect("blocker");

        let config = Config {
            events_dir: root.join("none"),
            odds_dir: root.join("none"),
            output: blocker.join("referee_trends.json"),
            leagues: vec![League::Nfl],
            ..Config::default()
        };
        assert!(build_trends(&config).await.is_err());
        assert!(!blocker.join("referee_trends.json").exists());
    }

    #[tokio::test]
    async fn test_csv_failure_writes_no_report() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let root = tmp.path();
        let csv_blocker = root.join("csv");
        tokio::fs::write(&csv_blocker, "x").await.expect("blocker");

        let config = Config {
            events_dir: root.join("none"),
            odds_dir: root.join("none"),
            output: root.join("referee_trends.json"),
            csv_dir: Some(csv_blocker),
            leagues: vec![League::Nfl],
            ..Config::default()
        };
        assert!(build_trends(&config).await.is_err());
        assert!(!config.output.exists());
    }
}
