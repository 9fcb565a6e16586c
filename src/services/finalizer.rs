use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{CrewTrend, OfficialTrend, RunStats, TrendMetrics, TrendReport};
use crate::services::aggregator::{Aggregator, CrewAccumulator, OfficialAccumulator, TrendCounters};
use crate::utils::{rate_pct, round_to};

/// Decimal places for penalty and point figures.
pub const COUNT_PRECISION: i32 = 3;
/// Decimal places for percentages.
pub const PCT_PRECISION: i32 = 2;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialise report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write CSV {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

pub fn metrics(counters: &TrendCounters) -> TrendMetrics {
    let penalties = counters.home_penalties + counters.away_penalties;
    TrendMetrics {
        games_seen: counters.games_seen,
        home_penalties: round_to(counters.home_penalties, COUNT_PRECISION),
        away_penalties: round_to(counters.away_penalties, COUNT_PRECISION),
        penalties_per_game: round_to(penalties / counters.games_seen.max(1) as f64, COUNT_PRECISION),
        home_penalty_bias_pct: round_to(
            (counters.home_penalties - counters.away_penalties) / penalties.max(1.0) * 100.0,
            PCT_PRECISION,
        ),
        avg_total_points: round_to(
            counters.total_points_sum / counters.totals_count.max(1) as f64,
            COUNT_PRECISION,
        ),
        totals_samples: counters.totals_count,
        over_rate: rate_pct(counters.over_count, counters.totals_count),
        under_rate: rate_pct(counters.under_count, counters.totals_count),
        ats_samples: counters.ats_count,
        ats_home_cover_rate: rate_pct(counters.home_cover_count, counters.ats_count),
        ats_away_cover_rate: rate_pct(counters.away_cover_count, counters.ats_count),
        favorite_samples: counters.favorite_count,
        su_favorite_rate: rate_pct(counters.favorite_win_count, counters.favorite_count),
        ats_favorite_cover_rate: rate_pct(counters.favorite_cover_count, counters.ats_count),
        sports: counters
            .sport_counts
            .iter()
            .map(|(league, n)| (league.to_string(), *n))
            .collect(),
        last_seen: counters.last_seen.clone(),
    }
}

pub fn finalize_official(acc: &OfficialAccumulator) -> OfficialTrend {
    OfficialTrend {
        id: acc.id.clone(),
        name: acc.name.clone(),
        roles: acc.role_counts.clone(),
        crew_ids: acc.crew_ids_seen.clone(),
        metrics: metrics(&acc.counters),
    }
}

pub fn finalize_crew(acc: &CrewAccumulator) -> CrewTrend {
    CrewTrend {
        crew_id: acc.crew_id.clone(),
        metrics: metrics(&acc.counters),
    }
}

/// Sort descending by games seen. `sort_by` is stable, so ties keep
/// encounter order.
fn rank<T>(items: &mut [T], games: impl Fn(&T) -> u32) {
    items.sort_by(|a, b| games(b).cmp(&games(a)));
}

/// Build the report envelope from a finished aggregation pass.
pub fn build_report(
    aggregator: Aggregator,
    stats: RunStats,
    source: &str,
    notes: &str,
    generated_at: String,
) -> TrendReport {
    let (officials, crews) = aggregator.into_parts();
    let mut officials: Vec<OfficialTrend> = officials.iter().map(finalize_official).collect();
    let mut crews: Vec<CrewTrend> = crews.iter().map(finalize_crew).collect();
    rank(&mut officials, |o| o.metrics.games_seen);
    rank(&mut crews, |c| c.metrics.games_seen);

    TrendReport {
        generated_at,
        source: source.to_string(),
        notes: notes.to_string(),
        stats,
        officials,
        crews,
    }
}

/// Write the report as pretty JSON. The document goes to a sibling temp file
/// first and is renamed into place, so a failed write leaves no partial file.
pub async fn write_report(report: &TrendReport, path: &Path) -> Result<(), ReportError> {
    let body = serde_json::to_string_pretty(report)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ReportError::Write { path: parent.to_path_buf(), source })?;
    }

    let tmp = staged(path);

    if let Err(source) = tokio::fs::write(&tmp, body).await {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(ReportError::Write { path: tmp, source });
    }
    if let Err(source) = tokio::fs::rename(&tmp, path).await {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(ReportError::Write { path: path.to_path_buf(), source });
    }
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn metric_columns(m: &TrendMetrics) -> Vec<String> {
    vec![
        m.games_seen.to_string(),
        m.penalties_per_game.to_string(),
        m.home_penalty_bias_pct.to_string(),
        m.avg_total_points.to_string(),
        m.totals_samples.to_string(),
        fmt_opt(m.over_rate),
        fmt_opt(m.under_rate),
        m.ats_samples.to_string(),
        fmt_opt(m.ats_home_cover_rate),
        fmt_opt(m.ats_away_cover_rate),
        m.favorite_samples.to_string(),
        fmt_opt(m.su_favorite_rate),
        fmt_opt(m.ats_favorite_cover_rate),
        m.last_seen.clone(),
    ]
}

const METRIC_HEADERS: [&str; 14] = [
    "games_seen",
    "penalties_per_game",
    "home_penalty_bias_pct",
    "avg_total_points",
    "totals_samples",
    "over_rate",
    "under_rate",
    "ats_samples",
    "ats_home_cover_rate",
    "ats_away_cover_rate",
    "favorite_samples",
    "su_favorite_rate",
    "ats_favorite_cover_rate",
    "last_seen",
];

fn staged(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn csv_table(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<(), ReportError> {
    let csv_err = |source: csv::Error| ReportError::Csv { path: path.to_path_buf(), source };

    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(header).map_err(csv_err)?;
    for row in rows {
        wtr.write_record(row).map_err(csv_err)?;
    }
    wtr.flush()
        .map_err(|source| ReportError::Write { path: path.to_path_buf(), source })
}

/// Flat CSV export of both ranked tables (`officials.csv`, `crews.csv`).
/// Both tables are staged as temp files and only renamed into place once
/// each has been written, so a failure leaves neither half behind.
pub fn write_csv(report: &TrendReport, dir: &Path) -> Result<(), ReportError> {
    std::fs::create_dir_all(dir).map_err(|source| ReportError::Write { path: dir.to_path_buf(), source })?;

    let mut official_header = vec!["id", "name", "roles", "crew_ids"];
    official_header.extend(METRIC_HEADERS);
    let official_rows: Vec<Vec<String>> = report
        .officials
        .iter()
        .map(|o| {
            let roles = o
                .roles
                .iter()
                .map(|(role, n)| format!("{}:{}", role, n))
                .collect::<Vec<_>>()
                .join(";");
            let crews = o.crew_ids.iter().cloned().collect::<Vec<_>>().join(";");
            let mut row = vec![o.id.clone(), o.name.clone(), roles, crews];
            row.extend(metric_columns(&o.metrics));
            row
        })
        .collect();

    let mut crew_header = vec!["crew_id"];
    crew_header.extend(METRIC_HEADERS);
    let crew_rows: Vec<Vec<String>> = report
        .crews
        .iter()
        .map(|c| {
            let mut row = vec![c.crew_id.clone()];
            row.extend(metric_columns(&c.metrics));
            row
        })
        .collect();

    let tables = [
        (dir.join("officials.csv"), official_header, official_rows),
        (dir.join("crews.csv"), crew_header, crew_rows),
    ];

    let mut written = Vec::new();
    for (path, header, rows) in &tables {
        let tmp = staged(path);
        if let Err(e) = csv_table(&tmp, header, rows) {
            std::fs::remove_file(&tmp).ok();
            for done in &written {
                std::fs::remove_file(done).ok();
            }
            return Err(e);
        }
        written.push(tmp);
    }
    for (path, _, _) in &tables {
        let tmp = staged(path);
        std::fs::rename(&tmp, path).map_err(|source| ReportError::Write { path: path.clone(), source })?;
    }

    Ok(())
}
