use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info};

use crate::metrics;

pub const FEATURES_TABLE: &str = "mart_ml_features";
pub const LABEL_COLUMN: &str = "next_gw_points";

const REQUIRED_COLUMNS: [&str; 6] = [
    "player_name",
    "season",
    "gameweek",
    LABEL_COLUMN,
    "avg_points_5gw",
    "games_played_to_date",
];

pub const CANDIDATE_FEATURES: [&str; 22] = [
    "position_encoded",
    "avg_points_5gw",
    "avg_points_3gw",
    "season_avg_points",
    "consistency_score",
    "blank_rate",
    "big_haul_rate",
    "points_per_90",
    "games_played_to_date",
    "team_form",
    "team_attack",
    "team_defense_weakness",
    "position_percentile",
    "avg_position_points",
    "player_value",
    "ownership_pct",
    "is_home",
    "improving_form",
    "consistent_performer",
    "above_position_threshold",
    "was_benched",
    "played_full_game",
];

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub player_name: String,
    pub season: String,
    pub gameweek: u32,
    pub next_gw_points: f64,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Imputation {
    pub column: String,
    pub median: f64,
    pub filled: usize,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replaces missing values with the column median over all rows. Columns with no values at
    /// all are filled with zero.
    pub fn impute_medians(&mut self) -> Vec<Imputation> {
        let mut out = Vec::new();
        for (idx, column) in self.columns.iter().enumerate() {
            let present: Vec<f64> = self.rows.iter().filter_map(|r| r.values[idx]).collect();
            let filled = self.rows.len() - present.len();
            if filled == 0 {
                continue;
            }
            let median = if present.is_empty() {
                0.0
            } else {
                metrics::median(&present)
            };
            for row in &mut self.rows {
                if row.values[idx].is_none() {
                    row.values[idx] = Some(median);
                }
            }
            debug!(column = %column, filled, median, "imputed missing values");
            out.push(Imputation {
                column: column.clone(),
                median,
                filled,
            });
        }
        out
    }

    pub fn unique_players(&self) -> usize {
        let mut names: Vec<&str> = self.rows.iter().map(|r| r.player_name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }
}

impl FeatureRow {
    pub fn dense(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.unwrap_or(0.0)).collect()
    }
}

pub fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("open sqlite db {} read-only", path.display()))
}

pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .context("prepare table_info")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .context("query table_info")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode table_info row")?);
    }
    Ok(out)
}

pub fn load_feature_rows(conn: &Connection, min_games: u32) -> Result<FeatureSet> {
    let available = table_columns(conn, FEATURES_TABLE)?;
    if available.is_empty() {
        return Err(anyhow!(
            "table {FEATURES_TABLE} not found; build the feature models before training"
        ));
    }
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|c| !available.iter().any(|a| a == *c))
    {
        return Err(anyhow!("{FEATURES_TABLE} is missing required column {missing}"));
    }

    let columns: Vec<String> = CANDIDATE_FEATURES
        .iter()
        .filter(|c| available.iter().any(|a| a == *c))
        .map(|c| c.to_string())
        .collect();

    let mut select = String::from("player_name, season, gameweek, next_gw_points");
    for col in &columns {
        select.push_str(", ");
        select.push_str(col);
    }
    let sql = format!(
        "SELECT {select}
         FROM {FEATURES_TABLE}
         WHERE next_gw_points IS NOT NULL
           AND avg_points_5gw IS NOT NULL
           AND games_played_to_date >= ?1
         ORDER BY season, gameweek, player_name"
    );
    let mut stmt = conn.prepare(&sql).context("prepare feature query")?;
    let mapped = stmt
        .query_map(params![min_games as i64], |row| {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(as_f64(row.get::<_, SqlValue>(4 + idx)?));
            }
            Ok(FeatureRow {
                player_name: row.get(0)?,
                season: row.get(1)?,
                gameweek: as_gameweek(row.get::<_, SqlValue>(2)?),
                next_gw_points: as_f64(row.get::<_, SqlValue>(3)?).unwrap_or(0.0),
                values,
            })
        })
        .context("query feature rows")?;

    let mut rows = Vec::new();
    for row in mapped {
        rows.push(row.context("decode feature row")?);
    }
    info!(
        rows = rows.len(),
        features = columns.len(),
        min_games,
        "loaded feature rows"
    );
    Ok(FeatureSet { columns, rows })
}

fn as_gameweek(value: SqlValue) -> u32 {
    as_f64(value).map_or(0, |v| v.clamp(0.0, u32::MAX as f64) as u32)
}

pub fn as_f64(value: SqlValue) -> Option<f64> {
    match value {
        SqlValue::Integer(v) => Some(v as f64),
        SqlValue::Real(v) if v.is_finite() => Some(v),
        SqlValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
