//! Read-only diagnostics over the feature mart and the raw gameweek table.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result, anyhow};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::features::{FEATURES_TABLE, LABEL_COLUMN, as_f64, table_columns};
use crate::metrics;
use crate::store::{PLAYER_GAMEWEEKS_TABLE, quote_ident};

pub const CORRELATION_SAMPLE_ROWS: usize = 10_000;

const FORM_COLUMN: &str = "avg_points_5gw";

const CORRELATION_FEATURES: [&str; 11] = [
    "avg_points_5gw",
    "avg_points_3gw",
    "season_avg_points",
    "consistency_score",
    "team_form",
    "position_percentile",
    "points_per_90",
    "player_value",
    "ownership_pct",
    "improving_form",
    "above_position_threshold",
];

const DISTRIBUTION_FEATURES: [(&str, &str); 6] = [
    ("avg_points_5gw", "5-game average points"),
    ("season_avg_points", "Season average points"),
    ("consistency_score", "Consistency (std dev)"),
    ("team_form", "Team form"),
    ("position_percentile", "Position percentile"),
    ("points_per_90", "Points per 90 minutes"),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetOverview {
    pub total_rows: usize,
    pub unique_players: usize,
    pub seasons: usize,
    pub unique_gameweeks: usize,
    pub gameweek_range: Option<(i64, i64)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TargetStats {
    pub samples: usize,
    pub mean: f64,
    pub std_dev: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub blanks: usize,
    pub big_hauls: usize,
    pub huge_hauls: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionStats {
    pub position_code: Option<i64>,
    pub label: &'static str,
    pub records: usize,
    pub unique_players: usize,
    pub avg_next_points: Option<f64>,
    pub avg_form: Option<f64>,
}

/// Counts are `None` when the column they depend on is absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completeness {
    pub total: usize,
    pub with_form: Option<usize>,
    pub with_team_form: Option<usize>,
    pub with_position_rank: Option<usize>,
    pub positive_form: Option<usize>,
    pub enough_games: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonStats {
    pub season: String,
    pub records: usize,
    pub players: usize,
    pub gameweeks: usize,
    pub avg_next_points: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCorrelation {
    pub feature: String,
    pub samples: usize,
    pub r: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityIssues {
    pub missing_form: Option<usize>,
    pub negative_form: Option<usize>,
    pub negative_target: Option<usize>,
    pub insufficient_games: Option<usize>,
    pub zero_value: Option<usize>,
}

impl QualityIssues {
    pub fn any(&self) -> bool {
        [
            self.missing_form,
            self.negative_form,
            self.negative_target,
            self.insufficient_games,
            self.zero_value,
        ]
        .iter()
        .any(|v| v.unwrap_or(0) > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionStats {
    pub samples: usize,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub mean: f64,
    pub q75: f64,
    pub max: f64,
    pub std_dev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDistribution {
    pub feature: &'static str,
    pub description: &'static str,
    pub available: bool,
    pub stats: Option<DistributionStats>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpponentOverview {
    pub total_records: usize,
    pub with_opponent: usize,
    pub unique_opponents: usize,
    pub id_range: Option<(i64, i64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpponentSeason {
    pub season: String,
    pub unique_opponents: usize,
    pub id_range: Option<(i64, i64)>,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamOpponentPattern {
    pub season: String,
    pub team: String,
    pub expected_id: usize,
    pub opponents: usize,
    pub home_opponents: usize,
    pub away_opponents: usize,
    pub opponent_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpponentFieldReport {
    pub overview: OpponentOverview,
    pub seasons: Vec<OpponentSeason>,
    pub teams: Vec<TeamOpponentPattern>,
}

#[derive(Debug, Clone, Default)]
pub struct ExplorationReport {
    pub overview: DatasetOverview,
    pub target: Option<TargetStats>,
    pub positions: Vec<PositionStats>,
    pub completeness: Completeness,
    pub seasons: Vec<SeasonStats>,
    pub correlations: Vec<FeatureCorrelation>,
    pub quality: QualityIssues,
    pub distributions: Vec<FeatureDistribution>,
    pub opponent_field: Option<OpponentFieldReport>,
}

pub struct FeatureExplorer<'a> {
    conn: &'a Connection,
    feature_columns: HashSet<String>,
    gameweek_columns: HashSet<String>,
}

impl<'a> FeatureExplorer<'a> {
    pub fn new(conn: &'a Connection) -> Result<Self> {
        let feature_columns: HashSet<String> =
            table_columns(conn, FEATURES_TABLE)?.into_iter().collect();
        if feature_columns.is_empty() {
            return Err(anyhow!("table {FEATURES_TABLE} not found"));
        }
        let gameweek_columns = table_columns(conn, PLAYER_GAMEWEEKS_TABLE)?
            .into_iter()
            .collect();
        Ok(Self {
            conn,
            feature_columns,
            gameweek_columns,
        })
    }

    pub fn has_feature(&self, column: &str) -> bool {
        self.feature_columns.contains(column)
    }

    pub fn explore(&self) -> Result<ExplorationReport> {
        let report = ExplorationReport {
            overview: self.overview()?,
            target: self.target_stats()?,
            positions: self.position_breakdown()?,
            completeness: self.completeness()?,
            seasons: self.season_distribution()?,
            correlations: self.correlations()?,
            quality: self.quality_issues()?,
            distributions: self.distributions()?,
            opponent_field: self.opponent_field()?,
        };
        info!(
            rows = report.overview.total_rows,
            players = report.overview.unique_players,
            correlations = report.correlations.len(),
            "feature exploration complete"
        );
        Ok(report)
    }

    pub fn overview(&self) -> Result<DatasetOverview> {
        let players = self.distinct_expr("player_name");
        let seasons = self.distinct_expr("season");
        let gameweeks = if self.has_feature("season") && self.has_feature("gameweek") {
            "COUNT(DISTINCT season || '-' || gameweek)"
        } else {
            "0"
        };
        let range = if self.has_feature("gameweek") {
            "MIN(gameweek), MAX(gameweek)"
        } else {
            "NULL, NULL"
        };
        let sql = format!(
            "SELECT COUNT(*), {players}, {seasons}, {gameweeks}, {range} FROM {FEATURES_TABLE}"
        );
        self.conn
            .query_row(&sql, [], |row| {
                let lo: SqlValue = row.get(4)?;
                let hi: SqlValue = row.get(5)?;
                Ok(DatasetOverview {
                    total_rows: row.get::<_, i64>(0)? as usize,
                    unique_players: row.get::<_, i64>(1)? as usize,
                    seasons: row.get::<_, i64>(2)? as usize,
                    unique_gameweeks: row.get::<_, i64>(3)? as usize,
                    gameweek_range: id_range(Some(lo), Some(hi)),
                })
            })
            .context("query feature overview")
    }

    pub fn target_stats(&self) -> Result<Option<TargetStats>> {
        if !self.has_feature(LABEL_COLUMN) {
            return Ok(None);
        }
        let mut values = self.feature_values(LABEL_COLUMN)?;
        if values.is_empty() {
            return Ok(None);
        }
        values.sort_by(f64::total_cmp);
        Ok(Some(TargetStats {
            samples: values.len(),
            mean: metrics::mean(&values),
            std_dev: metrics::sample_std_dev(&values),
            min: values[0],
            max: values[values.len() - 1],
            median: metrics::percentile_sorted(&values, 50.0),
            blanks: values.iter().filter(|v| **v == 0.0).count(),
            big_hauls: values.iter().filter(|v| **v >= 10.0).count(),
            huge_hauls: values.iter().filter(|v| **v >= 15.0).count(),
        }))
    }

    pub fn position_breakdown(&self) -> Result<Vec<PositionStats>> {
        if !self.has_feature("position_encoded") {
            return Ok(Vec::new());
        }
        let avg_next = self.avg_expr(LABEL_COLUMN);
        let avg_form = self.avg_expr(FORM_COLUMN);
        let players = self.distinct_expr("player_name");
        let sql = format!(
            "SELECT position_encoded, COUNT(*), {avg_next}, {avg_form}, {players}
             FROM {FEATURES_TABLE}
             GROUP BY position_encoded
             ORDER BY position_encoded"
        );
        let mut stmt = self.conn.prepare(&sql).context("prepare position query")?;
        let rows = stmt
            .query_map([], |row| {
                let code = as_f64(row.get::<_, SqlValue>(0)?).map(|v| v as i64);
                Ok(PositionStats {
                    position_code: code,
                    label: position_label(code),
                    records: row.get::<_, i64>(1)? as usize,
                    avg_next_points: row.get(2)?,
                    avg_form: row.get(3)?,
                    unique_players: row.get::<_, i64>(4)? as usize,
                })
            })
            .context("query position breakdown")?;
        collect_rows(rows, "decode position row")
    }

    pub fn completeness(&self) -> Result<Completeness> {
        Ok(Completeness {
            total: self.count_where(None)?,
            with_form: self.count_if(FORM_COLUMN, "IS NOT NULL")?,
            with_team_form: self.count_if("team_form", "IS NOT NULL")?,
            with_position_rank: self.count_if("position_percentile", "IS NOT NULL")?,
            positive_form: self.count_if(FORM_COLUMN, "> 0")?,
            enough_games: self.count_if("games_played_to_date", ">= 5")?,
        })
    }

    pub fn season_distribution(&self) -> Result<Vec<SeasonStats>> {
        if !self.has_feature("season") {
            return Ok(Vec::new());
        }
        let players = self.distinct_expr("player_name");
        let gameweeks = self.distinct_expr("gameweek");
        let avg_next = self.avg_expr(LABEL_COLUMN);
        let sql = format!(
            "SELECT season, COUNT(*), {players}, {avg_next}, {gameweeks}
             FROM {FEATURES_TABLE}
             GROUP BY season
             ORDER BY season"
        );
        let mut stmt = self.conn.prepare(&sql).context("prepare season query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SeasonStats {
                    season: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    records: row.get::<_, i64>(1)? as usize,
                    players: row.get::<_, i64>(2)? as usize,
                    avg_next_points: row.get(3)?,
                    gameweeks: row.get::<_, i64>(4)? as usize,
                })
            })
            .context("query season distribution")?;
        collect_rows(rows, "decode season row")
    }

    /// Pearson correlation of each available feature with the label over a bounded sample of
    /// rows that have form data, strongest first.
    pub fn correlations(&self) -> Result<Vec<FeatureCorrelation>> {
        if !self.has_feature(LABEL_COLUMN) || !self.has_feature(FORM_COLUMN) {
            return Ok(Vec::new());
        }
        let features: Vec<&str> = CORRELATION_FEATURES
            .iter()
            .copied()
            .filter(|c| self.has_feature(c))
            .collect();
        let select = std::iter::once(LABEL_COLUMN)
            .chain(features.iter().copied())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {select} FROM {FEATURES_TABLE}
             WHERE {FORM_COLUMN} IS NOT NULL
             LIMIT {CORRELATION_SAMPLE_ROWS}"
        );
        let width = features.len() + 1;
        let mut stmt = self.conn.prepare(&sql).context("prepare correlation sample")?;
        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    values.push(as_f64(row.get::<_, SqlValue>(idx)?));
                }
                Ok(values)
            })
            .context("query correlation sample")?;
        let sample: Vec<Vec<Option<f64>>> = collect_rows(rows, "decode correlation row")?;
        debug!(rows = sample.len(), features = features.len(), "correlation sample");

        let mut out = Vec::new();
        for (idx, feature) in features.iter().enumerate() {
            let (xs, ys): (Vec<f64>, Vec<f64>) = sample
                .iter()
                .filter_map(|r| Some((r[idx + 1]?, r[0]?)))
                .unzip();
            if let Some(r) = metrics::pearson(&xs, &ys) {
                out.push(FeatureCorrelation {
                    feature: feature.to_string(),
                    samples: xs.len(),
                    r,
                });
            }
        }
        out.sort_by(|a, b| b.r.abs().total_cmp(&a.r.abs()));
        Ok(out)
    }

    pub fn quality_issues(&self) -> Result<QualityIssues> {
        Ok(QualityIssues {
            missing_form: self.count_if(FORM_COLUMN, "IS NULL")?,
            negative_form: self.count_if(FORM_COLUMN, "< 0")?,
            negative_target: self.count_if(LABEL_COLUMN, "< 0")?,
            insufficient_games: self.count_if("games_played_to_date", "< 3")?,
            zero_value: self.count_if("player_value", "= 0")?,
        })
    }

    pub fn distributions(&self) -> Result<Vec<FeatureDistribution>> {
        let mut out = Vec::with_capacity(DISTRIBUTION_FEATURES.len());
        for (feature, description) in DISTRIBUTION_FEATURES {
            if !self.has_feature(feature) {
                out.push(FeatureDistribution {
                    feature,
                    description,
                    available: false,
                    stats: None,
                });
                continue;
            }
            let values = self.feature_values(feature)?;
            out.push(FeatureDistribution {
                feature,
                description,
                available: true,
                stats: distribution_stats(values),
            });
        }
        Ok(out)
    }

    pub fn opponent_field(&self) -> Result<Option<OpponentFieldReport>> {
        let needed = ["opponent_team", "season", "team", "was_home"];
        if let Some(missing) = needed.iter().find(|c| !self.gameweek_columns.contains(**c)) {
            debug!(column = *missing, "opponent analysis skipped");
            return Ok(None);
        }
        let opp = quote_ident("opponent_team");
        let season = quote_ident("season");
        let team = quote_ident("team");
        let home = quote_ident("was_home");
        let t = PLAYER_GAMEWEEKS_TABLE;

        let overview = self
            .conn
            .query_row(
                &format!(
                    "SELECT COUNT(*), COUNT({opp}), COUNT(DISTINCT {opp}), MIN({opp}), MAX({opp})
                     FROM {t}"
                ),
                [],
                |row| {
                    Ok(OpponentOverview {
                        total_records: row.get::<_, i64>(0)? as usize,
                        with_opponent: row.get::<_, i64>(1)? as usize,
                        unique_opponents: row.get::<_, i64>(2)? as usize,
                        id_range: id_range(row.get(3)?, row.get(4)?),
                    })
                },
            )
            .context("query opponent overview")?;

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {season}, COUNT(DISTINCT {opp}), MIN({opp}), MAX({opp}), COUNT(*)
                 FROM {t}
                 WHERE {opp} IS NOT NULL
                 GROUP BY {season}
                 ORDER BY {season}"
            ))
            .context("prepare opponent season query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(OpponentSeason {
                    season: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    unique_opponents: row.get::<_, i64>(1)? as usize,
                    id_range: id_range(row.get(2)?, row.get(3)?),
                    records: row.get::<_, i64>(4)? as usize,
                })
            })
            .context("query opponent seasons")?;
        let seasons = collect_rows(rows, "decode opponent season row")?;

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {season}, {team},
                        COUNT(DISTINCT {opp}),
                        COUNT(DISTINCT CASE WHEN {home} = 1 THEN {opp} END),
                        COUNT(DISTINCT CASE WHEN {home} = 0 THEN {opp} END)
                 FROM {t}
                 WHERE {opp} IS NOT NULL
                 GROUP BY {season}, {team}
                 ORDER BY {season}, {team}"
            ))
            .context("prepare team opponent query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TeamOpponentPattern {
                    season: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    team: value_to_string(row.get::<_, SqlValue>(1)?),
                    expected_id: 0,
                    opponents: row.get::<_, i64>(2)? as usize,
                    home_opponents: row.get::<_, i64>(3)? as usize,
                    away_opponents: row.get::<_, i64>(4)? as usize,
                    opponent_ids: Vec::new(),
                })
            })
            .context("query team opponents")?;
        let mut teams: Vec<TeamOpponentPattern> = collect_rows(rows, "decode team opponent row")?;

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT DISTINCT {season}, {team}, {opp}
                 FROM {t}
                 WHERE {opp} IS NOT NULL
                 ORDER BY {season}, {team}, {opp}"
            ))
            .context("prepare opponent id query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    value_to_string(row.get::<_, SqlValue>(1)?),
                    as_f64(row.get::<_, SqlValue>(2)?).map(|v| v as i64),
                ))
            })
            .context("query opponent ids")?;
        let mut faced: HashMap<(String, String), Vec<i64>> = HashMap::new();
        for (season, team, id) in collect_rows(rows, "decode opponent id row")? {
            if let Some(id) = id {
                faced.entry((season, team)).or_default().push(id);
            }
        }
        assign_expected_ids(&mut teams);
        for pattern in &mut teams {
            if let Some(mut ids) = faced.remove(&(pattern.season.clone(), pattern.team.clone())) {
                ids.sort_unstable();
                ids.dedup();
                pattern.opponent_ids = ids;
            }
        }

        Ok(Some(OpponentFieldReport {
            overview,
            seasons,
            teams,
        }))
    }

    fn feature_values(&self, column: &str) -> Result<Vec<f64>> {
        let sql = format!(
            "SELECT {column} FROM {FEATURES_TABLE} WHERE {column} IS NOT NULL",
            column = quote_ident(column)
        );
        let mut stmt = self.conn.prepare(&sql).context("prepare value scan")?;
        let rows = stmt
            .query_map([], |row| Ok(as_f64(row.get::<_, SqlValue>(0)?)))
            .with_context(|| format!("scan {column}"))?;
        let values: Vec<Option<f64>> = collect_rows(rows, "decode value")?;
        Ok(values.into_iter().flatten().collect())
    }

    fn count_where(&self, condition: Option<&str>) -> Result<usize> {
        let sql = match condition {
            Some(cond) => format!("SELECT COUNT(*) FROM {FEATURES_TABLE} WHERE {cond}"),
            None => format!("SELECT COUNT(*) FROM {FEATURES_TABLE}"),
        };
        let n: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .context("count feature rows")?;
        Ok(n as usize)
    }

    fn count_if(&self, column: &str, predicate: &str) -> Result<Option<usize>> {
        if !self.has_feature(column) {
            return Ok(None);
        }
        let cond = format!("{} {predicate}", quote_ident(column));
        self.count_where(Some(&cond)).map(Some)
    }

    fn avg_expr(&self, column: &str) -> String {
        if self.has_feature(column) {
            format!("AVG({})", quote_ident(column))
        } else {
            "NULL".to_string()
        }
    }

    fn distinct_expr(&self, column: &str) -> String {
        if self.has_feature(column) {
            format!("COUNT(DISTINCT {})", quote_ident(column))
        } else {
            "0".to_string()
        }
    }
}

pub fn position_label(code: Option<i64>) -> &'static str {
    match code {
        Some(1) => "GK",
        Some(2) => "DEF",
        Some(3) => "MID",
        Some(4) => "FWD",
        _ => "Unknown",
    }
}

pub fn distribution_stats(mut values: Vec<f64>) -> Option<DistributionStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(DistributionStats {
        samples: values.len(),
        min: values[0],
        q25: metrics::percentile_sorted(&values, 25.0),
        median: metrics::percentile_sorted(&values, 50.0),
        mean: metrics::mean(&values),
        q75: metrics::percentile_sorted(&values, 75.0),
        max: values[values.len() - 1],
        std_dev: metrics::sample_std_dev(&values),
    })
}

fn assign_expected_ids(teams: &mut [TeamOpponentPattern]) {
    let mut names: HashMap<String, Vec<String>> = HashMap::new();
    for t in teams.iter() {
        names.entry(t.season.clone()).or_default().push(t.team.clone());
    }
    for list in names.values_mut() {
        list.sort();
        list.dedup();
    }
    for t in teams.iter_mut() {
        t.expected_id = names
            .get(&t.season)
            .and_then(|list| list.iter().position(|n| *n == t.team))
            .map_or(0, |pos| pos + 1);
    }
}

fn id_range(lo: Option<SqlValue>, hi: Option<SqlValue>) -> Option<(i64, i64)> {
    let lo = as_f64(lo?)? as i64;
    let hi = as_f64(hi?)? as i64;
    Some((lo, hi))
}

fn value_to_string(value: SqlValue) -> String {
    match value {
        SqlValue::Text(s) => s,
        SqlValue::Integer(v) => v.to_string(),
        SqlValue::Real(v) => v.to_string(),
        _ => String::new(),
    }
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    what: &'static str,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context(what)?);
    }
    Ok(out)
}
