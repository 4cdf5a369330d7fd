use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use tracing::info;

use crate::assemble::UnifiedDataset;
use crate::table::{GAMEWEEK_COLUMN, NAME_COLUMN, SEASON_COLUMN, TEAM_COLUMN, Table};

pub const PLAYER_GAMEWEEKS_TABLE: &str = "player_gameweeks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub total_rows: usize,
    pub unique_players: usize,
    pub seasons: usize,
    pub unique_gameweeks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            seasons_json TEXT NOT NULL,
            rows_written INTEGER NOT NULL,
            columns INTEGER NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn write_dataset(path: &Path, dataset: &UnifiedDataset) -> Result<StoreStats> {
    info!(rows = dataset.len(), db = %path.display(), "saving dataset");
    let mut conn = open_db(path)?;
    write_player_gameweeks(&mut conn, dataset)
}

/// Drops and recreates `player_gameweeks` from `dataset` in one transaction, builds the
/// lookup indexes and records the run.
pub fn write_player_gameweeks(
    conn: &mut Connection,
    dataset: &UnifiedDataset,
) -> Result<StoreStats> {
    init_schema(conn)?;
    let started_at = Utc::now().to_rfc3339();
    let table = &dataset.table;
    let types = infer_column_types(table);
    let sql_names = sql_column_names(table.columns());

    let tx = conn.transaction().context("begin store transaction")?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {PLAYER_GAMEWEEKS_TABLE};"
    ))
    .context("drop player_gameweeks")?;

    let column_defs = sql_names
        .iter()
        .zip(&types)
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute_batch(&format!(
        "CREATE TABLE {PLAYER_GAMEWEEKS_TABLE} ({column_defs});"
    ))
    .context("create player_gameweeks")?;

    {
        let placeholders = (1..=sql_names.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let column_list = sql_names
            .iter()
            .map(|n| quote_ident(n))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {PLAYER_GAMEWEEKS_TABLE} ({column_list}) VALUES ({placeholders})"
            ))
            .context("prepare player_gameweeks insert")?;
        for row in table.rows() {
            let values = row
                .iter()
                .zip(&types)
                .map(|(cell, ty)| to_sql_value(cell, *ty));
            stmt.execute(params_from_iter(values))
                .context("insert player_gameweeks row")?;
        }
    }

    create_indexes(&tx, table)?;

    let seasons_json =
        serde_json::to_string(&dataset.seasons).unwrap_or_else(|_| "[]".to_string());
    tx.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, seasons_json, rows_written, columns)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            started_at,
            Utc::now().to_rfc3339(),
            seasons_json,
            table.len() as i64,
            table.width() as i64
        ],
    )
    .context("insert ingest run")?;
    tx.commit().context("commit store transaction")?;

    let stats = store_stats(conn)?;
    info!(
        rows = stats.total_rows,
        players = stats.unique_players,
        seasons = stats.seasons,
        gameweeks = stats.unique_gameweeks,
        "database created"
    );
    Ok(stats)
}

pub fn store_stats(conn: &Connection) -> Result<StoreStats> {
    let sql = format!(
        "SELECT COUNT(*), COUNT(DISTINCT {name}), COUNT(DISTINCT {season}),
                COUNT(DISTINCT {season} || '-' || {gw})
         FROM {PLAYER_GAMEWEEKS_TABLE}",
        name = quote_ident(NAME_COLUMN),
        season = quote_ident(SEASON_COLUMN),
        gw = quote_ident(GAMEWEEK_COLUMN),
    );
    conn.query_row(&sql, [], |row| {
        Ok(StoreStats {
            total_rows: row.get::<_, i64>(0)? as usize,
            unique_players: row.get::<_, i64>(1)? as usize,
            seasons: row.get::<_, i64>(2)? as usize,
            unique_gameweeks: row.get::<_, i64>(3)? as usize,
        })
    })
    .context("query store stats")
}

fn create_indexes(tx: &rusqlite::Transaction<'_>, table: &Table) -> Result<()> {
    let name = quote_ident(NAME_COLUMN);
    let season = quote_ident(SEASON_COLUMN);
    let gw = quote_ident(GAMEWEEK_COLUMN);
    let mut sql = format!(
        "CREATE INDEX IF NOT EXISTS idx_player_season_gw ON {PLAYER_GAMEWEEKS_TABLE}({name}, {season}, {gw});
         CREATE INDEX IF NOT EXISTS idx_season_gw ON {PLAYER_GAMEWEEKS_TABLE}({season}, {gw});"
    );
    if table.has_column(TEAM_COLUMN) {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS idx_team_season ON {PLAYER_GAMEWEEKS_TABLE}({}, {season});",
            quote_ident(TEAM_COLUMN)
        ));
    }
    tx.execute_batch(&sql).context("create player_gameweeks indexes")?;
    Ok(())
}

fn infer_column_types(table: &Table) -> Vec<ColumnType> {
    (0..table.width())
        .map(|idx| {
            let mut ty = ColumnType::Integer;
            for row in table.rows() {
                let cell = row[idx].as_str();
                if cell.is_empty() {
                    continue;
                }
                if parse_int_like(cell).is_some() {
                    continue;
                }
                if cell.parse::<f64>().is_ok() {
                    ty = ColumnType::Real;
                    continue;
                }
                return ColumnType::Text;
            }
            ty
        })
        .collect()
}

fn to_sql_value(cell: &str, ty: ColumnType) -> SqlValue {
    if cell.is_empty() {
        return SqlValue::Null;
    }
    match ty {
        ColumnType::Integer => parse_int_like(cell)
            .map(SqlValue::Integer)
            .unwrap_or_else(|| SqlValue::Text(cell.to_string())),
        ColumnType::Real => parse_int_like(cell)
            .map(|v| SqlValue::Real(v as f64))
            .or_else(|| cell.parse::<f64>().ok().map(SqlValue::Real))
            .unwrap_or_else(|| SqlValue::Text(cell.to_string())),
        ColumnType::Text => SqlValue::Text(cell.to_string()),
    }
}

fn parse_int_like(cell: &str) -> Option<i64> {
    match cell {
        "True" | "true" | "TRUE" => Some(1),
        "False" | "false" | "FALSE" => Some(0),
        _ => cell.parse::<i64>().ok(),
    }
}

// SQLite identifiers are case-insensitive, so "xP" and "XP" would collide.
fn sql_column_names(columns: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(columns.len());
    for col in columns {
        let mut name = col.clone();
        let mut n = 1;
        while !seen.insert(name.to_ascii_lowercase()) {
            name = format!("{col}_{n}");
            n += 1;
        }
        out.push(name);
    }
    out
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::{ColumnType, infer_column_types, quote_ident, sql_column_names};
    use crate::table::Table;

    #[test]
    fn column_types_follow_cell_contents() {
        let (t, _) = Table::from_csv_str(
            "name,GW,value,was_home,xP\nSalah,1,130,True,\nKane,2,115,False,4.5\n",
        )
        .expect("csv should parse");
        assert_eq!(
            infer_column_types(&t),
            vec![
                ColumnType::Text,
                ColumnType::Integer,
                ColumnType::Integer,
                ColumnType::Integer,
                ColumnType::Real
            ]
        );
    }

    #[test]
    fn identifiers_are_quoted_and_unique() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        let names = sql_column_names(&["xP".to_string(), "XP".to_string()]);
        assert_eq!(names, vec!["xP".to_string(), "XP_1".to_string()]);
    }
}
