use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;

use fpl_points::assemble::{DatasetAssembler, UnifiedDataset};
use fpl_points::config::SeasonPlan;
use fpl_points::source::MemorySeasonSource;
use fpl_points::store::{self, PLAYER_GAMEWEEKS_TABLE};

fn fixture_dataset(plan: &SeasonPlan) -> UnifiedDataset {
    let mut root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    root.push("tests");
    root.push("fixtures");
    root.push("data");
    let seasons = vec!["2023-24".to_string(), "2024-25".to_string()];
    let source = MemorySeasonSource::from_dir(&root, &seasons).expect("fixture files should load");
    DatasetAssembler::new(&source)
        .assemble(plan)
        .expect("fixtures should assemble")
        .0
}

fn index_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 ORDER BY name")
        .expect("prepare index query");
    let names = stmt
        .query_map([PLAYER_GAMEWEEKS_TABLE], |row| row.get::<_, String>(0))
        .expect("query indexes")
        .map(|r| r.expect("index name"))
        .collect();
    names
}

#[test]
fn writes_rows_indexes_and_run_record() {
    let dataset = fixture_dataset(&SeasonPlan::new(&["2023-24"], &["2024-25"]));
    let mut conn = Connection::open_in_memory().expect("in-memory db");

    let stats = store::write_player_gameweeks(&mut conn, &dataset).expect("write should succeed");

    assert_eq!(stats.total_rows, 12);
    assert_eq!(stats.unique_players, 4);
    assert_eq!(stats.seasons, 2);
    assert_eq!(stats.unique_gameweeks, 5);
    assert_eq!(
        index_names(&conn),
        vec!["idx_player_season_gw", "idx_season_gw", "idx_team_season"]
    );

    let (points, home): (i64, i64) = conn
        .query_row(
            "SELECT total_points, was_home FROM player_gameweeks
             WHERE name = 'Cole Palmer' AND season = '2024-25' AND GW = 3",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("gw3 row should be stored with typed columns");
    assert_eq!((points, home), (1, 1));

    let xp: f64 = conn
        .query_row(
            "SELECT xP FROM player_gameweeks WHERE name = 'Erling Haaland' AND GW = 1",
            [],
            |row| row.get(0),
        )
        .expect("real column");
    assert!((xp - 7.1).abs() < 1e-9);

    let runs: i64 = conn
        .query_row("SELECT COUNT(*) FROM ingest_runs", [], |row| row.get(0))
        .expect("count runs");
    assert_eq!(runs, 1);
}

#[test]
fn rewriting_replaces_the_previous_table() {
    let mut conn = Connection::open_in_memory().expect("in-memory db");
    let full = fixture_dataset(&SeasonPlan::new(&["2023-24"], &["2024-25"]));
    store::write_player_gameweeks(&mut conn, &full).expect("first write");

    let smaller = fixture_dataset(&SeasonPlan::new(&["2023-24"], &[]));
    let stats = store::write_player_gameweeks(&mut conn, &smaller).expect("second write");

    assert_eq!(stats.total_rows, 6);
    assert_eq!(stats.seasons, 1);
    let runs: i64 = conn
        .query_row("SELECT COUNT(*) FROM ingest_runs", [], |row| row.get(0))
        .expect("count runs");
    assert_eq!(runs, 2);
    let seasons_json: String = conn
        .query_row(
            "SELECT seasons_json FROM ingest_runs ORDER BY run_id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .expect("latest run");
    assert_eq!(seasons_json, "[\"2023-24\"]");
}

#[test]
fn write_dataset_creates_the_database_file() {
    let dir = std::env::temp_dir().join(format!("fpl_points_store_{}", std::process::id()));
    let path = dir.join("nested").join("fpl.sqlite");
    let _ = fs::remove_dir_all(&dir);

    let dataset = fixture_dataset(&SeasonPlan::new(&["2023-24"], &[]));
    let stats = store::write_dataset(&path, &dataset).expect("write to file");
    assert_eq!(stats.total_rows, 6);
    assert!(path.is_file());

    let conn = Connection::open(&path).expect("reopen");
    assert_eq!(store::store_stats(&conn).expect("stats"), stats);
    drop(conn);
    let _ = fs::remove_dir_all(&dir);
}
