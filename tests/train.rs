mod common;

use std::fs;

use rusqlite::Connection;

use fpl_points::config::{SplitPlan, TrainConfig};
use fpl_points::features::{self, LABEL_COLUMN};
use fpl_points::trainer::BaselineTrainer;

use common::{build_feature_mart, scratch_dir};

fn config_for(name: &str) -> TrainConfig {
    let dir = scratch_dir(name);
    let db_path = dir.join("fpl.sqlite");
    let conn = Connection::open(&db_path).expect("open scratch db");
    build_feature_mart(&conn);
    drop(conn);
    TrainConfig {
        db_path,
        model_dir: dir.join("models"),
        ..TrainConfig::default()
    }
}

#[test]
fn loader_filters_unlabelled_and_early_rows() {
    let config = config_for("loader");
    let conn = features::open_read_only(&config.db_path).expect("open read-only");
    let set = features::load_feature_rows(&conn, 5).expect("rows should load");

    // gameweeks 5..=11 per player and season, minus player 0's formless gameweek 5
    assert_eq!(set.len(), 5 * (30 * 7 - 1));
    assert_eq!(
        set.columns,
        vec![
            "position_encoded",
            "avg_points_5gw",
            "avg_points_3gw",
            "games_played_to_date",
            "team_form",
            "player_value",
            "is_home"
        ]
    );
    assert!(!set.columns.iter().any(|c| c == LABEL_COLUMN));
    assert!(set.rows.iter().all(|r| r.gameweek >= 5 && r.gameweek < 12));
    assert_eq!(set.rows[0].season, "2020-21");
    assert_eq!(set.unique_players(), 30);
}

#[test]
fn trains_and_writes_artifacts() {
    let config = config_for("train");
    let report = BaselineTrainer::new(config.clone())
        .run()
        .expect("training should succeed");

    assert_eq!(report.rows_loaded, 1045);
    assert_eq!(report.train_samples, 627);
    assert_eq!(report.val_samples, 209);
    assert_eq!(report.test_samples, 209);
    assert_eq!(report.unassigned_rows, 0);
    assert!(report.imputations.iter().any(|i| i.column == "team_form"));

    assert!(report.fit.val_mse < report.fit.baseline_val_mse);
    assert!(report.validation.mae < report.validation_baseline.mae);
    assert!(report.test.metrics.r2 > 0.7, "r2={}", report.test.metrics.r2);
    assert!(report.test.directional_accuracy > 0.7);
    assert!(report.test.big_haul.actual_hauls > 0);
    assert!(report.test.big_haul.recall >= 0.0 && report.test.big_haul.recall <= 1.0);

    assert_eq!(report.top_features.len(), 7);
    assert!(
        report
            .top_features
            .windows(2)
            .all(|w| w[0].1 >= w[1].1)
    );
    let total: f64 = report.top_features.iter().map(|(_, v)| v).sum();
    assert!((total - 1.0).abs() < 1e-9);

    let raw = fs::read_to_string(&report.artifacts.feature_columns).expect("feature columns");
    let columns: Vec<String> = serde_json::from_str(&raw).expect("feature columns json");
    assert_eq!(columns, report.feature_columns);

    let raw = fs::read_to_string(&report.artifacts.model).expect("model artifact");
    let model: serde_json::Value = serde_json::from_str(&raw).expect("model json");
    assert_eq!(model["version"], 1);
    assert_eq!(model["model"]["coeffs"].as_array().map(|a| a.len()), Some(7));
    assert_eq!(model["test_samples"], 209);

    let raw = fs::read_to_string(&report.artifacts.feature_importance).expect("importance csv");
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines[0], "feature,importance");
    assert_eq!(lines.len(), 8);
    assert!(lines[1].starts_with(&format!("{},", report.top_features[0].0)));
    assert!(report.artifacts.model.starts_with(&config.model_dir));
}

#[test]
fn empty_validation_split_is_an_error() {
    let mut config = config_for("no_val");
    config.split = SplitPlan {
        validation: vec!["2019-20".to_string()],
        ..SplitPlan::default()
    };
    let err = BaselineTrainer::new(config.clone())
        .run()
        .expect_err("validation split has no rows");
    assert!(format!("{err:#}").contains("validation split is empty"));
    assert!(!config.model_dir.join("baseline_model.json").exists());
}

#[test]
fn threshold_that_removes_every_row_is_an_error() {
    let mut config = config_for("no_rows");
    config.min_games = 50;
    let err = BaselineTrainer::new(config)
        .run()
        .expect_err("no rows survive the filter");
    assert!(format!("{err:#}").contains("no feature rows"));
}

#[test]
fn real_typed_gameweeks_still_load() {
    let conn = Connection::open_in_memory().expect("in-memory db");
    conn.execute_batch(
        "CREATE TABLE mart_ml_features (
            player_name TEXT, season TEXT, gameweek REAL, next_gw_points REAL,
            avg_points_5gw REAL, games_played_to_date INTEGER
        );
        INSERT INTO mart_ml_features VALUES
            ('Saka', '2023-24', 7.0, 6.0, 5.2, 6),
            ('Saka', '2023-24', 8.0, 2.0, 5.0, 7);",
    )
    .expect("create real-typed mart");

    let set = features::load_feature_rows(&conn, 5).expect("rows should load");
    assert_eq!(set.len(), 2);
    assert_eq!(set.rows[0].gameweek, 7);
    assert_eq!(set.rows[1].gameweek, 8);
}
