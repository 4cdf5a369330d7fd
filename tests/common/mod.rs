#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use rusqlite::{Connection, params};

pub const SEASONS: [&str; 5] = ["2020-21", "2021-22", "2022-23", "2023-24", "2024-25"];
pub const PLAYERS: usize = 30;
pub const GAMEWEEKS: u32 = 12;

/// Fresh scratch directory under the system temp dir, unique per test name.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fpl_points_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Builds a small `mart_ml_features` table whose label is a noisy linear function of form.
///
/// The last gameweek has no label, player 0 has no form in gameweek 5, every sixth row lacks
/// team form and player 7 has a zero value.
pub fn build_feature_mart(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE mart_ml_features (
            player_name TEXT NOT NULL,
            season TEXT NOT NULL,
            gameweek INTEGER NOT NULL,
            next_gw_points REAL,
            avg_points_5gw REAL,
            avg_points_3gw REAL,
            position_encoded INTEGER,
            team_form REAL,
            games_played_to_date INTEGER,
            player_value REAL,
            is_home INTEGER
        );",
    )
    .expect("create feature table");

    let mut stmt = conn
        .prepare(
            "INSERT INTO mart_ml_features VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .expect("prepare insert");
    for season in SEASONS {
        for p in 0..PLAYERS {
            for gw in 1..=GAMEWEEKS {
                let g = gw as usize;
                let skill = (p % 10) as f64;
                let form = skill * 0.8 + ((g * 7 + p * 3) % 5) as f64 * 0.2;
                let noise = (((p * 13 + g * 5) % 7) as f64 - 3.0) * 0.15;
                let next = (gw < GAMEWEEKS).then_some(1.0 + 1.2 * form + noise);
                let form_cell = (!(p == 0 && gw == 5)).then_some(form);
                let team_form = ((p + g) % 6 != 0).then_some((p % 20) as f64 * 0.1);
                let value = if p == 7 { 0.0 } else { 4.5 + skill * 0.5 };
                stmt.execute(params![
                    format!("player_{p}"),
                    season,
                    gw,
                    next,
                    form_cell,
                    form + ((g + p) % 3) as f64 * 0.1,
                    (p % 4 + 1) as i64,
                    team_form,
                    gw,
                    value,
                    (gw % 2) as i64,
                ])
                .expect("insert feature row");
            }
        }
    }
}
