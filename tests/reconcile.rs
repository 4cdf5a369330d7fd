use std::collections::HashSet;

use fpl_points::reconcile::{SeasonReconciler, SeasonSourceKind};
use fpl_points::source::MemorySeasonSource;
use fpl_points::table::Table;

fn gameweek_table(players: usize, gameweeks: impl IntoIterator<Item = u32>) -> Table {
    let mut table = Table::new(&["name", "team", "total_points", "GW"]);
    for gw in gameweeks {
        for p in 0..players {
            table
                .push_row(vec![
                    format!("player_{p}"),
                    format!("team_{}", p % 20),
                    ((p + gw as usize) % 15).to_string(),
                    gw.to_string(),
                ])
                .expect("row width matches header");
        }
    }
    table
}

fn assert_unique_keys(table: &Table) {
    let mut seen = HashSet::new();
    for idx in 0..table.len() {
        let key = (
            table.cell(idx, "name").unwrap_or_default().to_string(),
            table.cell(idx, "GW").unwrap_or_default().to_string(),
            table.cell(idx, "season").unwrap_or_default().to_string(),
        );
        assert!(seen.insert(key.clone()), "duplicate key {key:?}");
    }
}

#[test]
fn complete_season_is_loaded_from_merged_file_only() {
    let source = MemorySeasonSource::new().with_merged("2020-21", gameweek_table(500, 1..=38));
    let reconciler = SeasonReconciler::new(&source);

    let season = reconciler
        .load_merged_only("2020-21")
        .expect("merged season should load");

    assert_eq!(season.len(), 19_000);
    assert_eq!(season.gameweek_range(), Some((1, 38)));
    assert_eq!(season.table.gameweeks().len(), 38);
    assert_eq!(season.source_kind, SeasonSourceKind::MergedOnly);
    assert_eq!(source.probes(), 0);
    assert_eq!(source.gameweek_fetches(), 0);
    assert!(season.table.has_column("season"));
    assert_eq!(season.table.cell(0, "season"), Some("2020-21"));
}

#[test]
fn full_merged_file_needs_no_gameweek_downloads() {
    let mut source = MemorySeasonSource::new().with_merged("2020-21", gameweek_table(50, 1..=38));
    for gw in 1..=38 {
        source = source.with_gameweek("2020-21", gw, gameweek_table(50, [gw]));
    }
    let reconciler = SeasonReconciler::new(&source);

    let season = reconciler
        .reconcile_season("2020-21")
        .expect("merged season should reconcile");

    assert_eq!(source.probes(), 38);
    assert_eq!(source.gameweek_fetches(), 0);
    assert_eq!(season.source_kind, SeasonSourceKind::MergedOnly);
    assert!(season.individual_gameweeks.is_empty());
    assert_eq!(season.len(), 1_900);
    assert_eq!(season.gameweek_range(), Some((1, 38)));
    assert_unique_keys(&season.table);
}

#[test]
fn partial_season_built_from_first_ten_gameweeks() {
    let mut source = MemorySeasonSource::new();
    for gw in 1..=10 {
        source = source.with_gameweek("2024-25", gw, gameweek_table(3, [gw]));
    }
    let reconciler = SeasonReconciler::new(&source);

    let season = reconciler
        .reconcile_season("2024-25")
        .expect("gameweek files should be enough");

    assert_eq!(season.source_kind, SeasonSourceKind::GameweeksOnly);
    assert_eq!(season.gameweek_range(), Some((1, 10)));
    assert_eq!(season.len(), 30);
    assert_eq!(season.individual_gameweeks, (1..=10).collect::<Vec<_>>());
    assert_eq!(source.probes(), 38);
    assert_eq!(source.gameweek_fetches(), 10);
    assert_unique_keys(&season.table);
}

#[test]
fn only_gameweeks_missing_from_merged_file_are_fetched() {
    let mut source = MemorySeasonSource::new().with_merged("2024-25", gameweek_table(4, 1..=5));
    for gw in 1..=7 {
        source = source.with_gameweek("2024-25", gw, gameweek_table(4, [gw]));
    }
    let reconciler = SeasonReconciler::new(&source);

    let season = reconciler
        .reconcile_season("2024-25")
        .expect("season should reconcile");

    assert_eq!(source.gameweek_fetches(), 2);
    assert_eq!(season.individual_gameweeks, vec![6, 7]);
    assert_eq!(season.source_kind, SeasonSourceKind::MergedWithGameweeks);
    assert_eq!(season.len(), 28);
    assert_eq!(season.duplicates_dropped, 0);
    assert_unique_keys(&season.table);
}

#[test]
fn broken_gameweek_is_skipped_not_fatal() {
    let source = MemorySeasonSource::new()
        .with_merged("2024-25", gameweek_table(2, 1..=3))
        .with_gameweek("2024-25", 4, gameweek_table(2, [4]))
        .with_broken_gameweek("2024-25", 5);
    let reconciler = SeasonReconciler::new(&source);

    let season = reconciler
        .reconcile_season("2024-25")
        .expect("one failure should not drop the season");

    assert_eq!(season.failed_gameweeks, vec![5]);
    assert_eq!(season.individual_gameweeks, vec![4]);
    assert_eq!(season.gameweek_range(), Some((1, 4)));
    assert_eq!(season.len(), 8);
}

#[test]
fn season_without_any_source_is_dropped() {
    let source = MemorySeasonSource::new();
    let reconciler = SeasonReconciler::new(&source);

    assert!(reconciler.reconcile_season("2019-20").is_none());
    assert!(reconciler.load_merged_only("2019-20").is_none());
    assert_eq!(source.gameweek_fetches(), 0);
}

#[test]
fn duplicate_rows_keep_the_first_occurrence() {
    let (merged, _) = Table::from_csv_str(
        "name,team,total_points,GW\n\
         Salah,Liverpool,12,1\n\
         Salah,Liverpool,3,1\n\
         Saka,Arsenal,6,1\n\
         Salah,Liverpool,5,2.0\n\
         Salah,Liverpool,7,2\n",
    )
    .expect("csv should parse");
    let source = MemorySeasonSource::new().with_merged("2023-24", merged);
    let reconciler = SeasonReconciler::new(&source);

    let season = reconciler
        .load_merged_only("2023-24")
        .expect("season should load");

    assert_eq!(season.duplicates_dropped, 2);
    assert_eq!(season.len(), 3);
    assert_eq!(season.table.cell(0, "total_points"), Some("12"));
    assert_eq!(season.table.cell(2, "total_points"), Some("5"));
}

#[test]
fn gameweek_column_is_overwritten_with_requested_gameweek() {
    let (raw, _) = Table::from_csv_str("name,team,total_points,GW\nPalmer,Chelsea,10,99\n")
        .expect("csv should parse");
    let source = MemorySeasonSource::new().with_gameweek("2024-25", 3, raw);
    let reconciler = SeasonReconciler::new(&source);

    let season = reconciler
        .reconcile_season("2024-25")
        .expect("season should reconcile");

    assert_eq!(season.table.cell(0, "GW"), Some("3"));
    assert_eq!(season.table.cell(0, "season"), Some("2024-25"));
}

#[test]
fn season_that_loses_its_name_column_is_dropped() {
    let (gw1, _) = Table::from_csv_str("name,total_points,GW\nSaka,2,1\n").expect("csv");
    let (gw2, _) = Table::from_csv_str("player,total_points,GW\nSaka,4,2\n").expect("csv");
    let source = MemorySeasonSource::new()
        .with_gameweek("2024-25", 1, gw1)
        .with_gameweek("2024-25", 2, gw2);
    let reconciler = SeasonReconciler::new(&source);

    assert!(reconciler.reconcile_season("2024-25").is_none());
}
