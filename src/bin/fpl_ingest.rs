use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use fpl_points::assemble::DatasetAssembler;
use fpl_points::config::{LoaderConfig, parse_season_list};
use fpl_points::source::{HttpSeasonSource, MemorySeasonSource, SeasonSource};
use fpl_points::store;

fn main() -> Result<()> {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = LoaderConfig::from_env();
    if let Some(path) = parse_value_arg("--db") {
        config.db_path = PathBuf::from(path);
    }
    if let Some(url) = parse_value_arg("--base-url") {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(list) = parse_value_arg("--complete-seasons") {
        config.seasons.complete_seasons = parse_season_list(&list);
    }
    if let Some(list) = parse_value_arg("--partial-seasons") {
        config.seasons.partial_seasons = parse_season_list(&list);
    }

    if config.seasons.is_empty() {
        return Err(anyhow!("no seasons configured"));
    }

    let source: Box<dyn SeasonSource> = match parse_value_arg("--source-dir") {
        Some(dir) => {
            let seasons = config
                .seasons
                .complete_seasons
                .iter()
                .chain(&config.seasons.partial_seasons)
                .cloned()
                .collect::<Vec<_>>();
            Box::new(
                MemorySeasonSource::from_dir(&PathBuf::from(&dir), &seasons)
                    .with_context(|| format!("load season files from {dir}"))?,
            )
        }
        None => Box::new(HttpSeasonSource::new(&config)?),
    };

    let assembler = DatasetAssembler::new(source.as_ref());
    let (dataset, summary) = assembler
        .assemble(&config.seasons)
        .context("assemble historical dataset")?;
    let stats = store::write_dataset(&config.db_path, &dataset)?;

    println!("FPL historical ingest complete");
    println!("DB: {}", config.db_path.display());
    println!(
        "Seasons: {}/{}",
        summary.seasons.len(),
        summary.seasons_attempted
    );
    for season in &summary.seasons {
        let (lo, hi) = season.gameweek_range.unwrap_or((0, 0));
        println!(
            " - {} rows={} GWs {lo}-{hi} ({} unique) source={:?} individual={} dupes={}",
            season.season,
            season.rows,
            season.unique_gameweeks,
            season.source_kind,
            season.individual_gameweeks,
            season.duplicates_dropped
        );
        if !season.failed_gameweeks.is_empty() {
            println!("   failed GWs: {:?}", season.failed_gameweeks);
        }
    }
    if !summary.skipped_seasons.is_empty() {
        println!("Skipped: {}", summary.skipped_seasons.join(", "));
    }
    println!("Columns: {}", summary.columns);
    println!("Rows written: {}", stats.total_rows);
    println!("Unique players: {}", stats.unique_players);
    println!("Season-gameweeks: {}", stats.unique_gameweeks);

    Ok(())
}

fn parse_value_arg(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
