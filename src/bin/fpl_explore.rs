use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use fpl_points::config::TrainConfig;
use fpl_points::explore::{ExplorationReport, FeatureExplorer};
use fpl_points::features;

fn main() -> Result<()> {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db_path = parse_db_path_arg().unwrap_or_else(|| TrainConfig::from_env().db_path);
    let conn = features::open_read_only(&db_path)?;
    let report = FeatureExplorer::new(&conn)?.explore()?;

    println!("ML feature dataset exploration");
    println!("DB: {}", db_path.display());
    print_report(&report);
    Ok(())
}

fn print_report(report: &ExplorationReport) {
    let o = &report.overview;
    println!();
    println!("Dataset overview:");
    println!("  Total rows: {}", o.total_rows);
    println!("  Unique players: {}", o.unique_players);
    println!("  Seasons: {}", o.seasons);
    println!("  Unique gameweeks: {}", o.unique_gameweeks);
    if let Some((lo, hi)) = o.gameweek_range {
        println!("  Gameweek range: {lo}-{hi}");
    }

    println!();
    println!("Target (next_gw_points):");
    match &report.target {
        Some(t) => {
            println!("  Average: {:.2} points", t.mean);
            if let Some(sd) = t.std_dev {
                println!("  Std dev: {sd:.2}");
            }
            println!("  Range: {} - {}", t.min, t.max);
            println!("  Median: {:.1}", t.median);
            println!("  Blanks (0 pts): {} ({:.1}%)", t.blanks, pct(t.blanks, t.samples));
            println!(
                "  Big hauls (10+): {} ({:.1}%)",
                t.big_hauls,
                pct(t.big_hauls, t.samples)
            );
            println!(
                "  Huge hauls (15+): {} ({:.1}%)",
                t.huge_hauls,
                pct(t.huge_hauls, t.samples)
            );
        }
        None => println!("  unavailable"),
    }

    if !report.positions.is_empty() {
        println!();
        println!("Positions:");
        for p in &report.positions {
            println!(
                "  {}: {} records, {} players, avg next pts {}, avg form {}",
                p.label,
                p.records,
                p.unique_players,
                fmt_opt(p.avg_next_points),
                fmt_opt(p.avg_form)
            );
        }
    }

    let c = &report.completeness;
    println!();
    println!("Feature completeness ({} rows):", c.total);
    for (label, value) in [
        ("With form data", c.with_form),
        ("With team form", c.with_team_form),
        ("With position ranking", c.with_position_rank),
        ("Positive form (>0)", c.positive_form),
        ("5+ games played", c.enough_games),
    ] {
        match value {
            Some(n) => println!("  {label}: {n} ({:.1}%)", pct(n, c.total)),
            None => println!("  {label}: column missing"),
        }
    }

    if !report.seasons.is_empty() {
        println!();
        println!("Seasons:");
        for s in &report.seasons {
            println!(
                "  {}: {} records, {} players, {} GWs, avg {} pts",
                s.season,
                s.records,
                s.players,
                s.gameweeks,
                fmt_opt(s.avg_next_points)
            );
        }
    }

    if !report.correlations.is_empty() {
        println!();
        println!("Correlation with next_gw_points:");
        for corr in &report.correlations {
            println!("  {:28} r={:+.3} n={}", corr.feature, corr.r, corr.samples);
        }
    }

    let q = &report.quality;
    println!();
    println!("Data quality:");
    if q.any() {
        for (label, value) in [
            ("Missing form data", q.missing_form),
            ("Negative form values", q.negative_form),
            ("Negative target values", q.negative_target),
            ("Insufficient games (<3)", q.insufficient_games),
            ("Zero player values", q.zero_value),
        ] {
            if let Some(n) = value
                && n > 0
            {
                println!("  {label}: {n}");
            }
        }
    } else {
        println!("  no issues found");
    }

    println!();
    println!("Feature distributions:");
    for d in &report.distributions {
        match (&d.stats, d.available) {
            (Some(s), _) => {
                println!("  {} ({}):", d.description, d.feature);
                println!("    Range: {:.2} - {:.2}", s.min, s.max);
                println!(
                    "    Q25/Median/Q75: {:.2} / {:.2} / {:.2}",
                    s.q25, s.median, s.q75
                );
                println!("    Mean ± Std: {:.2} ± {}", s.mean, fmt_opt(s.std_dev));
            }
            (None, true) => println!("  {} ({}): no values", d.description, d.feature),
            (None, false) => println!("  {} ({}): column missing", d.description, d.feature),
        }
    }

    if let Some(field) = &report.opponent_field {
        let ov = &field.overview;
        println!();
        println!("opponent_team field:");
        println!("  Total records: {}", ov.total_records);
        println!(
            "  With opponent: {} ({:.1}%)",
            ov.with_opponent,
            pct(ov.with_opponent, ov.total_records)
        );
        println!("  Unique opponent values: {}", ov.unique_opponents);
        if let Some((lo, hi)) = ov.id_range {
            println!("  Opponent ID range: {lo} - {hi}");
        }
        for s in &field.seasons {
            let (lo, hi) = s.id_range.unwrap_or((0, 0));
            println!(
                "  {}: {} unique opponents ({lo}-{hi}), {} records",
                s.season, s.unique_opponents, s.records
            );
        }
        for t in field.teams.iter().take(10) {
            println!(
                "  {} {}: {} opponents ({} home, {} away)",
                t.season, t.team, t.opponents, t.home_opponents, t.away_opponents
            );
        }
        println!("  Team ID mapping by name order:");
        for t in field.teams.iter().take(15) {
            let ids = t
                .opponent_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "    {} {} (expected ID {}): faces IDs {ids}",
                t.season, t.team, t.expected_id
            );
        }
    }
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "-".to_string())
}

fn parse_db_path_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
