use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use fpl_points::config::TrainConfig;
use fpl_points::trainer::BaselineTrainer;

fn main() -> Result<()> {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = TrainConfig::from_env();
    if let Some(path) = parse_value_arg("--db") {
        config.db_path = PathBuf::from(path);
    }
    if let Some(dir) = parse_value_arg("--model-dir") {
        config.model_dir = PathBuf::from(dir);
    }
    if let Some(raw) = parse_value_arg("--min-games") {
        config.min_games = raw
            .parse::<u32>()
            .with_context(|| format!("invalid --min-games value {raw}"))?;
    }

    let report = BaselineTrainer::new(config.clone()).run()?;

    println!(
        "Baseline model rows={} players={} features={} min_games={}",
        report.rows_loaded,
        report.unique_players,
        report.feature_columns.len(),
        config.min_games
    );
    for imp in &report.imputations {
        println!(
            "  imputed {:28} filled={} median={:.3}",
            imp.column, imp.filled, imp.median
        );
    }
    println!(
        "split train={} ({}) val={} ({}) test={} ({}) unassigned={}",
        report.train_samples,
        config.split.train.join(","),
        report.val_samples,
        config.split.validation.join(","),
        report.test_samples,
        config.split.test.join(","),
        report.unassigned_rows
    );
    println!(
        "fit iterations={} train_mse={:.4} val_mse={:.4} baseline_val_mse={:.4}",
        report.fit.iterations, report.fit.train_mse, report.fit.val_mse, report.fit.baseline_val_mse
    );
    println!();
    println!(
        "val   MAE={:.3} RMSE={:.3} R2={:.3}  (mean baseline MAE={:.3} RMSE={:.3})",
        report.validation.mae,
        report.validation.rmse,
        report.validation.r2,
        report.validation_baseline.mae,
        report.validation_baseline.rmse
    );
    let test = &report.test;
    println!(
        "test  MAE={:.3} RMSE={:.3} R2={:.3}",
        test.metrics.mae, test.metrics.rmse, test.metrics.r2
    );
    println!(
        "      actual {:.2} ± {:.2}  predicted {:.2} ± {:.2}",
        test.actual_mean, test.actual_std, test.predicted_mean, test.predicted_std
    );
    println!(
        "      directional accuracy {:.1}%",
        test.directional_accuracy * 100.0
    );
    println!(
        "      big hauls {} (top 5% threshold {:.2}, {} predictions) captured {} recall {:.1}%",
        test.big_haul.actual_hauls,
        test.big_haul.threshold,
        test.big_haul.top_predictions,
        test.big_haul.captured,
        test.big_haul.recall * 100.0
    );
    println!();
    println!("Top features:");
    for (name, importance) in &report.top_features {
        println!("  {name:28} {importance:.4}");
    }
    println!();
    println!("model written: {}", report.artifacts.model.display());
    println!("features written: {}", report.artifacts.feature_columns.display());
    println!(
        "importance written: {}",
        report.artifacts.feature_importance.display()
    );
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
