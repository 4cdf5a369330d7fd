use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{SplitPlan, TrainConfig};
use crate::features::{self, FeatureSet, Imputation};
use crate::metrics::{self, BigHaulStats, RegressionMetrics};
use crate::model::{self, FitReport, LinearRegressor, MODEL_VERSION, Regressor};

pub const MODEL_FILE: &str = "baseline_model.json";
pub const FEATURE_COLUMNS_FILE: &str = "feature_columns.json";
pub const FEATURE_IMPORTANCE_FILE: &str = "feature_importance.csv";

const TOP_FEATURES: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct SplitData {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
}

impl SplitData {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    fn push(&mut self, x: Vec<f64>, y: f64) {
        self.x.push(x);
        self.y.push(y);
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetSplits {
    pub train: SplitData,
    pub validation: SplitData,
    pub test: SplitData,
    pub unassigned: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TestEvaluation {
    pub metrics: RegressionMetrics,
    pub actual_mean: f64,
    pub actual_std: f64,
    pub predicted_mean: f64,
    pub predicted_std: f64,
    pub directional_accuracy: f64,
    pub big_haul: BigHaulStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub generated_at: String,
    pub model_kind: String,
    pub min_games: u32,
    pub train_seasons: Vec<String>,
    pub validation_seasons: Vec<String>,
    pub test_seasons: Vec<String>,
    pub train_samples: usize,
    pub val_samples: usize,
    pub test_samples: usize,
    pub imputed_medians: Vec<(String, f64)>,
    pub model: LinearRegressor,
    pub validation: RegressionMetrics,
    pub test: TestEvaluation,
}

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub feature_columns: PathBuf,
    pub feature_importance: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TrainReport {
    pub rows_loaded: usize,
    pub unique_players: usize,
    pub feature_columns: Vec<String>,
    pub imputations: Vec<Imputation>,
    pub train_samples: usize,
    pub val_samples: usize,
    pub test_samples: usize,
    pub unassigned_rows: usize,
    pub fit: FitReport,
    pub validation: RegressionMetrics,
    pub validation_baseline: RegressionMetrics,
    pub test: TestEvaluation,
    pub top_features: Vec<(String, f64)>,
    pub artifacts: ArtifactPaths,
}

pub struct BaselineTrainer {
    config: TrainConfig,
}

impl BaselineTrainer {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn run(&self) -> Result<TrainReport> {
        let conn = features::open_read_only(&self.config.db_path)?;
        let set = features::load_feature_rows(&conn, self.config.min_games)?;
        drop(conn);
        self.train_on(set)
    }

    pub fn train_on(&self, mut set: FeatureSet) -> Result<TrainReport> {
        if set.is_empty() {
            return Err(anyhow!(
                "no feature rows left after filtering (min_games={})",
                self.config.min_games
            ));
        }
        if set.columns.is_empty() {
            return Err(anyhow!("feature table has none of the model input columns"));
        }
        let rows_loaded = set.len();
        let unique_players = set.unique_players();
        let imputations = set.impute_medians();

        let splits = split_by_season(&set, &self.config.split);
        info!(
            train = splits.train.len(),
            validation = splits.validation.len(),
            test = splits.test.len(),
            unassigned = splits.unassigned,
            "season split"
        );
        require_split("train", &splits.train, &self.config.split.train)?;
        require_split("validation", &splits.validation, &self.config.split.validation)?;
        require_split("test", &splits.test, &self.config.split.test)?;
        if splits.unassigned > 0 {
            warn!(rows = splits.unassigned, "rows from unassigned seasons ignored");
        }

        let mut model = LinearRegressor::new(set.columns.clone());
        let fit = model
            .fit(
                &splits.train.x,
                &splits.train.y,
                &splits.validation.x,
                &splits.validation.y,
            )
            .context("fit baseline regressor")?;
        info!(
            iterations = fit.iterations,
            train_mse = fit.train_mse,
            val_mse = fit.val_mse,
            baseline_val_mse = fit.baseline_val_mse,
            "model fitted"
        );

        let val_pred = model.predict(&splits.validation.x);
        let validation = metrics::evaluate(&splits.validation.y, &val_pred);
        let train_mean = metrics::mean(&splits.train.y);
        let validation_baseline = metrics::evaluate(
            &splits.validation.y,
            &vec![train_mean; splits.validation.len()],
        );

        let test_pred = model.predict(&splits.test.x);
        let test = evaluate_test(&splits.test.y, &test_pred);
        info!(
            mae = test.metrics.mae,
            rmse = test.metrics.rmse,
            r2 = test.metrics.r2,
            directional = test.directional_accuracy,
            big_haul_recall = test.big_haul.recall,
            "test evaluation"
        );

        let ranked = model::ranked_importance(&model.feature_names, &model.feature_importance());
        let artifact = ModelArtifact {
            version: MODEL_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            model_kind: "ridge_linear_gd".to_string(),
            min_games: self.config.min_games,
            train_seasons: self.config.split.train.clone(),
            validation_seasons: self.config.split.validation.clone(),
            test_seasons: self.config.split.test.clone(),
            train_samples: splits.train.len(),
            val_samples: splits.validation.len(),
            test_samples: splits.test.len(),
            imputed_medians: imputations
                .iter()
                .map(|i| (i.column.clone(), i.median))
                .collect(),
            model,
            validation,
            test,
        };
        let artifacts = save_artifacts(&self.config.model_dir, &artifact, &ranked)?;

        Ok(TrainReport {
            rows_loaded,
            unique_players,
            feature_columns: set.columns.clone(),
            imputations,
            train_samples: splits.train.len(),
            val_samples: splits.validation.len(),
            test_samples: splits.test.len(),
            unassigned_rows: splits.unassigned,
            fit,
            validation,
            validation_baseline,
            test,
            top_features: ranked.into_iter().take(TOP_FEATURES).collect(),
            artifacts,
        })
    }
}

/// Assigns rows to train/validation/test by season. A season listed under several splits goes to
/// the first one that names it.
pub fn split_by_season(set: &FeatureSet, plan: &SplitPlan) -> DatasetSplits {
    let mut out = DatasetSplits::default();
    for row in &set.rows {
        let target = if plan.train.contains(&row.season) {
            &mut out.train
        } else if plan.validation.contains(&row.season) {
            &mut out.validation
        } else if plan.test.contains(&row.season) {
            &mut out.test
        } else {
            out.unassigned += 1;
            continue;
        };
        target.push(row.dense(), row.next_gw_points);
    }
    out
}

pub fn evaluate_test(actual: &[f64], predicted: &[f64]) -> TestEvaluation {
    TestEvaluation {
        metrics: metrics::evaluate(actual, predicted),
        actual_mean: metrics::mean(actual),
        actual_std: metrics::std_dev(actual),
        predicted_mean: metrics::mean(predicted),
        predicted_std: metrics::std_dev(predicted),
        directional_accuracy: metrics::directional_accuracy(actual, predicted),
        big_haul: metrics::big_haul_recall(actual, predicted),
    }
}

pub fn save_artifacts(
    dir: &Path,
    artifact: &ModelArtifact,
    ranked: &[(String, f64)],
) -> Result<ArtifactPaths> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let paths = ArtifactPaths {
        model: dir.join(MODEL_FILE),
        feature_columns: dir.join(FEATURE_COLUMNS_FILE),
        feature_importance: dir.join(FEATURE_IMPORTANCE_FILE),
    };

    let raw = serde_json::to_string_pretty(artifact).context("serialize model artifact")?;
    fs::write(&paths.model, raw).with_context(|| format!("write {}", paths.model.display()))?;

    let raw = serde_json::to_string_pretty(&artifact.model.feature_names)
        .context("serialize feature columns")?;
    fs::write(&paths.feature_columns, raw)
        .with_context(|| format!("write {}", paths.feature_columns.display()))?;

    let mut writer = csv::Writer::from_path(&paths.feature_importance)
        .with_context(|| format!("create {}", paths.feature_importance.display()))?;
    writer
        .write_record(["feature", "importance"])
        .context("write importance header")?;
    for (name, importance) in ranked {
        let value = format!("{importance:.6}");
        writer
            .write_record([name.as_str(), value.as_str()])
            .context("write importance row")?;
    }
    writer.flush().context("flush feature importance")?;

    info!(dir = %dir.display(), "model artifacts saved");
    Ok(paths)
}

fn require_split(label: &str, split: &SplitData, seasons: &[String]) -> Result<()> {
    if split.is_empty() {
        return Err(anyhow!(
            "{label} split is empty (seasons: {})",
            if seasons.is_empty() {
                "none".to_string()
            } else {
                seasons.join(", ")
            }
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{evaluate_test, split_by_season};
    use crate::config::SplitPlan;
    use crate::features::{FeatureRow, FeatureSet};

    fn row(season: &str, points: f64) -> FeatureRow {
        FeatureRow {
            player_name: "p".to_string(),
            season: season.to_string(),
            gameweek: 10,
            next_gw_points: points,
            values: vec![Some(points)],
        }
    }

    #[test]
    fn split_follows_season_lists() {
        let set = FeatureSet {
            columns: vec!["avg_points_5gw".to_string()],
            rows: vec![
                row("2020-21", 1.0),
                row("2023-24", 2.0),
                row("2024-25", 3.0),
                row("2019-20", 4.0),
                row("2022-23", 5.0),
            ],
        };
        let splits = split_by_season(&set, &SplitPlan::default());
        assert_eq!(splits.train.y, vec![1.0, 5.0]);
        assert_eq!(splits.validation.y, vec![2.0]);
        assert_eq!(splits.test.y, vec![3.0]);
        assert_eq!(splits.unassigned, 1);
    }

    #[test]
    fn test_evaluation_of_perfect_predictions() {
        let y = [1.0, 2.0, 12.0, 0.0, 6.0];
        let eval = evaluate_test(&y, &y);
        assert_eq!(eval.directional_accuracy, 1.0);
        assert_eq!(eval.big_haul.actual_hauls, 1);
        assert_eq!(eval.big_haul.captured, 1);
        assert_eq!(eval.big_haul.recall, 1.0);
        assert!((eval.actual_mean - eval.predicted_mean).abs() < 1e-12);
    }
}
