use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MODEL_VERSION: u32 = 1;

const L2_REG: f64 = 0.01;
const MAX_ITERS: usize = 3000;
const LR_START: f64 = 0.05;
const IMPROVEMENT_EPS: f64 = 1e-6;
const EVAL_EVERY: usize = 20;
const PATIENCE: usize = 20;

pub trait Regressor {
    fn fit(
        &mut self,
        x_train: &[Vec<f64>],
        y_train: &[f64],
        x_val: &[Vec<f64>],
        y_val: &[f64],
    ) -> Result<FitReport>;

    fn predict_one(&self, x: &[f64]) -> f64;

    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }

    fn feature_importance(&self) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitReport {
    pub iterations: usize,
    pub train_mse: f64,
    pub val_mse: f64,
    pub baseline_val_mse: f64,
}

/// Ridge regression on standardized features, fitted by gradient descent and stopped early on
/// validation error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub coeffs: Vec<f64>,
    pub intercept: f64,
    pub l2: f64,
    pub iterations: usize,
}

impl LinearRegressor {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            l2: L2_REG,
            ..Default::default()
        }
    }

    pub fn with_l2(mut self, l2: f64) -> Self {
        self.l2 = l2.max(0.0);
        self
    }

    fn standardize(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.feature_means.iter().zip(&self.feature_stds))
            .map(|(v, (m, s))| standardized(*v, *m, *s))
            .collect()
    }
}

impl Regressor for LinearRegressor {
    fn fit(
        &mut self,
        x_train: &[Vec<f64>],
        y_train: &[f64],
        x_val: &[Vec<f64>],
        y_val: &[f64],
    ) -> Result<FitReport> {
        let width = self.feature_names.len();
        if x_train.is_empty() || x_train.len() != y_train.len() {
            return Err(anyhow!(
                "training set is empty or misaligned (x={}, y={})",
                x_train.len(),
                y_train.len()
            ));
        }
        if x_val.len() != y_val.len() {
            return Err(anyhow!("validation set is misaligned"));
        }
        if let Some(bad) = x_train.iter().chain(x_val).find(|r| r.len() != width) {
            return Err(anyhow!(
                "feature row has {} values, expected {width}",
                bad.len()
            ));
        }

        let (means, stds) = feature_norm_stats(x_train, width);
        self.feature_means = means;
        self.feature_stds = stds;
        let train: Vec<Vec<f64>> = x_train.iter().map(|r| self.standardize(r)).collect();
        let val: Vec<Vec<f64>> = x_val.iter().map(|r| self.standardize(r)).collect();

        // Without a validation split the training error drives early stopping.
        let (stop_x, stop_y) = if val.is_empty() {
            (&train, y_train)
        } else {
            (&val, y_val)
        };

        let y_mean = y_train.iter().sum::<f64>() / y_train.len() as f64;
        let mut coeffs = vec![0.0; width];
        let mut intercept = y_mean;
        let baseline_val_mse = mse(&coeffs, intercept, stop_x, stop_y);

        let mut best = (coeffs.clone(), intercept);
        let mut best_loss = baseline_val_mse;
        let mut no_improve = 0usize;
        let mut iterations = 0usize;
        let n = train.len() as f64;

        for iter in 0..MAX_ITERS {
            iterations = iter + 1;
            let mut grad = vec![0.0; width];
            let mut grad_b = 0.0;
            for (x, y) in train.iter().zip(y_train) {
                let err = dot(&coeffs, x) + intercept - y;
                grad_b += err;
                for j in 0..width {
                    grad[j] += err * x[j];
                }
            }

            let lr = LR_START / (1.0 + iter as f64 * 0.003);
            for j in 0..width {
                let g = grad[j] / n + self.l2 * coeffs[j];
                coeffs[j] -= lr * g;
            }
            intercept -= lr * grad_b / n;

            if iter % EVAL_EVERY == 0 || iter + 1 == MAX_ITERS {
                let loss = mse(&coeffs, intercept, stop_x, stop_y);
                if loss + IMPROVEMENT_EPS < best_loss {
                    best_loss = loss;
                    best = (coeffs.clone(), intercept);
                    no_improve = 0;
                } else {
                    no_improve += 1;
                    if no_improve >= PATIENCE {
                        debug!(iter, "early stop");
                        break;
                    }
                }
            }
        }

        let (coeffs, intercept) = best;
        let train_mse = mse(&coeffs, intercept, &train, y_train);
        self.coeffs = coeffs;
        self.intercept = intercept;
        self.iterations = iterations;

        Ok(FitReport {
            iterations,
            train_mse,
            val_mse: best_loss,
            baseline_val_mse,
        })
    }

    fn predict_one(&self, x: &[f64]) -> f64 {
        dot(&self.coeffs, &self.standardize(x)) + self.intercept
    }

    fn feature_importance(&self) -> Vec<f64> {
        let total: f64 = self.coeffs.iter().map(|c| c.abs()).sum();
        if total <= 0.0 {
            return vec![0.0; self.coeffs.len()];
        }
        self.coeffs.iter().map(|c| c.abs() / total).collect()
    }
}

pub fn ranked_importance(names: &[String], importance: &[f64]) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = names.iter().cloned().zip(importance.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

fn feature_norm_stats(rows: &[Vec<f64>], width: usize) -> (Vec<f64>, Vec<f64>) {
    let mut mean = vec![0.0; width];
    let mut var = vec![0.0; width];
    if rows.is_empty() {
        return (mean, vec![1.0; width]);
    }
    for row in rows {
        for i in 0..width {
            mean[i] += row[i];
        }
    }
    let n = rows.len() as f64;
    for v in &mut mean {
        *v /= n;
    }
    for row in rows {
        for i in 0..width {
            let d = row[i] - mean[i];
            var[i] += d * d;
        }
    }
    for v in &mut var {
        *v = (*v / n).sqrt().max(1e-6);
    }
    (mean, var)
}

fn standardized(x: f64, mean: f64, std: f64) -> f64 {
    (x - mean) / std.max(1e-6)
}

fn mse(coeffs: &[f64], intercept: f64, x: &[Vec<f64>], y: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = x
        .iter()
        .zip(y)
        .map(|(row, t)| (dot(coeffs, row) + intercept - t).powi(2))
        .sum();
    sum / x.len() as f64
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::{LinearRegressor, Regressor, ranked_importance};

    fn synthetic(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let a = (i % 10) as f64;
            let b = ((i * 7) % 5) as f64;
            x.push(vec![a, b]);
            y.push(1.0 + 2.0 * a + 0.1 * b);
        }
        (x, y)
    }

    #[test]
    fn fits_linear_signal() {
        let (x, y) = synthetic(200);
        let (xv, yv) = synthetic(50);
        let mut model = LinearRegressor::new(vec!["a".into(), "b".into()]).with_l2(0.0);
        let report = model.fit(&x, &y, &xv, &yv).expect("fit should succeed");
        assert!(report.val_mse < report.baseline_val_mse);
        let pred = model.predict_one(&[4.0, 1.0]);
        assert!((pred - 9.1).abs() < 0.5, "pred={pred}");

        let ranked = ranked_importance(&model.feature_names, &model.feature_importance());
        assert_eq!(ranked[0].0, "a");
        let total: f64 = ranked.iter().map(|(_, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_misaligned_rows() {
        let mut model = LinearRegressor::new(vec!["a".into()]);
        assert!(model.fit(&[vec![1.0, 2.0]], &[1.0], &[], &[]).is_err());
        assert!(model.fit(&[], &[], &[], &[]).is_err());
    }
}
