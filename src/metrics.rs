//! Error metrics and summary statistics for points predictions.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

pub const BIG_HAUL_POINTS: f64 = 10.0;
pub const BIG_HAUL_TOP_PERCENTILE: f64 = 95.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub samples: usize,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BigHaulStats {
    pub actual_hauls: usize,
    pub threshold: f64,
    pub top_predictions: usize,
    pub captured: usize,
    pub recall: f64,
}

pub fn evaluate(actual: &[f64], predicted: &[f64]) -> RegressionMetrics {
    if actual.is_empty() || actual.len() != predicted.len() {
        return RegressionMetrics::default();
    }
    RegressionMetrics {
        samples: actual.len(),
        mae: mean_absolute_error(actual, predicted),
        rmse: root_mean_squared_error(actual, predicted),
        r2: r2_score(actual, predicted),
    }
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    sum / actual.len() as f64
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sum / actual.len() as f64).sqrt()
}

/// `1 - SS_res / SS_tot`. A constant target scores 1.0 when matched exactly, else 0.0.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let m = mean(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - m).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot <= 0.0 {
        return if ss_res <= 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Share of rows where "above the median" agrees between actual and predicted values, each
/// against its own median.
pub fn directional_accuracy(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return 0.0;
    }
    let actual_median = median(actual);
    let pred_median = median(predicted);
    let agree = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| (**a > actual_median) == (**p > pred_median))
        .count();
    agree as f64 / actual.len() as f64
}

/// How many actual big hauls land in the top 5% of predictions. Recall is 0 when there are
/// no hauls.
pub fn big_haul_recall(actual: &[f64], predicted: &[f64]) -> BigHaulStats {
    if actual.is_empty() || actual.len() != predicted.len() {
        return BigHaulStats::default();
    }
    let threshold = percentile(predicted, BIG_HAUL_TOP_PERCENTILE);
    let actual_hauls = actual.iter().filter(|a| **a >= BIG_HAUL_POINTS).count();
    let top_predictions = predicted.iter().filter(|p| **p >= threshold).count();
    let captured = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| **a >= BIG_HAUL_POINTS && **p >= threshold)
        .count();
    BigHaulStats {
        actual_hauls,
        threshold,
        top_predictions,
        captured,
        recall: captured as f64 / actual_hauls.max(1) as f64,
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let ss = values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    percentile_sorted(&sorted, p)
}

pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    if vx <= 0.0 || vy <= 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_have_zero_error() {
        let y = [2.0, 0.0, 13.0, 6.0];
        let m = evaluate(&y, &y);
        assert_eq!(m.samples, 4);
        assert!(m.mae < 1e-12);
        assert!(m.rmse < 1e-12);
        assert!((m.r2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&v, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&v, 95.0) - 3.85).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn constant_target_r2_is_finite() {
        assert_eq!(r2_score(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
        assert_eq!(r2_score(&[2.0, 2.0], &[1.0, 3.0]), 0.0);
    }

    #[test]
    fn pearson_detects_sign() {
        let x = [1.0, 2.0, 3.0];
        assert!((pearson(&x, &[2.0, 4.0, 6.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&x, &[3.0, 2.0, 1.0]).unwrap() + 1.0).abs() < 1e-12);
        assert!(pearson(&x, &[1.0, 1.0, 1.0]).is_none());
    }

    #[test]
    fn empty_inputs_do_not_panic() {
        assert_eq!(directional_accuracy(&[], &[]), 0.0);
        assert_eq!(big_haul_recall(&[], &[]).recall, 0.0);
        assert_eq!(evaluate(&[], &[]).samples, 0);
    }
}
