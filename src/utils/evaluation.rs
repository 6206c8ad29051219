use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1};

use crate::error::{Result, XgbodError};

/// Built-in evaluation metrics for `fit_predict_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scoring {
    /// Area under the ROC curve
    RocAuc,
    /// Precision @ rank n
    PrecisionAtN,
}

impl Scoring {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scoring::RocAuc => "roc_auc_score",
            Scoring::PrecisionAtN => "prc_n_score",
        }
    }

    pub fn evaluate(&self, y_true: ArrayView1<'_, f64>, scores: ArrayView1<'_, f64>) -> Result<f64> {
        match self {
            Scoring::RocAuc => roc_auc_score(y_true, scores),
            Scoring::PrecisionAtN => precision_n_scores(y_true, scores, None),
        }
    }
}

impl FromStr for Scoring {
    type Err = XgbodError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "roc_auc_score" => Ok(Scoring::RocAuc),
            "prc_n_score" => Ok(Scoring::PrecisionAtN),
            other => Err(XgbodError::UnsupportedMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_same_len(y_true: ArrayView1<'_, f64>, scores: ArrayView1<'_, f64>) -> Result<()> {
    if y_true.len() != scores.len() {
        return Err(XgbodError::InconsistentSamples {
            x_rows: scores.len(),
            y_len: y_true.len(),
        });
    }
    if y_true.is_empty() {
        return Err(XgbodError::InvalidInput("cannot score 0 samples".into()));
    }
    Ok(())
}

/// 1-based ranks with ties sharing their average rank.
fn average_ranks(values: ArrayView1<'_, f64>) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end share rank (start+1 + end)/2
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

/// Area under the ROC curve, computed as the Mann-Whitney U statistic.
pub fn roc_auc_score(y_true: ArrayView1<'_, f64>, scores: ArrayView1<'_, f64>) -> Result<f64> {
    check_same_len(y_true, scores)?;
    let n_pos = y_true.iter().filter(|&&v| v > 0.0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(XgbodError::UndefinedMetric(
            "only one class present in y_true; ROC AUC score is not defined in that case".into(),
        ));
    }

    let ranks = average_ranks(scores);
    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(y_true.iter())
        .filter(|(_, label)| **label > 0.0)
        .map(|(rank, _)| rank)
        .sum();

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: ArrayView1<'_, f64>, q: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(XgbodError::InvalidInput("percentile of an empty array".into()));
    }
    if !(0.0..=100.0).contains(&q) {
        return Err(XgbodError::invalid_parameter("q", format!("{q} is not in [0, 100]")));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Labels the top-n scores as outliers.
///
/// `n` defaults to the number of outliers in `y_true`.
pub fn get_label_n(
    y_true: ArrayView1<'_, f64>,
    scores: ArrayView1<'_, f64>,
    n: Option<usize>,
) -> Result<Array1<f64>> {
    check_same_len(y_true, scores)?;
    let n_samples = y_true.len() as f64;
    let outliers_fraction = match n {
        Some(n) => n as f64 / n_samples,
        None => y_true.iter().filter(|&&v| v != 0.0).count() as f64 / n_samples,
    };
    let threshold = percentile(scores, 100.0 * (1.0 - outliers_fraction).clamp(0.0, 1.0))?;
    Ok(scores.mapv(|s| if s > threshold { 1.0 } else { 0.0 }))
}

/// Precision @ rank n.
pub fn precision_n_scores(
    y_true: ArrayView1<'_, f64>,
    scores: ArrayView1<'_, f64>,
    n: Option<usize>,
) -> Result<f64> {
    let y_pred = get_label_n(y_true, scores, n)?;
    Ok(precision(y_true, y_pred.view()))
}

/// Share of predicted outliers that are true outliers; 0 when none is predicted.
fn precision(true_labels: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    let (tp, fp) = true_labels
        .iter()
        .zip(y_pred.iter())
        .filter(|&(_, &pred)| pred > 0.0)
        .fold((0.0, 0.0), |(tp, fp), (&label, _)| {
            if label > 0.0 {
                (tp + 1.0, fp)
            } else {
                (tp, fp + 1.0)
            }
        });
    if tp + fp > 0.0 {
        tp / (tp + fp)
    } else {
        0.0
    }
}
