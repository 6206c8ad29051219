use ndarray::{Array1, ArrayView2, Axis};

use crate::error::{Result, XgbodError};
use crate::models::base_model::BaseDetector;
use crate::utils::validation::{check_array, check_n_features, check_parameter};

/// Bin of an in-range value; the right-most bin is closed on both ends.
fn bin_index(edges: &[f64], v: f64) -> usize {
    let n_bins = edges.len() - 1;
    edges.partition_point(|&e| e <= v).saturating_sub(1).min(n_bins - 1)
}

/// Per-feature histogram: bin edges and log2 density per bin.
#[derive(Debug, Clone)]
struct FeatureHistogram {
    edges: Vec<f64>,
    log_density: Vec<f64>,
    min_log_density: f64,
}

impl FeatureHistogram {
    fn build(values: &[f64], n_bins: usize, alpha: f64) -> Self {
        let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / n_bins as f64;
        let mut edges: Vec<f64> = (0..=n_bins).map(|b| lo + width * b as f64).collect();
        edges[n_bins] = hi;

        let mut counts = vec![0usize; n_bins];
        for &v in values {
            counts[bin_index(&edges, v)] += 1;
        }

        let n = values.len() as f64;
        let log_density: Vec<f64> = counts
            .iter()
            .map(|&c| (c as f64 / (n * width) + alpha).log2())
            .collect();
        let min_log_density = log_density.iter().copied().fold(f64::INFINITY, f64::min);

        FeatureHistogram {
            edges,
            log_density,
            min_log_density,
        }
    }

    fn score(&self, v: f64, tol: f64) -> f64 {
        let n_bins = self.log_density.len();
        let first = self.edges[0];
        let last = self.edges[n_bins];
        if v < first {
            let bin_width = self.edges[1] - first;
            if first - v <= bin_width * tol {
                self.log_density[0]
            } else {
                self.min_log_density
            }
        } else if v >= last {
            let bin_width = last - self.edges[n_bins - 1];
            if v - last <= bin_width * tol {
                self.log_density[n_bins - 1]
            } else {
                self.min_log_density
            }
        } else {
            self.log_density[bin_index(&self.edges, v)]
        }
    }
}

/// Histogram-based outlier score detector.
#[derive(Debug, Clone)]
pub struct HBOS {
    n_bins: usize,
    alpha: f64,
    tol: f64,
    histograms: Option<Vec<FeatureHistogram>>,
    decision_scores: Option<Array1<f64>>,
}

impl HBOS {
    pub fn new(n_bins: usize) -> Self {
        HBOS {
            n_bins,
            alpha: 0.1,
            tol: 0.5,
            histograms: None,
            decision_scores: None,
        }
    }

    /// Regularizer added to every density before the log.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// How far outside the histogram range (in bin widths) a value still maps
    /// to the edge bin.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    fn score_rows(&self, histograms: &[FeatureHistogram], x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.axis_iter(Axis(0))
            .map(|row| {
                -row.iter()
                    .zip(histograms.iter())
                    .map(|(&v, h)| h.score(v, self.tol))
                    .sum::<f64>()
            })
            .collect()
    }
}

impl BaseDetector for HBOS {
    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<()> {
        check_array(x)?;
        if self.n_bins < 2 {
            return Err(XgbodError::invalid_parameter("n_bins", "must be at least 2"));
        }
        check_parameter(self.alpha, 0.0, 1.0, "alpha", true, true)?;
        check_parameter(self.tol, 0.0, 1.0, "tol", true, true)?;

        let histograms: Vec<FeatureHistogram> = x
            .axis_iter(Axis(1))
            .map(|col| FeatureHistogram::build(&col.to_vec(), self.n_bins, self.alpha))
            .collect();
        let scores = self.score_rows(&histograms, x);
        self.histograms = Some(histograms);
        self.decision_scores = Some(scores);
        Ok(())
    }

    fn decision_scores(&self) -> Option<&Array1<f64>> {
        self.decision_scores.as_ref()
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let histograms = self.histograms.as_ref().ok_or(XgbodError::NotFitted("HBOS"))?;
        check_n_features(histograms.len(), x)?;
        Ok(self.score_rows(histograms, x))
    }

    fn name(&self) -> String {
        format!("HBOS(n_bins={})", self.n_bins)
    }
}
