use ndarray::{Array1, Array2, ArrayView2};
use tracing::warn;

use crate::error::{Result, XgbodError};
use crate::models::base_model::BaseDetector;
use crate::models::neighbors::{kneighbors, Neighborhood};
use crate::utils::validation::{check_array, check_n_features};

/// Keeps the reachability density finite for duplicated samples.
const LRD_EPS: f64 = 1e-10;

struct LofState {
    train: Array2<f64>,
    k: usize,
    k_distance: Array1<f64>,
    lrd: Array1<f64>,
}

impl LofState {
    fn local_reachability_density(&self, hood: &Neighborhood) -> f64 {
        let reach_sum: f64 = hood
            .distances
            .iter()
            .zip(hood.indices.iter())
            .map(|(&d, &o)| d.max(self.k_distance[o]))
            .sum();
        1.0 / (reach_sum / hood.distances.len() as f64 + LRD_EPS)
    }

    fn outlier_factor(&self, hood: &Neighborhood) -> f64 {
        let lrd_q = self.local_reachability_density(hood);
        let lrd_neighbors: f64 = hood.indices.iter().map(|&o| self.lrd[o]).sum();
        lrd_neighbors / hood.indices.len() as f64 / lrd_q
    }

    fn score_rows(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let hoods = kneighbors(&self.train, x, self.k)?;
        Ok(hoods.iter().map(|h| self.outlier_factor(h)).collect())
    }
}

/// Local Outlier Factor detector.
pub struct LOF {
    n_neighbors: usize,
    state: Option<LofState>,
    decision_scores: Option<Array1<f64>>,
}

impl LOF {
    pub fn new(n_neighbors: usize) -> Self {
        LOF {
            n_neighbors,
            state: None,
            decision_scores: None,
        }
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }
}

impl BaseDetector for LOF {
    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<()> {
        check_array(x)?;
        let n_samples = x.nrows();
        if self.n_neighbors == 0 {
            return Err(XgbodError::invalid_parameter("n_neighbors", "must be at least 1"));
        }
        if n_samples < 2 {
            return Err(XgbodError::InvalidInput(
                "LOF needs at least 2 samples".into(),
            ));
        }
        let k = if self.n_neighbors >= n_samples {
            warn!(
                n_neighbors = self.n_neighbors,
                n_samples, "n_neighbors is not below n_samples; using n_samples - 1"
            );
            n_samples - 1
        } else {
            self.n_neighbors
        };

        let train = x.to_owned();
        let hoods = kneighbors(&train, x, k)?;
        let k_distance: Array1<f64> = hoods.iter().map(|h| h.distances[k - 1]).collect();

        let mut state = LofState {
            train,
            k,
            k_distance,
            lrd: Array1::zeros(n_samples),
        };
        let lrd: Array1<f64> = hoods
            .iter()
            .map(|h| state.local_reachability_density(h))
            .collect();
        state.lrd = lrd;

        let scores: Array1<f64> = hoods.iter().map(|h| state.outlier_factor(h)).collect();
        self.state = Some(state);
        self.decision_scores = Some(scores);
        Ok(())
    }

    fn decision_scores(&self) -> Option<&Array1<f64>> {
        self.decision_scores.as_ref()
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let state = self.state.as_ref().ok_or(XgbodError::NotFitted("LOF"))?;
        check_n_features(state.train.ncols(), x)?;
        state.score_rows(x)
    }

    fn name(&self) -> String {
        format!("LOF(n_neighbors={})", self.n_neighbors)
    }
}
