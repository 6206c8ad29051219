use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, XgbodError};
use crate::models::base_model::BaseDetector;
use crate::models::neighbors::{kneighbors, Neighborhood};
use crate::utils::validation::{check_array, check_n_features};

/// How the k neighbor distances collapse into one outlier score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnnMethod {
    /// Distance to the k-th neighbor
    Largest,
    /// Average distance to the k neighbors
    Mean,
    /// Median distance to the k neighbors
    Median,
}

/// k-nearest-neighbor outlier detector.
#[derive(Debug, Clone)]
pub struct KNN {
    n_neighbors: usize,
    method: KnnMethod,
    train: Option<Array2<f64>>,
    decision_scores: Option<Array1<f64>>,
}

impl KNN {
    pub fn new(n_neighbors: usize, method: KnnMethod) -> Self {
        KNN {
            n_neighbors,
            method,
            train: None,
            decision_scores: None,
        }
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn method(&self) -> KnnMethod {
        self.method
    }

    fn score(&self, hood: &Neighborhood) -> f64 {
        let d = &hood.distances;
        match self.method {
            KnnMethod::Largest => d[d.len() - 1],
            KnnMethod::Mean => d.iter().sum::<f64>() / d.len() as f64,
            KnnMethod::Median => {
                let mid = d.len() / 2;
                if d.len() % 2 == 0 {
                    (d[mid - 1] + d[mid]) / 2.0
                } else {
                    d[mid]
                }
            }
        }
    }

    fn score_rows(&self, train: &Array2<f64>, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let hoods = kneighbors(train, x, self.n_neighbors)?;
        Ok(hoods.iter().map(|h| self.score(h)).collect())
    }
}

impl BaseDetector for KNN {
    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<()> {
        check_array(x)?;
        if self.n_neighbors == 0 || self.n_neighbors >= x.nrows() {
            return Err(XgbodError::invalid_parameter(
                "n_neighbors",
                format!(
                    "must be in [1, n_samples - 1], got {} with n_samples = {}",
                    self.n_neighbors,
                    x.nrows()
                ),
            ));
        }
        let train = x.to_owned();
        let scores = self.score_rows(&train, x)?;
        self.train = Some(train);
        self.decision_scores = Some(scores);
        Ok(())
    }

    fn decision_scores(&self) -> Option<&Array1<f64>> {
        self.decision_scores.as_ref()
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let train = self.train.as_ref().ok_or(XgbodError::NotFitted("KNN"))?;
        check_n_features(train.ncols(), x)?;
        self.score_rows(train, x)
    }

    fn name(&self) -> String {
        let method = match self.method {
            KnnMethod::Largest => "largest",
            KnnMethod::Mean => "mean",
            KnnMethod::Median => "median",
        };
        format!("KNN(n_neighbors={}, method={method})", self.n_neighbors)
    }
}
