//! Brute-force nearest-neighbor search shared by the distance-based detectors.
//!
//! A query that coincides exactly with a training sample is treated as that
//! sample: the first zero-distance match is left out of its neighborhood.
//! Scoring the training matrix therefore yields leave-one-out neighborhoods,
//! and `decision_function` on the training data reproduces the training scores.

use std::cmp::Ordering;

use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::error::{Result, XgbodError};

#[derive(Debug, Clone)]
pub(crate) struct Neighborhood {
    /// Ascending distances to the k nearest training samples
    pub distances: Vec<f64>,
    pub indices: Vec<usize>,
}

pub(crate) fn euclidean_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn query_one(train: &Array2<f64>, query: ArrayView1<'_, f64>, k: usize) -> Result<Neighborhood> {
    let mut candidates: Vec<(f64, usize)> = train
        .rows()
        .into_iter()
        .enumerate()
        .map(|(idx, row)| (euclidean_distance(query, row), idx))
        .collect();

    if let Some(pos) = candidates.iter().position(|(d, _)| *d == 0.0) {
        candidates.remove(pos);
    }

    if candidates.len() < k {
        return Err(XgbodError::invalid_parameter(
            "n_neighbors",
            format!(
                "expected n_neighbors <= n_samples - 1, but n_samples = {}, n_neighbors = {k}",
                train.nrows()
            ),
        ));
    }

    candidates.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    candidates.truncate(k);

    Ok(Neighborhood {
        distances: candidates.iter().map(|(d, _)| *d).collect(),
        indices: candidates.iter().map(|(_, i)| *i).collect(),
    })
}

/// k nearest training samples of every query row, in query order.
pub(crate) fn kneighbors(
    train: &Array2<f64>,
    queries: ArrayView2<'_, f64>,
    k: usize,
) -> Result<Vec<Neighborhood>> {
    (0..queries.nrows())
        .into_par_iter()
        .map(|i| query_one(train, queries.row(i), k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_training_query_leaves_itself_out() {
        let train = array![[0.0], [1.0], [3.0]];
        let hoods = kneighbors(&train, train.view(), 1).unwrap();
        assert_eq!(hoods[0].indices, vec![1]);
        assert_eq!(hoods[1].indices, vec![0]);
        assert_eq!(hoods[2].distances, vec![2.0]);
    }

    #[test]
    fn test_duplicates_keep_one_zero_distance() {
        let train = array![[0.0], [0.0], [5.0]];
        let hoods = kneighbors(&train, array![[0.0]].view(), 1).unwrap();
        assert_eq!(hoods[0].distances, vec![0.0]);
        assert_eq!(hoods[0].indices, vec![1]);
    }

    #[test]
    fn test_too_many_neighbors() {
        let train = array![[0.0], [1.0]];
        assert!(kneighbors(&train, train.view(), 2).is_err());
    }
}
