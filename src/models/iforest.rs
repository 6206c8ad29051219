use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::prelude::*;
use rand::seq::index;

use crate::error::{Result, XgbodError};
use crate::models::base_model::BaseDetector;
use crate::utils::validation::{check_array, check_n_features};

const EULER_GAMMA: f64 = 0.5772156649;

// Custom tree node structure
struct Node {
    split_feature: Option<usize>,
    split_value: f64,
    size: usize,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn leaf(size: usize) -> Self {
        Node {
            split_feature: None,
            split_value: 0.0,
            size,
            left: None,
            right: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Sub-sample size drawn for every tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxSamples {
    /// min(256, n_samples)
    Auto,
    Count(usize),
}

/// Isolation Forest outlier detector.
pub struct IForest {
    n_estimators: usize,
    max_samples: MaxSamples,
    random_state: Option<u64>,
    trees: Vec<Node>,
    psi: usize,
    n_features: usize,
    decision_scores: Option<Array1<f64>>,
}

impl IForest {
    pub fn new(n_estimators: usize) -> Self {
        IForest {
            n_estimators,
            max_samples: MaxSamples::Auto,
            random_state: None,
            trees: Vec::new(),
            psi: 0,
            n_features: 0,
            decision_scores: None,
        }
    }

    pub fn with_max_samples(mut self, max_samples: MaxSamples) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    fn build_tree(
        x: ArrayView2<'_, f64>,
        rows: Vec<usize>,
        height: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> Node {
        let size = rows.len();

        // Stop criteria
        if size <= 1 || height >= height_limit {
            return Node::leaf(size);
        }

        // Randomly select split feature and value
        let split_feature = rng.gen_range(0..x.ncols());
        let (min_val, max_val) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            let v = x[[r, split_feature]];
            (lo.min(v), hi.max(v))
        });

        if max_val - min_val <= 0.0 {
            return Node::leaf(size);
        }

        let split_value = rng.gen::<f64>() * (max_val - min_val) + min_val;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| x[[r, split_feature]] < split_value);

        // Only split if we actually divided the data
        if left_rows.is_empty() || right_rows.is_empty() {
            return Node::leaf(size);
        }

        Node {
            split_feature: Some(split_feature),
            split_value,
            size,
            left: Some(Box::new(Self::build_tree(x, left_rows, height + 1, height_limit, rng))),
            right: Some(Box::new(Self::build_tree(x, right_rows, height + 1, height_limit, rng))),
        }
    }

    fn path_length(node: &Node, x: ArrayView1<'_, f64>, current_height: usize) -> f64 {
        if node.is_leaf() {
            return current_height as f64 + Self::average_path_length(node.size);
        }

        if let Some(split_feature) = node.split_feature {
            let next = if x[split_feature] < node.split_value {
                &node.left
            } else {
                &node.right
            };
            if let Some(child) = next {
                return Self::path_length(child, x, current_height + 1);
            }
        }

        current_height as f64
    }

    /// Average path length of an unsuccessful BST search over n points, c(n).
    fn average_path_length(n: usize) -> f64 {
        match n {
            0 | 1 => 0.0,
            2 => 1.0,
            _ => {
                let n = n as f64;
                2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
            }
        }
    }

    fn score_rows(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let expected = Self::average_path_length(self.psi);
        x.axis_iter(Axis(0))
            .map(|row| {
                let total: f64 = self.trees.iter().map(|t| Self::path_length(t, row, 0)).sum();
                let avg = total / self.trees.len() as f64;
                if expected > 0.0 {
                    2.0f64.powf(-avg / expected)
                } else {
                    1.0
                }
            })
            .collect()
    }
}

impl BaseDetector for IForest {
    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<()> {
        check_array(x)?;
        if self.n_estimators == 0 {
            return Err(XgbodError::invalid_parameter("n_estimators", "must be at least 1"));
        }
        let n_samples = x.nrows();
        let psi = match self.max_samples {
            MaxSamples::Auto => n_samples.min(256),
            MaxSamples::Count(0) => {
                return Err(XgbodError::invalid_parameter("max_samples", "must be at least 1"))
            }
            MaxSamples::Count(c) => c.min(n_samples),
        };
        let height_limit = (psi.max(2) as f64).log2().ceil() as usize;

        let mut rng = match self.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        self.trees.clear();
        for _ in 0..self.n_estimators {
            let rows = index::sample(&mut rng, n_samples, psi).into_vec();
            let tree = Self::build_tree(x, rows, 0, height_limit, &mut rng);
            self.trees.push(tree);
        }
        self.psi = psi;
        self.n_features = x.ncols();
        self.decision_scores = Some(self.score_rows(x));
        Ok(())
    }

    fn decision_scores(&self) -> Option<&Array1<f64>> {
        self.decision_scores.as_ref()
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(XgbodError::NotFitted("IForest"));
        }
        check_n_features(self.n_features, x)?;
        Ok(self.score_rows(x))
    }

    fn name(&self) -> String {
        format!("IForest(n_estimators={})", self.n_estimators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn grid_with_outlier() -> Array2<f64> {
        let mut x = Array2::<f64>::zeros((50, 2));
        for i in 0..49 {
            x[[i, 0]] = (i % 7) as f64 * 0.1;
            x[[i, 1]] = (i / 7) as f64 * 0.1;
        }
        x[[49, 0]] = 20.0;
        x[[49, 1]] = -20.0;
        x
    }

    #[test]
    fn test_outlier_is_isolated_fast() {
        let mut forest = IForest::new(100).with_random_state(42);
        forest.fit(grid_with_outlier().view()).unwrap();
        let scores = forest.decision_scores().unwrap();
        assert!(scores.iter().take(49).all(|&s| s < scores[49]));
        assert!(scores.iter().all(|&s| s > 0.0 && s <= 1.0));
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let x = grid_with_outlier();
        let mut a = IForest::new(20).with_random_state(1);
        let mut b = IForest::new(20).with_random_state(1);
        a.fit(x.view()).unwrap();
        b.fit(x.view()).unwrap();
        assert_eq!(a.decision_scores(), b.decision_scores());
        assert_eq!(&a.decision_function(x.view()).unwrap(), a.decision_scores().unwrap());
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(IForest::average_path_length(1), 0.0);
        assert_eq!(IForest::average_path_length(2), 1.0);
        assert!(IForest::average_path_length(256) > IForest::average_path_length(16));
    }

    #[test]
    fn test_max_samples_count() {
        let x = grid_with_outlier();
        let mut forest = IForest::new(10)
            .with_max_samples(MaxSamples::Count(16))
            .with_random_state(5);
        forest.fit(x.view()).unwrap();
        assert_eq!(forest.psi, 16);

        // larger than the data is clipped to n_samples
        let mut forest = IForest::new(10)
            .with_max_samples(MaxSamples::Count(500))
            .with_random_state(5);
        forest.fit(x.view()).unwrap();
        assert_eq!(forest.psi, 50);
    }

    #[test]
    fn test_zero_max_samples_rejected() {
        let mut forest = IForest::new(10).with_max_samples(MaxSamples::Count(0));
        assert!(matches!(
            forest.fit(grid_with_outlier().view()),
            Err(XgbodError::InvalidParameter { ref name, .. }) if name == "max_samples"
        ));
        assert!(forest.decision_scores().is_none());
    }
}

