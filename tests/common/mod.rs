use ndarray::{Array1, Array2};
use rand::prelude::*;
use tracing_subscriber::EnvFilter;

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
/// Uniform features in [0, 1) with the last `n_outliers` rows labeled 1.
pub fn random_dataset(n_samples: usize, n_features: usize, n_outliers: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n_samples, n_features), |_| rng.gen::<f64>());
    let y = Array1::from_shape_fn(n_samples, |i| if i >= n_samples - n_outliers { 1.0 } else { 0.0 });
    (x, y)
}

/// Gaussian-ish inlier blob around the origin plus a shifted outlier cluster.
#[allow(dead_code)]
pub fn clustered_dataset(n_inliers: usize, n_outliers: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = n_inliers + n_outliers;
    let mut x = Array2::<f64>::zeros((n, 3));
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let outlier = i >= n_inliers;
        let (center, spread) = if outlier { (4.0, 1.5) } else { (0.0, 1.0) };
        for j in 0..3 {
            x[[i, j]] = center + rng.gen_range(-spread..spread);
        }
        if outlier {
            y[i] = 1.0;
        }
    }
    (x, y)
}
