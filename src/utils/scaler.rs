use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{Result, XgbodError};
use crate::utils::validation::check_n_features;

/// Standard scaler with statistics frozen at fit time.
///
/// Uses the population standard deviation; constant features are scaled by 1.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: ArrayView2<'_, f64>) -> Result<Self> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(XgbodError::InvalidInput(
                "cannot fit a scaler on 0 samples".into(),
            ));
        }
        let n_features = x.ncols();
        let mut mean = Array1::<f64>::zeros(n_features);
        let mut sum_squares = Array1::<f64>::zeros(n_features);

        // Welford update per column, same recurrence as the running stream statistics
        for (count, row) in x.axis_iter(Axis(0)).enumerate() {
            let count = (count + 1) as f64;
            for (j, &item) in row.iter().enumerate() {
                let old_mean = mean[j];
                mean[j] += (item - old_mean) / count;
                sum_squares[j] += (item - old_mean) * (item - mean[j]);
            }
        }

        let scale = sum_squares.mapv(|ss| {
            let std = (ss / n_samples as f64).sqrt();
            if std == 0.0 || !std.is_finite() {
                1.0
            } else {
                std
            }
        });

        Ok(StandardScaler { mean, scale })
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        check_n_features(self.mean.len(), x)?;
        let mut out = x.to_owned();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for ((v, m), s) in row.iter_mut().zip(self.mean.iter()).zip(self.scale.iter()) {
                *v = (*v - m) / s;
            }
        }
        Ok(out)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}
