//! Turns ensemble scores into extra feature columns.
//!
//! The augmented matrix is `[X | s_0 | s_1 | ... | s_{m-1}]`: the raw,
//! unscaled features followed by one score column per ensemble member, in
//! ensemble order. Each member keeps its native score scale.

use std::time::Instant;

use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{Result, XgbodError};
use crate::utils::scaler::StandardScaler;
use crate::utils::validation::check_n_features;

use super::Ensemble;

/// Output of the fit path.
#[derive(Debug, Clone)]
pub struct AugmentedTraining {
    /// `[X | scores]`
    pub augmented: Array2<f64>,
    /// The score block alone (n_samples × n_detector)
    pub scores: Array2<f64>,
}

/// Standardization state plus the column layout fixed at fit time.
#[derive(Debug, Clone)]
pub struct FeatureAugmenter {
    scaler: StandardScaler,
    n_detector: usize,
}

fn check_column(index: usize, name: impl FnOnce() -> String, scores: &Array1<f64>, n_samples: usize) -> Result<()> {
    if scores.len() != n_samples {
        return Err(XgbodError::InvalidInput(format!(
            "detector {index} ({}) returned {} scores for {n_samples} samples",
            name(),
            scores.len()
        )));
    }
    Ok(())
}

fn concat_features(x: ArrayView2<'_, f64>, scores: &Array2<f64>) -> Result<Array2<f64>> {
    concatenate(Axis(1), &[x.reborrow(), scores.view()]).map_err(|e| XgbodError::InvalidInput(e.to_string()))
}

impl FeatureAugmenter {
    /// Fits the scaler and every ensemble member, in order, on `x`.
    ///
    /// A failing member aborts the whole fit.
    pub fn fit(ensemble: &mut Ensemble, x: ArrayView2<'_, f64>) -> Result<(Self, AugmentedTraining)> {
        let n_samples = x.nrows();
        let n_detector = ensemble.len();
        let scaler = StandardScaler::fit(x)?;
        let x_norm = scaler.transform(x)?;

        let mut scores = Array2::<f64>::zeros((n_samples, n_detector));
        for (index, member) in ensemble.members_mut().iter_mut().enumerate() {
            let standardize = member.standardize();
            let input = if standardize { x_norm.view() } else { x.reborrow() };
            let detector = member.detector_mut();
            let started = Instant::now();

            detector.fit(input).map_err(|source| XgbodError::DetectorFit {
                index,
                name: detector.name(),
                source: Box::new(source),
            })?;
            let column = detector
                .decision_scores()
                .ok_or_else(|| XgbodError::DetectorFit {
                    index,
                    name: detector.name(),
                    source: Box::new(XgbodError::NotFitted("detector")),
                })?;
            check_column(index, || detector.name(), column, n_samples)?;
            scores.column_mut(index).assign(column);

            debug!(
                index,
                detector = %detector.name(),
                standardize,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "fitted ensemble member"
            );
        }

        let augmented = concat_features(x, &scores)?;
        Ok((FeatureAugmenter { scaler, n_detector }, AugmentedTraining { augmented, scores }))
    }

    /// Score block for unseen data from the already-fitted members.
    pub fn generate_new_features(&self, ensemble: &Ensemble, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if ensemble.len() != self.n_detector {
            return Err(XgbodError::EnsembleChanged {
                expected: self.n_detector,
                actual: ensemble.len(),
            });
        }
        check_n_features(self.scaler.n_features(), x)?;
        let n_samples = x.nrows();
        let x_norm = self.scaler.transform(x)?;

        let columns: Vec<Array1<f64>> = ensemble
            .members()
            .par_iter()
            .map(|member| {
                let input = if member.standardize() { x_norm.view() } else { x.reborrow() };
                member.detector().decision_function(input)
            })
            .collect::<Result<_>>()?;

        let mut scores = Array2::<f64>::zeros((n_samples, self.n_detector));
        for (index, (column, member)) in columns.iter().zip(ensemble.iter()).enumerate() {
            check_column(index, || member.detector().name(), column, n_samples)?;
            scores.column_mut(index).assign(column);
        }
        Ok(scores)
    }

    /// `[X | scores]` for unseen data; nothing is refit.
    pub fn transform(&self, ensemble: &Ensemble, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let scores = self.generate_new_features(ensemble, x)?;
        concat_features(x, &scores)
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn n_detector(&self) -> usize {
        self.n_detector
    }

    /// Width of every augmented matrix this augmenter produces.
    pub fn n_augmented_features(&self) -> usize {
        self.scaler.n_features() + self.n_detector
    }
}
