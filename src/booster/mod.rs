//! The supervised meta-classifier trained on the augmented feature matrix.

#[cfg(feature = "booster")]
pub mod gbtree;
pub mod params;

use std::sync::Arc;

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::Result;

#[cfg(feature = "booster")]
pub use gbtree::GradientBoostedTrees;
pub use params::{BoosterParams, ImportanceType, OptionValue};

/// Probability at or above which a row is labeled an outlier.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// A binary probabilistic classifier.
pub trait BoostingClassifier: Send + Sync {
    /// Trains on `x` and labels `y` in {0.0, 1.0}.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()>;

    /// Positive-class probability per row.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<u8>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| u8::from(p >= DECISION_THRESHOLD)))
    }

    /// Per-feature importances, `None` when the model does not track them.
    fn feature_importances(&self, _kind: ImportanceType) -> Option<Array1<f64>> {
        None
    }

    fn name(&self) -> String;
}

/// Builds a fresh classifier from hyperparameters.
pub type ClassifierFactory =
    Arc<dyn Fn(&BoosterParams) -> Result<Box<dyn BoostingClassifier>> + Send + Sync>;

/// Whether the built-in booster was compiled in.
pub const fn backend_available() -> bool {
    cfg!(feature = "booster")
}

#[cfg(feature = "booster")]
fn build_default(params: &BoosterParams) -> Result<Box<dyn BoostingClassifier>> {
    Ok(Box::new(GradientBoostedTrees::new(params.clone())?))
}

#[cfg(not(feature = "booster"))]
fn build_default(params: &BoosterParams) -> Result<Box<dyn BoostingClassifier>> {
    params.validate()?;
    Err(crate::error::XgbodError::MissingDependency("booster"))
}

/// Factory for the built-in gradient-boosted trees.
pub fn default_factory() -> ClassifierFactory {
    Arc::new(build_default)
}
