pub mod booster;
pub mod ensemble;
pub mod error;
pub mod models;
pub mod utils;
pub mod xgbod;

#[cfg(feature = "python")]
mod python;

pub use booster::{BoosterParams, BoostingClassifier, ClassifierFactory, ImportanceType, OptionValue};
pub use ensemble::{init_detectors, DetectorDescriptor, Ensemble, FeatureAugmenter, Origin};
pub use error::{ErrorKind, Result, XgbodError};
pub use models::BaseDetector;
pub use utils::evaluation::Scoring;
pub use xgbod::{XgbodConfig, XGBOD};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// A Python module implemented in Rust.
#[cfg(feature = "python")]
#[pymodule]
fn xgbod_rust(_py: Python, m: &PyModule) -> PyResult<()> {
    // XGBOD:
    m.add_class::<python::PyXGBOD>()?;
    Ok(())
}
