//! The ordered panel of unsupervised detectors used as feature extractors.

pub mod augment;
pub mod defaults;

use std::fmt;

use tracing::debug;

use crate::error::{Result, XgbodError};
use crate::models::base_model::BaseDetector;

pub use augment::FeatureAugmenter;
pub use defaults::init_detectors;

/// One ensemble member and whether it sees standardized input.
pub struct DetectorDescriptor {
    detector: Box<dyn BaseDetector>,
    standardize: bool,
}

impl DetectorDescriptor {
    pub fn new(detector: Box<dyn BaseDetector>, standardize: bool) -> Self {
        DetectorDescriptor {
            detector,
            standardize,
        }
    }

    pub fn detector(&self) -> &dyn BaseDetector {
        self.detector.as_ref()
    }

    pub(crate) fn detector_mut(&mut self) -> &mut dyn BaseDetector {
        self.detector.as_mut()
    }

    pub fn standardize(&self) -> bool {
        self.standardize
    }
}

impl fmt::Debug for DetectorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorDescriptor")
            .field("detector", &self.detector.name())
            .field("standardize", &self.standardize)
            .finish()
    }
}

/// Where the ensemble members came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Passed in by the caller; reused across fits
    Supplied,
    /// Built by [`init_detectors`] for the training set at hand
    Default,
}

/// Validated, non-empty, ordered list of detector descriptors.
#[derive(Debug)]
pub struct Ensemble {
    members: Vec<DetectorDescriptor>,
    origin: Origin,
}

/// Rejects a detector that does not declare the full capability set.
pub fn check_detector(index: usize, detector: &dyn BaseDetector) -> Result<()> {
    let missing = detector.capabilities().missing();
    if missing.is_empty() {
        return Ok(());
    }
    let missing = missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(XgbodError::MissingCapabilities {
        index,
        name: detector.name(),
        missing,
    })
}

/// Checks a raw estimator list and its flags without taking ownership.
pub fn validate_estimators(
    estimators: &[Box<dyn BaseDetector>],
    standardization_flags: Option<&[bool]>,
) -> Result<()> {
    if let Some(flags) = standardization_flags {
        if estimators.len() != flags.len() {
            return Err(XgbodError::LengthMismatch {
                estimators: estimators.len(),
                flags: flags.len(),
            });
        }
    }
    if estimators.is_empty() {
        return Err(XgbodError::EmptyEnsemble);
    }
    for (index, estimator) in estimators.iter().enumerate() {
        check_detector(index, estimator.as_ref())?;
    }
    Ok(())
}

impl Ensemble {
    /// Builds an ensemble from a caller-supplied list.
    ///
    /// Without flags every member is standardized.
    pub fn new(
        estimators: Vec<Box<dyn BaseDetector>>,
        standardization_flags: Option<Vec<bool>>,
    ) -> Result<Self> {
        Self::with_origin(estimators, standardization_flags, Origin::Supplied)
    }

    pub(crate) fn with_origin(
        estimators: Vec<Box<dyn BaseDetector>>,
        standardization_flags: Option<Vec<bool>>,
        origin: Origin,
    ) -> Result<Self> {
        validate_estimators(&estimators, standardization_flags.as_deref())?;
        let flags = standardization_flags.unwrap_or_else(|| vec![true; estimators.len()]);
        let members: Vec<DetectorDescriptor> = estimators
            .into_iter()
            .zip(flags)
            .map(|(detector, standardize)| DetectorDescriptor::new(detector, standardize))
            .collect();
        debug!(n_detector = members.len(), ?origin, "validated ensemble");
        Ok(Ensemble { members, origin })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn members(&self) -> &[DetectorDescriptor] {
        &self.members
    }

    pub(crate) fn members_mut(&mut self) -> &mut [DetectorDescriptor] {
        &mut self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectorDescriptor> {
        self.members.iter()
    }

    pub fn standardization_flags(&self) -> Vec<bool> {
        self.members.iter().map(|m| m.standardize).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.detector.name()).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::base_model::Capabilities;
    use crate::models::{KnnMethod, HBOS, KNN};
    use ndarray::{Array1, ArrayView2};

    /// Detector that only declares `fit`.
    pub(crate) struct FitOnly;

    impl BaseDetector for FitOnly {
        fn fit(&mut self, _x: ArrayView2<'_, f64>) -> Result<()> {
            Ok(())
        }

        fn decision_scores(&self) -> Option<&Array1<f64>> {
            None
        }

        fn decision_function(&self, _x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
            Err(XgbodError::NotFitted("FitOnly"))
        }

        fn name(&self) -> String {
            "FitOnly".into()
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                fit: true,
                decision_scores: false,
                decision_function: false,
            }
        }
    }

    fn three() -> Vec<Box<dyn BaseDetector>> {
        vec![
            Box::new(KNN::new(1, KnnMethod::Largest)),
            Box::new(HBOS::new(5)),
            Box::new(HBOS::new(7)),
        ]
    }

    #[test]
    fn test_flag_length_mismatch() {
        let err = Ensemble::new(three(), Some(vec![true, false])).unwrap_err();
        assert!(matches!(
            err,
            XgbodError::LengthMismatch {
                estimators: 3,
                flags: 2
            }
        ));
    }

    #[test]
    fn test_missing_flags_default_to_standardize() {
        let ensemble = Ensemble::new(three(), None).unwrap();
        assert_eq!(ensemble.standardization_flags(), vec![true, true, true]);
        assert_eq!(ensemble.origin(), Origin::Supplied);
    }

    #[test]
    fn test_empty_ensemble() {
        assert!(matches!(
            Ensemble::new(Vec::new(), None),
            Err(XgbodError::EmptyEnsemble)
        ));
    }

    #[test]
    fn test_capability_check_names_missing() {
        let mut list = three();
        list.push(Box::new(FitOnly));
        let err = Ensemble::new(list, None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("detector 3 (FitOnly)"), "{msg}");
        assert!(msg.contains("decision_scores_, decision_function"), "{msg}");
    }
}
