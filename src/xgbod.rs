//! XGBOD: semi-supervised outlier detection by feature augmentation.
//!
//! A panel of unsupervised detectors is fit on the training data and each
//! detector's score becomes an extra feature. A gradient boosted classifier
//! is then trained on `[X | scores]` against the known labels.
//!
//! ```ignore
//! use xgbod_rust::XGBOD;
//!
//! let mut clf = XGBOD::default();
//! clf.fit(x_train.view(), y_train.view())?;
//! let proba = clf.decision_function(x_test.view())?;
//! ```

use std::fmt;
use std::time::Instant;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use tracing::{debug, info, warn};

use crate::booster::{
    backend_available, default_factory, BoosterParams, BoostingClassifier, ClassifierFactory,
    DECISION_THRESHOLD,
};
use crate::ensemble::{init_detectors, validate_estimators, Ensemble, FeatureAugmenter, Origin};
use crate::error::{Result, XgbodError};
use crate::models::BaseDetector;
use crate::utils::evaluation::Scoring;
use crate::utils::validation::{check_array, check_x_y};

/// Raw constructor parameters.
#[derive(Default)]
pub struct XgbodConfig {
    /// Detectors to use; `None` selects the default panel at fit time
    pub estimator_list: Option<Vec<Box<dyn BaseDetector>>>,
    /// Per-detector standardization; `None` standardizes every detector
    pub standardization_flag_list: Option<Vec<bool>>,
    pub booster: BoosterParams,
}


/// Everything produced by a successful fit.
struct FittedState {
    augmenter: FeatureAugmenter,
    classifier: Box<dyn BoostingClassifier>,
    decision_scores: Array1<f64>,
    labels: Array1<u8>,
    threshold: f64,
    train_augmented: Array2<f64>,
    train_scores: Array2<f64>,
}

/// The XGBOD estimator.
pub struct XGBOD {
    estimator_list: Option<Vec<Box<dyn BaseDetector>>>,
    standardization_flag_list: Option<Vec<bool>>,
    params: BoosterParams,
    factory: ClassifierFactory,
    ensemble: Option<Ensemble>,
    fitted: Option<FittedState>,
}

impl Default for XGBOD {
    fn default() -> Self {
        XGBOD::new(XgbodConfig::default())
    }
}

impl fmt::Debug for XGBOD {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XGBOD")
            .field("params", &self.params)
            .field("ensemble", &self.ensemble)
            .field("is_fitted", &self.is_fitted())
            .finish()
    }
}

impl XGBOD {
    pub fn new(config: XgbodConfig) -> Self {
        if !backend_available() {
            warn!("built without the `booster` feature; `fit` will fail until a classifier factory is supplied");
        }
        XGBOD {
            estimator_list: config.estimator_list,
            standardization_flag_list: config.standardization_flag_list,
            params: config.booster,
            factory: default_factory(),
            ensemble: None,
            fitted: None,
        }
    }

    /// Uses `estimators` (with optional flags) instead of the default panel.
    pub fn with_estimators(mut self, estimators: Vec<Box<dyn BaseDetector>>, flags: Option<Vec<bool>>) -> Self {
        self.estimator_list = Some(estimators);
        self.standardization_flag_list = flags;
        self.ensemble = None;
        self.fitted = None;
        self
    }

    pub fn with_params(mut self, params: BoosterParams) -> Self {
        self.params = params;
        self
    }

    /// Replaces the meta-classifier constructor.
    pub fn with_classifier_factory(mut self, factory: ClassifierFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Produces the ensemble for this fit.
    ///
    /// A supplied list is validated in place, so a rejected list is kept and
    /// reported again on the next call.
    fn materialize(&mut self, n_samples: usize) -> Result<Ensemble> {
        if let Some(ensemble) = self.ensemble.take() {
            if ensemble.origin() == Origin::Supplied {
                return Ok(ensemble);
            }
        }
        if let Some(list) = &self.estimator_list {
            validate_estimators(list, self.standardization_flag_list.as_deref())?;
        }
        match self.estimator_list.take() {
            Some(list) => Ensemble::new(list, self.standardization_flag_list.clone()),
            None => {
                if self.standardization_flag_list.is_some() {
                    warn!("standardization_flag_list is ignored when estimator_list is not set");
                }
                init_detectors(n_samples, self.params.random_state)
            }
        }
    }

    fn fit_with(
        ensemble: &mut Ensemble,
        mut classifier: Box<dyn BoostingClassifier>,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<FittedState> {
        let (augmenter, training) = FeatureAugmenter::fit(ensemble, x)?;
        debug!(
            n_augmented_features = augmenter.n_augmented_features(),
            "built augmented training matrix"
        );

        classifier.fit(training.augmented.view(), y)?;
        let decision_scores = classifier.predict_proba(training.augmented.view())?;
        let labels = classifier.predict(training.augmented.view())?;

        Ok(FittedState {
            augmenter,
            classifier,
            decision_scores,
            labels,
            threshold: DECISION_THRESHOLD,
            train_augmented: training.augmented,
            train_scores: training.scores,
        })
    }

    /// Fits the detector panel and the meta-classifier on labeled data.
    ///
    /// `y` holds 0.0 (inlier) or 1.0 (outlier) per row of `x`. On error the
    /// estimator is left unfitted.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<&mut Self> {
        let started = Instant::now();
        self.fitted = None;
        check_x_y(x, y)?;
        self.params.validate()?;

        let mut ensemble = self.materialize(x.nrows())?;
        let result = (self.factory)(&self.params)
            .and_then(|classifier| Self::fit_with(&mut ensemble, classifier, x, y));
        self.ensemble = Some(ensemble);
        let state = result?;

        info!(
            n_samples = x.nrows(),
            n_features = x.ncols(),
            n_detector = state.augmenter.n_detector(),
            classifier = %state.classifier.name(),
            n_outliers = state.labels.iter().filter(|&&l| l == 1).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fitted XGBOD"
        );
        self.fitted = Some(state);
        Ok(self)
    }

    fn fitted_parts(&self) -> Result<(&FittedState, &Ensemble)> {
        match (&self.fitted, &self.ensemble) {
            (Some(state), Some(ensemble)) => Ok((state, ensemble)),
            _ => Err(XgbodError::NotFitted("XGBOD")),
        }
    }

    fn state(&self) -> Result<&FittedState> {
        self.fitted.as_ref().ok_or(XgbodError::NotFitted("XGBOD"))
    }

    /// `[X | detector scores]` for unseen data.
    pub fn augment(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let (state, ensemble) = self.fitted_parts()?;
        check_array(x)?;
        state.augmenter.transform(ensemble, x)
    }

    /// Outlier probability per row of `x`.
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let augmented = self.augment(x)?;
        self.state()?.classifier.predict_proba(augmented.view())
    }

    /// Same values as [`XGBOD::decision_function`].
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.decision_function(x)
    }

    /// 1 for outliers, 0 for inliers.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<u8>> {
        let augmented = self.augment(x)?;
        self.state()?.classifier.predict(augmented.view())
    }

    /// Fits, then returns the training labels.
    pub fn fit_predict(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<Array1<u8>> {
        self.fit(x, y)?;
        Ok(self.state()?.labels.clone())
    }

    /// Fits, then scores the training decision scores against `y`.
    ///
    /// `scoring` is `"roc_auc_score"` or `"prc_n_score"`. The metric name is
    /// checked after fitting, so an unknown name still leaves the estimator
    /// fitted.
    pub fn fit_predict_score(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, scoring: &str) -> Result<f64> {
        self.fit(x, y)?;
        let metric: Scoring = scoring.parse()?;
        let score = metric.evaluate(y, self.state()?.decision_scores.view())?;
        info!(metric = %metric, score, "evaluated training decision scores");
        Ok(score)
    }

    pub fn n_detector(&self) -> Result<usize> {
        Ok(self.state()?.augmenter.n_detector())
    }

    /// Training outlier probabilities.
    pub fn decision_scores(&self) -> Result<&Array1<f64>> {
        Ok(&self.state()?.decision_scores)
    }

    /// Training labels.
    pub fn labels(&self) -> Result<&Array1<u8>> {
        Ok(&self.state()?.labels)
    }

    pub fn threshold(&self) -> Result<f64> {
        Ok(self.state()?.threshold)
    }

    pub fn train_augmented(&self) -> Result<&Array2<f64>> {
        Ok(&self.state()?.train_augmented)
    }

    /// Training score block, one column per detector.
    pub fn train_scores(&self) -> Result<&Array2<f64>> {
        Ok(&self.state()?.train_scores)
    }

    /// Importances over the augmented features, of the configured type.
    pub fn feature_importances(&self) -> Result<Option<Array1<f64>>> {
        let kind = self.params.importance()?;
        Ok(self.state()?.classifier.feature_importances(kind))
    }

    /// The ensemble used by the last fit attempt.
    pub fn estimators(&self) -> Option<&Ensemble> {
        self.ensemble.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::tests::FitOnly;
    use crate::models::{KnnMethod, HBOS, KNN, LOF};
    use ndarray::Array2;
    use rand::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// HBOS that records how many times it was fit.
    struct CountingDetector {
        inner: HBOS,
        fits: Arc<AtomicUsize>,
    }

    impl BaseDetector for CountingDetector {
        fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<()> {
            self.fits.fetch_add(1, Ordering::SeqCst);
            self.inner.fit(x)
        }

        fn decision_scores(&self) -> Option<&Array1<f64>> {
            self.inner.decision_scores()
        }

        fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
            self.inner.decision_function(x)
        }

        fn name(&self) -> String {
            "CountingDetector".into()
        }
    }

    fn toy() -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut x = Array2::<f64>::zeros((30, 2));
        let mut y = Array1::<f64>::zeros(30);
        for i in 0..30 {
            let (cx, scale) = if i >= 26 { (6.0, 1.0) } else { (0.0, 0.5) };
            x[[i, 0]] = cx + rng.gen_range(-scale..scale);
            x[[i, 1]] = cx + rng.gen_range(-scale..scale);
            if i >= 26 {
                y[i] = 1.0;
            }
        }
        (x, y)
    }

    fn small_panel() -> Vec<Box<dyn BaseDetector>> {
        vec![
            Box::new(KNN::new(3, KnnMethod::Largest)),
            Box::new(LOF::new(5)),
            Box::new(HBOS::new(5)),
        ]
    }

    fn small_params() -> BoosterParams {
        BoosterParams {
            n_estimators: 20,
            ..Default::default()
        }
    }

    fn small_model() -> XGBOD {
        XGBOD::default()
            .with_estimators(small_panel(), Some(vec![true, true, false]))
            .with_params(small_params())
    }

    #[cfg(feature = "booster")]
    #[test]
    fn test_fit_populates_state() {
        let (x, y) = toy();
        let mut clf = small_model();
        clf.fit(x.view(), y.view()).unwrap();
        assert!(clf.is_fitted());
        assert_eq!(clf.n_detector().unwrap(), 3);
        assert_eq!(clf.train_augmented().unwrap().dim(), (30, 5));
        assert_eq!(clf.train_scores().unwrap().dim(), (30, 3));
        assert_eq!(clf.threshold().unwrap(), 0.5);
        let scores = clf.decision_scores().unwrap();
        assert!(scores.iter().all(|&s| (0.0..=1.0).contains(&s)));
        let labels = clf.labels().unwrap();
        assert_eq!(labels, &scores.mapv(|s| u8::from(s >= 0.5)));
    }

    #[cfg(feature = "booster")]
    #[test]
    fn test_inference_on_training_data_is_idempotent() {
        let (x, y) = toy();
        let mut clf = small_model();
        clf.fit(x.view(), y.view()).unwrap();
        assert_eq!(&clf.decision_function(x.view()).unwrap(), clf.decision_scores().unwrap());
        assert_eq!(&clf.augment(x.view()).unwrap(), clf.train_augmented().unwrap());
        assert_eq!(
            clf.predict_proba(x.view()).unwrap(),
            clf.decision_function(x.view()).unwrap()
        );
    }

    #[cfg(feature = "booster")]
    #[test]
    fn test_supplied_ensemble_is_reused_on_refit() {
        let (x, y) = toy();
        let mut clf = small_model();
        clf.fit(x.view(), y.view()).unwrap();
        let first = clf.decision_scores().unwrap().clone();
        clf.fit(x.view(), y.view()).unwrap();
        assert_eq!(clf.estimators().unwrap().origin(), Origin::Supplied);
        assert_eq!(clf.estimators().unwrap().len(), 3);
        assert_eq!(clf.decision_scores().unwrap(), &first);
    }

    #[cfg(feature = "booster")]
    #[test]
    fn test_bad_metric_fails_after_fit() {
        let (x, y) = toy();
        let mut clf = small_model();
        let err = clf.fit_predict_score(x.view(), y.view(), "accuracy").unwrap_err();
        assert!(matches!(err, XgbodError::UnsupportedMetric(ref m) if m == "accuracy"));
        assert!(clf.is_fitted());

        let auc = clf.fit_predict_score(x.view(), y.view(), "roc_auc_score").unwrap();
        assert!(auc > 0.9);
        let prn = clf.fit_predict_score(x.view(), y.view(), "prc_n_score").unwrap();
        assert!((0.0..=1.0).contains(&prn));
    }

    #[cfg(feature = "booster")]
    #[test]
    fn test_feature_importances_cover_augmented_width() {
        let (x, y) = toy();
        let mut clf = small_model();
        clf.fit(x.view(), y.view()).unwrap();
        let imp = clf.feature_importances().unwrap().unwrap();
        assert_eq!(imp.len(), 5);
    }

    #[test]
    fn test_length_mismatch_before_any_member_fit() {
        let (x, y) = toy();
        let fits = Arc::new(AtomicUsize::new(0));
        let mut panel = small_panel();
        panel.push(Box::new(CountingDetector {
            inner: HBOS::new(4),
            fits: Arc::clone(&fits),
        }));
        let mut clf = XGBOD::default()
            .with_estimators(panel, Some(vec![true, false]))
            .with_params(small_params());
        let err = clf.fit(x.view(), y.view()).err().unwrap();
        assert!(matches!(err, XgbodError::LengthMismatch { estimators: 4, flags: 2 }));
        assert!(!clf.is_fitted());
        assert_eq!(fits.load(Ordering::SeqCst), 0);
        // the rejected list is kept and reported again
        let err = clf.fit(x.view(), y.view()).err().unwrap();
        assert!(matches!(err, XgbodError::LengthMismatch { .. }));
        assert_eq!(fits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_factory_failure_precedes_member_fit() {
        let (x, y) = toy();
        let fits = Arc::new(AtomicUsize::new(0));
        let panel: Vec<Box<dyn BaseDetector>> = vec![Box::new(CountingDetector {
            inner: HBOS::new(4),
            fits: Arc::clone(&fits),
        })];
        let factory: ClassifierFactory = Arc::new(|_: &BoosterParams| -> Result<Box<dyn BoostingClassifier>> {
            Err(XgbodError::MissingDependency("xgboost"))
        });
        let mut clf = XGBOD::default()
            .with_estimators(panel, None)
            .with_classifier_factory(factory);
        assert!(clf.fit(x.view(), y.view()).is_err());
        assert_eq!(fits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_capability_violation_is_reported() {
        let (x, y) = toy();
        let mut panel = small_panel();
        panel.push(Box::new(FitOnly));
        let mut clf = XGBOD::default().with_estimators(panel, None).with_params(small_params());
        let err = clf.fit(x.view(), y.view()).err().unwrap();
        assert!(matches!(err, XgbodError::MissingCapabilities { index: 3, .. }));
    }

    #[test]
    fn test_not_fitted_errors() {
        let clf = small_model();
        let x = Array2::<f64>::zeros((2, 2));
        assert!(matches!(clf.predict(x.view()), Err(XgbodError::NotFitted(_))));
        assert!(matches!(clf.decision_function(x.view()), Err(XgbodError::NotFitted(_))));
        assert!(matches!(clf.decision_scores(), Err(XgbodError::NotFitted(_))));
        assert!(clf.estimators().is_none());
    }

    #[test]
    fn test_invalid_labels_rejected() {
        let (x, mut y) = toy();
        y[0] = 0.5;
        let mut clf = small_model();
        assert!(matches!(
            clf.fit(x.view(), y.view()).err().unwrap(),
            XgbodError::NonBinaryLabels { .. }
        ));
    }

    #[test]
    fn test_custom_factory_errors_propagate() {
        let (x, y) = toy();
        let factory: ClassifierFactory = Arc::new(|_: &BoosterParams| -> Result<Box<dyn BoostingClassifier>> {
            Err(XgbodError::MissingDependency("xgboost"))
        });
        let mut clf = small_model().with_classifier_factory(factory);
        let err = clf.fit(x.view(), y.view()).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Dependency);
        assert!(!clf.is_fitted());
    }

    #[test]
    fn test_duplicate_passthrough_rejected() {
        let (x, y) = toy();
        let params = small_params().with_option("n_estimators", 5i64);
        let mut clf = small_model().with_params(params);
        assert!(matches!(
            clf.fit(x.view(), y.view()).err().unwrap(),
            XgbodError::DuplicateParameter(_)
        ));
    }
}
