mod common;

use common::{clustered_dataset, init_tracing, random_dataset};
use ndarray::Array2;
use xgbod_rust::models::{IForest, KnnMethod, HBOS, KNN, LOF, OCSVM};
use xgbod_rust::{BaseDetector, BoosterParams, ErrorKind, Origin, XgbodConfig, XgbodError, XGBOD};

fn fast_params() -> BoosterParams {
    BoosterParams {
        n_estimators: 30,
        ..Default::default()
    }
}

fn three_detectors() -> Vec<Box<dyn BaseDetector>> {
    vec![
        Box::new(KNN::new(5, KnnMethod::Mean)),
        Box::new(LOF::new(10)),
        Box::new(HBOS::new(10)),
    ]
}

#[cfg(feature = "booster")]
#[test]
fn default_ensemble_on_random_data() {
    init_tracing();
    let (x, y) = random_dataset(100, 5, 10, 42);
    let mut clf = XGBOD::default();
    clf.fit(x.view(), y.view()).unwrap();

    let ensemble = clf.estimators().unwrap();
    assert!(!ensemble.is_empty());
    assert_eq!(ensemble.origin(), Origin::Default);
    assert_eq!(clf.n_detector().unwrap(), ensemble.len());
    assert_eq!(clf.decision_scores().unwrap().len(), 100);
    assert!(clf
        .decision_scores()
        .unwrap()
        .iter()
        .all(|&s| (0.0..=1.0).contains(&s)));
    assert_eq!(clf.train_augmented().unwrap().ncols(), 5 + ensemble.len());
}

#[cfg(feature = "booster")]
#[test]
fn inference_matches_training_layout() {
    init_tracing();
    let (x, y) = clustered_dataset(60, 8, 3);
    let (x_test, _) = clustered_dataset(20, 5, 4);
    let mut clf = XGBOD::default().with_params(fast_params());
    clf.fit(x.view(), y.view()).unwrap();

    let n_detector = clf.n_detector().unwrap();
    let augmented = clf.augment(x_test.view()).unwrap();
    assert_eq!(augmented.dim(), (25, 3 + n_detector));
    assert_eq!(clf.train_augmented().unwrap().ncols(), augmented.ncols());

    let proba = clf.predict_proba(x_test.view()).unwrap();
    let scores = clf.decision_function(x_test.view()).unwrap();
    assert_eq!(proba, scores);

    let threshold = clf.threshold().unwrap();
    let labels = clf.predict(x_test.view()).unwrap();
    for (label, score) in labels.iter().zip(scores.iter()) {
        assert!(*label <= 1);
        assert_eq!(*label == 1, *score >= threshold);
    }
}

#[cfg(feature = "booster")]
#[test]
fn decision_function_reproduces_training_scores() {
    init_tracing();
    let (x, y) = clustered_dataset(50, 6, 9);
    let mut clf = XGBOD::default().with_params(fast_params());
    clf.fit(x.view(), y.view()).unwrap();
    assert_eq!(&clf.decision_function(x.view()).unwrap(), clf.decision_scores().unwrap());
    assert_eq!(&clf.predict(x.view()).unwrap(), clf.labels().unwrap());
}

#[cfg(feature = "booster")]
#[test]
fn supplied_ensemble_with_every_detector_family() {
    init_tracing();
    let (x, y) = clustered_dataset(40, 6, 21);
    let estimators: Vec<Box<dyn BaseDetector>> = vec![
        Box::new(KNN::new(3, KnnMethod::Median)),
        Box::new(LOF::new(5)),
        Box::new(HBOS::new(7)),
        Box::new(OCSVM::new(0.2).with_random_state(1)),
        Box::new(IForest::new(25).with_random_state(1)),
    ];
    let config = XgbodConfig {
        estimator_list: Some(estimators),
        standardization_flag_list: Some(vec![true, true, false, true, false]),
        booster: fast_params(),
    };
    let mut clf = XGBOD::new(config);
    let labels = clf.fit_predict(x.view(), y.view()).unwrap();
    assert_eq!(labels.len(), 46);
    assert_eq!(clf.n_detector().unwrap(), 5);
    assert_eq!(
        clf.estimators().unwrap().names(),
        vec![
            "KNN(n_neighbors=3, method=median)",
            "LOF(n_neighbors=5)",
            "HBOS(n_bins=7)",
            "OCSVM(nu=0.2)",
            "IForest(n_estimators=25)",
        ]
    );
    assert_eq!(&clf.decision_function(x.view()).unwrap(), clf.decision_scores().unwrap());
}

#[cfg(feature = "booster")]
#[test]
fn unknown_metric_fails_after_fit() {
    init_tracing();
    let (x, y) = clustered_dataset(40, 5, 5);
    let mut clf = XGBOD::default()
        .with_estimators(three_detectors(), None)
        .with_params(fast_params());
    let err = clf.fit_predict_score(x.view(), y.view(), "bad_name").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("bad_name"));
    assert!(clf.is_fitted());
    assert_eq!(clf.decision_scores().unwrap().len(), 45);
}

#[cfg(feature = "booster")]
#[test]
fn training_scores_separate_clusters() {
    init_tracing();
    let (x, y) = clustered_dataset(80, 10, 17);
    let mut clf = XGBOD::default().with_params(fast_params());
    let auc = clf.fit_predict_score(x.view(), y.view(), "roc_auc_score").unwrap();
    assert!(auc > 0.95, "roc auc {auc}");
}

#[test]
fn length_mismatch_names_both_lengths() {
    init_tracing();
    let (x, y) = random_dataset(30, 4, 3, 1);
    let mut clf = XGBOD::default().with_estimators(three_detectors(), Some(vec![true, false]));
    let err = clf.fit(x.view(), y.view()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let msg = err.to_string();
    assert!(msg.contains("(3)") && msg.contains("(2)"), "{msg}");
    assert!(!clf.is_fitted());
}

#[test]
fn predict_before_fit_is_not_fitted() {
    let clf = XGBOD::default();
    let x = Array2::<f64>::zeros((3, 2));
    let err = clf.predict(x.view()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFitted);
    assert!(matches!(clf.n_detector(), Err(XgbodError::NotFitted(_))));
}

#[test]
fn rejects_malformed_training_data() {
    let mut clf = XGBOD::default().with_params(fast_params());
    let (mut x, y) = random_dataset(20, 3, 2, 8);

    let short_y = y.slice(ndarray::s![..19]).to_owned();
    assert!(matches!(
        clf.fit(x.view(), short_y.view()).unwrap_err(),
        XgbodError::InconsistentSamples { x_rows: 20, y_len: 19 }
    ));

    x[[4, 1]] = f64::INFINITY;
    assert_eq!(clf.fit(x.view(), y.view()).unwrap_err().kind(), ErrorKind::Input);

    let empty = Array2::<f64>::zeros((0, 3));
    let no_labels = ndarray::Array1::<f64>::zeros(0);
    assert_eq!(clf.fit(empty.view(), no_labels.view()).unwrap_err().kind(), ErrorKind::Input);
}
