use std::collections::BTreeMap;

use numpy::{IntoPyArray, PyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyImportError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyDict};

use crate::booster::{BoosterParams, OptionValue};
use crate::error::{ErrorKind, XgbodError};
use crate::xgbod::{XgbodConfig, XGBOD};

fn to_py_err(err: XgbodError) -> PyErr {
    match err.kind() {
        ErrorKind::NotFitted => PyRuntimeError::new_err(err.to_string()),
        ErrorKind::Dependency => PyImportError::new_err(err.to_string()),
        ErrorKind::Configuration | ErrorKind::Contract | ErrorKind::Input => {
            PyValueError::new_err(err.to_string())
        }
    }
}

// Labels often arrive as integer or boolean arrays
fn labels_f64(y: &PyAny) -> PyResult<&PyArray1<f64>> {
    if let Ok(arr) = y.extract::<&PyArray1<f64>>() {
        Ok(arr)
    } else if let Ok(arr) = y.extract::<&PyArray1<i64>>() {
        arr.cast::<f64>(false)
    } else if let Ok(arr) = y.extract::<&PyArray1<i32>>() {
        arr.cast::<f64>(false)
    } else if let Ok(arr) = y.extract::<&PyArray1<bool>>() {
        arr.cast::<f64>(false)
    } else {
        Err(PyTypeError::new_err(
            "Unsupported array dtype for input 'y': expected a 1-d array of f64, i64, i32 or bool",
        ))
    }
}

fn option_value(key: &str, value: &PyAny) -> PyResult<OptionValue> {
    if let Ok(v) = value.extract::<bool>() {
        Ok(OptionValue::Bool(v))
    } else if let Ok(v) = value.extract::<i64>() {
        Ok(OptionValue::Int(v))
    } else if let Ok(v) = value.extract::<f64>() {
        Ok(OptionValue::Float(v))
    } else if let Ok(v) = value.extract::<String>() {
        Ok(OptionValue::Str(v))
    } else {
        Err(PyTypeError::new_err(format!(
            "Unsupported value for option '{key}': expected bool, int, float or str"
        )))
    }
}

/// Python-exposed wrapper around the XGBOD estimator, using the default
/// detector panel.
#[pyclass(name = "XGBOD")]
pub struct PyXGBOD {
    inner: XGBOD,
}

#[pymethods]
impl PyXGBOD {
    #[new]
    #[pyo3(signature = (
        max_depth=3,
        learning_rate=0.1,
        n_estimators=100,
        silent=true,
        objective="binary:logistic",
        booster="gbtree",
        n_jobs=1,
        nthread=None,
        gamma=0.0,
        min_child_weight=1.0,
        max_delta_step=0.0,
        subsample=1.0,
        colsample_bytree=1.0,
        colsample_bylevel=1.0,
        reg_alpha=0.0,
        reg_lambda=1.0,
        scale_pos_weight=1.0,
        base_score=0.5,
        random_state=0,
        missing=None,
        importance_type="gain",
        **kwargs
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        max_depth: usize,
        learning_rate: f64,
        n_estimators: usize,
        silent: bool,
        objective: &str,
        booster: &str,
        n_jobs: i32,
        nthread: Option<i32>,
        gamma: f64,
        min_child_weight: f64,
        max_delta_step: f64,
        subsample: f64,
        colsample_bytree: f64,
        colsample_bylevel: f64,
        reg_alpha: f64,
        reg_lambda: f64,
        scale_pos_weight: f64,
        base_score: f64,
        random_state: u64,
        missing: Option<f64>,
        importance_type: &str,
        kwargs: Option<&PyDict>,
    ) -> PyResult<Self> {
        let mut options = BTreeMap::new();
        if let Some(kwargs) = kwargs {
            for (key, value) in kwargs.iter() {
                let key: String = key.extract()?;
                let value = option_value(&key, value)?;
                options.insert(key, value);
            }
        }
        let params = BoosterParams {
            max_depth,
            learning_rate,
            n_estimators,
            silent,
            objective: objective.to_string(),
            booster: booster.to_string(),
            n_jobs,
            nthread,
            gamma,
            min_child_weight,
            max_delta_step,
            subsample,
            colsample_bytree,
            colsample_bylevel,
            reg_alpha,
            reg_lambda,
            scale_pos_weight,
            base_score,
            random_state,
            missing,
            importance_type: importance_type.to_string(),
            options,
        };
        params.validate().map_err(to_py_err)?;
        Ok(PyXGBOD {
            inner: XGBOD::new(XgbodConfig {
                booster: params,
                ..Default::default()
            }),
        })
    }

    fn fit<'py>(mut slf: PyRefMut<'py, Self>, x: PyReadonlyArray2<f64>, y: &PyAny) -> PyResult<PyRefMut<'py, Self>> {
        let y = labels_f64(y)?.readonly();
        slf.inner.fit(x.as_array(), y.as_array()).map_err(to_py_err)?;
        Ok(slf)
    }

    fn decision_function<'py>(&self, py: Python<'py>, x: PyReadonlyArray2<f64>) -> PyResult<&'py PyArray1<f64>> {
        let scores = self.inner.decision_function(x.as_array()).map_err(to_py_err)?;
        Ok(scores.into_pyarray(py))
    }

    fn predict_proba<'py>(&self, py: Python<'py>, x: PyReadonlyArray2<f64>) -> PyResult<&'py PyArray1<f64>> {
        let proba = self.inner.predict_proba(x.as_array()).map_err(to_py_err)?;
        Ok(proba.into_pyarray(py))
    }

    fn predict<'py>(&self, py: Python<'py>, x: PyReadonlyArray2<f64>) -> PyResult<&'py PyArray1<u8>> {
        let labels = self.inner.predict(x.as_array()).map_err(to_py_err)?;
        Ok(labels.into_pyarray(py))
    }

    fn fit_predict<'py>(&mut self, py: Python<'py>, x: PyReadonlyArray2<f64>, y: &PyAny) -> PyResult<&'py PyArray1<u8>> {
        let y = labels_f64(y)?.readonly();
        let labels = self.inner.fit_predict(x.as_array(), y.as_array()).map_err(to_py_err)?;
        Ok(labels.into_pyarray(py))
    }

    #[pyo3(signature = (x, y, scoring="roc_auc_score"))]
    fn fit_predict_score(&mut self, x: PyReadonlyArray2<f64>, y: &PyAny, scoring: &str) -> PyResult<f64> {
        let y = labels_f64(y)?.readonly();
        self.inner
            .fit_predict_score(x.as_array(), y.as_array(), scoring)
            .map_err(to_py_err)
    }

    #[getter(decision_scores_)]
    fn decision_scores<'py>(&self, py: Python<'py>) -> PyResult<&'py PyArray1<f64>> {
        let scores = self.inner.decision_scores().map_err(to_py_err)?;
        Ok(scores.clone().into_pyarray(py))
    }

    #[getter(labels_)]
    fn labels<'py>(&self, py: Python<'py>) -> PyResult<&'py PyArray1<u8>> {
        let labels = self.inner.labels().map_err(to_py_err)?;
        Ok(labels.clone().into_pyarray(py))
    }

    #[getter(threshold_)]
    fn threshold(&self) -> PyResult<f64> {
        self.inner.threshold().map_err(to_py_err)
    }

    #[getter(n_detector_)]
    fn n_detector(&self) -> PyResult<usize> {
        self.inner.n_detector().map_err(to_py_err)
    }

    #[getter(feature_importances_)]
    fn feature_importances<'py>(&self, py: Python<'py>) -> PyResult<Option<&'py PyArray1<f64>>> {
        let importances = self.inner.feature_importances().map_err(to_py_err)?;
        Ok(importances.map(|imp| imp.into_pyarray(py)))
    }

    fn estimator_names(&self) -> Vec<String> {
        self.inner.estimators().map(|e| e.names()).unwrap_or_default()
    }

    fn __repr__(&self) -> String {
        let params = self.inner.params();
        format!(
            "XGBOD(max_depth={}, learning_rate={}, n_estimators={}, random_state={})",
            params.max_depth, params.learning_rate, params.n_estimators, params.random_state
        )
    }
}
