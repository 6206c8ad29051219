use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, XgbodError};
use crate::utils::validation::check_parameter;

/// Hyperparameter names that may not reappear in the passthrough map.
pub const NAMED_PARAMETERS: [&str; 21] = [
    "max_depth",
    "learning_rate",
    "n_estimators",
    "silent",
    "objective",
    "booster",
    "n_jobs",
    "nthread",
    "gamma",
    "min_child_weight",
    "max_delta_step",
    "subsample",
    "colsample_bytree",
    "colsample_bylevel",
    "reg_alpha",
    "reg_lambda",
    "scale_pos_weight",
    "base_score",
    "random_state",
    "missing",
    "importance_type",
];

/// A passthrough value forwarded to the classifier as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(v) => write!(f, "{v}"),
            OptionValue::Int(v) => write!(f, "{v}"),
            OptionValue::Float(v) => write!(f, "{v}"),
            OptionValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

/// How split statistics are aggregated into feature importances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportanceType {
    /// Number of splits using the feature
    Weight,
    /// Average loss reduction of those splits
    Gain,
    /// Average hessian mass routed through those splits
    Cover,
    TotalGain,
    TotalCover,
}

impl ImportanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportanceType::Weight => "weight",
            ImportanceType::Gain => "gain",
            ImportanceType::Cover => "cover",
            ImportanceType::TotalGain => "total_gain",
            ImportanceType::TotalCover => "total_cover",
        }
    }
}

impl FromStr for ImportanceType {
    type Err = XgbodError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "weight" => Ok(ImportanceType::Weight),
            "gain" => Ok(ImportanceType::Gain),
            "cover" => Ok(ImportanceType::Cover),
            "total_gain" => Ok(ImportanceType::TotalGain),
            "total_cover" => Ok(ImportanceType::TotalCover),
            other => Err(XgbodError::Unsupported {
                what: "importance_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Hyperparameters of the meta-classifier.
///
/// Deserializing a partial document fills every missing field with its
/// default, so `{"n_estimators": 50}` is a complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    pub max_depth: usize,
    pub learning_rate: f64,
    pub n_estimators: usize,
    /// Suppresses per-round progress logging
    pub silent: bool,
    pub objective: String,
    pub booster: String,
    /// Worker threads; zero or negative means every core
    pub n_jobs: i32,
    /// Deprecated alias of `n_jobs`, wins when set
    pub nthread: Option<i32>,
    /// Minimum loss reduction required to keep a split
    pub gamma: f64,
    pub min_child_weight: f64,
    /// Bound on each leaf weight, 0 disables it
    pub max_delta_step: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub colsample_bylevel: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub scale_pos_weight: f64,
    /// Initial positive-class probability of every row
    pub base_score: f64,
    pub random_state: u64,
    /// Value treated as missing in addition to NaN
    pub missing: Option<f64>,
    pub importance_type: String,
    /// Extra options handed to the classifier untouched
    pub options: BTreeMap<String, OptionValue>,
}

impl Default for BoosterParams {
    fn default() -> Self {
        BoosterParams {
            max_depth: 3,
            learning_rate: 0.1,
            n_estimators: 100,
            silent: true,
            objective: "binary:logistic".to_string(),
            booster: "gbtree".to_string(),
            n_jobs: 1,
            nthread: None,
            gamma: 0.0,
            min_child_weight: 1.0,
            max_delta_step: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            colsample_bylevel: 1.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            scale_pos_weight: 1.0,
            base_score: 0.5,
            random_state: 0,
            missing: None,
            importance_type: "gain".to_string(),
            options: BTreeMap::new(),
        }
    }
}

impl BoosterParams {
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Checks ranges, names and the passthrough map.
    pub fn validate(&self) -> Result<()> {
        if let Some(key) = self
            .options
            .keys()
            .find(|k| NAMED_PARAMETERS.contains(&k.as_str()))
        {
            return Err(XgbodError::DuplicateParameter(key.clone()));
        }
        if self.objective != "binary:logistic" {
            return Err(XgbodError::Unsupported {
                what: "objective",
                value: self.objective.clone(),
            });
        }
        if self.booster != "gbtree" {
            return Err(XgbodError::Unsupported {
                what: "booster",
                value: self.booster.clone(),
            });
        }
        self.importance()?;

        if self.max_depth == 0 {
            return Err(XgbodError::invalid_parameter("max_depth", "must be at least 1"));
        }
        if self.n_estimators == 0 {
            return Err(XgbodError::invalid_parameter("n_estimators", "must be at least 1"));
        }
        check_parameter(self.learning_rate, 0.0, 1.0, "learning_rate", false, true)?;
        check_parameter(self.gamma, 0.0, f64::INFINITY, "gamma", true, false)?;
        check_parameter(self.min_child_weight, 0.0, f64::INFINITY, "min_child_weight", true, false)?;
        check_parameter(self.max_delta_step, 0.0, f64::INFINITY, "max_delta_step", true, false)?;
        check_parameter(self.subsample, 0.0, 1.0, "subsample", false, true)?;
        check_parameter(self.colsample_bytree, 0.0, 1.0, "colsample_bytree", false, true)?;
        check_parameter(self.colsample_bylevel, 0.0, 1.0, "colsample_bylevel", false, true)?;
        check_parameter(self.reg_alpha, 0.0, f64::INFINITY, "reg_alpha", true, false)?;
        check_parameter(self.reg_lambda, 0.0, f64::INFINITY, "reg_lambda", true, false)?;
        check_parameter(self.scale_pos_weight, 0.0, f64::INFINITY, "scale_pos_weight", false, false)?;
        check_parameter(self.base_score, 0.0, 1.0, "base_score", false, false)?;
        Ok(())
    }

    pub fn importance(&self) -> Result<ImportanceType> {
        self.importance_type.parse()
    }

    /// Thread count after resolving `nthread` and non-positive values.
    pub fn effective_n_jobs(&self) -> usize {
        let requested = match self.nthread {
            Some(nthread) => {
                warn!(nthread, "`nthread` is deprecated, use `n_jobs` instead");
                nthread
            }
            None => self.n_jobs,
        };
        if requested <= 0 {
            num_cpus::get()
        } else {
            requested as usize
        }
    }

    /// Whether `value` counts as missing under these parameters.
    pub fn is_missing(&self, value: f64) -> bool {
        value.is_nan() || self.missing.map_or(false, |m| value == m)
    }
}
