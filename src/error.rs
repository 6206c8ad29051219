/// Broad error categories, one per failure class the estimator can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Contract,
    Input,
    NotFitted,
    Dependency,
}

/// Errors raised by detectors, the boosting backend and the XGBOD estimator.
#[derive(Debug, thiserror::Error)]
pub enum XgbodError {
    #[error(
        "estimator_list length ({estimators}) is not equal to \
         standardization_flag_list length ({flags})"
    )]
    LengthMismatch { estimators: usize, flags: usize },

    #[error("ensemble has {actual} members but the augmenter was fit with {expected}")]
    EnsembleChanged { expected: usize, actual: usize },

    #[error("number of estimators must be at least 1, got 0")]
    EmptyEnsemble,

    #[error(
        "unsupported scoring metric '{0}': built-in scoring only supports \
         'roc_auc_score' and 'prc_n_score'"
    )]
    UnsupportedMetric(String),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("parameter `{0}` is set both as a named hyperparameter and as a passthrough option")]
    DuplicateParameter(String),

    #[error("unsupported {what} '{value}'")]
    Unsupported { what: &'static str, value: String },

    #[error("detector {index} ({name}) is missing required capabilities: {missing}")]
    MissingCapabilities {
        index: usize,
        name: String,
        missing: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("found input with inconsistent numbers of samples: X has {x_rows}, y has {y_len}")]
    InconsistentSamples { x_rows: usize, y_len: usize },

    #[error("labels must be binary (0 or 1), found {value}")]
    NonBinaryLabels { value: f64 },

    #[error("feature count mismatch: expected {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("this {0} instance is not fitted yet; call `fit` before using this method")]
    NotFitted(&'static str),

    #[error("optional dependency `{0}` is not available; rebuild with the `{0}` feature to fit")]
    MissingDependency(&'static str),

    #[error("metric is undefined: {0}")]
    UndefinedMetric(String),

    #[error("detector {index} ({name}) failed to fit: {source}")]
    DetectorFit {
        index: usize,
        name: String,
        #[source]
        source: Box<XgbodError>,
    },
}

impl XgbodError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XgbodError::LengthMismatch { .. }
            | XgbodError::EmptyEnsemble
            | XgbodError::UnsupportedMetric(_)
            | XgbodError::InvalidParameter { .. }
            | XgbodError::DuplicateParameter(_)
            | XgbodError::Unsupported { .. } => ErrorKind::Configuration,
            XgbodError::MissingCapabilities { .. } | XgbodError::EnsembleChanged { .. } => {
                ErrorKind::Contract
            }
            XgbodError::InvalidInput(_)
            | XgbodError::InconsistentSamples { .. }
            | XgbodError::NonBinaryLabels { .. }
            | XgbodError::FeatureMismatch { .. }
            | XgbodError::UndefinedMetric(_) => ErrorKind::Input,
            XgbodError::NotFitted(_) => ErrorKind::NotFitted,
            XgbodError::MissingDependency(_) => ErrorKind::Dependency,
            XgbodError::DetectorFit { source, .. } => source.kind(),
        }
    }

    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        XgbodError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, XgbodError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_message_names_both_lengths() {
        let err = XgbodError::LengthMismatch {
            estimators: 3,
            flags: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("(3)"), "{msg}");
        assert!(msg.contains("(2)"), "{msg}");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_detector_fit_inherits_source_kind() {
        let err = XgbodError::DetectorFit {
            index: 4,
            name: "KNN".into(),
            source: Box::new(XgbodError::InvalidInput("empty".into())),
        };
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(err.to_string().contains("detector 4 (KNN)"));
    }
}
