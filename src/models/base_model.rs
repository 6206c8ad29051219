use std::fmt;

use ndarray::{Array1, ArrayView2};

use crate::error::Result;

/// One capability an ensemble member can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Fit,
    DecisionScores,
    DecisionFunction,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Fit => "fit",
            Capability::DecisionScores => "decision_scores_",
            Capability::DecisionFunction => "decision_function",
        };
        f.write_str(name)
    }
}

/// The set of capabilities a detector declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub fit: bool,
    pub decision_scores: bool,
    pub decision_function: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        fit: true,
        decision_scores: true,
        decision_function: true,
    };

    /// Capabilities absent from this set, in contract order.
    pub fn missing(&self) -> Vec<Capability> {
        let mut missing = Vec::new();
        if !self.fit {
            missing.push(Capability::Fit);
        }
        if !self.decision_scores {
            missing.push(Capability::DecisionScores);
        }
        if !self.decision_function {
            missing.push(Capability::DecisionFunction);
        }
        missing
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::ALL
    }
}

/// A common Rust trait for batch unsupervised outlier detectors.
///
/// Scores follow the "higher is more abnormal" convention.
pub trait BaseDetector: Send + Sync {
    /// Fit the detector on `x`; training scores become available afterwards.
    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<()>;

    /// Outlier scores of the training data, `None` before `fit`.
    fn decision_scores(&self) -> Option<&Array1<f64>>;

    /// Score unseen samples with the fitted model.
    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    /// Short name with the key hyperparameters, used in logs and errors.
    fn name(&self) -> String;

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }
}

impl fmt::Debug for dyn BaseDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
