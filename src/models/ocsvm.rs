//! One-class SVM with an RBF kernel, solved with SMO on the ν-formulation:
//!
//! min ½ αᵀKα  s.t.  0 ≤ αᵢ ≤ 1,  Σαᵢ = ν·n
//!
//! The kernel matrix is materialized in full, so memory grows with n².

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::warn;

use crate::error::{Result, XgbodError};
use crate::models::base_model::BaseDetector;
use crate::utils::validation::{check_array, check_n_features, check_parameter};

const TAU: f64 = 1e-12;

/// RBF kernel coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gamma {
    /// 1 / n_features
    Auto,
    /// 1 / (n_features * X.var())
    Scale,
    Value(f64),
}

#[derive(Debug, Clone)]
struct SupportVectors {
    vectors: Array2<f64>,
    alphas: Vec<f64>,
    gamma: f64,
    rho: f64,
}

impl SupportVectors {
    fn decision(&self, x: ArrayView1<'_, f64>) -> f64 {
        let s: f64 = self
            .vectors
            .rows()
            .into_iter()
            .zip(self.alphas.iter())
            .map(|(sv, &a)| a * rbf(sv, x, self.gamma))
            .sum();
        s - self.rho
    }

    fn score_rows(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let scores: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| -self.decision(x.row(i)))
            .collect();
        Array1::from_vec(scores)
    }
}

fn rbf(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>, gamma: f64) -> f64 {
    let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * sq).exp()
}

/// One-class SVM outlier detector.
///
/// `fit` builds the dense n×n RBF kernel before solving, so training time
/// and memory grow quadratically with the number of samples. The default
/// panel holds eleven of these, which dominates fit time past a few
/// thousand rows.
#[derive(Debug, Clone)]
pub struct OCSVM {
    nu: f64,
    gamma: Gamma,
    tol: f64,
    max_iter: usize,
    random_state: Option<u64>,
    model: Option<SupportVectors>,
    decision_scores: Option<Array1<f64>>,
}

impl OCSVM {
    pub fn new(nu: f64) -> Self {
        OCSVM {
            nu,
            gamma: Gamma::Auto,
            tol: 1e-3,
            max_iter: 1_000_000,
            random_state: None,
            model: None,
            decision_scores: None,
        }
    }

    pub fn with_gamma(mut self, gamma: Gamma) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Seeds the order in which the initial dual mass is spread over samples.
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// Number of support vectors after `fit`.
    pub fn n_support(&self) -> Option<usize> {
        self.model.as_ref().map(|m| m.alphas.len())
    }

    fn resolve_gamma(&self, x: ArrayView2<'_, f64>) -> Result<f64> {
        let n_features = x.ncols() as f64;
        match self.gamma {
            Gamma::Auto => Ok(1.0 / n_features),
            Gamma::Scale => {
                let n = x.len() as f64;
                let mean = x.sum() / n;
                let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                Ok(if var > 0.0 { 1.0 / (n_features * var) } else { 1.0 })
            }
            Gamma::Value(g) if g > 0.0 => Ok(g),
            Gamma::Value(g) => Err(XgbodError::invalid_parameter(
                "gamma",
                format!("must be positive, got {g}"),
            )),
        }
    }

    fn solve(&self, x: ArrayView2<'_, f64>, gamma: f64) -> Result<SupportVectors> {
        let n = x.nrows();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| rbf(x.row(i), x.row(j), gamma)).collect())
            .collect();
        let q = Array2::from_shape_vec((n, n), rows.into_iter().flatten().collect())
            .map_err(|e| XgbodError::InvalidInput(e.to_string()))?;

        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = match self.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        order.shuffle(&mut rng);

        let total = self.nu * n as f64;
        let n_full = (total.floor() as usize).min(n);
        let mut alpha = vec![0.0; n];
        for &i in order.iter().take(n_full) {
            alpha[i] = 1.0;
        }
        if n_full < n {
            alpha[order[n_full]] = total - n_full as f64;
        }

        let mut grad: Vec<f64> = (0..n)
            .map(|i| (0..n).map(|j| q[[i, j]] * alpha[j]).sum())
            .collect();

        let mut converged = false;
        for _ in 0..self.max_iter {
            // i may still grow, j may still shrink
            let mut i_up = None;
            let mut g_min = f64::INFINITY;
            let mut j_low = None;
            let mut g_max = f64::NEG_INFINITY;
            for k in 0..n {
                if alpha[k] < 1.0 && grad[k] < g_min {
                    g_min = grad[k];
                    i_up = Some(k);
                }
                if alpha[k] > 0.0 && grad[k] > g_max {
                    g_max = grad[k];
                    j_low = Some(k);
                }
            }
            let (i, j) = match (i_up, j_low) {
                (Some(i), Some(j)) if g_max - g_min >= self.tol => (i, j),
                _ => {
                    converged = true;
                    break;
                }
            };

            let quad = (q[[i, i]] + q[[j, j]] - 2.0 * q[[i, j]]).max(TAU);
            let step = ((g_max - g_min) / quad).min(1.0 - alpha[i]).min(alpha[j]);
            alpha[i] = (alpha[i] + step).min(1.0);
            alpha[j] -= step;
            for (k, g) in grad.iter_mut().enumerate() {
                *g += step * (q[[k, i]] - q[[k, j]]);
            }
        }
        if !converged {
            warn!(nu = self.nu, max_iter = self.max_iter, "OCSVM solver hit max_iter before converging");
        }

        let rho = compute_rho(&alpha, &grad);
        let support: Vec<usize> = (0..n).filter(|&k| alpha[k] > 0.0).collect();
        let vectors = x.select(ndarray::Axis(0), &support);
        let alphas = support.iter().map(|&k| alpha[k]).collect();

        Ok(SupportVectors {
            vectors,
            alphas,
            gamma,
            rho,
        })
    }
}

fn compute_rho(alpha: &[f64], grad: &[f64]) -> f64 {
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut n_free = 0usize;
    let mut sum_free = 0.0;
    for (&a, &g) in alpha.iter().zip(grad.iter()) {
        if a >= 1.0 {
            lb = lb.max(g);
        } else if a <= 0.0 {
            ub = ub.min(g);
        } else {
            n_free += 1;
            sum_free += g;
        }
    }
    if n_free > 0 {
        sum_free / n_free as f64
    } else if ub.is_infinite() {
        lb
    } else if lb.is_infinite() {
        ub
    } else {
        (ub + lb) / 2.0
    }
}

impl BaseDetector for OCSVM {
    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<()> {
        check_array(x)?;
        check_parameter(self.nu, 0.0, 1.0, "nu", false, true)?;
        check_parameter(self.tol, 0.0, f64::INFINITY, "tol", false, false)?;
        let gamma = self.resolve_gamma(x)?;

        let model = self.solve(x, gamma)?;
        let scores = model.score_rows(x);
        self.model = Some(model);
        self.decision_scores = Some(scores);
        Ok(())
    }

    fn decision_scores(&self) -> Option<&Array1<f64>> {
        self.decision_scores.as_ref()
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or(XgbodError::NotFitted("OCSVM"))?;
        check_n_features(model.vectors.ncols(), x)?;
        Ok(model.score_rows(x))
    }

    fn name(&self) -> String {
        format!("OCSVM(nu={})", self.nu)
    }
}
