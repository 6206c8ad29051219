//! Gradient boosted regression trees with logistic loss.
//!
//! Each round fits one tree to the first and second derivatives of the
//! log-loss at the current margins:
//!
//! - split score: `gain(L) + gain(R) - gain(parent)`, kept when it reaches
//!   `gamma`
//! - leaf weight: `-T(G) / (H + lambda)`, where `T` soft-thresholds by
//!   `reg_alpha`, clipped by `max_delta_step` and shrunk by `learning_rate`
//! - rows whose value is missing follow the direction learned at each split

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::prelude::*;
use rand::seq::index;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::error::{Result, XgbodError};
use crate::utils::validation::{check_binary_labels, check_n_features};

use super::params::{BoosterParams, ImportanceType};
use super::BoostingClassifier;

const RT_EPS: f64 = 1e-6;
const MIN_HESS: f64 = 1e-16;

#[derive(Debug, Clone)]
struct SplitNode {
    feature: usize,
    threshold: f64,
    default_left: bool,
    left: usize,
    right: usize,
    loss_chg: f64,
    cover: f64,
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf { weight: f64 },
    Split(SplitNode),
}

/// Arena-allocated regression tree; node 0 is the root.
#[derive(Debug, Clone)]
struct RegTree {
    nodes: Vec<TreeNode>,
}

impl RegTree {
    fn predict_row(&self, row: ArrayView1<'_, f64>, params: &BoosterParams) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { weight } => return *weight,
                TreeNode::Split(split) => {
                    let value = row[split.feature];
                    let go_left = if params.is_missing(value) {
                        split.default_left
                    } else {
                        value < split.threshold
                    };
                    idx = if go_left { split.left } else { split.right };
                }
            }
        }
    }

    fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    feature: usize,
    threshold: f64,
    default_left: bool,
    loss_chg: f64,
}

fn threshold_l1(g: f64, alpha: f64) -> f64 {
    if g > alpha {
        g - alpha
    } else if g < -alpha {
        g + alpha
    } else {
        0.0
    }
}

fn calc_weight(params: &BoosterParams, g: f64, h: f64) -> f64 {
    if h < params.min_child_weight || h <= 0.0 {
        return 0.0;
    }
    let w = -threshold_l1(g, params.reg_alpha) / (h + params.reg_lambda);
    if params.max_delta_step > 0.0 {
        w.clamp(-params.max_delta_step, params.max_delta_step)
    } else {
        w
    }
}

/// Twice the negated regularized objective at the optimal weight.
fn calc_gain(params: &BoosterParams, g: f64, h: f64) -> f64 {
    if h < params.min_child_weight || h <= 0.0 {
        return 0.0;
    }
    let w = calc_weight(params, g, h);
    -(2.0 * g * w + (h + params.reg_lambda) * w * w + 2.0 * params.reg_alpha * w.abs())
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoosterParams,
    level_features: Vec<Vec<usize>>,
    nodes: Vec<TreeNode>,
}

impl<'a> TreeBuilder<'a> {
    fn build(mut self, rows: Vec<usize>) -> RegTree {
        self.grow(rows, 0);
        RegTree { nodes: self.nodes }
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let (g, h) = rows
            .iter()
            .fold((0.0, 0.0), |(g, h), &r| (g + self.grad[r], h + self.hess[r]));
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { weight: 0.0 });

        if depth < self.params.max_depth && rows.len() >= 2 {
            if let Some(best) = self.best_split(&rows, g, h, depth) {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                    rows.into_iter().partition(|&r| {
                        let value = self.x[[r, best.feature]];
                        if self.params.is_missing(value) {
                            best.default_left
                        } else {
                            value < best.threshold
                        }
                    });
                let left = self.grow(left_rows, depth + 1);
                let right = self.grow(right_rows, depth + 1);
                self.nodes[idx] = TreeNode::Split(SplitNode {
                    feature: best.feature,
                    threshold: best.threshold,
                    default_left: best.default_left,
                    left,
                    right,
                    loss_chg: best.loss_chg,
                    cover: h,
                });
                return idx;
            }
        }

        self.nodes[idx] = TreeNode::Leaf {
            weight: calc_weight(self.params, g, h) * self.params.learning_rate,
        };
        idx
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64, depth: usize) -> Option<Candidate> {
        let parent_gain = calc_gain(self.params, g, h);
        let candidates: Vec<Option<Candidate>> = self.level_features[depth]
            .par_iter()
            .map(|&feature| self.best_split_for_feature(rows, feature, g, h, parent_gain))
            .collect();

        // ties resolve to the lowest feature index
        let mut best: Option<Candidate> = None;
        for candidate in candidates.into_iter().flatten() {
            if best.map_or(true, |b| candidate.loss_chg > b.loss_chg) {
                best = Some(candidate);
            }
        }
        best.filter(|b| b.loss_chg > RT_EPS && b.loss_chg >= self.params.gamma)
    }

    fn best_split_for_feature(
        &self,
        rows: &[usize],
        feature: usize,
        g: f64,
        h: f64,
        parent_gain: f64,
    ) -> Option<Candidate> {
        let params = self.params;
        let mut present: Vec<(f64, usize)> = rows
            .iter()
            .map(|&r| (self.x[[r, feature]], r))
            .filter(|&(v, _)| !params.is_missing(v))
            .collect();
        if present.len() < 2 {
            return None;
        }
        present.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let (g_present, h_present) = present
            .iter()
            .fold((0.0, 0.0), |(gs, hs), &(_, r)| (gs + self.grad[r], hs + self.hess[r]));
        let (g_missing, h_missing) = (g - g_present, h - h_present);
        let has_missing = present.len() < rows.len();

        let mut best: Option<Candidate> = None;
        let (mut gl, mut hl) = (0.0, 0.0);
        for i in 0..present.len() - 1 {
            let (value, r) = present[i];
            gl += self.grad[r];
            hl += self.hess[r];
            let next = present[i + 1].0;
            if value >= next {
                continue;
            }
            let mut threshold = 0.5 * (value + next);
            if threshold <= value {
                threshold = next;
            }

            let directions: &[bool] = if has_missing { &[false, true] } else { &[false] };
            for &default_left in directions {
                let (gl_d, hl_d) = if default_left {
                    (gl + g_missing, hl + h_missing)
                } else {
                    (gl, hl)
                };
                let (gr_d, hr_d) = (g - gl_d, h - hl_d);
                if hl_d < params.min_child_weight || hr_d < params.min_child_weight {
                    continue;
                }
                let loss_chg = calc_gain(params, gl_d, hl_d) + calc_gain(params, gr_d, hr_d) - parent_gain;
                if best.map_or(true, |b| loss_chg > b.loss_chg) {
                    best = Some(Candidate {
                        feature,
                        threshold,
                        default_left,
                        loss_chg,
                    });
                }
            }
        }
        best
    }
}

/// Binary classifier boosting depth-limited trees on the logistic loss.
pub struct GradientBoostedTrees {
    params: BoosterParams,
    pool: ThreadPool,
    trees: Vec<RegTree>,
    base_margin: f64,
    n_features: usize,
}

impl GradientBoostedTrees {
    pub fn new(params: BoosterParams) -> Result<Self> {
        params.validate()?;
        for (key, value) in &params.options {
            debug!(%key, %value, "passthrough option has no effect on the built-in booster");
        }
        let n_jobs = params.effective_n_jobs();
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_jobs)
            .build()
            .map_err(|e| XgbodError::invalid_parameter("n_jobs", e.to_string()))?;
        let base_margin = (params.base_score / (1.0 - params.base_score)).ln();
        Ok(GradientBoostedTrees {
            params,
            pool,
            trees: Vec::new(),
            base_margin,
            n_features: 0,
        })
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn sample_features(rng: &mut StdRng, from: &[usize], fraction: f64) -> Vec<usize> {
        if fraction >= 1.0 {
            return from.to_vec();
        }
        let n = ((fraction * from.len() as f64).round() as usize).clamp(1, from.len());
        let mut picked: Vec<usize> = index::sample(rng, from.len(), n)
            .into_iter()
            .map(|i| from[i])
            .collect();
        picked.sort_unstable();
        picked
    }

    fn sample_rows(rng: &mut StdRng, n_samples: usize, fraction: f64) -> Vec<usize> {
        if fraction >= 1.0 {
            return (0..n_samples).collect();
        }
        (0..n_samples).filter(|_| rng.gen::<f64>() < fraction).collect()
    }

    fn margins(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let rows: Vec<f64> = self.pool.install(|| {
            (0..x.nrows())
                .into_par_iter()
                .map(|i| {
                    let row = x.row(i);
                    self.base_margin
                        + self
                            .trees
                            .iter()
                            .map(|t| t.predict_row(row, &self.params))
                            .sum::<f64>()
                })
                .collect()
        });
        Array1::from(rows)
    }

    fn log_loss(y: ArrayView1<'_, f64>, margins: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        let total: f64 = y
            .iter()
            .zip(margins.iter())
            .map(|(&t, &m)| {
                let p = sigmoid(m).clamp(eps, 1.0 - eps);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            })
            .sum();
        total / y.len() as f64
    }
}

impl BoostingClassifier for GradientBoostedTrees {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(XgbodError::InconsistentSamples {
                x_rows: x.nrows(),
                y_len: y.len(),
            });
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(XgbodError::InvalidInput(format!(
                "cannot train on an empty matrix of shape ({}, {})",
                x.nrows(),
                x.ncols()
            )));
        }
        check_binary_labels(y)?;

        let params = &self.params;
        let (n_samples, n_features) = x.dim();
        let mut rng = StdRng::seed_from_u64(params.random_state);
        let mut margins = Array1::from_elem(n_samples, self.base_margin);
        let all_features: Vec<usize> = (0..n_features).collect();
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            let (grad, hess): (Vec<f64>, Vec<f64>) = y
                .iter()
                .zip(margins.iter())
                .map(|(&t, &m)| {
                    let p = sigmoid(m);
                    let w = if t > 0.5 { params.scale_pos_weight } else { 1.0 };
                    ((p - t) * w, (p * (1.0 - p)).max(MIN_HESS) * w)
                })
                .unzip();

            let rows = Self::sample_rows(&mut rng, n_samples, params.subsample);
            let tree_features = Self::sample_features(&mut rng, &all_features, params.colsample_bytree);
            let level_features = (0..params.max_depth)
                .map(|_| Self::sample_features(&mut rng, &tree_features, params.colsample_bylevel))
                .collect();

            let builder = TreeBuilder {
                x: x.reborrow(),
                grad: &grad,
                hess: &hess,
                params,
                level_features,
                nodes: Vec::new(),
            };
            let tree = self.pool.install(|| builder.build(rows));

            for (i, m) in margins.iter_mut().enumerate() {
                *m += tree.predict_row(x.row(i), params);
            }
            if !params.silent {
                info!(
                    round,
                    n_leaves = tree.n_leaves(),
                    train_logloss = Self::log_loss(y, &margins),
                    "boosting round"
                );
            }
            trees.push(tree);
        }

        self.trees = trees;
        self.n_features = n_features;
        debug!(n_trees = self.trees.len(), n_features, "trained gradient boosted trees");
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(XgbodError::NotFitted("GradientBoostedTrees"));
        }
        check_n_features(self.n_features, x)?;
        Ok(self.margins(x).mapv(sigmoid))
    }

    fn feature_importances(&self, kind: ImportanceType) -> Option<Array1<f64>> {
        if !self.is_fitted() {
            return None;
        }
        let mut count = Array1::<f64>::zeros(self.n_features);
        let mut gain = Array1::<f64>::zeros(self.n_features);
        let mut cover = Array1::<f64>::zeros(self.n_features);
        for node in self.trees.iter().flat_map(|t| t.nodes.iter()) {
            if let TreeNode::Split(split) = node {
                count[split.feature] += 1.0;
                gain[split.feature] += split.loss_chg;
                cover[split.feature] += split.cover;
            }
        }
        let average = |total: &Array1<f64>| -> Array1<f64> {
            total
                .iter()
                .zip(count.iter())
                .map(|(&t, &c)| if c > 0.0 { t / c } else { 0.0 })
                .collect()
        };
        let mut scores = match kind {
            ImportanceType::Weight => count.clone(),
            ImportanceType::Gain => average(&gain),
            ImportanceType::Cover => average(&cover),
            ImportanceType::TotalGain => gain,
            ImportanceType::TotalCover => cover,
        };
        let sum = scores.sum();
        if sum > 0.0 {
            scores /= sum;
        }
        Some(scores)
    }

    fn name(&self) -> String {
        format!(
            "GradientBoostedTrees(n_estimators={}, max_depth={}, learning_rate={})",
            self.params.n_estimators, self.params.max_depth, self.params.learning_rate
        )
    }
}
