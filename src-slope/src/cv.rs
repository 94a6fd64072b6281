//! k-fold cross-validation over a hyperparameter grid.
//!
//! Tasks are (hyperparameter combination, fold) pairs and are embarrassingly
//! parallel: each owns its row subsets and a clone of the model, the design
//! and response are shared read-only, and the score tensor is reduced after
//! all tasks complete, so task ordering never changes the result.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

use crate::design::DesignMatrix;
use crate::error::{Result, SlopeError};
use crate::losses::LossFamily;
use crate::model::{Slope, SlopeConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Mse,
    Mae,
    Accuracy,
    Auc,
    Deviance,
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mse" => Ok(Metric::Mse),
            "mae" => Ok(Metric::Mae),
            "accuracy" => Ok(Metric::Accuracy),
            "auc" => Ok(Metric::Auc),
            "deviance" => Ok(Metric::Deviance),
            _ => Err(format!("unknown metric: {}", s)),
        }
    }
}

impl Metric {
    pub fn higher_is_better(self) -> bool {
        matches!(self, Metric::Accuracy | Metric::Auc)
    }

    fn better(self, candidate: f64, incumbent: f64) -> bool {
        if self.higher_is_better() {
            candidate > incumbent
        } else {
            candidate < incumbent
        }
    }

    fn worst(self) -> f64 {
        if self.higher_is_better() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }
    }

    /// Scores predictions at linear predictor `eta` against `y`.
    pub fn evaluate(self, loss: LossFamily, y: ArrayView2<f64>, eta: &Array2<f64>) -> f64 {
        let m = y.ncols();
        let count = (y.nrows() * m) as f64;
        match self {
            Metric::Mse => {
                let mut acc = 0.0;
                for c in 0..m {
                    let pred = loss.predict(eta.column(c));
                    acc += pred
                        .iter()
                        .zip(y.column(c).iter())
                        .map(|(p, y)| (p - y) * (p - y))
                        .sum::<f64>();
                }
                acc / count
            }
            Metric::Mae => {
                let mut acc = 0.0;
                for c in 0..m {
                    let pred = loss.predict(eta.column(c));
                    acc += pred
                        .iter()
                        .zip(y.column(c).iter())
                        .map(|(p, y)| (p - y).abs())
                        .sum::<f64>();
                }
                acc / count
            }
            Metric::Accuracy => {
                let mut hits = 0usize;
                for c in 0..m {
                    let pred = loss.predict(eta.column(c));
                    hits += pred
                        .iter()
                        .zip(y.column(c).iter())
                        .filter(|(p, y)| (**p >= 0.5) == (**y >= 0.5))
                        .count();
                }
                hits as f64 / count
            }
            Metric::Auc => {
                let mut acc = 0.0;
                for c in 0..m {
                    let pred = loss.predict(eta.column(c));
                    acc += auc(pred.view(), y.column(c));
                }
                acc / m as f64
            }
            Metric::Deviance => {
                let mut acc = 0.0;
                for c in 0..m {
                    acc += loss.deviance(eta.column(c), y.column(c)) / y.nrows() as f64;
                }
                acc / m as f64
            }
        }
    }
}

/// Area under the ROC curve as the normalized Mann-Whitney rank statistic,
/// with average ranks on score ties. Degenerate labels score 0.5.
fn auc(scores: ArrayView1<f64>, labels: ArrayView1<f64>) -> f64 {
    let n = scores.len();
    let n_pos = labels.iter().filter(|&&y| y > 0.5).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg_rank;
        }
        i = j + 1;
    }

    let rank_sum: f64 = (0..n).filter(|&i| labels[i] > 0.5).map(|i| ranks[i]).sum();
    (rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0) / (n_pos * n_neg) as f64
}

/// Cross-validation setup: the hyperparameter grid, the scoring metric and
/// the fold layout (a count plus optional seed, or fully explicit splits).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvConfig {
    /// Grid axes as (name, values); recognized names are "q" and "gamma".
    /// The grid is the cartesian product of the axes, in the given order.
    pub hyperparams: Vec<(String, Vec<f64>)>,
    pub metric: Metric,
    pub n_folds: usize,
    /// Explicit (train, test) index pairs; overrides `n_folds` and `seed`.
    pub predefined_folds: Option<Vec<(Vec<usize>, Vec<usize>)>>,
    pub seed: Option<u64>,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            hyperparams: vec![("q".to_string(), vec![0.1])],
            metric: Metric::Mse,
            n_folds: 10,
            predefined_folds: None,
            seed: None,
        }
    }
}

/// Scores of one hyperparameter combination.
#[derive(Debug, Clone, Serialize)]
pub struct CvComboResult {
    /// The (name, value) overrides of this combination.
    pub params: Vec<(String, f64)>,
    /// fold x alpha score matrix.
    pub scores: Array2<f64>,
    pub mean_scores: Array1<f64>,
    pub std_errors: Array1<f64>,
    pub alphas: Array1<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CvResult {
    pub best_score: f64,
    pub best_combo: usize,
    pub best_alpha_index: usize,
    pub combos: Vec<CvComboResult>,
}

impl CvResult {
    /// Parameters of the winning combination.
    pub fn best_params(&self) -> &[(String, f64)] {
        &self.combos[self.best_combo].params
    }

    /// The alpha the winning (combination, index) pair corresponds to.
    pub fn best_alpha(&self) -> f64 {
        self.combos[self.best_combo].alphas[self.best_alpha_index]
    }
}

fn expand_grid(axes: &[(String, Vec<f64>)]) -> Result<Vec<Vec<(String, f64)>>> {
    for (name, values) in axes {
        if name != "q" && name != "gamma" {
            return Err(SlopeError::Domain(format!(
                "unknown hyperparameter: {}",
                name
            )));
        }
        if values.is_empty() {
            return Err(SlopeError::Domain(format!(
                "hyperparameter {} has no values",
                name
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SlopeError::Domain(format!(
                "hyperparameter {} has non-finite values",
                name
            )));
        }
    }

    let mut combos: Vec<Vec<(String, f64)>> = vec![Vec::new()];
    for (name, values) in axes {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for &v in values {
                let mut extended = combo.clone();
                extended.push((name.clone(), v));
                next.push(extended);
            }
        }
        combos = next;
    }
    Ok(combos)
}

fn apply_params(mut config: SlopeConfig, params: &[(String, f64)]) -> SlopeConfig {
    for (name, value) in params {
        match name.as_str() {
            "q" => config.q = *value,
            "gamma" => config.gamma = *value,
            _ => {}
        }
    }
    config
}

fn resolve_folds(cv: &CvConfig, n: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if let Some(folds) = &cv.predefined_folds {
        if folds.len() < 2 {
            return Err(SlopeError::Domain(
                "cross-validation needs at least two folds".to_string(),
            ));
        }
        for (train, test) in folds {
            if train.is_empty() || test.is_empty() {
                return Err(SlopeError::Domain(
                    "every fold needs non-empty train and test sets".to_string(),
                ));
            }
            if train.iter().chain(test.iter()).any(|&i| i >= n) {
                return Err(SlopeError::ShapeMismatch(format!(
                    "fold index out of range for {} samples",
                    n
                )));
            }
        }
        return Ok(folds.clone());
    }

    let k = cv.n_folds;
    if k < 2 || k > n {
        return Err(SlopeError::Domain(format!(
            "n_folds must be between 2 and {}, got {}",
            n, k
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng: StdRng = match cv.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => {
            let mut thread_rng = rand::rng();
            StdRng::from_rng(&mut thread_rng)
        }
    };
    indices.shuffle(&mut rng);

    let base = n / k;
    let extra = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for f in 0..k {
        let size = base + usize::from(f < extra);
        let test = indices[start..start + size].to_vec();
        let train: Vec<usize> = indices[..start]
            .iter()
            .chain(indices[start + size..].iter())
            .copied()
            .collect();
        folds.push((train, test));
        start += size;
    }
    Ok(folds)
}

/// Cross-validates `model` over the grid in `cv`. For each combination the
/// lambda sequence and alpha grid are resolved once on the full data, then
/// every fold fits the path on its training rows and scores the held-out
/// rows at every alpha. (fold, combination) tasks run in parallel.
pub fn cross_validate<M>(
    model: &Slope,
    x: &M,
    y: &Array2<f64>,
    alphas: Option<&Array1<f64>>,
    lambda: Option<&Array1<f64>>,
    cv: &CvConfig,
) -> Result<CvResult>
where
    M: DesignMatrix + Sync,
{
    let n = x.nrows();
    if y.nrows() != n {
        return Err(SlopeError::ShapeMismatch(format!(
            "X has {} rows but Y has {}",
            n,
            y.nrows()
        )));
    }

    let folds = resolve_folds(cv, n)?;
    let combos = expand_grid(&cv.hyperparams)?;

    let mut setups = Vec::with_capacity(combos.len());
    for params in &combos {
        let combo_model = Slope::new(apply_params(model.config().clone(), params));
        let resolved = combo_model.resolve_inputs(x, y, alphas, lambda)?;
        setups.push((combo_model, resolved.alphas, resolved.lambda));
    }

    let loss = model.config().loss;
    let metric = cv.metric;
    let tasks: Vec<(usize, usize)> = (0..combos.len())
        .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
        .collect();

    let scored: Result<Vec<(usize, usize, Vec<f64>)>> = tasks
        .par_iter()
        .map(|&(c, f)| {
            let (combo_model, combo_alphas, combo_lambda) = &setups[c];
            let (train, test) = &folds[f];

            let x_train = x.subset_rows(train);
            let y_train = y.select(Axis(0), train);
            let x_test = x.subset_rows(test);
            let y_test = y.select(Axis(0), test);

            let path =
                combo_model.path(&x_train, &y_train, Some(combo_alphas), Some(combo_lambda))?;

            let mut scores = vec![metric.worst(); combo_alphas.len()];
            for k in 0..path.n_steps() {
                let eta = path.linear_predictor(&x_test, k);
                scores[k] = metric.evaluate(loss, y_test.view(), &eta);
            }
            Ok((c, f, scores))
        })
        .collect();
    let scored = scored?;

    let n_folds = folds.len();
    let mut results = Vec::with_capacity(combos.len());
    for (c, params) in combos.iter().enumerate() {
        let k_total = setups[c].1.len();
        let mut scores = Array2::from_elem((n_folds, k_total), metric.worst());
        for (sc, sf, s) in &scored {
            if *sc == c {
                for (k, v) in s.iter().enumerate() {
                    scores[[*sf, k]] = *v;
                }
            }
        }

        let mut mean_scores = Array1::zeros(k_total);
        let mut std_errors = Array1::zeros(k_total);
        for k in 0..k_total {
            let col = scores.column(k);
            let mean = col.sum() / n_folds as f64;
            let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                / (n_folds - 1) as f64;
            mean_scores[k] = mean;
            std_errors[k] = (var / n_folds as f64).sqrt();
        }

        results.push(CvComboResult {
            params: params.clone(),
            scores,
            mean_scores,
            std_errors,
            alphas: setups[c].1.clone(),
        });
    }

    let mut best_score = metric.worst();
    let mut best_combo = 0;
    let mut best_alpha_index = 0;
    for (c, combo) in results.iter().enumerate() {
        for (k, &mean) in combo.mean_scores.iter().enumerate() {
            if metric.better(mean, best_score) {
                best_score = mean;
                best_combo = c;
                best_alpha_index = k;
            }
        }
    }

    Ok(CvResult {
        best_score,
        best_combo,
        best_alpha_index,
        combos: results,
    })
}
