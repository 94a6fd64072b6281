//! One proximal-gradient step with backtracking line search.

use ndarray::Array1;
use slopefit_sl1::SortedL1Norm;

use crate::design::{compute_residual, DesignMatrix};

/// Takes a proximal-gradient step on the weighted quadratic surrogate,
/// assuming the gradient at the current iterate has been computed.
///
/// Proposes `prox(beta - lr * gradient, lr)`, recomputes the residual (and
/// refits the intercept) for the proposal, and accepts when the surrogate
/// majorizes the new fit value; otherwise the learning rate is multiplied
/// by `learning_rate_decr` and the step retried. The learning rate is
/// carried across calls so the line search rarely backtracks after the
/// first few steps.
#[allow(clippy::too_many_arguments)]
pub(crate) fn proximal_gradient_step<M: DesignMatrix>(
    beta0: &mut f64,
    beta: &mut Array1<f64>,
    residual: &mut Array1<f64>,
    learning_rate: &mut f64,
    gradient: &Array1<f64>,
    x: &M,
    w: &Array1<f64>,
    z: &Array1<f64>,
    penalty: &SortedL1Norm,
    x_centers: &Array1<f64>,
    x_scales: &Array1<f64>,
    g_old: f64,
    intercept: bool,
    standardize: bool,
    learning_rate_decr: f64,
) {
    let n = x.nrows() as f64;
    let beta_old = beta.clone();

    loop {
        let proposal = &beta_old - &(gradient * *learning_rate);
        *beta = penalty.prox(proposal.view(), *learning_rate);

        *residual = compute_residual(x, z.view(), beta, x_centers, x_scales, standardize);
        if intercept {
            let b0 = residual
                .iter()
                .zip(w.iter())
                .map(|(r, w)| r * w)
                .sum::<f64>()
                / w.sum();
            *residual -= b0;
            *beta0 = b0;
        }

        let beta_diff = &*beta - &beta_old;
        let g = 0.5 / n
            * residual
                .iter()
                .zip(w.iter())
                .map(|(r, w)| r * r * w)
                .sum::<f64>();
        let q = g_old
            + beta_diff.dot(gradient)
            + beta_diff.dot(&beta_diff) / (2.0 * *learning_rate);

        if q >= g * (1.0 - 1e-12) || *learning_rate < 1e-20 {
            break;
        }
        *learning_rate *= learning_rate_decr;
    }
}
