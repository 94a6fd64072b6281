//! The path-fitting driver
//!
//! Copyright (C) 2025 Pierre F. Aubert pierre(at)spinorama(dot)org
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.
//!
//! One regularization path for one response column: an outer IRLS loop
//! linearizes the loss, and the inner loop solves the weighted quadratic
//! subproblem either with the hybrid scheme (coordinate-descent sweeps with
//! a proximal-gradient step every `pgd_freq` iterations, which is also what
//! re-splits clusters) or with FISTA. Both levels stop on the duality gap.
//! State is warm-started from one alpha to the next.

use ndarray::{Array1, ArrayView1};
use slopefit_sl1::math::prefix_sums;
use slopefit_sl1::{Clusters, SortedL1Norm};

use crate::cd::coordinate_descent;
use crate::design::{compute_gradient, compute_residual, DesignMatrix};
use crate::losses::LossFamily;
use crate::model::SlopeConfig;
use crate::pgd::proximal_gradient_step;
use crate::standardize::rescale_coefficients;

// absolute floor of the gap tolerance, so perfect and penalty-free fits
// (primal near zero) can still certify convergence
const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InnerSolver {
    Hybrid,
    Fista,
}

/// One fitted step of the path, in the original (unstandardized) frame.
pub(crate) struct PathStep {
    pub beta0: f64,
    pub beta: Array1<f64>,
    pub passes: usize,
    pub gap: f64,
    pub deviance_ratio: f64,
    pub n_nonzero_clusters: usize,
}

pub(crate) struct ColumnPath {
    pub steps: Vec<PathStep>,
    pub null_deviance: f64,
    /// Set when a NaN/Inf aborted the path; `steps` keeps what was
    /// accumulated before the failure.
    pub failure: Option<String>,
}

/// `alpha_max` for one response column: the dual norm of the gradient at
/// `beta = 0` with the intercept at its null-model fit. Guarded to one when
/// the null residual vanishes (e.g. an all-zero design).
pub(crate) fn alpha_max_for_column<M: DesignMatrix>(
    x: &M,
    y: ArrayView1<f64>,
    lambda: &Array1<f64>,
    x_centers: &Array1<f64>,
    x_scales: &Array1<f64>,
    standardize: bool,
    intercept: bool,
    loss: LossFamily,
) -> f64 {
    let beta0 = if intercept { loss.null_intercept(y) } else { 0.0 };
    let eta = Array1::from_elem(x.nrows(), beta0);
    let gen_residual = loss.residual(eta.view(), y);
    let gradient = compute_gradient(x, gen_residual.view(), x_centers, x_scales, standardize);
    let penalty = SortedL1Norm::new(lambda.clone());
    let alpha_max = penalty.dual_norm(gradient.view());
    if alpha_max.is_finite() && alpha_max > 0.0 {
        alpha_max
    } else {
        1.0
    }
}

fn sup_norm(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Dual of the weighted quadratic subproblem at `theta = residual / scale`.
/// The intercept refit keeps `sum w * residual = 0`, which is exactly the
/// feasibility condition the unpenalized intercept adds.
fn weighted_quadratic_dual(
    residual: &Array1<f64>,
    z: &Array1<f64>,
    w: &Array1<f64>,
    scale: f64,
    n: f64,
) -> f64 {
    residual
        .iter()
        .zip(z.iter())
        .zip(w.iter())
        .map(|((r, z), w)| {
            let t = r / scale;
            w * (z * z - (z - t) * (z - t))
        })
        .sum::<f64>()
        / (2.0 * n)
}

#[allow(clippy::too_many_arguments)]
fn fista_inner<M: DesignMatrix>(
    beta0: &mut f64,
    beta: &mut Array1<f64>,
    residual: &mut Array1<f64>,
    learning_rate: &mut f64,
    x: &M,
    w: &Array1<f64>,
    z: &Array1<f64>,
    penalty: &SortedL1Norm,
    x_centers: &Array1<f64>,
    x_scales: &Array1<f64>,
    config: &SlopeConfig,
    standardize: bool,
) -> (usize, bool) {
    let n = x.nrows() as f64;
    let mut t = 1.0_f64;
    let mut beta_prev = beta.clone();
    let mut extrapolated = beta.clone();

    for it in 0..config.max_it {
        let g_cur = 0.5 / n
            * residual
                .iter()
                .zip(w.iter())
                .map(|(r, w)| r * r * w)
                .sum::<f64>();
        let primal = g_cur + penalty.eval(beta.view());
        if !primal.is_finite() {
            return (it, false);
        }
        let wr = &*residual * w;
        let gradient = compute_gradient(x, wr.view(), x_centers, x_scales, standardize);
        let scale = penalty.dual_norm(gradient.view()).max(1.0);
        let dual = weighted_quadratic_dual(residual, z, w, scale, n);
        let gap = primal - dual;
        if config.print_level > 2 {
            eprintln!("    fista iter {:5}  gap={:.3e}", it, gap);
        }
        // with no penalty the dual norm is unbounded and the gap cannot
        // certify anything; fall back to the gradient sup-norm
        let converged = if penalty.alpha() > 0.0 {
            gap.max(0.0) <= config.tol * primal.abs().max(EPSILON)
        } else {
            sup_norm(&gradient) <= config.tol
        };
        if converged {
            return (it, true);
        }

        // gradient at the extrapolated point, intercept profiled out
        let mut r_v = compute_residual(
            x,
            z.view(),
            &extrapolated,
            x_centers,
            x_scales,
            standardize,
        );
        if config.intercept {
            let b0 = r_v
                .iter()
                .zip(w.iter())
                .map(|(r, w)| r * w)
                .sum::<f64>()
                / w.sum();
            r_v -= b0;
        }
        let g_v = 0.5 / n
            * r_v
                .iter()
                .zip(w.iter())
                .map(|(r, w)| r * r * w)
                .sum::<f64>();
        let wr_v = &r_v * w;
        let gradient_v = compute_gradient(x, wr_v.view(), x_centers, x_scales, standardize);

        beta_prev.assign(beta);
        beta.assign(&extrapolated);
        proximal_gradient_step(
            beta0,
            beta,
            residual,
            learning_rate,
            &gradient_v,
            x,
            w,
            z,
            penalty,
            x_centers,
            x_scales,
            g_v,
            config.intercept,
            standardize,
            config.learning_rate_decr,
        );

        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        let momentum = (t - 1.0) / t_next;
        extrapolated = &*beta + &((&*beta - &beta_prev) * momentum);
        t = t_next;
    }
    (config.max_it, true)
}

/// Fits the whole path for one response column, warm-starting every state
/// variable between alphas.
#[allow(clippy::too_many_arguments)]
pub(crate) fn fit_path_column<M: DesignMatrix>(
    x: &M,
    y: ArrayView1<f64>,
    alphas: &Array1<f64>,
    allow_early_stop: bool,
    lambda: &Array1<f64>,
    x_centers: &Array1<f64>,
    x_scales: &Array1<f64>,
    standardize: bool,
    config: &SlopeConfig,
    loss: LossFamily,
    solver: InnerSolver,
) -> ColumnPath {
    let n = x.nrows();
    let p = x.ncols();
    let nf = n as f64;

    let mut beta = Array1::zeros(p);
    let mut beta0 = if config.intercept {
        loss.null_intercept(y)
    } else {
        0.0
    };

    let mut eta = Array1::from_elem(n, beta0);
    let null_deviance = loss.deviance(eta.view(), y);

    let mut w = Array1::ones(n);
    let mut z = Array1::zeros(n);
    loss.update_weights(&mut w, &mut z, eta.view(), y);
    let mut residual = &z - &eta;

    let mut clusters = Clusters::new(beta.view());
    let mut learning_rate = 1.0;
    let mut penalty = SortedL1Norm::new(lambda.clone());
    let lambda_prefix = prefix_sums(&lambda.to_vec());

    let mut steps: Vec<PathStep> = Vec::with_capacity(alphas.len());
    let mut failure = None;
    let mut prev_dev_ratio = 0.0;

    'path: for (k, &alpha_k) in alphas.iter().enumerate() {
        penalty.set_alpha(alpha_k);
        if config.print_level > 0 {
            eprintln!("path step {:3}  alpha={:.6e}", k, alpha_k);
        }

        let mut passes = 0usize;
        let mut gap_final = 0.0;

        'outer: for it_outer in 0..config.max_it_outer {
            // the residual is kept up to date, eta is not
            eta = &z - &residual;

            let primal = loss.value(eta.view(), y) + penalty.eval(beta.view());
            let gen_residual = loss.residual(eta.view(), y);
            let gradient =
                compute_gradient(x, gen_residual.view(), x_centers, x_scales, standardize);
            let scale = penalty.dual_norm(gradient.view()).max(1.0);
            let theta = gen_residual.mapv(|v| v / scale);
            let dual = loss.dual(theta.view(), y);
            let gap = primal - dual;
            gap_final = gap;

            if !primal.is_finite() || !gap.is_finite() {
                failure = Some(format!("non-finite objective at path step {}", k));
                break 'path;
            }
            if config.print_level > 1 {
                eprintln!(
                    "  irls iter {:3}  primal={:.6e}  gap={:.3e}",
                    it_outer, primal, gap
                );
            }
            let converged = if alpha_k > 0.0 {
                gap.max(0.0) <= config.tol * primal.abs().max(EPSILON)
            } else {
                sup_norm(&gradient) <= config.tol
            };
            if converged {
                break 'outer;
            }

            loss.update_weights(&mut w, &mut z, eta.view(), y);
            residual = &z - &eta;

            match solver {
                InnerSolver::Hybrid => {
                    for it in 0..config.max_it {
                        if it % config.pgd_freq == 0 {
                            let g = 0.5 / nf
                                * residual
                                    .iter()
                                    .zip(w.iter())
                                    .map(|(r, w)| r * r * w)
                                    .sum::<f64>();
                            let primal_inner = g + penalty.eval(beta.view());
                            if !primal_inner.is_finite() {
                                failure =
                                    Some(format!("non-finite objective at path step {}", k));
                                break 'path;
                            }
                            let wr = &residual * &w;
                            let gradient_inner = compute_gradient(
                                x,
                                wr.view(),
                                x_centers,
                                x_scales,
                                standardize,
                            );
                            let scale_inner =
                                penalty.dual_norm(gradient_inner.view()).max(1.0);
                            let dual_inner =
                                weighted_quadratic_dual(&residual, &z, &w, scale_inner, nf);
                            let gap_inner = primal_inner - dual_inner;
                            if config.print_level > 2 {
                                eprintln!("    inner iter {:5}  gap={:.3e}", it, gap_inner);
                            }
                            let converged_inner = if alpha_k > 0.0 {
                                gap_inner.max(0.0)
                                    <= config.tol * primal_inner.abs().max(EPSILON)
                            } else {
                                sup_norm(&gradient_inner) <= config.tol
                            };
                            if converged_inner {
                                break;
                            }
                            proximal_gradient_step(
                                &mut beta0,
                                &mut beta,
                                &mut residual,
                                &mut learning_rate,
                                &gradient_inner,
                                x,
                                &w,
                                &z,
                                &penalty,
                                x_centers,
                                x_scales,
                                g,
                                config.intercept,
                                standardize,
                                config.learning_rate_decr,
                            );
                            clusters.rebuild(beta.view());
                        } else {
                            coordinate_descent(
                                &mut beta0,
                                &mut beta,
                                &mut residual,
                                &mut clusters,
                                x,
                                &w,
                                &penalty,
                                &lambda_prefix,
                                x_centers,
                                x_scales,
                                config.intercept,
                                standardize,
                                config.update_clusters,
                            );
                        }
                        passes += 1;
                    }
                }
                InnerSolver::Fista => {
                    let (used, ok) = fista_inner(
                        &mut beta0,
                        &mut beta,
                        &mut residual,
                        &mut learning_rate,
                        x,
                        &w,
                        &z,
                        &penalty,
                        x_centers,
                        x_scales,
                        config,
                        standardize,
                    );
                    passes += used;
                    if !ok {
                        failure = Some(format!("non-finite objective at path step {}", k));
                        break 'path;
                    }
                    clusters.rebuild(beta.view());
                }
            }
        }

        let (beta0_out, beta_out) =
            rescale_coefficients(beta0, &beta, x_centers, x_scales, config.intercept);

        eta = &z - &residual;
        let deviance = loss.deviance(eta.view(), y);
        let deviance_ratio = if null_deviance > 0.0 {
            1.0 - deviance / null_deviance
        } else {
            0.0
        };
        let n_nonzero_clusters = clusters.n_nonzero();

        steps.push(PathStep {
            beta0: beta0_out,
            beta: beta_out,
            passes,
            gap: gap_final,
            deviance_ratio,
            n_nonzero_clusters,
        });

        if allow_early_stop && k > 0 {
            if deviance_ratio > config.tol_dev_ratio {
                break;
            }
            if deviance_ratio - prev_dev_ratio < config.tol_dev_change * deviance_ratio {
                break;
            }
            if let Some(max_clusters) = config.max_clusters {
                if n_nonzero_clusters > max_clusters {
                    break;
                }
            }
        }
        prev_dev_ratio = deviance_ratio;
    }

    ColumnPath {
        steps,
        null_deviance,
        failure,
    }
}
