//! The one-cluster thresholding operator of the hybrid solver.
//!
//! A coordinate-descent step on cluster `j` minimizes, in the cluster
//! magnitude `z >= 0`,
//!
//! ```text
//!   0.5 * (z - |x|)^2 + sum over occupied positions of scale * lambda * z
//! ```
//!
//! where the positions occupied by the cluster depend on its rank among the
//! other clusters. The objective is convex and piecewise quadratic with
//! breakpoints at the other clusters' magnitudes, so the minimizer is found
//! by scanning insertion slots in descending magnitude order:
//!
//! - strictly between two neighbours the solution soft-thresholds `|x|` by
//!   the slot's lambda-window sum,
//! - on the boundary interval around a neighbour's magnitude the
//!   subdifferential contains zero there, and the cluster merges into that
//!   neighbour,
//! - below the lowest window the cluster drops to the zero cluster.
//!
//! Window sums are O(1) via a prefix-sum of lambda computed once per sweep.

use crate::clusters::Clusters;
use crate::math::sign;

/// Solves the single-cluster subproblem for cluster `j`.
///
/// # Arguments
/// * `x` - The unconstrained minimizer `c_old - gradient / hessian`, signed.
/// * `j` - The cluster's current rank.
/// * `lambda_prefix` - Prefix sums of the unscaled lambda sequence
///   (length p + 1, leading zero).
/// * `scale` - `alpha / hessian`, applied to every lambda window.
/// * `clusters` - The current partition; cluster `j` must be non-zero.
///
/// # Returns
/// The new signed magnitude and the cluster's new rank. When the magnitude
/// ties with another cluster, the returned rank is that cluster's current
/// index and the caller merges; when the magnitude is zero the returned rank
/// is the last position.
pub fn slope_threshold(
    x: f64,
    j: usize,
    lambda_prefix: &[f64],
    scale: f64,
    clusters: &Clusters,
) -> (f64, usize) {
    let k_total = clusters.len();
    let m = clusters.cluster_size(j);
    let abs_x = x.abs();
    let sgn = sign(x);

    let has_zero_cluster = clusters.coeff(k_total - 1) == 0.0;
    let n_other = k_total - 1;
    let n_positive = if has_zero_cluster && n_other > 0 {
        n_other - 1
    } else {
        n_other
    };

    // lambda-window sum for the cluster placed at insertion slot `s`
    // (s other clusters above it)
    let window = |s: usize| -> f64 {
        let a = if s <= j {
            clusters.pointer(s)
        } else {
            clusters.pointer(s + 1) - m
        };
        scale * (lambda_prefix[a + m] - lambda_prefix[a])
    };
    // magnitude of the other cluster at slot-rank `s`
    let neighbour = |s: usize| -> f64 {
        if s < j {
            clusters.coeff(s)
        } else {
            clusters.coeff(s + 1)
        }
    };

    for s in 0..n_positive {
        let d = neighbour(s);
        let hi = d + window(s);
        let lo = d + window(s + 1);

        if abs_x > hi {
            // lands strictly above this neighbour
            return (sgn * (abs_x - window(s)), s);
        }
        if abs_x >= lo {
            // ties with the neighbour; merge into its current index
            let target = if s < j { s } else { s + 1 };
            return (sgn * d, target);
        }
    }

    let v = abs_x - window(n_positive);
    if v > 0.0 {
        (sgn * v, n_positive)
    } else {
        (0.0, k_total - 1)
    }
}
