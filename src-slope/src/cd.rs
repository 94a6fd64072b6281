//! One coordinate-descent sweep of the hybrid CD/PGD algorithm.
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

use ndarray::Array1;
use slopefit_sl1::math::sign;
use slopefit_sl1::{slope_threshold, Clusters, SortedL1Norm};

use crate::design::DesignMatrix;

/// Sweeps once over the non-zero clusters, solving the one-cluster
/// subproblem for each and keeping the residual (and optionally the
/// intercept) consistent incrementally.
///
/// The zero cluster is skipped: it is usually large and rarely changes, and
/// indices re-enter it only through a slope-threshold result of zero.
/// Singleton clusters use per-column operations with just-in-time
/// centering/scaling; multi-member clusters materialize the sign-aggregated
/// column densely, since there is no efficient just-in-time
/// standardization of aggregated sparse columns.
#[allow(clippy::too_many_arguments)]
pub(crate) fn coordinate_descent<M: DesignMatrix>(
    beta0: &mut f64,
    beta: &mut Array1<f64>,
    residual: &mut Array1<f64>,
    clusters: &mut Clusters,
    x: &M,
    w: &Array1<f64>,
    penalty: &SortedL1Norm,
    lambda_prefix: &[f64],
    x_centers: &Array1<f64>,
    x_scales: &Array1<f64>,
    intercept: bool,
    standardize: bool,
    update_clusters: bool,
) {
    let n = x.nrows() as f64;

    let mut j = 0;
    while j < clusters.len() {
        let c_old = clusters.coeff(j);
        if c_old == 0.0 {
            j += 1;
            continue;
        }

        let members: Vec<usize> = clusters.members(j).to_vec();
        let mut signs: Vec<f64> = Vec::with_capacity(members.len());

        let (hessian, gradient, x_s) = if members.len() == 1 {
            let k = members[0];
            let s_k = sign(beta[k]);
            signs.push(s_k);

            let wr: Array1<f64> = residual
                .iter()
                .zip(w.iter())
                .map(|(r, w)| r * w)
                .collect::<Vec<f64>>()
                .into();

            if standardize {
                let gradient = -s_k * (x.col_dot(k, wr.view()) - wr.sum() * x_centers[k])
                    / (n * x_scales[k]);
                let hessian = (x.col_weighted_sq_norm(k, w.view())
                    - 2.0 * x_centers[k] * x.col_weighted_sum(k, w.view())
                    + x_centers[k] * x_centers[k] * w.sum())
                    / (x_scales[k] * x_scales[k] * n);
                (hessian, gradient, None)
            } else {
                let gradient = -s_k * x.col_dot(k, wr.view()) / n;
                let hessian = x.col_weighted_sq_norm(k, w.view()) / n;
                (hessian, gradient, None)
            }
        } else {
            let mut x_s = Array1::zeros(residual.len());
            let mut center_offset = 0.0;
            for &k in &members {
                let s_k = sign(beta[k]);
                signs.push(s_k);
                if standardize {
                    x.add_scaled_col(k, s_k / x_scales[k], &mut x_s);
                    center_offset += x_centers[k] * s_k / x_scales[k];
                } else {
                    x.add_scaled_col(k, s_k, &mut x_s);
                }
            }
            if center_offset != 0.0 {
                x_s -= center_offset;
            }

            let hessian = x_s
                .iter()
                .zip(w.iter())
                .map(|(x, w)| x * x * w)
                .sum::<f64>()
                / n;
            let gradient = -x_s
                .iter()
                .zip(w.iter())
                .zip(residual.iter())
                .map(|((x, w), r)| x * w * r)
                .sum::<f64>()
                / n;
            (hessian, gradient, Some(x_s))
        };

        if !(hessian > 0.0) {
            j += 1;
            continue;
        }

        let (c_tilde, new_index) = slope_threshold(
            c_old - gradient / hessian,
            j,
            lambda_prefix,
            penalty.alpha() / hessian,
            clusters,
        );

        for (&k, &s_k) in members.iter().zip(signs.iter()) {
            beta[k] = c_tilde * s_k;
        }

        let c_diff = c_old - c_tilde;
        if c_diff != 0.0 {
            match &x_s {
                None => {
                    let k = members[0];
                    if standardize {
                        x.add_scaled_col(k, signs[0] * c_diff / x_scales[k], residual);
                        *residual -= x_centers[k] * signs[0] * c_diff / x_scales[k];
                    } else {
                        x.add_scaled_col(k, signs[0] * c_diff, residual);
                    }
                }
                Some(x_s) => {
                    residual.zip_mut_with(x_s, |r, x| *r += x * c_diff);
                }
            }
        }

        if update_clusters {
            clusters.update(j, new_index, c_tilde.abs());
        } else {
            clusters.set_coeff(j, c_tilde.abs());
        }

        if intercept {
            let beta0_update = residual
                .iter()
                .zip(w.iter())
                .map(|(r, w)| r * w)
                .sum::<f64>()
                / w.sum();
            *residual -= beta0_update;
            *beta0 += beta0_update;
        }

        j += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn single_sweep_solves_identity_design() {
        // X = I, no penalty, singleton clusters: one sweep lands on the
        // exact least-squares solution
        let design = ndarray::Array2::<f64>::eye(3);
        let y = array![1.0, -2.0, 3.0];

        let mut beta0 = 0.0;
        let mut beta = array![0.5, -1.0, 2.0];
        let mut residual = &y - &beta;
        let mut clusters = Clusters::new(beta.view());

        let w = array![1.0, 1.0, 1.0];
        let mut penalty = SortedL1Norm::new(array![1.0, 1.0, 1.0]);
        penalty.set_alpha(0.0);
        let prefix = slopefit_sl1::math::prefix_sums(&[1.0, 1.0, 1.0]);
        let centers = Array1::zeros(3);
        let scales = Array1::ones(3);

        coordinate_descent(
            &mut beta0,
            &mut beta,
            &mut residual,
            &mut clusters,
            &design,
            &w,
            &penalty,
            &prefix,
            &centers,
            &scales,
            false,
            false,
            true,
        );

        for (b, t) in beta.iter().zip(y.iter()) {
            assert!((b - t).abs() < 1e-12, "beta {:?}", beta);
        }
        assert!(residual.iter().all(|r| r.abs() < 1e-12));
        assert_eq!(beta0, 0.0);
    }

    #[test]
    fn soft_thresholds_orthogonal_design() {
        // identity design, equal lambda: coordinate-wise soft thresholding
        let n = 4;
        let design = ndarray::Array2::<f64>::eye(n);
        let y = array![3.0, 1.0, 0.5, 0.2];

        let mut beta0 = 0.0;
        let mut beta = array![0.9, 0.7, 0.5, 0.3];
        let mut residual = &y - &beta;
        let mut clusters = Clusters::new(beta.view());
        let w = Array1::ones(n);
        let lambda = [1.0, 1.0, 1.0, 1.0];
        let mut penalty = SortedL1Norm::new(Array1::from(lambda.to_vec()));
        // alpha = 1/n makes the per-coordinate threshold exactly one
        penalty.set_alpha(1.0 / n as f64);
        let prefix = slopefit_sl1::math::prefix_sums(&lambda);
        let centers = Array1::zeros(n);
        let scales = Array1::ones(n);

        for _ in 0..20 {
            coordinate_descent(
                &mut beta0,
                &mut beta,
                &mut residual,
                &mut clusters,
                &design,
                &w,
                &penalty,
                &prefix,
                &centers,
                &scales,
                false,
                false,
                true,
            );
        }

        let expected = array![2.0, 0.0, 0.0, 0.0];
        for (b, e) in beta.iter().zip(expected.iter()) {
            assert!((b - e).abs() < 1e-10, "beta {:?}", beta);
        }
    }
}
