//! The sorted-L1 norm: evaluation, proximal operator and dual norm.

use ndarray::{Array1, ArrayView1};

use crate::math::{sign, sort_index};

/// The sorted-L1 norm `beta -> alpha * sum_j lambda_j * |beta|_(j)` where
/// `|beta|_(j)` is the j-th largest absolute entry.
///
/// `lambda` is fixed at construction and must be non-negative and
/// non-increasing; validation is the caller's responsibility. `alpha` scales
/// the whole norm and changes along a regularization path.
#[derive(Debug, Clone)]
pub struct SortedL1Norm {
    alpha: f64,
    lambda: Array1<f64>,
}

impl SortedL1Norm {
    pub fn new(lambda: Array1<f64>) -> Self {
        Self { alpha: 1.0, lambda }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha;
    }

    pub fn lambda(&self) -> &Array1<f64> {
        &self.lambda
    }

    /// Evaluates the norm at `beta`.
    pub fn eval(&self, beta: ArrayView1<f64>) -> f64 {
        let mut beta_abs: Vec<f64> = beta.iter().map(|b| b.abs()).collect();
        beta_abs.sort_by(|a, b| b.total_cmp(a));
        self.alpha
            * beta_abs
                .iter()
                .zip(self.lambda.iter())
                .map(|(b, l)| b * l)
                .sum::<f64>()
    }

    /// Proximal operator: `argmin_x 0.5 * ||x - v||^2 + scale * norm(x)`.
    ///
    /// Sorts `|v|` in descending order and runs a stack-based
    /// pool-adjacent-violators pass on `|v|_i - scale * alpha * lambda_i`:
    /// each new value opens a block of size one, and blocks are merged
    /// backwards while their means are non-decreasing. Block means are then
    /// clipped at zero, the sort is undone and the signs reapplied.
    pub fn prox(&self, v: ArrayView1<f64>, scale: f64) -> Array1<f64> {
        let p = v.len();

        let signs: Vec<f64> = v.iter().map(|x| sign(*x)).collect();
        let v_abs: Vec<f64> = v.iter().map(|x| x.abs()).collect();
        let ord = sort_index(&v_abs, true);

        let mut s = vec![0.0; p];
        let mut block_mean = vec![0.0; p];
        let mut block_start = vec![0usize; p];
        let mut block_end = vec![0usize; p];

        let mut k = 0usize;
        for i in 0..p {
            block_start[k] = i;
            block_end[k] = i;
            s[k] = v_abs[ord[i]] - self.lambda[i] * self.alpha * scale;
            block_mean[k] = s[k];

            while k > 0 && block_mean[k - 1] <= block_mean[k] {
                k -= 1;
                block_end[k] = i;
                s[k] += s[k + 1];
                block_mean[k] = s[k] / (i - block_start[k] + 1) as f64;
            }
            k += 1;
        }

        let mut out = Array1::zeros(p);
        for b in 0..k {
            let d = block_mean[b].max(0.0);
            for i in block_start[b]..=block_end[b] {
                out[ord[i]] = d * signs[ord[i]];
            }
        }

        out
    }

    /// Dual norm of `g`: `max_k cumsum(|g|_(i))_k / (alpha * cumsum(lambda)_k)`.
    ///
    /// Scaling a point by `max(1, dual_norm(point))` makes it dual feasible.
    /// When a prefix of `alpha * lambda` sums to zero while `|g|` does not,
    /// the norm is unbounded and infinity is returned, so `alpha = 0` and
    /// all-zero `lambda` behave consistently.
    pub fn dual_norm(&self, g: ArrayView1<f64>) -> f64 {
        let mut g_abs: Vec<f64> = g.iter().map(|x| x.abs()).collect();
        g_abs.sort_by(|a, b| b.total_cmp(a));

        let mut num = 0.0;
        let mut den = 0.0;
        let mut best = 0.0_f64;
        for (a, l) in g_abs.iter().zip(self.lambda.iter()) {
            num += a;
            den += self.alpha * l;
            if den > 0.0 {
                best = best.max(num / den);
            } else if num > 0.0 {
                return f64::INFINITY;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn eval_sorts_before_weighting() {
        let norm = SortedL1Norm::new(array![3.0, 2.0, 1.0]);
        // |beta| sorted: 5, 2, 1 -> 3*5 + 2*2 + 1*1 = 20
        let v = array![1.0, -5.0, 2.0];
        assert!((norm.eval(v.view()) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn eval_scales_with_alpha() {
        let mut norm = SortedL1Norm::new(array![2.0, 1.0]);
        let v = array![1.0, 1.0];
        let base = norm.eval(v.view());
        norm.set_alpha(0.5);
        assert!((norm.eval(v.view()) - 0.5 * base).abs() < 1e-12);
    }

    #[test]
    fn prox_zero_is_zero() {
        let norm = SortedL1Norm::new(array![2.0, 1.0, 0.5]);
        for scale in [0.0, 0.5, 10.0] {
            let out = norm.prox(array![0.0, 0.0, 0.0].view(), scale);
            assert!(out.iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn prox_reduces_to_soft_threshold_for_equal_lambda() {
        let norm = SortedL1Norm::new(array![1.0, 1.0, 1.0, 1.0]);
        let v = array![3.0, -1.0, 0.5, 0.2];
        let out = norm.prox(v.view(), 1.0);
        let expected = array![2.0, 0.0, 0.0, 0.0];
        for (o, e) in out.iter().zip(expected.iter()) {
            assert!((o - e).abs() < 1e-12, "got {:?}", out);
        }
    }

    #[test]
    fn prox_sign_equivariance() {
        let norm = SortedL1Norm::new(array![2.0, 1.5, 1.0, 0.5]);
        let v = array![1.2, -3.4, 0.3, -0.9];
        let neg = v.mapv(|x| -x);
        let a = norm.prox(v.view(), 0.7);
        let b = norm.prox(neg.view(), 0.7);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x + y).abs() < 1e-12);
        }
    }

    #[test]
    fn prox_clusters_close_values() {
        // lambda gaps exceed the input gaps, so the two leading entries
        // must collapse to a common magnitude
        let norm = SortedL1Norm::new(array![2.0, 1.0, 0.5]);
        let v = array![5.0, 4.5, 0.1];
        let out = norm.prox(v.view(), 1.0);
        assert!((out[0] - out[1]).abs() < 1e-12);
        assert!(out[0] > 0.0);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn dual_norm_basics() {
        let norm = SortedL1Norm::new(array![2.0, 1.0]);
        // cumsum |g|: 3, 4; cumsum lambda: 2, 3 -> max(1.5, 4/3) = 1.5
        let g = array![1.0, -3.0];
        assert!((norm.dual_norm(g.view()) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn dual_norm_zero_alpha_is_infinite() {
        let mut norm = SortedL1Norm::new(array![2.0, 1.0]);
        norm.set_alpha(0.0);
        assert_eq!(norm.dual_norm(array![1.0, 0.0].view()), f64::INFINITY);
        assert_eq!(norm.dual_norm(array![0.0, 0.0].view()), 0.0);
    }

    #[test]
    fn subgradient_characterization_at_zero() {
        // x is in the subdifferential of the norm at 0 iff dual_norm(x) <= 1
        let norm = SortedL1Norm::new(array![2.0, 1.0, 0.5]);
        let inside = array![1.9, 0.9, 0.1];
        let outside = array![2.5, 0.0, 0.0];
        assert!(norm.dual_norm(inside.view()) <= 1.0);
        assert!(norm.dual_norm(outside.view()) > 1.0);
    }
}
