//! Column-capability abstraction over dense and sparse design matrices.
//!
//! The solver only needs a handful of column operations: dot products,
//! weighted squared norms, scaled accumulation into a dense vector, and a
//! visitor over stored entries (for the standardization pass). Abstracting
//! those keeps the coordinate-descent and gradient code identical for
//! `ndarray::Array2` and CSC `sprs::CsMat` designs.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use sprs::{CsMat, TriMat};

pub trait DesignMatrix {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;

    /// Dot product of column `j` with `v`.
    fn col_dot(&self, j: usize, v: ArrayView1<f64>) -> f64;

    /// `sum_i x_ij^2 * w_i`.
    fn col_weighted_sq_norm(&self, j: usize, w: ArrayView1<f64>) -> f64;

    /// `sum_i x_ij * w_i`.
    fn col_weighted_sum(&self, j: usize, w: ArrayView1<f64>) -> f64;

    /// `out += coef * column_j`.
    fn add_scaled_col(&self, j: usize, coef: f64, out: &mut Array1<f64>);

    /// Visits the stored entries of column `j`: every entry for a dense
    /// matrix, the structural non-zeros for a sparse one.
    fn col_for_each(&self, j: usize, f: impl FnMut(usize, f64));

    /// Owned copy restricted to `rows`, in the given order.
    fn subset_rows(&self, rows: &[usize]) -> Self
    where
        Self: Sized;
}

impl DesignMatrix for Array2<f64> {
    fn nrows(&self) -> usize {
        self.nrows()
    }

    fn ncols(&self) -> usize {
        self.ncols()
    }

    fn col_dot(&self, j: usize, v: ArrayView1<f64>) -> f64 {
        self.column(j).dot(&v)
    }

    fn col_weighted_sq_norm(&self, j: usize, w: ArrayView1<f64>) -> f64 {
        self.column(j)
            .iter()
            .zip(w.iter())
            .map(|(x, w)| x * x * w)
            .sum()
    }

    fn col_weighted_sum(&self, j: usize, w: ArrayView1<f64>) -> f64 {
        self.column(j).dot(&w)
    }

    fn add_scaled_col(&self, j: usize, coef: f64, out: &mut Array1<f64>) {
        out.zip_mut_with(&self.column(j), |o, x| *o += coef * x);
    }

    fn col_for_each(&self, j: usize, mut f: impl FnMut(usize, f64)) {
        for (i, x) in self.column(j).iter().enumerate() {
            f(i, *x);
        }
    }

    fn subset_rows(&self, rows: &[usize]) -> Self {
        self.select(Axis(0), rows)
    }
}

impl DesignMatrix for CsMat<f64> {
    fn nrows(&self) -> usize {
        self.rows()
    }

    fn ncols(&self) -> usize {
        self.cols()
    }

    fn col_dot(&self, j: usize, v: ArrayView1<f64>) -> f64 {
        debug_assert!(self.is_csc());
        match self.outer_view(j) {
            Some(col) => col.iter().map(|(i, x)| x * v[i]).sum(),
            None => 0.0,
        }
    }

    fn col_weighted_sq_norm(&self, j: usize, w: ArrayView1<f64>) -> f64 {
        debug_assert!(self.is_csc());
        match self.outer_view(j) {
            Some(col) => col.iter().map(|(i, x)| x * x * w[i]).sum(),
            None => 0.0,
        }
    }

    fn col_weighted_sum(&self, j: usize, w: ArrayView1<f64>) -> f64 {
        debug_assert!(self.is_csc());
        match self.outer_view(j) {
            Some(col) => col.iter().map(|(i, x)| x * w[i]).sum(),
            None => 0.0,
        }
    }

    fn add_scaled_col(&self, j: usize, coef: f64, out: &mut Array1<f64>) {
        debug_assert!(self.is_csc());
        if let Some(col) = self.outer_view(j) {
            for (i, x) in col.iter() {
                out[i] += coef * x;
            }
        }
    }

    fn col_for_each(&self, j: usize, mut f: impl FnMut(usize, f64)) {
        debug_assert!(self.is_csc());
        if let Some(col) = self.outer_view(j) {
            for (i, x) in col.iter() {
                f(i, *x);
            }
        }
    }

    fn subset_rows(&self, rows: &[usize]) -> Self {
        let mut position = vec![usize::MAX; self.rows()];
        for (new, &old) in rows.iter().enumerate() {
            position[old] = new;
        }
        let mut triplets = TriMat::new((rows.len(), self.cols()));
        for j in 0..self.cols() {
            if let Some(col) = self.outer_view(j) {
                for (i, x) in col.iter() {
                    if position[i] != usize::MAX {
                        triplets.add_triplet(position[i], j, *x);
                    }
                }
            }
        }
        triplets.to_csc()
    }
}

/// Gradient of the data-fitting term, `-X^T v / n`, in the centered and
/// scaled frame when standardization is active. `v` is the (possibly
/// weighted) residual-like vector of the calling context.
pub fn compute_gradient<M: DesignMatrix>(
    x: &M,
    v: ArrayView1<f64>,
    x_centers: &Array1<f64>,
    x_scales: &Array1<f64>,
    standardize: bool,
) -> Array1<f64> {
    let n = x.nrows() as f64;
    let p = x.ncols();
    let mut gradient = Array1::zeros(p);
    if standardize {
        let v_sum = v.sum();
        for j in 0..p {
            gradient[j] = -(x.col_dot(j, v) - x_centers[j] * v_sum) / (x_scales[j] * n);
        }
    } else {
        for j in 0..p {
            gradient[j] = -x.col_dot(j, v) / n;
        }
    }
    gradient
}

/// `z - X * beta` in the centered/scaled frame: columns are divided by
/// their scale and the centering contribution is folded into a scalar
/// offset, so sparse designs stay sparse.
pub fn compute_residual<M: DesignMatrix>(
    x: &M,
    z: ArrayView1<f64>,
    beta: &Array1<f64>,
    x_centers: &Array1<f64>,
    x_scales: &Array1<f64>,
    standardize: bool,
) -> Array1<f64> {
    let mut xb = Array1::zeros(x.nrows());
    let mut offset = 0.0;
    for j in 0..beta.len() {
        if beta[j] != 0.0 {
            if standardize {
                x.add_scaled_col(j, beta[j] / x_scales[j], &mut xb);
                offset += x_centers[j] * beta[j] / x_scales[j];
            } else {
                x.add_scaled_col(j, beta[j], &mut xb);
            }
        }
    }
    let mut out = z.to_owned();
    out -= &xb;
    out += offset;
    out
}
