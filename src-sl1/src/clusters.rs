//! Partition of coefficient indices by equal absolute value.

use ndarray::ArrayView1;

use crate::math::sort_index;

/// The clusters of a coefficient vector: maximal sets of indices sharing the
/// same `|beta_j|`, ordered by strictly decreasing magnitude.
///
/// Three parallel arrays hold the state: `c` has one magnitude per cluster,
/// `ind` the member indices of all clusters concatenated, and `ptr` the
/// cluster boundaries in `ind` (`ptr.len() == c.len() + 1`). Indices with
/// `beta_j == 0` form a single terminal zero cluster.
#[derive(Debug, Clone)]
pub struct Clusters {
    c: Vec<f64>,
    ind: Vec<usize>,
    ptr: Vec<usize>,
}

impl Clusters {
    pub fn new(beta: ArrayView1<f64>) -> Self {
        let mut out = Self {
            c: Vec::new(),
            ind: Vec::new(),
            ptr: Vec::new(),
        };
        out.rebuild(beta);
        out
    }

    /// Recomputes the partition from scratch, e.g. after a proximal step
    /// changed the sparsity and ordering pattern arbitrarily.
    pub fn rebuild(&mut self, beta: ArrayView1<f64>) {
        let beta_abs: Vec<f64> = beta.iter().map(|b| b.abs()).collect();
        let ord = sort_index(&beta_abs, true);

        self.c.clear();
        self.ind.clear();
        self.ptr.clear();

        self.ptr.push(0);
        for (rank, &idx) in ord.iter().enumerate() {
            let mag = beta_abs[idx];
            if rank == 0 || mag != *self.c.last().unwrap_or(&f64::NAN) {
                self.c.push(mag);
                if rank > 0 {
                    self.ptr.push(rank);
                }
            }
            self.ind.push(idx);
        }
        self.ptr.push(self.ind.len());
    }

    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.c.len()
    }

    pub fn is_empty(&self) -> bool {
        self.c.is_empty()
    }

    /// Magnitude of cluster `i`.
    pub fn coeff(&self, i: usize) -> f64 {
        self.c[i]
    }

    /// Overwrites the magnitude of cluster `i` without reordering. The
    /// caller is responsible for keeping the ordering invariant; the solver
    /// uses this when cluster updates are disabled and relies on the next
    /// full rebuild to restore order.
    pub fn set_coeff(&mut self, i: usize, x: f64) {
        self.c[i] = x;
    }

    pub fn cluster_size(&self, i: usize) -> usize {
        self.ptr[i + 1] - self.ptr[i]
    }

    /// First position of cluster `i` in the concatenated index array, i.e.
    /// the number of coefficients in clusters of larger magnitude.
    pub fn pointer(&self, i: usize) -> usize {
        self.ptr[i]
    }

    /// Member indices of cluster `i`.
    pub fn members(&self, i: usize) -> &[usize] {
        &self.ind[self.ptr[i]..self.ptr[i + 1]]
    }

    /// Magnitudes of all clusters, in order.
    pub fn coeffs(&self) -> &[f64] {
        &self.c
    }

    /// All member indices, concatenated in cluster order.
    pub fn indices(&self) -> &[usize] {
        &self.ind
    }

    pub fn pointers(&self) -> &[usize] {
        &self.ptr
    }

    /// Number of clusters with non-zero magnitude.
    pub fn n_nonzero(&self) -> usize {
        match self.c.last() {
            Some(&last) if last == 0.0 => self.c.len() - 1,
            Some(_) => self.c.len(),
            None => 0,
        }
    }

    /// Applies the result of a single-cluster update: the cluster at
    /// `old_index` takes magnitude `c_new` and rank `new_index`.
    ///
    /// When `c_new` equals the magnitude of the cluster currently at
    /// `new_index`, the two are merged and the cluster count drops by one;
    /// otherwise the cluster is re-ranked with its members intact. A no-op
    /// when the magnitude is unchanged.
    pub fn update(&mut self, old_index: usize, new_index: usize, c_new: f64) {
        let c_old = self.c[old_index];
        if c_new == c_old {
            return;
        }
        if old_index != new_index && c_new == self.c[new_index] {
            self.merge(old_index, new_index);
        } else {
            self.c[old_index] = c_new;
            if old_index != new_index {
                self.reorder(old_index, new_index);
            }
        }
    }

    fn sizes(&self) -> Vec<usize> {
        self.ptr.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn rebuild_ptr(&mut self, sizes: &[usize]) {
        self.ptr.clear();
        self.ptr.push(0);
        let mut acc = 0;
        for s in sizes {
            acc += s;
            self.ptr.push(acc);
        }
    }

    fn reorder(&mut self, old_index: usize, new_index: usize) {
        let mut sizes = self.sizes();
        let start = self.ptr[old_index];
        let len = sizes[old_index];

        let block: Vec<usize> = self.ind.drain(start..start + len).collect();
        let mag = self.c.remove(old_index);
        sizes.remove(old_index);

        self.c.insert(new_index, mag);
        sizes.insert(new_index, len);
        let pos: usize = sizes[..new_index].iter().sum();
        self.ind.splice(pos..pos, block);

        self.rebuild_ptr(&sizes);
    }

    fn merge(&mut self, old_index: usize, new_index: usize) {
        let mut sizes = self.sizes();
        let start = self.ptr[old_index];
        let len = sizes[old_index];

        let block: Vec<usize> = self.ind.drain(start..start + len).collect();
        self.c.remove(old_index);
        sizes.remove(old_index);

        let target = if new_index > old_index {
            new_index - 1
        } else {
            new_index
        };
        sizes[target] += len;
        let before: usize = sizes[..target].iter().sum();
        let insert_at = before + sizes[target] - len;
        self.ind.splice(insert_at..insert_at, block);

        self.rebuild_ptr(&sizes);
    }
}
