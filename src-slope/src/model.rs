//! The public model: configuration, fitting entry points and result types.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use std::str::FromStr;

use crate::design::DesignMatrix;
use crate::error::{Result, SlopeError};
use crate::lambda::{
    alpha_grid, default_alpha_min_ratio, lambda_sequence, validate_lambda, LambdaType,
};
use crate::losses::LossFamily;
use crate::solver::{alpha_max_for_column, fit_path_column, ColumnPath, InnerSolver};
use crate::standardize::{compute_centers_scales, Centering, Scaling};

/// Inner solver strategy. `Auto` picks the hybrid scheme except for the
/// poisson loss, whose curvature makes the plain FISTA loop more robust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    Auto,
    Hybrid,
    Fista,
}

impl FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(SolverKind::Auto),
            "hybrid" => Ok(SolverKind::Hybrid),
            "fista" => Ok(SolverKind::Fista),
            _ => Err(format!("unknown solver: {}", s)),
        }
    }
}

impl SolverKind {
    pub(crate) fn resolve(self, loss: LossFamily) -> InnerSolver {
        match self {
            SolverKind::Hybrid => InnerSolver::Hybrid,
            SolverKind::Fista => InnerSolver::Fista,
            SolverKind::Auto => {
                if loss == LossFamily::Poisson {
                    InnerSolver::Fista
                } else {
                    InnerSolver::Hybrid
                }
            }
        }
    }
}

/// Configuration of a SLOPE fit. Construct with [`Default`] or through
/// [`SlopeConfigBuilder`]; the configuration is immutable for the duration
/// of a fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlopeConfig {
    pub intercept: bool,
    pub centering: Centering,
    pub scaling: Scaling,
    /// Explicit centers, required when `centering` is `Manual`.
    pub centers: Option<Array1<f64>>,
    /// Explicit scales, required when `scaling` is `Manual`.
    pub scales: Option<Array1<f64>>,
    pub loss: LossFamily,
    pub solver: SolverKind,
    pub lambda_type: LambdaType,
    /// BH quantile, also the level of the OSCAR shape.
    pub q: f64,
    /// Slope parameter of the OSCAR shape.
    pub gamma: f64,
    /// `None` selects 1e-4 when n > p and 1e-2 otherwise.
    pub alpha_min_ratio: Option<f64>,
    pub path_length: usize,
    /// Stop the automatic path when the non-zero cluster count exceeds
    /// this; `None` is unbounded.
    pub max_clusters: Option<usize>,
    pub tol: f64,
    pub tol_dev_change: f64,
    pub tol_dev_ratio: f64,
    pub max_it: usize,
    pub max_it_outer: usize,
    /// A proximal-gradient step runs every `pgd_freq` inner iterations;
    /// one means pure PGD.
    pub pgd_freq: usize,
    pub learning_rate_decr: f64,
    pub update_clusters: bool,
    pub print_level: u8,
}

impl Default for SlopeConfig {
    fn default() -> Self {
        Self {
            intercept: true,
            centering: Centering::Mean,
            scaling: Scaling::Sd,
            centers: None,
            scales: None,
            loss: LossFamily::Quadratic,
            solver: SolverKind::Auto,
            lambda_type: LambdaType::Bh,
            q: 0.1,
            gamma: 1.0,
            alpha_min_ratio: None,
            path_length: 100,
            max_clusters: None,
            tol: 1e-4,
            tol_dev_change: 1e-5,
            tol_dev_ratio: 0.999,
            max_it: 100_000,
            max_it_outer: 100,
            pgd_freq: 10,
            learning_rate_decr: 0.5,
            update_clusters: true,
            print_level: 0,
        }
    }
}

impl SlopeConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.q > 0.0 && self.q < 1.0) {
            return Err(SlopeError::Domain(format!("q must be in (0, 1), got {}", self.q)));
        }
        if !(self.gamma > 0.0 && self.gamma.is_finite()) {
            return Err(SlopeError::Domain(format!(
                "gamma must be positive and finite, got {}",
                self.gamma
            )));
        }
        if let Some(r) = self.alpha_min_ratio {
            if !(r > 0.0 && r <= 1.0) {
                return Err(SlopeError::Domain(format!(
                    "alpha_min_ratio must be in (0, 1], got {}",
                    r
                )));
            }
        }
        if self.path_length == 0 {
            return Err(SlopeError::Domain("path_length must be positive".to_string()));
        }
        if !(self.tol > 0.0) {
            return Err(SlopeError::Domain(format!("tol must be positive, got {}", self.tol)));
        }
        if !(self.tol_dev_change > 0.0) {
            return Err(SlopeError::Domain(format!(
                "tol_dev_change must be positive, got {}",
                self.tol_dev_change
            )));
        }
        if !(self.tol_dev_ratio > 0.0 && self.tol_dev_ratio < 1.0) {
            return Err(SlopeError::Domain(format!(
                "tol_dev_ratio must be in (0, 1), got {}",
                self.tol_dev_ratio
            )));
        }
        if self.max_it == 0 || self.max_it_outer == 0 || self.pgd_freq == 0 {
            return Err(SlopeError::Domain(
                "max_it, max_it_outer and pgd_freq must be positive".to_string(),
            ));
        }
        if !(self.learning_rate_decr > 0.0 && self.learning_rate_decr < 1.0) {
            return Err(SlopeError::Domain(format!(
                "learning_rate_decr must be in (0, 1), got {}",
                self.learning_rate_decr
            )));
        }
        if self.print_level > 3 {
            return Err(SlopeError::Domain(format!(
                "print_level must be in 0..=3, got {}",
                self.print_level
            )));
        }
        Ok(())
    }
}

/// Fluent builder for [`SlopeConfig`].
pub struct SlopeConfigBuilder {
    cfg: SlopeConfig,
}

impl Default for SlopeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlopeConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: SlopeConfig::default(),
        }
    }
    pub fn intercept(mut self, v: bool) -> Self {
        self.cfg.intercept = v;
        self
    }
    pub fn centering(mut self, v: Centering) -> Self {
        self.cfg.centering = v;
        self
    }
    pub fn scaling(mut self, v: Scaling) -> Self {
        self.cfg.scaling = v;
        self
    }
    pub fn centers(mut self, v: Array1<f64>) -> Self {
        self.cfg.centering = Centering::Manual;
        self.cfg.centers = Some(v);
        self
    }
    pub fn scales(mut self, v: Array1<f64>) -> Self {
        self.cfg.scaling = Scaling::Manual;
        self.cfg.scales = Some(v);
        self
    }
    pub fn loss(mut self, v: LossFamily) -> Self {
        self.cfg.loss = v;
        self
    }
    pub fn solver(mut self, v: SolverKind) -> Self {
        self.cfg.solver = v;
        self
    }
    pub fn lambda_type(mut self, v: LambdaType) -> Self {
        self.cfg.lambda_type = v;
        self
    }
    pub fn q(mut self, v: f64) -> Self {
        self.cfg.q = v;
        self
    }
    pub fn gamma(mut self, v: f64) -> Self {
        self.cfg.gamma = v;
        self
    }
    pub fn alpha_min_ratio(mut self, v: f64) -> Self {
        self.cfg.alpha_min_ratio = Some(v);
        self
    }
    pub fn path_length(mut self, v: usize) -> Self {
        self.cfg.path_length = v;
        self
    }
    pub fn max_clusters(mut self, v: usize) -> Self {
        self.cfg.max_clusters = Some(v);
        self
    }
    pub fn tol(mut self, v: f64) -> Self {
        self.cfg.tol = v;
        self
    }
    pub fn tol_dev_change(mut self, v: f64) -> Self {
        self.cfg.tol_dev_change = v;
        self
    }
    pub fn tol_dev_ratio(mut self, v: f64) -> Self {
        self.cfg.tol_dev_ratio = v;
        self
    }
    pub fn max_it(mut self, v: usize) -> Self {
        self.cfg.max_it = v;
        self
    }
    pub fn max_it_outer(mut self, v: usize) -> Self {
        self.cfg.max_it_outer = v;
        self
    }
    pub fn pgd_freq(mut self, v: usize) -> Self {
        self.cfg.pgd_freq = v;
        self
    }
    pub fn learning_rate_decr(mut self, v: f64) -> Self {
        self.cfg.learning_rate_decr = v;
        self
    }
    pub fn update_clusters(mut self, v: bool) -> Self {
        self.cfg.update_clusters = v;
        self
    }
    pub fn print_level(mut self, v: u8) -> Self {
        self.cfg.print_level = v;
        self
    }
    pub fn build(self) -> SlopeConfig {
        self.cfg
    }
}

/// Result of a single-alpha fit.
#[derive(Debug, Clone)]
pub struct SlopeFit {
    /// One intercept per response column; zero when disabled.
    pub intercepts: Array1<f64>,
    /// Sparse p x m coefficient matrix in the original frame.
    pub coefficients: CsMat<f64>,
    pub lambda: Array1<f64>,
    pub alpha: f64,
    /// Total inner iterations spent.
    pub passes: usize,
    /// Final duality gap; compare against `tol * |primal|` to detect a
    /// non-converged fit.
    pub gap: f64,
    pub deviance_ratio: f64,
}

/// Result of a regularization path fit.
#[derive(Debug, Clone)]
pub struct SlopePath {
    /// The alphas actually fitted; shorter than requested when the path
    /// stopped early.
    pub alphas: Array1<f64>,
    pub lambda: Array1<f64>,
    /// m x K intercepts.
    pub intercepts: Array2<f64>,
    /// One sparse p x m coefficient matrix per path step.
    pub coefficients: Vec<CsMat<f64>>,
    /// Inner iterations per step, summed over response columns.
    pub passes: Vec<usize>,
    /// Final duality gap per step (worst column).
    pub gaps: Vec<f64>,
    /// Deviance ratio per step (mean over columns).
    pub deviance_ratios: Vec<f64>,
    /// True when a NaN/Inf truncated the path.
    pub diverged: bool,
}

impl SlopePath {
    pub fn n_steps(&self) -> usize {
        self.coefficients.len()
    }

    pub fn total_passes(&self) -> usize {
        self.passes.iter().sum()
    }

    /// Linear predictor `X beta_k + beta0_k` for path step `k`.
    pub fn linear_predictor<M: DesignMatrix>(&self, x: &M, step: usize) -> Array2<f64> {
        linear_predictor_from(&self.coefficients[step], self.intercepts.column(step), x)
    }
}

impl SlopeFit {
    /// Linear predictor `X beta + beta0`.
    pub fn linear_predictor<M: DesignMatrix>(&self, x: &M) -> Array2<f64> {
        linear_predictor_from(&self.coefficients, self.intercepts.view(), x)
    }
}

fn linear_predictor_from<M: DesignMatrix>(
    beta: &CsMat<f64>,
    intercepts: ndarray::ArrayView1<f64>,
    x: &M,
) -> Array2<f64> {
    let n = x.nrows();
    let m = beta.cols();
    let mut eta = Array2::zeros((n, m));
    for c in 0..m {
        let mut col = Array1::from_elem(n, intercepts[c]);
        if let Some(view) = beta.outer_view(c) {
            for (j, v) in view.iter() {
                x.add_scaled_col(j, *v, &mut col);
            }
        }
        eta.column_mut(c).assign(&col);
    }
    eta
}

pub(crate) struct ResolvedInputs {
    pub lambda: Array1<f64>,
    pub alphas: Array1<f64>,
    pub auto_alpha: bool,
    pub centers: Array1<f64>,
    pub scales: Array1<f64>,
    pub standardize: bool,
}

/// The SLOPE model: a configuration plus the fitting entry points.
#[derive(Debug, Clone, Default)]
pub struct Slope {
    config: SlopeConfig,
}

impl Slope {
    pub fn new(config: SlopeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SlopeConfig {
        &self.config
    }

    /// Fits the model at a single regularization strength.
    pub fn fit<M: DesignMatrix>(
        &self,
        x: &M,
        y: &Array2<f64>,
        alpha: f64,
        lambda: Option<&Array1<f64>>,
    ) -> Result<SlopeFit> {
        if !(alpha.is_finite() && alpha >= 0.0) {
            return Err(SlopeError::Domain(format!(
                "alpha must be non-negative and finite, got {}",
                alpha
            )));
        }
        let alphas = Array1::from(vec![alpha]);
        let path = self.path(x, y, Some(&alphas), lambda)?;
        if path.n_steps() == 0 {
            return Err(SlopeError::Numerical(
                "fit diverged before completing its only path step".to_string(),
            ));
        }
        Ok(SlopeFit {
            intercepts: path.intercepts.column(0).to_owned(),
            coefficients: path.coefficients.into_iter().next().expect("one step"),
            lambda: path.lambda,
            alpha,
            passes: path.passes[0],
            gap: path.gaps[0],
            deviance_ratio: path.deviance_ratios[0],
        })
    }

    /// Fits the full regularization path. Passing `None` for `alphas`
    /// generates the geometric grid from the data; passing `None` for
    /// `lambda` generates the sequence selected by `lambda_type`.
    pub fn path<M: DesignMatrix>(
        &self,
        x: &M,
        y: &Array2<f64>,
        alphas: Option<&Array1<f64>>,
        lambda: Option<&Array1<f64>>,
    ) -> Result<SlopePath> {
        let resolved = self.resolve_inputs(x, y, alphas, lambda)?;
        let m = y.ncols();
        let solver = self.config.solver.resolve(self.config.loss);
        let allow_early_stop = resolved.auto_alpha && m == 1;

        let columns: Vec<ColumnPath> = (0..m)
            .map(|c| {
                fit_path_column(
                    x,
                    y.column(c),
                    &resolved.alphas,
                    allow_early_stop,
                    &resolved.lambda,
                    &resolved.centers,
                    &resolved.scales,
                    resolved.standardize,
                    &self.config,
                    self.config.loss,
                    solver,
                )
            })
            .collect();

        Ok(assemble_path(x.ncols(), &resolved, columns))
    }

    pub(crate) fn resolve_inputs<M: DesignMatrix>(
        &self,
        x: &M,
        y: &Array2<f64>,
        alphas: Option<&Array1<f64>>,
        lambda: Option<&Array1<f64>>,
    ) -> Result<ResolvedInputs> {
        let n = x.nrows();
        let p = x.ncols();

        if n == 0 || p == 0 {
            return Err(SlopeError::ShapeMismatch(
                "the design matrix must have at least one row and one column".to_string(),
            ));
        }
        if y.nrows() != n {
            return Err(SlopeError::ShapeMismatch(format!(
                "X has {} rows but Y has {}",
                n,
                y.nrows()
            )));
        }
        if y.ncols() == 0 {
            return Err(SlopeError::ShapeMismatch(
                "Y must have at least one column".to_string(),
            ));
        }
        self.config.validate()?;
        for c in 0..y.ncols() {
            self.config
                .loss
                .validate_response(y.column(c))
                .map_err(SlopeError::Domain)?;
        }

        let lambda = match lambda {
            Some(user) => {
                validate_lambda(user, p)?;
                user.clone()
            }
            None => lambda_sequence(p, self.config.lambda_type, self.config.q, self.config.gamma)?,
        };

        let (centers, scales) = compute_centers_scales(
            x,
            self.config.centering,
            self.config.scaling,
            self.config.centers.as_ref(),
            self.config.scales.as_ref(),
        )?;
        let standardize =
            centers.iter().any(|&c| c != 0.0) || scales.iter().any(|&s| s != 1.0);

        let (alphas, auto_alpha) = match alphas {
            Some(user) => {
                if user.is_empty() {
                    return Err(SlopeError::Domain(
                        "the alpha sequence must not be empty".to_string(),
                    ));
                }
                if user.iter().any(|a| !a.is_finite() || *a < 0.0) {
                    return Err(SlopeError::Domain(
                        "alpha values must be non-negative and finite".to_string(),
                    ));
                }
                (user.clone(), false)
            }
            None => {
                let alpha_max = (0..y.ncols())
                    .map(|c| {
                        alpha_max_for_column(
                            x,
                            y.column(c),
                            &lambda,
                            &centers,
                            &scales,
                            standardize,
                            self.config.intercept,
                            self.config.loss,
                        )
                    })
                    .fold(0.0_f64, f64::max);
                let ratio = self
                    .config
                    .alpha_min_ratio
                    .unwrap_or_else(|| default_alpha_min_ratio(n, p));
                (alpha_grid(alpha_max, ratio, self.config.path_length), true)
            }
        };

        Ok(ResolvedInputs {
            lambda,
            alphas,
            auto_alpha,
            centers,
            scales,
            standardize,
        })
    }
}

fn assemble_path(p: usize, resolved: &ResolvedInputs, columns: Vec<ColumnPath>) -> SlopePath {
    let m = columns.len();
    let k_realized = columns.iter().map(|c| c.steps.len()).min().unwrap_or(0);
    let diverged = columns.iter().any(|c| c.failure.is_some());

    let mut intercepts = Array2::zeros((m, k_realized));
    let mut coefficients = Vec::with_capacity(k_realized);
    let mut passes = vec![0usize; k_realized];
    let mut gaps = vec![0.0_f64; k_realized];
    let mut deviance_ratios = vec![0.0_f64; k_realized];

    for k in 0..k_realized {
        let mut triplets = TriMat::new((p, m));
        for (c, column) in columns.iter().enumerate() {
            let step = &column.steps[k];
            intercepts[[c, k]] = step.beta0;
            for j in 0..p {
                if step.beta[j] != 0.0 {
                    triplets.add_triplet(j, c, step.beta[j]);
                }
            }
            passes[k] += step.passes;
            gaps[k] = gaps[k].max(step.gap);
            deviance_ratios[k] += step.deviance_ratio / m as f64;
        }
        coefficients.push(triplets.to_csc());
    }

    SlopePath {
        alphas: resolved
            .alphas
            .iter()
            .take(k_realized)
            .copied()
            .collect::<Vec<f64>>()
            .into(),
        lambda: resolved.lambda.clone(),
        intercepts,
        coefficients,
        passes,
        gaps,
        deviance_ratios,
        diverged,
    }
}
