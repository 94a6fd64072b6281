//! Column centering and scaling, and the back-transform of coefficients.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::design::DesignMatrix;
use crate::error::{Result, SlopeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Centering {
    Mean,
    None,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scaling {
    Sd,
    L2,
    None,
    Manual,
}

impl FromStr for Centering {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(Centering::Mean),
            "none" => Ok(Centering::None),
            "manual" => Ok(Centering::Manual),
            _ => Err(format!("unknown centering: {}", s)),
        }
    }
}

impl FromStr for Scaling {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sd" => Ok(Scaling::Sd),
            "l2" => Ok(Scaling::L2),
            "none" => Ok(Scaling::None),
            "manual" => Ok(Scaling::Manual),
            _ => Err(format!("unknown scaling: {}", s)),
        }
    }
}

/// Per-column mean, population standard deviation and quadratic mean, from
/// one Welford pass over the stored entries with a correction for the
/// implicit zeros of sparse columns.
fn column_moments<M: DesignMatrix>(x: &M, j: usize) -> (f64, f64, f64) {
    let n = x.nrows();
    let mut mean = 0.0;
    let mut m2 = 0.0;
    let mut sq_sum = 0.0;
    let mut count = 0usize;

    x.col_for_each(j, |_, v| {
        count += 1;
        let delta = v - mean;
        mean += delta / count as f64;
        m2 += delta * (v - mean);
        sq_sum += v * v;
    });

    // fold in the zeros a sparse column does not store
    while count < n {
        let delta = -mean;
        count += 1;
        mean += delta / count as f64;
        m2 -= mean * delta;
    }

    let nf = n as f64;
    (mean, (m2 / nf).sqrt(), (sq_sum / nf).sqrt())
}

/// Computes the center and scale vectors for the requested modes. Computed
/// scales of zero (constant or empty columns) are replaced by one so such
/// columns drop out of the fit instead of dividing by zero.
pub fn compute_centers_scales<M: DesignMatrix>(
    x: &M,
    centering: Centering,
    scaling: Scaling,
    manual_centers: Option<&Array1<f64>>,
    manual_scales: Option<&Array1<f64>>,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let p = x.ncols();

    let mut centers = Array1::zeros(p);
    let mut scales = Array1::ones(p);

    let needs_moments =
        centering == Centering::Mean || scaling == Scaling::Sd || scaling == Scaling::L2;

    for j in 0..p {
        let (mean, sd, rms) = if needs_moments {
            column_moments(x, j)
        } else {
            (0.0, 1.0, 1.0)
        };
        match centering {
            Centering::Mean => centers[j] = mean,
            Centering::None | Centering::Manual => {}
        }
        match scaling {
            Scaling::Sd => scales[j] = sd,
            Scaling::L2 => scales[j] = rms,
            Scaling::None | Scaling::Manual => {}
        }
    }

    if centering == Centering::Manual {
        let user = manual_centers.ok_or_else(|| {
            SlopeError::Domain("manual centering requires an explicit centers vector".to_string())
        })?;
        if user.len() != p {
            return Err(SlopeError::ShapeMismatch(format!(
                "centers length {} does not match {} predictors",
                user.len(),
                p
            )));
        }
        if user.iter().any(|v| !v.is_finite()) {
            return Err(SlopeError::Domain("centers must be finite".to_string()));
        }
        centers.assign(user);
    }

    if scaling == Scaling::Manual {
        let user = manual_scales.ok_or_else(|| {
            SlopeError::Domain("manual scaling requires an explicit scales vector".to_string())
        })?;
        if user.len() != p {
            return Err(SlopeError::ShapeMismatch(format!(
                "scales length {} does not match {} predictors",
                user.len(),
                p
            )));
        }
        if user.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(SlopeError::Domain("scales must be finite and positive".to_string()));
        }
        scales.assign(user);
    }

    for s in scales.iter_mut() {
        if *s == 0.0 || !s.is_finite() {
            *s = 1.0;
        }
    }

    Ok((centers, scales))
}

/// Maps coefficients fitted in the centered/scaled frame back to the
/// original frame: divides by the scales and moves the centering
/// contribution into the intercept.
pub fn rescale_coefficients(
    beta0: f64,
    beta: &Array1<f64>,
    x_centers: &Array1<f64>,
    x_scales: &Array1<f64>,
    intercept: bool,
) -> (f64, Array1<f64>) {
    let mut out = beta.clone();
    let mut center_sum = 0.0;
    for j in 0..out.len() {
        out[j] /= x_scales[j];
        center_sum += x_centers[j] * out[j];
    }
    let beta0_out = if intercept { beta0 - center_sum } else { beta0 };
    (beta0_out, out)
}
