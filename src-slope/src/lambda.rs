//! Generators and validation for the lambda weight sequence and the alpha
//! grid of the regularization path.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::str::FromStr;

use crate::error::{Result, SlopeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LambdaType {
    /// Benjamini-Hochberg shape: `lambda_j = qnorm(1 - q * (j + 1) / (2p))`.
    Bh,
    /// Caller-supplied sequence.
    User,
    /// Two-parameter linear shape: `lambda_j = q * (1 + gamma * (p - j - 1))`.
    Oscar,
}

impl FromStr for LambdaType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bh" => Ok(LambdaType::Bh),
            "user" => Ok(LambdaType::User),
            "oscar" => Ok(LambdaType::Oscar),
            _ => Err(format!("unknown lambda_type: {}", s)),
        }
    }
}

/// Generates the lambda sequence for `p` predictors.
pub fn lambda_sequence(p: usize, lambda_type: LambdaType, q: f64, gamma: f64) -> Result<Array1<f64>> {
    match lambda_type {
        LambdaType::Bh => {
            if !(q > 0.0 && q < 1.0) {
                return Err(SlopeError::Domain(format!("q must be in (0, 1), got {}", q)));
            }
            let normal = Normal::new(0.0, 1.0).unwrap();
            let pf = p as f64;
            Ok(Array1::from_shape_fn(p, |j| {
                normal.inverse_cdf(1.0 - (j as f64 + 1.0) * q / (2.0 * pf))
            }))
        }
        LambdaType::Oscar => {
            if !(q > 0.0 && q < 1.0) {
                return Err(SlopeError::Domain(format!("q must be in (0, 1), got {}", q)));
            }
            if !(gamma > 0.0 && gamma.is_finite()) {
                return Err(SlopeError::Domain(format!(
                    "gamma must be positive and finite, got {}",
                    gamma
                )));
            }
            Ok(Array1::from_shape_fn(p, |j| {
                q * (1.0 + gamma * (p - j - 1) as f64)
            }))
        }
        LambdaType::User => Err(SlopeError::Domain(
            "lambda_type \"user\" requires an explicit lambda sequence".to_string(),
        )),
    }
}

/// Validates a caller-supplied lambda sequence: length p, finite,
/// non-negative and non-increasing.
pub fn validate_lambda(lambda: &Array1<f64>, p: usize) -> Result<()> {
    if lambda.len() != p {
        return Err(SlopeError::ShapeMismatch(format!(
            "lambda length {} does not match {} predictors",
            lambda.len(),
            p
        )));
    }
    if lambda.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(SlopeError::Domain(
            "lambda must be non-negative and finite".to_string(),
        ));
    }
    if lambda.windows(2).into_iter().any(|w| w[0] < w[1]) {
        return Err(SlopeError::Domain("lambda must be non-increasing".to_string()));
    }
    Ok(())
}

/// Geometric alpha grid from `alpha_max` down to
/// `alpha_max * alpha_min_ratio`.
pub fn alpha_grid(alpha_max: f64, alpha_min_ratio: f64, path_length: usize) -> Array1<f64> {
    if path_length == 1 {
        return Array1::from(vec![alpha_max]);
    }
    let div = (path_length - 1) as f64;
    Array1::from_shape_fn(path_length, |i| {
        alpha_max * alpha_min_ratio.powf(i as f64 / div)
    })
}

/// The default `alpha_min_ratio` of the automatic path.
pub fn default_alpha_min_ratio(n: usize, p: usize) -> f64 {
    if n > p { 1e-4 } else { 1e-2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn bh_sequence_is_positive_and_decreasing() {
        let lambda = lambda_sequence(20, LambdaType::Bh, 0.1, 1.0).unwrap();
        assert_eq!(lambda.len(), 20);
        assert!(lambda.iter().all(|&l| l > 0.0 && l.is_finite()));
        for w in lambda.windows(2) {
            assert!(w[0] > w[1]);
        }
        // spot check against the standard normal quantile
        let normal = Normal::new(0.0, 1.0).unwrap();
        assert!((lambda[0] - normal.inverse_cdf(1.0 - 0.1 / 40.0)).abs() < 1e-12);
    }

    #[test]
    fn oscar_sequence_shape() {
        let lambda = lambda_sequence(4, LambdaType::Oscar, 0.2, 0.5).unwrap();
        // q * (1 + gamma * (p - j - 1))
        let expected = array![0.5, 0.4, 0.3, 0.2];
        for (l, e) in lambda.iter().zip(expected.iter()) {
            assert!((l - e).abs() < 1e-12);
        }
        assert!(validate_lambda(&lambda, 4).is_ok());
    }

    #[test]
    fn q_domain_is_enforced() {
        assert!(lambda_sequence(5, LambdaType::Bh, 0.0, 1.0).is_err());
        assert!(lambda_sequence(5, LambdaType::Bh, 1.0, 1.0).is_err());
        assert!(lambda_sequence(5, LambdaType::Oscar, 0.5, 0.0).is_err());
    }

    #[test]
    fn user_lambda_validation() {
        assert!(validate_lambda(&array![3.0, 2.0, 1.0], 3).is_ok());
        assert!(validate_lambda(&array![3.0, 2.0], 3).is_err());
        assert!(validate_lambda(&array![1.0, 2.0, 3.0], 3).is_err());
        assert!(validate_lambda(&array![1.0, -0.5, 0.0], 3).is_err());
        assert!(validate_lambda(&array![f64::INFINITY, 1.0, 0.0], 3).is_err());
    }

    #[test]
    fn alpha_grid_is_geometric() {
        let grid = alpha_grid(2.0, 1e-2, 3);
        assert!((grid[0] - 2.0).abs() < 1e-12);
        assert!((grid[1] - 0.2).abs() < 1e-12);
        assert!((grid[2] - 0.02).abs() < 1e-12);
        assert_eq!(alpha_grid(5.0, 1e-4, 1).len(), 1);
    }
}
