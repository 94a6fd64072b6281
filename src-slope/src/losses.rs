//! Loss families: value, dual, residual, IRLS reweighting and prediction.
//!
//! The set is closed by design (a tagged enum rather than trait objects):
//! quadratic for Gaussian regression, logistic for binomial responses in
//! {0,1} coding, and poisson with the log link. All losses are mean losses,
//! i.e. scaled by 1/n, and the duals are the negated mean Fenchel conjugates
//! evaluated at the scaled residual, so the duality gap is non-negative for
//! any dual-feasible point.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// probability clamp for the logistic IRLS weights
const P_MIN: f64 = 1e-5;
// floor for poisson means
const MU_MIN: f64 = 1e-10;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// log(1 + e^x) without overflow for large |x|
fn log1p_exp(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

fn xlogx(x: f64) -> f64 {
    if x > 0.0 { x * x.ln() } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossFamily {
    Quadratic,
    Logistic,
    Poisson,
}

impl FromStr for LossFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quadratic" | "gaussian" => Ok(LossFamily::Quadratic),
            "logistic" | "binomial" => Ok(LossFamily::Logistic),
            "poisson" => Ok(LossFamily::Poisson),
            "multinomial" => Err(
                "multinomial loss is not supported: the penalty applies to a \
                 single coefficient column"
                    .to_string(),
            ),
            _ => Err(format!("unknown loss: {}", s)),
        }
    }
}

impl LossFamily {
    /// The data-fitting part of the objective at linear predictor `eta`.
    pub fn value(&self, eta: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
        let n = y.len() as f64;
        match self {
            LossFamily::Quadratic => {
                eta.iter()
                    .zip(y.iter())
                    .map(|(e, y)| (e - y) * (e - y))
                    .sum::<f64>()
                    / (2.0 * n)
            }
            LossFamily::Logistic => {
                eta.iter()
                    .zip(y.iter())
                    .map(|(e, y)| log1p_exp(*e) - y * e)
                    .sum::<f64>()
                    / n
            }
            LossFamily::Poisson => {
                eta.iter()
                    .zip(y.iter())
                    .map(|(e, y)| e.exp() - y * e)
                    .sum::<f64>()
                    / n
            }
        }
    }

    /// The dual objective at the scaled residual `theta`.
    pub fn dual(&self, theta: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
        let n = y.len() as f64;
        match self {
            LossFamily::Quadratic => {
                let y_norm: f64 = y.iter().map(|v| v * v).sum();
                let diff_norm: f64 = theta
                    .iter()
                    .zip(y.iter())
                    .map(|(t, y)| (y - t) * (y - t))
                    .sum();
                (y_norm - diff_norm) / (2.0 * n)
            }
            LossFamily::Logistic => {
                -theta
                    .iter()
                    .zip(y.iter())
                    .map(|(t, y)| {
                        let u = (y - t).clamp(P_MIN, 1.0 - P_MIN);
                        xlogx(u) + xlogx(1.0 - u)
                    })
                    .sum::<f64>()
                    / n
            }
            LossFamily::Poisson => {
                -theta
                    .iter()
                    .zip(y.iter())
                    .map(|(t, y)| {
                        let u = (y - t).max(MU_MIN);
                        xlogx(u) - u
                    })
                    .sum::<f64>()
                    / n
            }
        }
    }

    /// Negative gradient of the loss in `eta`: `y - mean_response(eta)`.
    pub fn residual(&self, eta: ArrayView1<f64>, y: ArrayView1<f64>) -> Array1<f64> {
        match self {
            LossFamily::Quadratic => &y - &eta,
            LossFamily::Logistic => Array1::from_shape_fn(y.len(), |i| y[i] - sigmoid(eta[i])),
            LossFamily::Poisson => Array1::from_shape_fn(y.len(), |i| y[i] - eta[i].exp()),
        }
    }

    /// One IRLS linearization: overwrites the weights and working response.
    pub fn update_weights(
        &self,
        w: &mut Array1<f64>,
        z: &mut Array1<f64>,
        eta: ArrayView1<f64>,
        y: ArrayView1<f64>,
    ) {
        match self {
            LossFamily::Quadratic => {
                w.fill(1.0);
                z.assign(&y);
            }
            LossFamily::Logistic => {
                for i in 0..y.len() {
                    let p = sigmoid(eta[i]).clamp(P_MIN, 1.0 - P_MIN);
                    w[i] = p * (1.0 - p);
                    z[i] = eta[i] + (y[i] - p) / w[i];
                }
            }
            LossFamily::Poisson => {
                for i in 0..y.len() {
                    let mu = eta[i].exp().max(MU_MIN);
                    w[i] = mu;
                    z[i] = eta[i] + (y[i] - mu) / mu;
                }
            }
        }
    }

    /// Mean response at linear predictor `eta`.
    pub fn predict(&self, eta: ArrayView1<f64>) -> Array1<f64> {
        match self {
            LossFamily::Quadratic => eta.to_owned(),
            LossFamily::Logistic => eta.mapv(sigmoid),
            LossFamily::Poisson => eta.mapv(f64::exp),
        }
    }

    /// Intercept of the null (intercept-only) model.
    pub fn null_intercept(&self, y: ArrayView1<f64>) -> f64 {
        let mean = y.sum() / y.len() as f64;
        match self {
            LossFamily::Quadratic => mean,
            LossFamily::Logistic => {
                let p = mean.clamp(P_MIN, 1.0 - P_MIN);
                (p / (1.0 - p)).ln()
            }
            LossFamily::Poisson => mean.max(MU_MIN).ln(),
        }
    }

    /// Model deviance at `eta`: twice the log-likelihood gap to the
    /// saturated model.
    pub fn deviance(&self, eta: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
        match self {
            LossFamily::Quadratic => eta
                .iter()
                .zip(y.iter())
                .map(|(e, y)| (y - e) * (y - e))
                .sum(),
            LossFamily::Logistic => {
                // saturated log-likelihood is zero for y in {0,1}
                2.0 * y.len() as f64 * self.value(eta, y)
            }
            LossFamily::Poisson => {
                2.0 * eta
                    .iter()
                    .zip(y.iter())
                    .map(|(e, y)| {
                        let mu = e.exp();
                        let fit = if *y > 0.0 { y * (y.ln() - e) } else { 0.0 };
                        fit - (y - mu)
                    })
                    .sum::<f64>()
            }
        }
    }

    /// Checks that a response column lies in the loss's domain.
    pub fn validate_response(&self, y: ArrayView1<f64>) -> Result<(), String> {
        if y.iter().any(|v| !v.is_finite()) {
            return Err("response contains non-finite values".to_string());
        }
        match self {
            LossFamily::Quadratic => Ok(()),
            LossFamily::Logistic => {
                if y.iter().all(|&v| v == 0.0 || v == 1.0) {
                    Ok(())
                } else {
                    Err("logistic loss requires responses in {0, 1}".to_string())
                }
            }
            LossFamily::Poisson => {
                if y.iter().all(|&v| v >= 0.0) {
                    Ok(())
                } else {
                    Err("poisson loss requires non-negative responses".to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn parse_aliases() {
        assert_eq!("gaussian".parse::<LossFamily>(), Ok(LossFamily::Quadratic));
        assert_eq!("Logistic".parse::<LossFamily>(), Ok(LossFamily::Logistic));
        assert_eq!("poisson".parse::<LossFamily>(), Ok(LossFamily::Poisson));
        assert!("multinomial".parse::<LossFamily>().is_err());
        assert!("huber".parse::<LossFamily>().is_err());
    }

    #[test]
    fn quadratic_dual_touches_primal_at_optimum() {
        let y = array![1.0, -2.0, 0.5];
        let eta = array![0.0, 0.0, 0.0];
        let loss = LossFamily::Quadratic;
        let residual = loss.residual(eta.view(), y.view());
        // with theta equal to the residual, primal loss == dual
        let primal = loss.value(eta.view(), y.view());
        let dual = loss.dual(residual.view(), y.view());
        assert!((primal - dual).abs() < 1e-12);
    }

    #[test]
    fn logistic_value_is_stable_for_large_eta() {
        let y = array![1.0, 0.0];
        let eta = array![800.0, -800.0];
        let v = LossFamily::Logistic.value(eta.view(), y.view());
        assert!(v.is_finite());
        assert!(v < 1e-10);
    }

    #[test]
    fn logistic_dual_gap_nonnegative() {
        let y = array![1.0, 0.0, 1.0, 1.0];
        let loss = LossFamily::Logistic;
        for eta0 in [-2.0, -0.5, 0.0, 0.5, 2.0] {
            let eta = Array1::from_elem(4, eta0);
            let primal = loss.value(eta.view(), y.view());
            let theta = loss.residual(eta.view(), y.view());
            let dual = loss.dual(theta.view(), y.view());
            assert!(primal - dual >= -1e-12, "gap negative at eta={}", eta0);
        }
    }

    #[test]
    fn logistic_gap_closes_at_interior_optimum() {
        // y split evenly, eta at the logit of the mean: gradient vanishes
        let y = array![1.0, 0.0, 1.0, 0.0];
        let loss = LossFamily::Logistic;
        let eta = Array1::from_elem(4, loss.null_intercept(y.view()));
        let primal = loss.value(eta.view(), y.view());
        let theta = loss.residual(eta.view(), y.view());
        let dual = loss.dual(theta.view(), y.view());
        assert!((primal - dual).abs() < 1e-9);
    }

    #[test]
    fn poisson_irls_weights_are_the_mean() {
        let y = array![0.0, 2.0, 5.0];
        let eta = array![0.1, 0.5, 1.5];
        let mut w = Array1::zeros(3);
        let mut z = Array1::zeros(3);
        LossFamily::Poisson.update_weights(&mut w, &mut z, eta.view(), y.view());
        for i in 0..3 {
            let mu: f64 = eta[i].exp();
            assert!((w[i] - mu).abs() < 1e-12);
            assert!((z[i] - (eta[i] + (y[i] - mu) / mu)).abs() < 1e-12);
        }
    }

    #[test]
    fn deviance_zero_at_perfect_fit() {
        let y = array![1.0, 2.0, 3.0];
        assert!(LossFamily::Quadratic.deviance(y.view(), y.view()).abs() < 1e-12);

        let yp = array![1.0, 2.0, 3.0];
        let eta = yp.mapv(f64::ln);
        assert!(LossFamily::Poisson.deviance(eta.view(), yp.view()).abs() < 1e-12);
    }

    #[test]
    fn response_validation() {
        assert!(LossFamily::Logistic
            .validate_response(array![0.0, 1.0, 1.0].view())
            .is_ok());
        assert!(LossFamily::Logistic
            .validate_response(array![0.0, 2.0].view())
            .is_err());
        assert!(LossFamily::Poisson
            .validate_response(array![0.0, 3.0].view())
            .is_ok());
        assert!(LossFamily::Poisson
            .validate_response(array![-1.0].view())
            .is_err());
        assert!(LossFamily::Quadratic
            .validate_response(array![f64::NAN].view())
            .is_err());
    }

    #[test]
    fn null_intercept_links() {
        let y = array![0.0, 1.0, 1.0, 1.0];
        let b0 = LossFamily::Logistic.null_intercept(y.view());
        assert!((sigmoid(b0) - 0.75).abs() < 1e-9);

        let y = array![2.0, 4.0];
        let b0 = LossFamily::Poisson.null_intercept(y.view());
        assert!((b0.exp() - 3.0).abs() < 1e-9);
    }
}
