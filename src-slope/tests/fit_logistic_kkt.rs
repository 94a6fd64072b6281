use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slopefit::{Centering, LossFamily, Scaling, Slope, SlopeConfigBuilder, SortedL1Norm};
use statrs::distribution::{ContinuousCDF, Normal};

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[test]
fn test_logistic_fit_satisfies_kkt_conditions() {
    let n = 80;
    let p = 6;
    let mut rng = StdRng::seed_from_u64(91);
    let normal = Normal::new(0.0, 1.0).unwrap();

    let x = Array2::from_shape_fn((n, p), |_| {
        normal.inverse_cdf(rng.random_range(1e-9..1.0 - 1e-9))
    });
    // two equal-magnitude active coordinates
    let mut beta_true = Array1::zeros(p);
    beta_true[0] = 1.5;
    beta_true[1] = -1.5;

    let eta_true = x.dot(&beta_true);
    let mut y = Array2::zeros((n, 1));
    for i in 0..n {
        let u: f64 = rng.random_range(0.0..1.0);
        y[[i, 0]] = if u < sigmoid(eta_true[i]) { 1.0 } else { 0.0 };
    }

    let model = Slope::new(
        SlopeConfigBuilder::new()
            .loss(LossFamily::Logistic)
            .centering(Centering::None)
            .scaling(Scaling::None)
            .tol(1e-8)
            .build(),
    );

    let lambda = slopefit::lambda::lambda_sequence(
        p,
        slopefit::LambdaType::Bh,
        0.1,
        1.0,
    )
    .unwrap();
    let alpha = 0.02;
    let fit = model.fit(&x, &y, alpha, Some(&lambda)).unwrap();

    // KKT: the gradient of the loss at the solution lies in the
    // subdifferential of the penalty, i.e. its dual norm is at most one
    let beta_hat = fit.coefficients.to_dense();
    let mut eta = Array1::from_elem(n, fit.intercepts[0]);
    for j in 0..p {
        if beta_hat[[j, 0]] != 0.0 {
            for i in 0..n {
                eta[i] += x[[i, j]] * beta_hat[[j, 0]];
            }
        }
    }

    let mut gradient = Array1::zeros(p);
    for j in 0..p {
        let mut acc = 0.0;
        for i in 0..n {
            acc += x[[i, j]] * (y[[i, 0]] - sigmoid(eta[i]));
        }
        gradient[j] = -acc / n as f64;
    }

    let mut penalty = SortedL1Norm::new(lambda);
    penalty.set_alpha(alpha);
    let dual_norm = penalty.dual_norm(gradient.view());
    assert!(
        dual_norm <= 1.0 + 0.02,
        "stationarity violated: dual norm {}",
        dual_norm
    );

    // the unpenalized intercept is at its optimum
    let grad_intercept: f64 =
        (0..n).map(|i| y[[i, 0]] - sigmoid(eta[i])).sum::<f64>() / n as f64;
    assert!(grad_intercept.abs() < 1e-3);

    // something was selected at this alpha
    assert!(fit.coefficients.nnz() >= 2);
}
