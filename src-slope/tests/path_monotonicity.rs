use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slopefit::{Slope, SlopeConfigBuilder};
use statrs::distribution::{ContinuousCDF, Normal};

fn seeded_design(seed: u64, n: usize, p: usize) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    Array2::from_shape_fn((n, p), |_| {
        normal.inverse_cdf(rng.random_range(1e-9..1.0 - 1e-9))
    })
}

#[test]
fn test_auto_path_starts_empty_and_grows() {
    let n = 50;
    let p = 20;
    let x = seeded_design(2024, n, p);

    let mut rng = StdRng::seed_from_u64(7);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut beta_true = Array1::zeros(p);
    for j in 0..5 {
        beta_true[j] = 1.0 + j as f64 * 0.3;
    }
    let noise = Array1::from_shape_fn(n, |_| {
        normal.inverse_cdf(rng.random_range(1e-9..1.0 - 1e-9))
    });
    let y_col = x.dot(&beta_true) + &(noise * 0.5);
    let mut y = Array2::zeros((n, 1));
    y.column_mut(0).assign(&y_col);

    let model = Slope::new(SlopeConfigBuilder::new().path_length(20).build());
    let path = model.path(&x, &y, None, None).unwrap();

    assert!(!path.diverged);
    assert!(path.n_steps() >= 2);

    let counts: Vec<usize> = (0..path.n_steps())
        .map(|k| path.coefficients[k].nnz())
        .collect();

    // nothing active at alpha_max
    assert_eq!(counts[0], 0, "path must start from the empty model");
    // the support grows down the path, modulo an occasional re-clustering
    for k in 1..counts.len() {
        assert!(
            counts[k] + 1 >= counts[k - 1],
            "support shrank from {} to {} at step {}",
            counts[k - 1],
            counts[k],
            k
        );
    }
    assert!(*counts.last().unwrap() > 0);

    // alphas are strictly decreasing
    for k in 1..path.n_steps() {
        assert!(path.alphas[k] < path.alphas[k - 1]);
    }

    // convergence certificates along the way
    for k in 0..path.n_steps() {
        assert!(path.gaps[k].is_finite());
        assert!(path.deviance_ratios[k] >= -1e-12);
    }
}
