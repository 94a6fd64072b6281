use ndarray::Array2;
use slopefit::{Slope, SlopeConfigBuilder};

#[test]
fn test_all_zero_design_yields_null_model() {
    // X carries no information: every path step must keep beta at zero and
    // put the response mean in the intercept
    let x = Array2::<f64>::zeros((10, 5));
    let y = Array2::from_elem((10, 1), 1.0);

    let model = Slope::new(SlopeConfigBuilder::new().path_length(5).build());
    let path = model.path(&x, &y, None, None).unwrap();

    assert!(path.n_steps() >= 1);
    assert!(!path.diverged);
    for k in 0..path.n_steps() {
        assert_eq!(path.coefficients[k].nnz(), 0, "step {} has non-zero coefficients", k);
        assert!((path.intercepts[[0, k]] - 1.0).abs() < 1e-10);
    }
}

#[test]
fn test_null_model_without_intercept() {
    let x = Array2::<f64>::zeros((6, 3));
    let y = Array2::from_elem((6, 1), 1.0);

    let model = Slope::new(
        SlopeConfigBuilder::new()
            .intercept(false)
            .path_length(3)
            .build(),
    );
    let path = model.path(&x, &y, None, None).unwrap();

    for k in 0..path.n_steps() {
        assert_eq!(path.coefficients[k].nnz(), 0);
        assert_eq!(path.intercepts[[0, k]], 0.0);
    }
}

#[test]
fn test_multi_column_response() {
    let x = Array2::<f64>::zeros((8, 4));
    let mut y = Array2::zeros((8, 2));
    y.column_mut(0).fill(1.0);
    y.column_mut(1).fill(-2.0);

    let model = Slope::new(SlopeConfigBuilder::new().path_length(3).build());
    let fit = model.fit(&x, &y, 0.5, None).unwrap();

    assert_eq!(fit.intercepts.len(), 2);
    assert!((fit.intercepts[0] - 1.0).abs() < 1e-10);
    assert!((fit.intercepts[1] + 2.0).abs() < 1e-10);
    assert_eq!(fit.coefficients.nnz(), 0);

    let eta = fit.linear_predictor(&x);
    assert_eq!(eta.dim(), (8, 2));
    assert!((eta[[3, 1]] + 2.0).abs() < 1e-10);
}
