use ndarray::Array1;
use slopefit_sl1::Clusters;

fn magnitudes_of(cl: &Clusters) -> Array1<f64> {
    let p = *cl.pointers().last().unwrap();
    let mut out = Array1::zeros(p);
    for i in 0..cl.len() {
        for &idx in cl.members(i) {
            out[idx] = cl.coeff(i);
        }
    }
    out
}

fn assert_matches_rebuild(cl: &Clusters) {
    let mags = magnitudes_of(cl);
    let rebuilt = Clusters::new(mags.view());
    assert_eq!(cl.coeffs(), rebuilt.coeffs(), "magnitudes diverge from a fresh rebuild");
    assert_eq!(cl.pointers(), rebuilt.pointers(), "cluster sizes diverge from a fresh rebuild");
    for i in 0..cl.len() {
        let mut a = cl.members(i).to_vec();
        let mut b = rebuilt.members(i).to_vec();
        a.sort();
        b.sort();
        assert_eq!(a, b, "cluster {} membership diverges from a fresh rebuild", i);
    }
}

#[test]
fn test_update_sequence_stays_consistent_with_rebuild() {
    let beta = ndarray::array![5.0, 3.0, 3.0, 1.0, 0.0, 0.0];
    let mut cl = Clusters::new(beta.view());
    assert_eq!(cl.coeffs(), &[5.0, 3.0, 1.0, 0.0]);

    // shrink the top cluster between the pair and the singleton
    cl.update(0, 1, 2.0);
    assert_matches_rebuild(&cl);

    // promote the singleton past everything
    let j = cl
        .coeffs()
        .iter()
        .position(|&c| c == 1.0)
        .expect("singleton still present");
    cl.update(j, 0, 6.0);
    assert_matches_rebuild(&cl);

    // merge the two mid clusters
    let from = cl.coeffs().iter().position(|&c| c == 2.0).unwrap();
    let into = cl.coeffs().iter().position(|&c| c == 3.0).unwrap();
    cl.update(from, into, 3.0);
    assert_matches_rebuild(&cl);

    // and drop the merged cluster into the zeros
    let from = cl.coeffs().iter().position(|&c| c == 3.0).unwrap();
    let zero = cl.len() - 1;
    cl.update(from, zero, 0.0);
    assert_matches_rebuild(&cl);
    assert_eq!(cl.n_nonzero(), 1);
}

#[test]
fn test_rebuild_after_stale_set_coeff() {
    // set_coeff leaves ordering to the caller; a rebuild restores it
    let mut cl = Clusters::new(ndarray::array![3.0, 2.0, 1.0].view());
    cl.set_coeff(2, 10.0);
    let mags = magnitudes_of(&cl);
    cl.rebuild(mags.view());
    assert_eq!(cl.coeffs(), &[10.0, 3.0, 2.0]);
}
