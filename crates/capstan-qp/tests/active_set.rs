//! End-to-end active-set scenarios: KKT certificates on randomized
//! instances, warm-start behavior, and precomputation equivalence.

use capstan_qp::{
    LeastSquare, LeastSquareObjective, LinearConstraints, SolverStatus, DEFAULT_TOLERANCE,
};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N: usize = 10;

fn random_vector(rng: &mut StdRng, n: usize) -> DVector<f64> {
    DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0))
}

fn linspaced(n: usize, lo: f64, hi: f64) -> DVector<f64> {
    DVector::from_fn(n, |i, _| lo + (hi - lo) * i as f64 / (n - 1) as f64)
}

fn random_box(rng: &mut StdRng) -> LinearConstraints {
    let l = random_vector(rng, N).map(|v| -v.abs());
    let u = random_vector(rng, N).map(|v| v.abs());
    LinearConstraints::new(l, u, -1.0, 1.0).unwrap()
}

/// Complementary slackness: every multiplier pairs with a tight bound.
fn check_complementarity(lc: &LinearConstraints, x: &DVector<f64>, lambda: &DVector<f64>, tol: f64) {
    let cx = lc.matrix() * x;
    let (w_lo, w_hi) = lc.sum_bounds();
    for i in 0..=N {
        let (lo, hi) = if i == N {
            (w_lo, w_hi)
        } else {
            (lc.lower()[i], lc.upper()[i])
        };
        let gap = if lambda[i] > 0.0 {
            cx[i] - hi
        } else {
            cx[i] - lo
        };
        assert!(
            (lambda[i] * gap).abs() <= tol,
            "complementarity violated at row {i}: lambda = {}, gap = {gap}",
            lambda[i]
        );
    }
}

#[test]
fn feasibility_scenario_satisfies_kkt() {
    let mut rng = StdRng::seed_from_u64(2018);
    for _ in 0..5 {
        let mut lc = random_box(&mut rng);
        let j = random_vector(&mut rng, N);
        let c = -10.0;

        let mut ls = LeastSquare::new(N);
        let status = ls.solve_feasibility(&j, c, &mut lc).unwrap();
        assert_eq!(status, SolverStatus::Converged);

        let x = ls.x();
        let lambda = ls.lambda();
        assert!(lc.check_primal(x, DEFAULT_TOLERANCE));
        assert!(lc.check_dual(lambda, DEFAULT_TOLERANCE));

        let kkt = (c + j.dot(x)) * &j + lc.matrix().transpose() * lambda;
        assert!(kkt.amax() <= 1e-8, "KKT residual {}", kkt.amax());
        check_complementarity(&lc, x, lambda, 1e-12);
    }
}

#[test]
fn objective_scenario_satisfies_kkt() {
    let mut rng = StdRng::seed_from_u64(314);
    let delta = linspaced(N, 0.01, 0.19);
    for _ in 0..5 {
        let mut obj = LeastSquareObjective::new(delta.clone()).unwrap();
        let jm = obj.matrix();
        let mut lc = random_box(&mut rng);
        let j = 100.0 * random_vector(&mut rng, N);
        let c = -200.0;

        let mut ls = LeastSquare::new(N);
        let status = ls.solve(&mut obj, &j, c, &mut lc).unwrap();
        assert_eq!(status, SolverStatus::Converged);

        let x = ls.x();
        let lambda = ls.lambda();
        let tl = 1e-8 * lambda.amax().max(1.0);
        assert!(lc.check_primal(x, DEFAULT_TOLERANCE));
        assert!(lc.check_dual(lambda, tl));

        let kkt = (c + j.dot(x)) * &j
            + jm.transpose() * (&jm * x)
            + lc.matrix().transpose() * lambda;
        assert!(kkt.amax() <= 1e-8, "KKT residual {}", kkt.amax());
        check_complementarity(&lc, x, lambda, tl);
    }
}

#[test]
fn warm_started_resolve_is_bitwise_stable() {
    let mut rng = StdRng::seed_from_u64(99);
    let delta = linspaced(N, 0.01, 0.19);
    let mut obj = LeastSquareObjective::new(delta).unwrap();
    let mut lc = random_box(&mut rng);
    let j = 100.0 * random_vector(&mut rng, N);
    let c = -200.0;

    let mut ls = LeastSquare::new(N);
    assert_eq!(
        ls.solve(&mut obj, &j, c, &mut lc).unwrap(),
        SolverStatus::Converged
    );
    let first = ls.x().clone();

    // Solving the converged problem again must not move the iterate at all.
    assert_eq!(
        ls.solve(&mut obj, &j, c, &mut lc).unwrap(),
        SolverStatus::Converged
    );
    assert_eq!(ls.x(), &first, "warm-started resolve moved the iterate");
}

#[test]
fn precomputed_solve_matches_direct_solve() {
    let mut rng = StdRng::seed_from_u64(555);
    let delta = linspaced(N, 0.01, 0.19);
    let j = 100.0 * random_vector(&mut rng, N);
    let c = -200.0;
    let l = random_vector(&mut rng, N).map(|v| -v.abs());
    let u = random_vector(&mut rng, N).map(|v| v.abs());

    let mut direct_obj = LeastSquareObjective::new(delta.clone()).unwrap();
    let mut direct_lc = LinearConstraints::new(l.clone(), u.clone(), -1.0, 1.0).unwrap();
    let mut direct = LeastSquare::new(N);
    assert_eq!(
        direct.solve(&mut direct_obj, &j, c, &mut direct_lc).unwrap(),
        SolverStatus::Converged
    );

    let mut cached_obj = LeastSquareObjective::new(delta).unwrap();
    cached_obj.precompute(1).unwrap();
    let mut cached_lc = LinearConstraints::new(l, u, -1.0, 1.0).unwrap();
    let mut cached = LeastSquare::new(N);
    assert_eq!(
        cached.solve(&mut cached_obj, &j, c, &mut cached_lc).unwrap(),
        SolverStatus::Converged
    );

    assert!((direct.x() - cached.x()).amax() <= 1e-12);
    assert!((direct.lambda() - cached.lambda()).amax() <= 1e-12);
}
