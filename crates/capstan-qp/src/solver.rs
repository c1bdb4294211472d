//! Primal active-set driver.
//!
//! Solves `min 1/2 ||J x||^2 + 1/2 (j^T x + c)^2` subject to the box and sum
//! constraints of [`LinearConstraints`], where `J` comes from a
//! [`LeastSquareObjective`]. The loop alternates equality-constrained
//! least-squares steps on the free variables with multiplier checks:
//!
//! 1. at a stationary point of the current active set, multipliers with the
//!    wrong sign release their constraint;
//! 2. otherwise the step is clamped at the first bound it crosses and that
//!    bound joins the active set.
//!
//! All workspace (R, Q, residual, step, multipliers) is owned by the driver
//! and sized at construction; a solve performs no allocation.
//!
//! [`LeastSquare::solve_feasibility`] runs the same loop on the linear
//! residual alone (`J` absent), which has a closed-form step; it is the
//! cheap probe used to seed capture solves.

use nalgebra::{DMatrix, DVector};

use crate::condensed::CondensedOrthogonalMatrix;
use crate::constraints::{ActivationSide, LinearConstraints};
use crate::error::QpError;
use crate::givens::GivensSequence;
use crate::objective::LeastSquareObjective;
use crate::qr::{dense_qr, hessenberg_qr};

/// Outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// KKT conditions hold at the returned point.
    Converged,
    /// The box and the sum window have no common point.
    Infeasible,
    /// Iteration cap (`2n + 10`) reached; `x` holds the last iterate.
    MaxIterations,
    /// Rank deficiency on the free set during back-substitution.
    NumericalFailure,
}

// Tolerances of the loop. The stationarity threshold mixes an absolute term
// with a term relative to the gradient so that the test survives badly
// scaled problems; the dual threshold scales with the multipliers.
const PRIMAL_EPS: f64 = 1e-10;
const STAT_ABS: f64 = 1e-10;
const STAT_REL: f64 = 1e-13;
const RANK_EPS: f64 = 1e-13;
const DUAL_EPS: f64 = 1e-10;

/// Active-set solver with preallocated workspace for problems of size `n`.
#[derive(Debug, Clone)]
pub struct LeastSquare {
    n: usize,
    x: DVector<f64>,
    lambda: DVector<f64>,
    p: DVector<f64>,
    grad: DVector<f64>,
    jx: DVector<f64>,
    residual: DVector<f64>,
    y: DVector<f64>,
    z: DVector<f64>,
    r: DMatrix<f64>,
    g: DMatrix<f64>,
    q: CondensedOrthogonalMatrix,
    qw: GivensSequence,
    act_mask: Vec<bool>,
    free: Vec<usize>,
}

impl LeastSquare {
    /// Preallocate every buffer for problems of size `n`.
    pub fn new(n: usize) -> Self {
        let kmax = n / 2 + 1;
        let pmax = 2 * n + 2;
        Self {
            n,
            x: DVector::zeros(n),
            lambda: DVector::zeros(n + 1),
            p: DVector::zeros(n),
            grad: DVector::zeros(n),
            jx: DVector::zeros(n.saturating_sub(1)),
            residual: DVector::zeros(n),
            y: DVector::zeros(n),
            z: DVector::zeros(n),
            r: DMatrix::zeros(n, n),
            g: DMatrix::zeros(n, n.saturating_sub(1)),
            q: CondensedOrthogonalMatrix::new(n, kmax, pmax, true),
            qw: GivensSequence::with_capacity(n * (n + 1) / 2),
            act_mask: vec![false; n],
            free: Vec::with_capacity(n),
        }
    }

    /// The current iterate (the solution after a converged solve).
    pub fn x(&self) -> &DVector<f64> {
        &self.x
    }

    /// Multipliers of the `n + 1` constraint rows; positive pairs with an
    /// upper activation, negative with a lower one.
    pub fn lambda(&self) -> &DVector<f64> {
        &self.lambda
    }

    /// Install a warm-start point. A point violating the constraints is
    /// replaced by the projected box midpoint when the next solve begins.
    pub fn set_x(&mut self, x: &DVector<f64>) -> Result<(), QpError> {
        if x.len() != self.n {
            return Err(QpError::DimensionMismatch {
                what: "x",
                expected: self.n,
                got: x.len(),
            });
        }
        self.x.copy_from(x);
        Ok(())
    }

    /// Solve the full capture objective.
    pub fn solve(
        &mut self,
        obj: &mut LeastSquareObjective,
        j: &DVector<f64>,
        c: f64,
        lc: &mut LinearConstraints,
    ) -> Result<SolverStatus, QpError> {
        self.run(Some(obj), j, c, lc)
    }

    /// Minimize the linear residual `1/2 (j^T x + c)^2` alone.
    pub fn solve_feasibility(
        &mut self,
        j: &DVector<f64>,
        c: f64,
        lc: &mut LinearConstraints,
    ) -> Result<SolverStatus, QpError> {
        self.run(None, j, c, lc)
    }

    fn run(
        &mut self,
        mut obj: Option<&mut LeastSquareObjective>,
        j: &DVector<f64>,
        c: f64,
        lc: &mut LinearConstraints,
    ) -> Result<SolverStatus, QpError> {
        let n = self.n;
        if j.len() != n {
            return Err(QpError::DimensionMismatch {
                what: "j",
                expected: n,
                got: j.len(),
            });
        }
        if lc.size() != n {
            return Err(QpError::DimensionMismatch {
                what: "constraints",
                expected: n,
                got: lc.size(),
            });
        }
        if let Some(o) = obj.as_deref() {
            if o.size() != n {
                return Err(QpError::DimensionMismatch {
                    what: "objective",
                    expected: n,
                    got: o.size(),
                });
            }
        }

        if !lc.is_consistent(1e-12) {
            lc.deactivate_all();
            lc.feasible_point(&mut self.x);
            self.lambda.fill(0.0);
            return Ok(SolverStatus::Infeasible);
        }
        if !lc.check_primal(&self.x, PRIMAL_EPS) {
            lc.deactivate_all();
            lc.feasible_point(&mut self.x);
        }

        let max_iter = 2 * n + 10;
        for _ in 0..max_iter {
            let rho0 = c + j.dot(&self.x);
            if let Some(o) = obj.as_deref() {
                o.apply_j_left(&mut self.jx, &self.x)?;
                o.apply_jt_left(&mut self.grad, &self.jx)?;
                self.grad.axpy(rho0, j, 1.0);
            } else {
                self.grad.copy_from(j);
                self.grad *= rho0;
            }

            self.free.clear();
            for i in 0..n {
                if !lc.is_active(i) {
                    self.free.push(i);
                }
            }
            let nf = self.free.len();
            let sum_active = lc.sum_active();

            // Reduced gradient: the free components, projected onto the
            // zero-sum subspace when the sum row is pinned.
            let mean = if sum_active && nf > 0 {
                self.free.iter().map(|&i| self.grad[i]).sum::<f64>() / nf as f64
            } else {
                0.0
            };
            let gred_max = self
                .free
                .iter()
                .map(|&i| (self.grad[i] - mean).abs())
                .fold(0.0f64, f64::max);

            if gred_max <= STAT_ABS + STAT_REL * self.grad.amax() {
                // Stationary for this active set: either done, or the worst
                // multiplier releases its constraint.
                self.build_lambda(lc, sum_active, nf);
                match self.worst_violation(lc) {
                    None => return Ok(SolverStatus::Converged),
                    Some(idx) => {
                        lc.deactivate(idx);
                        continue;
                    }
                }
            }

            let step_ok = match obj.as_deref_mut() {
                Some(o) => {
                    if sum_active {
                        self.step_objective_sum(o, j, rho0)?
                    } else {
                        self.step_objective(o, lc, j, rho0)?
                    }
                }
                None => self.step_feasibility(j, rho0, sum_active),
            };
            if !step_ok {
                return Ok(SolverStatus::NumericalFailure);
            }

            // Largest step in (0, 1] keeping every inactive bound satisfied.
            let mut t = 1.0f64;
            let mut blocking: Option<(usize, ActivationSide)> = None;
            for &i in &self.free {
                let pi = self.p[i];
                if pi > 0.0 {
                    let cand = (lc.upper()[i] - self.x[i]) / pi;
                    if cand < t {
                        t = cand;
                        blocking = Some((i, ActivationSide::Upper));
                    }
                } else if pi < 0.0 {
                    let cand = (lc.lower()[i] - self.x[i]) / pi;
                    if cand < t {
                        t = cand;
                        blocking = Some((i, ActivationSide::Lower));
                    }
                }
            }
            if !sum_active {
                let s: f64 = self.free.iter().map(|&i| self.p[i]).sum();
                let sx = self.x.sum();
                let (w_lo, w_hi) = lc.sum_bounds();
                if s > 0.0 {
                    let cand = (w_hi - sx) / s;
                    if cand < t {
                        t = cand;
                        blocking = Some((n, ActivationSide::Upper));
                    }
                } else if s < 0.0 {
                    let cand = (w_lo - sx) / s;
                    if cand < t {
                        t = cand;
                        blocking = Some((n, ActivationSide::Lower));
                    }
                }
            }
            let t = t.max(0.0);
            self.x.axpy(t, &self.p, 1.0);
            if let Some((idx, side)) = blocking {
                if idx < n {
                    // land exactly on the bound so the activation invariant
                    // holds bit for bit
                    self.x[idx] = lc.bound(idx, side);
                }
                lc.activate(idx, side);
            }
        }

        Ok(SolverStatus::MaxIterations)
    }

    /// Unconstrained-in-the-free-variables least-squares step through the
    /// stacked QR `[j_f^T; J N_f] = Q R`.
    fn step_objective(
        &mut self,
        o: &mut LeastSquareObjective,
        lc: &LinearConstraints,
        j: &DVector<f64>,
        rho0: f64,
    ) -> Result<bool, QpError> {
        let n = self.n;
        let nf = self.free.len();
        lc.fill_x_mask(&mut self.act_mask);

        {
            let mut rview = self.r.view_mut((1, 0), (n - 1, nf));
            o.qr(&mut rview, &mut self.q, &self.act_mask, 1)?;
        }
        for (t, &f) in self.free.iter().enumerate() {
            self.r[(0, t)] = j[f];
        }
        {
            let rows = (nf + 1).min(n);
            let mut v = self.r.view_mut((0, 0), (rows, nf));
            hessenberg_qr(&mut v, self.q.qh_mut());
        }

        self.residual[0] = rho0;
        {
            let mut rows = self.residual.rows_mut(1, n - 1);
            o.apply_j_left(&mut rows, &self.x)?;
        }
        self.q.apply_left(&mut self.residual);

        if !back_substitute(&self.r, nf, &self.residual, &mut self.y) {
            return Ok(false);
        }
        self.p.fill(0.0);
        for (t, &f) in self.free.iter().enumerate() {
            self.p[f] = self.y[t];
        }
        Ok(true)
    }

    /// Step with the sum row active: the free variables move in the
    /// zero-sum subspace, parameterized by the bidiagonal difference basis
    /// `B` (`p_f = B y`), and the reduced matrix `[j_f^T; J N_f] B` gets a
    /// dense Givens QR.
    fn step_objective_sum(
        &mut self,
        o: &mut LeastSquareObjective,
        j: &DVector<f64>,
        rho0: f64,
    ) -> Result<bool, QpError> {
        let n = self.n;
        let nf = self.free.len();
        debug_assert!(nf >= 2, "a reduced direction needs two free variables");
        let m = nf - 1;

        for t in 0..m {
            let f0 = self.free[t];
            let f1 = self.free[t + 1];
            self.g[(0, t)] = j[f0] - j[f1];
            self.z[f0] = 1.0;
            self.z[f1] = -1.0;
            {
                let mut col = self.g.column_mut(t);
                let mut rows = col.rows_range_mut(1..);
                o.apply_j_left(&mut rows, &self.z)?;
            }
            self.z[f0] = 0.0;
            self.z[f1] = 0.0;
        }

        self.qw.clear();
        {
            let mut gview = self.g.view_mut((0, 0), (n, m));
            dense_qr(&mut gview, &mut self.qw);
        }

        self.residual[0] = rho0;
        {
            let mut rows = self.residual.rows_mut(1, n - 1);
            o.apply_j_left(&mut rows, &self.x)?;
        }
        self.qw.apply_left(&mut self.residual);

        if !back_substitute(&self.g, m, &self.residual, &mut self.y) {
            return Ok(false);
        }
        self.p.fill(0.0);
        self.p[self.free[0]] = self.y[0];
        for t in 1..m {
            self.p[self.free[t]] = self.y[t] - self.y[t - 1];
        }
        self.p[self.free[m]] = -self.y[m - 1];
        Ok(true)
    }

    /// Closed-form Gauss-Newton step for the rank-one feasibility residual.
    fn step_feasibility(&mut self, j: &DVector<f64>, rho0: f64, sum_active: bool) -> bool {
        let nf = self.free.len();
        let meanj = if sum_active && nf > 0 {
            self.free.iter().map(|&i| j[i]).sum::<f64>() / nf as f64
        } else {
            0.0
        };
        let denom: f64 = self.free.iter().map(|&i| (j[i] - meanj).powi(2)).sum();
        if denom <= 0.0 {
            return false;
        }
        self.p.fill(0.0);
        for &i in &self.free {
            self.p[i] = -rho0 * (j[i] - meanj) / denom;
        }
        true
    }

    /// Multipliers from the gradient at a stationary point of the current
    /// active set: `lambda_i = -grad_i - lambda_sum` on active box rows,
    /// with `lambda_sum` the mean free gradient when the sum row is pinned.
    fn build_lambda(&mut self, lc: &LinearConstraints, sum_active: bool, nf: usize) {
        let n = self.n;
        self.lambda.fill(0.0);
        let lam_sum = if sum_active {
            if nf > 0 {
                -self.free.iter().map(|&i| self.grad[i]).sum::<f64>() / nf as f64
            } else {
                -self.grad.sum() / (n as f64 + 1.0)
            }
        } else {
            0.0
        };
        self.lambda[n] = lam_sum;
        for i in 0..n {
            if lc.is_active(i) {
                self.lambda[i] = -self.grad[i] - lam_sum;
            }
        }
    }

    /// Index of the active row whose multiplier most violates its sign
    /// convention, if any.
    fn worst_violation(&self, lc: &LinearConstraints) -> Option<usize> {
        let eps = DUAL_EPS * (1.0 + self.lambda.amax());
        let mut worst: Option<(usize, f64)> = None;
        for idx in 0..=self.n {
            if let Some(side) = lc.activation(idx) {
                let v = match side {
                    ActivationSide::Upper => -self.lambda[idx],
                    ActivationSide::Lower => self.lambda[idx],
                };
                if v > eps && worst.map_or(true, |(_, w)| v > w) {
                    worst = Some((idx, v));
                }
            }
        }
        worst.map(|(idx, _)| idx)
    }
}

/// Solve `R[..k, ..k] y = -rhs[..k]` in place; `false` on a pivot below the
/// rank tolerance.
fn back_substitute(r: &DMatrix<f64>, k: usize, rhs: &DVector<f64>, y: &mut DVector<f64>) -> bool {
    if k == 0 {
        return true;
    }
    let mut scale = 0.0f64;
    for i in 0..k {
        scale = scale.max(r[(i, i)].abs());
    }
    if scale == 0.0 {
        return false;
    }
    let tol = RANK_EPS * scale;
    for i in (0..k).rev() {
        let mut s = -rhs[i];
        for jj in i + 1..k {
            s -= r[(i, jj)] * y[jj];
        }
        let pivot = r[(i, i)];
        if pivot.abs() <= tol {
            return false;
        }
        y[i] = s / pivot;
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
