//! Box bounds plus a single sum inequality, with active-set bookkeeping.
//!
//! The constraint set is `l <= x <= u` componentwise together with
//! `w_lo <= sum(x) <= w_hi`, i.e. `C x` bounded with `C = [I; 1^T]`.
//! Constraint rows `0..n` are the box rows, row `n` is the sum row. The
//! active set records which rows are currently pinned to which side.

use nalgebra::{DMatrix, DVector};

use crate::error::QpError;

/// Default tolerance for primal and dual feasibility checks.
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Which side of a constraint row is enforced as an equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSide {
    Lower,
    Upper,
}

/// Box bounds, the sum inequality, and the current active set.
#[derive(Debug, Clone)]
pub struct LinearConstraints {
    n: usize,
    l: DVector<f64>,
    u: DVector<f64>,
    w_lo: f64,
    w_hi: f64,
    active: Vec<Option<ActivationSide>>,
}

impl LinearConstraints {
    /// Build from box bounds and the sum window `[w_lo, w_hi]`.
    pub fn new(l: DVector<f64>, u: DVector<f64>, w_lo: f64, w_hi: f64) -> Result<Self, QpError> {
        let n = l.len();
        if u.len() != n {
            return Err(QpError::DimensionMismatch {
                what: "upper bounds",
                expected: n,
                got: u.len(),
            });
        }
        for i in 0..n {
            if l[i] > u[i] {
                return Err(QpError::InvertedBounds {
                    index: i,
                    lower: l[i],
                    upper: u[i],
                });
            }
        }
        if w_lo > w_hi {
            return Err(QpError::InvertedBounds {
                index: n,
                lower: w_lo,
                upper: w_hi,
            });
        }
        Ok(Self {
            n,
            l,
            u,
            w_lo,
            w_hi,
            active: vec![None; n + 1],
        })
    }

    /// Number of variables (the sum row has index `n`).
    pub fn size(&self) -> usize {
        self.n
    }

    pub fn lower(&self) -> &DVector<f64> {
        &self.l
    }

    pub fn upper(&self) -> &DVector<f64> {
        &self.u
    }

    pub fn sum_bounds(&self) -> (f64, f64) {
        (self.w_lo, self.w_hi)
    }

    /// Replace the bounds of one row; row `n` addresses the sum window.
    pub fn change_bounds_at(&mut self, idx: usize, lo: f64, hi: f64) -> Result<(), QpError> {
        if idx > self.n {
            return Err(QpError::IndexOutOfRange {
                index: idx,
                size: self.n,
            });
        }
        if lo > hi {
            return Err(QpError::InvertedBounds {
                index: idx,
                lower: lo,
                upper: hi,
            });
        }
        if idx == self.n {
            self.w_lo = lo;
            self.w_hi = hi;
        } else {
            self.l[idx] = lo;
            self.u[idx] = hi;
        }
        Ok(())
    }

    /// Replace every box bound at once.
    pub fn change_bounds(&mut self, l: &DVector<f64>, u: &DVector<f64>) -> Result<(), QpError> {
        if l.len() != self.n || u.len() != self.n {
            return Err(QpError::DimensionMismatch {
                what: "bounds",
                expected: self.n,
                got: l.len().min(u.len()),
            });
        }
        for i in 0..self.n {
            if l[i] > u[i] {
                return Err(QpError::InvertedBounds {
                    index: i,
                    lower: l[i],
                    upper: u[i],
                });
            }
        }
        self.l.copy_from(l);
        self.u.copy_from(u);
        Ok(())
    }

    /// Pin row `idx` to `side`.
    pub fn activate(&mut self, idx: usize, side: ActivationSide) {
        debug_assert!(idx <= self.n);
        self.active[idx] = Some(side);
    }

    /// Release row `idx`.
    pub fn deactivate(&mut self, idx: usize) {
        debug_assert!(idx <= self.n);
        self.active[idx] = None;
    }

    /// Release every row.
    pub fn deactivate_all(&mut self) {
        for a in &mut self.active {
            *a = None;
        }
    }

    pub fn is_active(&self, idx: usize) -> bool {
        self.active[idx].is_some()
    }

    pub fn activation(&self, idx: usize) -> Option<ActivationSide> {
        self.active[idx]
    }

    /// Whether the sum row is in the active set.
    pub fn sum_active(&self) -> bool {
        self.active[self.n].is_some()
    }

    /// Number of active box rows.
    pub fn num_active_x(&self) -> usize {
        self.active[..self.n].iter().filter(|a| a.is_some()).count()
    }

    /// Write the box-row activity into `mask` (the pattern consumed by the
    /// objective's QR).
    pub fn fill_x_mask(&self, mask: &mut [bool]) {
        debug_assert_eq!(mask.len(), self.n);
        for (m, a) in mask.iter_mut().zip(&self.active[..self.n]) {
            *m = a.is_some();
        }
    }

    /// Bound value of row `idx` on `side`.
    pub fn bound(&self, idx: usize, side: ActivationSide) -> f64 {
        if idx == self.n {
            match side {
                ActivationSide::Lower => self.w_lo,
                ActivationSide::Upper => self.w_hi,
            }
        } else {
            match side {
                ActivationSide::Lower => self.l[idx],
                ActivationSide::Upper => self.u[idx],
            }
        }
    }

    /// `true` iff `x` satisfies every constraint to tolerance `eps`.
    pub fn check_primal(&self, x: &DVector<f64>, eps: f64) -> bool {
        if x.len() != self.n {
            return false;
        }
        for i in 0..self.n {
            if x[i] < self.l[i] - eps || x[i] > self.u[i] + eps {
                return false;
            }
        }
        let s = x.sum();
        s >= self.w_lo - eps && s <= self.w_hi + eps
    }

    /// `true` iff the multiplier signs match the activation sides: `>= 0`
    /// for an upper activation, `<= 0` for a lower one, and `|lambda_i|`
    /// within `eps` at inactive rows.
    pub fn check_dual(&self, lambda: &DVector<f64>, eps: f64) -> bool {
        if lambda.len() != self.n + 1 {
            return false;
        }
        for (i, a) in self.active.iter().enumerate() {
            let ok = match a {
                Some(ActivationSide::Upper) => lambda[i] >= -eps,
                Some(ActivationSide::Lower) => lambda[i] <= eps,
                None => lambda[i].abs() <= eps,
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// The `(n+1) x n` constraint matrix `[I; 1^T]`. Debug only: allocates.
    pub fn matrix(&self) -> DMatrix<f64> {
        let mut c = DMatrix::zeros(self.n + 1, self.n);
        for i in 0..self.n {
            c[(i, i)] = 1.0;
            c[(self.n, i)] = 1.0;
        }
        c
    }

    /// Whether the box and the sum window admit any common point.
    pub fn is_consistent(&self, eps: f64) -> bool {
        self.l.sum() <= self.w_hi + eps && self.u.sum() >= self.w_lo - eps
    }

    /// Overwrite `x` with the midpoint of the box shifted onto the sum
    /// window, then clamped back into the box.
    pub fn feasible_point(&self, x: &mut DVector<f64>) {
        debug_assert_eq!(x.len(), self.n);
        for i in 0..self.n {
            x[i] = 0.5 * (self.l[i] + self.u[i]);
        }
        let s = x.sum();
        let target = s.clamp(self.w_lo, self.w_hi);
        let shift = (target - s) / self.n as f64;
        for i in 0..self.n {
            x[i] = (x[i] + shift).clamp(self.l[i], self.u[i]);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
