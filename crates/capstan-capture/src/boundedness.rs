//! Nonlinear boundedness condition of the capture trajectory.
//!
//! With `x` the per-step increments of the squared pendulum frequency and
//! `phi_k = x_0 + ... + x_k` the cumulative phases, the condition reads
//!
//! ```text
//! f(x) = -b + alpha sqrt(phi_{n-1})
//!        + sum_k delta_k / (sqrt(phi_k) + sqrt(phi_{k-1}))
//! ```
//!
//! with `alpha = z_bar / g` and `b = zd_bar / g` (`phi_{-1} = 0`). The QP
//! engine never sees this constraint; callers evaluate it as a side channel
//! and feed its linearization back through the `j` vector of a solve.

use nalgebra::DVector;

use crate::error::CaptureError;

/// Value and gradient of the boundedness condition.
#[derive(Debug, Clone)]
pub struct BoundednessConstraint {
    delta: DVector<f64>,
    alpha: f64,
    b: f64,
}

impl BoundednessConstraint {
    pub fn new(delta: DVector<f64>, alpha: f64, b: f64) -> Result<Self, CaptureError> {
        for (index, &v) in delta.iter().enumerate() {
            if !(v > 0.0) || !v.is_finite() {
                return Err(CaptureError::InvalidValue {
                    key: "Delta".into(),
                    message: format!("entry {index} = {v} must be strictly positive"),
                });
            }
        }
        Ok(Self { delta, alpha, b })
    }

    pub fn size(&self) -> usize {
        self.delta.len()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha;
    }

    pub fn set_b(&mut self, b: f64) {
        self.b = b;
    }

    /// Evaluate `f(x)`. Every cumulative phase must be strictly positive.
    pub fn value(&self, x: &DVector<f64>) -> Result<f64, CaptureError> {
        let n = self.check(x)?;
        let mut phi = 0.0;
        let mut s_prev = 0.0;
        let mut acc = -self.b;
        for k in 0..n {
            phi += x[k];
            if !(phi > 0.0) {
                return Err(CaptureError::NonPositivePhase(k));
            }
            let s = phi.sqrt();
            acc += self.delta[k] / (s + s_prev);
            s_prev = s;
        }
        Ok(acc + self.alpha * s_prev)
    }

    /// Evaluate the gradient of `f` at `x` into `grad`.
    pub fn gradient(&self, grad: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), CaptureError> {
        let n = self.check(x)?;
        if grad.len() != n {
            return Err(CaptureError::Qp(capstan_qp::QpError::DimensionMismatch {
                what: "gradient",
                expected: n,
                got: grad.len(),
            }));
        }

        // Forward sweep: cumulative phases and their square roots, reusing
        // `grad` as scratch for s_k.
        let mut phi = 0.0;
        for k in 0..n {
            phi += x[k];
            if !(phi > 0.0) {
                return Err(CaptureError::NonPositivePhase(k));
            }
            grad[k] = phi.sqrt();
        }
        let s_last = grad[n - 1];

        // Backward sweep. With t_k = -delta_k / (s_k + s_{k-1})^2:
        //   df/dx_i = alpha / (2 s_{n-1})
        //           + sum_{k >= i} t_k / (2 s_k)
        //           + sum_{k >= i+1} t_k / (2 s_{k-1})
        let head = 0.5 * self.alpha / s_last;
        let mut suffix_a = 0.0;
        let mut suffix_b = 0.0;
        for i in (0..n).rev() {
            let s_i = grad[i];
            let s_im1 = if i > 0 { grad[i - 1] } else { 0.0 };
            let t = -self.delta[i] / (s_i + s_im1).powi(2);
            grad[i] = head + suffix_a + 0.5 * t / s_i + suffix_b;
            suffix_a += 0.5 * t / s_i;
            if i > 0 {
                suffix_b += 0.5 * t / s_im1;
            }
        }
        Ok(())
    }

    fn check(&self, x: &DVector<f64>) -> Result<usize, CaptureError> {
        let n = self.delta.len();
        if x.len() != n {
            return Err(CaptureError::Qp(capstan_qp::QpError::DimensionMismatch {
                what: "x",
                expected: n,
                got: x.len(),
            }));
        }
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
