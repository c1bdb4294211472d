//! Plane rotations and ordered rotation sequences.
//!
//! A [`Givens`] rotation acts on the plane of two rows (or columns) of a
//! matrix. Factorizations record the rotation that zeroed an entry, so
//! applying a recorded sequence on the left reproduces the elimination:
//! for a sequence standing for `Q = G_0^T G_1^T ... G_{p-1}^T`,
//! `apply_left` computes `Q^T M` and `apply_right` computes `M Q`.

use nalgebra::storage::StorageMut;
use nalgebra::{DMatrix, Dim, Matrix};

/// A single plane rotation acting on rows (or columns) `i < j`.
///
/// The stored pair `(c, s)` satisfies `c^2 + s^2 = 1`; applying the rotation
/// on the left maps rows `(r_i, r_j)` to `(c r_i + s r_j, -s r_i + c r_j)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Givens {
    i: usize,
    j: usize,
    c: f64,
    s: f64,
}

impl Givens {
    /// The identity rotation on the `(i, j)` plane.
    pub const fn identity(i: usize, j: usize) -> Self {
        Self {
            i,
            j,
            c: 1.0,
            s: 0.0,
        }
    }

    /// A rotation with explicit coefficients.
    pub const fn new(i: usize, j: usize, c: f64, s: f64) -> Self {
        Self { i, j, c, s }
    }

    /// The rotation zeroing `b` in the pair `(a, b)`, and the resulting
    /// leading value `r = sqrt(a^2 + b^2)` (up to sign).
    ///
    /// Uses the branch on `|a|` vs `|b|` that avoids overflow in the
    /// intermediate quotient. When both entries are zero the identity is
    /// returned with `r = 0`.
    pub fn zeroing(i: usize, j: usize, a: f64, b: f64) -> (Self, f64) {
        if b == 0.0 {
            return (Self::identity(i, j), a);
        }
        if a == 0.0 {
            return (Self::new(i, j, 0.0, 1.0), b);
        }
        if b.abs() > a.abs() {
            let t = a / b;
            let u = (1.0 + t * t).sqrt().copysign(b);
            let s = 1.0 / u;
            (Self::new(i, j, s * t, s), b * u)
        } else {
            let t = b / a;
            let u = (1.0 + t * t).sqrt().copysign(a);
            let c = 1.0 / u;
            (Self::new(i, j, c, c * t), a * u)
        }
    }

    /// Row index of the upper row in the rotation plane.
    pub const fn i(&self) -> usize {
        self.i
    }

    /// Row index of the lower row in the rotation plane.
    pub const fn j(&self) -> usize {
        self.j
    }

    /// Cosine coefficient.
    pub const fn c(&self) -> f64 {
        self.c
    }

    /// Sine coefficient.
    pub const fn s(&self) -> f64 {
        self.s
    }

    /// Shift both plane indices by `offset`.
    pub fn extend(&mut self, offset: usize) {
        self.i += offset;
        self.j += offset;
    }

    /// Apply the rotation to rows `i` and `j` of `m`, over all columns.
    ///
    /// Indices out of range are a programming error; bounds are only checked
    /// by the underlying indexing in debug builds.
    pub fn apply_left<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        let hi = m.ncols();
        self.apply_left_cols(m, 0, hi);
    }

    /// Apply the rotation to rows `i` and `j`, restricted to columns
    /// `lo..hi`. Used by band-aware sweeps that know where the zeros are.
    pub fn apply_left_cols<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>, lo: usize, hi: usize)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        for k in lo..hi {
            let xi = m[(self.i, k)];
            let xj = m[(self.j, k)];
            m[(self.i, k)] = self.c * xi + self.s * xj;
            m[(self.j, k)] = -self.s * xi + self.c * xj;
        }
    }

    /// Apply the transposed rotation to columns `i` and `j` of `m`
    /// (the mirror of [`Givens::apply_left`], so that sequences applied on
    /// the right compose to `M Q`).
    pub fn apply_right<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        for k in 0..m.nrows() {
            let xi = m[(k, self.i)];
            let xj = m[(k, self.j)];
            m[(k, self.i)] = self.c * xi + self.s * xj;
            m[(k, self.j)] = -self.s * xi + self.c * xj;
        }
    }
}

/// An ordered sequence of Givens rotations.
///
/// Append-only during a factorization and cleared between solves; the backing
/// buffer keeps its capacity so the hot path never reallocates.
#[derive(Debug, Clone, Default)]
pub struct GivensSequence {
    rotations: Vec<Givens>,
}

impl GivensSequence {
    /// An empty sequence with room for `capacity` rotations.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rotations: Vec::with_capacity(capacity),
        }
    }

    /// Number of recorded rotations.
    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }

    /// Drop all rotations, keeping the allocation.
    pub fn clear(&mut self) {
        self.rotations.clear();
    }

    /// Append a rotation.
    pub fn push(&mut self, g: Givens) {
        self.rotations.push(g);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Givens> {
        self.rotations.iter()
    }

    /// Shift the plane indices of every rotation by `offset`.
    pub fn extend(&mut self, offset: usize) {
        for g in &mut self.rotations {
            g.extend(offset);
        }
    }

    /// `M <- G_{p-1} ... G_1 G_0 M`, i.e. `Q^T M` for the represented `Q`.
    pub fn apply_left<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        for g in &self.rotations {
            g.apply_left(m);
        }
    }

    /// `M <- M G_0^T G_1^T ... G_{p-1}^T`, i.e. `M Q`.
    pub fn apply_right<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        for g in &self.rotations {
            g.apply_right(m);
        }
    }

    /// The represented `n x n` orthogonal matrix. Debug only: allocates.
    pub fn matrix(&self, n: usize) -> DMatrix<f64> {
        let mut q = DMatrix::identity(n, n);
        self.apply_right(&mut q);
        q
    }
}

impl<'a> IntoIterator for &'a GivensSequence {
    type Item = &'a Givens;
    type IntoIter = std::slice::Iter<'a, Givens>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
