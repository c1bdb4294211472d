//! Condensed representation of products of Givens sequences and a
//! permutation.
//!
//! [`CondensedOrthogonalMatrix`] stands for `Q = Q_1 Q_2 ... Q_k P Q_h`
//! where each `Q_i` is a [`GivensSequence`] and `P` a permutation encoded as
//! a transposition list. All storage is preallocated at construction so a
//! factorization can be rebuilt without touching the allocator.

use nalgebra::storage::StorageMut;
use nalgebra::{DMatrix, Dim, Matrix};

use crate::givens::GivensSequence;

/// A permutation encoded as an ordered list of row (or column) swaps.
///
/// Applied "forward", the swaps are performed in recording order; the
/// reverse application realizes the transposed permutation. This is an
/// encoding choice, not two representations: the owner decides which
/// direction stands for `P`.
#[derive(Debug, Clone, Default)]
pub struct Transpositions {
    swaps: Vec<(usize, usize)>,
}

impl Transpositions {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            swaps: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.swaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }

    pub fn clear(&mut self) {
        self.swaps.clear();
    }

    /// Record a swap of indices `a` and `b`.
    pub fn push(&mut self, a: usize, b: usize) {
        self.swaps.push((a, b));
    }

    pub fn apply_rows_forward<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        for &(a, b) in &self.swaps {
            m.swap_rows(a, b);
        }
    }

    pub fn apply_rows_reverse<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        for &(a, b) in self.swaps.iter().rev() {
            m.swap_rows(a, b);
        }
    }

    pub fn apply_cols_forward<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        for &(a, b) in &self.swaps {
            m.swap_columns(a, b);
        }
    }

    pub fn apply_cols_reverse<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        for &(a, b) in self.swaps.iter().rev() {
            m.swap_columns(a, b);
        }
    }
}

/// Preallocated product `Q_1 Q_2 ... Q_k P Q_h` of Givens sequences and a
/// permutation, representing an `n x n` orthogonal matrix.
///
/// The class only stores and applies; callers are responsible for ordering
/// their factorization products correctly. `ptranspose` records whether the
/// stored transposition list stands for `P` or `P^T`.
#[derive(Debug, Clone)]
pub struct CondensedOrthogonalMatrix {
    n: usize,
    ptranspose: bool,
    sequences: Vec<GivensSequence>,
    qh: GivensSequence,
    transpositions: Transpositions,
}

impl CondensedOrthogonalMatrix {
    /// Preallocate for `kmax` sequences of at most `pmax` rotations each,
    /// plus a tail sequence and `n` transpositions.
    pub fn new(n: usize, kmax: usize, pmax: usize, ptranspose: bool) -> Self {
        Self {
            n,
            ptranspose,
            sequences: (0..kmax).map(|_| GivensSequence::with_capacity(pmax)).collect(),
            qh: GivensSequence::with_capacity(pmax),
            transpositions: Transpositions::with_capacity(n),
        }
    }

    /// Dimension of the represented matrix.
    pub fn size(&self) -> usize {
        self.n
    }

    /// Number of preallocated sequences.
    pub fn kmax(&self) -> usize {
        self.sequences.len()
    }

    /// Empty every sequence and reset `P` to the identity, keeping storage.
    pub fn reset(&mut self, ptranspose: bool) {
        self.ptranspose = ptranspose;
        for q in &mut self.sequences {
            q.clear();
        }
        self.qh.clear();
        self.transpositions.clear();
    }

    pub fn q(&self, i: usize) -> &GivensSequence {
        &self.sequences[i]
    }

    pub fn q_mut(&mut self, i: usize) -> &mut GivensSequence {
        &mut self.sequences[i]
    }

    pub fn qh(&self) -> &GivensSequence {
        &self.qh
    }

    pub fn qh_mut(&mut self) -> &mut GivensSequence {
        &mut self.qh
    }

    pub fn p(&self) -> &Transpositions {
        &self.transpositions
    }

    pub fn p_mut(&mut self) -> &mut Transpositions {
        &mut self.transpositions
    }

    /// `M <- Q_h^T P^T Q_k^T ... Q_1^T M`, i.e. `Q^T M`.
    pub fn apply_left<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        for q in &self.sequences {
            q.apply_left(m);
        }
        if self.ptranspose {
            self.transpositions.apply_rows_forward(m);
        } else {
            self.transpositions.apply_rows_reverse(m);
        }
        self.qh.apply_left(m);
    }

    /// `M <- M Q_1 Q_2 ... Q_k P Q_h`, i.e. `M Q`.
    pub fn apply_right<R, C, S>(&self, m: &mut Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        for q in &self.sequences {
            q.apply_right(m);
        }
        if self.ptranspose {
            self.transpositions.apply_cols_forward(m);
        } else {
            self.transpositions.apply_cols_reverse(m);
        }
        self.qh.apply_right(m);
    }

    /// The represented `n x n` orthogonal matrix. Debug only: allocates.
    pub fn matrix(&self) -> DMatrix<f64> {
        let mut q = DMatrix::identity(self.n, self.n);
        self.apply_right(&mut q);
        q
    }

    /// Copy the contents of `other`, reusing this instance's buffers.
    ///
    /// Both instances must represent matrices of the same dimension and
    /// `other` must not use more sequences than were preallocated here.
    pub fn copy_from(&mut self, other: &Self) {
        debug_assert_eq!(self.n, other.n);
        debug_assert!(other.sequences.len() <= self.sequences.len());
        self.ptranspose = other.ptranspose;
        for (dst, src) in self.sequences.iter_mut().zip(&other.sequences) {
            dst.clone_from(src);
        }
        for dst in self.sequences.iter_mut().skip(other.sequences.len()) {
            dst.clear();
        }
        self.qh.clone_from(&other.qh);
        self.transpositions.clone_from(&other.transpositions);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::givens::Givens;
    use nalgebra::DMatrix;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_condensed(rng: &mut StdRng, n: usize, ptranspose: bool) -> CondensedOrthogonalMatrix {
        let mut q = CondensedOrthogonalMatrix::new(n, 3, 2 * n, ptranspose);
        for k in 0..3 {
            for _ in 0..n {
                let i = rng.gen_range(0..n - 1);
                let j = rng.gen_range(i + 1..n);
                let (g, _) =
                    Givens::zeroing(i, j, rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
                q.q_mut(k).push(g);
            }
        }
        for _ in 0..n / 2 {
            let a = rng.gen_range(0..n);
            let b = rng.gen_range(0..n);
            q.p_mut().push(a, b);
        }
        let (g, _) = Givens::zeroing(0, n - 1, 0.6, 0.8);
        q.qh_mut().push(g);
        q
    }

    #[test]
    fn matrix_is_orthogonal() {
        let mut rng = StdRng::seed_from_u64(3);
        for &ptranspose in &[false, true] {
            let q = random_condensed(&mut rng, 7, ptranspose);
            let m = q.matrix();
            let qqt = &m * m.transpose();
            assert!((qqt - DMatrix::identity(7, 7)).amax() <= 1e-10);
        }
    }

    #[test]
    fn apply_left_matches_matrix_product() {
        let mut rng = StdRng::seed_from_u64(5);
        for &ptranspose in &[false, true] {
            let q = random_condensed(&mut rng, 6, ptranspose);
            let qm = q.matrix();
            let m0 = DMatrix::from_fn(6, 4, |_, _| rng.gen_range(-1.0..1.0));

            let mut left = m0.clone();
            q.apply_left(&mut left);
            assert!((&left - qm.transpose() * &m0).amax() <= 1e-12);

            let m1 = DMatrix::from_fn(4, 6, |_, _| rng.gen_range(-1.0..1.0));
            let mut right = m1.clone();
            q.apply_right(&mut right);
            assert!((&right - &m1 * &qm).amax() <= 1e-12);
        }
    }

    #[test]
    fn transpose_flag_inverts_permutation() {
        // With the same swap list, the two flags must produce transposed
        // permutation factors.
        let mut a = CondensedOrthogonalMatrix::new(4, 1, 4, false);
        let mut b = CondensedOrthogonalMatrix::new(4, 1, 4, true);
        for q in [&mut a, &mut b] {
            q.p_mut().push(0, 2);
            q.p_mut().push(1, 3);
            q.p_mut().push(2, 3);
        }
        let ma = a.matrix();
        let mb = b.matrix();
        assert!((ma.transpose() - mb).amax() <= 1e-15);
    }

    #[test]
    fn reset_restores_identity() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut q = random_condensed(&mut rng, 5, true);
        q.reset(false);
        assert!((q.matrix() - DMatrix::identity(5, 5)).amax() == 0.0);
    }

    #[test]
    fn copy_from_replicates_action() {
        let mut rng = StdRng::seed_from_u64(21);
        let src = random_condensed(&mut rng, 6, true);
        let mut dst = CondensedOrthogonalMatrix::new(6, 5, 12, false);
        dst.copy_from(&src);
        assert!((dst.matrix() - src.matrix()).amax() == 0.0);
    }
}
