//! Structured QR kernels.
//!
//! The objective Jacobian restricted to a set of free columns splits into
//! blocks with three nonzeros per row (a tridiagonal body with boundary
//! rows). [`SpecialQr`] factors one such block with a left-to-right sweep of
//! Givens rotations, touching only the occupied band of each row, so a
//! factorization costs O(rows).
//!
//! [`hessenberg_qr`] and [`dense_qr`] are the small generic companions used
//! by the driver to fold a dense leading row into an already-triangular
//! block and to factor the reduced system of the sum-constrained step.

use nalgebra::storage::StorageMut;
use nalgebra::{DMatrix, Dim, Matrix};

use crate::givens::{Givens, GivensSequence};

/// Shape of the opening rows of a structured block.
///
/// With `e` the vector of reciprocals feeding the block, the body rows have
/// the form `[e_i, -e_i-e_{i+1}, e_{i+1}]`, one column to the right per row.
/// The variant selects what sits above the first full body row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartType {
    /// A lone `e_0` row sits above the first full row: the block belongs to
    /// a column run with a fixed neighbor on its left.
    Spike,
    /// The block opens directly on `[-e_0-e_1, e_1]`: the run starts at the
    /// first column of the Jacobian.
    Corner,
    /// Opens with `[-e_0, e_0]` and the body shifted one column right.
    Offset,
}

/// Shape of the closing rows of a structured block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndType {
    /// A lone `e_k` row is appended below the last full row: the run has a
    /// fixed neighbor on its right.
    Spike,
    /// The block closes on the `-e_{k-1}-e_k` corner.
    Corner,
    /// A trailing column carrying `e_k` extends the last row: the run
    /// reaches the last column of the Jacobian.
    Wide,
    /// An extra `[e_k, -e_k]` row closes the block.
    Fold,
}

/// Rows and columns of the block built over `len` entries of `e`; use it to
/// size the triangular factor before calling [`SpecialQr::qr`].
pub fn block_dims(len: usize, start: StartType, end: EndType) -> (usize, usize) {
    debug_assert!(len >= 2);
    let k = len - 1;
    let (r_last, c_plus) = match start {
        StartType::Corner => (k - 1, k - 1),
        StartType::Spike => (k, k - 1),
        StartType::Offset => (k, k),
    };
    let c_super = c_plus + 1;
    match end {
        EndType::Corner => (r_last + 1, c_plus + 1),
        EndType::Spike => (r_last + 2, c_plus + 1),
        EndType::Wide => (r_last + 1, c_super + 1),
        EndType::Fold => (r_last + 2, c_super + 1),
    }
}

/// Write the structured block into the top-left `(m, c)` region of `w`.
/// The region is zeroed first; entries falling outside `c` columns are the
/// truncation the end type asks for.
pub(crate) fn fill_block<R, C, S>(
    w: &mut Matrix<f64, R, C, S>,
    e: &[f64],
    start: StartType,
    end: EndType,
) where
    R: Dim,
    C: Dim,
    S: StorageMut<f64, R, C>,
{
    let k = e.len() - 1;
    let (m, c) = block_dims(e.len(), start, end);
    debug_assert!(w.nrows() >= m && w.ncols() >= c);

    for j in 0..c {
        for i in 0..m {
            w[(i, j)] = 0.0;
        }
    }

    match start {
        StartType::Corner => {
            for t in 0..k {
                if t >= 1 {
                    w[(t, t - 1)] = e[t];
                }
                w[(t, t)] = -e[t] - e[t + 1];
                if t + 1 < c {
                    w[(t, t + 1)] = e[t + 1];
                }
            }
        }
        StartType::Spike => {
            w[(0, 0)] = e[0];
            for t in 1..=k {
                if t >= 2 {
                    w[(t, t - 2)] = e[t - 1];
                }
                w[(t, t - 1)] = -e[t - 1] - e[t];
                if t < c {
                    w[(t, t)] = e[t];
                }
            }
        }
        StartType::Offset => {
            w[(0, 0)] = -e[0];
            if c > 1 {
                w[(0, 1)] = e[0];
            }
            for t in 1..=k {
                w[(t, t - 1)] = e[t - 1];
                w[(t, t)] = -e[t - 1] - e[t];
                if t + 1 < c {
                    w[(t, t + 1)] = e[t];
                }
            }
        }
    }

    match end {
        EndType::Corner | EndType::Wide => {}
        EndType::Spike => {
            w[(m - 1, c - 1)] = e[k];
        }
        EndType::Fold => {
            w[(m - 1, c - 2)] = e[k];
            w[(m - 1, c - 1)] = -e[k];
        }
    }
}

/// Workspace for the structured-block QR sweep.
///
/// Owns a scratch matrix and per-row band bounds; no numeric state persists
/// across calls.
#[derive(Debug, Clone)]
pub struct SpecialQr {
    work: DMatrix<f64>,
    hi: Vec<usize>,
}

impl SpecialQr {
    /// Workspace for blocks over at most `n_max` reciprocal entries.
    pub fn new(n_max: usize) -> Self {
        Self {
            work: DMatrix::zeros(n_max + 2, n_max + 2),
            hi: vec![0; n_max + 2],
        }
    }

    /// Scratch view of the last factorization result (row-echelon form of
    /// the block, plus the tracked neighbor column when one was requested).
    pub(crate) fn work(&self) -> &DMatrix<f64> {
        &self.work
    }

    /// QR of a standalone structured block: writes the triangular factor of
    /// the block over `e` into `r` (sized per [`block_dims`]) and appends
    /// the rotations to `seq`. Rotation targets with both entries below
    /// `eps_zero` are recorded as identities.
    pub fn qr<R, C, S>(
        &mut self,
        r: &mut Matrix<f64, R, C, S>,
        seq: &mut GivensSequence,
        e: &[f64],
        start: StartType,
        end: EndType,
        eps_zero: f64,
    ) where
        R: Dim,
        C: Dim,
        S: StorageMut<f64, R, C>,
    {
        let (m, c) = self.factor(e, start, end, None, None, eps_zero, seq, 0);
        debug_assert_eq!((m, c), r.shape());
        for i in 0..m {
            for j in 0..c {
                r[(i, j)] = if j >= i { self.work[(i, j)] } else { 0.0 };
            }
        }
    }

    /// Factor the structured block built from `e`, appending the sweep's
    /// rotations to `seq` with plane indices shifted by `extend`. Returns
    /// the block dimensions `(m, c)`.
    ///
    /// `top` overrides the leading spike entry: when the previous block of a
    /// segmented factorization shares this block's first row, the rotations
    /// of that block have already rescaled it. `next` is the leading entry
    /// of the following adjacent block; it rides along in an extra column so
    /// that its rescaling and the fill it spills into this block's rows come
    /// out of the same sweep.
    ///
    /// When both entries of a rotation target lie below `eps_zero` the
    /// rotation is recorded as the identity, keeping the sequence length
    /// independent of the data.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn factor(
        &mut self,
        e: &[f64],
        start: StartType,
        end: EndType,
        top: Option<f64>,
        next: Option<f64>,
        eps_zero: f64,
        seq: &mut GivensSequence,
        extend: usize,
    ) -> (usize, usize) {
        let (m, c) = block_dims(e.len(), start, end);
        fill_block(&mut self.work, e, start, end);

        if let Some(t) = top {
            debug_assert_eq!(start, StartType::Spike);
            self.work[(0, 0)] = t;
        }
        let tot = if let Some(f) = next {
            for i in 0..m {
                self.work[(i, c)] = 0.0;
            }
            self.work[(m - 1, c)] = f;
            c + 1
        } else {
            c
        };

        // Band profile of each row (exclusive upper column bound).
        for t in 0..m {
            self.hi[t] = match start {
                StartType::Corner => (t + 2).min(c),
                StartType::Spike => {
                    if t == 0 {
                        1
                    } else {
                        (t + 1).min(c)
                    }
                }
                StartType::Offset => (t + 2).min(c),
            };
        }
        if matches!(end, EndType::Spike | EndType::Fold) {
            self.hi[m - 1] = c;
        }
        if next.is_some() {
            self.hi[m - 1] = tot;
        }

        // One pivot per column; a spike start leaves two entries below the
        // diagonal, everything else one.
        let depth = if start == StartType::Spike { 2 } else { 1 };
        for col in 0..(m - 1).min(c) {
            let rmax = (m - 1).min(col + depth);
            for r in (col + 1)..=rmax {
                let a = self.work[(col, col)];
                let b = self.work[(r, col)];
                let mut g = if a.abs() <= eps_zero && b.abs() <= eps_zero {
                    Givens::identity(col, r)
                } else {
                    let (g, rr) = Givens::zeroing(col, r, a, b);
                    self.work[(col, col)] = rr;
                    self.work[(r, col)] = 0.0;
                    let hi = self.hi[col].max(self.hi[r]);
                    g.apply_left_cols(&mut self.work, col + 1, hi);
                    self.hi[col] = hi;
                    self.hi[r] = hi;
                    g
                };
                g.extend(extend);
                seq.push(g);
            }
        }

        (m, c)
    }
}

/// Fold a dense leading row into the upper-triangular block below it.
///
/// The input must be upper Hessenberg: row 0 dense, row `1 + r` zero left of
/// column `r`. One rotation per column is appended to `seq` (identity when
/// the subdiagonal entry is already zero, so the sequence length only
/// depends on the shape).
pub fn hessenberg_qr<R, C, S>(m: &mut Matrix<f64, R, C, S>, seq: &mut GivensSequence)
where
    R: Dim,
    C: Dim,
    S: StorageMut<f64, R, C>,
{
    let (rows, cols) = m.shape();
    if rows < 2 {
        return;
    }
    for k in 0..cols.min(rows - 1) {
        let a = m[(k, k)];
        let b = m[(k + 1, k)];
        if b == 0.0 {
            seq.push(Givens::identity(k, k + 1));
            continue;
        }
        let (g, r) = Givens::zeroing(k, k + 1, a, b);
        m[(k, k)] = r;
        m[(k + 1, k)] = 0.0;
        g.apply_left_cols(m, k + 1, cols);
        seq.push(g);
    }
}

/// Dense QR by Givens rotations, for the small reduced systems of the
/// sum-constrained step. Rotations are appended to `seq`.
pub fn dense_qr<R, C, S>(m: &mut Matrix<f64, R, C, S>, seq: &mut GivensSequence)
where
    R: Dim,
    C: Dim,
    S: StorageMut<f64, R, C>,
{
    let (rows, cols) = m.shape();
    if rows < 2 {
        return;
    }
    for k in 0..cols.min(rows - 1) {
        for r in (k + 1)..rows {
            let b = m[(r, k)];
            if b == 0.0 {
                continue;
            }
            let a = m[(k, k)];
            let (g, rr) = Givens::zeroing(k, r, a, b);
            m[(k, k)] = rr;
            m[(r, k)] = 0.0;
            g.apply_left_cols(m, k + 1, cols);
            seq.push(g);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn assert_upper_triangular(m: &DMatrix<f64>, tol: f64) {
        for i in 0..m.nrows() {
            for j in 0..i.min(m.ncols()) {
                assert!(
                    m[(i, j)].abs() <= tol,
                    "entry ({i}, {j}) = {} not eliminated",
                    m[(i, j)]
                );
            }
        }
    }

    #[test]
    fn hessenberg_qr_triangularizes() {
        let mut rng = StdRng::seed_from_u64(31);
        for n in 2..8 {
            // Dense first row over an upper-triangular block.
            let mut m = DMatrix::zeros(n + 1, n);
            for j in 0..n {
                m[(0, j)] = rng.gen_range(-1.0..1.0);
                for i in j..n {
                    m[(1 + j, i)] = rng.gen_range(-1.0..1.0);
                }
            }
            let m0 = m.clone();
            let mut seq = GivensSequence::default();
            hessenberg_qr(&mut m, &mut seq);
            assert_eq!(seq.len(), n);
            assert_upper_triangular(&m, 1e-13);
            // Q R == M
            let q = seq.matrix(n + 1);
            assert!((q * &m - m0).amax() <= 1e-12);
        }
    }

    #[test]
    fn dense_qr_triangularizes() {
        let mut rng = StdRng::seed_from_u64(37);
        for (rows, cols) in [(5, 3), (6, 6), (4, 2)] {
            let mut m = DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0));
            let m0 = m.clone();
            let mut seq = GivensSequence::default();
            dense_qr(&mut m, &mut seq);
            assert_upper_triangular(&m, 1e-13);
            let q = seq.matrix(rows);
            assert!((q * &m - m0).amax() <= 1e-12);
        }
    }

    #[test]
    fn block_dims_cover_every_shape() {
        // Spot checks against the row/column shapes of the block family.
        assert_eq!(block_dims(4, StartType::Corner, EndType::Spike), (4, 3));
        assert_eq!(block_dims(4, StartType::Corner, EndType::Wide), (3, 4));
        assert_eq!(block_dims(4, StartType::Spike, EndType::Spike), (5, 3));
        assert_eq!(block_dims(4, StartType::Spike, EndType::Wide), (4, 4));
        assert_eq!(block_dims(4, StartType::Offset, EndType::Corner), (4, 4));
        assert_eq!(block_dims(4, StartType::Offset, EndType::Fold), (5, 5));
    }
}
