//! The least-squares objective `1/2 ||J x||^2` and its factorizations.
//!
//! `J` is the `(n-1) x n` Jacobian parameterized by the strictly positive
//! timestep vector `delta` through the reciprocals `d = 1/delta`:
//!
//! ```text
//! row 0: [-(d_0+d_1), d_1, 0, ...]
//! row i: [..., d_i, -(d_i+d_{i+1}), d_{i+1}, ...]
//! ```
//!
//! The solver never materializes `J`: matrix-vector products are applied
//! from `d` directly, and the QR of `J` restricted to the free columns of an
//! active set is assembled from per-run structured blocks factored by
//! [`SpecialQr`]. For small problems every active-set pattern can be
//! factored ahead of time, turning the in-loop QR into a table lookup.

use nalgebra::storage::{Storage, StorageMut};
use nalgebra::{DMatrix, DVector, Dim, Dyn, Matrix};

use crate::condensed::CondensedOrthogonalMatrix;
use crate::error::QpError;
use crate::givens::GivensSequence;
use crate::qr::{block_dims, fill_block, EndType, SpecialQr, StartType};

/// Largest problem size accepted by [`LeastSquareObjective::precompute`];
/// the table holds `2^n` entries.
pub const PRECOMPUTE_LIMIT: usize = 20;

/// A cached QR decomposition for one active-set pattern.
#[derive(Debug, Clone)]
struct Precomputation {
    r: DMatrix<f64>,
    q: CondensedOrthogonalMatrix,
}

/// Computations related to the objective `1/2 ||J x||^2`.
#[derive(Debug, Clone)]
pub struct LeastSquareObjective {
    n: usize,
    delta: DVector<f64>,
    d: DVector<f64>,
    eps_zero: f64,
    special: SpecialQr,
    precomputed: bool,
    precompute_shift: usize,
    precomputations: Vec<Precomputation>,
    // row-permutation scratch, sized n-1
    perm: Vec<usize>,
    used: Vec<bool>,
    pos: Vec<usize>,
    cur: Vec<usize>,
}

impl LeastSquareObjective {
    /// Build the objective from the timestep vector `delta`.
    pub fn new(delta: DVector<f64>) -> Result<Self, QpError> {
        let n = delta.len();
        if n < 3 {
            return Err(QpError::DeltaTooShort(n));
        }
        for (index, &value) in delta.iter().enumerate() {
            if !(value > 0.0) || !value.is_finite() {
                return Err(QpError::NonPositiveDelta { index, value });
            }
        }
        let d = delta.map(|v| 1.0 / v);
        let eps_zero = 1e-15 * delta.amax();
        Ok(Self {
            n,
            delta,
            d,
            eps_zero,
            special: SpecialQr::new(n),
            precomputed: false,
            precompute_shift: 0,
            precomputations: Vec::new(),
            perm: vec![0; n - 1],
            used: vec![false; n - 1],
            pos: vec![0; n - 1],
            cur: vec![0; n - 1],
        })
    }

    /// Size of the problem.
    pub fn size(&self) -> usize {
        self.n
    }

    /// The timestep vector.
    pub fn delta(&self) -> &DVector<f64> {
        &self.delta
    }

    /// Whether [`LeastSquareObjective::precompute`] has run; once true, `qr`
    /// is a pure table lookup.
    pub fn is_precomputed(&self) -> bool {
        self.precomputed
    }

    /// Replace `delta`, invalidating any precomputed decompositions.
    pub fn set_delta(&mut self, delta: DVector<f64>) -> Result<(), QpError> {
        if delta.len() != self.n {
            return Err(QpError::DimensionMismatch {
                what: "delta",
                expected: self.n,
                got: delta.len(),
            });
        }
        let fresh = Self::new(delta)?;
        self.delta = fresh.delta;
        self.d = fresh.d;
        self.eps_zero = fresh.eps_zero;
        self.precomputed = false;
        self.precomputations = Vec::new();
        Ok(())
    }

    /// Objective value `1/2 ||J x||^2`.
    pub fn value(&self, x: &DVector<f64>) -> Result<f64, QpError> {
        if x.len() != self.n {
            return Err(QpError::DimensionMismatch {
                what: "x",
                expected: self.n,
                got: x.len(),
            });
        }
        let d = &self.d;
        let mut acc = 0.0;
        let r0 = d[1] * x[1] - (d[0] + d[1]) * x[0];
        acc += r0 * r0;
        for i in 1..self.n - 1 {
            let ri = d[i] * x[i - 1] - (d[i] + d[i + 1]) * x[i] + d[i + 1] * x[i + 1];
            acc += ri * ri;
        }
        Ok(0.5 * acc)
    }

    /// `Y = J X`. `Y` must be `(n-1) x k` and `X` `n x k`.
    pub fn apply_j_left<C, S1, S2>(
        &self,
        y: &mut Matrix<f64, Dyn, C, S1>,
        x: &Matrix<f64, Dyn, C, S2>,
    ) -> Result<(), QpError>
    where
        C: Dim,
        S1: StorageMut<f64, Dyn, C>,
        S2: Storage<f64, Dyn, C>,
    {
        let n = self.n;
        if x.nrows() != n {
            return Err(QpError::DimensionMismatch {
                what: "X rows",
                expected: n,
                got: x.nrows(),
            });
        }
        if y.nrows() != n - 1 || y.ncols() != x.ncols() {
            return Err(QpError::DimensionMismatch {
                what: "Y shape",
                expected: n - 1,
                got: y.nrows(),
            });
        }
        let d = &self.d;
        for col in 0..x.ncols() {
            y[(0, col)] = d[1] * x[(1, col)] - (d[0] + d[1]) * x[(0, col)];
            for i in 1..n - 1 {
                y[(i, col)] = d[i] * x[(i - 1, col)] - (d[i] + d[i + 1]) * x[(i, col)]
                    + d[i + 1] * x[(i + 1, col)];
            }
        }
        Ok(())
    }

    /// `Y = J^T X`. `Y` must be `n x k` and `X` `(n-1) x k`.
    pub fn apply_jt_left<C, S1, S2>(
        &self,
        y: &mut Matrix<f64, Dyn, C, S1>,
        x: &Matrix<f64, Dyn, C, S2>,
    ) -> Result<(), QpError>
    where
        C: Dim,
        S1: StorageMut<f64, Dyn, C>,
        S2: Storage<f64, Dyn, C>,
    {
        let n = self.n;
        if x.nrows() != n - 1 {
            return Err(QpError::DimensionMismatch {
                what: "X rows",
                expected: n - 1,
                got: x.nrows(),
            });
        }
        if y.nrows() != n || y.ncols() != x.ncols() {
            return Err(QpError::DimensionMismatch {
                what: "Y shape",
                expected: n,
                got: y.nrows(),
            });
        }
        let d = &self.d;
        for col in 0..x.ncols() {
            y[(0, col)] = d[1] * x[(1, col)] - (d[0] + d[1]) * x[(0, col)];
            for i in 1..n - 2 {
                y[(i, col)] = d[i] * x[(i - 1, col)] - (d[i] + d[i + 1]) * x[(i, col)]
                    + d[i + 1] * x[(i + 1, col)];
            }
            y[(n - 2, col)] =
                d[n - 2] * x[(n - 3, col)] - (d[n - 2] + d[n - 1]) * x[(n - 2, col)];
            y[(n - 1, col)] = d[n - 1] * x[(n - 2, col)];
        }
        Ok(())
    }

    /// Materialize `J`. Debug only: allocates.
    pub fn matrix(&self) -> DMatrix<f64> {
        let n = self.n;
        let d = &self.d;
        let mut j = DMatrix::zeros(n - 1, n);
        j[(0, 0)] = -(d[0] + d[1]);
        j[(0, 1)] = d[1];
        for i in 1..n - 1 {
            j[(i, i - 1)] = d[i];
            j[(i, i)] = -(d[i] + d[i + 1]);
            j[(i, i + 1)] = d[i + 1];
        }
        j
    }

    /// Materialize `J` restricted to the columns left free by `act`.
    /// Debug only: allocates.
    pub fn projected_matrix(&self, act: &[bool]) -> Result<DMatrix<f64>, QpError> {
        self.check_mask(act)?;
        let j = self.matrix();
        let free: Vec<usize> = (0..self.n).filter(|&i| !act[i]).collect();
        Ok(j.select_columns(free.iter()))
    }

    /// Build the structured block over `d[dstart..=dend]` with the given
    /// boundary shapes. `jj` must match the block dimensions exactly.
    pub fn build_jj<S>(
        &self,
        jj: &mut Matrix<f64, Dyn, Dyn, S>,
        dstart: usize,
        dend: usize,
        start: StartType,
        end: EndType,
    ) -> Result<(), QpError>
    where
        S: StorageMut<f64, Dyn, Dyn>,
    {
        let (m, c) = self.check_block(jj.nrows(), jj.ncols(), dstart, dend, start, end)?;
        debug_assert_eq!((m, c), jj.shape());
        fill_block(jj, &self.d.as_slice()[dstart..=dend], start, end);
        Ok(())
    }

    /// QR of the structured block over `d[dstart..=dend]`: the triangular
    /// factor lands in `r` and the sweep's rotations are appended to `q`
    /// with plane indices shifted by `extend`.
    #[allow(clippy::too_many_arguments)]
    pub fn qr_jj<S>(
        &mut self,
        r: &mut Matrix<f64, Dyn, Dyn, S>,
        q: &mut GivensSequence,
        extend: usize,
        dstart: usize,
        dend: usize,
        start: StartType,
        end: EndType,
    ) -> Result<(), QpError>
    where
        S: StorageMut<f64, Dyn, Dyn>,
    {
        let (m, c) = self.check_block(r.nrows(), r.ncols(), dstart, dend, start, end)?;
        q.clear();
        self.special.factor(
            &self.d.as_slice()[dstart..=dend],
            start,
            end,
            None,
            None,
            self.eps_zero,
            q,
            extend,
        );
        let work = self.special.work();
        for i in 0..m {
            for j in 0..c {
                r[(i, j)] = if j >= i { work[(i, j)] } else { 0.0 };
            }
        }
        Ok(())
    }

    /// QR of `J` restricted to the free columns of `act`.
    ///
    /// `r` must be `(n-1) x nf` with `nf` the number of free columns, and
    /// `q` sized for `n - 1 + shift` rows; `shift` offsets every rotation
    /// and transposition so the factor can act on a larger stacked matrix.
    /// Returns the cached decomposition when precomputations are available
    /// for this `shift`.
    pub fn qr<S>(
        &mut self,
        r: &mut Matrix<f64, Dyn, Dyn, S>,
        q: &mut CondensedOrthogonalMatrix,
        act: &[bool],
        shift: usize,
    ) -> Result<(), QpError>
    where
        S: StorageMut<f64, Dyn, Dyn>,
    {
        if self.precomputed && shift == self.precompute_shift {
            self.check_mask(act)?;
            let index = act
                .iter()
                .enumerate()
                .fold(0usize, |m, (i, &a)| if a { m | (1 << i) } else { m });
            let cached = &self.precomputations[index];
            if r.shape() != cached.r.shape() {
                return Err(QpError::DimensionMismatch {
                    what: "R rows",
                    expected: cached.r.nrows(),
                    got: r.nrows(),
                });
            }
            r.copy_from(&cached.r);
            q.copy_from(&cached.q);
            return Ok(());
        }
        self.qr_computation(r, q, act, shift)
    }

    /// Factor every possible active-set pattern into a lookup table indexed
    /// by the bitmask of `act`. Exponential in `n`; rejected above
    /// [`PRECOMPUTE_LIMIT`] variables.
    pub fn precompute(&mut self, shift: usize) -> Result<(), QpError> {
        let n = self.n;
        if n > PRECOMPUTE_LIMIT {
            return Err(QpError::PrecomputeTooLarge {
                n,
                limit: PRECOMPUTE_LIMIT,
            });
        }
        let kmax = n / 2 + 1;
        let pmax = 2 * n + 2;
        let count = 1usize << n;
        let mut table = Vec::with_capacity(count);
        let mut act = vec![false; n];
        for mask in 0..count {
            for (i, a) in act.iter_mut().enumerate() {
                *a = (mask >> i) & 1 == 1;
            }
            let nf = n - mask.count_ones() as usize;
            let mut r = DMatrix::zeros(n - 1, nf);
            let mut q = CondensedOrthogonalMatrix::new(n - 1 + shift, kmax, pmax, true);
            self.qr_computation(&mut r, &mut q, &act, shift)?;
            table.push(Precomputation { r, q });
        }
        self.precomputations = table;
        self.precompute_shift = shift;
        self.precomputed = true;
        Ok(())
    }

    /// The segmented QR behind [`LeastSquareObjective::qr`].
    ///
    /// Free columns split into maximal contiguous runs; each run yields a
    /// structured block factored by [`SpecialQr`] into its own sequence of
    /// `q`. Adjacent runs (one fixed column apart) share a Jacobian row: the
    /// trailing entry of the shared row rides through the earlier block's
    /// sweep so both its rescaling and the fill it leaves in the triangle
    /// are accounted for. A final transposition list stacks the per-run
    /// triangles into consecutive rows of `r`.
    fn qr_computation<S>(
        &mut self,
        r: &mut Matrix<f64, Dyn, Dyn, S>,
        q: &mut CondensedOrthogonalMatrix,
        act: &[bool],
        shift: usize,
    ) -> Result<(), QpError>
    where
        S: StorageMut<f64, Dyn, Dyn>,
    {
        let n = self.n;
        self.check_mask(act)?;
        let nf = act.iter().filter(|&&a| !a).count();
        if r.nrows() != n - 1 || r.ncols() != nf {
            return Err(QpError::DimensionMismatch {
                what: "R rows",
                expected: n - 1,
                got: r.nrows(),
            });
        }
        if q.size() != n - 1 + shift {
            return Err(QpError::DimensionMismatch {
                what: "Q size",
                expected: n - 1 + shift,
                got: q.size(),
            });
        }

        q.reset(true);
        r.fill(0.0);
        for u in &mut self.used {
            *u = false;
        }

        let mut tcum = 0; // triangular rows emitted so far
        let mut col0 = 0; // R column of the current run's first free column
        let mut seg = 0;
        let mut carry: Option<f64> = None;

        let mut i = 0;
        while i < n {
            if act[i] {
                i += 1;
                continue;
            }
            let a = i;
            while i < n && !act[i] {
                i += 1;
            }
            let b = i - 1;
            let nc = b - a + 1;

            if a == n - 1 {
                // Lone free column at the right edge: the restricted block
                // is the single entry d_{n-1} in the last row (already
                // rescaled by the previous block when that row is shared),
                // so it is its own 1x1 triangle.
                let value = carry.take().unwrap_or(self.d[n - 1]);
                r[(tcum, col0)] = value;
                self.perm[tcum] = n - 2;
                self.used[n - 2] = true;
                tcum += 1;
                col0 += 1;
                continue;
            }

            let start = if a == 0 {
                StartType::Corner
            } else {
                StartType::Spike
            };
            // A run reaching the last column keeps its trailing entry in the
            // last row (Wide); a run stopping at the second-to-last column
            // closes on the corner, because the Jacobian has no row below it
            // to carry a spike; anything shorter leaves the lone d_{b+1} row.
            let (end, dend) = if b == n - 1 {
                (EndType::Wide, n - 1)
            } else if b == n - 2 {
                (EndType::Corner, n - 1)
            } else {
                (EndType::Spike, b + 1)
            };
            let ra = a.saturating_sub(1);
            // The next run shares this block's trailing row exactly when a
            // single fixed column separates them.
            let next = if b + 2 < n && !act[b + 2] {
                Some(self.d[b + 2])
            } else {
                None
            };

            if seg >= q.kmax() {
                return Err(QpError::DimensionMismatch {
                    what: "Q sequence count",
                    expected: seg + 1,
                    got: q.kmax(),
                });
            }
            let (m, c) = self.special.factor(
                &self.d.as_slice()[a..=dend],
                start,
                end,
                carry.take(),
                next,
                self.eps_zero,
                q.q_mut(seg),
                ra + shift,
            );
            debug_assert_eq!(c, nc);

            let t = m.min(c);
            let work = self.special.work();
            for lr in 0..t {
                for lc in lr..c {
                    r[(tcum + lr, col0 + lc)] = work[(lr, lc)];
                }
                if next.is_some() {
                    // fill spilled onto the next run's first column
                    r[(tcum + lr, col0 + c)] = work[(lr, c)];
                }
                self.perm[tcum + lr] = ra + lr;
                self.used[ra + lr] = true;
            }
            if next.is_some() {
                carry = Some(work[(m - 1, c)]);
            }

            tcum += t;
            col0 += nc;
            seg += 1;
        }

        // Complete the row permutation with the eliminated rows, then encode
        // it as transpositions realized by forward application.
        let mut tgt = tcum;
        for src in 0..n - 1 {
            if !self.used[src] {
                self.perm[tgt] = src;
                tgt += 1;
            }
        }
        debug_assert_eq!(tgt, n - 1);

        for v in 0..n - 1 {
            self.pos[v] = v;
            self.cur[v] = v;
        }
        for k in 0..n - 1 {
            let want = self.perm[k];
            let pk = self.pos[want];
            if pk != k {
                let displaced = self.cur[k];
                q.p_mut().push(k + shift, pk + shift);
                self.cur[k] = want;
                self.cur[pk] = displaced;
                self.pos[want] = k;
                self.pos[displaced] = pk;
            }
        }

        Ok(())
    }

    fn check_mask(&self, act: &[bool]) -> Result<(), QpError> {
        if act.len() != self.n {
            return Err(QpError::DimensionMismatch {
                what: "active mask",
                expected: self.n,
                got: act.len(),
            });
        }
        Ok(())
    }

    fn check_block(
        &self,
        rows: usize,
        cols: usize,
        dstart: usize,
        dend: usize,
        start: StartType,
        end: EndType,
    ) -> Result<(usize, usize), QpError> {
        if dend >= self.n || dstart + 1 > dend {
            return Err(QpError::IndexOutOfRange {
                index: dend,
                size: self.n,
            });
        }
        let (m, c) = block_dims(dend - dstart + 1, start, end);
        if rows != m {
            return Err(QpError::DimensionMismatch {
                what: "block rows",
                expected: m,
                got: rows,
            });
        }
        if cols != c {
            return Err(QpError::DimensionMismatch {
                what: "block columns",
                expected: c,
                got: cols,
            });
        }
        Ok((m, c))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn linspaced(n: usize, lo: f64, hi: f64) -> DVector<f64> {
        DVector::from_fn(n, |i, _| lo + (hi - lo) * i as f64 / (n - 1) as f64)
    }

    fn objective(n: usize) -> LeastSquareObjective {
        LeastSquareObjective::new(linspaced(n, 0.01, 0.19)).unwrap()
    }

    fn assert_upper_triangular(m: &DMatrix<f64>, tol: f64) {
        for i in 0..m.nrows() {
            for j in 0..i.min(m.ncols()) {
                assert!(m[(i, j)].abs() <= tol, "({i}, {j}) = {}", m[(i, j)]);
            }
        }
    }

    #[test]
    fn construction_validates_delta() {
        assert!(matches!(
            LeastSquareObjective::new(DVector::from_column_slice(&[0.1, 0.2])),
            Err(QpError::DeltaTooShort(2))
        ));
        assert!(matches!(
            LeastSquareObjective::new(DVector::from_column_slice(&[0.1, -0.2, 0.3])),
            Err(QpError::NonPositiveDelta { index: 1, .. })
        ));
    }

    #[test]
    fn apply_j_matches_matrix() {
        let mut rng = StdRng::seed_from_u64(41);
        for n in [3, 5, 10] {
            let obj = objective(n);
            let j = obj.matrix();
            let x = DMatrix::from_fn(n, 3, |_, _| rng.gen_range(-1.0..1.0));
            let mut y = DMatrix::zeros(n - 1, 3);
            obj.apply_j_left(&mut y, &x).unwrap();
            assert!((&y - &j * &x).amax() <= 1e-12 * j.amax());
        }
    }

    #[test]
    fn apply_jt_matches_matrix_transpose() {
        let mut rng = StdRng::seed_from_u64(43);
        for n in [3, 5, 10] {
            let obj = objective(n);
            let j = obj.matrix();
            let x = DMatrix::from_fn(n - 1, 2, |_, _| rng.gen_range(-1.0..1.0));
            let mut y = DMatrix::zeros(n, 2);
            obj.apply_jt_left(&mut y, &x).unwrap();
            assert!((&y - j.transpose() * &x).amax() <= 1e-12 * j.amax());
        }
    }

    #[test]
    fn apply_rejects_bad_shapes() {
        let obj = objective(5);
        let x = DMatrix::zeros(4, 1);
        let mut y = DMatrix::zeros(4, 1);
        assert!(obj.apply_j_left(&mut y, &x).is_err());
    }

    #[test]
    fn value_is_half_squared_residual() {
        let mut rng = StdRng::seed_from_u64(47);
        let obj = objective(7);
        let x = DVector::from_fn(7, |_, _| rng.gen_range(-1.0..1.0));
        let jx = obj.matrix() * &x;
        assert!((obj.value(&x).unwrap() - 0.5 * jx.norm_squared()).abs() <= 1e-12);
    }

    #[test]
    fn special_qr_factors_every_block_shape() {
        // Every (start, end) combination over a range of sizes: Q R must
        // reproduce the block and R must be upper triangular.
        let starts = [StartType::Spike, StartType::Corner, StartType::Offset];
        let ends = [EndType::Spike, EndType::Corner, EndType::Wide, EndType::Fold];
        for n in 3..=20 {
            let mut obj = objective(n);
            for &start in &starts {
                for &end in &ends {
                    let (m, c) = block_dims(n, start, end);
                    let mut jj = DMatrix::zeros(m, c);
                    obj.build_jj(&mut jj, 0, n - 1, start, end).unwrap();
                    let mut r = DMatrix::zeros(m, c);
                    let mut q = GivensSequence::default();
                    obj.qr_jj(&mut r, &mut q, 0, 0, n - 1, start, end).unwrap();
                    assert_upper_triangular(&r, 1e-13);
                    let qm = q.matrix(m);
                    let scale = jj.amax();
                    assert!(
                        (&qm * &r - &jj).amax() <= 1e-10 * scale,
                        "Q R != Jj for n={n}, {start:?}/{end:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn qr_jj_extend_offsets_rotations() {
        let mut obj = objective(6);
        let (m, c) = block_dims(6, StartType::Corner, EndType::Spike);
        let mut r = DMatrix::zeros(m, c);
        let mut q = GivensSequence::default();
        obj.qr_jj(&mut r, &mut q, 3, 0, 5, StartType::Corner, EndType::Spike)
            .unwrap();
        assert!(q.iter().all(|g| g.i() >= 3));
    }

    /// Reference check for the segmented factorization: for a given mask,
    /// Q^T (J N_f) must equal R.
    fn check_qr_for_mask(obj: &mut LeastSquareObjective, act: &[bool], shift: usize) {
        let n = obj.size();
        let nf = act.iter().filter(|&&a| !a).count();
        let kmax = n / 2 + 1;
        let mut r = DMatrix::zeros(n - 1, nf);
        let mut q = CondensedOrthogonalMatrix::new(n - 1 + shift, kmax, 2 * n + 2, true);
        obj.qr(&mut r, &mut q, act, shift).unwrap();

        let qm = q.matrix();
        let id = DMatrix::identity(q.size(), q.size());
        assert!((&qm * qm.transpose() - &id).amax() <= 1e-10);
        if nf == 0 {
            return;
        }

        let projected = obj.projected_matrix(act).unwrap();
        // Embed at `shift` rows down, apply Q^T and compare.
        let mut stacked = DMatrix::zeros(n - 1 + shift, nf);
        stacked.view_mut((shift, 0), (n - 1, nf)).copy_from(&projected);
        q.apply_left(&mut stacked);
        let got = stacked.view((shift, 0), (n - 1, nf)).clone_owned();
        let scale = projected.amax().max(1.0);
        assert!(
            (&got - &r).amax() <= 1e-10 * scale,
            "Q^T J_f != R for mask {act:?}"
        );
        assert_upper_triangular(&r, 1e-10 * scale);
        if shift > 0 {
            // A shifted factor must leave the rows above the block alone.
            let top = stacked.view((0, 0), (shift, nf));
            assert!(top.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn qr_handles_every_mask_small() {
        for n in [4, 5, 6] {
            let mut obj = objective(n);
            let mut act = vec![false; n];
            for mask in 0..(1usize << n) {
                for i in 0..n {
                    act[i] = (mask >> i) & 1 == 1;
                }
                check_qr_for_mask(&mut obj, &act, 0);
            }
        }
    }

    #[test]
    fn qr_with_shift_offsets_everything() {
        let mut obj = objective(8);
        let act = [false, true, false, false, true, false, false, false];
        check_qr_for_mask(&mut obj, &act, 1);
    }

    #[test]
    fn precompute_agrees_with_fresh_factorization() {
        let n = 6;
        let mut fresh = objective(n);
        let mut cached = objective(n);
        cached.precompute(1).unwrap();
        assert!(cached.is_precomputed());

        let kmax = n / 2 + 1;
        let mut act = vec![false; n];
        for mask in 0..(1usize << n) {
            for i in 0..n {
                act[i] = (mask >> i) & 1 == 1;
            }
            let nf = act.iter().filter(|&&a| !a).count();
            let mut r1 = DMatrix::zeros(n - 1, nf);
            let mut q1 = CondensedOrthogonalMatrix::new(n, kmax, 2 * n + 2, true);
            fresh.qr(&mut r1, &mut q1, &act, 1).unwrap();
            let mut r2 = DMatrix::zeros(n - 1, nf);
            let mut q2 = CondensedOrthogonalMatrix::new(n, kmax, 2 * n + 2, true);
            cached.qr(&mut r2, &mut q2, &act, 1).unwrap();
            if nf > 0 {
                assert!((&r1 - &r2).amax() <= 1e-10);
            }
            assert!((q1.matrix() - q2.matrix()).amax() <= 1e-10);
        }
    }

    #[test]
    fn precompute_rejects_large_problems() {
        let mut obj = objective(21);
        assert!(matches!(
            obj.precompute(1),
            Err(QpError::PrecomputeTooLarge { n: 21, limit: 20 })
        ));
    }

    #[test]
    fn set_delta_invalidates_precomputations() {
        let mut obj = objective(5);
        obj.precompute(1).unwrap();
        obj.set_delta(linspaced(5, 0.02, 0.2)).unwrap();
        assert!(!obj.is_precomputed());
    }
}
