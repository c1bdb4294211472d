//! Dense active-set least-squares engine for capture-point trajectory QPs.
//!
//! The crate solves `min 1/2 ||J x||^2 + 1/2 (j^T x + c)^2` over a box and a
//! single sum inequality, where `J` is the tridiagonal-shaped Jacobian of a
//! centroidal-pendulum discretization. The pieces, bottom up:
//!
//! 1. [`Givens`] / [`GivensSequence`] — plane rotations and their products
//! 2. [`CondensedOrthogonalMatrix`] — `Q_1 ... Q_k P Q_h` with preallocated
//!    storage
//! 3. [`SpecialQr`] — O(n) QR of the structured Jacobian blocks
//! 4. [`LeastSquareObjective`] — `J` products, per-active-set QR, optional
//!    exhaustive precomputation
//! 5. [`LinearConstraints`] — bounds, sum row, active-set bookkeeping
//! 6. [`LeastSquare`] — the primal active-set driver
//!
//! Solves are single-threaded, deterministic, and allocation-free once the
//! driver is constructed.

pub mod condensed;
pub mod constraints;
pub mod error;
pub mod givens;
pub mod objective;
pub mod qr;
pub mod solver;

pub use condensed::{CondensedOrthogonalMatrix, Transpositions};
pub use constraints::{ActivationSide, LinearConstraints, DEFAULT_TOLERANCE};
pub use error::QpError;
pub use givens::{Givens, GivensSequence};
pub use objective::{LeastSquareObjective, PRECOMPUTE_LIMIT};
pub use qr::{block_dims, dense_qr, hessenberg_qr, EndType, SpecialQr, StartType};
pub use solver::{LeastSquare, SolverStatus};
