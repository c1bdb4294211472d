//! Capture-problem definition layer.
//!
//! Turns raw capture-problem data (timesteps, stiffness window, initial
//! frequency window, heights) into the objective and constraints consumed by
//! the [`capstan_qp`] engine:
//!
//! - [`RawProblem`] — the `key = value ;` problem-file format and its
//!   validation
//! - [`Problem`] — bound wiring (stiffness zonotope, pinned first step, the
//!   squared-frequency sum window) kept in sync through setters
//! - [`BoundednessConstraint`] — the nonlinear capturability condition,
//!   evaluated as a side channel and linearized by outer drivers

pub mod boundedness;
pub mod error;
pub mod problem;

pub use boundedness::BoundednessConstraint;
pub use error::CaptureError;
pub use problem::{Problem, RawProblem};
