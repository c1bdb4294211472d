use thiserror::Error;

/// Errors reported by the QP building blocks.
///
/// These are caller programming errors (inconsistent sizes, invalid problem
/// data). Numerical outcomes of a solve (rank deficiency, infeasibility,
/// iteration cap) are reported through
/// [`SolverStatus`](crate::solver::SolverStatus) instead.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum QpError {
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("delta must have at least 3 entries, got {0}")]
    DeltaTooShort(usize),

    #[error("delta entries must be strictly positive: delta[{index}] = {value}")]
    NonPositiveDelta { index: usize, value: f64 },

    #[error("inverted bounds at index {index}: lower {lower} > upper {upper}")]
    InvertedBounds { index: usize, lower: f64, upper: f64 },

    #[error("constraint index {index} out of range for {size} variables")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("precomputation is limited to {limit} variables, got {n}")]
    PrecomputeTooLarge { n: usize, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            QpError::DimensionMismatch {
                what: "x",
                expected: 10,
                got: 9
            }
            .to_string(),
            "Dimension mismatch for x: expected 10, got 9"
        );
        assert_eq!(
            QpError::NonPositiveDelta {
                index: 2,
                value: -0.5
            }
            .to_string(),
            "delta entries must be strictly positive: delta[2] = -0.5"
        );
        assert_eq!(
            QpError::PrecomputeTooLarge { n: 24, limit: 20 }.to_string(),
            "precomputation is limited to 20 variables, got 24"
        );
    }
}
