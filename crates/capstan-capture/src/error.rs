use thiserror::Error;

use capstan_qp::QpError;

/// Errors of the capture-problem layer.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("QP error: {0}")]
    Qp(#[from] QpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("no element {0} found in the file")]
    MissingKey(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("phase sequence not positive at step {0}")]
    NonPositivePhase(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            CaptureError::MissingKey("Delta".into()).to_string(),
            "no element Delta found in the file"
        );
        assert_eq!(
            CaptureError::Parse {
                line: 4,
                message: "missing ';'".into()
            }
            .to_string(),
            "parse error at line 4: missing ';'"
        );
        let err: CaptureError = QpError::DeltaTooShort(1).into();
        assert!(matches!(err, CaptureError::Qp(_)));
    }
}
