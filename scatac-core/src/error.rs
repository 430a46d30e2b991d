//! Structured error types for the scATAC pipeline.

use thiserror::Error;

/// Unified error type for all pipeline operations.
///
/// Every variant is fatal to a run: the pipeline is a one-shot batch job and
/// the recovery action is inspecting the input.
#[derive(Debug, Error)]
pub enum ScatacError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error (malformed input table)
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input (bad arguments, out-of-range values)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The input carries no usable information: empty matrix, all-zero
    /// counts, or a single-class label set.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Requested latent dimension exceeds the feasible rank.
    #[error("rank error: {0}")]
    Rank(String),

    /// Cell identifier universes of two joined tables differ.
    #[error("join mismatch: {0}")]
    JoinMismatch(String),

    /// A stratified split cannot place every class in both partitions.
    #[error("partition error: {0}")]
    Partition(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ScatacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let e = ScatacError::Rank("k=50 > 9".into());
        assert_eq!(e.to_string(), "rank error: k=50 > 9");
        let e = ScatacError::JoinMismatch("3 labels for 4 cells".into());
        assert!(e.to_string().starts_with("join mismatch"));
    }

    #[test]
    fn io_error_converts() {
        fn open() -> Result<std::fs::File> {
            Ok(std::fs::File::open("/nonexistent/scatac/input.csv")?)
        }
        assert!(matches!(open(), Err(ScatacError::Io(_))));
    }
}
