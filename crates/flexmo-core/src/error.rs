//! Unified error type for the flexmo crates
//!
//! [`FlexError`] covers the failure kinds of the optimization pipeline:
//! fusion input problems, builder validation, solver failures and
//! post-solve consistency checks. Library functions return [`FlexResult`];
//! the CLI converts into `anyhow` at its boundary.
//!
//! # Example
//!
//! ```ignore
//! use flexmo_core::{FlexError, FlexResult};
//!
//! fn optimize(frame: &MarketFrame) -> FlexResult<ResultSet> {
//!     let reserve = add_reserve_constraints(&mut model, &target, &config)?;
//!     let solved = solve(model, &[reserve.clone()], &SolverSettings::default())?;
//!     ResultSet::extract(&solved, &reserve)
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlexError {
    /// No recognizable market CSV was found; fatal to the fusion stage.
    #[error("no input: {0}")]
    NoInput(String),

    /// A single input file could not be parsed. Fusion records it and moves on.
    #[error("parse warning in {file}: {message}")]
    ParseWarn { file: String, message: String },

    /// Programmatic inputs failed validation (lengths, limits, time index).
    #[error("bad input: {0}")]
    BadInput(String),

    /// The solver reported infeasibility, unboundedness or a timeout.
    #[error("solver failure: {0}")]
    SolverFailure(String),

    /// A solved model violates an invariant the constraints should guarantee.
    #[error("extraction mismatch: {0}")]
    ExtractionMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// Wrapped errors from helpers that use `anyhow`
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using FlexError.
pub type FlexResult<T> = Result<T, FlexError>;

impl FlexError {
    /// Shorthand for a per-file parse warning.
    pub fn parse_warn(file: impl Into<String>, message: impl Into<String>) -> Self {
        FlexError::ParseWarn {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Whether the fusion stage may skip past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FlexError::ParseWarn { .. } | FlexError::Csv(_))
    }
}

impl From<anyhow::Error> for FlexError {
    fn from(err: anyhow::Error) -> Self {
        FlexError::Other(format!("{err:#}"))
    }
}

impl From<chrono::ParseError> for FlexError {
    fn from(err: chrono::ParseError) -> Self {
        FlexError::BadInput(format!("timestamp: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlexError::SolverFailure("infeasible".into());
        assert!(err.to_string().contains("solver failure"));
        assert!(err.to_string().contains("infeasible"));

        let warn = FlexError::parse_warn("picasso_2024.csv", "no time column");
        assert_eq!(
            warn.to_string(),
            "parse warning in picasso_2024.csv: no time column"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FlexError = io_err.into();
        assert!(matches!(err, FlexError::Io(_)));
    }

    #[test]
    fn test_recoverable_kinds() {
        assert!(FlexError::parse_warn("a.csv", "x").is_recoverable());
        assert!(!FlexError::NoInput("empty".into()).is_recoverable());
        assert!(!FlexError::BadInput("len".into()).is_recoverable());
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> FlexResult<()> {
            Err(FlexError::BadInput("test".into()))
        }

        fn outer() -> FlexResult<()> {
            inner()?;
            Ok(())
        }

        assert!(matches!(outer(), Err(FlexError::BadInput(_))));
    }
}
