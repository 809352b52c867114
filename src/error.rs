// src/error.rs
use thiserror::Error;

/// Error taxonomy for the market-model engine
///
/// Setup errors (`InvalidArgument`, `InvalidConfiguration`) are raised at
/// construction time and never mid-simulation. `PreconditionViolation` marks
/// programmer misuse of a stateful object. `NumericalInstability` is the only
/// data-dependent runtime failure and is raised at single-path granularity.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LmmError {
    /// Malformed construction parameters
    #[error("Invalid argument '{parameter}': {reason}")]
    InvalidArgument { parameter: String, reason: String },

    /// Misuse of a stateful object (expired index, advancing past the end)
    #[error("Precondition violated in {context}: {reason}")]
    PreconditionViolation { context: String, reason: String },

    /// Data-dependent numerical failure during evolution or setup
    #[error("Numerical instability in {method}: {reason}")]
    NumericalInstability { method: String, reason: String },

    /// Invalid engine configuration
    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Monte Carlo run failure that is not attributable to a single path
    #[error("Monte Carlo simulation error with {paths} paths: {reason}")]
    MonteCarloError { paths: usize, reason: String },

    /// Run stopped by its cancellation token
    #[error("Monte Carlo run cancelled after {completed_paths} paths")]
    Cancelled { completed_paths: usize },
}

/// Fieldless view of [`LmmError`] for callers that only branch on the category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    PreconditionViolation,
    NumericalInstability,
    InvalidConfiguration,
    MonteCarloError,
    Cancelled,
}

impl LmmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LmmError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            LmmError::PreconditionViolation { .. } => ErrorKind::PreconditionViolation,
            LmmError::NumericalInstability { .. } => ErrorKind::NumericalInstability,
            LmmError::InvalidConfiguration { .. } => ErrorKind::InvalidConfiguration,
            LmmError::MonteCarloError { .. } => ErrorKind::MonteCarloError,
            LmmError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn invalid_argument(parameter: &str, reason: impl Into<String>) -> Self {
        LmmError::InvalidArgument {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn precondition(context: &str, reason: impl Into<String>) -> Self {
        LmmError::PreconditionViolation {
            context: context.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn numerical(method: &str, reason: impl Into<String>) -> Self {
        LmmError::NumericalInstability {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for fast-lmm operations
pub type LmmResult<T> = Result<T, LmmError>;

/// Validation utilities
pub mod validation {
    use super::{LmmError, LmmResult};

    /// Validate that a parameter is positive
    pub fn validate_positive(name: &str, value: f64) -> LmmResult<()> {
        if value.is_nan() || value <= 0.0 {
            Err(LmmError::invalid_argument(
                name,
                format!("{} must be positive (> 0)", value),
            ))
        } else {
            Ok(())
        }
    }

    /// Validate that a parameter is non-negative
    pub fn validate_non_negative(name: &str, value: f64) -> LmmResult<()> {
        if value.is_nan() || value < 0.0 {
            Err(LmmError::invalid_argument(
                name,
                format!("{} must be non-negative (≥ 0)", value),
            ))
        } else {
            Ok(())
        }
    }

    /// Validate that a value is finite and not NaN
    pub fn validate_finite(name: &str, value: f64) -> LmmResult<()> {
        if !value.is_finite() {
            Err(LmmError::invalid_argument(
                name,
                format!("{} must be finite (not NaN or infinite)", value),
            ))
        } else {
            Ok(())
        }
    }

    /// Validate a slice length
    pub fn validate_len(name: &str, actual: usize, expected: usize) -> LmmResult<()> {
        if actual != expected {
            Err(LmmError::invalid_argument(
                name,
                format!("{} values required, {} provided", expected, actual),
            ))
        } else {
            Ok(())
        }
    }

    /// Validate that a sequence of times is finite and strictly increasing
    pub fn validate_strictly_increasing(name: &str, values: &[f64]) -> LmmResult<()> {
        for (i, &v) in values.iter().enumerate() {
            validate_finite(name, v)?;
            if i > 0 && v <= values[i - 1] {
                return Err(LmmError::invalid_argument(
                    name,
                    format!(
                        "must be strictly increasing: element {} ({}) <= element {} ({})",
                        i,
                        v,
                        i - 1,
                        values[i - 1]
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Validate that `index < bound`
    pub fn validate_index(name: &str, index: usize, bound: usize) -> LmmResult<()> {
        if index >= bound {
            Err(LmmError::invalid_argument(
                name,
                format!("index {} out of range (must be < {})", index, bound),
            ))
        } else {
            Ok(())
        }
    }

    /// Validate paths count
    pub fn validate_paths(paths: usize) -> LmmResult<()> {
        if paths == 0 {
            Err(LmmError::InvalidConfiguration {
                field: "paths".to_string(),
                reason: "must be greater than 0".to_string(),
            })
        } else if paths > 1_000_000_000 {
            Err(LmmError::InvalidConfiguration {
                field: "paths".to_string(),
                reason: "exceeds maximum allowed (1 billion)".to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Validate evolution step count
    pub fn validate_steps(steps: usize) -> LmmResult<()> {
        if steps == 0 {
            Err(LmmError::invalid_argument("steps", "must be greater than 0"))
        } else if steps > 100_000 {
            Err(LmmError::invalid_argument(
                "steps",
                "exceeds maximum allowed (100,000)",
            ))
        } else {
            Ok(())
        }
    }
}
