//! Error types for Ripple.

use thiserror::Error;

/// Result type alias for Ripple operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by containers, operators and streams.
///
/// `Argument` and `IndexOutOfRange` are returned synchronously from the call
/// that caused them. `TransformFailure` and `UpstreamFailure` travel through
/// `Observer::on_error` and never terminate a stream on their own.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Invalid construction or call arguments.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Positional mutation outside the current bounds.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Operation attempted after the owner was disposed.
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    /// A user projection failed.
    #[error("transform failed: {0}")]
    TransformFailure(String),

    /// Failure signalled by an upstream source.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
}

impl Error {
    /// Creates an argument error.
    pub fn argument(message: impl Into<String>) -> Self {
        Error::Argument(message.into())
    }

    /// Creates an index error.
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Error::IndexOutOfRange { index, len }
    }

    /// Creates a transform failure from any displayable error.
    pub fn transform_failure(err: impl core::fmt::Display) -> Self {
        Error::TransformFailure(err.to_string())
    }

    /// Creates an upstream failure.
    pub fn upstream(message: impl Into<String>) -> Self {
        Error::UpstreamFailure(message.into())
    }

    /// Returns true for errors that leave the stream usable.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Error::TransformFailure(_) | Error::UpstreamFailure(_))
    }
}

/// Checks `index < len`.
#[inline]
pub fn check_index(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(Error::index_out_of_range(index, len))
    }
}

/// Checks `index <= len`, the bound for insertion points.
#[inline]
pub fn check_insert_index(index: usize, len: usize) -> Result<()> {
    if index <= len {
        Ok(())
    } else {
        Err(Error::index_out_of_range(index, len))
    }
}

/// Checks that `count` items starting at `index` fit in `len`.
///
/// An end past `usize::MAX` is reported as `usize::MAX`.
#[inline]
pub fn check_range(index: usize, count: usize, len: usize) -> Result<()> {
    match index.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::index_out_of_range(index.saturating_add(count), len)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::index_out_of_range(5, 3);
        assert!(err.to_string().contains("index 5"));

        let err = Error::Disposed("SourceList");
        assert_eq!(err.to_string(), "SourceList has been disposed");

        let err = Error::transform_failure("boom");
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_error_resumable() {
        assert!(Error::upstream("x").is_resumable());
        assert!(Error::transform_failure("x").is_resumable());
        assert!(!Error::argument("x").is_resumable());
        assert!(!Error::Disposed("x").is_resumable());
    }

    #[test]
    fn test_check_bounds() {
        assert!(check_index(0, 1).is_ok());
        assert_eq!(check_index(1, 1), Err(Error::index_out_of_range(1, 1)));
        assert!(check_insert_index(1, 1).is_ok());
        assert!(check_insert_index(2, 1).is_err());
        assert!(check_range(1, 2, 3).is_ok());
        assert!(check_range(3, 0, 3).is_ok());
        assert_eq!(check_range(2, 2, 3), Err(Error::index_out_of_range(4, 3)));
        assert_eq!(check_range(usize::MAX, 2, 3), Err(Error::index_out_of_range(usize::MAX, 3)));
    }
}
