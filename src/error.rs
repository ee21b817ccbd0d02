//! Typed failures the checker branches on.
//!
//! Everything else travels as `anyhow::Error`; these two are kept typed so a
//! scenario can tell an expected refusal apart from a broken invariant.
use thiserror::Error;

/// The hoard tool exited with a non-zero status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("hoard exited with {}", describe_code(.code))]
pub struct ToolInvocationError {
    /// Exit code, or `None` when the child was terminated by a signal.
    pub code: Option<i32>,
}

/// A checksum or identity invariant did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("assertion failed: {message}")]
pub struct AssertionFailure {
    pub message: String,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fail with an [`AssertionFailure`] unless `cond` holds.
pub fn ensure_that(cond: bool, message: impl Into<String>) -> Result<(), AssertionFailure> {
    if cond {
        Ok(())
    } else {
        Err(AssertionFailure::new(message))
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
