use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Supervisor-level errors.
///
/// Transport failures are never retried; the physical bus state is cleaned
/// up by the scoped guards in `supervisor`, `clock` and `step` before an
/// error reaches the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The I2C round trip to an expander chip failed.
    #[error("I2C transport failure: {0}")]
    Transport(#[from] io::Error),

    /// A bounded wait on a target signal expired. Carries the name of the
    /// condition that was being polled.
    #[error("timed out after {timeout:?} waiting for {condition}")]
    Timeout {
        condition: &'static str,
        timeout: Duration,
    },

    /// A value outside its domain reached the supervisor.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
