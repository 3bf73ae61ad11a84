//! Preview rendering errors.

use std::time::Duration;

/// What went wrong while producing a screenshot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("chrome/chromium not detected on your system")]
    ChromeNotFound,
    #[error("Chrome did not finish within {0:?}")]
    ChromeTimeout(Duration),
    /// Chrome exited with a non-zero exit code.
    #[error("Chrome exited with code: {0}")]
    ChromeFailed(i32),
    /// No exit code at all: killed by a signal or crashed.
    #[error("Chrome was terminated before exiting")]
    ChromeKilled,
    #[error("Chrome exited without writing a screenshot")]
    MissingScreenshot,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if retrying the same site might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ChromeTimeout(_) | Error::ChromeKilled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
