//! Error kinds raised by the library and the caller-supplied error history.
//!
//! Every fallible call returns `anyhow::Result<T>`. The classified failures
//! are `SddsError` values carried inside the `anyhow::Error`, so callers can
//! either `downcast_ref::<SddsError>()` or ask `error_kind()` for the class.

use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum SddsError {
    /// Duplicate/unknown name, invalid type, malformed header, conflicting flags.
    #[error("schema error: {0}")]
    Schema(String),
    /// Growing a buffer failed.
    #[error("allocation error: {0}")]
    Allocation(String),
    /// A token does not parse as its declared type, or a row layout mismatch.
    #[error("format error: {0}")]
    Format(String),
    /// The stream ended in the middle of a page.
    #[error("truncated data: {0}")]
    Truncation(String),
    /// Another writer holds the file.
    #[error("lock error: {0}")]
    Lock(String),
    /// API misuse (wrong state, non-seekable stream, ...).
    #[error("usage error: {0}")]
    Usage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Allocation,
    Format,
    Truncation,
    Lock,
    Usage,
    Io,
    Other,
}

impl SddsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SddsError::Schema(_) => ErrorKind::Schema,
            SddsError::Allocation(_) => ErrorKind::Allocation,
            SddsError::Format(_) => ErrorKind::Format,
            SddsError::Truncation(_) => ErrorKind::Truncation,
            SddsError::Lock(_) => ErrorKind::Lock,
            SddsError::Usage(_) => ErrorKind::Usage,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Schema => "schema",
            ErrorKind::Allocation => "allocation",
            ErrorKind::Format => "format",
            ErrorKind::Truncation => "truncation",
            ErrorKind::Lock => "lock",
            ErrorKind::Usage => "usage",
            ErrorKind::Io => "io",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Classify an error by walking its cause chain.
///
/// The first `SddsError` found wins. An `std::io::Error` with
/// `UnexpectedEof` counts as truncation; any other I/O error as `Io`.
pub fn error_kind(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<SddsError>() {
            return e.kind();
        }
    }
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<std::io::Error>() {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return ErrorKind::Truncation;
            }
            return ErrorKind::Io;
        }
    }
    ErrorKind::Other
}

/// True for failures a row read may recover from (formatting or truncation).
pub fn is_row_recoverable(err: &anyhow::Error) -> bool {
    matches!(error_kind(err), ErrorKind::Format | ErrorKind::Truncation)
}

/// Explicit, caller-owned collector of error messages.
///
/// Clones share the same underlying list, so a test can keep one handle and
/// hand another to a dataset.
#[derive(Debug, Clone, Default)]
pub struct ErrorHistory {
    inner: Arc<Mutex<Vec<String>>>,
}

impl ErrorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: Into<String>>(&self, msg: S) {
        if let Ok(mut v) = self.inner.lock() {
            v.push(msg.into());
        }
    }

    pub fn record(&self, err: &anyhow::Error) {
        self.push(format!("{:#}", err));
    }

    pub fn messages(&self) -> Vec<String> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut v) = self.inner.lock() {
            v.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn kind_survives_context() {
        let e: anyhow::Error = anyhow!(SddsError::Schema("dup".into()));
        let e = e.context("define column");
        assert_eq!(error_kind(&e), ErrorKind::Schema);
    }

    #[test]
    fn io_eof_is_truncation() {
        let r: Result<(), std::io::Error> = Err(std::io::ErrorKind::UnexpectedEof.into());
        let e = r.context("read row").unwrap_err();
        assert_eq!(error_kind(&e), ErrorKind::Truncation);
        assert!(is_row_recoverable(&e));
    }

    #[test]
    fn history_is_shared_between_clones() {
        let h = ErrorHistory::new();
        let h2 = h.clone();
        h2.record(&anyhow!(SddsError::Usage("closed".into())));
        assert_eq!(h.len(), 1);
        assert!(h.messages()[0].contains("usage error"));
        h.clear();
        assert!(h2.is_empty());
    }
}
