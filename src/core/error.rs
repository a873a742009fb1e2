use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Who has to hear about a fatal condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailScope {
    /// Every cooperating process detects the same condition and aborts together.
    All,
    /// Only the detecting process knows; it must abort the run on its own.
    Local,
}

impl fmt::Display for FailScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailScope::All => write!(f, "all"),
            FailScope::Local => write!(f, "local"),
        }
    }
}

/// Every failure this crate can produce. None of them is retried.
#[derive(Debug, Error)]
pub enum RxError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed exp6/rx potential file: {0}")]
    MalformedPotentialFile(String),

    #[error("cannot read exp6/rx potential file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    #[error("neighbor list overflow: {0}")]
    Capacity(String),

    #[error("restart stream error: {0}")]
    Restart(#[from] std::io::Error),
}

impl RxError {
    pub fn scope(&self) -> FailScope {
        match self {
            RxError::Io { .. } | RxError::Capacity(_) | RxError::Restart(_) => FailScope::Local,
            _ => FailScope::All,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        RxError::Configuration(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        RxError::MalformedPotentialFile(msg.into())
    }

    pub fn degenerate(msg: impl Into<String>) -> Self {
        RxError::NumericalDegeneracy(msg.into())
    }
}

pub type Result<T, E = RxError> = std::result::Result<T, E>;
