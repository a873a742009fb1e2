use crate::core::error::{FailScope, RxError};

/// Message-passing seam between this core and the process group running it.
///
/// Implementations must be thread-safe: list building and force evaluation may
/// hold a shared reference across rayon workers.
pub trait Communicator: Send + Sync {
    /// Rank of this process inside the group.
    fn rank(&self) -> usize;

    /// Number of cooperating processes.
    fn size(&self) -> usize {
        1
    }

    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Root passes `Some(line)` or `None` at end of input; every rank receives
    /// the root's value.
    fn broadcast_line(&self, line: Option<String>) -> Option<String>;

    /// Reports a fatal condition with its scope and hands the error back for
    /// propagation. A multi-process implementation aborts the group here.
    fn fail(&self, error: RxError) -> RxError;
}

/// Single-process communicator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn broadcast_line(&self, line: Option<String>) -> Option<String> {
        line
    }

    fn fail(&self, error: RxError) -> RxError {
        match error.scope() {
            FailScope::All => log::error!("fatal (all ranks): {}", error),
            FailScope::Local => log::error!("fatal (rank {}): {}", self.rank(), error),
        }
        error
    }
}
