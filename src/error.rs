use thiserror::Error;

/// Everything that can stop a triangle counting run.
///
/// None of these are retried: a worker that hits one leaves the run after the
/// closing barrier and every other worker reports [`TcError::Aborted`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TcError {
    #[error("partition violation on rank {rank}: packet targets local row {target_vertex} but only {local_rows} rows are owned")]
    PartitionViolation {
        rank: usize,
        target_vertex: usize,
        local_rows: usize,
    },

    #[error("malformed graph: {0}")]
    MalformedGraph(String),

    #[error("invalid actor transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::ActorState,
        to: crate::ActorState,
    },

    #[error("mailbox on rank {rank} closed before all workers finished")]
    MailboxClosed { rank: usize },

    #[error("rank {rank} aborted because another worker failed")]
    Aborted { rank: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl TcError {
    /// `Aborted` is only a consequence of some other worker's failure.
    pub fn is_root_cause(&self) -> bool {
        !matches!(self, TcError::Aborted { .. })
    }
}

pub type Result<T> = std::result::Result<T, TcError>;
