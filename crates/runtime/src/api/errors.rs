//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from worker coordination, the loopback transport and the
//! combat rules so clients can bubble them up with consistent context.
use combat_core::{
    ActorId, CastRejection, CombatError, ErrorSeverity, GameError, InterruptFailReason,
};
use thiserror::Error;
use tokio::sync::oneshot;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("simulation worker command channel closed")]
    CommandChannelClosed,

    #[error("simulation worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("simulation worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error("actor {actor} does not exist")]
    UnknownActor { actor: ActorId },

    #[error("actor {actor} already exists")]
    DuplicateActor { actor: ActorId },

    #[error("actor {actor} has no threat table")]
    NoThreatTable { actor: ActorId },

    #[error("actor {actor} rejected the cast")]
    Cast {
        actor: ActorId,
        #[source]
        rejection: CastRejection,
    },

    #[error("interrupting actor {actor} failed: {reason}")]
    Interrupt {
        actor: ActorId,
        reason: InterruptFailReason,
    },

    #[error(transparent)]
    Combat(#[from] CombatError),

    #[error("failed to encode a network message")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode a network message")]
    Decode(#[source] bincode::Error),

    #[error("shared transport queue lock poisoned")]
    PoisonedLock,

    #[error("failed to load combat content: {message}")]
    Content { message: String },

    #[error("failed to install the tracing subscriber")]
    Tracing(#[source] tracing_subscriber::util::TryInitError),

    #[error("failed to prepare the log directory")]
    LogDirectory(#[source] std::io::Error),
}

impl RuntimeError {
    pub(crate) fn content(error: anyhow::Error) -> Self {
        Self::Content {
            message: format!("{error:#}"),
        }
    }
}

impl GameError for RuntimeError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cast { rejection, .. } => rejection.severity(),
            Self::Combat(error) => error.severity(),
            Self::UnknownActor { .. }
            | Self::DuplicateActor { .. }
            | Self::NoThreatTable { .. }
            | Self::Interrupt { .. } => ErrorSeverity::Validation,
            Self::Decode(_) => ErrorSeverity::Recoverable,
            Self::Encode(_) | Self::PoisonedLock => ErrorSeverity::Internal,
            Self::CommandChannelClosed
            | Self::ReplyChannelClosed(_)
            | Self::WorkerJoin(_)
            | Self::Content { .. }
            | Self::Tracing(_)
            | Self::LogDirectory(_) => ErrorSeverity::Fatal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::CommandChannelClosed => "RUNTIME_COMMAND_CHANNEL_CLOSED",
            Self::ReplyChannelClosed(_) => "RUNTIME_REPLY_CHANNEL_CLOSED",
            Self::WorkerJoin(_) => "RUNTIME_WORKER_JOIN",
            Self::UnknownActor { .. } => "RUNTIME_UNKNOWN_ACTOR",
            Self::DuplicateActor { .. } => "RUNTIME_DUPLICATE_ACTOR",
            Self::NoThreatTable { .. } => "RUNTIME_NO_THREAT_TABLE",
            Self::Cast { rejection, .. } => rejection.error_code(),
            Self::Interrupt { .. } => "RUNTIME_INTERRUPT_FAILED",
            Self::Combat(error) => error.error_code(),
            Self::Encode(_) => "RUNTIME_ENCODE",
            Self::Decode(_) => "RUNTIME_DECODE",
            Self::PoisonedLock => "RUNTIME_POISONED_LOCK",
            Self::Content { .. } => "RUNTIME_CONTENT",
            Self::Tracing(_) => "RUNTIME_TRACING",
            Self::LogDirectory(_) => "RUNTIME_LOG_DIRECTORY",
        }
    }
}
