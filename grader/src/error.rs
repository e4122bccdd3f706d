use thiserror::Error;

/// Script parse/validation failures. Fatal, reported before launching
/// the engine.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: expected client count, got {text:?}")]
    BadClientCount { line: usize, text: String },
    #[error("line {line}: unknown token {token:?}")]
    UnknownToken { line: usize, token: String },
    #[error("line {line}: malformed thread range {text:?}")]
    BadThreadRange { line: usize, text: String },
    #[error("line {line}: thread {thread} out of range (client count is {count})")]
    ThreadOutOfRange { line: usize, thread: usize, count: usize },
    #[error("line {line}: directive {directive} must name exactly one thread, got {got}")]
    MustNameOneThread { line: usize, directive: &'static str, got: usize },
    #[error("line {line}: malformed directive {directive:?}: {reason}")]
    MalformedDirective { line: usize, directive: String, reason: String },
    #[error("line {line}: thread {thread} connects while already connected")]
    ConnectWhileConnected { line: usize, thread: usize },
    #[error("line {line}: thread {thread} disconnects while not connected")]
    DisconnectWhileNotConnected { line: usize, thread: usize },
    #[error("line {line}: thread {thread} sends while disconnected")]
    SendWhileDisconnected { line: usize, thread: usize },
    #[error("line {line}: order id {id} reused across threads or reconnections")]
    DuplicateOrderId { line: usize, id: u32 },
    #[error("line {line}: cancel of order {id} before its origin thread submitted it on this connection")]
    CancelBeforeOrigin { line: usize, id: u32 },
}

/// Per-variant replay violation. Carries enough context for the
/// supervisor to decide firm vs possibly-spurious failure.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct OracleError {
    pub message: String,
    /// True when the violating frame belonged to an ambiguous group (more
    /// than one frame sharing an output timestamp), in which case the
    /// violation is marked as possibly spurious rather than firm.
    pub possibly_spurious: bool,
}

impl OracleError {
    pub fn new(message: impl Into<String>, possibly_spurious: bool) -> Self {
        OracleError {
            message: message.into(),
            possibly_spurious,
        }
    }
}

/// Failures in the supervisor's own process/thread lifecycle.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to create temp directory: {0}")]
    TempDir(#[source] std::io::Error),
    #[error("failed to spawn engine child: {0}")]
    SpawnChild(#[source] std::io::Error),
    #[error("client thread {thread}: {reason}")]
    ClientThread { thread: usize, reason: String },
    #[error("engine closed with active orders outstanding")]
    EngineClosedEarly,
    #[error("output thread exception: {0}")]
    OutputThread(String),
    #[error(transparent)]
    Script(#[from] ScriptError),
}
