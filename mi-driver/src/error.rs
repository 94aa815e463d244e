/// Error taxonomy. Each layer owns one enum and the layer above wraps it,
/// matching the way the teacher composes `GdbError`/`CommunicationError`/
/// `CommandError` from its own `#[from]` conversions.
use thiserror::Error;

/// Errors from the value-grammar parser (§4.2).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("parse error at {line}:{position}: expected {expected}")]
    Malformed {
        line: String,
        position: usize,
        expected: String,
    },
    #[error("line exceeds the {limit}-byte protocol limit")]
    ProtocolLimit { limit: usize },
}

/// Protocol-level contract violations and debugger-side failures (§7).
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("accessed value as the wrong shape: {0}")]
    UnexpectedType(String),

    #[error("required field `{0}` missing from reply")]
    MissingValue(String),

    #[error("token mismatch: expected {expected}, got {got}")]
    MismatchedToken { expected: u64, got: u64 },

    #[error("expected result class {expected:?}, got {got:?}")]
    UnexpectedResultClass { expected: String, got: String },

    #[error("unexpected record: {0}")]
    UnexpectedRecord(String),

    #[error("unexpected async record: {0}")]
    UnexpectedAsyncRecord(String),

    #[error("debugger error{}: {msg}", code.as_ref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    DebuggerError { msg: String, code: Option<String> },

    #[error("broken pipe to debugger: {0}")]
    IoBroken(#[from] std::io::Error),

    #[error("debugger process is gone")]
    DebuggerGone,
}

/// Top-level engine error (§7), wrapping the protocol layer and adding the
/// engine's own fatal conditions.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("watchdog timed out after {0} seconds")]
    Timeout(u64),

    #[error("plugin callback panicked: {0}")]
    PluginPanic(String),

    #[error("debugger subprocess failed to start: {0}")]
    SpawnFailed(std::io::Error),
}

pub type ParseResult<T> = Result<T, ParseError>;
pub type ProtocolResult<T> = Result<T, ProtocolError>;
pub type EngineResult<T> = Result<T, EngineError>;
