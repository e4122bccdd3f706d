use thiserror::Error;

/// Reason a cancel against an unknown-or-non-resting order was rejected.
/// Not a fatal error: the engine reports this as a normal `X <id> R`
/// output line, never as a connection-ending failure, so `Book::cancel`
/// returns it in a `Result` that the caller matches on rather than
/// propagates with `?`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CancelRejectReason {
    #[error("no order with this id is currently resting")]
    UnknownOrDead,
}

/// Errors decoding a 28-byte request frame. The caller always hands over
/// a full, fixed-size frame (see `wire::FRAME_LEN`), so the only failures
/// left to report are ones found inside it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown command byte {0:#x}")]
    UnknownCommand(u8),
    #[error("instrument field is not a valid null-terminated string")]
    BadInstrument,
}
