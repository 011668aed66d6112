use arco_core::UgenId;
use thiserror::Error;

/// Errors raised while dispatching a single inbound control message.
///
/// These never unwind across the audio callback: [`crate::dispatch::Dispatcher`]
/// logs every `Err` it produces and moves on to the next queued message,
/// matching the engine's local-recovery error policy (`spec.md` §7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("unknown address {0:?}")]
    UnknownAddress(String),
    #[error("{address}: argument {index} expected {expected}")]
    ArgTypeMismatch {
        address: String,
        index: usize,
        expected: &'static str,
    },
    #[error("{address}: expected {expected} arguments, got {got}")]
    ArgCountMismatch {
        address: String,
        expected: usize,
        got: usize,
    },
    #[error("unknown ugen id {0}")]
    UnknownUgenId(UgenId),
    #[error("ugen {id} is not a {expected}")]
    WrongUgenKind { id: UgenId, expected: &'static str },
    #[error("id {0} is already in use")]
    IdInUse(UgenId),
    #[error("parameter error: {0}")]
    Param(#[from] arco_core::ParamError),
}

/// Errors raised constructing or running the engine itself, as opposed to a
/// single control message (see [`DispatchError`] for those).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("control queue capacity must be nonzero")]
    ZeroCapacity,
    #[error("output ugen {0} does not exist")]
    NoOutputUgen(UgenId),
}
