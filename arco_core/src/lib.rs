//! Ugen catalogue and data model: the per-kind state structs and `real_run`
//! bodies that make up every node the engine can run, plus the seams
//! ([`ctx::GraphCtx`]) that let them be driven by a registry living in
//! `arco_graph` without a circular crate dependency.
//!
//! This crate owns no scheduling, no control-message parsing, and no
//! threads; it is the pure, testable "what does this node compute" layer.

pub mod ctx;
pub mod error;
pub mod flags;
pub mod log;
pub mod rate;
pub mod ugen;
pub mod ugens;

#[cfg(test)]
pub mod test_support;

pub use ctx::{ActionCode, GraphCtx, ReplyPayload, UgenId, ZEROB_ID, ZERO_ID};
pub use error::ParamError;
pub use flags::UgenFlags;
pub use log::{ArLogMessage, ArLogReceiver, ArLogSender};
pub use rate::Rate;
pub use ugen::{Ugen, UgenKind};
