//! Prelude and driver glue for the `arco` real-time ugen-graph engine.
//!
//! `arco_core` is the ugen catalogue, `arco_graph` is the registry/dispatch/
//! engine loop; this crate is the thin top layer a host program links
//! against: re-exports of the pieces needed to build a graph and drive it,
//! plus (behind the `cpal` feature) a ready-made output-stream driver.

pub mod error;

#[cfg(feature = "cpal")]
pub mod cpal_driver;

pub use arco_core::{ActionCode, GraphCtx, Rate, ReplyPayload, Ugen, UgenId, UgenKind, ZEROB_ID, ZERO_ID};
pub use arco_graph::{control_queue, reply_queue, Arg, ControlSender, Engine, EngineConfig, Message, Registry, Reply};
pub use error::ArcoError;

#[cfg(feature = "cpal")]
pub use cpal_driver::{run_cpal, CpalOptions};
