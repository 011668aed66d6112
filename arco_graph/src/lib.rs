//! The registry, control/reply transport, address dispatcher, and block
//! driver: everything `spec.md` calls the "audio thread" side of the engine.
//!
//! `arco_core` supplies the ugen catalogue; this crate supplies the graph
//! (id-keyed table, refcounted teardown), the lock-free message queues
//! connecting it to a host thread, the address-string dispatcher routing
//! inbound messages to ugen constructors/mutators, and the per-block driver
//! loop (`spec.md` §4.8) tying all of it together.

pub mod control;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod runner;

pub use control::{control_queue, reply_queue, Arg, ControlReceiver, ControlSender, Message, Reply, ReplyReceiver, ReplySender};
pub use dispatch::dispatch;
pub use error::{DispatchError, EngineError};
pub use registry::{EngineConfig, Registry};
pub use runner::Engine;
