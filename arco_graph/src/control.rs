//! The logical control/reply message types and their `rtrb`-backed SPSC
//! transport, generalized from the teacher's `ArLogSender`/`ArLogReceiver`
//! ring-buffer plumbing (`arco_core::log`) from log-message chains to
//! one-shot, owned `Message`/`Reply` values.
//!
//! `spec.md` §1 excludes the wire format below the logical message level;
//! this is that logical level and nothing more.

use arco_core::{ReplyPayload, UgenId};

/// One typed argument in a control message.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    I(i32),
    F(f32),
    S(String),
}

impl Arg {
    pub fn as_i(&self) -> Option<i32> {
        match self {
            Arg::I(v) => Some(*v),
            _ => None,
        }
    }
    pub fn as_f(&self) -> Option<f32> {
        match self {
            Arg::F(v) => Some(*v),
            Arg::I(v) => Some(*v as f32),
            _ => None,
        }
    }
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Arg::S(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::I(v)
    }
}
impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::F(v)
    }
}
impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::S(v.to_string())
    }
}
impl From<UgenId> for Arg {
    fn from(v: UgenId) -> Self {
        Arg::I(v)
    }
}

/// A decoded, address-routed command destined for [`crate::dispatch`].
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub address: String,
    pub args: Vec<Arg>,
}

impl Message {
    pub fn new(address: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    pub fn i(&self, idx: usize) -> Option<i32> {
        self.args.get(idx).and_then(Arg::as_i)
    }
    pub fn f(&self, idx: usize) -> Option<f32> {
        self.args.get(idx).and_then(Arg::as_f)
    }
    pub fn s(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).and_then(Arg::as_s)
    }
}

/// An outbound reply: a ugen-owned address plus the typed payload from
/// `arco_core::ctx::ReplyPayload`.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub address: String,
    pub payload: ReplyPayload,
}

/// Host-thread-owned sender half of the inbound control queue.
pub struct ControlSender(rtrb::Producer<Message>);
/// Audio-thread-owned receiver half of the inbound control queue.
pub struct ControlReceiver(rtrb::Consumer<Message>);

impl ControlSender {
    /// Enqueue a message. Drops it (and logs via the ordinary `log` facade,
    /// not the real-time path) if the queue is full — per `spec.md` §7,
    /// control is fire-and-forget and an overloaded queue is the host's
    /// problem, not a reason to block the audio thread.
    pub fn send(&mut self, msg: Message) {
        if self.0.push(msg).is_err() {
            log::warn!("control queue full, dropping message");
        }
    }
}

impl ControlReceiver {
    /// Drain every pending message, invoking `handler` once per message.
    /// Called once per block, before the pull (`spec.md` §4.8 step 1).
    pub fn drain(&mut self, mut handler: impl FnMut(Message)) {
        while let Ok(msg) = self.0.pop() {
            handler(msg);
        }
    }
}

/// Create a linked control sender/receiver pair with the given capacity.
pub fn control_queue(capacity: usize) -> (ControlSender, ControlReceiver) {
    let (tx, rx) = rtrb::RingBuffer::new(capacity);
    (ControlSender(tx), ControlReceiver(rx))
}

/// Audio-thread-owned sender half of the outbound reply queue.
pub struct ReplySender(rtrb::Producer<Reply>);
/// Host-thread-owned receiver half of the outbound reply queue.
pub struct ReplyReceiver(rtrb::Consumer<Reply>);

impl ReplySender {
    pub fn send(&mut self, reply: Reply) {
        if let Err(rtrb::PushError::Full(reply)) = self.0.push(reply) {
            log::warn!("reply queue full, dropping reply to {}", reply.address);
        }
    }
}

impl ReplyReceiver {
    /// Drain every pending reply, invoking `handler` once per reply. Called
    /// once per block, after the pull (`spec.md` §4.8 step 5).
    pub fn drain(&mut self, mut handler: impl FnMut(Reply)) {
        while let Ok(reply) = self.0.pop() {
            handler(reply);
        }
    }
}

pub fn reply_queue(capacity: usize) -> (ReplySender, ReplyReceiver) {
    let (tx, rx) = rtrb::RingBuffer::new(capacity);
    (ReplySender(tx), ReplyReceiver(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_queue_round_trips() {
        let (mut tx, mut rx) = control_queue(8);
        tx.send(Message::new("/arco/sum/new", vec![Arg::I(10), Arg::I(1), Arg::I(0)]));
        let mut seen = None;
        rx.drain(|m| seen = Some(m));
        assert_eq!(seen.unwrap().address, "/arco/sum/new");
    }

    #[test]
    fn message_arg_accessors_type_check() {
        let m = Message::new("/x", vec![Arg::I(1), Arg::F(2.5), Arg::S("hi".into())]);
        assert_eq!(m.i(0), Some(1));
        assert_eq!(m.f(1), Some(2.5));
        assert_eq!(m.s(2), Some("hi"));
        assert_eq!(m.i(1), None);
    }
}
