//! Logging from the audio thread without allocation.
//!
//! Modeled on the teacher's `knaster_core::log`: messages are sent as a
//! chain of [`ArLogMessage`] values terminated by [`ArLogMessage::End`]
//! through a preallocated `rtrb` ring buffer, so the audio thread never
//! blocks or allocates to report a condition from the error taxonomy
//! (message decode errors, id errors, rate mismatches, ...).

use std::fmt::Display;

/// A single piece of a log message sent from the audio thread.
#[derive(Clone, Debug)]
pub enum ArLogMessage {
    Str(&'static str),
    Float(f64),
    Signed(i64),
    Unsigned(u64),
    End,
}

impl ArLogMessage {
    pub fn is_end(&self) -> bool {
        matches!(self, ArLogMessage::End)
    }
}

impl Display for ArLogMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArLogMessage::Str(s) => write!(f, "{s}"),
            ArLogMessage::Float(v) => write!(f, "{v}"),
            ArLogMessage::Signed(v) => write!(f, "{v}"),
            ArLogMessage::Unsigned(v) => write!(f, "{v}"),
            ArLogMessage::End => Ok(()),
        }
    }
}

macro_rules! impl_from {
    ($ty:ty, $variant:ident, $cast:ty) => {
        impl From<$ty> for ArLogMessage {
            fn from(value: $ty) -> Self {
                ArLogMessage::$variant(value as $cast)
            }
        }
    };
}
impl_from!(&'static str, Str, &'static str);
impl_from!(f32, Float, f64);
impl_from!(f64, Float, f64);
impl_from!(i32, Signed, i64);
impl_from!(i64, Signed, i64);
impl_from!(usize, Unsigned, u64);
impl_from!(u32, Unsigned, u64);

/// Sender half, owned by the audio thread. Falls back to the `log` crate
/// facade when no ring buffer is installed (e.g. in non-realtime tests).
pub enum ArLogSender {
    RingBuffer(rtrb::Producer<ArLogMessage>),
    Log,
}

impl ArLogSender {
    /// A sender that logs via the `log` crate instead of a ring buffer.
    /// Used in tests and anywhere the real-time guarantee does not matter.
    pub fn non_rt() -> Self {
        ArLogSender::Log
    }

    pub fn send(&mut self, message: ArLogMessage) {
        match self {
            ArLogSender::RingBuffer(p) => {
                let _ = p.push(message);
            }
            ArLogSender::Log => {
                if !message.is_end() {
                    log::warn!("{message}");
                }
            }
        }
    }
}

/// Receiver half, owned by the host thread. Reassembles message chains and
/// passes each complete chain to a handler.
pub struct ArLogReceiver {
    rx: rtrb::Consumer<ArLogMessage>,
    pending: Vec<ArLogMessage>,
}

impl ArLogReceiver {
    /// Create a linked sender/receiver pair with the given ring-buffer
    /// capacity (number of `ArLogMessage` slots, not message chains).
    pub fn new(capacity: usize) -> (ArLogSender, ArLogReceiver) {
        let (tx, rx) = rtrb::RingBuffer::new(capacity);
        (
            ArLogSender::RingBuffer(tx),
            ArLogReceiver {
                rx,
                pending: Vec::new(),
            },
        )
    }

    /// Drain complete message chains, calling `handler` once per chain.
    pub fn recv(&mut self, mut handler: impl FnMut(&[ArLogMessage])) {
        while let Ok(msg) = self.rx.pop() {
            if msg.is_end() {
                handler(&self.pending);
                self.pending.clear();
            } else {
                self.pending.push(msg);
            }
        }
    }
}

/// Send a chain of [`ArLogMessage`]s through an [`ArLogSender`], appending
/// the terminating `End` message automatically.
#[macro_export]
macro_rules! rt_log {
    ($logger:expr; $($msg:expr),+ $(,)?) => {{
        use $crate::log::ArLogMessage;
        $( $logger.send(ArLogMessage::from($msg)); )+
        $logger.send(ArLogMessage::End);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_round_trips() {
        let (mut tx, mut rx) = ArLogReceiver::new(64);
        rt_log!(tx; "unknown id", 42_i32, 3.5_f32);
        let mut seen = false;
        rx.recv(|chain| {
            assert_eq!(chain.len(), 3);
            seen = true;
        });
        assert!(seen);
    }
}
