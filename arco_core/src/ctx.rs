use crate::log::ArLogSender;
use crate::rate::Rate;

/// A ugen identifier. Host-assigned ids are required to be `>= 0`; negative
/// ids are reserved for ugens allocated internally by rate adaptation
/// (`Upsample`/`Dnsampleb` wrappers) and are never exposed to the control
/// plane.
pub type UgenId = i32;

/// Permanent all-zero audio-rate ugen. Never freed; the default for any
/// disconnected audio-rate input.
pub const ZERO_ID: UgenId = 0;
/// Permanent all-zero block-rate ugen. Never freed; the default for any
/// disconnected block/constant-rate input.
pub const ZEROB_ID: UgenId = 1;

/// The view of the registry that a ugen's `real_run` needs in order to pull
/// its inputs and release terminated ones.
///
/// Splitting this out of the concrete registry type (which lives in
/// `arco_graph`) breaks what would otherwise be a circular dependency
/// between the ugen catalogue and the graph that runs it: `arco_core`
/// depends only on this trait, and `arco_graph::Registry` implements it.
pub trait GraphCtx {
    /// Pull `id` up to `block`, memoized by the registry per invariant 4.
    fn pull(&mut self, id: UgenId, block: u64);
    /// The current block's output samples for `id` (empty if `id` is
    /// unknown or rate `None`).
    fn out(&self, id: UgenId) -> &[f32];
    fn rate_of(&self, id: UgenId) -> Rate;
    fn chans_of(&self, id: UgenId) -> usize;
    fn is_terminated(&self, id: UgenId) -> bool;
    /// Increment `id`'s refcount (a new strong reference is being held).
    fn ref_up(&mut self, id: UgenId);
    /// Decrement `id`'s refcount, destroying it if it reaches zero.
    fn unref(&mut self, id: UgenId);
    fn logger(&mut self) -> &mut ArLogSender;
    /// Enqueue a reply addressed to `addr` for the host-bound queue.
    fn reply(&mut self, addr: &str, payload: ReplyPayload);
}

/// A typed outbound reply payload (see `spec.md` §4.6-4.7).
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyPayload {
    /// `(action_code, ugen_id, extra...)` for `action_id`-tagged transitions.
    Action {
        code: ActionCode,
        id: UgenId,
        extra: Vec<f32>,
    },
    /// A pitch/harmonicity/rms analysis frame from `Yin`.
    Pitch {
        id: UgenId,
        channel: usize,
        midi_pitch: f32,
        harmonicity: f32,
        rms: f32,
    },
    /// A threshold-crossing trigger from `Trig`.
    Trigger { id: UgenId, rms: f32 },
    /// A sound-on/sound-off hysteresis transition from `Trig::onoff`.
    Onoff { id: UgenId, state: bool },
    /// A chord classification from `Chorddetect`.
    Chord {
        id: UgenId,
        root: &'static str,
        quality: &'static str,
        interval_mask: u16,
    },
}

/// The reason an `action_id`-tagged reply was emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionCode {
    /// An envelope (`Pwl`/`Pwlb`/`Pwe`/`Pweb`/`Fader`) reached its end.
    End,
    /// A sum-like container's input terminated and was removed.
    Rem,
    /// The ugen itself terminated.
    Term,
}
