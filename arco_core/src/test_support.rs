//! Minimal in-memory [`GraphCtx`] used by ugen unit tests, so each
//! `ugens/*.rs` module can be tested without pulling in `arco_graph`.

use std::collections::HashMap;

use crate::ctx::{ActionCode, GraphCtx, ReplyPayload, UgenId};
use crate::log::ArLogSender;
use crate::rate::Rate;
use arco_primitives::BL;

pub struct FakeSource {
    pub rate: Rate,
    pub chans: usize,
    pub samps: Vec<f32>,
    pub terminated: bool,
    pub refcount: u32,
}

/// A bare-bones [`GraphCtx`] that serves fixed, pre-seeded sources: no
/// dependency graph, no pulling logic beyond "return what was seeded".
/// Good enough to unit test a single ugen's `real_run` in isolation.
pub struct FakeGraph {
    sources: HashMap<UgenId, FakeSource>,
    next_id: UgenId,
    logger: ArLogSender,
    pub replies: Vec<(String, ReplyPayload)>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            next_id: 100,
            logger: ArLogSender::non_rt(),
            replies: Vec::new(),
        }
    }

    pub fn add_silent_audio(&mut self, chans: usize) -> UgenId {
        let id = self.next_id;
        self.next_id += 1;
        self.sources.insert(
            id,
            FakeSource {
                rate: Rate::Audio,
                chans,
                samps: vec![0.0; chans * BL],
                terminated: false,
                refcount: 0,
            },
        );
        id
    }

    pub fn add_constant(&mut self, value: f32, chans: usize) -> UgenId {
        let id = self.next_id;
        self.next_id += 1;
        self.sources.insert(
            id,
            FakeSource {
                rate: Rate::Audio,
                chans,
                samps: vec![value; chans * BL],
                terminated: false,
                refcount: 0,
            },
        );
        id
    }

    pub fn terminate(&mut self, id: UgenId) {
        if let Some(s) = self.sources.get_mut(&id) {
            s.terminated = true;
        }
    }

    pub fn refcount(&self, id: UgenId) -> u32 {
        self.sources.get(&id).map(|s| s.refcount).unwrap_or(0)
    }
}

impl Default for FakeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphCtx for FakeGraph {
    fn pull(&mut self, _id: UgenId, _block: u64) {}

    fn out(&self, id: UgenId) -> &[f32] {
        self.sources
            .get(&id)
            .map(|s| s.samps.as_slice())
            .unwrap_or(&[])
    }

    fn rate_of(&self, id: UgenId) -> Rate {
        self.sources.get(&id).map(|s| s.rate).unwrap_or(Rate::None)
    }

    fn chans_of(&self, id: UgenId) -> usize {
        self.sources.get(&id).map(|s| s.chans).unwrap_or(0)
    }

    fn is_terminated(&self, id: UgenId) -> bool {
        self.sources.get(&id).map(|s| s.terminated).unwrap_or(true)
    }

    fn ref_up(&mut self, id: UgenId) {
        if let Some(s) = self.sources.get_mut(&id) {
            s.refcount += 1;
        }
    }

    fn unref(&mut self, id: UgenId) {
        if let Some(s) = self.sources.get_mut(&id) {
            s.refcount = s.refcount.saturating_sub(1);
        }
    }

    fn logger(&mut self) -> &mut ArLogSender {
        &mut self.logger
    }

    fn reply(&mut self, addr: &str, payload: ReplyPayload) {
        self.replies.push((addr.to_string(), payload));
    }
}

/// Convenience matcher for tests asserting a single `Action` reply fired.
pub fn expect_action(replies: &[(String, ReplyPayload)], code: ActionCode, id: UgenId) -> bool {
    replies.iter().any(|(_, p)| {
        matches!(p, ReplyPayload::Action { code: c, id: i, .. } if *c == code && *i == id)
    })
}
