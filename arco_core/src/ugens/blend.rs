//! `Blend`: mix or crossfade two audio-rate signals under a block-rate
//! blend control, in one of three curve shapes.
//!
//! Grounded in `original_source/arco/src/blend.h`. `x1`/`x2` are expected to
//! already be audio rate and `b` block rate; the registry is responsible
//! for wrapping non-conforming inputs in [`super::rateconv::Upsample`] /
//! [`super::rateconv::Dnsampleb`] (with `Lowpass500`) before construction,
//! the same rate-adaptation path every other audio-rate ugen goes through.

use crate::ctx::{ActionCode, GraphCtx, ReplyPayload, UgenId};
use arco_primitives::{raised_cosine, BL, BL_RECIP, COS_TABLE_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendMode {
    /// `gain * (x1*(1-b) + x2*b)`.
    Linear,
    /// Equal-power crossfade via the raised-cosine table.
    Power,
    /// Power-law blend scaled by `sqrt(1-b)`, splitting the difference
    /// between linear and equal-power.
    P45,
}

#[derive(Clone, Copy, Debug, Default)]
struct ChannelState {
    prev_x1_gain: f32,
    prev_x2_gain: f32,
    prev_b: f32,
}

#[derive(Debug)]
pub struct Blend {
    pub x1: UgenId,
    pub x2: UgenId,
    pub b: UgenId,
    pub chans: usize,
    pub gain: f32,
    mode: BlendMode,
    states: Vec<ChannelState>,
}

impl Blend {
    pub fn new(x1: UgenId, x2: UgenId, b: UgenId, chans: usize, b_init: f32, mode: BlendMode) -> Self {
        Self {
            x1,
            x2,
            b,
            chans,
            gain: 1.0,
            mode,
            states: vec![ChannelState { prev_b: b_init, ..Default::default() }; chans],
        }
    }

    pub fn set_mode(&mut self, mode: BlendMode) {
        self.mode = mode;
    }

    pub fn repl_x1(&mut self, x1: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.x1);
        ctx.ref_up(x1);
        self.x1 = x1;
    }

    pub fn repl_x2(&mut self, x2: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.x2);
        ctx.ref_up(x2);
        self.x2 = x2;
    }

    pub fn repl_b(&mut self, b: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.b);
        ctx.ref_up(b);
        self.b = b;
    }
}

fn cos_pair(b: f32) -> (f32, f32) {
    // Maps b in [0,1] onto two quarter-wave-offset positions in the
    // raised-cosine table, then converts raised-cosine (0..1) back to the
    // signed cosine (-1..1) that a true equal-power pan needs.
    let phase1 = (1.0 - b * 0.5).clamp(0.0, 1.0);
    let phase2 = (0.5 + b * 0.5).clamp(0.0, 1.0);
    let x1_gain = 2.0 * raised_cosine(phase1) - 1.0;
    let x2_gain = 2.0 * raised_cosine(phase2) - 1.0;
    (x1_gain, x2_gain)
}

pub fn run(
    out: &mut [f32],
    id: UgenId,
    action_id: i32,
    blend: &mut Blend,
    can_terminate: bool,
    ctx: &mut dyn GraphCtx,
    block: u64,
    reply_addr: Option<&str>,
) -> bool {
    ctx.pull(blend.x1, block);
    ctx.pull(blend.x2, block);
    ctx.pull(blend.b, block);
    let terminated = can_terminate && ctx.is_terminated(blend.x1) && ctx.is_terminated(blend.x2);
    if terminated {
        if let (Some(addr), true) = (reply_addr, action_id != 0) {
            ctx.reply(
                addr,
                ReplyPayload::Action {
                    code: ActionCode::Term,
                    id,
                    extra: vec![],
                },
            );
        }
    }

    let x1_chans = ctx.chans_of(blend.x1).max(1);
    let x2_chans = ctx.chans_of(blend.x2).max(1);
    let b_chans = ctx.chans_of(blend.b).max(1);
    let x1_samps = ctx.out(blend.x1).to_vec();
    let x2_samps = ctx.out(blend.x2).to_vec();
    let b_samps = ctx.out(blend.b).to_vec();

    for ch in 0..blend.chans {
        let x1_base = ch.min(x1_chans - 1) * BL;
        let x2_base = ch.min(x2_chans - 1) * BL;
        let b_val = b_samps[ch.min(b_chans - 1)];
        let x1 = &x1_samps[x1_base..x1_base + BL];
        let x2 = &x2_samps[x2_base..x2_base + BL];
        let out_slice = &mut out[ch * BL..ch * BL + BL];
        let state = &mut blend.states[ch];

        match blend.mode {
            BlendMode::Linear => {
                let b_fast0 = state.prev_b;
                let b_incr = (b_val - b_fast0) * BL_RECIP;
                state.prev_b = b_val;
                let mut b_fast = b_fast0;
                for i in 0..BL {
                    b_fast += b_incr;
                    out_slice[i] = blend.gain * (x1[i] * (1.0 - b_fast) + x2[i] * b_fast);
                }
            }
            BlendMode::Power | BlendMode::P45 => {
                let (mut x1_gain, mut x2_gain) = cos_pair(b_val);
                if blend.mode == BlendMode::P45 {
                    x1_gain = ((1.0 - b_val) * x1_gain).max(0.0).sqrt();
                    x2_gain = ((1.0 - b_val) * x2_gain).max(0.0).sqrt();
                }
                let x1_incr = (x1_gain - state.prev_x1_gain) * BL_RECIP;
                let x2_incr = (x2_gain - state.prev_x2_gain) * BL_RECIP;
                let mut x1_fast = state.prev_x1_gain;
                let mut x2_fast = state.prev_x2_gain;
                state.prev_x1_gain = x1_gain;
                state.prev_x2_gain = x2_gain;
                for i in 0..BL {
                    x1_fast += x1_incr;
                    x2_fast += x2_incr;
                    out_slice[i] = blend.gain * (x1[i] * x1_fast + x2[i] * x2_fast);
                }
            }
        }
    }
    terminated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGraph;

    #[test]
    fn linear_blend_at_zero_is_all_x1() {
        let mut g = FakeGraph::new();
        let x1 = g.add_constant(1.0, 1);
        let x2 = g.add_constant(-1.0, 1);
        let b = g.add_constant(0.0, 1);
        let mut blend = Blend::new(x1, x2, b, 1, 0.0, BlendMode::Linear);
        let mut out = vec![0.0f32; BL];
        run(&mut out, 1, 0, &mut blend, false, &mut g, 1, None);
        assert!((out[BL - 1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn terminates_when_both_inputs_done() {
        let mut g = FakeGraph::new();
        let x1 = g.add_constant(0.0, 1);
        let x2 = g.add_constant(0.0, 1);
        let b = g.add_constant(0.5, 1);
        g.terminate(x1);
        g.terminate(x2);
        let mut blend = Blend::new(x1, x2, b, 1, 0.5, BlendMode::Linear);
        let mut out = vec![0.0f32; BL];
        let terminated = run(&mut out, 1, 0, &mut blend, true, &mut g, 1, None);
        assert!(terminated);
    }
}
