//! `Feedback`: the engine's one legitimate cycle. `input + from*gain` is
//! produced from a one-block-delayed copy of `from`'s own output, so pulling
//! `from` happens *after* this block's output is written rather than before,
//! avoiding infinite recursion around the cycle.
//!
//! Grounded in `original_source/arco/src/feedback.cpp`/`feedback.h`.

use crate::ctx::{GraphCtx, UgenId};
use crate::rate::Rate;
use arco_primitives::{block_copy_n, BL, BL_RECIP};

#[derive(Debug)]
pub struct Feedback {
    pub input: UgenId,
    pub from: UgenId,
    pub gain: UgenId,
    pub chans: usize,
    gain_prev: Vec<f32>,
    /// Previous block's `from` output, read as this block's feedback path.
    feedback: Vec<f32>,
}

impl Feedback {
    pub fn new(input: UgenId, from: UgenId, gain: UgenId, chans: usize) -> Self {
        Self {
            input,
            from,
            gain,
            chans,
            gain_prev: vec![0.0; chans],
            feedback: vec![0.0; chans * BL],
        }
    }

    pub fn repl_input(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.input);
        ctx.ref_up(input);
        self.input = input;
    }

    /// Replace the feedback source. The delay buffer stays sized to this
    /// node's own channel count; only the first `min(from_chans, chans)`
    /// channels are ever copied into it each block.
    pub fn repl_from(&mut self, from: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.from);
        ctx.ref_up(from);
        self.from = from;
        self.feedback.fill(0.0);
    }

    pub fn repl_gain(&mut self, gain: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.gain);
        ctx.ref_up(gain);
        self.gain = gain;
        self.gain_prev.fill(0.0);
    }
}

pub fn run(out: &mut [f32], f: &mut Feedback, ctx: &mut dyn GraphCtx, block: u64) {
    ctx.pull(f.input, block);
    ctx.pull(f.gain, block);
    let input_chans = ctx.chans_of(f.input);
    let gain_chans = ctx.chans_of(f.gain);
    let gain_audio_rate = matches!(ctx.rate_of(f.gain), Rate::Audio);
    let input_samps = ctx.out(f.input).to_vec();
    let gain_samps = ctx.out(f.gain).to_vec();

    for ch in 0..f.chans {
        let in_base = ch.min(input_chans.saturating_sub(1)) * BL;
        let input = &input_samps[in_base..in_base + BL];
        let from = &f.feedback[ch * BL..ch * BL + BL];
        let out_slice = &mut out[ch * BL..ch * BL + BL];

        if gain_audio_rate {
            let g_base = ch.min(gain_chans.saturating_sub(1)) * BL;
            let gain = &gain_samps[g_base..g_base + BL];
            for i in 0..BL {
                out_slice[i] = input[i] + from[i] * gain[i];
            }
        } else {
            let g = gain_samps
                .get(ch.min(gain_chans.saturating_sub(1)))
                .copied()
                .unwrap_or(0.0);
            let prev = f.gain_prev[ch];
            let incr = (g - prev) * BL_RECIP;
            let mut gf = prev;
            for i in 0..BL {
                gf += incr;
                out_slice[i] = input[i] + from[i] * gf;
            }
            f.gain_prev[ch] = g;
        }
    }

    ctx.pull(f.from, block);
    let from_chans = ctx.chans_of(f.from);
    let from_samps = ctx.out(f.from);
    block_copy_n(&mut f.feedback, from_samps, from_chans.min(f.chans));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGraph;

    #[test]
    fn first_block_has_no_feedback() {
        let mut g = FakeGraph::new();
        let input = g.add_constant(1.0, 1);
        let from = g.add_constant(0.0, 1);
        let gain = g.add_constant(0.5, 1);
        let mut f = Feedback::new(input, from, gain, 1);
        let mut out = vec![0.0f32; BL];
        run(&mut out, &mut f, &mut g, 1);
        assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }
}
