//! `Sum`/`Sumb`: the engine's summation and routing workhorses, and their
//! simpler `Add`/`Addb` cousins.
//!
//! Grounded in `original_source/arco/src/sum.h`: gain is rate-limited to at
//! most a full-scale change per 50ms, inputs that report `TERMINATED` are
//! dropped and unref'd before the next block, and the container itself only
//! terminates once it has seen at least one input and ends up with none.

use crate::ctx::{ActionCode, GraphCtx, ReplyPayload, UgenId};
use crate::flags::UgenFlags;
use arco_primitives::{add_n, copy_n, zero_n, BL, BL_RECIP};

/// Audio-rate summing container with a rate-limited gain.
#[derive(Debug)]
pub struct Sum {
    pub inputs: Vec<UgenId>,
    pub wrap: bool,
    pub gain: f32,
    pub prev_gain: f32,
    /// `AP / 0.050`: the maximum per-sample gain delta for a 50ms
    /// full-scale ramp, derived from the engine's sample rate.
    pub max_gincr: f32,
}

impl Sum {
    pub fn new(wrap: bool, sample_rate: u32) -> Self {
        Self {
            inputs: Vec::new(),
            wrap,
            gain: 1.0,
            prev_gain: 1.0,
            max_gincr: (1.0 / sample_rate as f32) / 0.050,
        }
    }

    /// Append `input`, idempotent on exact duplicates.
    pub fn ins(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        if !self.inputs.contains(&input) {
            self.inputs.push(input);
            ctx.ref_up(input);
        }
    }

    pub fn rem(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        if let Some(pos) = self.inputs.iter().position(|&i| i == input) {
            self.inputs.remove(pos);
            ctx.unref(input);
        }
    }

    /// Atomic in-place replace, preserving list position.
    pub fn swap(&mut self, old: UgenId, new: UgenId, ctx: &mut dyn GraphCtx) {
        match self.inputs.iter().position(|&i| i == old) {
            Some(pos) => {
                self.inputs[pos] = new;
                ctx.ref_up(new);
                ctx.unref(old);
            }
            None => log::warn!("sum/swap: id {old} not in input set, ignored"),
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    out: &mut [f32],
    chans: usize,
    id: UgenId,
    action_id: i32,
    flags: &mut UgenFlags,
    s: &mut Sum,
    ctx: &mut dyn GraphCtx,
    block: u64,
    reply_addr: Option<&str>,
) {
    let starting_size = s.inputs.len();
    let mut copy_first = true;
    let mut i = 0;
    while i < s.inputs.len() {
        let input = s.inputs[i];
        ctx.pull(input, block);
        if ctx.is_terminated(input) {
            ctx.unref(input);
            s.inputs.remove(i);
            emit_action(ctx, action_id, reply_addr, ActionCode::Rem, id, input);
            continue;
        }
        i += 1;
        let ch = ctx.chans_of(input);
        let input_samps = ctx.out(input);
        if copy_first {
            copy_n(out, input_samps, ch.min(chans) * BL);
            if ch < chans {
                zero_n(&mut out[ch * BL..], (chans - ch) * BL);
            }
            copy_first = false;
        } else {
            add_n(out, input_samps, ch.min(chans) * BL);
        }
        if ch > chans && s.wrap {
            let mut c = chans;
            while c < ch {
                let take = (ch - c).min(chans);
                add_n(out, &input_samps[c * BL..], take * BL);
                c += chans;
            }
        }
    }
    if copy_first {
        zero_n(out, chans * BL);
        if starting_size > 0 && flags.can_terminate() {
            flags.terminate();
            emit_action(ctx, action_id, reply_addr, ActionCode::Term, id, id);
        }
    }

    apply_gain_ramp(out, chans, s);
}

fn emit_action(
    ctx: &mut dyn GraphCtx,
    action_id: i32,
    reply_addr: Option<&str>,
    code: ActionCode,
    id: UgenId,
    subject: UgenId,
) {
    if action_id == 0 {
        return;
    }
    if let Some(addr) = reply_addr {
        ctx.reply(
            addr,
            ReplyPayload::Action {
                code,
                id,
                extra: vec![subject as f32],
            },
        );
    }
}

fn apply_gain_ramp(out: &mut [f32], chans: usize, s: &mut Sum) {
    let gincr = (s.gain - s.prev_gain) * BL_RECIP;
    let abs_gincr = gincr.abs();
    if abs_gincr < 1e-6 {
        if s.gain != 1.0 {
            for v in out.iter_mut().take(chans * BL) {
                *v *= s.gain;
            }
            s.prev_gain = s.gain;
        }
        return;
    }
    let gincr = if abs_gincr > s.max_gincr {
        s.max_gincr.copysign(gincr)
    } else {
        gincr
    };
    let mut g = s.prev_gain;
    for ch in 0..chans {
        g = s.prev_gain;
        for i in 0..BL {
            g += gincr;
            out[ch * BL + i] *= g;
        }
    }
    s.prev_gain = g;
}

/// Block-rate summing container. Otherwise identical to [`Sum`], but emits a
/// `REM` action before releasing a terminated input, per the container
/// contract in `spec.md` §4.3.
#[derive(Debug, Default)]
pub struct Sumb {
    pub inputs: Vec<UgenId>,
}

impl Sumb {
    pub fn new() -> Self {
        Self { inputs: Vec::new() }
    }
    pub fn ins(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        if !self.inputs.contains(&input) {
            self.inputs.push(input);
            ctx.ref_up(input);
        }
    }
    pub fn rem(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        if let Some(pos) = self.inputs.iter().position(|&i| i == input) {
            self.inputs.remove(pos);
            ctx.unref(input);
        }
    }
    pub fn swap(&mut self, old: UgenId, new: UgenId, ctx: &mut dyn GraphCtx) {
        if let Some(pos) = self.inputs.iter().position(|&i| i == old) {
            self.inputs[pos] = new;
            ctx.ref_up(new);
            ctx.unref(old);
        } else {
            log::warn!("sumb/swap: id {old} not in input set, ignored");
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run_b(
    out: &mut [f32],
    chans: usize,
    id: UgenId,
    action_id: i32,
    flags: &mut UgenFlags,
    s: &mut Sumb,
    ctx: &mut dyn GraphCtx,
    block: u64,
    reply_addr: Option<&str>,
) {
    let starting_size = s.inputs.len();
    let mut copy_first = true;
    let mut i = 0;
    while i < s.inputs.len() {
        let input = s.inputs[i];
        ctx.pull(input, block);
        if ctx.is_terminated(input) {
            emit_action(ctx, action_id, reply_addr, ActionCode::Rem, id, input);
            ctx.unref(input);
            s.inputs.remove(i);
            continue;
        }
        i += 1;
        let ch = ctx.chans_of(input);
        let input_samps = ctx.out(input);
        if copy_first {
            copy_n(out, input_samps, ch.min(chans));
            if ch < chans {
                zero_n(&mut out[ch..], chans - ch);
            }
            copy_first = false;
        } else {
            add_n(out, input_samps, ch.min(chans));
        }
    }
    if copy_first {
        zero_n(out, chans);
        if starting_size > 0 && flags.can_terminate() {
            flags.terminate();
        }
    }
}

/// Simpler summing container without gain ramping or `REM` notification.
/// Kept as a lighter-weight legacy alternative to [`Sum`].
#[derive(Debug, Default)]
pub struct Add {
    pub inputs: Vec<UgenId>,
}

pub fn run_add(out: &mut [f32], chans: usize, a: &mut Add, ctx: &mut dyn GraphCtx, block: u64) {
    zero_n(out, chans * BL);
    for &input in &a.inputs {
        ctx.pull(input, block);
        let ch = ctx.chans_of(input).min(chans);
        add_n(out, ctx.out(input), ch * BL);
    }
}

/// Block-rate counterpart to [`Add`].
#[derive(Debug, Default)]
pub struct Addb {
    pub inputs: Vec<UgenId>,
}

pub fn run_addb(out: &mut [f32], chans: usize, a: &mut Addb, ctx: &mut dyn GraphCtx, block: u64) {
    zero_n(out, chans);
    for &input in &a.inputs {
        ctx.pull(input, block);
        let ch = ctx.chans_of(input).min(chans);
        add_n(out, ctx.out(input), ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGraph;

    #[test]
    fn sum_ins_is_idempotent() {
        let mut g = FakeGraph::new();
        let src = g.add_silent_audio(1);
        let mut s = Sum::new(false, 44100);
        s.ins(src, &mut g);
        s.ins(src, &mut g);
        assert_eq!(s.inputs.len(), 1);
        assert_eq!(g.refcount(src), 1);
    }

    #[test]
    fn silence_stays_zero() {
        let mut g = FakeGraph::new();
        let mut s = Sum::new(false, 44100);
        let mut flags = UgenFlags::new();
        let mut out = vec![0.0f32; BL];
        run(&mut out, 1, 10, 0, &mut flags, &mut s, &mut g, 1, None);
        assert!(out.iter().all(|&v| v == 0.0));
    }
}
