//! `Fader`: a one-segment envelope fused with a multiply, giving a smooth
//! gain control over an arbitrary audio-rate input.
//!
//! Grounded in `original_source/arco/src/fader.h`. Four fade shapes
//! (`Linear`, `Exponential`, `Lowpass`, `Smooth`), the last of which switches
//! to a per-sample phase advance for fades under 10ms since a block-rate
//! update would be audibly steppy that short.

use crate::ctx::{ActionCode, GraphCtx, ReplyPayload, UgenId};
use arco_primitives::{raised_cosine, BL, BL_RECIP, COS_TABLE_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaderMode {
    Linear,
    Exponential,
    Lowpass,
    Smooth,
}

const EXP_BIAS: f32 = 0.01;

#[derive(Clone, Copy, Debug, Default)]
struct ChannelState {
    current: f32,
    goal: f32,
    step: f32,
    delta: f32,
    factor: f32,
    phase: f32,
}

#[derive(Debug)]
pub struct Fader {
    pub input: UgenId,
    states: Vec<ChannelState>,
    mode: FaderMode,
    dur_samps: u32,
    count: i64,
    smooth_audio_rate: bool,
    sample_rate: u32,
}

impl Fader {
    pub fn new(input: UgenId, chans: usize, current: f32, mode: FaderMode, sample_rate: u32) -> Self {
        let mut f = Self {
            input,
            states: vec![ChannelState::default(); chans],
            mode,
            dur_samps: 1,
            count: 0,
            smooth_audio_rate: false,
            sample_rate,
        };
        f.set_dur(0.1);
        for s in &mut f.states {
            s.current = current;
            s.goal = current;
            s.delta = 0.0;
            s.factor = 1.0;
        }
        f
    }

    pub fn set_current(&mut self, chan: usize, current: f32) {
        if let Some(s) = self.states.get_mut(chan) {
            s.current = current;
            s.goal = current;
            s.delta = 0.0;
            s.factor = 1.0;
        }
    }

    pub fn set_dur(&mut self, seconds: f32) {
        self.dur_samps = ((seconds * self.sample_rate as f32) + 0.5).max(1.0) as u32;
    }

    pub fn set_mode(&mut self, mode: FaderMode) {
        self.mode = mode;
        self.count = 0;
    }

    pub fn repl_input(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.input);
        ctx.ref_up(input);
        self.input = input;
    }

    /// Set the target value for `chan`. Activates the fade once the last
    /// channel's goal has been set, matching the teacher-grounded protocol
    /// where a multi-channel fade commits atomically on its final channel.
    pub fn set_goal(&mut self, chan: usize, goal: f32) {
        let last = self.states.len().saturating_sub(1);
        if let Some(s) = self.states.get_mut(chan) {
            s.goal = goal;
        }
        if chan != last {
            return;
        }
        self.count = self.dur_samps as i64;
        let dur = self.dur_samps as f32;
        self.smooth_audio_rate = false;
        for s in &mut self.states {
            match self.mode {
                FaderMode::Exponential => {
                    s.factor =
                        (((s.goal + EXP_BIAS) / (s.current + EXP_BIAS)) as f64).powf(1.0 / dur as f64) as f32;
                }
                FaderMode::Lowpass => {
                    s.factor = (0.01f64).powf(1.0 / dur as f64) as f32;
                    s.delta = (s.goal - s.current) * 1.01;
                }
                FaderMode::Smooth => {
                    s.delta = -(COS_TABLE_SIZE as f32) / dur;
                    s.factor = s.goal - s.current;
                    s.phase = 2.0 + COS_TABLE_SIZE as f32;
                    self.smooth_audio_rate = dur <= 0.01 * self.sample_rate as f32;
                    if self.smooth_audio_rate {
                        s.delta *= BL_RECIP;
                    }
                }
                FaderMode::Linear => {
                    s.step = (s.goal - s.current) / dur;
                }
            }
        }
    }
}

fn cos_lookup(phase: f32) -> f32 {
    raised_cosine(phase / COS_TABLE_SIZE as f32)
}

fn run_channel_block(mode: FaderMode, s: &mut ChannelState, input: &[f32], out: &mut [f32]) {
    let prev = s.current;
    match mode {
        FaderMode::Linear => {
            s.current += s.step;
        }
        FaderMode::Exponential => {
            s.current = (s.current + EXP_BIAS) * s.factor - EXP_BIAS;
        }
        FaderMode::Lowpass => {
            s.delta *= s.factor;
            s.current = s.goal - s.delta;
        }
        FaderMode::Smooth => {
            s.phase += s.delta;
            let rc = cos_lookup(s.phase);
            s.current = s.goal - s.factor * rc;
        }
    }
    let incr = (s.current - prev) * BL_RECIP;
    let mut v = prev;
    for (i, o) in out.iter_mut().enumerate() {
        v += incr;
        *o = input[i] * v;
    }
}

fn run_channel_smooth_ar(s: &mut ChannelState, input: &[f32], out: &mut [f32]) {
    let mut cur = s.current;
    let mut phase = s.phase;
    for (i, o) in out.iter_mut().enumerate() {
        phase += s.delta;
        let rc = cos_lookup(phase);
        cur = s.goal - s.factor * rc;
        *o = input[i] * cur;
    }
    s.current = cur;
    s.phase = phase;
}

fn run_channel_static(s: &ChannelState, input: &[f32], out: &mut [f32]) {
    for (i, o) in out.iter_mut().enumerate() {
        *o = input[i] * s.current;
    }
}

pub fn run(
    out: &mut [f32],
    id: UgenId,
    action_id: i32,
    f: &mut Fader,
    can_terminate: bool,
    ctx: &mut dyn GraphCtx,
    block: u64,
    reply_addr: Option<&str>,
) -> bool {
    ctx.pull(f.input, block);
    let input_chans = ctx.chans_of(f.input);
    let input_samps = ctx.out(f.input);

    let mut terminated = false;
    let static_mode = f.count == 0;
    if static_mode && can_terminate && f.states.iter().all(|s| s.goal == 0.0) {
        terminated = true;
    }
    f.count -= 1;

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

    for (ch, s) in f.states.iter_mut().enumerate() {
        let in_base = ch.min(input_chans.saturating_sub(1)) * BL;
        let input = &input_samps[in_base..in_base + BL];
        let out_slice = &mut out[ch * BL..ch * BL + BL];
        if static_mode {
            run_channel_static(s, input, out_slice);
        } else if f.mode == FaderMode::Smooth && f.smooth_audio_rate {
            run_channel_smooth_ar(s, input, out_slice);
        } else {
            run_channel_block(f.mode, s, input, out_slice);
        }
    }
    terminated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{expect_action, FakeGraph};

    #[test]
    fn linear_fade_reaches_goal() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(1.0, 1);
        let mut f = Fader::new(src, 1, 0.0, FaderMode::Linear, 1000);
        f.set_dur(0.01);
        f.set_goal(0, 1.0);
        let mut out = vec![0.0f32; BL];
        for _ in 0..20 {
            run(&mut out, 1, 0, &mut f, false, &mut g, 1, None);
        }
        assert!((out[BL - 1] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn static_zero_goal_terminates() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(1.0, 1);
        let mut f = Fader::new(src, 1, 0.0, FaderMode::Linear, 1000);
        let mut out = vec![0.0f32; BL];
        let terminated = run(&mut out, 1, 0, &mut f, true, &mut g, 1, None);
        assert!(terminated);
    }

    #[test]
    fn static_zero_goal_reports_term_action_when_registered() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(1.0, 1);
        let mut f = Fader::new(src, 1, 0.0, FaderMode::Linear, 1000);
        let mut out = vec![0.0f32; BL];
        let terminated = run(&mut out, 7, 42, &mut f, true, &mut g, 1, Some("/host/fader"));
        assert!(terminated);
        assert!(expect_action(&g.replies, ActionCode::Term, 7));
    }
}
