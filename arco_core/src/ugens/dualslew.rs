//! `Dualslewb`: block-rate portamento with independent attack/release rates,
//! each either linear or exponential.
//!
//! Grounded in `original_source/arco/src/dualslewb.h`. A fixed `BIAS` of
//! 0.01 keeps the exponential branch away from multiplying by zero forever.

use crate::ctx::{GraphCtx, UgenId};
use arco_primitives::BL;
use log::warn;

const BIAS: f32 = 0.01;

#[derive(Debug)]
pub struct Dualslewb {
    pub input: UgenId,
    states: Vec<f32>,
    attack: f32,
    release: f32,
    attack_coeff: f32,
    release_coeff: f32,
    attack_linear: bool,
    release_linear: bool,
    block_period: f32,
}

impl Dualslewb {
    pub fn new(
        input: UgenId,
        chans: usize,
        attack: f32,
        release: f32,
        current: f32,
        attack_linear: bool,
        release_linear: bool,
        sample_rate: u32,
    ) -> Self {
        let block_period = BL as f32 / sample_rate as f32;
        let mut d = Self {
            input,
            states: vec![current.max(0.0) + BIAS; chans],
            attack: 0.0,
            release: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            attack_linear,
            release_linear,
            block_period,
        };
        d.set_attack(attack, attack_linear);
        d.set_release(release, release_linear);
        d
    }

    pub fn set_current(&mut self, chan: usize, x: f32) {
        if let Some(s) = self.states.get_mut(chan) {
            *s = x.max(0.0) + BIAS;
        }
    }

    pub fn set_attack(&mut self, attack: f32, linear: bool) {
        self.attack = attack.max(self.block_period);
        self.attack_linear = linear;
        let rate = 1.0 / self.block_period;
        self.attack_coeff = if linear {
            1.0 / (self.attack * rate)
        } else {
            ((1.0 / BIAS).ln() / (self.attack * rate)).exp()
        };
    }

    pub fn set_release(&mut self, release: f32, linear: bool) {
        self.release = release.max(self.block_period);
        self.release_linear = linear;
        let rate = 1.0 / self.block_period;
        self.release_coeff = if linear {
            1.0 / (self.release * rate)
        } else {
            (BIAS.ln() / (self.release * rate)).exp()
        };
    }

    pub fn repl_input(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        if matches!(ctx.rate_of(input), crate::rate::Rate::Audio) {
            warn!("dualslewb: audio-rate input refused, keeping previous input");
            return;
        }
        ctx.unref(self.input);
        ctx.ref_up(input);
        self.input = input;
    }
}

pub fn run(out: &mut [f32], d: &mut Dualslewb, ctx: &mut dyn GraphCtx, block: u64) {
    ctx.pull(d.input, block);
    let input_chans = ctx.chans_of(d.input);
    let input_samps = ctx.out(d.input);
    for (ch, state) in d.states.iter_mut().enumerate() {
        let in_val = input_samps
            .get(ch.min(input_chans.saturating_sub(1)))
            .copied()
            .unwrap_or(0.0)
            .max(0.0)
            + BIAS;
        let mut current = *state;
        if in_val > current {
            current = if d.attack_linear {
                current + d.attack_coeff
            } else {
                current * d.attack_coeff
            };
            current = current.min(in_val);
        } else {
            current = if d.release_linear {
                current + d.release_coeff
            } else {
                current * d.release_coeff
            };
            current = current.max(in_val);
        }
        *state = current;
        out[ch] = current - BIAS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGraph;

    #[test]
    fn slews_up_toward_input() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(1.0, 1);
        let mut d = Dualslewb::new(src, 1, 0.05, 0.05, 0.0, true, true, 1000);
        let mut out = vec![0.0f32; 1];
        let mut last = -1.0;
        for _ in 0..50 {
            run(&mut out, &mut d, &mut g, 1);
            assert!(out[0] >= last);
            last = out[0];
        }
        assert!(out[0] > 0.0);
    }
}
