//! Rate converters: [`Upsample`] lifts a block/constant-rate source to audio
//! rate with a per-sample linear ramp, [`Dnsampleb`] reduces an audio-rate
//! source to block rate under one of several reduction modes.
//!
//! Grounded in `original_source/arco/src/upsample.h` and `dnsampleb.h`. The
//! registry installs these automatically when a parameter's rate doesn't
//! match what a ugen requires (spec.md §4.2, §9).

use crate::ctx::{GraphCtx, UgenId};
use arco_primitives::{block_ramp, BL, BL_RECIP};

#[derive(Debug)]
pub struct Upsample {
    pub input: UgenId,
    pub chans: usize,
    prev: Vec<f32>,
}

impl Upsample {
    pub fn new(input: UgenId, chans: usize) -> Self {
        Self {
            input,
            chans,
            prev: vec![0.0; chans],
        }
    }

    pub fn repl_input(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.input);
        ctx.ref_up(input);
        self.input = input;
    }
}

/// `out` must be `chans * BL` samples; `input_stride` is the per-channel
/// stride of the upstream ugen's output (0 for a constant source, 1 for
/// block rate).
pub fn run(out: &mut [f32], u: &mut Upsample, ctx: &mut dyn GraphCtx, block: u64) {
    ctx.pull(u.input, block);
    // Upsample's input is block/constant rate by construction (the registry
    // only installs this wrapper to adapt those up to audio); one sample per
    // channel regardless of which of the two it is.
    let stride = if matches!(ctx.rate_of(u.input), crate::rate::Rate::None) {
        0
    } else {
        1
    };
    let input_samps = ctx.out(u.input);
    for ch in 0..u.chans {
        let target = input_samps.get(ch * stride).copied().unwrap_or(0.0);
        block_ramp(&mut out[ch * BL..ch * BL + BL], u.prev[ch], target);
        u.prev[ch] = target;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DnsamplebMode {
    Basic,
    Avg,
    Peak,
    Rms,
    Power,
    Lowpass500,
    Lowpass100,
}

impl DnsamplebMode {
    pub fn from_index(i: i32) -> Option<Self> {
        Some(match i {
            0 => DnsamplebMode::Basic,
            1 => DnsamplebMode::Avg,
            2 => DnsamplebMode::Peak,
            3 => DnsamplebMode::Rms,
            4 => DnsamplebMode::Power,
            5 => DnsamplebMode::Lowpass500,
            6 => DnsamplebMode::Lowpass100,
            _ => return None,
        })
    }
}

#[derive(Debug)]
pub struct Dnsampleb {
    pub input: UgenId,
    pub chans: usize,
    mode: DnsamplebMode,
    alpha: f32,
    one_minus_alpha: f32,
    /// Blocks of near-silence after which a `Lowpass500`/`Lowpass100` tail is
    /// considered decayed to -140dB (`spec.md` §4.4): once `input`
    /// terminates, a lowpass-mode `Dnsampleb` keeps running for this many
    /// further blocks before terminating itself, rather than cutting the
    /// tail off immediately the way the other modes do.
    pub tail_blocks: u32,
    /// Blocks still owed on the post-termination tail, counting down once
    /// `input` terminates; `None` before that.
    tail_remaining: Option<u32>,
    prev: Vec<f32>,
}

impl Dnsampleb {
    pub fn new(input: UgenId, chans: usize, mode: DnsamplebMode, sample_rate: u32) -> Self {
        let mut d = Self {
            input,
            chans,
            mode,
            alpha: 0.0,
            one_minus_alpha: 1.0,
            tail_blocks: 0,
            tail_remaining: None,
            prev: vec![0.0; chans],
        };
        match mode {
            DnsamplebMode::Lowpass500 => d.set_cutoff(500.0, sample_rate),
            DnsamplebMode::Lowpass100 => d.set_cutoff(100.0, sample_rate),
            _ => {}
        }
        d
    }

    /// Recompute the one-pole coefficients for a lowpass cutoff of `hz`.
    /// Only meaningful in the `Lowpass500`/`Lowpass100` modes, but callable
    /// on any mode to retune it to a custom cutoff.
    pub fn set_cutoff(&mut self, hz: f32, sample_rate: u32) {
        let ap = 1.0 / sample_rate as f32;
        let k = 1.0 - (std::f32::consts::TAU * hz * ap).cos();
        let alpha = -k + ((2.0 + k) * k).sqrt();
        self.alpha = alpha;
        self.one_minus_alpha = 1.0 - alpha;
        self.tail_blocks = (0.0000001f32.ln() / (self.one_minus_alpha.ln() * BL as f32)) as u32;
    }

    pub fn repl_input(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.input);
        ctx.ref_up(input);
        self.input = input;
    }
}

fn reduce(mode: DnsamplebMode, samps: &[f32], prev: &mut f32, alpha: f32, one_minus_alpha: f32) -> f32 {
    match mode {
        DnsamplebMode::Basic => samps[0],
        DnsamplebMode::Avg => samps.iter().take(BL).sum::<f32>() * BL_RECIP,
        DnsamplebMode::Peak => samps.iter().take(BL).fold(0.0f32, |m, &s| m.max(s.abs())),
        DnsamplebMode::Power => samps.iter().take(BL).map(|s| s * s).sum::<f32>() * BL_RECIP,
        DnsamplebMode::Rms => {
            let power = samps.iter().take(BL).map(|s| s * s).sum::<f32>() * BL_RECIP;
            power.sqrt()
        }
        DnsamplebMode::Lowpass500 | DnsamplebMode::Lowpass100 => {
            for &s in samps.iter().take(BL) {
                *prev = alpha * s + one_minus_alpha * *prev;
            }
            *prev
        }
    }
}

/// Runs one block and reports whether `d` should terminate: the non-lowpass
/// modes terminate the instant `input` does (`original_source/arco/src/
/// dnsampleb.h:169`); the lowpass modes instead keep producing their decaying
/// tail for `tail_blocks` further blocks before terminating, since cutting a
/// one-pole tail off immediately would leave an audible discontinuity.
pub fn run_dnsampleb(out: &mut [f32], d: &mut Dnsampleb, can_terminate: bool, ctx: &mut dyn GraphCtx, block: u64) -> bool {
    ctx.pull(d.input, block);
    let input_samps = ctx.out(d.input);
    let input_chans = ctx.chans_of(d.input);
    for ch in 0..d.chans {
        let base = ch.min(input_chans.saturating_sub(1)) * BL;
        let slice = if base + BL <= input_samps.len() {
            &input_samps[base..base + BL]
        } else {
            &[][..]
        };
        out[ch] = if slice.len() == BL {
            reduce(d.mode, slice, &mut d.prev[ch], d.alpha, d.one_minus_alpha)
        } else {
            0.0
        };
    }

    if !can_terminate || !ctx.is_terminated(d.input) {
        return false;
    }
    match d.mode {
        DnsamplebMode::Lowpass500 | DnsamplebMode::Lowpass100 => {
            let remaining = d.tail_remaining.get_or_insert(d.tail_blocks);
            if *remaining == 0 {
                true
            } else {
                *remaining -= 1;
                false
            }
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGraph;

    #[test]
    fn upsample_ramps_toward_target() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(1.0, 1);
        let mut u = Upsample::new(src, 1);
        let mut out = vec![0.0f32; BL];
        run(&mut out, &mut u, &mut g, 1);
        assert!((out[BL - 1] - 1.0).abs() < 1e-3);
        for w in out.windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn dnsampleb_basic_reads_first_sample() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(0.5, 1);
        let mut d = Dnsampleb::new(src, 1, DnsamplebMode::Basic, 44100);
        let mut out = vec![0.0f32; 1];
        run_dnsampleb(&mut out, &mut d, false, &mut g, 1);
        assert!((out[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn dnsampleb_basic_terminates_immediately_with_input() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(0.5, 1);
        let mut d = Dnsampleb::new(src, 1, DnsamplebMode::Basic, 44100);
        let mut out = vec![0.0f32; 1];
        assert!(!run_dnsampleb(&mut out, &mut d, true, &mut g, 1));
        g.terminate(src);
        assert!(run_dnsampleb(&mut out, &mut d, true, &mut g, 2), "non-lowpass modes terminate the instant their input does");
    }

    #[test]
    fn dnsampleb_basic_does_not_terminate_when_not_allowed_to() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(0.5, 1);
        let mut d = Dnsampleb::new(src, 1, DnsamplebMode::Basic, 44100);
        let mut out = vec![0.0f32; 1];
        g.terminate(src);
        assert!(!run_dnsampleb(&mut out, &mut d, false, &mut g, 1));
    }

    #[test]
    fn dnsampleb_lowpass_runs_its_tail_before_terminating() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(0.5, 1);
        let mut d = Dnsampleb::new(src, 1, DnsamplebMode::Lowpass500, 44100);
        let mut out = vec![0.0f32; 1];
        g.terminate(src);
        let tail = d.tail_blocks;
        assert!(tail > 0, "a lowpass cutoff should always yield a positive tail length");
        for b in 0..tail {
            assert!(
                !run_dnsampleb(&mut out, &mut d, true, &mut g, 1 + b as u64),
                "should still be running its tail at block {b}"
            );
        }
        assert!(
            run_dnsampleb(&mut out, &mut d, true, &mut g, 1 + tail as u64),
            "should terminate once the tail is exhausted"
        );
    }

    #[test]
    fn dnsampleb_peak_takes_max_abs() {
        let mut g = FakeGraph::new();
        let src = g.add_silent_audio(1);
        // overwrite the fake source's samples with a ramp holding a known peak
        // (FakeGraph exposes samps only via pull; re-seed through add_constant
        // for simplicity since peak-of-constant == the constant)
        let src2 = g.add_constant(-0.75, 1);
        let mut d = Dnsampleb::new(src2, 1, DnsamplebMode::Peak, 44100);
        let mut out = vec![0.0f32; 1];
        run_dnsampleb(&mut out, &mut d, false, &mut g, 1);
        assert!((out[0] - 0.75).abs() < 1e-6);
        let _ = src;
    }
}
