//! Windowed analysis ugens: a shared sliding-window buffer
//! ([`WindowedBuffer`]), [`Yin`] pitch/harmonicity/RMS estimation, [`Trig`]
//! threshold-crossing event detection with hysteresis, and [`Chorddetect`]
//! chroma-based chord classification behind a pluggable [`ChordClassifier`].
//!
//! Grounded in `original_source/arco/src/windowedinput.h` (buffer shift/
//! append/hop logic), `yin.cpp` (autocorrelation-based pitch estimator,
//! `parabolic_interp`), and `trig.cpp` (half-window RMS trigger with
//! separate onoff hysteresis run-length counter). `ChordDetector.h`/
//! `Chromagram.h` in the original sources carry no implementation to port
//! (empty headers), so `Chorddetect`'s chroma estimate and classifier here
//! are this engine's own, grounded in spec.md's description of a pluggable
//! classifier rather than a transliteration.

use crate::ctx::{GraphCtx, ReplyPayload, UgenId};
use arco_primitives::BL;

/// Accumulates audio into overlapping, hop-advanced windows for analysis
/// ugens that need more history than one block.
#[derive(Debug)]
pub struct WindowedBuffer {
    samps: Vec<Vec<f32>>,
    tail: usize,
    window_size: usize,
    hopsize: usize,
}

impl WindowedBuffer {
    pub fn new(chans: usize, window_size: usize, hopsize: usize) -> Self {
        let buffer_size = window_size + BL * 2;
        Self {
            samps: vec![Vec::with_capacity(buffer_size); chans],
            tail: 0,
            window_size,
            hopsize,
        }
    }

    /// Append one block of (channel-major) input, then invoke `process` once
    /// per complete window that becomes available, in hop order.
    pub fn push_block(&mut self, input: &[f32], mut process: impl FnMut(usize, &[f32])) {
        let chans = self.samps.len();
        for (ch, buf) in self.samps.iter_mut().enumerate() {
            let base = ch * BL;
            buf.extend_from_slice(&input[base..base + BL]);
        }
        while self.samps[0].len() >= self.tail + self.window_size {
            for ch in 0..chans {
                let window = self.samps[ch][self.tail..self.tail + self.window_size].to_vec();
                process(ch, &window);
            }
            self.tail += self.hopsize;
        }
        if self.tail > 0 && self.samps[0].len() > self.window_size * 4 {
            for buf in &mut self.samps {
                buf.drain(0..self.tail);
            }
            self.tail = 0;
        }
    }
}

fn parabolic_interp(x1: f32, x2: f32, x3: f32, y1: f32, y2: f32, y3: f32) -> (f32, f32) {
    let a = ((y1 - y2) / (x1 - x2) - (y2 - y3) / (x2 - x3)) / (x1 - x3);
    let b = (y1 - y2) / (x1 - x2) - a * (x1 + x2);
    let c = y1 - a * x1 * x1 - b * x1;
    let pos = -b / (a + a);
    let value = (a * pos + b) * pos + c;
    (pos, value)
}

fn step_to_hz(step: f32) -> f32 {
    440.0 * 2f32.powf((step - 69.0) / 12.0)
}

fn hz_to_step(hz: f32) -> f32 {
    69.0 + 12.0 * (hz / 440.0).log2()
}

#[derive(Clone, Copy, Debug, Default)]
struct YinChannelState {
    harmonicity: f32,
    pitch: f32,
    rms: f32,
}

#[derive(Debug)]
pub struct Yin {
    pub input: UgenId,
    chans: usize,
    buffer: WindowedBuffer,
    states: Vec<YinChannelState>,
    m: usize,
    middle: usize,
    results: Vec<f32>,
    new_estimates: bool,
    reply_addr: String,
    sample_rate: u32,
}

impl Yin {
    pub fn new(
        input: UgenId,
        chans: usize,
        minstep: i32,
        maxstep: i32,
        hopsize: usize,
        sample_rate: u32,
        reply_addr: String,
    ) -> Self {
        let ar = sample_rate as f32;
        let middle = (ar / step_to_hz(minstep as f32)).ceil() as usize;
        let window_size = middle * 2;
        let m = (ar / step_to_hz(maxstep as f32)) as usize;
        Self {
            input,
            chans,
            buffer: WindowedBuffer::new(chans, window_size, hopsize),
            states: vec![YinChannelState::default(); chans],
            m: m.max(1),
            middle,
            results: vec![0.0; middle.saturating_sub(m.max(1)) + 1],
            new_estimates: false,
            reply_addr,
            sample_rate,
        }
    }

    pub fn repl_input(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.input);
        ctx.ref_up(input);
        self.input = input;
    }

    pub fn set_reply_addr(&mut self, addr: String) {
        self.reply_addr = addr;
    }

    fn process_window(&mut self, channel: usize, window: &[f32]) {
        let (m, middle) = (self.m, self.middle);
        let threshold = 0.1f32;
        let mut left_energy = 0.0f32;
        let mut right_energy = 0.0f32;
        for i in 0..m.saturating_sub(1) {
            let left = window[middle - 1 - i];
            left_energy += left * left;
            let right = window[middle + i];
            right_energy += right * right;
        }
        for i in m..=middle {
            let left = window[middle - i];
            left_energy += left * left;
            let right = window[middle - 1 + i];
            right_energy += right * right;
            let mut auto_corr = 0.0f32;
            for j in 0..i {
                auto_corr += window[middle - i + j] * window[middle + j];
            }
            let non_periodic = left_energy + right_energy - 2.0 * auto_corr;
            self.results[i - m] = non_periodic;
        }
        let mut cum_sum = 0.000001f32;
        for i in m..=middle {
            cum_sum += self.results[i - m];
            self.results[i - m] /= cum_sum / (i - m + 1) as f32;
        }
        let mut min_i = m;
        for i in m..=middle {
            if self.results[i - m] < threshold {
                min_i = i;
                while min_i < middle && self.results[min_i + 1 - m] < self.results[min_i - m] {
                    min_i += 1;
                }
                break;
            }
            if self.results[i - m] < self.results[min_i - m] {
                min_i = i;
            }
        }
        let (period, harmonicity) = if min_i > m && min_i < middle {
            let (pos, value) = parabolic_interp(
                (min_i - 1) as f32,
                min_i as f32,
                (min_i + 1) as f32,
                self.results[min_i - 1 - m],
                self.results[min_i - m],
                self.results[min_i + 1 - m],
            );
            (pos, value)
        } else {
            (min_i as f32, self.results[min_i - m])
        };
        let s = &mut self.states[channel];
        s.harmonicity = harmonicity;
        s.pitch = if period > 0.0 {
            hz_to_step(self.sample_rate as f32 / period)
        } else {
            0.0
        };
        s.rms = ((right_energy + left_energy) / (2.0 * middle as f32)).sqrt();
        self.new_estimates = true;
    }
}

pub fn run(y: &mut Yin, ctx: &mut dyn GraphCtx, block: u64) {
    ctx.pull(y.input, block);
    let input_samps = ctx.out(y.input).to_vec();
    let input_chans = ctx.chans_of(y.input).max(1);
    let chans = y.chans;
    let mut channel_buf = vec![0.0f32; chans * BL];
    for ch in 0..chans {
        let src_ch = ch.min(input_chans - 1);
        channel_buf[ch * BL..ch * BL + BL]
            .copy_from_slice(&input_samps[src_ch * BL..src_ch * BL + BL]);
    }
    let mut pending: Vec<(usize, Vec<f32>)> = Vec::new();
    y.buffer.push_block(&channel_buf, |ch, window| {
        pending.push((ch, window.to_vec()));
    });
    for (ch, window) in pending {
        y.process_window(ch, &window);
    }
    if y.new_estimates {
        for ch in 0..chans {
            let s = y.states[ch];
            ctx.reply(
                &y.reply_addr,
                ReplyPayload::Pitch {
                    id: 0,
                    channel: ch,
                    midi_pitch: s.pitch,
                    harmonicity: s.harmonicity,
                    rms: s.rms,
                },
            );
        }
        y.new_estimates = false;
    }
}

#[derive(Debug)]
pub struct Trig {
    pub input: UgenId,
    address: String,
    window_size: usize,
    trig_threshold: f32,
    pause: i64,
    sum0: f32,
    sum1: f32,
    count: usize,
    enabled: bool,
    onoff_addr: Option<String>,
    onoff_threshold: f32,
    onoff_runlen: i64,
    onoff_state: bool,
    onoff_count: i64,
    reported_state: bool,
    pause_for: i64,
}

impl Trig {
    pub fn new(
        input: UgenId,
        address: String,
        window_size: usize,
        threshold: f32,
        pause_secs: f32,
        sample_rate: u32,
    ) -> Self {
        let mut t = Self {
            input,
            address,
            window_size: 0,
            trig_threshold: threshold,
            pause: 0,
            sum0: 1.0e10,
            sum1: 0.0,
            count: 0,
            enabled: false,
            onoff_addr: None,
            onoff_threshold: 0.0,
            onoff_runlen: 2,
            onoff_state: false,
            onoff_count: 0,
            reported_state: false,
            pause_for: 0,
        };
        t.set_window(window_size);
        t.set_pause(pause_secs, sample_rate);
        t
    }

    pub fn set_window(&mut self, size: usize) {
        self.window_size = size.div_ceil(BL) * BL;
    }

    pub fn set_threshold(&mut self, thresh: f32) {
        self.trig_threshold = thresh;
    }

    pub fn set_pause(&mut self, pause_secs: f32, sample_rate: u32) {
        let blocks_per_sec = sample_rate as f32 / BL as f32;
        self.pause = (pause_secs * blocks_per_sec).ceil() as i64;
    }

    pub fn onoff(&mut self, repl_addr: &str, threshold: f32, runlen_secs: f32, sample_rate: u32) {
        if repl_addr.is_empty() {
            self.onoff_addr = None;
        } else {
            let blocks_per_sec = sample_rate as f32 / BL as f32;
            self.onoff_addr = Some(repl_addr.to_string());
            self.onoff_threshold = threshold;
            self.onoff_runlen = (runlen_secs * blocks_per_sec).ceil() as i64;
        }
    }

    pub fn repl_input(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        ctx.unref(self.input);
        ctx.ref_up(input);
        self.input = input;
    }

    pub fn set_reply_addr(&mut self, addr: String) {
        self.address = addr;
    }
}

pub fn run_trig(t: &mut Trig, ctx: &mut dyn GraphCtx, block: u64) {
    ctx.pull(t.input, block);
    let input_chans = ctx.chans_of(t.input).max(1);
    let samps = ctx.out(t.input);
    let n = input_chans * BL;
    let sum: f32 = samps.iter().take(n).map(|s| s * s).sum();
    t.sum0 += sum;
    t.sum1 += sum;
    t.count += BL;

    if t.count >= t.window_size / 2 {
        let rms = (t.sum0 / (t.window_size * input_chans) as f32).sqrt();
        if t.enabled && rms > t.trig_threshold && t.pause_for <= 0 {
            ctx.reply(&t.address, ReplyPayload::Trigger { id: 0, rms });
            t.pause_for = t.pause;
            t.sum1 = t.sum0;
            t.enabled = false;
        } else if t.sum0 < t.trig_threshold {
            t.enabled = true;
        }

        if let Some(addr) = t.onoff_addr.clone() {
            if rms > t.onoff_threshold {
                t.onoff_state = true;
            } else if rms < t.onoff_threshold * 0.9 {
                t.onoff_state = false;
            }
            t.onoff_count += 1;
            if t.onoff_state == t.reported_state {
                t.onoff_count = 0;
            } else if t.onoff_count >= t.onoff_runlen {
                t.reported_state = t.onoff_state;
                ctx.reply(
                    &addr,
                    ReplyPayload::Onoff {
                        id: 0,
                        state: t.onoff_state,
                    },
                );
            }
        }
        t.count = 0;
        t.sum0 = t.sum1;
        t.sum1 = 0.0;
    }
    t.pause_for -= 1;
}

/// A pluggable chord classifier: given 12 chroma bin energies (C..B), return
/// a root/quality/interval-mask guess.
pub trait ChordClassifier: std::fmt::Debug + Send {
    fn classify(&self, chroma: &[f32; 12]) -> (&'static str, &'static str, u16);
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Matches the chroma vector against major/minor triad templates rotated
/// through all 12 roots, picking the best dot-product correlation.
#[derive(Debug, Default)]
pub struct TemplateChordClassifier;

impl ChordClassifier for TemplateChordClassifier {
    fn classify(&self, chroma: &[f32; 12]) -> (&'static str, &'static str, u16) {
        const MAJOR: [usize; 3] = [0, 4, 7];
        const MINOR: [usize; 3] = [0, 3, 7];
        let mut best = (0usize, "maj", 0.0f32, 0u16);
        for root in 0..12 {
            for (quality, intervals) in [("maj", MAJOR), ("min", MINOR)] {
                let mut score = 0.0f32;
                let mut mask = 0u16;
                for &iv in &intervals {
                    let bin = (root + iv) % 12;
                    score += chroma[bin];
                    mask |= 1 << bin;
                }
                if score > best.2 {
                    best = (root, quality, score, mask);
                }
            }
        }
        (NOTE_NAMES[best.0], best.1, best.3)
    }
}

/// Goertzel-style per-pitch-class energy estimate over a window, folded into
/// 12 chroma bins. A from-scratch analysis grounded in spec.md's description
/// rather than a port, since the original sources carry no implementation.
fn chroma_of_window(window: &[f32], sample_rate: u32) -> [f32; 12] {
    let mut chroma = [0.0f32; 12];
    let n = window.len() as f32;
    for midi in 24..96i32 {
        let freq = step_to_hz(midi as f32);
        let w = std::f32::consts::TAU * freq / sample_rate as f32;
        let coeff = 2.0 * w.cos();
        let mut s1 = 0.0f32;
        let mut s2 = 0.0f32;
        for &x in window {
            let s0 = x + coeff * s1 - s2;
            s2 = s1;
            s1 = s0;
        }
        let power = s1 * s1 + s2 * s2 - coeff * s1 * s2;
        chroma[(midi as usize) % 12] += power.max(0.0) / n;
    }
    chroma
}

#[derive(Debug)]
pub struct Chorddetect {
    pub input: Option<UgenId>,
    buffer: WindowedBuffer,
    classifier: Box<dyn ChordClassifier>,
    sample_rate: u32,
    reply_addr: String,
    pending_window: Option<Vec<f32>>,
}

impl Chorddetect {
    pub fn new(frame_size: usize, sample_rate: u32, reply_addr: String) -> Self {
        Self {
            input: None,
            buffer: WindowedBuffer::new(1, frame_size, frame_size),
            classifier: Box::new(TemplateChordClassifier),
            sample_rate,
            reply_addr,
            pending_window: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ChordClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn repl_input(&mut self, input: UgenId, ctx: &mut dyn GraphCtx) {
        if let Some(old) = self.input.take() {
            ctx.unref(old);
        }
        ctx.ref_up(input);
        self.input = Some(input);
    }

    pub fn set_reply_addr(&mut self, addr: String) {
        self.reply_addr = addr;
    }
}

pub fn run_chorddetect(c: &mut Chorddetect, ctx: &mut dyn GraphCtx, block: u64) {
    let Some(input) = c.input else { return };
    ctx.pull(input, block);
    let samps = ctx.out(input);
    let mono: Vec<f32> = samps.iter().take(BL).copied().collect();
    c.buffer.push_block(&mono, |_ch, window| {
        c.pending_window = Some(window.to_vec());
    });
    if let Some(window) = c.pending_window.take() {
        let chroma = chroma_of_window(&window, c.sample_rate);
        let (root, quality, mask) = c.classifier.classify(&chroma);
        ctx.reply(
            &c.reply_addr,
            ReplyPayload::Chord {
                id: 0,
                root,
                quality,
                interval_mask: mask,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGraph;

    #[test]
    fn windowed_buffer_fires_on_hop() {
        let mut buf = WindowedBuffer::new(1, 64, 32);
        let mut fired = 0;
        for _ in 0..4 {
            let block = vec![0.1f32; BL];
            buf.push_block(&block, |_, _| fired += 1);
        }
        assert!(fired > 0);
    }

    #[test]
    fn trig_fires_above_threshold() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(1.0, 1);
        let mut t = Trig::new(src, "/reply/trig".to_string(), BL * 2, 0.01, 0.0, 1000);
        t.enabled = true;
        for _ in 0..8 {
            run_trig(&mut t, &mut g, 1);
        }
        assert!(g.replies.iter().any(|(addr, _)| addr == "/reply/trig"));
    }

    #[test]
    fn template_classifier_prefers_matching_triad() {
        let classifier = TemplateChordClassifier;
        let mut chroma = [0.0f32; 12];
        chroma[0] = 1.0;
        chroma[4] = 1.0;
        chroma[7] = 1.0;
        let (root, quality, _) = classifier.classify(&chroma);
        assert_eq!(root, "C");
        assert_eq!(quality, "maj");
    }
}
