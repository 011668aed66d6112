//! Fixed-size sample-block primitives.
//!
//! Every ugen in the engine produces output into a contiguous,
//! channel-major buffer of `chans * BL` samples (audio rate) or `chans`
//! samples (block/constant rate). This crate provides the handful of
//! block-arithmetic routines and the raised-cosine table that the rest of
//! the engine builds on, rather than letting every ugen hand-roll its own
//! loops.

use std::sync::OnceLock;

/// Block length in samples. A small power of two so that per-block loops
/// vectorize cleanly.
pub const BL: usize = 32;
/// Reciprocal of [`BL`], precomputed to avoid repeated division in hot loops.
pub const BL_RECIP: f32 = 1.0 / BL as f32;

/// Size of the raised-cosine lookup table used for equal-power pans and
/// smooth fades.
pub const COS_TABLE_SIZE: usize = 4096;

/// Copy the first `n` samples of `src` into `dst`.
#[inline]
pub fn copy_n(dst: &mut [f32], src: &[f32], n: usize) {
    dst[..n].copy_from_slice(&src[..n]);
}

/// Add the first `n` samples of `src` into `dst`.
#[inline]
pub fn add_n(dst: &mut [f32], src: &[f32], n: usize) {
    for i in 0..n {
        dst[i] += src[i];
    }
}

/// Zero the first `n` samples of `dst`.
#[inline]
pub fn zero_n(dst: &mut [f32], n: usize) {
    dst[..n].fill(0.0);
}

/// Copy the first `chans` channels (`chans * BL` samples) of `src` into `dst`.
///
/// `dst` and `src` must each be at least `chans * BL` samples long.
#[inline]
pub fn block_copy_n(dst: &mut [f32], src: &[f32], chans: usize) {
    copy_n(dst, src, chans * BL);
}

/// Add the first `chans` channels of `src` into `dst` sample-by-sample.
#[inline]
pub fn block_add_n(dst: &mut [f32], src: &[f32], chans: usize) {
    add_n(dst, src, chans * BL);
}

/// Zero the first `chans` channels of `dst`.
#[inline]
pub fn block_zero_n(dst: &mut [f32], chans: usize) {
    let n = chans * BL;
    dst[..n].fill(0.0);
}

/// Linear interpolation from `start` to `end` evaluated at a fractional
/// position `t` in `[0, 1]`.
#[inline]
pub fn lerp(start: f32, end: f32, t: f32) -> f32 {
    start + (end - start) * t
}

/// Write a linear ramp of `BL` samples from `start` to `end` (exclusive of
/// `start`, inclusive of `end` on the last sample) into `dst`.
///
/// This is the core of [`Upsample`](https://docs.rs/arco_core)'s one-sample-per-block
/// to per-sample conversion: every sample-rate parameter ramp in the engine
/// is expressed in terms of this helper.
#[inline]
pub fn block_ramp(dst: &mut [f32], start: f32, end: f32) {
    debug_assert!(dst.len() >= BL);
    let incr = (end - start) * BL_RECIP;
    let mut v = start;
    for s in dst.iter_mut().take(BL) {
        v += incr;
        *s = v;
    }
}

fn cos_table() -> &'static [f32; COS_TABLE_SIZE] {
    static TABLE: OnceLock<[f32; COS_TABLE_SIZE]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0f32; COS_TABLE_SIZE];
        for (i, slot) in table.iter_mut().enumerate() {
            // Raised cosine: 0 at phase 0, 1 at phase 1 (half a cosine period).
            let phase = i as f32 / (COS_TABLE_SIZE - 1) as f32;
            *slot = 0.5 - 0.5 * (phase * std::f32::consts::PI).cos();
        }
        table
    })
}

/// Raised-cosine value for `phase` in `[0, 1]`: 0.0 at phase 0, 1.0 at phase 1,
/// smoothly accelerating and decelerating in between. Used for equal-power
/// pans (`Stdistr`) and smooth fades (`Fader::Smooth`).
#[inline]
pub fn raised_cosine(phase: f32) -> f32 {
    let phase = phase.clamp(0.0, 1.0);
    let table = cos_table();
    let pos = phase * (COS_TABLE_SIZE - 1) as f32;
    let i0 = pos as usize;
    let i1 = (i0 + 1).min(COS_TABLE_SIZE - 1);
    let frac = pos - i0 as f32;
    lerp(table[i0], table[i1], frac)
}

/// Cosine derived from the raised-cosine table: `2 * raised_cosine - 1`,
/// ranging from -1 at phase 0 to 1 at phase 1.
#[inline]
pub fn cosine(phase: f32) -> f32 {
    2.0 * raised_cosine(phase) - 1.0
}

/// Equal-power pan gains `(left, right)` for a pan position `pos` in
/// `[-1, 1]` (-1 = full left, 0 = center, 1 = full right), derived from the
/// raised-cosine table: `cos(x) = 1 - 2*raised_cosine(x/pi)` at quarter-wave
/// offsets gives the complementary left/right curves without a direct call
/// to `sin`/`cos`.
#[inline]
pub fn equal_power_pan(pos: f32) -> (f32, f32) {
    let phase = (pos.clamp(-1.0, 1.0) + 1.0) * 0.5;
    let left = 1.0 - 2.0 * raised_cosine(phase * 0.5);
    let right = 1.0 - 2.0 * raised_cosine((1.0 - phase) * 0.5);
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_copy_n_copies_exact_samples() {
        let src = vec![1.0f32; 2 * BL];
        let mut dst = vec![0.0f32; 2 * BL];
        block_copy_n(&mut dst, &src, 2);
        assert!(dst.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn block_add_n_accumulates() {
        let src = vec![1.0f32; BL];
        let mut dst = vec![1.0f32; BL];
        block_add_n(&mut dst, &src, 1);
        assert!(dst.iter().all(|&s| s == 2.0));
    }

    #[test]
    fn block_zero_n_clears() {
        let mut dst = vec![5.0f32; BL];
        block_zero_n(&mut dst, 1);
        assert!(dst.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn block_ramp_endpoints() {
        let mut dst = vec![0.0f32; BL];
        block_ramp(&mut dst, 0.0, 1.0);
        assert!((dst[BL - 1] - 1.0).abs() < 1e-6);
        // monotonic
        for w in dst.windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn raised_cosine_endpoints() {
        assert!(raised_cosine(0.0).abs() < 1e-3);
        assert!((raised_cosine(1.0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn equal_power_pan_center_is_equal() {
        let (l, r) = equal_power_pan(0.0);
        assert!((l - r).abs() < 1e-3);
        // Equal power: l^2 + r^2 ~= 1
        assert!((l * l + r * r - 1.0).abs() < 1e-3);
    }
}
