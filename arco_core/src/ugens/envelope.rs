//! Breakpoint envelopes: [`Pwl`]/[`Pwlb`] (piecewise linear, audio/block
//! rate) and [`Pwe`]/[`Pweb`] (piecewise exponential, audio/block rate).
//!
//! Grounded in `original_source/arco/src/pwl.h`, `pwlb.h`, `pwe.h`, `pweb.h`.
//! Breakpoints are uploaded as a flat `[seg_len, final_value, ...]` sequence
//! and bounded to [`MAX_ENV_POINTS`] pairs so a malformed upload can't grow
//! the audio thread's envelope state without bound.

use crate::ctx::ActionCode;
use crate::error::ParamError;
use arco_primitives::BL;

/// Maximum number of `(seg_len, value)` breakpoint pairs an envelope will
/// accept in one upload.
pub const MAX_ENV_POINTS: usize = 64;

fn push_point(points: &mut Vec<f32>, f: f32) -> Result<(), ParamError> {
    if points.len() / 2 >= MAX_ENV_POINTS {
        return Err(ParamError::EnvelopeOverflow(MAX_ENV_POINTS));
    }
    points.push(f);
    Ok(())
}

#[derive(Debug, Default)]
pub struct Pwl {
    current: f32,
    seg_togo: i64,
    seg_incr: f32,
    final_value: f32,
    next_point_index: usize,
    points: Vec<f32>,
}

impl Pwl {
    pub fn new() -> Self {
        Self {
            seg_togo: i64::MAX,
            ..Default::default()
        }
    }

    pub fn point(&mut self, f: f32) -> Result<(), ParamError> {
        push_point(&mut self.points, f)
    }

    pub fn start(&mut self) {
        self.next_point_index = 0;
        self.seg_togo = 0;
        self.final_value = self.current;
    }

    pub fn decay(&mut self, d: f32) -> Result<(), ParamError> {
        if d < 1.0 {
            return Err(ParamError::InvalidSegmentLength);
        }
        self.seg_togo = d as i64;
        self.seg_incr = -self.current / d;
        self.next_point_index = self.points.len();
        self.final_value = 0.0;
        Ok(())
    }

    pub fn set(&mut self, y: f32) {
        self.current = y;
    }
}

/// Returns `true` if the envelope just completed (an `End` action should be
/// emitted), and whether the ugen should self-terminate.
pub fn run(out: &mut [f32], e: &mut Pwl, can_terminate: bool) -> (bool, bool) {
    let mut togo = BL;
    let mut ended = false;
    let mut terminated = false;
    let mut idx = 0;
    while togo > 0 {
        let mut n = e.seg_togo.min(togo as i64);
        if n == 0 {
            e.current = e.final_value;
            if e.next_point_index >= e.points.len() {
                e.seg_togo = i64::MAX;
                e.seg_incr = 0.0;
                ended = true;
                if e.current == 0.0 && can_terminate {
                    terminated = true;
                }
                n = togo as i64;
                for s in out[idx..idx + n as usize].iter_mut() {
                    *s = e.current;
                }
                idx += n as usize;
                togo -= n as usize;
                continue;
            } else {
                e.seg_togo = e.points[e.next_point_index] as i64;
                e.next_point_index += 1;
                e.final_value = e.points[e.next_point_index];
                e.next_point_index += 1;
                e.seg_incr = (e.final_value - e.current) / e.seg_togo as f32;
                n = e.seg_togo.min(togo as i64);
            }
        }
        let n = n as usize;
        for s in out[idx..idx + n].iter_mut() {
            *s = e.current;
            e.current += e.seg_incr;
        }
        idx += n;
        togo -= n;
        e.seg_togo -= n as i64;
    }
    (ended, terminated)
}

#[derive(Debug, Default)]
pub struct Pwlb {
    current: f32,
    seg_togo: i64,
    seg_incr: f32,
    final_value: f32,
    next_point_index: usize,
    points: Vec<f32>,
}

impl Pwlb {
    pub fn new() -> Self {
        Self {
            seg_togo: i64::MAX,
            ..Default::default()
        }
    }
    pub fn point(&mut self, f: f32) -> Result<(), ParamError> {
        push_point(&mut self.points, f)
    }
    pub fn start(&mut self) {
        self.next_point_index = 0;
        self.seg_togo = 0;
        self.final_value = self.current;
    }
    pub fn decay(&mut self, d: f32) -> Result<(), ParamError> {
        if d < 1.0 {
            return Err(ParamError::InvalidSegmentLength);
        }
        self.seg_togo = d as i64;
        self.seg_incr = -self.current / d;
        self.next_point_index = self.points.len();
        self.final_value = 0.0;
        Ok(())
    }
    pub fn set(&mut self, y: f32) {
        self.current = y;
    }
}

pub fn run_b(e: &mut Pwlb) -> (f32, bool) {
    let mut ended = false;
    if e.seg_togo == 0 {
        e.current = e.final_value;
        if e.next_point_index >= e.points.len() {
            e.seg_togo = i64::MAX;
            e.seg_incr = 0.0;
            ended = true;
        } else {
            e.seg_togo = e.points[e.next_point_index] as i64;
            e.next_point_index += 1;
            e.final_value = e.points[e.next_point_index];
            e.next_point_index += 1;
            e.seg_incr = (e.final_value - e.current) / e.seg_togo as f32;
        }
    }
    let out = e.current;
    e.current += e.seg_incr;
    e.seg_togo -= 1;
    (out, ended)
}

const PWE_BIAS: f32 = 0.01;

#[derive(Debug)]
pub struct Pwe {
    bias: f32,
    current: f32,
    seg_togo: i64,
    seg_factor: f32,
    final_value: f32,
    next_point_index: usize,
    linear_attack: bool,
    linear_mode: bool,
    points: Vec<f32>,
}

impl Default for Pwe {
    fn default() -> Self {
        Self {
            bias: PWE_BIAS,
            current: PWE_BIAS,
            seg_togo: i64::MAX,
            seg_factor: 1.0,
            final_value: PWE_BIAS,
            next_point_index: 0,
            linear_attack: false,
            linear_mode: false,
            points: Vec::new(),
        }
    }
}

impl Pwe {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn point(&mut self, f: f32) -> Result<(), ParamError> {
        push_point(&mut self.points, f)
    }
    pub fn linatk(&mut self, linear: bool) {
        self.linear_attack = linear;
    }
    pub fn start(&mut self) {
        self.next_point_index = 0;
        self.linear_mode = self.linear_attack;
        self.seg_togo = 0;
        self.final_value = self.current;
    }
    pub fn decay(&mut self, d: f32) -> Result<(), ParamError> {
        if d < 1.0 {
            return Err(ParamError::InvalidSegmentLength);
        }
        self.seg_togo = d as i64;
        self.final_value = self.bias;
        self.linear_mode = false;
        self.seg_factor = ((self.final_value / self.current).ln() / d).exp();
        self.next_point_index = self.points.len();
        Ok(())
    }
    pub fn set(&mut self, y: f32) {
        self.current = y + self.bias;
    }
}

pub fn run_pwe(out: &mut [f32], e: &mut Pwe, can_terminate: bool) -> (bool, bool) {
    let mut togo = BL;
    let mut ended = false;
    let mut terminated = false;
    let mut idx = 0;
    while togo > 0 {
        let mut n = e.seg_togo.min(togo as i64);
        if n == 0 {
            e.current = e.final_value;
            if e.next_point_index >= e.points.len() {
                e.seg_togo = i64::MAX;
                ended = true;
                if e.current == e.bias && can_terminate {
                    terminated = true;
                }
                n = togo as i64;
                for s in out[idx..idx + n as usize].iter_mut() {
                    *s = e.current - e.bias;
                }
                idx += n as usize;
                togo -= n as usize;
                continue;
            } else {
                e.linear_mode &= e.next_point_index == 0;
                e.seg_togo = e.points[e.next_point_index] as i64;
                e.next_point_index += 1;
                e.final_value = e.points[e.next_point_index] + e.bias;
                e.next_point_index += 1;
                e.seg_factor = if e.linear_mode {
                    (e.final_value - e.current) / e.seg_togo as f32
                } else {
                    ((e.final_value / e.current).ln() / e.seg_togo as f32).exp()
                };
                n = e.seg_togo.min(togo as i64);
            }
        }
        let n = n as usize;
        if e.linear_mode {
            for s in out[idx..idx + n].iter_mut() {
                e.current += e.seg_factor;
                *s = e.current - e.bias;
            }
        } else {
            for s in out[idx..idx + n].iter_mut() {
                e.current *= e.seg_factor;
                *s = e.current - e.bias;
            }
        }
        idx += n;
        togo -= n;
        e.seg_togo -= n as i64;
    }
    (ended, terminated)
}

#[derive(Debug)]
pub struct Pweb {
    bias: f32,
    current: f32,
    seg_togo: i64,
    seg_factor: f32,
    final_value: f32,
    next_point_index: usize,
    linear_attack: bool,
    linear_mode: bool,
    points: Vec<f32>,
}

impl Default for Pweb {
    fn default() -> Self {
        Self {
            bias: PWE_BIAS,
            current: PWE_BIAS,
            seg_togo: i64::MAX,
            seg_factor: 1.0,
            final_value: PWE_BIAS,
            next_point_index: 0,
            linear_attack: false,
            linear_mode: false,
            points: Vec::new(),
        }
    }
}

impl Pweb {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn point(&mut self, f: f32) -> Result<(), ParamError> {
        push_point(&mut self.points, f)
    }
    pub fn linatk(&mut self, linear: bool) {
        self.linear_attack = linear;
    }
    pub fn start(&mut self) {
        self.next_point_index = 0;
        self.linear_mode = self.linear_attack;
        self.seg_togo = 0;
        self.final_value = self.current;
    }
    pub fn set(&mut self, y: f32) {
        self.current = y + self.bias;
    }
}

pub fn run_pweb(e: &mut Pweb) -> (f32, bool) {
    let mut ended = false;
    if e.seg_togo == 0 {
        e.current = e.final_value;
        if e.next_point_index >= e.points.len() {
            e.seg_togo = i64::MAX;
            ended = true;
        } else {
            e.linear_mode &= e.next_point_index == 0;
            e.seg_togo = e.points[e.next_point_index] as i64;
            e.next_point_index += 1;
            e.final_value = e.points[e.next_point_index] + e.bias;
            e.next_point_index += 1;
            e.seg_factor = if e.linear_mode {
                (e.final_value - e.current) / e.seg_togo as f32
            } else {
                ((e.final_value / e.current).ln() / e.seg_togo as f32).exp()
            };
        }
    }
    if e.linear_mode {
        e.current += e.seg_factor;
    } else {
        e.current *= e.seg_factor;
    }
    e.seg_togo -= 1;
    (e.current - e.bias, ended)
}

/// The action a ugen owner should translate into an outbound reply when an
/// envelope's `run` reports `ended`, given the ugen's own `action_id`.
pub fn end_action(action_id: i32) -> Option<ActionCode> {
    (action_id != 0).then_some(ActionCode::End)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pwl_ramps_to_breakpoint() {
        let mut e = Pwl::new();
        e.point(BL as f32).unwrap();
        e.point(1.0).unwrap();
        e.start();
        let mut out = vec![0.0f32; BL];
        let (ended, _) = run(&mut out, &mut e, false);
        assert!(!ended);
        assert!((out[BL - 1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn pwl_ends_and_terminates_at_zero() {
        let mut e = Pwl::new();
        e.point(BL as f32).unwrap();
        e.point(0.0).unwrap();
        e.start();
        let mut out = vec![0.0f32; BL];
        let (ended1, term1) = run(&mut out, &mut e, true);
        assert!(!ended1 && !term1);
        let (ended2, term2) = run(&mut out, &mut e, true);
        assert!(ended2 && term2);
    }

    #[test]
    fn envelope_overflow_is_refused() {
        let mut e = Pwl::new();
        for i in 0..MAX_ENV_POINTS {
            e.point(1.0).unwrap();
            e.point(i as f32).unwrap();
        }
        assert!(e.point(1.0).is_err());
    }

    #[test]
    fn pwe_decays_toward_bias() {
        let mut e = Pwe::new();
        e.set(1.0);
        e.point(BL as f32 * 4.0).unwrap();
        e.point(0.0).unwrap();
        e.start();
        let mut out = vec![0.0f32; BL];
        for _ in 0..4 {
            run_pwe(&mut out, &mut e, false);
        }
        assert!(out[BL - 1] < 0.1);
    }

    #[test]
    fn pwlb_single_step_per_call() {
        let mut e = Pwlb::new();
        e.point(2.0).unwrap();
        e.point(1.0).unwrap();
        e.start();
        let (v0, _) = run_b(&mut e);
        let (v1, ended) = run_b(&mut e);
        assert!(v1 > v0);
        assert!(!ended);
    }
}
