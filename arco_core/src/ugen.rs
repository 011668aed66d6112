//! The single concrete ugen representation: a fixed envelope of id/rate/
//! flags/refcount bookkeeping (component B) wrapping a [`UgenKind`] tagged
//! union of per-category state (component C).
//!
//! Per `spec.md` §9's design note, polymorphism here is a closed tagged
//! dispatch over an enum rather than a class hierarchy: every ugen category
//! the engine supports is a named variant, and [`Ugen::real_run`] matches on
//! it. Adding a new ugen kind means adding a variant and an arm, not
//! subclassing.

use crate::ctx::{GraphCtx, UgenId};
use crate::flags::UgenFlags;
use crate::rate::Rate;
use crate::ugens::{blend, dualslew, envelope, fader, feedback, rateconv, route, smooth, stdistr, sum, windowed};
use arco_primitives::BL;

/// Every ugen category the engine implements. See `ugens/*.rs` for the
/// per-kind state and `real_run` bodies this dispatches to.
#[derive(Debug)]
pub enum UgenKind {
    /// The permanent all-zero source installed at [`crate::ctx::ZERO_ID`] /
    /// [`crate::ctx::ZEROB_ID`], and any other host-settable constant.
    Const,
    Sum(sum::Sum),
    Sumb(sum::Sumb),
    Add(sum::Add),
    Addb(sum::Addb),
    Route(route::Route),
    Stdistr(stdistr::Stdistr),
    Upsample(rateconv::Upsample),
    Dnsampleb(rateconv::Dnsampleb),
    Smooth(smooth::Smooth),
    Smoothb(smooth::Smoothb),
    Pwl(envelope::Pwl),
    Pwlb(envelope::Pwlb),
    Pwe(envelope::Pwe),
    Pweb(envelope::Pweb),
    Fader(fader::Fader),
    Dualslewb(dualslew::Dualslewb),
    Feedback(feedback::Feedback),
    Yin(windowed::Yin),
    Trig(windowed::Trig),
    Chorddetect(windowed::Chorddetect),
    Blend(blend::Blend),
}

/// One node in the graph: bookkeeping common to every kind plus its
/// category-specific state.
#[derive(Debug)]
pub struct Ugen {
    pub id: UgenId,
    pub rate: Rate,
    pub chans: usize,
    pub flags: UgenFlags,
    pub refcount: u32,
    /// Last block this ugen was pulled for; `run` is a no-op if called
    /// again with the same block number (invariant 4: memoized pull).
    pub current_block: u64,
    /// Nonzero if this ugen should emit action replies (`End`/`Rem`/`Term`).
    pub action_id: i32,
    pub reply_addr: Option<String>,
    pub out_samps: Vec<f32>,
    pub kind: UgenKind,
}

impl Ugen {
    pub fn new(id: UgenId, rate: Rate, chans: usize, kind: UgenKind) -> Self {
        let len = match rate {
            Rate::Audio => chans * BL,
            Rate::Block | Rate::Constant => chans,
            Rate::None => 0,
        };
        Self {
            id,
            rate,
            chans,
            flags: UgenFlags::new(),
            refcount: 0,
            current_block: 0,
            action_id: 0,
            reply_addr: None,
            out_samps: vec![0.0; len],
            kind,
        }
    }

    /// Run this ugen's body for the current block, if it hasn't already run
    /// for `block`. `ctx` is the registry view used to pull dependencies.
    pub fn real_run(&mut self, block: u64, ctx: &mut dyn GraphCtx) {
        if self.current_block == block {
            return;
        }
        self.current_block = block;
        if self.flags.is_terminated() {
            return;
        }

        let Ugen {
            id,
            chans,
            flags,
            action_id,
            reply_addr,
            out_samps,
            kind,
            ..
        } = self;
        let reply_addr_ref = reply_addr.as_deref();

        match kind {
            UgenKind::Const => {}
            UgenKind::Sum(s) => sum::run(
                out_samps,
                *chans,
                *id,
                *action_id,
                flags,
                s,
                ctx,
                block,
                reply_addr_ref,
            ),
            UgenKind::Sumb(s) => sum::run_b(
                out_samps,
                *chans,
                *id,
                *action_id,
                flags,
                s,
                ctx,
                block,
                reply_addr_ref,
            ),
            UgenKind::Add(a) => sum::run_add(out_samps, *chans, a, ctx, block),
            UgenKind::Addb(a) => sum::run_addb(out_samps, *chans, a, ctx, block),
            UgenKind::Route(r) => route::run(out_samps, r, ctx, block),
            UgenKind::Stdistr(s) => stdistr::run(out_samps, s, ctx, block),
            UgenKind::Upsample(u) => rateconv::run(out_samps, u, ctx, block),
            UgenKind::Dnsampleb(d) => {
                let terminated = rateconv::run_dnsampleb(out_samps, d, flags.can_terminate(), ctx, block);
                if terminated {
                    flags.terminate();
                }
            }
            UgenKind::Smooth(s) => smooth::run(out_samps, s),
            UgenKind::Smoothb(s) => smooth::run_b(out_samps, s),
            UgenKind::Pwl(e) => {
                let (ended, terminated) = envelope::run(out_samps, e, flags.can_terminate());
                if terminated {
                    flags.terminate();
                }
                if ended {
                    if let (Some(addr), Some(code)) = (reply_addr_ref, envelope::end_action(*action_id)) {
                        ctx.reply(
                            addr,
                            crate::ctx::ReplyPayload::Action {
                                code,
                                id: *id,
                                extra: vec![],
                            },
                        );
                    }
                }
            }
            UgenKind::Pwlb(e) => {
                let (v, ended) = envelope::run_b(e);
                out_samps[0] = v;
                if ended {
                    if let (Some(addr), Some(code)) = (reply_addr_ref, envelope::end_action(*action_id)) {
                        ctx.reply(
                            addr,
                            crate::ctx::ReplyPayload::Action {
                                code,
                                id: *id,
                                extra: vec![],
                            },
                        );
                    }
                }
            }
            UgenKind::Pwe(e) => {
                let (ended, terminated) = envelope::run_pwe(out_samps, e, flags.can_terminate());
                if terminated {
                    flags.terminate();
                }
                if ended {
                    if let (Some(addr), Some(code)) = (reply_addr_ref, envelope::end_action(*action_id)) {
                        ctx.reply(
                            addr,
                            crate::ctx::ReplyPayload::Action {
                                code,
                                id: *id,
                                extra: vec![],
                            },
                        );
                    }
                }
            }
            UgenKind::Pweb(e) => {
                let (v, ended) = envelope::run_pweb(e);
                out_samps[0] = v;
                if ended {
                    if let (Some(addr), Some(code)) = (reply_addr_ref, envelope::end_action(*action_id)) {
                        ctx.reply(
                            addr,
                            crate::ctx::ReplyPayload::Action {
                                code,
                                id: *id,
                                extra: vec![],
                            },
                        );
                    }
                }
            }
            UgenKind::Fader(f) => {
                let terminated = fader::run(
                    out_samps,
                    *id,
                    *action_id,
                    f,
                    flags.can_terminate(),
                    ctx,
                    block,
                    reply_addr_ref,
                );
                if terminated {
                    flags.terminate();
                }
            }
            UgenKind::Dualslewb(d) => dualslew::run(out_samps, d, ctx, block),
            UgenKind::Feedback(f) => feedback::run(out_samps, f, ctx, block),
            UgenKind::Yin(y) => windowed::run(y, ctx, block),
            UgenKind::Trig(t) => windowed::run_trig(t, ctx, block),
            UgenKind::Chorddetect(c) => windowed::run_chorddetect(c, ctx, block),
            UgenKind::Blend(b) => {
                let terminated = blend::run(
                    out_samps,
                    *id,
                    *action_id,
                    b,
                    flags.can_terminate(),
                    ctx,
                    block,
                    reply_addr_ref,
                );
                if terminated {
                    flags.terminate();
                }
            }
        }
    }
}

impl Ugen {
    /// The ugen ids this node directly holds a strong reference to (its own
    /// inputs), ignoring [`crate::ctx::ZERO_ID`]/[`crate::ctx::ZEROB_ID`]
    /// which are never refcounted. Used by the registry's iterative teardown
    /// walk (invariant 3) to find what to `unref` when a node is destroyed.
    pub fn held_inputs(&self) -> Vec<UgenId> {
        match &self.kind {
            UgenKind::Const => vec![],
            UgenKind::Sum(s) => s.inputs.clone(),
            UgenKind::Sumb(s) => s.inputs.clone(),
            UgenKind::Add(a) => a.inputs.clone(),
            UgenKind::Addb(a) => a.inputs.clone(),
            UgenKind::Route(r) => r.sources.iter().flatten().map(|s| s.id).collect(),
            UgenKind::Stdistr(s) => s.inputs.iter().filter_map(|i| *i).collect(),
            UgenKind::Upsample(u) => vec![u.input],
            UgenKind::Dnsampleb(d) => vec![d.input],
            UgenKind::Smooth(_) | UgenKind::Smoothb(_) => vec![],
            UgenKind::Pwl(_) | UgenKind::Pwlb(_) | UgenKind::Pwe(_) | UgenKind::Pweb(_) => vec![],
            UgenKind::Fader(f) => vec![f.input],
            UgenKind::Dualslewb(d) => vec![d.input],
            UgenKind::Feedback(f) => vec![f.input, f.from, f.gain],
            UgenKind::Yin(y) => vec![y.input],
            UgenKind::Trig(t) => vec![t.input],
            UgenKind::Chorddetect(c) => c.input.into_iter().collect(),
            UgenKind::Blend(b) => vec![b.x1, b.x2, b.b],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGraph;

    #[test]
    fn pull_is_memoized_per_block() {
        let mut g = FakeGraph::new();
        let mut u = Ugen::new(1, Rate::Audio, 1, UgenKind::Sum(sum::Sum::new(false, 44100)));
        u.real_run(1, &mut g);
        u.out_samps[0] = 42.0;
        u.real_run(1, &mut g); // same block: should not reset out_samps
        assert_eq!(u.out_samps[0], 42.0);
        u.real_run(2, &mut g);
        assert_eq!(u.out_samps[0], 0.0);
    }
}
