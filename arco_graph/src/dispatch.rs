//! Address-string dispatcher: routes a decoded [`Message`] to the ugen
//! constructor or mutator it names, type-checking every argument against
//! the handler's declared signature before touching the registry
//! (`SPEC_FULL.md` §9 resolution #4).
//!
//! Grounded in `SPEC_FULL.md` §6's address table, reconciled against the
//! actual constructor signatures already implemented in `arco_core::ugens`
//! where the table's abbreviated type-letter notation under- or
//! over-specifies a handler's real argument list (noted per-handler below
//! and in `DESIGN.md`); the table enumerates the *existence* of each
//! address and the ugen it targets, not a wire contract (`spec.md` §1
//! excludes wire format from scope).

use arco_core::ugens::blend::{Blend, BlendMode};
use arco_core::ugens::dualslew::Dualslewb;
use arco_core::ugens::envelope::{Pwe, Pweb, Pwl, Pwlb};
use arco_core::ugens::fader::{Fader, FaderMode};
use arco_core::ugens::feedback::Feedback;
use arco_core::ugens::rateconv::{Dnsampleb, DnsamplebMode, Upsample};
use arco_core::ugens::route::Route;
use arco_core::ugens::smooth::{Smooth, Smoothb};
use arco_core::ugens::stdistr::Stdistr;
use arco_core::ugens::sum::{Sum, Sumb};
use arco_core::ugens::windowed::{Chorddetect, Trig, Yin};
use arco_core::{GraphCtx, Rate, UgenId, UgenKind};

use crate::control::Message;
use crate::error::DispatchError;
use crate::registry::Registry;

fn arg_i(msg: &Message, i: usize) -> Result<i32, DispatchError> {
    msg.i(i).ok_or_else(|| DispatchError::ArgTypeMismatch {
        address: msg.address.clone(),
        index: i,
        expected: "int",
    })
}

fn arg_f(msg: &Message, i: usize) -> Result<f32, DispatchError> {
    msg.f(i).ok_or_else(|| DispatchError::ArgTypeMismatch {
        address: msg.address.clone(),
        index: i,
        expected: "float",
    })
}

fn arg_s<'a>(msg: &'a Message, i: usize) -> Result<&'a str, DispatchError> {
    msg.s(i).ok_or_else(|| DispatchError::ArgTypeMismatch {
        address: msg.address.clone(),
        index: i,
        expected: "string",
    })
}

fn require_len(msg: &Message, n: usize) -> Result<(), DispatchError> {
    if msg.args.len() < n {
        return Err(DispatchError::ArgCountMismatch {
            address: msg.address.clone(),
            expected: n,
            got: msg.args.len(),
        });
    }
    Ok(())
}

fn wrong_kind<T>(id: UgenId, expected: &'static str) -> Result<T, DispatchError> {
    Err(DispatchError::WrongUgenKind { id, expected })
}

/// Route one decoded message to its handler. Errors are never fatal to the
/// engine: the caller (the per-block control drain in `runner.rs`) logs
/// `Err` and moves to the next message, per `spec.md` §7.
pub fn dispatch(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    match msg.address.as_str() {
        "/arco/sum/new" => sum_new(reg, msg),
        "/arco/sum/ins" => sum_ins(reg, msg),
        "/arco/sum/rem" => sum_rem(reg, msg),
        "/arco/sum/swap" => sum_swap(reg, msg),
        "/arco/sum/reply" => set_reply_addr(reg, msg),
        "/arco/sumb/new" => sumb_new(reg, msg),
        "/arco/sumb/ins" => sumb_ins(reg, msg),
        "/arco/sumb/rem" => sumb_rem(reg, msg),
        "/arco/sumb/swap" => sumb_swap(reg, msg),
        "/arco/sumb/reply" => set_reply_addr(reg, msg),
        "/arco/route/new" => route_new(reg, msg),
        "/arco/route/ins" => route_ins(reg, msg),
        "/arco/route/rem" => route_rem(reg, msg),
        "/arco/route/rem_all_from" => route_rem_all_from(reg, msg),
        "/arco/stdistr/new" => stdistr_new(reg, msg),
        "/arco/stdistr/set_input" => stdistr_set_input(reg, msg),
        "/arco/stdistr/set_width" => stdistr_set_width(reg, msg),
        "/arco/stdistr/set_gain" => stdistr_set_gain(reg, msg),
        "/arco/upsample/new" => upsample_new(reg, msg),
        "/arco/upsample/repl_input" => upsample_repl_input(reg, msg),
        "/arco/dnsampleb/new" => dnsampleb_new(reg, msg),
        "/arco/dnsampleb/repl_input" => dnsampleb_repl_input(reg, msg),
        "/arco/smooth/new" => smooth_new(reg, msg),
        "/arco/smoothb/new" => smoothb_new(reg, msg),
        "/arco/smooth/set" => smooth_set(reg, msg),
        "/arco/smoothb/set" => smoothb_set(reg, msg),
        "/arco/smooth/cutoff" => smooth_cutoff(reg, msg),
        "/arco/smoothb/cutoff" => smoothb_cutoff(reg, msg),
        "/arco/pwl/new" => pwl_new(reg, msg),
        "/arco/pwlb/new" => pwlb_new(reg, msg),
        "/arco/pwl/env" => pwl_env(reg, msg),
        "/arco/pwlb/env" => pwlb_env(reg, msg),
        "/arco/pwl/start" => pwl_start(reg, msg),
        "/arco/pwlb/start" => pwlb_start(reg, msg),
        "/arco/pwl/decay" => pwl_decay(reg, msg),
        "/arco/pwlb/decay" => pwlb_decay(reg, msg),
        "/arco/pwl/act" => set_action_id(reg, msg),
        "/arco/pwlb/act" => set_action_id(reg, msg),
        "/arco/pwl/reply" => set_reply_addr(reg, msg),
        "/arco/pwlb/reply" => set_reply_addr(reg, msg),
        "/arco/pwe/new" => pwe_new(reg, msg),
        "/arco/pweb/new" => pweb_new(reg, msg),
        "/arco/pwe/env" => pwe_env(reg, msg),
        "/arco/pweb/env" => pweb_env(reg, msg),
        "/arco/pwe/start" => pwe_start(reg, msg),
        "/arco/pweb/start" => pweb_start(reg, msg),
        "/arco/pwe/decay" => pwe_decay(reg, msg),
        "/arco/pwe/act" => set_action_id(reg, msg),
        "/arco/pweb/act" => set_action_id(reg, msg),
        "/arco/pwe/reply" => set_reply_addr(reg, msg),
        "/arco/pweb/reply" => set_reply_addr(reg, msg),
        "/arco/fader/new" => fader_new(reg, msg),
        "/arco/fader/set" => fader_set(reg, msg),
        "/arco/fader/act" => set_action_id(reg, msg),
        "/arco/fader/reply" => set_reply_addr(reg, msg),
        "/arco/fader/repl_input" => fader_repl_input(reg, msg),
        "/arco/dualslewb/new" => dualslewb_new(reg, msg),
        "/arco/dualslewb/set_current" => dualslewb_set_current(reg, msg),
        "/arco/dualslewb/repl_input" => dualslewb_repl_input(reg, msg),
        "/arco/feedback/new" => feedback_new(reg, msg),
        "/arco/feedback/repl_input" => feedback_repl_input(reg, msg),
        "/arco/feedback/repl_from" => feedback_repl_from(reg, msg),
        "/arco/feedback/repl_gain" => feedback_repl_gain(reg, msg),
        "/arco/yin/new" => yin_new(reg, msg),
        "/arco/yin/reply" => yin_reply(reg, msg),
        "/arco/yin/repl_input" => yin_repl_input(reg, msg),
        "/arco/trig/new" => trig_new(reg, msg),
        "/arco/trig/onoff" => trig_onoff(reg, msg),
        "/arco/trig/reply" => trig_reply(reg, msg),
        "/arco/trig/repl_input" => trig_repl_input(reg, msg),
        "/arco/chorddetect/new" => chorddetect_new(reg, msg),
        "/arco/chorddetect/reply" => chorddetect_reply(reg, msg),
        "/arco/chorddetect/repl_input" => chorddetect_repl_input(reg, msg),
        "/arco/blend/new" => blend_new(reg, msg),
        "/arco/blend/repl_x1" => blend_repl_x1(reg, msg),
        "/arco/blend/repl_x2" => blend_repl_x2(reg, msg),
        "/arco/blend/repl_b" => blend_repl_b(reg, msg),
        "/arco/blend/gain" => blend_gain(reg, msg),
        "/arco/blend/mode" => blend_mode(reg, msg),
        "/arco/blend/reply" => set_reply_addr(reg, msg),
        other => {
            if other.starts_with("/arco/") && other.ends_with("/free") {
                require_len(msg, 1)?;
                let id = arg_i(msg, 0)?;
                reg.free(id);
                Ok(())
            } else {
                Err(DispatchError::UnknownAddress(other.to_string()))
            }
        }
    }
}

fn sum_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 3)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    let wrap = arg_i(msg, 2)? != 0;
    reg.insert(id, Rate::Audio, chans, UgenKind::Sum(Sum::new(wrap, reg.sample_rate())))
}

fn sum_ins(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Sum(s) => {
            s.ins(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "sum"),
    })?
}

fn sum_rem(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Sum(s) => {
            s.rem(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "sum"),
    })?
}

fn sum_swap(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 3)?;
    let id = arg_i(msg, 0)?;
    let old = arg_i(msg, 1)?;
    let new = arg_i(msg, 2)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Sum(s) => {
            s.swap(old, new, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "sum"),
    })?
}

fn sumb_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    reg.insert(id, Rate::Block, chans, UgenKind::Sumb(Sumb::new()))
}

fn sumb_ins(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Sumb(s) => {
            s.ins(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "sumb"),
    })?
}

fn sumb_rem(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Sumb(s) => {
            s.rem(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "sumb"),
    })?
}

fn sumb_swap(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 3)?;
    let id = arg_i(msg, 0)?;
    let old = arg_i(msg, 1)?;
    let new = arg_i(msg, 2)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Sumb(s) => {
            s.swap(old, new, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "sumb"),
    })?
}

fn route_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    reg.insert(id, Rate::Audio, chans, UgenKind::Route(Route::new(chans)))
}

/// `spec.md`'s `(id, src, in_ch, out_ch)` naming maps onto
/// [`Route::ins`]'s `(out_chan, id, src_chan)` as `(out_ch, src, in_ch)`.
fn route_ins(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 4)?;
    let id = arg_i(msg, 0)?;
    let src = arg_i(msg, 1)?;
    let in_ch = arg_i(msg, 2)? as usize;
    let out_ch = arg_i(msg, 3)? as usize;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Route(r) => {
            r.ins(out_ch, src, in_ch, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "route"),
    })?
}

fn route_rem(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 4)?;
    let id = arg_i(msg, 0)?;
    let src = arg_i(msg, 1)?;
    let in_ch = arg_i(msg, 2)? as usize;
    let out_ch = arg_i(msg, 3)? as usize;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Route(r) => {
            r.rem(out_ch, src, in_ch, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "route"),
    })?
}

fn route_rem_all_from(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let src = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Route(r) => {
            r.rem_all_from(src, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "route"),
    })?
}

fn stdistr_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 3)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    let nsrc = arg_i(msg, 2)? as usize;
    reg.insert(
        id,
        Rate::Audio,
        chans,
        UgenKind::Stdistr(Stdistr::new(nsrc, 1.0, reg.sample_rate())),
    )
}

fn stdistr_set_input(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 3)?;
    let id = arg_i(msg, 0)?;
    let slot = arg_i(msg, 1)? as usize;
    let input = arg_i(msg, 2)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Stdistr(s) => {
            s.ins(slot, input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "stdistr"),
    })?
}

fn stdistr_set_width(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let width = arg_f(msg, 1)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Stdistr(s) => {
            s.set_width(width);
            Ok(())
        }
        _ => wrong_kind(id, "stdistr"),
    }
}

fn stdistr_set_gain(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let gain = arg_f(msg, 1)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Stdistr(s) => {
            s.set_gain(gain);
            Ok(())
        }
        _ => wrong_kind(id, "stdistr"),
    }
}

fn upsample_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    let chans = reg.chans_of(input).max(1);
    reg.ref_up(input);
    reg.insert(id, Rate::Audio, chans, UgenKind::Upsample(Upsample::new(input, chans)))
}

fn upsample_repl_input(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Upsample(u) => {
            u.repl_input(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "upsample"),
    })?
}

fn dnsampleb_mode_from_str(s: &str) -> Option<DnsamplebMode> {
    Some(match s {
        "basic" => DnsamplebMode::Basic,
        "avg" => DnsamplebMode::Avg,
        "peak" => DnsamplebMode::Peak,
        "rms" => DnsamplebMode::Rms,
        "power" => DnsamplebMode::Power,
        "lowpass500" => DnsamplebMode::Lowpass500,
        "lowpass100" => DnsamplebMode::Lowpass100,
        _ => return None,
    })
}

fn dnsampleb_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 4)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    let input = arg_i(msg, 2)?;
    let mode_str = arg_s(msg, 3)?;
    let mode = dnsampleb_mode_from_str(mode_str).ok_or(DispatchError::ArgTypeMismatch {
        address: msg.address.clone(),
        index: 3,
        expected: "dnsampleb mode name",
    })?;
    reg.ref_up(input);
    reg.insert(
        id,
        Rate::Block,
        chans,
        UgenKind::Dnsampleb(Dnsampleb::new(input, chans, mode, reg.sample_rate())),
    )
}

fn dnsampleb_repl_input(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Dnsampleb(d) => {
            d.repl_input(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "dnsampleb"),
    })?
}

fn smooth_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 4)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    let current = arg_f(msg, 2)?;
    let cutoff = arg_f(msg, 3)?;
    let mut s = Smooth::new(chans, cutoff, reg.sample_rate());
    for ch in 0..chans {
        s.set_value(ch, current);
    }
    reg.insert(id, Rate::Audio, chans, UgenKind::Smooth(s))
}

fn smoothb_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 4)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    let current = arg_f(msg, 2)?;
    let cutoff = arg_f(msg, 3)?;
    let mut s = Smoothb::new(chans, cutoff, reg.sample_rate());
    for ch in 0..chans {
        s.set_value(ch, current);
    }
    reg.insert(id, Rate::Block, chans, UgenKind::Smoothb(s))
}

fn smooth_set(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 3)?;
    let id = arg_i(msg, 0)?;
    let chan = arg_i(msg, 1)? as usize;
    let value = arg_f(msg, 2)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Smooth(s) => {
            s.set_value(chan, value);
            Ok(())
        }
        _ => wrong_kind(id, "smooth"),
    }
}

fn smoothb_set(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 3)?;
    let id = arg_i(msg, 0)?;
    let chan = arg_i(msg, 1)? as usize;
    let value = arg_f(msg, 2)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Smoothb(s) => {
            s.set_value(chan, value);
            Ok(())
        }
        _ => wrong_kind(id, "smoothb"),
    }
}

fn smooth_cutoff(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let hz = arg_f(msg, 1)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Smooth(s) => {
            s.set_cutoff(hz);
            Ok(())
        }
        _ => wrong_kind(id, "smooth"),
    }
}

fn smoothb_cutoff(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let hz = arg_f(msg, 1)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Smoothb(s) => {
            s.set_cutoff(hz);
            Ok(())
        }
        _ => wrong_kind(id, "smoothb"),
    }
}

/// `spec.md`'s `ii` for `pwl(b)/new` is `(id, chans)`; the envelope itself
/// only ever fills the first `BL`/1 samples of its output (it has no notion
/// of multiple independent channels), so `chans` beyond 1 is accepted for
/// symmetry with every other `new` address but does not multiply the
/// envelope's state.
fn pwl_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)?.max(1) as usize;
    reg.insert(id, Rate::Audio, chans, UgenKind::Pwl(Pwl::new()))
}

fn pwlb_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    reg.insert(id, Rate::Block, 1, UgenKind::Pwlb(Pwlb::new()))
}

fn pwl_env(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 1)?;
    let id = arg_i(msg, 0)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    let UgenKind::Pwl(e) = &mut ugen.kind else {
        return wrong_kind(id, "pwl");
    };
    for i in 1..msg.args.len() {
        e.point(arg_f(msg, i)?)?;
    }
    Ok(())
}

fn pwlb_env(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 1)?;
    let id = arg_i(msg, 0)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    let UgenKind::Pwlb(e) = &mut ugen.kind else {
        return wrong_kind(id, "pwlb");
    };
    for i in 1..msg.args.len() {
        e.point(arg_f(msg, i)?)?;
    }
    Ok(())
}

fn pwl_start(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 1)?;
    let id = arg_i(msg, 0)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Pwl(e) => {
            e.start();
            Ok(())
        }
        _ => wrong_kind(id, "pwl"),
    }
}

fn pwlb_start(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 1)?;
    let id = arg_i(msg, 0)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Pwlb(e) => {
            e.start();
            Ok(())
        }
        _ => wrong_kind(id, "pwlb"),
    }
}

fn pwl_decay(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let d = arg_f(msg, 1)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Pwl(e) => Ok(e.decay(d)?),
        _ => wrong_kind(id, "pwl"),
    }
}

fn pwlb_decay(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let d = arg_f(msg, 1)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Pwlb(e) => Ok(e.decay(d)?),
        _ => wrong_kind(id, "pwlb"),
    }
}

/// Shared by every `.../act` address: sets the owning [`arco_core::Ugen`]'s
/// `action_id`, not any per-kind state.
fn set_action_id(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let action_id = arg_i(msg, 1)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    ugen.action_id = action_id;
    Ok(())
}

/// Sets the generic `Ugen::reply_addr` field shared by every kind that can
/// emit an action reply (`Sum`/`Sumb`/`Pwl`/`Pwlb`/`Pwe`/`Pweb`/`Fader`/
/// `Blend`, per `ugen.rs`'s `real_run` match). Unlike `action_id`, this field lives on
/// the outer `Ugen`, not on any per-kind state, so one handler covers all
/// of them rather than one per kind (as `yin`/`trig`/`chorddetect`'s
/// `/reply` addresses need, since those set a field private to their own
/// struct instead).
fn set_reply_addr(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let addr = arg_s(msg, 1)?.to_string();
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    ugen.reply_addr = Some(addr);
    Ok(())
}

fn pwe_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 3)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)?.max(1) as usize;
    let linear_attack = arg_i(msg, 2)? != 0;
    let mut e = Pwe::new();
    e.linatk(linear_attack);
    reg.insert(id, Rate::Audio, chans, UgenKind::Pwe(e))
}

fn pweb_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 3)?;
    let id = arg_i(msg, 0)?;
    let linear_attack = arg_i(msg, 2)? != 0;
    let mut e = Pweb::new();
    e.linatk(linear_attack);
    reg.insert(id, Rate::Block, 1, UgenKind::Pweb(e))
}

fn pwe_env(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 1)?;
    let id = arg_i(msg, 0)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    let UgenKind::Pwe(e) = &mut ugen.kind else {
        return wrong_kind(id, "pwe");
    };
    for i in 1..msg.args.len() {
        e.point(arg_f(msg, i)?)?;
    }
    Ok(())
}

fn pweb_env(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 1)?;
    let id = arg_i(msg, 0)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    let UgenKind::Pweb(e) = &mut ugen.kind else {
        return wrong_kind(id, "pweb");
    };
    for i in 1..msg.args.len() {
        e.point(arg_f(msg, i)?)?;
    }
    Ok(())
}

fn pwe_start(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 1)?;
    let id = arg_i(msg, 0)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Pwe(e) => {
            e.start();
            Ok(())
        }
        _ => wrong_kind(id, "pwe"),
    }
}

fn pweb_start(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 1)?;
    let id = arg_i(msg, 0)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Pweb(e) => {
            e.start();
            Ok(())
        }
        _ => wrong_kind(id, "pweb"),
    }
}

fn pwe_decay(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let d = arg_f(msg, 1)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Pwe(e) => Ok(e.decay(d)?),
        _ => wrong_kind(id, "pwe"),
    }
}

fn fader_mode_from_str(s: &str) -> Option<FaderMode> {
    Some(match s {
        "linear" => FaderMode::Linear,
        "exponential" => FaderMode::Exponential,
        "lowpass" => FaderMode::Lowpass,
        "smooth" => FaderMode::Smooth,
        _ => return None,
    })
}

/// `spec.md`'s `iisf` for `fader/new` is internally inconsistent (a string
/// and a float where the description names only `(id, chans, input, mode)`,
/// four values); reconciled here as `iiis` — `(id, chans, input, mode-name)`
/// — matching the sibling `dnsampleb/new` address and [`Fader::new`]'s
/// actual parameters.
fn fader_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 4)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    let input = arg_i(msg, 2)?;
    let mode = fader_mode_from_str(arg_s(msg, 3)?).ok_or(DispatchError::ArgTypeMismatch {
        address: msg.address.clone(),
        index: 3,
        expected: "fader mode name",
    })?;
    reg.ref_up(input);
    reg.insert(
        id,
        Rate::Audio,
        chans,
        UgenKind::Fader(Fader::new(input, chans, 0.0, mode, reg.sample_rate())),
    )
}

fn fader_set(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 4)?;
    let id = arg_i(msg, 0)?;
    let chan = arg_i(msg, 1)? as usize;
    let goal = arg_f(msg, 2)?;
    let dur = arg_f(msg, 3)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Fader(f) => {
            f.set_dur(dur);
            f.set_goal(chan, goal);
            Ok(())
        }
        _ => wrong_kind(id, "fader"),
    }
}

fn fader_repl_input(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Fader(f) => {
            f.repl_input(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "fader"),
    })?
}

fn dualslewb_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 7)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    let input = arg_i(msg, 2)?;
    let attack = arg_f(msg, 3)?;
    let release = arg_f(msg, 4)?;
    let attack_linear = arg_i(msg, 5)? != 0;
    let release_linear = arg_i(msg, 6)? != 0;
    reg.ref_up(input);
    reg.insert(
        id,
        Rate::Block,
        chans,
        UgenKind::Dualslewb(Dualslewb::new(
            input,
            chans,
            attack,
            release,
            0.0,
            attack_linear,
            release_linear,
            reg.sample_rate(),
        )),
    )
}

fn dualslewb_set_current(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 3)?;
    let id = arg_i(msg, 0)?;
    let chan = arg_i(msg, 1)? as usize;
    let value = arg_f(msg, 2)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Dualslewb(d) => {
            d.set_current(chan, value);
            Ok(())
        }
        _ => wrong_kind(id, "dualslewb"),
    }
}

fn dualslewb_repl_input(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Dualslewb(d) => {
            d.repl_input(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "dualslewb"),
    })?
}

fn feedback_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 5)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    let input = arg_i(msg, 2)?;
    let from = arg_i(msg, 3)?;
    let gain = arg_i(msg, 4)?;
    reg.ref_up(input);
    reg.ref_up(from);
    reg.ref_up(gain);
    reg.insert(id, Rate::Audio, chans, UgenKind::Feedback(Feedback::new(input, from, gain, chans)))
}

fn feedback_repl_input(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Feedback(f) => {
            f.repl_input(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "feedback"),
    })?
}

fn feedback_repl_from(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let from = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Feedback(f) => {
            f.repl_from(from, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "feedback"),
    })?
}

fn feedback_repl_gain(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let gain = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Feedback(f) => {
            f.repl_gain(gain, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "feedback"),
    })?
}

/// `spec.md`'s `iiiff` for `yin/new` is reconciled against
/// [`Yin::new`]'s actual parameters: `(id, input, chans, minstep, maxstep,
/// hopsize)`. The reply address is set separately via `/arco/yin/reply`
/// (an empty address disables replies until set).
fn yin_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 6)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    let chans = arg_i(msg, 2)? as usize;
    let minstep = arg_i(msg, 3)?;
    let maxstep = arg_i(msg, 4)?;
    let hopsize = arg_i(msg, 5)? as usize;
    reg.ref_up(input);
    reg.insert(
        id,
        Rate::None,
        chans,
        UgenKind::Yin(Yin::new(input, chans, minstep, maxstep, hopsize, reg.sample_rate(), String::new())),
    )
}

fn yin_reply(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let addr = arg_s(msg, 1)?.to_string();
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Yin(y) => {
            y.set_reply_addr(addr);
            Ok(())
        }
        _ => wrong_kind(id, "yin"),
    }
}

fn yin_repl_input(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Yin(y) => {
            y.repl_input(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "yin"),
    })?
}

fn trig_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 5)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    let window_size = arg_i(msg, 2)? as usize;
    let threshold = arg_f(msg, 3)?;
    let pause_secs = arg_f(msg, 4)?;
    reg.ref_up(input);
    reg.insert(
        id,
        Rate::None,
        0,
        UgenKind::Trig(Trig::new(input, String::new(), window_size, threshold, pause_secs, reg.sample_rate())),
    )
}

fn trig_onoff(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 4)?;
    let id = arg_i(msg, 0)?;
    let addr = arg_s(msg, 1)?.to_string();
    let threshold = arg_f(msg, 2)?;
    let runlen_secs = arg_f(msg, 3)?;
    let sample_rate = reg.sample_rate();
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Trig(t) => {
            t.onoff(&addr, threshold, runlen_secs, sample_rate);
            Ok(())
        }
        _ => wrong_kind(id, "trig"),
    }
}

fn trig_reply(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let addr = arg_s(msg, 1)?.to_string();
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Trig(t) => {
            t.set_reply_addr(addr);
            Ok(())
        }
        _ => wrong_kind(id, "trig"),
    }
}

fn trig_repl_input(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Trig(t) => {
            t.repl_input(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "trig"),
    })?
}

fn chorddetect_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let frame_size = arg_i(msg, 1)? as usize;
    reg.insert(
        id,
        Rate::None,
        0,
        UgenKind::Chorddetect(Chorddetect::new(frame_size, reg.sample_rate(), String::new())),
    )
}

fn chorddetect_reply(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let addr = arg_s(msg, 1)?.to_string();
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Chorddetect(c) => {
            c.set_reply_addr(addr);
            Ok(())
        }
        _ => wrong_kind(id, "chorddetect"),
    }
}

fn chorddetect_repl_input(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let input = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Chorddetect(c) => {
            c.repl_input(input, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "chorddetect"),
    })?
}

fn blend_mode_from_str(s: &str) -> Option<BlendMode> {
    Some(match s {
        "linear" => BlendMode::Linear,
        "power" => BlendMode::Power,
        "p45" => BlendMode::P45,
        _ => return None,
    })
}

fn blend_new(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 6)?;
    let id = arg_i(msg, 0)?;
    let chans = arg_i(msg, 1)? as usize;
    let x1 = arg_i(msg, 2)?;
    let x2 = arg_i(msg, 3)?;
    let b = arg_i(msg, 4)?;
    let mode = blend_mode_from_str(arg_s(msg, 5)?).ok_or(DispatchError::ArgTypeMismatch {
        address: msg.address.clone(),
        index: 5,
        expected: "blend mode name",
    })?;
    let x1 = reg.init_param(x1, Rate::Audio);
    let x2 = reg.init_param(x2, Rate::Audio);
    let b = reg.init_param(b, Rate::Block);
    reg.insert(id, Rate::Audio, chans, UgenKind::Blend(Blend::new(x1, x2, b, chans, 0.0, mode)))
}

fn blend_repl_x1(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let x1 = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Blend(b) => {
            b.repl_x1(x1, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "blend"),
    })?
}

fn blend_repl_x2(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let x2 = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Blend(b) => {
            b.repl_x2(x2, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "blend"),
    })?
}

fn blend_repl_b(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let b_id = arg_i(msg, 1)?;
    reg.with_ugen_mut(id, |kind, ctx| match kind {
        UgenKind::Blend(b) => {
            b.repl_b(b_id, ctx);
            Ok(())
        }
        _ => wrong_kind(id, "blend"),
    })?
}

fn blend_gain(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let gain = arg_f(msg, 1)?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Blend(b) => {
            b.gain = gain;
            Ok(())
        }
        _ => wrong_kind(id, "blend"),
    }
}

fn blend_mode(reg: &mut Registry, msg: &Message) -> Result<(), DispatchError> {
    require_len(msg, 2)?;
    let id = arg_i(msg, 0)?;
    let mode = blend_mode_from_str(arg_s(msg, 1)?).ok_or(DispatchError::ArgTypeMismatch {
        address: msg.address.clone(),
        index: 1,
        expected: "blend mode name",
    })?;
    let ugen = reg.get_mut(id).ok_or(DispatchError::UnknownUgenId(id))?;
    match &mut ugen.kind {
        UgenKind::Blend(b) => {
            b.set_mode(mode);
            Ok(())
        }
        _ => wrong_kind(id, "blend"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Arg;
    use arco_core::{ArLogSender, ZEROB_ID, ZERO_ID};

    fn test_registry() -> Registry {
        let config = crate::registry::EngineConfig::default();
        let (reply_tx, _reply_rx) = crate::control::reply_queue(config.reply_queue_capacity);
        Registry::new(&config, ArLogSender::non_rt(), reply_tx)
    }

    #[test]
    fn sum_new_then_ins_wires_input() {
        let mut reg = test_registry();
        dispatch(&mut reg, &Message::new("/arco/sum/new", vec![Arg::I(10), Arg::I(1), Arg::I(0)])).unwrap();
        dispatch(&mut reg, &Message::new("/arco/sum/ins", vec![Arg::I(10), Arg::I(ZERO_ID)])).unwrap();
        let UgenKind::Sum(s) = &reg.get(10).unwrap().kind else {
            panic!()
        };
        assert_eq!(s.inputs, vec![ZERO_ID]);
    }

    #[test]
    fn unknown_address_is_reported() {
        let mut reg = test_registry();
        let err = dispatch(&mut reg, &Message::new("/arco/nonexistent/thing", vec![])).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownAddress(_)));
    }

    #[test]
    fn wrong_kind_is_reported() {
        let mut reg = test_registry();
        dispatch(&mut reg, &Message::new("/arco/sumb/new", vec![Arg::I(11), Arg::I(1)])).unwrap();
        let err = dispatch(&mut reg, &Message::new("/arco/sum/ins", vec![Arg::I(11), Arg::I(ZERO_ID)])).unwrap_err();
        assert!(matches!(err, DispatchError::WrongUgenKind { .. }));
    }

    #[test]
    fn generic_free_destroys_any_kind() {
        let mut reg = test_registry();
        dispatch(&mut reg, &Message::new("/arco/sum/new", vec![Arg::I(12), Arg::I(1), Arg::I(0)])).unwrap();
        dispatch(&mut reg, &Message::new("/arco/sum/free", vec![Arg::I(12)])).unwrap();
        assert!(!reg.contains(12));
    }

    #[test]
    fn arg_count_mismatch_is_reported() {
        let mut reg = test_registry();
        let err = dispatch(&mut reg, &Message::new("/arco/sum/new", vec![Arg::I(1)])).unwrap_err();
        assert!(matches!(err, DispatchError::ArgCountMismatch { .. }));
    }

    #[test]
    fn blend_new_wraps_block_rate_b_to_audio_rate_x1() {
        let mut reg = test_registry();
        dispatch(&mut reg, &Message::new("/arco/sumb/new", vec![Arg::I(20), Arg::I(1)])).unwrap();
        dispatch(
            &mut reg,
            &Message::new(
                "/arco/blend/new",
                vec![
                    Arg::I(21),
                    Arg::I(1),
                    Arg::I(ZERO_ID),
                    Arg::I(ZERO_ID),
                    Arg::I(ZEROB_ID),
                    Arg::S("linear".to_string()),
                ],
            ),
        )
        .unwrap();
        assert!(reg.contains(21));
    }
}
