//! `Route`: fan sources into an arbitrary number of output channels, each
//! channel backed by an ordered list of single-channel source pointers.
//!
//! Unlike [`super::sum::Sum`], a channel with no sources reverts to silence
//! rather than terminating; `Route` has no lifecycle of its own beyond its
//! inputs' refcounts.

use crate::ctx::{GraphCtx, UgenId};
use arco_primitives::{zero_n, BL};

/// One source feeding one output channel: `(source ugen, source channel)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteSource {
    pub id: UgenId,
    pub channel: usize,
}

#[derive(Debug, Default)]
pub struct Route {
    /// `sources[out_chan]` is the ordered list of feeds for that channel.
    pub sources: Vec<Vec<RouteSource>>,
}

impl Route {
    pub fn new(out_chans: usize) -> Self {
        Self {
            sources: vec![Vec::new(); out_chans],
        }
    }

    /// Route `(id, src_chan)` into `out_chan`, idempotent on exact duplicates.
    pub fn ins(&mut self, out_chan: usize, id: UgenId, src_chan: usize, ctx: &mut dyn GraphCtx) {
        if out_chan >= self.sources.len() {
            return;
        }
        let entry = RouteSource {
            id,
            channel: src_chan,
        };
        if !self.sources[out_chan].contains(&entry) {
            self.sources[out_chan].push(entry);
            ctx.ref_up(id);
        }
    }

    pub fn rem(&mut self, out_chan: usize, id: UgenId, src_chan: usize, ctx: &mut dyn GraphCtx) {
        if out_chan >= self.sources.len() {
            return;
        }
        let entry = RouteSource {
            id,
            channel: src_chan,
        };
        if let Some(pos) = self.sources[out_chan].iter().position(|&s| s == entry) {
            self.sources[out_chan].remove(pos);
            ctx.unref(id);
        }
    }

    /// Remove every routing entry that feeds from `id`, on any channel.
    pub fn rem_all_from(&mut self, id: UgenId, ctx: &mut dyn GraphCtx) {
        for chan in &mut self.sources {
            let before = chan.len();
            chan.retain(|s| s.id != id);
            for _ in 0..(before - chan.len()) {
                ctx.unref(id);
            }
        }
    }
}

pub fn run(out: &mut [f32], r: &mut Route, ctx: &mut dyn GraphCtx, block: u64) {
    let chans = r.sources.len();
    zero_n(out, chans * BL);
    for (out_chan, feeds) in r.sources.iter().enumerate() {
        for feed in feeds {
            ctx.pull(feed.id, block);
            if feed.channel >= ctx.chans_of(feed.id) {
                continue;
            }
            let src = ctx.out(feed.id);
            let base = feed.channel * BL;
            let dst_base = out_chan * BL;
            for i in 0..BL {
                out[dst_base + i] += src[base + i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGraph;

    #[test]
    fn empty_channel_is_silent() {
        let mut g = FakeGraph::new();
        let mut r = Route::new(2);
        let mut out = vec![1.0f32; 2 * BL];
        run(&mut out, &mut r, &mut g, 1);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn ins_is_idempotent_and_refcounted() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(1.0, 2);
        let mut r = Route::new(1);
        r.ins(0, src, 0, &mut g);
        r.ins(0, src, 0, &mut g);
        assert_eq!(r.sources[0].len(), 1);
        assert_eq!(g.refcount(src), 1);
    }

    #[test]
    fn routes_selected_channel() {
        let mut g = FakeGraph::new();
        let src = g.add_constant(2.0, 2);
        let mut r = Route::new(1);
        r.ins(0, src, 1, &mut g);
        let mut out = vec![0.0f32; BL];
        run(&mut out, &mut r, &mut g, 1);
        assert!(out.iter().all(|&v| (v - 2.0).abs() < 1e-6));
    }
}
