//! The `Registry`: a `HashMap<UgenId, Ugen>` that implements [`GraphCtx`],
//! driving the pull-based evaluation `arco_core`'s ugen bodies call back
//! into.
//!
//! Grounded in `original_source/arco/src/ugen.h`'s `ugen_table` (a flat,
//! id-indexed array of `Ugen*` with a free list) and in `sum.h`'s recursive
//! `ugen_decref` + `remove_source` teardown, reworked here as an iterative
//! work-list (invariant 3: teardown must not blow the stack on deep chains).

use std::collections::HashMap;

use arco_core::ugens::rateconv::{Dnsampleb, DnsamplebMode, Upsample};
use arco_core::{ArLogSender, GraphCtx, Rate, ReplyPayload, Ugen, UgenFlags, UgenId, UgenKind, ZEROB_ID, ZERO_ID};

use crate::control::{Reply, ReplySender};
use crate::error::DispatchError;

/// Immutable-after-construction engine configuration, the `arco` analogue of
/// the teacher's `RunnerOptions` (`knaster_graph::runner::RunnerOptions`).
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub control_queue_capacity: usize,
    pub reply_queue_capacity: usize,
    pub log_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            control_queue_capacity: 1024,
            reply_queue_capacity: 1024,
            log_queue_capacity: 4096,
        }
    }
}

/// The id-keyed ugen table plus the bookkeeping a live graph needs: the
/// id counters (positive for host-visible ugens, negative for rate-adapter
/// ugens allocated internally), the sample rate baked into every
/// rate-dependent constructor, and the outbound reply sender.
pub struct Registry {
    ugens: HashMap<UgenId, Ugen>,
    /// Ugens currently mid-`real_run`, outermost first. A ugen is pushed
    /// here (out of `ugens`) for the duration of its own `real_run` and
    /// popped back into `ugens` once it returns, the same remove/reinsert
    /// shape `GraphCtx::pull` always used — except here the removed entry
    /// stays reachable (see `pull` below), so a `Feedback` node's `from`
    /// reference can point at itself or at a descendant that reads back
    /// into it (`spec.md` §9) without the read finding nothing.
    running: Vec<Box<Ugen>>,
    next_host_id: UgenId,
    next_internal_id: UgenId,
    sample_rate: u32,
    logger: ArLogSender,
    reply_tx: ReplySender,
}

impl Registry {
    /// Build a fresh registry with [`ZERO_ID`]/[`ZEROB_ID`] already installed,
    /// per the requirement that every control message sees them present
    /// (`spec.md` §3).
    pub fn new(config: &EngineConfig, logger: ArLogSender, reply_tx: ReplySender) -> Self {
        let mut reg = Self {
            ugens: HashMap::new(),
            running: Vec::new(),
            next_host_id: 2,
            next_internal_id: -1,
            sample_rate: config.sample_rate,
            logger,
            reply_tx,
        };
        reg.ugens.insert(ZERO_ID, Ugen::new(ZERO_ID, Rate::Audio, 1, UgenKind::Const));
        reg.ugens.insert(ZEROB_ID, Ugen::new(ZEROB_ID, Rate::Block, 1, UgenKind::Const));
        reg
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_permanent(id: UgenId) -> bool {
        id == ZERO_ID || id == ZEROB_ID
    }

    /// Allocate the next host-facing id, skipping any already claimed by an
    /// explicit `new` call that names its own id (`spec.md` §6's `new`
    /// addresses all take an explicit id argument; this is for callers that
    /// want the registry to pick one).
    pub fn alloc_host_id(&mut self) -> UgenId {
        while self.ugens.contains_key(&self.next_host_id) {
            self.next_host_id += 1;
        }
        let id = self.next_host_id;
        self.next_host_id += 1;
        id
    }

    fn alloc_internal_id(&mut self) -> UgenId {
        let id = self.next_internal_id;
        self.next_internal_id -= 1;
        id
    }

    /// Insert a freshly constructed, host-visible ugen at `id` with the
    /// table's own reference already counted (refcount starts at 1; `free`
    /// drops exactly this reference).
    pub fn insert(&mut self, id: UgenId, rate: Rate, chans: usize, kind: UgenKind) -> Result<(), DispatchError> {
        if id < 0 {
            return Err(DispatchError::IdInUse(id));
        }
        if self.ugens.contains_key(&id) {
            return Err(DispatchError::IdInUse(id));
        }
        let mut ugen = Ugen::new(id, rate, chans, kind);
        ugen.refcount = 1;
        self.ugens.insert(id, ugen);
        Ok(())
    }

    fn insert_internal(&mut self, id: UgenId, rate: Rate, chans: usize, kind: UgenKind) {
        self.ugens.insert(id, Ugen::new(id, rate, chans, kind));
    }

    pub fn get(&self, id: UgenId) -> Option<&Ugen> {
        self.ugens.get(&id)
    }

    pub fn get_mut(&mut self, id: UgenId) -> Option<&mut Ugen> {
        self.ugens.get_mut(&id)
    }

    pub fn contains(&self, id: UgenId) -> bool {
        self.ugens.contains_key(&id)
    }

    /// Temporarily remove `id` from the table, call `f` with mutable access
    /// to both its `kind` and the registry itself (as a [`GraphCtx`]), then
    /// reinsert it. The same remove/run/reinsert dance [`GraphCtx::pull`]
    /// uses, needed here for the same reason: a ugen method like
    /// `Sum::ins` takes `&mut dyn GraphCtx`, and that can't alias a `&mut`
    /// borrow of the map entry it lives in.
    pub fn with_ugen_mut<T>(
        &mut self,
        id: UgenId,
        f: impl FnOnce(&mut UgenKind, &mut Registry) -> T,
    ) -> Result<T, DispatchError> {
        let mut ugen = self.ugens.remove(&id).ok_or(DispatchError::UnknownUgenId(id))?;
        let result = f(&mut ugen.kind, self);
        self.ugens.insert(id, ugen);
        Ok(result)
    }

    /// Run `id` for `block` (delegates to [`GraphCtx::pull`]); exposed for
    /// the top-level output pull each block (`spec.md` §4.8 step 3).
    pub fn run(&mut self, id: UgenId, block: u64) {
        self.pull(id, block);
    }

    /// Wire `source` into a slot requiring `required`, inserting an
    /// `Upsample`/`Dnsampleb` adapter if `source`'s actual rate doesn't
    /// match. Returns the id to store in the slot, already holding one
    /// strong reference on behalf of the caller (`spec.md` §4.2, §9).
    pub fn init_param(&mut self, source: UgenId, required: Rate) -> UgenId {
        let actual = self.rate_of(source);
        let resolved = match (required, actual) {
            (Rate::Audio, Rate::Audio) => source,
            (Rate::Audio, _) => {
                let chans = self.chans_of(source).max(1);
                let id = self.alloc_internal_id();
                self.ref_up(source);
                let kind = UgenKind::Upsample(Upsample::new(source, chans));
                self.insert_internal(id, Rate::Audio, chans, kind);
                id
            }
            (Rate::Block, Rate::Audio) | (Rate::Constant, Rate::Audio) => {
                let chans = self.chans_of(source).max(1);
                let id = self.alloc_internal_id();
                self.ref_up(source);
                let kind = UgenKind::Dnsampleb(Dnsampleb::new(source, chans, DnsamplebMode::Lowpass500, self.sample_rate));
                self.insert_internal(id, Rate::Block, chans, kind);
                id
            }
            _ => source,
        };
        self.ref_up(resolved);
        resolved
    }

    /// Destroy `root` and iteratively walk every ugen it (transitively)
    /// held a reference to, releasing references and destroying anything
    /// that drops to zero. Explicit work-list rather than recursion so an
    /// arbitrarily deep chain of `Sum -> Sum -> ... -> Sum` cannot overflow
    /// the audio thread's stack (invariant 3).
    fn destroy(&mut self, root: UgenId) {
        let mut worklist = vec![root];
        while let Some(id) = worklist.pop() {
            let Some(ugen) = self.ugens.remove(&id) else {
                continue;
            };
            for input in ugen.held_inputs() {
                if Self::is_permanent(input) {
                    continue;
                }
                if let Some(u) = self.ugens.get_mut(&input) {
                    u.refcount = u.refcount.saturating_sub(1);
                    if u.refcount == 0 {
                        worklist.push(input);
                    }
                }
            }
        }
    }

    /// Explicitly free a host-visible ugen (`/arco/<kind>/free`): drops the
    /// table's own reference, destroying it only if nothing else still
    /// holds it.
    pub fn free(&mut self, id: UgenId) {
        self.unref(id);
    }

    /// A short, non-realtime diagnostic describing `id` and (one level
    /// deep) what it holds, grounded in the original's `print_sources`/
    /// `print_tree` debug dump (`spec.md` §4.1). Cycle-safe via a visited
    /// set, since `Feedback` is a legitimate cycle in the graph.
    pub fn describe(&self, id: UgenId) -> String {
        let mut visited = std::collections::HashSet::new();
        self.describe_inner(id, 0, &mut visited)
    }

    fn describe_inner(&self, id: UgenId, depth: usize, visited: &mut std::collections::HashSet<UgenId>) -> String {
        let indent = "  ".repeat(depth);
        let Some(ugen) = self.ugens.get(&id) else {
            return format!("{indent}#{id} <missing>");
        };
        let kind_name = kind_name(&ugen.kind);
        let mut out = format!(
            "{indent}#{id} {kind_name} rate={:?} chans={} refs={} terminated={}",
            ugen.rate,
            ugen.chans,
            ugen.refcount,
            ugen.flags.is_terminated()
        );
        if depth > 4 || !visited.insert(id) {
            return out;
        }
        for input in ugen.held_inputs() {
            out.push('\n');
            out.push_str(&self.describe_inner(input, depth + 1, visited));
        }
        out
    }
}

fn kind_name(kind: &UgenKind) -> &'static str {
    match kind {
        UgenKind::Const => "const",
        UgenKind::Sum(_) => "sum",
        UgenKind::Sumb(_) => "sumb",
        UgenKind::Add(_) => "add",
        UgenKind::Addb(_) => "addb",
        UgenKind::Route(_) => "route",
        UgenKind::Stdistr(_) => "stdistr",
        UgenKind::Upsample(_) => "upsample",
        UgenKind::Dnsampleb(_) => "dnsampleb",
        UgenKind::Smooth(_) => "smooth",
        UgenKind::Smoothb(_) => "smoothb",
        UgenKind::Pwl(_) => "pwl",
        UgenKind::Pwlb(_) => "pwlb",
        UgenKind::Pwe(_) => "pwe",
        UgenKind::Pweb(_) => "pweb",
        UgenKind::Fader(_) => "fader",
        UgenKind::Dualslewb(_) => "dualslewb",
        UgenKind::Feedback(_) => "feedback",
        UgenKind::Yin(_) => "yin",
        UgenKind::Trig(_) => "trig",
        UgenKind::Chorddetect(_) => "chorddetect",
        UgenKind::Blend(_) => "blend",
    }
}

impl GraphCtx for Registry {
    fn pull(&mut self, id: UgenId, block: u64) {
        if self.running.iter().any(|u| u.id == id) {
            // Reentrant: `id` is already mid-`real_run` further up this same
            // pull chain — either a literal self-reference (`Feedback` with
            // `from == id`) or a cycle closed through some ancestor
            // `Feedback` node's `from` pointing at a descendant that reads
            // back into it. `real_run`'s own `current_block` memoization
            // already guarantees nothing re-enters its body for this block;
            // there's nothing left to do here. Whatever that ancestor has
            // already written into its own `out_samps` by this point in its
            // run is what `out`/`chans_of` below return.
            return;
        }
        let Some(ugen) = self.ugens.remove(&id) else {
            return;
        };
        self.running.push(Box::new(ugen));
        // SAFETY: `ptr` points at a `Box`'s stable heap allocation, so it
        // stays valid even though nested `pull` calls below may push
        // further entries onto `self.running` and reallocate its backing
        // `Vec<Box<Ugen>>` — only the spine moves, never the boxed `Ugen`s.
        // Nothing else observes this same element while `real_run` runs:
        // the reentrant-id check above means a nested pull of this exact
        // `id` returns before touching it, and every other id lives at a
        // different element or in `self.ugens`. Exactly one mutable path
        // to this `Ugen` is ever live at a time.
        let ptr: *mut Ugen = self.running.last_mut().unwrap().as_mut();
        unsafe { (*ptr).real_run(block, self) };
        let ugen = self.running.pop().expect("pushed above, same depth");
        self.ugens.insert(id, *ugen);
    }

    fn out(&self, id: UgenId) -> &[f32] {
        if let Some(u) = self.ugens.get(&id) {
            return u.out_samps.as_slice();
        }
        if let Some(u) = self.running.iter().find(|u| u.id == id) {
            return u.out_samps.as_slice();
        }
        &[]
    }

    fn rate_of(&self, id: UgenId) -> Rate {
        if let Some(u) = self.ugens.get(&id) {
            return u.rate;
        }
        if let Some(u) = self.running.iter().find(|u| u.id == id) {
            return u.rate;
        }
        Rate::None
    }

    fn chans_of(&self, id: UgenId) -> usize {
        if let Some(u) = self.ugens.get(&id) {
            return u.chans;
        }
        if let Some(u) = self.running.iter().find(|u| u.id == id) {
            return u.chans;
        }
        0
    }

    fn is_terminated(&self, id: UgenId) -> bool {
        if let Some(u) = self.ugens.get(&id) {
            return u.flags.is_terminated();
        }
        if let Some(u) = self.running.iter().find(|u| u.id == id) {
            return u.flags.is_terminated();
        }
        true
    }

    fn ref_up(&mut self, id: UgenId) {
        if let Some(u) = self.ugens.get_mut(&id) {
            u.refcount += 1;
        }
    }

    fn unref(&mut self, id: UgenId) {
        if Self::is_permanent(id) {
            return;
        }
        let Some(u) = self.ugens.get_mut(&id) else {
            return;
        };
        u.refcount = u.refcount.saturating_sub(1);
        if u.refcount == 0 {
            self.destroy(id);
        }
    }

    fn logger(&mut self) -> &mut ArLogSender {
        &mut self.logger
    }

    fn reply(&mut self, addr: &str, payload: ReplyPayload) {
        self.reply_tx.send(Reply {
            address: addr.to_string(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arco_core::ugens::sum::Sum;
    use arco_core::ugens::windowed::Chorddetect;

    fn test_registry() -> Registry {
        let config = EngineConfig::default();
        let (reply_tx, _reply_rx) = crate::control::reply_queue(config.reply_queue_capacity);
        Registry::new(&config, ArLogSender::non_rt(), reply_tx)
    }

    #[test]
    fn zero_and_zerob_exist_on_construction() {
        let reg = test_registry();
        assert!(reg.contains(ZERO_ID));
        assert!(reg.contains(ZEROB_ID));
        assert_eq!(reg.rate_of(ZERO_ID), Rate::Audio);
        assert_eq!(reg.rate_of(ZEROB_ID), Rate::Block);
    }

    #[test]
    fn unref_never_destroys_permanent_sources() {
        let mut reg = test_registry();
        reg.unref(ZERO_ID);
        reg.unref(ZEROB_ID);
        assert!(reg.contains(ZERO_ID));
        assert!(reg.contains(ZEROB_ID));
    }

    #[test]
    fn free_destroys_once_unreferenced() {
        let mut reg = test_registry();
        reg.insert(10, Rate::Audio, 1, UgenKind::Const).unwrap();
        assert!(reg.contains(10));
        reg.free(10);
        assert!(!reg.contains(10));
    }

    #[test]
    fn teardown_is_iterative_over_a_deep_chain() {
        let mut reg = test_registry();
        // Build a chain sum_0 -> sum_1 -> ... -> sum_999, each holding
        // exactly the next as its only input, then free the head and make
        // sure the whole chain is reclaimed without blowing the stack.
        let depth = 2000;
        let mut prev = ZERO_ID;
        for i in 0..depth {
            let id = 100 + i;
            reg.insert(id, Rate::Audio, 1, UgenKind::Sum(Sum::new(false, 44_100))).unwrap();
            reg.with_ugen_mut(id, |kind, ctx| {
                let UgenKind::Sum(s) = kind else { unreachable!() };
                s.ins(prev, ctx);
            })
            .unwrap();
            prev = id;
        }
        reg.free(100); // the head of the chain; everything downstream hangs off it
        for i in 0..depth {
            assert!(!reg.contains(100 + i), "id {} should have been reclaimed", 100 + i);
        }
    }

    #[test]
    fn init_param_wraps_mismatched_rate() {
        let mut reg = test_registry();
        reg.insert(20, Rate::Block, 1, UgenKind::Const).unwrap();
        let wrapped = reg.init_param(20, Rate::Audio);
        assert_ne!(wrapped, 20);
        assert!(wrapped < 0, "adapter ids are negative");
        assert_eq!(reg.rate_of(wrapped), Rate::Audio);
        assert_eq!(reg.get(20).unwrap().refcount, 1);
    }

    #[test]
    fn init_param_passes_matching_rate_through() {
        let mut reg = test_registry();
        reg.insert(21, Rate::Audio, 1, UgenKind::Const).unwrap();
        let wrapped = reg.init_param(21, Rate::Audio);
        assert_eq!(wrapped, 21);
        assert_eq!(reg.get(21).unwrap().refcount, 1);
    }

    #[test]
    fn describe_is_cycle_safe() {
        let mut reg = test_registry();
        reg.insert(
            30,
            Rate::None,
            1,
            UgenKind::Chorddetect(Chorddetect::new(256, 44_100, "/reply/chord".to_string())),
        )
        .unwrap();
        let s = reg.describe(30);
        assert!(s.contains("chorddetect"));
    }
}
