//! The audio-thread driver loop: `spec.md` §4.8's five-step per-block
//! sequence, grounded in the teacher's `RunnerOptions`/`Runner<F>`
//! (`knaster_graph::runner`) but reworked around `Registry`'s dynamic,
//! non-generic ugen table instead of a fixed `Inputs`/`Outputs` typenum
//! graph — there is no compile-time channel count here, only whatever
//! the designated output ugen's `chans` happens to be.

use arco_core::{ArLogSender, GraphCtx, Rate, UgenId};
use arco_primitives::BL;

use crate::control::{control_queue, reply_queue, ControlReceiver, ControlSender, ReplyReceiver, ReplySender};
use crate::dispatch;
use crate::error::EngineError;
use crate::registry::{EngineConfig, Registry};

/// Owns the registry and both queues, and knows how to advance one block.
///
/// Construction is the `arco` analogue of the teacher's
/// `Runner::new::<Inputs, Outputs>(options) -> (Graph<F>, Runner<F>)`: there
/// the graph and its driver are handed back as a pair because the graph
/// node is shared with the caller's wiring code. Here there is nothing to
/// share — `Registry` already owns every ugen — so `Engine::new` just
/// returns the driver plus the host-facing queue handles.
pub struct Engine {
    registry: Registry,
    control_rx: ControlReceiver,
    reply_rx: ReplyReceiver,
    output: UgenId,
    current_block: u64,
}

impl Engine {
    /// Build a fresh engine wired to `output` (the designated output sink,
    /// typically a `Sum`/`Sumb` mixer ugen already present in a freshly
    /// constructed [`Registry`]) and return it alongside the host-facing
    /// control sender. The reply receiver stays with the `Engine` itself
    /// and is drained by [`Engine::process_block`]'s step 5 via
    /// [`Engine::take_replies`]; giving the caller both the `Engine` (which
    /// owns `reply_rx`) and a separate handle would let the two race over
    /// who drains it, so instead the caller polls through the `Engine`.
    pub fn new(config: &EngineConfig, output: UgenId) -> (Self, ControlSender) {
        let (control_tx, control_rx) = control_queue(config.control_queue_capacity);
        let (reply_tx, reply_rx) = reply_queue(config.reply_queue_capacity);
        let logger = ArLogSender::non_rt();
        let registry = Registry::new(config, logger, reply_tx);
        let engine = Self {
            registry,
            control_rx,
            reply_rx,
            output,
            current_block: 0,
        };
        (engine, control_tx)
    }

    /// Build an engine with its own pre-wired logger, for callers that need
    /// the real-time log channel too (the `arco` cpal driver does).
    pub fn with_logger(config: &EngineConfig, output: UgenId, logger: ArLogSender) -> (Self, ControlSender) {
        let (control_tx, control_rx) = control_queue(config.control_queue_capacity);
        let (reply_tx, reply_rx) = reply_queue(config.reply_queue_capacity);
        let registry = Registry::new(config, logger, reply_tx);
        let engine = Self {
            registry,
            control_rx,
            reply_rx,
            output,
            current_block: 0,
        };
        (engine, control_tx)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn current_block(&self) -> u64 {
        self.current_block
    }

    /// Change which ugen's `out_samps` is copied out in step 4. Callers
    /// typically build a `Sum`/`Sumb` sink after construction and then
    /// repoint the engine at it, since `new` needs a valid id up front but
    /// that id doesn't have to be the final mix sink.
    pub fn set_output(&mut self, output: UgenId) {
        self.output = output;
    }

    /// Run one audio callback's worth of work: `spec.md` §4.8 steps 1-4.
    /// Step 5 (flushing the reply queue) is [`Engine::take_replies`], kept
    /// separate so callers can choose whether to drain replies on the audio
    /// thread or hand the drain off (the queue is SPSC either way, so only
    /// one side may ever call it).
    ///
    /// `out` receives the interleaved or channel-major copy of the output
    /// ugen's block — channel-major, `chans` groups of up to `BL` samples,
    /// matching `out_samps`'s own layout. Returns the number of channels
    /// actually written (the output ugen's `chans`, `0` if it does not
    /// exist).
    pub fn process_block(&mut self, out: &mut [f32]) -> Result<usize, EngineError> {
        if !self.registry.contains(self.output) {
            return Err(EngineError::NoOutputUgen(self.output));
        }

        // Step 1: drain inbound control messages, applying each
        // synchronously before this block's pull (spec.md §4.8 step 1,
        // §5 ordering guarantees — FIFO, entirely before the block).
        let registry = &mut self.registry;
        self.control_rx.drain(|msg| {
            if let Err(err) = dispatch::dispatch(registry, &msg) {
                log::warn!("{}: {err}", msg.address);
            }
        });

        // Step 2: advance the block clock.
        self.current_block += 1;

        // Step 3: pull the designated output sink. This recursively pulls
        // whatever it depends on through `GraphCtx::pull`'s memoized,
        // per-block dispatch.
        self.registry.run(self.output, self.current_block);

        // Step 4: copy/convert the output ugen's samples into the caller's
        // buffer. Block-rate/constant sinks produce one sample per channel
        // per block rather than per-block-length; copy whatever's there.
        let samples = self.registry.out(self.output);
        let len = samples.len().min(out.len());
        out[..len].copy_from_slice(&samples[..len]);
        if len < out.len() {
            out[len..].fill(0.0);
        }

        let chans = self.registry.chans_of(self.output);
        Ok(chans)
    }

    /// Step 5: flush every pending outbound reply, invoking `handler` once
    /// per reply. Kept as an explicit, separate call rather than bundled
    /// into `process_block` so test harnesses and the cpal driver can
    /// choose when (or whether) to service replies.
    pub fn take_replies(&mut self, handler: impl FnMut(crate::control::Reply)) {
        self.reply_rx.drain(handler);
    }

    /// Convenience for audio-rate output sinks: the channel count times
    /// `BL`, i.e. the minimum `out` buffer length [`Engine::process_block`]
    /// needs to avoid truncating an audio-rate sink.
    pub fn audio_block_len(&self) -> usize {
        self.registry.chans_of(self.output).max(1) * BL
    }

    pub fn output_chans(&self) -> usize {
        self.registry.chans_of(self.output)
    }

    pub fn output_rate(&self) -> Rate {
        self.registry.rate_of(self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Arg, Message};
    use arco_core::ZERO_ID;

    fn build_engine() -> (Engine, ControlSender) {
        let config = EngineConfig::default();
        let (mut engine, tx) = Engine::new(&config, ZERO_ID);
        engine
            .registry_mut()
            .insert(10, Rate::Audio, 1, arco_core::UgenKind::Sum(arco_core::ugens::sum::Sum::new(false, config.sample_rate)))
            .unwrap();
        engine.set_output(10);
        (engine, tx)
    }

    #[test]
    fn missing_output_ugen_errors() {
        let config = EngineConfig::default();
        let (mut engine, _tx) = Engine::new(&config, 999);
        let mut out = vec![0.0; BL];
        assert!(matches!(engine.process_block(&mut out), Err(EngineError::NoOutputUgen(999))));
    }

    #[test]
    fn silent_sum_produces_zeroes() {
        let (mut engine, _tx) = build_engine();
        let mut out = vec![1.0; BL];
        let chans = engine.process_block(&mut out).unwrap();
        assert_eq!(chans, 1);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn control_message_applies_before_the_block_it_affects() {
        let (mut engine, mut tx) = build_engine();
        tx.send(Message::new("/arco/sum/ins", vec![Arg::I(10), Arg::I(ZERO_ID)]));
        let mut out = vec![1.0; BL];
        let chans = engine.process_block(&mut out).unwrap();
        assert_eq!(chans, 1);
        assert_eq!(engine.current_block(), 1);
    }

    #[test]
    fn block_clock_advances_once_per_call() {
        let (mut engine, _tx) = build_engine();
        let mut out = vec![0.0; BL];
        engine.process_block(&mut out).unwrap();
        engine.process_block(&mut out).unwrap();
        engine.process_block(&mut out).unwrap();
        assert_eq!(engine.current_block(), 3);
    }

    #[test]
    fn replies_drain_without_blocking_when_empty() {
        let (mut engine, _tx) = build_engine();
        let mut seen = 0;
        engine.take_replies(|_| seen += 1);
        assert_eq!(seen, 0);
    }
}
