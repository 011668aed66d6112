//! A `cpal` output-stream driver, grounded in the teacher's
//! `knaster_graph::audio_backend::cpal` module: build a device, pick its
//! default output config, and drive an [`arco_graph::Engine`] one block at a
//! time inside the device callback, reading out the block-sized,
//! channel-major buffer one frame at a time the same way
//! `knaster`'s `run::<T, F>` reads its `RawBlock` via `out_block.read(channel, sample)`.
//!
//! This is ambient driver glue, not a DSP recipe (`spec.md` §4.8's
//! supplement note) — it owns no ugen logic, only the translation between
//! `cpal`'s per-frame interleaved callback and the engine's per-block pull.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use arco_graph::Engine;
use arco_primitives::BL;

use crate::error::ArcoError;

pub struct CpalOptions {
    pub device: String,
    pub verbose: bool,
}

impl Default for CpalOptions {
    fn default() -> Self {
        Self {
            device: "default".into(),
            verbose: false,
        }
    }
}

/// Start a `cpal` output stream pulling blocks from `engine`. The stream is
/// returned playing; dropping it stops audio, matching `cpal`'s own
/// lifetime-bound `Stream` API (there is no separate `stop` call — the
/// teacher's `AudioBackend::stop` is just `self.stream.take()`).
pub fn run_cpal(engine: Engine, options: CpalOptions) -> Result<cpal::Stream, ArcoError> {
    let host = cpal::default_host();
    let device = if options.device == "default" {
        host.default_output_device()
    } else {
        host.output_devices()?.find(|d| d.name().map(|n| n == options.device).unwrap_or(false))
    }
    .ok_or(ArcoError::NoOutputDevice)?;

    if options.verbose {
        log::info!("arco: output device {:?}", device.name());
    }

    let config = device.default_output_config()?;
    if options.verbose {
        log::info!("arco: default output config {:?}", config);
    }

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), engine)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), engine)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), engine)?,
        other => {
            log::error!("arco: unsupported sample format {other:?}");
            return Err(ArcoError::NoOutputDevice);
        }
    };
    stream.play()?;
    Ok(stream)
}

fn build_stream<T>(device: &cpal::Device, config: &cpal::StreamConfig, mut engine: Engine) -> Result<cpal::Stream, ArcoError>
where
    T: Sample + FromSample<f32> + SizedSample,
{
    let frame_channels = config.channels as usize;
    let block_chans = engine.output_chans().max(1);
    let mut block_buf = vec![0.0f32; block_chans * BL];
    let mut sample_counter = BL; // force an immediate pull on the first callback

    let err_fn = |err| log::error!("arco: cpal stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |output: &mut [T], _info: &cpal::OutputCallbackInfo| {
            for frame in output.chunks_mut(frame_channels) {
                if sample_counter >= BL {
                    if let Err(err) = engine.process_block(&mut block_buf) {
                        log::error!("arco: {err}");
                    }
                    engine.take_replies(|reply| log::trace!("arco reply: {} {:?}", reply.address, reply.payload));
                    sample_counter = 0;
                }
                for (ch, out) in frame.iter_mut().enumerate() {
                    let src_ch = ch.min(block_chans - 1);
                    let sample = block_buf[src_ch * BL + sample_counter];
                    *out = T::from_sample(sample);
                }
                sample_counter += 1;
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
