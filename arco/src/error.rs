//! Driver-level errors, grounded in the teacher's `AudioBackendError`
//! (`knaster_graph::audio_backend::AudioBackendError`): one enum covering
//! both backend-agnostic misuse and (behind the `cpal` feature) the
//! concrete `cpal` error types, each wrapped with `#[error(transparent)]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArcoError {
    #[error("no output device found")]
    NoOutputDevice,
    #[error(transparent)]
    Engine(#[from] arco_graph::EngineError),
    #[cfg(feature = "cpal")]
    #[error(transparent)]
    CpalDevicesError(#[from] cpal::DevicesError),
    #[cfg(feature = "cpal")]
    #[error(transparent)]
    CpalDeviceNameError(#[from] cpal::DeviceNameError),
    #[cfg(feature = "cpal")]
    #[error(transparent)]
    CpalDefaultStreamConfigError(#[from] cpal::DefaultStreamConfigError),
    #[cfg(feature = "cpal")]
    #[error(transparent)]
    CpalBuildStreamError(#[from] cpal::BuildStreamError),
    #[cfg(feature = "cpal")]
    #[error(transparent)]
    CpalPlayStreamError(#[from] cpal::PlayStreamError),
}
