//! Output driver errors

use thiserror::Error;

/// Why the output device could not be opened or started
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output devices found")]
    NoDevices,

    #[error("No default audio output device")]
    NoDefaultDevice,

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// The device has no 32-bit float output configuration
    #[error("Audio device {0} offers no f32 output")]
    NoFloatOutput(String),

    /// cpal refused a device query
    #[error("Audio device query failed: {0}")]
    Query(String),

    /// Building or starting the stream failed
    #[error("Output stream failed to {stage}: {message}")]
    Stream { stage: &'static str, message: String },

    /// The renderer was built for another rate than the device negotiated
    #[error("Engine renders at {engine} Hz but the device runs at {device} Hz")]
    SampleRateMismatch { engine: u32, device: u32 },
}

pub type AudioResult<T> = Result<T, AudioError>;
