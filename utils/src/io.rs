//! The audio seam between the session controller and real hardware.
//!
//! cpal streams are not `Send`, so the cpal implementations keep each stream
//! on its own thread and expose `Send` handles that talk to it.

use crate::audio::AudioBuffer;
use crate::capture::CpalMicrophone;
use crate::playback::CpalSpeaker;

/// Receives mono capture samples at the rate the device was acquired with.
pub type FrameSink = Box<dyn FnMut(Vec<f32>) + Send>;

/// Told the id of every playback unit that finished on its own. Runs on the
/// audio thread, so it must not block.
pub type EndedSink = Box<dyn Fn(u64) + Send + Sync>;

pub trait CaptureDevice: Send {
    /// Starts delivering samples to `sink` until `stop` is called.
    fn start(&mut self, sink: FrameSink) -> anyhow::Result<()>;

    /// Stops and releases the device. Calling it again does nothing.
    fn stop(&mut self);
}

pub trait PlaybackDevice: Send {
    /// Playback clock in seconds since the device was opened.
    fn current_time(&self) -> f64;

    /// Schedules `buffer` to begin at `at` seconds on the playback clock.
    fn start(&mut self, unit: u64, buffer: &AudioBuffer, at: f64) -> anyhow::Result<()>;

    /// Stops a scheduled or playing unit without reporting it as ended.
    fn stop(&mut self, unit: u64);

    /// Releases the output device. Calling it again does nothing.
    fn close(&mut self);
}

pub trait AudioBackend: Send {
    /// Acquires the microphone; capture samples arrive at `sample_rate`.
    fn acquire_microphone(&mut self, sample_rate: u32) -> anyhow::Result<Box<dyn CaptureDevice>>;

    /// Opens an output context that plays buffers recorded at `sample_rate`.
    fn open_playback(
        &mut self,
        sample_rate: u32,
        on_ended: EndedSink,
    ) -> anyhow::Result<Box<dyn PlaybackDevice>>;
}

/// Default cpal host, optionally pinned to named devices.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_device(mut self, name: impl Into<String>) -> Self {
        self.input_device = Some(name.into());
        self
    }

    pub fn with_output_device(mut self, name: impl Into<String>) -> Self {
        self.output_device = Some(name.into());
        self
    }
}

impl AudioBackend for CpalBackend {
    fn acquire_microphone(&mut self, sample_rate: u32) -> anyhow::Result<Box<dyn CaptureDevice>> {
        let microphone = CpalMicrophone::acquire(self.input_device.clone(), sample_rate)?;
        Ok(Box::new(microphone))
    }

    fn open_playback(
        &mut self,
        sample_rate: u32,
        on_ended: EndedSink,
    ) -> anyhow::Result<Box<dyn PlaybackDevice>> {
        let speaker = CpalSpeaker::open(self.output_device.clone(), sample_rate, on_ended)?;
        Ok(Box::new(speaker))
    }
}
