use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Context;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, StreamConfig};

use crate::audio::{resample, AudioBuffer};
use crate::device;
use crate::io::{EndedSink, PlaybackDevice};

struct Track {
    unit: u64,
    start_frame: u64,
    samples: Vec<f32>,
    cursor: usize,
}

/// Sums scheduled tracks into the output buffer and keeps the playback clock.
#[derive(Default)]
struct Mixer {
    frames_played: u64,
    tracks: Vec<Track>,
}

impl Mixer {
    fn schedule(&mut self, unit: u64, start_frame: u64, samples: Vec<f32>) {
        self.tracks.push(Track {
            unit,
            start_frame,
            samples,
            cursor: 0,
        });
    }

    fn cancel(&mut self, unit: u64) -> bool {
        let before = self.tracks.len();
        self.tracks.retain(|t| t.unit != unit);
        before != self.tracks.len()
    }

    /// Fills `out` (interleaved, `channels` wide) and returns the units that
    /// played their last sample.
    fn render(&mut self, out: &mut [f32], channels: usize) -> Vec<u64> {
        for frame in out.chunks_mut(channels.max(1)) {
            let now = self.frames_played;
            let mut value = 0.0f32;
            for track in self.tracks.iter_mut() {
                if now >= track.start_frame && track.cursor < track.samples.len() {
                    value += track.samples[track.cursor];
                    track.cursor += 1;
                }
            }
            frame.fill(value.clamp(-1.0, 1.0));
            self.frames_played += 1;
        }

        let mut finished = Vec::new();
        self.tracks.retain(|t| {
            if t.cursor >= t.samples.len() {
                finished.push(t.unit);
                false
            } else {
                true
            }
        });
        finished
    }
}

struct Worker {
    stop: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// Output context that plays clips at absolute times on its own clock.
pub struct CpalSpeaker {
    mixer: Arc<Mutex<Mixer>>,
    device_rate: u32,
    source_rate: u32,
    worker: Option<Worker>,
}

impl CpalSpeaker {
    pub fn open(
        device_name: Option<String>,
        source_rate: u32,
        on_ended: EndedSink,
    ) -> anyhow::Result<Self> {
        let output = device::get_or_default_output(device_name)
            .context("Failed to get audio output device")?;
        let device_name = output.name()?;
        let output_config = output
            .default_output_config()
            .context("Failed to get default output config")?;
        let stream_config = StreamConfig {
            channels: output_config.channels(),
            sample_rate: output_config.sample_rate(),
            buffer_size: BufferSize::Default,
        };
        tracing::info!("Using output device: {:?} ({:?})", device_name, stream_config);

        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let device_rate = stream_config.sample_rate.0;
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();
        let thread_mixer = mixer.clone();
        let handle = thread::Builder::new()
            .name("tutor-playback".into())
            .spawn(move || {
                let started = (|| -> anyhow::Result<cpal::Stream> {
                    let output = device::get_or_default_output(Some(device_name))?;
                    let channel_count = stream_config.channels as usize;
                    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let finished = match thread_mixer.lock() {
                            Ok(mut mixer) => mixer.render(data, channel_count),
                            Err(_) => {
                                data.fill(0.0);
                                return;
                            }
                        };
                        for unit in finished {
                            on_ended(unit);
                        }
                    };
                    let stream = output.build_output_stream(
                        &stream_config,
                        output_data_fn,
                        move |err| tracing::error!("An error occurred on output stream: {}", err),
                        None,
                    )?;
                    stream.play()?;
                    Ok(stream)
                })();
                match started {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Blocks until close() sends or the speaker is dropped.
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                mixer,
                device_rate,
                source_rate,
                worker: Some(Worker {
                    stop: stop_tx,
                    handle,
                }),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow::anyhow!("playback thread exited before starting"))
            }
        }
    }
}

impl PlaybackDevice for CpalSpeaker {
    fn current_time(&self) -> f64 {
        match self.mixer.lock() {
            Ok(mixer) => mixer.frames_played as f64 / self.device_rate as f64,
            Err(_) => 0.0,
        }
    }

    fn start(&mut self, unit: u64, buffer: &AudioBuffer, at: f64) -> anyhow::Result<()> {
        if self.worker.is_none() {
            anyhow::bail!("playback device is closed");
        }
        let from = if buffer.sample_rate() == 0 {
            self.source_rate
        } else {
            buffer.sample_rate()
        };
        let samples = resample(&buffer.to_mono(), from, self.device_rate)?;
        let start_frame = (at.max(0.0) * self.device_rate as f64).round() as u64;
        self.mixer
            .lock()
            .map_err(|_| anyhow::anyhow!("playback mixer poisoned"))?
            .schedule(unit, start_frame, samples);
        Ok(())
    }

    fn stop(&mut self, unit: u64) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.cancel(unit);
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop.send(());
            if worker.handle.join().is_err() {
                tracing::error!("playback thread panicked");
            }
            if let Ok(mut mixer) = self.mixer.lock() {
                mixer.tracks.clear();
            }
            tracing::debug!("Output device released");
        }
    }
}

impl Drop for CpalSpeaker {
    fn drop(&mut self) {
        self.close();
    }
}
