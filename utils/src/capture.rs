use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, StreamConfig};
use rubato::{FastFixedIn, Resampler};

use crate::audio::create_resampler;
use crate::device;
use crate::io::{CaptureDevice, FrameSink};

/// Device-rate samples handed to the resampler at a time.
const INPUT_CHUNK_SIZE: usize = 1024;
/// Callback buffers allowed to queue up before new ones are dropped.
const RAW_QUEUE_DEPTH: usize = 64;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Worker {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// Microphone input that delivers mono samples at a fixed target rate.
pub struct CpalMicrophone {
    device_name: String,
    stream_config: StreamConfig,
    target_rate: u32,
    worker: Option<Worker>,
}

impl CpalMicrophone {
    pub fn acquire(device_name: Option<String>, target_rate: u32) -> anyhow::Result<Self> {
        let input = device::get_or_default_input(device_name)
            .context("Failed to get audio input device")?;
        let device_name = input.name()?;
        let input_config = input
            .default_input_config()
            .context("Failed to get default input config")?;
        let stream_config = StreamConfig {
            channels: input_config.channels(),
            sample_rate: input_config.sample_rate(),
            buffer_size: BufferSize::Default,
        };
        tracing::info!("Using input device: {:?} ({:?})", device_name, stream_config);
        Ok(Self {
            device_name,
            stream_config,
            target_rate,
            worker: None,
        })
    }
}

impl CaptureDevice for CpalMicrophone {
    fn start(&mut self, sink: FrameSink) -> anyhow::Result<()> {
        if self.worker.is_some() {
            anyhow::bail!("capture already started");
        }
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();
        let name = self.device_name.clone();
        let config = self.stream_config.clone();
        let target_rate = self.target_rate;
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("tutor-capture".into())
            .spawn(move || run_capture(name, config, target_rate, sink, thread_stop, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(Worker { stop, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow::anyhow!("capture thread exited before starting"))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::SeqCst);
            if worker.handle.join().is_err() {
                tracing::error!("capture thread panicked");
            }
            tracing::debug!("Microphone released");
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture(
    device_name: String,
    config: StreamConfig,
    target_rate: u32,
    mut sink: FrameSink,
    stop: Arc<AtomicBool>,
    ready: mpsc::Sender<anyhow::Result<()>>,
) {
    let (raw_tx, raw_rx) = mpsc::sync_channel::<Vec<f32>>(RAW_QUEUE_DEPTH);
    let channel_count = config.channels as usize;
    let device_rate = config.sample_rate.0;

    let started = (|| -> anyhow::Result<(cpal::Stream, Option<FastFixedIn<f32>>)> {
        let input = device::get_or_default_input(Some(device_name))?;
        // Downmix to mono inside the callback; everything else happens on this thread.
        let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let audio = if channel_count > 1 {
                data.chunks(channel_count)
                    .map(|c| c.iter().sum::<f32>() / channel_count as f32)
                    .collect::<Vec<f32>>()
            } else {
                data.to_vec()
            };
            if let Err(e) = raw_tx.try_send(audio) {
                tracing::warn!("Failed to queue captured audio: {:?}", e);
            }
        };
        let stream = input.build_input_stream(
            &config,
            input_data_fn,
            move |err| tracing::error!("An error occurred on input stream: {}", err),
            None,
        )?;
        stream.play()?;
        let resampler = if device_rate == target_rate {
            None
        } else {
            Some(create_resampler(
                device_rate as f64,
                target_rate as f64,
                INPUT_CHUNK_SIZE,
            )?)
        };
        Ok((stream, resampler))
    })();

    let (stream, mut resampler) = match started {
        Ok(started) => started,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut buffer: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);
    while !stop.load(Ordering::SeqCst) {
        let audio = match raw_rx.recv_timeout(POLL_INTERVAL) {
            Ok(audio) => audio,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let Some(resampler) = resampler.as_mut() else {
            sink(audio);
            continue;
        };
        buffer.extend(audio);
        let mut resampled: Vec<f32> = vec![];
        while buffer.len() >= INPUT_CHUNK_SIZE {
            let chunk: Vec<f32> = buffer.drain(..INPUT_CHUNK_SIZE).collect();
            match resampler.process(&[chunk.as_slice()], None) {
                Ok(out) => {
                    if let Some(out) = out.first() {
                        resampled.extend_from_slice(out);
                    }
                }
                Err(e) => tracing::warn!("Failed to resample captured audio: {}", e),
            }
        }
        if !resampled.is_empty() {
            sink(resampled);
        }
    }
    drop(stream);
}
