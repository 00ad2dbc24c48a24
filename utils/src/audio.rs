use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Divisor mapping 16-bit PCM onto [-1, 1).
pub const PCM16_SCALE: f32 = 32768.0;

const RESAMPLE_CHUNK_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed transport text: {0}")]
    Malformed(#[from] base64::DecodeError),
    #[error("channel count must be at least 1")]
    NoChannels,
}

/// De-interleaved floating point audio, one `Vec` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Averages all channels into one.
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frame_count())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

pub fn encode_transport_text(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_transport_text(text: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(text)?)
}

/// Interprets `bytes` as interleaved little-endian PCM16. A trailing partial
/// frame is dropped.
pub fn decode_pcm_frames(
    bytes: &[u8],
    sample_rate: u32,
    channel_count: usize,
) -> Result<AudioBuffer, DecodeError> {
    if channel_count == 0 {
        return Err(DecodeError::NoChannels);
    }
    let frame_count = bytes.len() / 2 / channel_count;
    let mut channels = vec![Vec::with_capacity(frame_count); channel_count];
    for frame in bytes.chunks_exact(2 * channel_count) {
        for (channel, sample) in frame.chunks_exact(2).enumerate() {
            let v = i16::from_le_bytes([sample[0], sample[1]]);
            channels[channel].push(v as f32 / PCM16_SCALE);
        }
    }
    Ok(AudioBuffer::new(sample_rate, channels))
}

/// Scales by 32768 and truncates; out of range values saturate.
pub fn quantize(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| ((sample * PCM16_SCALE) as i16).to_le_bytes())
        .collect()
}

/// Float samples to base64 PCM16, ready for a realtime input frame.
pub fn encode(samples: &[f32]) -> String {
    encode_transport_text(&quantize(samples))
}

/// Base64 PCM16 to a playable buffer.
pub fn decode(fragment: &str, sample_rate: u32, channel_count: usize) -> Result<AudioBuffer, DecodeError> {
    let bytes = decode_transport_text(fragment)?;
    decode_pcm_frames(&bytes, sample_rate, channel_count)
}

pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Resamples a whole mono clip. The zero padding of the last chunk is cut
/// off again so the clip keeps its duration.
pub fn resample(samples: &[f32], from: u32, to: u32) -> anyhow::Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = create_resampler(from as f64, to as f64, RESAMPLE_CHUNK_SIZE)?;
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;
    let mut out = Vec::with_capacity(expected + RESAMPLE_CHUNK_SIZE);
    for chunk in split_for_chunks(samples, RESAMPLE_CHUNK_SIZE) {
        let resampled = resampler.process(&[chunk.as_slice()], None)?;
        if let Some(channel) = resampled.first() {
            out.extend_from_slice(channel);
        }
    }
    out.resize(expected, 0.0);
    Ok(out)
}
