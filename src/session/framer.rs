/// Cuts the capture stream into fixed-size frames.
#[derive(Debug)]
pub struct CaptureFramer {
    frame_size: usize,
    pending: Vec<f32>,
}

impl CaptureFramer {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size: frame_size.max(1),
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Buffers `samples` and returns every complete frame, oldest first.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);
        let complete = self.pending.len() / self.frame_size * self.frame_size;
        if complete == 0 {
            return Vec::new();
        }
        let frames = self.pending[..complete]
            .chunks(self.frame_size)
            .map(<[f32]>::to_vec)
            .collect();
        self.pending.drain(..complete);
        frames
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
