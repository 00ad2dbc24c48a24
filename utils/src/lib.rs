pub mod audio;
pub mod capture;
pub mod device;
pub mod io;
pub mod playback;

pub use audio::{AudioBuffer, DecodeError};
pub use io::{AudioBackend, CaptureDevice, CpalBackend, EndedSink, FrameSink, PlaybackDevice};
