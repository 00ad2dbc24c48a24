use tutor_live_types::audio::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};

mod controller;
mod framer;
mod handle;
mod playback;
mod transcript;

pub use controller::{Collaborators, SessionPhase, TutorState};
pub use framer::CaptureFramer;
pub use handle::SessionHandle;
pub use playback::{PlaybackQueue, ScheduledUnit};
pub use transcript::Transcript;

pub const CAPTURE_SAMPLE_RATE: u32 = INPUT_SAMPLE_RATE;
pub const PLAYBACK_SAMPLE_RATE: u32 = OUTPUT_SAMPLE_RATE;
/// Samples per outbound PCM frame.
pub const CAPTURE_FRAME_SIZE: usize = 4096;
/// Capacity of the controller's input queue and of the live event channel.
pub const QUEUE_CAPACITY: usize = 1024;
pub(crate) const EVENT_CAPACITY: usize = QUEUE_CAPACITY;
/// Stored when the summary request fails.
pub const FALLBACK_SUMMARY: &str = "Practiced English conversation with the tutor.";
