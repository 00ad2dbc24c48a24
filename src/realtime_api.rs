use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tutor_live_types::{Blob, LiveConfig, LiveEvent};

use crate::client::Stats;

/// Opens bidirectional sessions with a live conversational model.
///
/// `open` resolves once the socket is connected and the setup message is
/// queued. `LiveEvent::Open` arrives on `events` when the server acknowledges
/// the setup, which may happen before or after `open` returns. `Error` and
/// `Closed` may arrive at any time.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn open(
        &self,
        config: LiveConfig,
        events: mpsc::Sender<LiveEvent>,
    ) -> Result<Box<dyn LiveSession>>;
}

/// Handle to one open session.
pub trait LiveSession: Send {
    /// Queues one PCM frame. Never blocks; frames are dropped if the queue is full.
    fn send_audio_frame(&self, frame: Blob);

    /// Asks the server to close. Safe to call more than once.
    fn close(&self);

    fn stats(&self) -> Option<Stats> {
        None
    }
}
