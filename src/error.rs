use tutor_live_utils::DecodeError;

/// Failures the session controller classifies at its edges.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// Microphone permission or device failure. Nothing was left open.
    #[error("could not acquire microphone: {0}")]
    Acquisition(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transport closed: {}", .0.as_deref().unwrap_or("no reason given"))]
    TransportClosed(Option<String>),
    #[error("could not decode audio fragment: {0}")]
    Decode(#[from] DecodeError),
    #[error("feedback request failed: {0}")]
    FeedbackRequest(String),
    #[error("summary request failed: {0}")]
    SummaryRequest(String),
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("session controller is no longer running")]
    ControllerGone,
}
