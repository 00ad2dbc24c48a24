pub mod server;

use crate::content::Blob;
use crate::setup::Setup;

pub use server::{ServerContent, ServerMessage, Transcription, UsageMetadata};

/// Frames the client writes to the Live socket.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    pub fn audio(frame: Blob) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput { audio: Some(frame) })
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<Blob>,
}

impl RealtimeInput {
    pub fn audio(&self) -> Option<&Blob> {
        self.audio.as_ref()
    }
}

/// Inbound events, in the order a single server frame produces them.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// The server acknowledged the setup message.
    Open,
    OutputTranscription(String),
    InputTranscription(String),
    TurnComplete,
    /// Base64 PCM16 at 24 kHz.
    ModelAudio(String),
    Interrupted,
    Error(String),
    Closed(Option<String>),
}
