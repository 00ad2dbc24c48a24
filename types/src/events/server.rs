use crate::content::Content;
use crate::events::LiveEvent;

/// One JSON frame from the Live socket. Fields are independent; a frame may
/// carry a transcription, the end of a turn and audio all at once.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    setup_complete: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_content: Option<ServerContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    go_away: Option<GoAway>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage_metadata: Option<UsageMetadata>,
}

impl ServerMessage {
    pub fn server_content(&self) -> Option<&ServerContent> {
        self.server_content.as_ref()
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    pub fn go_away(&self) -> Option<&GoAway> {
        self.go_away.as_ref()
    }

    pub fn usage_metadata(&self) -> Option<&UsageMetadata> {
        self.usage_metadata.as_ref()
    }

    /// Flattens the frame into events: open, output transcription, input
    /// transcription, turn complete, audio fragments, interruption.
    pub fn into_events(self) -> Vec<LiveEvent> {
        let mut events = Vec::new();
        if self.setup_complete.is_some() {
            events.push(LiveEvent::Open);
        }
        let Some(content) = self.server_content else {
            return events;
        };

        if let Some(text) = content.output_transcription.and_then(Transcription::into_text) {
            events.push(LiveEvent::OutputTranscription(text));
        }
        if let Some(text) = content.input_transcription.and_then(Transcription::into_text) {
            events.push(LiveEvent::InputTranscription(text));
        }
        if content.turn_complete {
            events.push(LiveEvent::TurnComplete);
        }
        if let Some(turn) = content.model_turn {
            for part in turn.into_parts() {
                if let Some(blob) = part.as_inline_data() {
                    if blob.is_audio() {
                        events.push(LiveEvent::ModelAudio(blob.data().to_string()));
                    }
                }
            }
        }
        if content.interrupted {
            events.push(LiveEvent::Interrupted);
        }
        events
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_turn: Option<Content>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    generation_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input_transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_transcription: Option<Transcription>,
}

impl ServerContent {
    pub fn turn_complete(&self) -> bool {
        self.turn_complete
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn generation_complete(&self) -> bool {
        self.generation_complete
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Transcription {
    #[serde(default)]
    text: Option<String>,
}

impl Transcription {
    fn into_text(self) -> Option<String> {
        self.text.filter(|t| !t.is_empty())
    }
}

/// Notice that the server will drop the connection soon.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    time_left: Option<String>,
}

impl GoAway {
    pub fn time_left(&self) -> Option<&str> {
        self.time_left.as_deref()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    response_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl UsageMetadata {
    pub fn prompt_token_count(&self) -> u32 {
        self.prompt_token_count
    }

    pub fn response_token_count(&self) -> u32 {
        self.response_token_count
    }

    pub fn total_token_count(&self) -> u32 {
        self.total_token_count
    }
}
