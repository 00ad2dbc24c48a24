use crate::audio::{Modality, Voice};
use crate::content::{Content, Part};

/// What the session controller asks for when it opens a Live session.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    system_instruction: String,
    response_modality: Modality,
    voice: Voice,
    input_transcription: bool,
    output_transcription: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            system_instruction: String::new(),
            response_modality: Modality::Audio,
            voice: Voice::default(),
            input_transcription: true,
            output_transcription: true,
        }
    }
}

impl LiveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn with_response_modality(mut self, modality: Modality) -> Self {
        self.response_modality = modality;
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_input_transcription(mut self, enabled: bool) -> Self {
        self.input_transcription = enabled;
        self
    }

    pub fn with_output_transcription(mut self, enabled: bool) -> Self {
        self.output_transcription = enabled;
        self
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn response_modality(&self) -> Modality {
        self.response_modality
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    pub fn input_transcription(&self) -> bool {
        self.input_transcription
    }

    pub fn output_transcription(&self) -> bool {
        self.output_transcription
    }

    /// Builds the `setup` message sent as the first frame of a session.
    pub fn to_setup(&self, model: impl Into<String>) -> Setup {
        let system_instruction = if self.system_instruction.is_empty() {
            None
        } else {
            Some(Content::new(vec![Part::text(self.system_instruction.clone())]))
        };
        Setup {
            model: model.into(),
            generation_config: GenerationConfig {
                response_modalities: vec![self.response_modality],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice.clone(),
                        },
                    },
                }),
            },
            system_instruction,
            input_audio_transcription: self.input_transcription.then(AudioTranscriptionConfig::default),
            output_audio_transcription: self.output_transcription.then(AudioTranscriptionConfig::default),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    model: String,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<AudioTranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<AudioTranscriptionConfig>,
}

impl Setup {
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    voice_name: Voice,
}

/// Empty object; its presence switches transcription on.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AudioTranscriptionConfig {}
