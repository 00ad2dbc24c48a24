use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::str::FromStr;

/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Sample rate the Live API expects for microphone input.
pub const INPUT_SAMPLE_RATE: u32 = 16000;
/// Sample rate of synthesized speech coming back from the Live API.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;
/// Declared mime type of every outbound audio frame.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Prebuilt voices offered by the Live API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Voice {
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
    Leda,
    Orus,
    Zephyr,
    Custom(String),
}

impl Voice {
    pub fn as_str(&self) -> &str {
        match self {
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Kore => "Kore",
            Voice::Fenrir => "Fenrir",
            Voice::Aoede => "Aoede",
            Voice::Leda => "Leda",
            Voice::Orus => "Orus",
            Voice::Zephyr => "Zephyr",
            Voice::Custom(s) => s,
        }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Voice::Zephyr
    }
}

impl From<&str> for Voice {
    fn from(s: &str) -> Self {
        match s {
            "Puck" => Voice::Puck,
            "Charon" => Voice::Charon,
            "Kore" => Voice::Kore,
            "Fenrir" => Voice::Fenrir,
            "Aoede" => Voice::Aoede,
            "Leda" => Voice::Leda,
            "Orus" => Voice::Orus,
            "Zephyr" => Voice::Zephyr,
            _ => Voice::Custom(s.to_string()),
        }
    }
}

impl FromStr for Voice {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Voice::from(s))
    }
}

impl Serialize for Voice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Voice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Voice::from(s.as_str()))
    }
}

/// Output modality requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
    Text,
}
