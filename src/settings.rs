use serde::{Deserialize, Serialize};

/// Language the grammar comments are written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLanguage {
    #[default]
    Ko,
    Ja,
    Zh,
}

impl FeedbackLanguage {
    pub fn code(&self) -> &'static str {
        match self {
            FeedbackLanguage::Ko => "ko",
            FeedbackLanguage::Ja => "ja",
            FeedbackLanguage::Zh => "zh",
        }
    }

    pub fn english_name(&self) -> &'static str {
        match self {
            FeedbackLanguage::Ko => "Korean",
            FeedbackLanguage::Ja => "Japanese",
            FeedbackLanguage::Zh => "Chinese",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TutorSpeed {
    #[default]
    Default,
    SlightlySlower,
    Slower,
}

/// Learner preferences, read once at every session start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub name: String,
    pub age: Option<u32>,
    pub description: String,
    pub language: FeedbackLanguage,
    pub theme: Theme,
    pub speed: TutorSpeed,
}
