use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::model::{ConversationTurn, Feedback, Speaker};
use crate::settings::FeedbackLanguage;

/// Request/response enrichment around a live session: grammar feedback for a
/// finished utterance and a one-line summary of the whole transcript.
///
/// The controller only sees this trait, so tests swap in `MockReviewer`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn feedback_for(&self, text: &str, language: FeedbackLanguage) -> Result<Feedback>;

    async fn summarize(&self, transcript: &[ConversationTurn]) -> Result<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        Some(text)
    }
}

/// Calls `generateContent` on the Gemini REST API.
pub struct ReviewerClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl ReviewerClient {
    pub fn new(base_url: String, api_key: SecretString, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    async fn generate(&self, body: serde_json::Value) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateResponse>()
            .await?;

        resp.text()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("No response from model"))
    }
}

fn feedback_prompt(text: &str, language: FeedbackLanguage) -> String {
    format!(
        "Analyze the following text from an English language learner. \
         Provide feedback on grammar, expression, and word choice. \
         If there are no errors, say so. \
         Write every comment in {language}. \
         The text to analyze is: \"{text}\"",
        language = language.english_name(),
    )
}

fn feedback_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "originalText": { "type": "STRING" },
            "correctedText": {
                "type": "STRING",
                "description": "A corrected version of the text. If no correction is needed, this should be the same as the original text."
            },
            "comments": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Concise comments explaining the corrections or offering suggestions. If there are no errors, one encouraging comment."
            }
        },
        "required": ["originalText", "correctedText", "comments"]
    })
}

fn summary_prompt(transcript: &[ConversationTurn]) -> String {
    let lines = transcript
        .iter()
        .map(|turn| {
            let who = match turn.speaker {
                Speaker::User => "Learner",
                Speaker::Tutor => "Tutor",
            };
            format!("{who}: {}", turn.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Summarize this English practice conversation in one short sentence \
         describing what the learner talked about. Reply with the sentence only.\n\n{lines}"
    )
}

#[async_trait]
impl Reviewer for ReviewerClient {
    async fn feedback_for(&self, text: &str, language: FeedbackLanguage) -> Result<Feedback> {
        if text.trim().is_empty() {
            anyhow::bail!("nothing to review");
        }
        let body = serde_json::json!({
            "contents": [
                { "role": "user", "parts": [{ "text": feedback_prompt(text, language) }] }
            ],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": feedback_schema()
            }
        });
        let answer = self.generate(body).await?;
        serde_json::from_str::<Feedback>(answer.trim())
            .map_err(|e| anyhow::anyhow!("Failed to parse feedback JSON: {e}"))
    }

    async fn summarize(&self, transcript: &[ConversationTurn]) -> Result<String> {
        let body = serde_json::json!({
            "contents": [
                { "role": "user", "parts": [{ "text": summary_prompt(transcript) }] }
            ]
        });
        let answer = self.generate(body).await?;
        answer
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Empty summary"))
    }
}
