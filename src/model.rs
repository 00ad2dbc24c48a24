use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Tutor,
}

/// One contiguous span of speech by one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub id: u64,
}

/// Reviewer output for a single utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub original_text: String,
    pub corrected_text: String,
    #[serde(default)]
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackItem {
    pub id: String,
    pub original_text: String,
    pub corrected_text: String,
    pub comments: Vec<String>,
    pub timestamp: String,
}

impl FeedbackItem {
    /// Gives reviewer output a fresh time-ordered id and a local timestamp.
    pub fn stamp(feedback: Feedback) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            original_text: feedback.original_text,
            corrected_text: feedback.corrected_text,
            comments: feedback.comments,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Persisted summary of one practice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Milliseconds since the epoch at which the session ended.
    pub id: i64,
    pub date: NaiveDate,
    pub summary: String,
    pub max_combo: u32,
    pub conversation: Vec<ConversationTurn>,
    pub feedback: Vec<FeedbackItem>,
}

impl SessionRecord {
    pub fn new(
        ended_at: DateTime<Local>,
        summary: String,
        max_combo: u32,
        conversation: Vec<ConversationTurn>,
        feedback: Vec<FeedbackItem>,
    ) -> Self {
        Self {
            id: ended_at.timestamp_millis(),
            date: ended_at.date_naive(),
            summary,
            max_combo,
            conversation,
            feedback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_is_keyed_by_the_end_instant() {
        let ended_at = Local.with_ymd_and_hms(2026, 3, 14, 21, 5, 0).unwrap();
        let record = SessionRecord::new(ended_at, "Talked about pie.".into(), 3, vec![], vec![]);
        assert_eq!(record.id, ended_at.timestamp_millis());
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
    }

    #[test]
    fn stamped_items_get_distinct_ids() {
        let feedback = Feedback {
            original_text: "I goed home".into(),
            corrected_text: "I went home".into(),
            comments: vec!["'go' is irregular.".into()],
        };
        let a = FeedbackItem::stamp(feedback.clone());
        let b = FeedbackItem::stamp(feedback);
        assert_ne!(a.id, b.id);
        assert_eq!(a.corrected_text, "I went home");
    }

    #[test]
    fn feedback_accepts_reviewer_json() {
        let feedback: Feedback = serde_json::from_str(
            r#"{"originalText":"He go","correctedText":"He goes","comments":["Third person -s."]}"#,
        )
        .unwrap();
        assert_eq!(feedback.comments.len(), 1);
    }
}
