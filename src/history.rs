use std::sync::Mutex;

use crate::model::{FeedbackItem, SessionRecord};

/// Long-lived storage for finished sessions and the global feedback log.
pub trait HistoryStore: Send + Sync {
    /// Appends `record`, replacing any record with the same id.
    fn save_session(&self, record: SessionRecord);

    fn append_feedback(&self, item: FeedbackItem);

    fn sessions(&self) -> Vec<SessionRecord>;

    /// Newest first.
    fn feedback(&self) -> Vec<FeedbackItem>;
}

#[derive(Debug, Default)]
pub struct InMemoryHistory {
    sessions: Mutex<Vec<SessionRecord>>,
    feedback: Mutex<Vec<FeedbackItem>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistory {
    fn save_session(&self, record: SessionRecord) {
        match self.sessions.lock() {
            Ok(mut sessions) => {
                if let Some(existing) = sessions.iter_mut().find(|r| r.id == record.id) {
                    *existing = record;
                } else {
                    sessions.push(record);
                }
            }
            Err(_) => tracing::error!("failed to save session record"),
        }
    }

    fn append_feedback(&self, item: FeedbackItem) {
        match self.feedback.lock() {
            Ok(mut feedback) => feedback.push(item),
            Err(_) => tracing::error!("failed to append feedback"),
        }
    }

    fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn feedback(&self) -> Vec<FeedbackItem> {
        self.feedback
            .lock()
            .map(|f| f.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn record(summary: &str) -> SessionRecord {
        let mut record = SessionRecord::new(Local::now(), summary.into(), 1, vec![], vec![]);
        record.id = 42;
        record
    }

    #[test]
    fn saving_the_same_id_replaces() {
        let history = InMemoryHistory::new();
        history.save_session(record("first"));
        history.save_session(record("second"));
        let sessions = history.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].summary, "second");
    }

    #[test]
    fn feedback_is_listed_newest_first() {
        let history = InMemoryHistory::new();
        for text in ["one", "two"] {
            history.append_feedback(FeedbackItem {
                id: text.into(),
                original_text: text.into(),
                corrected_text: text.into(),
                comments: vec![],
                timestamp: String::new(),
            });
        }
        let ids: Vec<_> = history.feedback().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["two", "one"]);
    }
}
