use crate::model::{ConversationTurn, Speaker};

/// Assembles transcription fragments into turns.
///
/// A fragment grows the last turn when the speaker is unchanged, otherwise
/// it opens a new turn. The per-speaker accumulators hold the text of the
/// utterance in progress and are cleared at every turn-complete boundary.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
    user: String,
    tutor: String,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fragment(&mut self, speaker: Speaker, fragment: &str) {
        match speaker {
            Speaker::User => self.user.push_str(fragment),
            Speaker::Tutor => self.tutor.push_str(fragment),
        }
        match self.turns.last_mut() {
            Some(last) if last.speaker == speaker => last.text.push_str(fragment),
            _ => {
                self.next_id += 1;
                self.turns.push(ConversationTurn {
                    speaker,
                    text: fragment.to_string(),
                    id: self.next_id,
                });
            }
        }
    }

    /// Clears both accumulators and returns what the user said since the
    /// previous boundary.
    pub fn complete_turn(&mut self) -> String {
        self.tutor.clear();
        std::mem::take(&mut self.user)
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Hands over the turns and resets everything, ids included.
    pub fn take(&mut self) -> Vec<ConversationTurn> {
        let turns = std::mem::take(&mut self.turns);
        self.clear();
        turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.user.clear();
        self.tutor.clear();
        self.next_id = 0;
    }
}
