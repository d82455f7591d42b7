//! Conversation-related types.

use serde::{Deserialize, Serialize};
use toolrelay_model::{ModelMessage, Role};

/// An ordered, append-only sequence of role-tagged turns.
///
/// Turns are never edited or removed once appended. The loop extends the
/// conversation with model text and tool output, and hands it back to the
/// caller when it is done.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<ModelMessage>,
}

/// One message of an externally supplied chat history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    /// Identifier of the author.
    pub author_id: String,
    /// The message text.
    pub text: String,
    /// When the message was sent, in any monotonic unit.
    pub timestamp: i64,
}

impl Conversation {
    /// Creates a conversation with a single user prompt.
    #[inline]
    pub fn from_prompt<S: Into<String>>(prompt: S) -> Self {
        Self {
            turns: vec![ModelMessage::user(prompt)],
        }
    }

    /// Ingests a chat history.
    ///
    /// Messages are ordered by timestamp, keeping the source order for
    /// equal timestamps. Messages written by `self_id` become assistant
    /// turns, everything else becomes a user turn.
    pub fn from_history<I>(history: I, self_id: &str) -> Self
    where
        I: IntoIterator<Item = HistoryMessage>,
    {
        let mut history: Vec<_> = history.into_iter().collect();
        history.sort_by_key(|msg| msg.timestamp);

        let turns = history
            .into_iter()
            .map(|msg| {
                if msg.author_id == self_id {
                    ModelMessage::assistant(msg.text)
                } else {
                    ModelMessage::user(msg.text)
                }
            })
            .collect();
        Self { turns }
    }

    /// Returns the turns in chronological order.
    #[inline]
    pub fn turns(&self) -> &[ModelMessage] {
        &self.turns
    }

    /// Returns the number of turns.
    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns whether the conversation has no turns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Appends a turn.
    #[inline]
    pub fn push(&mut self, turn: ModelMessage) {
        self.turns.push(turn);
    }

    /// Consumes the conversation and returns its turns.
    #[inline]
    pub fn into_turns(self) -> Vec<ModelMessage> {
        self.turns
    }

    /// Returns the text of the latest assistant turn.
    ///
    /// When a run stopped at the round limit this may be an intermediate
    /// remark rather than a final answer.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .filter(|turn| turn.role == Role::Assistant)
            .find_map(ModelMessage::text)
    }
}
