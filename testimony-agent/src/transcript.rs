//! Conversation transcript shared across the dependent stage calls.
//!
//! Append-only: turns are never edited or removed, and their order is the
//! order in which the owning run appended them.

use serde::{Deserialize, Serialize};

use crate::backend::traits::Message;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnRole {
    #[serde(rename = "human")]
    Human,
    #[serde(rename = "ai")]
    Generated,
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    /// Backend message for this turn.
    pub fn to_message(&self) -> Message {
        match self.role {
            TurnRole::Human => Message::user(self.text.clone()),
            TurnRole::Generated => Message::assistant(self.text.clone()),
        }
    }
}

/// Persisted form of a turn: `{"type": "human" | "ai", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedTurn {
    #[serde(rename = "type")]
    pub role: TurnRole,
    pub content: String,
}

/// Ordered, append-only log of turns owned by a single pipeline run.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transcript from its persisted form.
    pub fn from_serialized(turns: &[SerializedTurn]) -> Self {
        Self {
            turns: turns
                .iter()
                .map(|t| Turn {
                    role: t.role,
                    text: t.content.clone(),
                })
                .collect(),
        }
    }

    pub fn append(&mut self, role: TurnRole, text: impl Into<String>) {
        self.turns.push(Turn {
            role,
            text: text.into(),
        });
    }

    /// The full ordered sequence.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn serialize(&self) -> Vec<SerializedTurn> {
        self.turns
            .iter()
            .map(|t| SerializedTurn {
                role: t.role,
                content: t.text.clone(),
            })
            .collect()
    }

    /// Render the transcript as a JSON literal for embedding in a prompt.
    pub fn to_prompt_literal(&self) -> String {
        serde_json::to_string(&self.serialize()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut transcript = Transcript::new();
        transcript.append(TurnRole::Human, "one");
        transcript.append(TurnRole::Generated, "two");
        transcript.append(TurnRole::Human, "three");

        let texts: Vec<&str> = transcript.snapshot().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }

    #[test]
    fn test_serialize_uses_human_and_ai_tags() {
        let mut transcript = Transcript::new();
        transcript.append(TurnRole::Human, "question");
        transcript.append(TurnRole::Generated, "answer");

        let json = serde_json::to_value(transcript.serialize()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"type": "human", "content": "question"},
                {"type": "ai", "content": "answer"}
            ])
        );
    }

    #[test]
    fn test_from_serialized_restores_turns() {
        let mut original = Transcript::new();
        original.append(TurnRole::Human, "a");
        original.append(TurnRole::Generated, "b");

        let restored = Transcript::from_serialized(&original.serialize());
        assert_eq!(restored.snapshot(), original.snapshot());
    }

    #[test]
    fn test_turn_maps_to_backend_roles() {
        let human = Turn {
            role: TurnRole::Human,
            text: "x".into(),
        };
        let generated = Turn {
            role: TurnRole::Generated,
            text: "y".into(),
        };
        assert_eq!(human.to_message(), Message::user("x"));
        assert_eq!(generated.to_message(), Message::assistant("y"));
    }
}
