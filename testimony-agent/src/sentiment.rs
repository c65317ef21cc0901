//! Sentiment probe.
//!
//! Telemetry only: the score is recorded on the testimonial set and nothing
//! downstream reads it. The probe sees the transcript as read-only history
//! and never appends to it.

use tracing::{debug, warn};

use crate::backend::Generator;
use crate::prompts;
use crate::survey::DocumentId;
use crate::transcript::Transcript;

#[derive(Clone)]
pub struct SentimentProbe {
    generator: Generator,
}

impl SentimentProbe {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    /// Normalised sentiment in `[0, 1]`, or `None` if the call or parse failed.
    pub async fn score(&self, document_id: &DocumentId, transcript: &Transcript) -> Option<f64> {
        let reply = match self
            .generator
            .generate(
                prompts::SENTIMENT_SYSTEM,
                transcript.snapshot(),
                prompts::SENTIMENT_PROMPT,
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "sentiment probe failed");
                return None;
            }
        };

        let score = parse_score(&reply);
        if score.is_none() {
            warn!(document_id = %document_id, "sentiment reply had no number");
        }
        debug!(document_id = %document_id, score = ?score, "sentiment scored");
        score
    }
}

/// First decimal number in `text`, clamped to `[0, 1]`.
pub fn parse_score(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let mut seen_dot = false;
    let end = text[start..]
        .char_indices()
        .find(|&(_, c)| {
            if c == '.' && !seen_dot {
                seen_dot = true;
                return false;
            }
            !c.is_ascii_digit()
        })
        .map(|(i, _)| start + i)
        .unwrap_or(text.len());

    let number = text[start..end].trim_end_matches('.');
    number.parse::<f64>().ok().map(|v| v.clamp(0.0, 1.0))
}
