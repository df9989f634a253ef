use std::sync::Arc;
use tracing::{debug, error, warn};

use super::parse::parse_verdict;
use super::{ChatBackend, ChatMessage};
use crate::Result;
use crate::types::Verdict;

const SYSTEM_PROMPT: &str = "You are an extremely strict and efficient binary classification agent. \
Your task is to analyze the provided TEXT to answer the given QUESTION. \
You **MUST** respond in strict JSON format. \
No extra text, explanation, introduction, or markdown is allowed. \
The JSON schema is: {\"answer\": true|false, \"confidence\": number}. \
The 'confidence' must be a floating-point number between 0.00 and 1.00, \
reflecting the certainty of your 'answer'. \
**Respond directly and ONLY with the JSON output.**";

/// Yes/no classifier over a chat backend
///
/// [`classify`](Classifier::classify) never fails: empty input, backend
/// errors and unreadable responses all yield a negative verdict.
#[derive(Clone)]
pub struct Classifier {
    backend: Arc<dyn ChatBackend>,
}

impl Classifier {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Provider name of the wrapped backend
    pub fn provider(&self) -> &str {
        self.backend.provider()
    }

    /// Transcript sent to the backend for one classification
    pub fn build_messages(question: &str, title: &str, abstract_text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "QUESTION: {question}\n\nTITLE: {title}\n\nABSTRACT: {abstract_text}"
            )),
        ]
    }

    /// Classify an item against a question
    pub async fn classify(&self, question: &str, title: &str, abstract_text: &str) -> Verdict {
        match self.try_classify(question, title, abstract_text).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(provider = self.provider(), error = %e, "classification failed");
                Verdict::negative()
            }
        }
    }

    /// Like [`classify`](Classifier::classify) but surfaces backend errors
    pub async fn try_classify(
        &self,
        question: &str,
        title: &str,
        abstract_text: &str,
    ) -> Result<Verdict> {
        if question.trim().is_empty() || title.trim().is_empty() || abstract_text.trim().is_empty()
        {
            warn!("missing question, title or abstract; returning negative verdict");
            return Ok(Verdict::negative());
        }

        let messages = Self::build_messages(question, title, abstract_text);
        let response = self.backend.submit(&messages).await?;

        let Some(parsed) = parse_verdict(&response) else {
            warn!(
                provider = self.provider(),
                response = %response,
                "unreadable backend response; defaulting to negative"
            );
            return Ok(Verdict::negative());
        };

        let answer = parsed.answer.unwrap_or_else(|| {
            warn!(provider = self.provider(), "unclear answer; defaulting to negative");
            false
        });
        debug!(answer, confidence = ?parsed.confidence, "verdict parsed");
        Ok(Verdict {
            answer,
            confidence: parsed.confidence,
        })
    }
}
