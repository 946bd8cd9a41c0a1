//! Open-question answering through the completion service

use std::sync::Arc;

use async_trait::async_trait;

use call_assistant_core::{BusinessContext, Turn, TurnRole};
use call_assistant_llm::{LlmBackend, Message};

use crate::AgentError;

/// Longest answer we will speak
pub const MAX_ANSWER_CHARS: usize = 320;

/// Prior turns sent along with a question
const HISTORY_TURNS: usize = 6;

/// Answers a question the FAQ table could not
#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        context: &BusinessContext,
        history: &[Turn],
    ) -> Result<String, AgentError>;
}

/// [`QuestionAnswerer`] backed by an LLM with a fixed receptionist persona
pub struct LlmQuestionAnswerer {
    backend: Arc<dyn LlmBackend>,
    max_chars: usize,
}

impl LlmQuestionAnswerer {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            max_chars: MAX_ANSWER_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn system_prompt(context: &BusinessContext) -> String {
        let mut prompt = format!(
            "You are the phone receptionist for {}. You are speaking to a caller on the phone. \
             Answer in one or two short, plain sentences that sound natural when read aloud. \
             No lists, no markdown, no emojis. Only state facts given below. If you are not \
             sure, say that someone from the team will call them back with the details. Never \
             quote prices, make appointments or promise anything.",
            context.business_name
        );

        if !context.services.is_empty() {
            prompt.push_str(&format!("\n\nServices: {}.", context.services.join(", ")));
        }
        if let Some(hours) = &context.hours {
            prompt.push_str(&format!("\nHours: {}.", hours.trim_end_matches('.')));
        }
        if !context.faqs.is_empty() {
            prompt.push_str("\n\nKnown answers:");
            for faq in &context.faqs {
                prompt.push_str(&format!("\n- Q: {} A: {}", faq.question, faq.answer));
            }
        }

        prompt
    }

    fn build_messages(question: &str, context: &BusinessContext, history: &[Turn]) -> Vec<Message> {
        let mut messages = vec![Message::system(Self::system_prompt(context))];

        let start = history.len().saturating_sub(HISTORY_TURNS);
        for turn in &history[start..] {
            messages.push(match turn.role {
                TurnRole::Caller => Message::user(turn.text.clone()),
                TurnRole::Assistant => Message::assistant(turn.text.clone()),
            });
        }

        // The question is usually already the last caller turn
        let already_last = history
            .last()
            .map_or(false, |t| t.role == TurnRole::Caller && t.text == question);
        if !already_last {
            messages.push(Message::user(question.to_string()));
        }

        messages
    }
}

/// Make model output speakable: strip markup, collapse whitespace and cut at
/// a sentence boundary within `max_chars`.
pub fn speakable(text: &str, max_chars: usize) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '#' | '`' | '_' | '<' | '>'))
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.chars().count() <= max_chars {
        return cleaned;
    }

    let truncated: String = cleaned.chars().take(max_chars).collect();
    match truncated.rfind(|c| matches!(c, '.' | '!' | '?')) {
        Some(end) if end > 0 => truncated[..=end].to_string(),
        _ => match truncated.rfind(' ') {
            Some(space) => format!("{}.", truncated[..space].trim_end_matches(',')),
            None => truncated,
        },
    }
}

#[async_trait]
impl QuestionAnswerer for LlmQuestionAnswerer {
    async fn answer(
        &self,
        question: &str,
        context: &BusinessContext,
        history: &[Turn],
    ) -> Result<String, AgentError> {
        let messages = Self::build_messages(question, context, history);
        let result = self.backend.generate(&messages).await?;

        let answer = speakable(&result.text, self.max_chars);
        if answer.is_empty() {
            return Err(AgentError::Answerer("empty answer".to_string()));
        }

        tracing::debug!(
            model = %self.backend.model_name(),
            chars = answer.len(),
            total_time_ms = result.total_time_ms,
            "Answered open question"
        );

        Ok(answer)
    }
}
