//! Deterministic FAQ matching, tried before any language-model call

use call_assistant_core::FaqEntry;

/// Filler words ignored when deriving keywords from an FAQ question
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "could", "did", "do", "does", "for", "get", "have", "how",
    "i", "if", "in", "is", "it", "me", "much", "my", "of", "offer", "on", "or", "our", "provide",
    "the", "there", "to", "we", "what", "when", "where", "which", "who", "why", "will", "with",
    "would", "you", "your", "yours", "need", "want", "any", "about", "this", "that", "be",
];

/// Share of derived keywords that must appear for a match
const MIN_DERIVED_COVERAGE: f32 = 0.5;

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect()
}

/// Crude singular form so "hour" matches "hours" and "prices" matches "price"
fn stem(word: &str) -> &str {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        &word[..word.len() - 1]
    } else {
        word
    }
}

fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(|w| stem(w.trim_matches('\'')).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn derived_keywords(question: &str) -> Vec<String> {
    tokens(question)
        .into_iter()
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Keyword/substring matcher over a business's FAQ table
#[derive(Debug, Clone, Default)]
pub struct FaqResolver;

impl FaqResolver {
    pub fn new() -> Self {
        Self
    }

    /// Best matching entry for the utterance, if any.
    ///
    /// Explicit keywords match as substrings of the normalized utterance;
    /// without them, at least half of the question's content words must
    /// appear. Higher coverage wins, earlier entries break ties.
    pub fn resolve<'a>(&self, utterance: &str, faqs: &'a [FaqEntry]) -> Option<&'a FaqEntry> {
        let normalized = normalize(utterance);
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return None;
        }
        let utterance_tokens = tokens(utterance);

        let mut best: Option<(&FaqEntry, f32)> = None;

        for entry in faqs {
            let question = normalize(&entry.question);
            let question = question.split_whitespace().collect::<Vec<_>>().join(" ");

            let score = if !question.is_empty() && normalized.contains(&question) {
                // Caller repeated the question itself
                2.0
            } else if !entry.keywords.is_empty() {
                let hits = entry
                    .keywords
                    .iter()
                    .map(|k| normalize(k).split_whitespace().collect::<Vec<_>>().join(" "))
                    .filter(|k| !k.is_empty() && normalized.contains(k.as_str()))
                    .count();
                if hits == 0 {
                    continue;
                }
                1.0 + hits as f32 / entry.keywords.len() as f32
            } else {
                let keywords = derived_keywords(&entry.question);
                if keywords.is_empty() {
                    continue;
                }
                let hits = keywords
                    .iter()
                    .filter(|k| utterance_tokens.iter().any(|t| t == *k))
                    .count();
                let coverage = hits as f32 / keywords.len() as f32;
                if hits == 0 || coverage < MIN_DERIVED_COVERAGE {
                    continue;
                }
                coverage
            };

            if best.map_or(true, |(_, s)| score > s) {
                best = Some((entry, score));
            }
        }

        if let Some((entry, score)) = best {
            tracing::debug!(question = %entry.question, score, "FAQ matched");
        }

        best.map(|(entry, _)| entry)
    }
}
