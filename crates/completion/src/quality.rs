//! Keyword lead-quality classifier for the scripted path

use once_cell::sync::Lazy;
use regex::Regex;

use call_assistant_core::QualityTier;

static HOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:emergency|urgent|urgently|asap|as soon as possible|right away|immediately|today|tonight|flood(?:ing|ed)?|burst|leak(?:ing)?|no heat|no hot water|book|booking|schedule|appointment|come out|send someone)\b",
    )
    .expect("valid hot regex")
});

static WARM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:price|prices|pricing|quote|quotes|estimate|estimates|cost|costs|how much|rate|rates|financing|availability|available|install|installation|replace|replacement)\b",
    )
    .expect("valid warm regex")
});

static COLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:just looking|just curious|just checking|just wondering|browsing|maybe later|not sure yet|some ?day|down the road|next year|no rush)\b",
    )
    .expect("valid cold regex")
});

/// Tier from what the caller said. Urgent or booking language wins over
/// pricing language, which wins over "just looking".
pub fn classify_quality(reason: Option<&str>, questions: &[String]) -> QualityTier {
    let mut text = reason.unwrap_or_default().to_string();
    for question in questions {
        text.push(' ');
        text.push_str(question);
    }

    if text.trim().is_empty() {
        QualityTier::Unknown
    } else if HOT.is_match(&text) {
        QualityTier::Hot
    } else if WARM.is_match(&text) {
        QualityTier::Warm
    } else if COLD.is_match(&text) {
        QualityTier::Cold
    } else {
        QualityTier::Unknown
    }
}
