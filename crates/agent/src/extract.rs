//! Heuristic extraction from recognized speech
//!
//! Speech recognition hands us lower-case-ish free text with little
//! punctuation ("yeah my name is sam jones", "five five five one two three
//! four"). These helpers pull the scripted fields out of it without a
//! language model.

use once_cell::sync::Lazy;
use regex::Regex;

use call_assistant_core::phone::{MAX_PHONE_DIGITS, MIN_PHONE_DIGITS};

/// Longest name we accept, in words
const MAX_NAME_WORDS: usize = 3;

static NAME_INTRO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(my name is|my name's|name is|name's|this is|it's|it is|i'm|i am|call me)\s+([a-z][a-z'\-]*(?:\s+[a-z][a-z'\-]*){0,2})",
    )
    .expect("valid name regex")
});

/// A farewell on its own: "bye", "goodbye", "bye bye", "bye for now"
const FAREWELL: &str = r"(?:good\s?bye|bye(?:\s?bye)?)(?:\s+(?:now|then|for now))?";

/// Farewell opening a clause ("ok bye, thanks") or closing one ("thanks so
/// much, goodbye", "I'm going to hang up now")
static GOODBYE_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:(?:ok|okay|alright|all right|well|thanks|thank you|never mind)\s+)*{farewell}\b|\b(?:{farewell}|talk to you later|hang(?:ing)? up now)$",
        farewell = FAREWELL
    ))
    .expect("valid goodbye regex")
});

static NEGATIVE_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:nothing else|nothing more|that's all|that is all|that's it|that is it|that'll be it|i'm good|i am good|i'm all set|all set|i think that's everything|not right now|no more questions|that covers it)\b",
    )
    .expect("valid negative regex")
});

static QUESTION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:what|when|where|who|why|how|which|do|does|did|can|could|is|are|will|would|should)\b",
    )
    .expect("valid question regex")
});

/// Words that are never part of a name
const NAME_STOPWORDS: &[&str] = &[
    "uh", "um", "er", "hmm", "yeah", "yes", "yep", "hi", "hello", "hey", "ok", "okay", "so",
    "well", "oh", "sure", "the", "a", "and", "my", "name", "is", "its", "it's", "this", "me",
    "i", "i'm", "am", "just", "here", "speaking", "sorry", "please", "thanks", "thank", "you",
];

/// Words that end a name: "this is sam calling about..."
const NAME_BREAKERS: &[&str] = &[
    "calling", "looking", "about", "trying", "wondering", "hoping", "interested", "wanting",
    "needing", "having", "asking", "reaching", "phoning", "regarding", "because", "from", "with",
    "for", "at", "in", "on", "to", "not", "gonna", "going",
];

/// Intros that also start "i'm calling about...", "i am looking for..."
fn is_self_intro(intro: &str) -> bool {
    matches!(intro.to_lowercase().as_str(), "i'm" | "i am")
}

fn is_gerund(word: &str) -> bool {
    let word = word.to_lowercase();
    word.len() > 4 && word.ends_with("ing")
}

const NEGATIVE_LEADS: &[&str] = &["no", "nope", "nah", "not really", "no thanks", "no thank you"];

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

fn clean_name(words: &[&str]) -> Option<String> {
    let words: Vec<&str> = words
        .iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphabetic() && c != '\'' && c != '-'))
        .filter(|w| !w.is_empty() && !NAME_STOPWORDS.contains(&w.to_lowercase().as_str()))
        .take_while(|w| !NAME_BREAKERS.contains(&w.to_lowercase().as_str()))
        .take(MAX_NAME_WORDS)
        .collect();

    if words.is_empty() || words.iter().any(|w| w.chars().any(|c| c.is_ascii_digit())) {
        return None;
    }

    Some(words.iter().map(|w| title_case(w)).collect::<Vec<_>>().join(" "))
}

/// Pull a caller's name out of an answer to "may I have your name?"
pub fn extract_name(utterance: &str) -> Option<String> {
    let text = utterance.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = NAME_INTRO.captures(text) {
        let words: Vec<&str> = caps[2].split_whitespace().collect();
        let doing_not_naming =
            is_self_intro(&caps[1]) && words.first().is_some_and(|w| is_gerund(w));
        if doing_not_naming {
            return None;
        }
        if let Some(name) = clean_name(&words) {
            return Some(name);
        }
    }

    // A bare answer like "sam" or "uh sam jones"
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= MAX_NAME_WORDS + 2 {
        return clean_name(&words);
    }

    None
}

fn spoken_digit(word: &str) -> Option<char> {
    Some(match word {
        "zero" | "oh" | "o" => '0',
        "one" => '1',
        "two" | "to" | "too" => '2',
        "three" => '3',
        "four" | "for" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        _ => return None,
    })
}

/// Pull a phone number out of digits and spoken digit words
/// ("my number is five five five, one two three, double four five six").
/// Returns the digits, with a leading `+` when one was spoken as a symbol.
pub fn extract_phone(utterance: &str) -> Option<String> {
    let lowered = utterance.to_lowercase();
    let mut digits = String::new();
    let mut repeat = 1;

    for token in lowered.split(|c: char| c.is_whitespace() || c == ',' || c == '.') {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        if token.is_empty() {
            continue;
        }

        if token.chars().all(|c| c.is_ascii_digit()) {
            for _ in 0..repeat {
                digits.push_str(token);
            }
            repeat = 1;
            continue;
        }

        // Formatted chunks such as 555-1234 or (555)
        if token.chars().any(|c| c.is_ascii_digit()) {
            digits.extend(token.chars().filter(|c| c.is_ascii_digit()));
            repeat = 1;
            continue;
        }

        match token {
            "double" => repeat = 2,
            "triple" => repeat = 3,
            word => {
                if let Some(d) = spoken_digit(word) {
                    // "to"/"for" only count once we are inside a number
                    let filler = matches!(word, "to" | "too" | "for" | "o");
                    if filler && digits.is_empty() {
                        continue;
                    }
                    for _ in 0..repeat {
                        digits.push(d);
                    }
                }
                repeat = 1;
            }
        }
    }

    if digits.len() < MIN_PHONE_DIGITS || digits.len() > MAX_PHONE_DIGITS {
        return None;
    }

    if utterance.trim_start().starts_with('+') {
        Some(format!("+{}", digits))
    } else {
        Some(digits)
    }
}

/// Explicit goodbye at the start or end of any clause. Mentions of leaving
/// or hanging up in the middle of a sentence are not farewells.
pub fn is_goodbye(utterance: &str) -> bool {
    utterance
        .split(|c: char| matches!(c, ',' | '.' | ';' | '!' | '?'))
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .any(|clause| GOODBYE_CLAUSE.is_match(clause))
}

/// "Anything else?" answered with no
pub fn is_negative(utterance: &str) -> bool {
    let text = utterance.trim().to_lowercase();
    let text = text.trim_end_matches(|c: char| c == '.' || c == '!');
    if text.is_empty() || text.contains('?') {
        return false;
    }

    if NEGATIVE_PHRASE.is_match(text) {
        return true;
    }

    let words: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
        .collect();
    // "no", "nope thanks", "no that's fine"; longer answers carry a question
    words.len() <= 4
        && NEGATIVE_LEADS.iter().any(|lead| {
            let lead_words: Vec<&str> = lead.split(' ').collect();
            words.len() >= lead_words.len() && words[..lead_words.len()] == lead_words[..]
        })
}

/// Whether an utterance reads as a question
pub fn is_question(utterance: &str) -> bool {
    let text = utterance.trim();
    text.contains('?') || QUESTION_START.is_match(text)
}
