//! Scripted assistant lines

use call_assistant_core::{digits_only, BusinessProfile, CollectedInfo};

pub const ASK_NAME: &str = "May I have your name, please?";
pub const ASK_REASON: &str = "And what's the reason for your call today?";
pub const ANYTHING_ELSE: &str = "Is there anything else I can help you with?";
pub const NO_INPUT_REPROMPT: &str = "I'm sorry, I didn't catch that.";
pub const LOW_CONFIDENCE_REPROMPT: &str =
    "I'm sorry, I had trouble understanding. Could you say that again?";
pub const NO_INPUT_END: &str =
    "I'm sorry, I'm having trouble hearing you. Please try calling back. Goodbye.";
pub const LOST_STATE: &str =
    "I'm sorry, something went wrong on our end and I've lost track of this call. Please call back. Goodbye.";
pub const GENERIC_APOLOGY: &str = "I'm sorry, something went wrong on our end.";
pub const DEFLECTION: &str =
    "That's a good question. Someone from our team will call you back with the details.";
pub const REASON_NOTED: &str =
    "Thank you, I've noted that and someone from our team will follow up with you.";

/// Opening line: business greeting plus the name question
pub fn greeting(business: &BusinessProfile) -> String {
    format!("{} {}", business.greeting_line(), ASK_NAME)
}

pub fn ask_phone(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("Thanks, {}. What's the best phone number to reach you?", name),
        None => "Thanks. What's the best phone number to reach you?".to_string(),
    }
}

/// Reprompt after an empty turn, repeating the pending question
pub fn no_input(pending_question: Option<&str>) -> String {
    match pending_question {
        Some(question) => format!("{} {}", NO_INPUT_REPROMPT, question),
        None => NO_INPUT_REPROMPT.to_string(),
    }
}

/// Read a number digit by digit, grouped the way people say them
pub fn spoken_phone(phone: &str) -> String {
    let digits = digits_only(phone);
    let spaced = |s: &str| {
        s.chars()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    };
    if digits.len() == 10 {
        format!(
            "{}, {}, {}",
            spaced(&digits[..3]),
            spaced(&digits[3..6]),
            spaced(&digits[6..])
        )
    } else {
        spaced(&digits)
    }
}

/// Goodbye at any stage
pub fn farewell(business_name: &str, caller_name: Option<&str>) -> String {
    match caller_name {
        Some(name) => format!("Thanks for calling {}, {}. Goodbye!", business_name, name),
        None => format!("Thanks for calling {}. Goodbye!", business_name),
    }
}

/// End of the follow-up stage, repeating back what was captured
pub fn closing(business_name: &str, collected: &CollectedInfo) -> String {
    let thanks = match collected.name.as_deref() {
        Some(name) => format!("Thank you, {}.", name),
        None => "Thank you.".to_string(),
    };
    let follow_up = match collected.phone.as_deref() {
        Some(phone) => format!(
            "Someone from our team will call you back at {}.",
            spoken_phone(phone)
        ),
        None => "Someone from our team will be in touch soon.".to_string(),
    };
    format!(
        "{} {} Thanks for calling {}. Goodbye!",
        thanks, follow_up, business_name
    )
}

/// Answer followed by the follow-up question
pub fn answer_then_continue(answer: &str) -> String {
    format!("{} {}", answer.trim(), ANYTHING_ELSE)
}
