//! Gateway call-control responses
//!
//! Every reply to the telephony gateway is a small XML document: speak the
//! prompt inside a speech `Gather` to keep listening, or speak it and hang
//! up. A `Gather` that hears nothing falls through to a `Redirect` back to
//! the gather callback, which arrives as an empty turn.

use axum::http::header;
use axum::response::{IntoResponse, Response};

use call_assistant_agent::TurnOutcome;
use call_assistant_config::DialogueConfig;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Voice and recognition settings applied to every `Say` and `Gather`
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub voice: String,
    pub language: String,
    pub speech_timeout: String,
}

impl From<&DialogueConfig> for VoiceSettings {
    fn from(config: &DialogueConfig) -> Self {
        Self {
            voice: config.voice.clone(),
            language: config.language.clone(),
            speech_timeout: config.speech_timeout.clone(),
        }
    }
}

/// Escape text for XML content and attribute values
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn say(prompt: &str, settings: &VoiceSettings) -> String {
    format!(
        r#"<Say voice="{}" language="{}">{}</Say>"#,
        escape_xml(&settings.voice),
        escape_xml(&settings.language),
        escape_xml(prompt)
    )
}

/// Speak `prompt` and listen for the caller's reply
pub fn gather(prompt: &str, action_url: &str, settings: &VoiceSettings) -> String {
    let action = escape_xml(action_url);
    format!(
        r#"{XML_HEADER}
<Response>
  <Gather input="speech" action="{action}" method="POST" speechTimeout="{timeout}" language="{language}">
    {say}
  </Gather>
  <Redirect method="POST">{action}</Redirect>
</Response>"#,
        timeout = escape_xml(&settings.speech_timeout),
        language = escape_xml(&settings.language),
        say = say(prompt, settings),
    )
}

/// Speak `prompt` and end the call
pub fn hangup(prompt: &str, settings: &VoiceSettings) -> String {
    format!(
        r#"{XML_HEADER}
<Response>
  {}
  <Hangup/>
</Response>"#,
        say(prompt, settings)
    )
}

/// Render a dialogue outcome
pub fn from_outcome(outcome: &TurnOutcome, action_url: &str, settings: &VoiceSettings) -> String {
    if outcome.is_hangup() {
        hangup(&outcome.prompt, settings)
    } else {
        gather(&outcome.prompt, action_url, settings)
    }
}

/// XML body with the content type the gateway expects
#[derive(Debug, Clone)]
pub struct Twiml(pub String);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], self.0).into_response()
    }
}
