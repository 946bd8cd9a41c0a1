//! Business profile as provided by the profile configuration store

use serde::{Deserialize, Serialize};

/// One row of a business's FAQ table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
    /// Extra trigger words; when empty the question text supplies them
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl FaqEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }
}

/// Where lead notifications go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Primary recipient
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub cc: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            email: None,
            cc: Vec::new(),
        }
    }
}

/// Business profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub id: String,
    pub name: String,
    /// Gateway numbers that ring this business
    #[serde(default)]
    pub phone_numbers: Vec<String>,
    /// Custom opening line; the default greeting names the business
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub faqs: Vec<FaqEntry>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub hours: Option<String>,
    #[serde(default)]
    pub notifications: NotificationPreferences,
}

impl BusinessProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            phone_numbers: Vec::new(),
            greeting: None,
            faqs: Vec::new(),
            services: Vec::new(),
            hours: None,
            notifications: NotificationPreferences::default(),
        }
    }

    pub fn with_faq(mut self, faq: FaqEntry) -> Self {
        self.faqs.push(faq);
        self
    }

    pub fn with_services(mut self, services: &[&str]) -> Self {
        self.services = services.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_notification_email(mut self, email: impl Into<String>) -> Self {
        self.notifications.email = Some(email.into());
        self
    }

    /// Opening line spoken when the call is answered
    pub fn greeting_line(&self) -> String {
        match &self.greeting {
            Some(greeting) if !greeting.trim().is_empty() => greeting.trim().to_string(),
            _ => format!("Thanks for calling {}.", self.name),
        }
    }
}
