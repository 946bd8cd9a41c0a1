//! Lead notification email
//!
//! Delivery is behind [`EmailTransport`] so development setups can log
//! emails instead of sending them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use call_assistant_config::{EmailTransportKind, NotificationConfig};
use call_assistant_core::{format_transcript, BusinessProfile, Lead, NotificationRecord};

use crate::CompletionError;

/// Characters of the reason shown in the subject line
const SUBJECT_REASON_CHARS: usize = 60;

/// Outgoing email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

/// Email delivery
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), CompletionError>;

    fn name(&self) -> &'static str;
}

/// JSON POST to an HTTP email API with a bearer key
pub struct HttpEmailTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpEmailTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), CompletionError> {
        let mut request = self.client.post(&self.endpoint).json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Notification(format!(
                "email API returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        tracing::debug!(to = ?message.to, "Email accepted by API");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Simulated delivery: the email is logged, not sent
#[derive(Debug, Clone, Default)]
pub struct LogEmailTransport;

impl LogEmailTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailTransport for LogEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), CompletionError> {
        tracing::info!(
            to = ?message.to,
            subject = %message.subject,
            body_chars = message.text.len(),
            "Simulated email delivery"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Transport selected by configuration
pub fn build_transport(
    config: &NotificationConfig,
) -> Result<Arc<dyn EmailTransport>, CompletionError> {
    match config.transport {
        EmailTransportKind::Log => Ok(Arc::new(LogEmailTransport::new())),
        EmailTransportKind::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                CompletionError::Configuration("notifications.endpoint is required".into())
            })?;
            Ok(Arc::new(HttpEmailTransport::new(
                endpoint,
                config.api_key.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}

/// Builds and sends the lead email, always producing a [`NotificationRecord`]
pub struct NotificationDispatcher {
    transport: Arc<dyn EmailTransport>,
    from_address: String,
    operator_alert_address: Option<String>,
    excerpt_chars: usize,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn EmailTransport>, config: &NotificationConfig) -> Self {
        Self {
            transport,
            from_address: config.from_address.clone(),
            operator_alert_address: config
                .operator_alert_address
                .clone()
                .filter(|a| !a.trim().is_empty()),
            excerpt_chars: config.transcript_excerpt_chars,
        }
    }

    /// Primary plus CC, de-duplicated case-insensitively in order. Falls back
    /// to the operator alert address when the business has none.
    pub fn recipients(&self, business: &BusinessProfile) -> Vec<String> {
        let prefs = &business.notifications;
        let mut recipients: Vec<String> = Vec::new();

        for address in prefs.email.iter().chain(prefs.cc.iter()) {
            let address = address.trim();
            if address.is_empty() {
                continue;
            }
            if !recipients.iter().any(|r| r.eq_ignore_ascii_case(address)) {
                recipients.push(address.to_string());
            }
        }

        if recipients.is_empty() {
            if let Some(operator) = &self.operator_alert_address {
                recipients.push(operator.clone());
            }
        }

        recipients
    }

    pub fn compose(&self, business: &BusinessProfile, lead: &Lead, to: Vec<String>) -> EmailMessage {
        let short_reason = lead
            .reason
            .as_deref()
            .map(|r| shorten(r, SUBJECT_REASON_CHARS))
            .unwrap_or_else(|| "No reason given".to_string());
        let subject = format!("New Lead – {} – {}", lead.display_name(), short_reason);

        let mut text = format!("New lead for {}\n\n", business.name);

        text.push_str("Summary\n-------\n");
        text.push_str(lead.ai_summary.text.as_deref().unwrap_or("No summary available."));
        text.push_str("\n\n");

        text.push_str("Captured details\n----------------\n");
        let rows = [
            ("Name", lead.display_name().to_string()),
            ("Phone", lead.phone.clone()),
            ("Reason", lead.reason.clone().unwrap_or_else(|| "-".into())),
            ("Quality", lead.quality.as_str().to_string()),
            ("Services", join_or_dash(&lead.services)),
            ("Questions", join_or_dash(&lead.questions)),
            ("Calls", lead.call_ids.len().to_string()),
        ];
        for (label, value) in rows {
            text.push_str(&format!("{:<10} {}\n", format!("{}:", label), value));
        }
        for note in &lead.follow_up_notes {
            text.push_str(&format!("Note:      {}\n", note));
        }

        text.push_str("\nTranscript excerpt\n------------------\n");
        text.push_str(&excerpt(&format_transcript(&lead.transcript), self.excerpt_chars));
        text.push('\n');

        EmailMessage {
            from: self.from_address.clone(),
            to,
            subject,
            text,
        }
    }

    pub async fn dispatch(&self, business: &BusinessProfile, lead: &Lead) -> NotificationRecord {
        if !business.notifications.enabled {
            tracing::info!(business_id = %business.id, lead_id = %lead.id, "Notifications disabled, skipping");
            return NotificationRecord::skipped("notifications disabled for business");
        }

        let recipients = self.recipients(business);
        if recipients.is_empty() {
            tracing::warn!(business_id = %business.id, "No notification recipient configured");
            return NotificationRecord::failed("no recipient configured");
        }

        let message = self.compose(business, lead, recipients.clone());
        match self.transport.send(&message).await {
            Ok(()) => {
                tracing::info!(
                    lead_id = %lead.id,
                    transport = self.transport.name(),
                    recipients = recipients.len(),
                    "Lead notification sent"
                );
                NotificationRecord::sent(recipients)
            }
            Err(e) => {
                tracing::warn!(lead_id = %lead.id, error = %e, "Lead notification failed");
                NotificationRecord::failed(e.to_string())
            }
        }
    }
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join("; ")
    }
}

/// Cut at a word boundary within `max_chars`
fn shorten(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let cut = match cut.rfind(' ') {
        Some(space) if space > 0 => &cut[..space],
        _ => cut.as_str(),
    };
    format!("{}…", cut.trim_end_matches([',', '.', ' ']))
}

fn excerpt(transcript: &str, max_chars: usize) -> String {
    if transcript.is_empty() {
        return "(no transcript)".to_string();
    }
    if transcript.chars().count() <= max_chars {
        return transcript.to_string();
    }
    let cut: String = transcript.chars().take(max_chars).collect();
    format!("{}\n[truncated]", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_assistant_core::{NotificationStatus, Turn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EmailTransport for CountingTransport {
        async fn send(&self, _message: &EmailMessage) -> Result<(), CompletionError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CompletionError::Notification("smtp down".into()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn dispatcher(fail: bool, operator: Option<&str>) -> (NotificationDispatcher, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport {
            sent: AtomicUsize::new(0),
            fail,
        });
        let config = NotificationConfig {
            operator_alert_address: operator.map(str::to_string),
            ..NotificationConfig::default()
        };
        (NotificationDispatcher::new(transport.clone(), &config), transport)
    }

    fn lead() -> Lead {
        let mut lead = Lead::new("acme", "CA1", "5551234567").unwrap();
        lead.name = Some("Sam Jones".into());
        lead.reason = Some("My kitchen sink has been leaking since last night and the cabinet is soaked".into());
        lead.transcript = vec![Turn::caller("x".repeat(3000))];
        lead
    }

    #[test]
    fn test_recipients_dedup_and_fallback() {
        let (dispatcher, _) = dispatcher(false, Some("ops@example.com"));

        let mut business = BusinessProfile::new("acme", "Acme")
            .with_notification_email("Owner@Acme.com");
        business.notifications.cc = vec![
            "owner@acme.com".into(),
            "office@acme.com".into(),
            " ".into(),
            "OFFICE@acme.com".into(),
        ];
        assert_eq!(
            dispatcher.recipients(&business),
            vec!["Owner@Acme.com".to_string(), "office@acme.com".to_string()]
        );

        let bare = BusinessProfile::new("bare", "Bare");
        assert_eq!(dispatcher.recipients(&bare), vec!["ops@example.com".to_string()]);
    }

    #[test]
    fn test_compose_subject_and_excerpt() {
        let (dispatcher, _) = dispatcher(false, None);
        let business = BusinessProfile::new("acme", "Acme Plumbing");
        let message = dispatcher.compose(&business, &lead(), vec!["a@b.com".into()]);

        assert!(message.subject.starts_with("New Lead – Sam Jones – My kitchen sink"));
        assert!(message.subject.ends_with('…'));
        assert!(message.text.contains("Phone:     5551234567"));
        assert!(message.text.contains("[truncated]"));
        let excerpt_start = message.text.find("Caller: ").unwrap();
        let excerpt_end = message.text.find("\n[truncated]").unwrap();
        assert_eq!(message.text[excerpt_start..excerpt_end].chars().count(), 1000);
    }

    #[tokio::test]
    async fn test_dispatch_statuses() {
        let (ok, transport) = dispatcher(false, None);
        let business = BusinessProfile::new("acme", "Acme").with_notification_email("owner@acme.com");

        let record = ok.dispatch(&business, &lead()).await;
        assert_eq!(record.status, NotificationStatus::Sent);
        assert_eq!(record.recipients, vec!["owner@acme.com".to_string()]);
        assert!(record.sent_at.is_some());
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);

        let (failing, _) = dispatcher(true, None);
        let record = failing.dispatch(&business, &lead()).await;
        assert_eq!(record.status, NotificationStatus::Failed);
        assert!(record.recipients.is_empty());
        assert!(record.error.is_some());

        let mut disabled = business.clone();
        disabled.notifications.enabled = false;
        let (ok, transport) = dispatcher(false, None);
        let record = ok.dispatch(&disabled, &lead()).await;
        assert_eq!(record.status, NotificationStatus::Skipped);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 0);

        let record = ok.dispatch(&BusinessProfile::new("bare", "Bare"), &lead()).await;
        assert_eq!(record.status, NotificationStatus::Failed);
    }
}
