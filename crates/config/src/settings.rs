//! Main settings module

use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation, warnings only
    #[default]
    Development,
    Staging,
    /// All validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Scripted dialogue limits
    #[serde(default)]
    pub dialogue: DialogueConfig,

    /// Completion service used for open questions, summaries and extraction
    #[serde(default)]
    pub llm: LlmSettings,

    /// Persistence configuration (ScyllaDB)
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Lead notification delivery
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// YAML file with business profiles
    #[serde(default = "default_businesses_path")]
    pub businesses_path: String,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_businesses_path() -> String {
    "config/businesses.yaml".to_string()
}

fn default_true() -> bool {
    true
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, used for gateway callback URLs.
    /// Empty means relative URLs.
    #[serde(default)]
    pub public_url: String,

    /// Request timeout for webhook handlers
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: String::new(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Dialogue limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Empty turns before the call is ended
    #[serde(default = "default_max_no_input")]
    pub max_no_input: u32,

    /// Recognition confidence below which a turn is reprompted
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Language-model answers allowed per call
    #[serde(default = "default_max_llm_questions")]
    pub max_llm_questions: u32,

    /// Gateway speech timeout ("auto" or seconds)
    #[serde(default = "default_speech_timeout")]
    pub speech_timeout: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    /// Budget for one open-question answer while the caller waits. Must
    /// stay under `server.timeout_seconds`.
    #[serde(default = "default_answer_timeout")]
    pub answer_timeout_secs: u64,
}

fn default_max_no_input() -> u32 {
    3
}
fn default_min_confidence() -> f32 {
    0.3
}
fn default_max_llm_questions() -> u32 {
    3
}
fn default_speech_timeout() -> String {
    "auto".to_string()
}
fn default_language() -> String {
    "en-US".to_string()
}
fn default_voice() -> String {
    "Polly.Joanna".to_string()
}
fn default_answer_timeout() -> u64 {
    6
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_no_input: default_max_no_input(),
            min_confidence: default_min_confidence(),
            max_llm_questions: default_max_llm_questions(),
            speech_timeout: default_speech_timeout(),
            language: default_language(),
            voice: default_voice(),
            answer_timeout_secs: default_answer_timeout(),
        }
    }
}

/// Language-model completion service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// OpenAI-compatible base URL
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Cap for spoken answers
    #[serde(default = "default_answer_tokens")]
    pub max_tokens: usize,

    /// Cap for post-call summaries and extraction
    #[serde(default = "default_summary_tokens")]
    pub summary_max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay; doubles on each further retry
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_answer_tokens() -> usize {
    120
}
fn default_summary_tokens() -> usize {
    400
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_timeout() -> u64 {
    4
}
fn default_max_retries() -> u32 {
    1
}
fn default_initial_backoff() -> u64 {
    200
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            max_tokens: default_answer_tokens(),
            summary_max_tokens: default_summary_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

impl LlmSettings {
    /// Longest a single in-call request can take: every attempt timing
    /// out plus the backoff sleeps between them
    pub fn worst_case_latency(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        let per_attempt = Duration::from_secs(self.timeout_secs.max(1));
        let backoff_ms = (0..self.max_retries).fold(0u64, |total, retry| {
            total.saturating_add(self.initial_backoff_ms.saturating_mul(1u64 << retry.min(16)))
        });
        per_attempt.saturating_mul(attempts) + Duration::from_millis(backoff_ms)
    }
}

/// Persistence configuration for ScyllaDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable ScyllaDB persistence (false = in-memory only)
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "call_assistant".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Email transport selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmailTransportKind {
    /// Log the message instead of sending it
    #[default]
    Log,
    /// JSON POST to an HTTP email API
    Http,
}

/// Lead notification delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub transport: EmailTransportKind,

    /// HTTP email API endpoint (transport = http)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// Fallback recipient when a business has none configured
    #[serde(default)]
    pub operator_alert_address: Option<String>,

    #[serde(default = "default_excerpt_chars")]
    pub transcript_excerpt_chars: usize,

    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

fn default_from_address() -> String {
    "leads@call-assistant.local".to_string()
}
/// Upper bound on the transcript excerpt in lead notifications
pub const MAX_EXCERPT_CHARS: usize = 1000;

fn default_excerpt_chars() -> usize {
    MAX_EXCERPT_CHARS
}
fn default_notify_timeout() -> u64 {
    10
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            transport: EmailTransportKind::Log,
            endpoint: None,
            api_key: None,
            from_address: default_from_address(),
            operator_alert_address: None,
            transcript_excerpt_chars: default_excerpt_chars(),
            timeout_secs: default_notify_timeout(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Install the Prometheus recorder
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_dialogue()?;
        self.validate_llm()?;
        self.validate_notifications()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if self.environment.is_production() && self.server.public_url.is_empty() {
            tracing::warn!("server.public_url is empty; gateway callbacks will use relative URLs");
        }

        Ok(())
    }

    fn validate_dialogue(&self) -> Result<(), ConfigError> {
        let dialogue = &self.dialogue;

        if !(0.0..=1.0).contains(&dialogue.min_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "dialogue.min_confidence".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", dialogue.min_confidence),
            });
        }

        if dialogue.max_no_input == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dialogue.max_no_input".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if dialogue.max_llm_questions > 10 {
            return Err(ConfigError::InvalidValue {
                field: "dialogue.max_llm_questions".to_string(),
                message: format!("At most 10 allowed, got {}", dialogue.max_llm_questions),
            });
        }

        if dialogue.answer_timeout_secs == 0
            || dialogue.answer_timeout_secs >= self.server.timeout_seconds
        {
            return Err(ConfigError::InvalidValue {
                field: "dialogue.answer_timeout_secs".to_string(),
                message: format!(
                    "Must be between 1 and server.timeout_seconds ({}) exclusive, got {}",
                    self.server.timeout_seconds, dialogue.answer_timeout_secs
                ),
            });
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if llm.max_tokens == 0 || llm.summary_max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tokens".to_string(),
                message: "Token limits must be at least 1".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            });
        }

        // The answer budget cuts the turn short either way; this keeps the
        // backend itself from outliving the webhook
        let worst_case = llm.worst_case_latency();
        let webhook = Duration::from_secs(self.server.timeout_seconds);
        if worst_case >= webhook {
            if self.environment.is_strict() {
                return Err(ConfigError::InvalidValue {
                    field: "llm.timeout_secs".to_string(),
                    message: format!(
                        "timeout x (max_retries + 1) plus backoff is {:?}, must be under \
                         server.timeout_seconds ({:?})",
                        worst_case, webhook
                    ),
                });
            }
            tracing::warn!(
                worst_case = ?worst_case,
                webhook = ?webhook,
                "LLM retries can outlast the webhook timeout; in-call answers rely on the answer budget"
            );
        }

        let remote = !llm.endpoint.starts_with("http://localhost")
            && !llm.endpoint.starts_with("http://127.0.0.1");
        if remote && llm.api_key.as_deref().map_or(true, str::is_empty) {
            if self.environment.is_strict() {
                return Err(ConfigError::MissingField("llm.api_key".to_string()));
            }
            tracing::warn!("llm.api_key not set; open questions will be deflected");
        }

        Ok(())
    }

    fn validate_notifications(&self) -> Result<(), ConfigError> {
        let notifications = &self.notifications;

        if notifications.transport == EmailTransportKind::Http && notifications.endpoint.is_none()
        {
            return Err(ConfigError::MissingField("notifications.endpoint".to_string()));
        }

        if notifications.transcript_excerpt_chars == 0
            || notifications.transcript_excerpt_chars > MAX_EXCERPT_CHARS
        {
            return Err(ConfigError::InvalidValue {
                field: "notifications.transcript_excerpt_chars".to_string(),
                message: format!(
                    "Must be between 1 and {}, got {}",
                    MAX_EXCERPT_CHARS, notifications.transcript_excerpt_chars
                ),
            });
        }

        if self.environment.is_production() && notifications.operator_alert_address.is_none() {
            tracing::warn!(
                "notifications.operator_alert_address not set; leads for businesses without \
                 a notification email will not be delivered"
            );
        }

        Ok(())
    }
}

/// Load settings from files and environment
///
/// Priority: env vars > config/{env}.* > config/default.* > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALL_ASSISTANT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.dialogue.max_no_input, 3);
        assert_eq!(settings.dialogue.max_llm_questions, 3);
        assert!((settings.dialogue.min_confidence - 0.3).abs() < f32::EPSILON);
        assert_eq!(settings.notifications.transcript_excerpt_chars, 1000);
        assert!(!settings.persistence.enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_confidence_validation() {
        let mut settings = Settings::default();
        settings.dialogue.min_confidence = 1.5;
        assert!(settings.validate().is_err());

        settings.dialogue.min_confidence = 0.0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_http_transport_requires_endpoint() {
        let mut settings = Settings::default();
        settings.notifications.transport = EmailTransportKind::Http;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField(field)) if field == "notifications.endpoint"
        ));

        settings.notifications.endpoint = Some("https://mail.example.com/send".into());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_production_requires_llm_key() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        assert!(settings.validate().is_err());

        settings.llm.api_key = Some("sk-test".into());
        assert!(settings.validate().is_ok());

        settings.llm.api_key = None;
        settings.llm.endpoint = "http://localhost:11434/v1".into();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_excerpt_length_is_capped() {
        let mut settings = Settings::default();
        settings.notifications.transcript_excerpt_chars = 1001;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "notifications.transcript_excerpt_chars"
        ));

        settings.notifications.transcript_excerpt_chars = 1000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_answer_budget_under_webhook_timeout() {
        let mut settings = Settings::default();
        assert!(settings.dialogue.answer_timeout_secs < settings.server.timeout_seconds);

        settings.dialogue.answer_timeout_secs = settings.server.timeout_seconds;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "dialogue.answer_timeout_secs"
        ));

        settings.dialogue.answer_timeout_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_llm_worst_case_under_webhook_timeout() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.llm.api_key = Some("sk-test".into());
        // 4s x 2 attempts + 200ms
        assert_eq!(settings.llm.worst_case_latency(), Duration::from_millis(8_200));
        assert!(settings.validate().is_ok());

        settings.llm.timeout_secs = 8;
        settings.llm.max_retries = 2;
        // 8s x 3 attempts + 200ms + 400ms
        assert_eq!(settings.llm.worst_case_latency(), Duration::from_millis(24_600));
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "llm.timeout_secs"
        ));

        // Development only warns; the answer budget still bounds the turn
        settings.environment = RuntimeEnvironment::Development;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "server": { "port": 9000 },
            "dialogue": { "max_llm_questions": 2 },
            "notifications": { "transport": "http", "endpoint": "http://mail" }
        }))
        .unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.dialogue.max_llm_questions, 2);
        assert_eq!(settings.dialogue.max_no_input, 3);
        assert_eq!(settings.notifications.transport, EmailTransportKind::Http);
    }
}
