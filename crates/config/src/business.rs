//! Business profile directory
//!
//! Profiles are read from a YAML file:
//!
//! ```yaml
//! default_business: acme
//! businesses:
//!   - id: acme
//!     name: Acme Plumbing
//!     phone_numbers: ["+15550001111"]
//!     faqs:
//!       - question: What are your hours?
//!         answer: We're open 8 to 6, Monday through Saturday.
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use call_assistant_core::{phone_key, BusinessProfile};

use crate::ConfigError;

/// Lookup of business profiles by id or by the number that was dialed
pub trait BusinessDirectory: Send + Sync {
    fn get(&self, business_id: &str) -> Option<BusinessProfile>;

    /// Resolve the business that owns the dialed number
    fn by_phone_number(&self, number: &str) -> Option<BusinessProfile>;

    /// Profile used when the dialed number matches nothing
    fn default_business(&self) -> Option<BusinessProfile>;

    /// `by_phone_number`, falling back to the default profile
    fn resolve(&self, dialed: Option<&str>) -> Option<BusinessProfile> {
        dialed
            .and_then(|number| self.by_phone_number(number))
            .or_else(|| self.default_business())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct BusinessesFile {
    #[serde(default)]
    default_business: Option<String>,
    #[serde(default)]
    businesses: Vec<BusinessProfile>,
}

/// Directory backed by a static list of profiles
#[derive(Debug, Clone, Default)]
pub struct StaticBusinessDirectory {
    profiles: HashMap<String, BusinessProfile>,
    /// phone key -> business id
    numbers: HashMap<String, String>,
    default_id: Option<String>,
}

impl StaticBusinessDirectory {
    pub fn new(profiles: Vec<BusinessProfile>) -> Self {
        let default_id = profiles.first().map(|p| p.id.clone());
        let mut directory = Self {
            profiles: HashMap::new(),
            numbers: HashMap::new(),
            default_id,
        };
        for profile in profiles {
            directory.insert(profile);
        }
        directory
    }

    pub fn with_default(mut self, business_id: impl Into<String>) -> Self {
        self.default_id = Some(business_id.into());
        self
    }

    fn insert(&mut self, profile: BusinessProfile) {
        for number in &profile.phone_numbers {
            match phone_key(number) {
                Some(key) => {
                    if let Some(previous) = self.numbers.insert(key, profile.id.clone()) {
                        tracing::warn!(
                            number = %number,
                            previous = %previous,
                            business_id = %profile.id,
                            "Phone number assigned to more than one business"
                        );
                    }
                }
                None => tracing::warn!(
                    number = %number,
                    business_id = %profile.id,
                    "Ignoring unparseable business phone number"
                ),
            }
        }
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Load from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let file: BusinessesFile = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("businesses: {}", e)))?;

        if file.businesses.is_empty() {
            return Err(ConfigError::MissingField("businesses".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for profile in &file.businesses {
            if profile.id.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "businesses[].id".to_string(),
                    message: format!("Business '{}' has an empty id", profile.name),
                });
            }
            if !seen.insert(profile.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "businesses[].id".to_string(),
                    message: format!("Duplicate business id '{}'", profile.id),
                });
            }
        }

        let mut directory = Self::new(file.businesses);
        if let Some(default_id) = file.default_business {
            if !directory.profiles.contains_key(&default_id) {
                return Err(ConfigError::InvalidValue {
                    field: "default_business".to_string(),
                    message: format!("Unknown business id '{}'", default_id),
                });
            }
            directory.default_id = Some(default_id);
        }

        tracing::info!(
            businesses = directory.profiles.len(),
            numbers = directory.numbers.len(),
            "Loaded business directory"
        );

        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl BusinessDirectory for StaticBusinessDirectory {
    fn get(&self, business_id: &str) -> Option<BusinessProfile> {
        self.profiles.get(business_id).cloned()
    }

    fn by_phone_number(&self, number: &str) -> Option<BusinessProfile> {
        let key = phone_key(number)?;
        self.numbers
            .get(&key)
            .and_then(|id| self.profiles.get(id))
            .cloned()
    }

    fn default_business(&self) -> Option<BusinessProfile> {
        self.default_id
            .as_deref()
            .and_then(|id| self.profiles.get(id))
            .cloned()
    }
}
