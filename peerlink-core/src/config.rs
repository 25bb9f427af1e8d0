//! Adapter configuration.

use serde::Deserialize;

use crate::error::TransportError;

/// Longest service type the native discovery layer accepts.
pub const MAX_SERVICE_TYPE_LEN: usize = 15;

/// Transport configuration. Only peers advertising the same service type are paired.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Discovery service type (default "ar-collab").
    #[serde(default = "default_service_type")]
    pub service_type: String,
    /// Fixed seed for the local id draw. Unset: seeded from the clock.
    #[serde(default)]
    pub id_seed: Option<u64>,
}

fn default_service_type() -> String {
    "ar-collab".to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            id_seed: None,
        }
    }
}

impl TransportConfig {
    pub fn with_service_type(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            ..Self::default()
        }
    }

    /// Service type rules: 1-15 chars, lowercase ASCII letters, digits and
    /// hyphens, at least one letter, no leading/trailing or adjacent hyphens.
    pub fn validate(&self) -> Result<(), TransportError> {
        let s = self.service_type.as_str();
        if s.is_empty() {
            return Err(TransportError::InvalidServiceType(
                "service type is empty".into(),
            ));
        }
        if s.len() > MAX_SERVICE_TYPE_LEN {
            return Err(TransportError::InvalidServiceType(format!(
                "{s:?} is longer than {MAX_SERVICE_TYPE_LEN} characters"
            )));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(TransportError::InvalidServiceType(format!(
                "{s:?} contains {c:?}"
            )));
        }
        if !s.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(TransportError::InvalidServiceType(format!(
                "{s:?} has no letters"
            )));
        }
        if s.starts_with('-') || s.ends_with('-') || s.contains("--") {
            return Err(TransportError::InvalidServiceType(format!(
                "{s:?} has a misplaced hyphen"
            )));
        }
        Ok(())
    }
}
