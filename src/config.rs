//! Forwarding configuration: criteria, endpoints, and credentials.
//!
//! Records are defined in YAML and loaded read-only before pipeline
//! execution. Validation rejects records the matching engine must never
//! see (unpaired source/destination fields, dangling references).

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Action, EventType};

/// A criteria record selecting which events or headers qualify for
/// outbound delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criteria {
    /// Unique record name
    pub name: String,

    /// Expected event kind; unset matches any
    #[serde(default)]
    pub event_type: Option<EventType>,

    /// Expected event action; unset matches any
    #[serde(default)]
    pub action: Option<Action>,

    /// Business step URN
    #[serde(default)]
    pub biz_step: Option<String>,

    /// Disposition URN
    #[serde(default)]
    pub disposition: Option<String>,

    /// Read point URN
    #[serde(default)]
    pub read_point: Option<String>,

    /// Business location URN
    #[serde(default)]
    pub biz_location: Option<String>,

    /// Source `(type, id)` pair; both or neither must be set
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,

    /// Destination `(type, id)` pair; both or neither must be set
    #[serde(default)]
    pub destination_type: Option<String>,
    #[serde(default)]
    pub destination_id: Option<String>,

    /// Header sender identifier, typically an SGLN
    #[serde(default)]
    pub sender_identifier: Option<String>,

    /// Header receiver identifier
    #[serde(default)]
    pub receiver_identifier: Option<String>,

    /// Name of the endpoint any qualifying output is sent to
    pub endpoint: String,

    /// Name of the credential used at dispatch time, if any
    #[serde(default)]
    pub credential: Option<String>,
}

impl Criteria {
    /// Whether any event-relevant field is configured. A criteria without
    /// any is header-only and never matches events.
    pub fn has_event_fields(&self) -> bool {
        self.event_type.is_some()
            || self.action.is_some()
            || self.biz_step.is_some()
            || self.disposition.is_some()
            || self.read_point.is_some()
            || self.biz_location.is_some()
            || self.source_type.is_some()
            || self.destination_type.is_some()
    }

    /// Whether any header-relevant field is configured.
    pub fn has_header_fields(&self) -> bool {
        self.sender_identifier.is_some() || self.receiver_identifier.is_some()
    }
}

/// A network destination; the URN scheme selects the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub urn: String,
}

/// Authentication material used at dispatch time.
///
/// `kind` is free text matched case-insensitively: a kind containing
/// "proxy" selects proxy auth for http transports, and a kind containing
/// "digest" is mapped to Basic auth (long-standing behavior, kept as is).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub username: String,
    pub secret: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub private_key: Option<String>,
}

/// A criteria with its endpoint and credential references resolved,
/// published on the pipeline context for downstream stages.
#[derive(Debug, Clone)]
pub struct ResolvedCriteria {
    pub criteria: Criteria,
    pub endpoint: Endpoint,
    pub credential: Option<Credential>,
}

/// Errors raised by configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("duplicate {record} name: {name}")]
    DuplicateName { record: &'static str, name: String },

    #[error("criteria {criteria}: source type and id must both be set or both be unset")]
    UnpairedSource { criteria: String },

    #[error("criteria {criteria}: destination type and id must both be set or both be unset")]
    UnpairedDestination { criteria: String },

    #[error("criteria {criteria} references unknown endpoint {endpoint}")]
    UnknownEndpoint { criteria: String, endpoint: String },

    #[error("criteria {criteria} references unknown credential {credential}")]
    UnknownCredential { criteria: String, credential: String },
}

/// The full set of forwarding records available to a deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardingConfig {
    #[serde(default)]
    pub criteria: Vec<Criteria>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

impl ForwardingConfig {
    /// Load and validate a configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml(&content)?;
        config
            .validate()
            .with_context(|| format!("Invalid forwarding config: {}", path.display()))?;
        Ok(config)
    }

    /// Parse a configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse forwarding config YAML")
    }

    /// Validate record integrity. Must pass before the config is handed
    /// to a pipeline; the matching engine assumes valid records.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = std::collections::HashSet::new();
        for criteria in &self.criteria {
            if !seen.insert(criteria.name.as_str()) {
                return Err(ValidationError::DuplicateName {
                    record: "criteria",
                    name: criteria.name.clone(),
                });
            }
            if criteria.source_type.is_some() != criteria.source_id.is_some() {
                return Err(ValidationError::UnpairedSource {
                    criteria: criteria.name.clone(),
                });
            }
            if criteria.destination_type.is_some() != criteria.destination_id.is_some() {
                return Err(ValidationError::UnpairedDestination {
                    criteria: criteria.name.clone(),
                });
            }
            if self.endpoint(&criteria.endpoint).is_none() {
                return Err(ValidationError::UnknownEndpoint {
                    criteria: criteria.name.clone(),
                    endpoint: criteria.endpoint.clone(),
                });
            }
            if let Some(credential) = &criteria.credential {
                if self.credential(credential).is_none() {
                    return Err(ValidationError::UnknownCredential {
                        criteria: criteria.name.clone(),
                        credential: credential.clone(),
                    });
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.name.as_str()) {
                return Err(ValidationError::DuplicateName {
                    record: "endpoint",
                    name: endpoint.name.clone(),
                });
            }
        }

        let mut seen = std::collections::HashSet::new();
        for credential in &self.credentials {
            if !seen.insert(credential.name.as_str()) {
                return Err(ValidationError::DuplicateName {
                    record: "credential",
                    name: credential.name.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn criteria(&self, name: &str) -> Option<&Criteria> {
        self.criteria.iter().find(|c| c.name == name)
    }

    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    pub fn credential(&self, name: &str) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.name == name)
    }

    /// Resolve a criteria and its endpoint/credential references by name.
    /// Returns `None` when the criteria or a referenced record is missing;
    /// callers treat that as a fatal configuration error.
    pub fn resolve(&self, name: &str) -> Option<ResolvedCriteria> {
        let criteria = self.criteria(name)?.clone();
        let endpoint = self.endpoint(&criteria.endpoint)?.clone();
        let credential = match &criteria.credential {
            Some(credential_name) => Some(self.credential(credential_name)?.clone()),
            None => None,
        };
        Some(ResolvedCriteria {
            criteria,
            endpoint,
            credential,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CONFIG_YAML: &str = r#"
criteria:
  - name: ship-east
    event_type: Transaction
    action: ADD
    biz_step: urn:epcglobal:cbv:bizstep:shipping
    endpoint: partner
    credential: partner-basic

endpoints:
  - name: partner
    urn: https://partner.example.com/epcis

credentials:
  - name: partner-basic
    username: forwarder
    secret: hunter2
    kind: Basic
"#;

    #[test]
    fn test_config_parsing_and_resolution() {
        let config = ForwardingConfig::from_yaml(TEST_CONFIG_YAML).unwrap();
        config.validate().unwrap();

        let resolved = config.resolve("ship-east").unwrap();
        assert_eq!(resolved.endpoint.urn, "https://partner.example.com/epcis");
        assert_eq!(resolved.credential.unwrap().username, "forwarder");
        assert_eq!(resolved.criteria.action, Some(Action::Add));
    }

    #[test]
    fn test_from_file_validates() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG_YAML.as_bytes()).unwrap();
        let config = ForwardingConfig::from_file(file.path()).unwrap();
        assert_eq!(config.criteria.len(), 1);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        bad.write_all(b"criteria:\n  - name: bad\n    endpoint: missing\n")
            .unwrap();
        assert!(ForwardingConfig::from_file(bad.path()).is_err());
    }

    #[test]
    fn test_resolve_unknown_criteria() {
        let config = ForwardingConfig::from_yaml(TEST_CONFIG_YAML).unwrap();
        assert!(config.resolve("nope").is_none());
    }

    #[test]
    fn test_unpaired_source_rejected() {
        let yaml = r#"
criteria:
  - name: bad
    source_type: urn:epcglobal:cbv:sdt:possessing_party
    endpoint: partner
endpoints:
  - name: partner
    urn: https://partner.example.com/epcis
"#;
        let config = ForwardingConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::UnpairedSource { .. })
        ));
    }

    #[test]
    fn test_dangling_endpoint_rejected() {
        let yaml = r#"
criteria:
  - name: bad
    endpoint: missing
endpoints: []
"#;
        let config = ForwardingConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::UnknownEndpoint { .. })
        ));
    }

    #[test]
    fn test_header_only_criteria_has_no_event_fields() {
        let yaml = r#"
criteria:
  - name: header-only
    sender_identifier: urn:epc:id:sgln:1.1.0
    endpoint: partner
endpoints:
  - name: partner
    urn: https://partner.example.com/epcis
"#;
        let config = ForwardingConfig::from_yaml(yaml).unwrap();
        let criteria = config.criteria("header-only").unwrap();
        assert!(!criteria.has_event_fields());
        assert!(criteria.has_header_fields());
    }
}
