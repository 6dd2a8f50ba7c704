//! Configuration management.
//!
//! Every field has a default, so an empty environment yields a working
//! configuration. Environment variables use the `TASKTREE__` prefix with `__`
//! as the section separator, e.g. `TASKTREE__ACCESS__REQUIRE_DECLARED_SCOPE=true`.

use serde::Deserialize;

use crate::rbac::models::{OrganizationId, UserId};
use crate::telemetry::{LoggingConfig, MetricsConfig};

const ENV_PREFIX: &str = "TASKTREE";

/// Main configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Access decision and hierarchy traversal settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AccessConfig {
    /// Deny requests that never declared an organization scope instead of
    /// passing them with a warning.
    #[serde(default)]
    pub require_declared_scope: bool,

    /// Levels below the root a traversal may descend. Unbounded when unset.
    #[serde(default)]
    pub max_traversal_depth: Option<usize>,
}

/// Audit attribution and recording settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuditConfig {
    /// User id recorded for Owner actions.
    #[serde(default = "default_system_user_id")]
    pub system_user_id: UserId,

    /// Organization id recorded for Owner actions.
    #[serde(default = "default_system_organization_id")]
    pub system_organization_id: OrganizationId,

    /// Capacity of the audit logger channel.
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            system_user_id: default_system_user_id(),
            system_organization_id: default_system_organization_id(),
            channel_buffer_size: default_channel_buffer_size(),
        }
    }
}

fn default_system_user_id() -> UserId { UserId::new(0) }
fn default_system_organization_id() -> OrganizationId { OrganizationId::new(0) }
fn default_channel_buffer_size() -> usize { 1024 }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a file (TOML, YAML or JSON by extension), then apply
    /// environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.audit.channel_buffer_size == 0 {
            anyhow::bail!("audit.channel_buffer_size must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.access.require_declared_scope);
        assert_eq!(config.access.max_traversal_depth, None);
        assert_eq!(config.audit.system_user_id, UserId::new(0));
        assert_eq!(config.audit.system_organization_id, OrganizationId::new(0));
        assert_eq!(config.audit.channel_buffer_size, 1024);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let audit: AuditConfig = serde_json::from_str(r#"{"system_user_id": 7}"#).unwrap();
        assert_eq!(audit.system_user_id, UserId::new(7));
        assert_eq!(audit.channel_buffer_size, 1024);
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let config = Config {
            audit: AuditConfig {
                channel_buffer_size: 0,
                ..AuditConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
