//! Structured logging and sensitive field redaction.
//!
//! - JSON output for production, pretty or compact for local use
//! - Per-module level directives
//! - A process-wide redactor applied to audit entry details

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static REDACTOR: OnceLock<SensitiveFieldRedactor> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Global level directive. `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Per-module levels, e.g. `tasktree_core::rbac::hierarchy = "debug"`.
    #[serde(default)]
    pub module_levels: BTreeMap<String, String>,

    #[serde(default = "default_include_location")]
    pub include_location: bool,

    #[serde(default = "default_include_target")]
    pub include_target: bool,

    /// Emit an event when a span closes.
    #[serde(default)]
    pub span_close_events: bool,

    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: BTreeMap::new(),
            include_location: default_include_location(),
            include_target: default_include_target(),
            span_close_events: false,
            redaction: RedactionConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

/// Which fields and values get masked.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RedactionConfig {
    #[serde(default = "default_redaction_enabled")]
    pub enabled: bool,

    /// Case-insensitive substrings matched against field names.
    #[serde(default = "default_field_names")]
    pub field_names: Vec<String>,

    /// Regexes matched against string values.
    #[serde(default = "default_value_patterns")]
    pub value_patterns: Vec<String>,

    #[serde(default = "default_redaction_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: default_redaction_enabled(),
            field_names: default_field_names(),
            value_patterns: default_value_patterns(),
            replacement: default_redaction_replacement(),
        }
    }
}

/// Masks sensitive values before they reach logs or the audit trail.
#[derive(Debug, Clone)]
pub struct SensitiveFieldRedactor {
    field_names: Vec<String>,
    value_patterns: Vec<regex::Regex>,
    replacement: String,
    enabled: bool,
}

impl SensitiveFieldRedactor {
    /// Build a redactor. Invalid value patterns are skipped with a warning.
    pub fn new(config: &RedactionConfig) -> Self {
        let value_patterns = config
            .value_patterns
            .iter()
            .filter_map(|pattern| match regex::Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!(
                        pattern = %pattern,
                        error = %e,
                        "Ignoring invalid redaction pattern"
                    );
                    None
                }
            })
            .collect();

        Self {
            field_names: config.field_names.iter().map(|s| s.to_lowercase()).collect(),
            value_patterns,
            replacement: config.replacement.clone(),
            enabled: config.enabled,
        }
    }

    pub fn should_redact_field(&self, field_name: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let lower = field_name.to_lowercase();
        self.field_names.iter().any(|f| lower.contains(f.as_str()))
    }

    pub fn redact_value(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }
        self.value_patterns
            .iter()
            .fold(value.to_string(), |acc, regex| {
                regex.replace_all(&acc, self.replacement.as_str()).into_owned()
            })
    }

    /// Redact by field name first, then by value pattern.
    pub fn redact(&self, field_name: &str, value: &str) -> String {
        if self.should_redact_field(field_name) {
            return self.replacement.clone();
        }
        self.redact_value(value)
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// The process-wide redactor, installed by [`init_logging`] or defaulted.
    pub fn global() -> &'static SensitiveFieldRedactor {
        REDACTOR.get_or_init(|| SensitiveFieldRedactor::new(&RedactionConfig::default()))
    }

    /// Make `config` the process-wide redaction rules.
    ///
    /// Returns `false` when a redactor is already in place, either from an
    /// earlier install or because [`SensitiveFieldRedactor::global`] ran first.
    pub fn install_global(config: &RedactionConfig) -> bool {
        REDACTOR.set(SensitiveFieldRedactor::new(config)).is_ok()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_include_location() -> bool {
    true
}

fn default_include_target() -> bool {
    true
}

fn default_redaction_enabled() -> bool {
    true
}

fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

fn default_field_names() -> Vec<String> {
    [
        "api_key",
        "apikey",
        "password",
        "passwd",
        "secret",
        "credential",
        "token",
        "bearer",
        "jwt",
        "authorization",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_value_patterns() -> Vec<String> {
    vec![
        r"sk-[a-zA-Z0-9]{20,}".to_string(),
        r"eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+".to_string(),
    ]
}

/// Install the global tracing subscriber and redactor.
///
/// # Errors
///
/// Fails on an unparsable level directive or when a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let redactor_installed = SensitiveFieldRedactor::install_global(&config.redaction);

    let mut filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };
    for (module, level) in &config.module_levels {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }

    let span_events = if config.span_close_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(span_events)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_span_events(span_events)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target),
            )
            .try_init()?,
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_span_events(span_events)
                    .with_target(config.include_target),
            )
            .try_init()?,
    }

    if !redactor_installed {
        tracing::warn!("Redactor already in use; configured redaction rules were not applied");
    }

    Ok(())
}
