mod bus;
mod jobs;
mod llm;
mod notifications;
mod observability;
mod persistence;
mod server;
mod tools;

pub use bus::*;
pub use jobs::*;
pub use llm::*;
pub use notifications::*;
pub use observability::*;
pub use persistence::*;
pub use server::*;
pub use tools::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the loaded configuration. `Error`-severity issues abort
    /// boot; `Warning`-severity issues are logged and the service starts
    /// anyway (e.g. no model provider configured yet).
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be nonzero".into(),
            });
        }

        if std::env::var(&self.server.auth.token_env).is_err() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.auth.token_env".into(),
                message: format!(
                    "env var {} is unset; the protected route tree will reject every request",
                    self.server.auth.token_env
                ),
            });
        }

        match self.llm.startup_policy {
            LlmStartupPolicy::RequireOne if self.llm.providers.is_empty() => {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "llm.providers".into(),
                    message: "startup_policy=require_one but no providers are configured".into(),
                });
            }
            _ if self.llm.providers.is_empty() => {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "llm.providers".into(),
                    message: "no model providers configured; jobs will fail with an upstream error until one is wired".into(),
                });
            }
            _ => {}
        }

        for provider in &self.llm.providers {
            if provider.base_url.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{}].base_url", provider.id),
                    message: "base_url must not be empty".into(),
                });
            }
        }

        if self.jobs.max_concurrent == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "jobs.max_concurrent".into(),
                message: "max_concurrent must be at least 1".into(),
            });
        }

        if self.jobs.soft_timeout_secs >= self.jobs.hard_timeout_secs {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "jobs.soft_timeout_secs".into(),
                message: "soft_timeout_secs must be less than hard_timeout_secs".into(),
            });
        }

        if self.notifications.suppression_window_secs < 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "notifications.suppression_window_secs".into(),
                message: "suppression_window_secs must be non-negative".into(),
            });
        }

        if self.tools.web_search.enabled && std::env::var(&self.tools.web_search.api_key_env).is_err() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "tools.web_search.api_key_env".into(),
                message: format!(
                    "web_search enabled but env var {} is unset; search_web will report capability_unavailable",
                    self.tools.web_search.api_key_env
                ),
            });
        }

        if let Some(endpoint) = &self.observability.otlp_endpoint {
            if endpoint.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "observability.otlp_endpoint".into(),
                    message: "otlp_endpoint must not be empty when set".into(),
                });
            }
        }

        errors
    }

    /// True if any `Error`-severity issue is present — callers should
    /// abort startup in that case.
    pub fn has_fatal_errors(errors: &[ConfigError]) -> bool {
        errors.iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut cfg = Config::default();
        cfg.llm.providers.push(ProviderConfig {
            id: "openai".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: "https://api.openai.com/v1".into(),
            auth: AuthConfig::default(),
            default_model: Some("gpt-4o".into()),
        });
        cfg
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn default_config_has_only_warnings() {
        let issues = Config::default().validate();
        assert!(!Config::has_fatal_errors(&issues));
    }

    #[test]
    fn zero_port_is_fatal() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.port").expect("expected port issue");
        assert_eq!(issue.severity, ConfigSeverity::Error);
        assert!(Config::has_fatal_errors(&issues));
    }

    #[test]
    fn require_one_without_providers_is_fatal() {
        let mut cfg = Config::default();
        cfg.llm.startup_policy = LlmStartupPolicy::RequireOne;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.providers").expect("expected provider issue");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn allow_none_without_providers_is_a_warning() {
        let cfg = Config::default();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.providers").expect("expected provider issue");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
        assert!(!Config::has_fatal_errors(&issues));
    }

    #[test]
    fn empty_provider_base_url_is_fatal() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].base_url.clear();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "llm.providers[openai]").is_some());
    }

    #[test]
    fn soft_timeout_must_be_less_than_hard_timeout() {
        let mut cfg = valid_config();
        cfg.jobs.soft_timeout_secs = 300;
        cfg.jobs.hard_timeout_secs = 300;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "jobs.soft_timeout_secs").is_some());
    }

    #[test]
    fn negative_suppression_window_is_fatal() {
        let mut cfg = valid_config();
        cfg.notifications.suppression_window_secs = -1;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "notifications.suppression_window_secs").is_some());
    }

    #[test]
    fn config_error_display_format() {
        let issue = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be nonzero".into(),
        };
        assert_eq!(issue.to_string(), "[ERROR] server.port: port must be nonzero");
    }

    #[test]
    fn deserialize_empty_object_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.jobs.max_concurrent, 8);
    }
}
