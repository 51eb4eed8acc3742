//! Shared utility functions for provider adapters.

use sa_domain::config::AuthConfig;
use sa_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Upstream`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Upstream {
            provider: "http".into(),
            message: e.to_string(),
        }
    }
}

/// Resolve the API key from an [`AuthConfig`]'s configured env var.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    let env_var = auth
        .env
        .as_deref()
        .ok_or_else(|| Error::Auth("AuthConfig has no 'env' var configured".into()))?;

    std::env::var(env_var)
        .map_err(|_| Error::Auth(format!("environment variable '{env_var}' not set or not valid UTF-8")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::AuthMode;

    #[test]
    fn missing_env_field_is_an_auth_error() {
        let auth = AuthConfig {
            mode: AuthMode::ApiKey,
            header: None,
            prefix: None,
            env: None,
        };
        assert!(resolve_api_key(&auth).is_err());
    }

    #[test]
    fn unset_env_var_is_an_auth_error() {
        let auth = AuthConfig {
            mode: AuthMode::ApiKey,
            header: None,
            prefix: None,
            env: Some("SA_TEST_DEFINITELY_UNSET_VAR_XYZ".into()),
        };
        assert!(resolve_api_key(&auth).is_err());
    }

    #[test]
    fn set_env_var_resolves() {
        std::env::set_var("SA_TEST_PROVIDER_KEY", "sk-test-123");
        let auth = AuthConfig {
            mode: AuthMode::ApiKey,
            header: None,
            prefix: None,
            env: Some("SA_TEST_PROVIDER_KEY".into()),
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "sk-test-123");
        std::env::remove_var("SA_TEST_PROVIDER_KEY");
    }
}
