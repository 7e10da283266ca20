use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};

// --- Auth service configuration ---

const KEYRING_SERVICE_PREFIX: &str = "voicelog_auth_key";

/// Connection settings for the hosted auth service.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthConfig {
    /// Base URL of the auth service, e.g. "https://xyz.example.co"
    pub base_url: String,
    // Reference to the service API key, not the key itself -
    // e.g. 'keyring' or 'env:VOICELOG_AUTH_KEY' or null
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_ref: Option<String>,
}

impl AuthConfig {
    /// Reads the service location from the environment.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("VOICELOG_AUTH_URL")
            .context("VOICELOG_AUTH_URL environment variable is not set")?;
        Ok(Self {
            base_url,
            api_key_ref: Some("env:VOICELOG_AUTH_KEY".to_string()),
        })
    }
}

/// Retrieves the API key for the auth service.
/// It checks the `api_key_ref` field to determine whether to read from
/// environment variables or the OS keyring.
pub fn get_api_key(config: &AuthConfig) -> Result<String> {
    match config.api_key_ref.as_deref() {
        Some(ref_str) if ref_str.starts_with("env:") => {
            let env_var_name = ref_str.trim_start_matches("env:");
            log::debug!("Retrieving API key from environment variable: {}", env_var_name);
            std::env::var(env_var_name).context(format!(
                "Failed to get API key from environment variable '{}'",
                env_var_name
            ))
        }
        Some("keyring") => {
            let entry = Entry::new(KEYRING_SERVICE_PREFIX, &config.base_url)
                .context("Failed to create keyring entry")?;
            log::debug!("Retrieving API key from keyring for {}", config.base_url);
            entry.get_password().context(format!(
                "Failed to get API key from keyring for '{}'. Please set it first.",
                config.base_url
            ))
        }
        Some(other) => Err(anyhow::anyhow!("Unsupported api_key_ref format: {}", other)),
        None => Err(anyhow::anyhow!(
            "API key reference not set for auth service '{}'",
            config.base_url
        )),
    }
}

/// Stores the auth service API key in the OS keyring.
pub fn set_api_key_in_keyring(config: &AuthConfig, api_key: &str) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE_PREFIX, &config.base_url)
        .context("Failed to create keyring entry for setting password")?;
    log::info!("Setting API key in keyring for {}", config.base_url);
    entry.set_password(api_key).context(format!(
        "Failed to set API key in keyring for '{}'",
        config.base_url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_ref_resolves_from_environment() {
        std::env::set_var("VOICELOG_TEST_AUTH_KEY", "anon-key");
        let config = AuthConfig {
            base_url: "https://auth.example".to_string(),
            api_key_ref: Some("env:VOICELOG_TEST_AUTH_KEY".to_string()),
        };
        assert_eq!(get_api_key(&config).unwrap(), "anon-key");
    }

    #[test]
    fn missing_ref_is_an_error() {
        let config = AuthConfig {
            base_url: "https://auth.example".to_string(),
            api_key_ref: None,
        };
        assert!(get_api_key(&config).is_err());
    }

    #[test]
    fn unsupported_ref_is_an_error() {
        let config = AuthConfig {
            base_url: "https://auth.example".to_string(),
            api_key_ref: Some("vault:whatever".to_string()),
        };
        assert!(get_api_key(&config).is_err());
    }
}
