use crate::config::{self, AuthConfig};
use crate::models::SessionToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use keyring::Entry;
use reqwest::Client;
use serde::{Deserialize, Serialize};

// Trait defining the interface to the remote auth service. The hosted
// implementation also owns local session persistence, so current_session
// works across process restarts without the controller touching storage.
#[async_trait]
pub trait AuthApiProvider: Send + Sync {
    // Emails a one-time code to the address.
    async fn request_otp(&self, email: &str) -> Result<()>;

    // Exchanges a one-time code for a session.
    async fn verify_otp(&self, email: &str, code: &str) -> Result<SessionToken>;

    // Exchanges a platform identity token for a session in one step.
    async fn exchange_apple_token(&self, identity_token: &str) -> Result<SessionToken>;

    // Returns the locally persisted session, if one is still valid.
    async fn current_session(&self) -> Result<Option<SessionToken>>;

    // Invalidates the session remotely and forgets it locally.
    async fn invalidate_session(&self) -> Result<()>;
}

// --- Hosted Provider Implementation ---

const KEYRING_SERVICE: &str = "voicelog_session";
const KEYRING_USER: &str = "current";

// Request bodies, shaped after the hosted service's REST surface

#[derive(Serialize, Debug)]
struct OtpRequestBody<'a> {
    email: &'a str,
    create_user: bool,
}

#[derive(Serialize, Debug)]
struct VerifyRequestBody<'a> {
    email: &'a str,
    token: &'a str,
    #[serde(rename = "type")]
    otp_type: &'a str,
}

#[derive(Serialize, Debug)]
struct IdTokenRequestBody<'a> {
    provider: &'a str,
    id_token: &'a str,
}

#[derive(Deserialize, Debug)]
struct SessionResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    user: Option<UserResponse>,
}

#[derive(Deserialize, Debug)]
struct UserResponse {
    id: String,
}

impl From<SessionResponse> for SessionToken {
    fn from(response: SessionResponse) -> Self {
        SessionToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response.expires_at,
            user_id: response.user.map(|u| u.id),
        }
    }
}

pub struct HostedAuthProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HostedAuthProvider {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let api_key = config::get_api_key(config)?;
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let request_url = format!("{}/{}", self.base_url, path);
        log::info!("Sending auth request to: {}", request_url);

        let response = self
            .client
            .post(&request_url)
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await
            .context("Failed to send request to auth service")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "<Failed to read error body>".to_string());
            log::error!(
                "Auth request to {} failed with status {}: {}",
                path,
                status,
                error_body
            );
            return Err(anyhow::anyhow!(
                "Auth request failed with status {}: {}",
                status,
                error_body
            ));
        }

        Ok(response)
    }

    fn session_entry() -> Result<Entry> {
        Entry::new(KEYRING_SERVICE, KEYRING_USER).context("Failed to create keyring entry")
    }

    fn store_session(token: &SessionToken) -> Result<()> {
        let json = serde_json::to_string(token).context("Failed to serialize session")?;
        log::debug!("Persisting session to keyring");
        Self::session_entry()?
            .set_password(&json)
            .context("Failed to store session in keyring")
    }

    fn load_session() -> Result<Option<SessionToken>> {
        match Self::session_entry()?.get_password() {
            Ok(json) => {
                let token = serde_json::from_str(&json)
                    .context("Failed to deserialize persisted session")?;
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read session from keyring"),
        }
    }

    fn forget_session() -> Result<()> {
        match Self::session_entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to remove session from keyring"),
        }
    }
}

#[async_trait]
impl AuthApiProvider for HostedAuthProvider {
    async fn request_otp(&self, email: &str) -> Result<()> {
        let body = OtpRequestBody {
            email,
            create_user: true,
        };
        self.post_json("auth/v1/otp", &body).await?;
        Ok(())
    }

    async fn verify_otp(&self, email: &str, code: &str) -> Result<SessionToken> {
        let body = VerifyRequestBody {
            email,
            token: code,
            otp_type: "email",
        };
        let response = self.post_json("auth/v1/verify", &body).await?;
        let session: SessionResponse = response
            .json()
            .await
            .context("Failed to parse session response")?;

        let token = SessionToken::from(session);
        Self::store_session(&token)?;
        Ok(token)
    }

    async fn exchange_apple_token(&self, identity_token: &str) -> Result<SessionToken> {
        let body = IdTokenRequestBody {
            provider: "apple",
            id_token: identity_token,
        };
        let response = self
            .post_json("auth/v1/token?grant_type=id_token", &body)
            .await?;
        let session: SessionResponse = response
            .json()
            .await
            .context("Failed to parse session response")?;

        let token = SessionToken::from(session);
        Self::store_session(&token)?;
        Ok(token)
    }

    async fn current_session(&self) -> Result<Option<SessionToken>> {
        let Some(token) = Self::load_session()? else {
            return Ok(None);
        };

        // An expired session is as good as none; drop it so the next
        // hydrate doesn't trip over it again.
        if token
            .expires_at
            .is_some_and(|t| t <= Utc::now().timestamp())
        {
            log::info!("Persisted session has expired, discarding");
            Self::forget_session()?;
            return Ok(None);
        }

        Ok(Some(token))
    }

    async fn invalidate_session(&self) -> Result<()> {
        if let Some(token) = Self::load_session()? {
            let request_url = format!("{}/auth/v1/logout", self.base_url);
            let result = self
                .client
                .post(&request_url)
                .header("apikey", &self.api_key)
                .bearer_auth(&token.access_token)
                .send()
                .await;
            match result {
                Ok(response) if !response.status().is_success() => {
                    log::warn!(
                        "Remote logout returned status {}, forgetting session anyway",
                        response.status()
                    );
                }
                Err(e) => {
                    log::warn!("Remote logout failed: {:?}, forgetting session anyway", e);
                }
                Ok(_) => {}
            }
        }
        Self::forget_session()
    }
}
