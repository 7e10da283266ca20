use crate::api::AuthApiProvider;
use crate::models::{AuthSession, AuthStatus, SessionToken};
use std::sync::Arc;
use thiserror::Error;

// Every controller operation reports failure as a value of this type so the
// UI can render it inline; nothing in the auth flow panics or escapes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("could not request one-time code: {0}")]
    OtpRequest(String),
    #[error("could not verify one-time code: {0}")]
    OtpVerify(String),
    #[error("Apple sign-in failed: {0}")]
    Apple(String),
    #[error("another request for this operation is still in flight")]
    InFlight,
}

// Tracks sign-in progress against the remote auth service:
// Idle -> AwaitingOtp -> SignedIn, with SignedOut reached explicitly or by
// failed session rehydration.
pub struct AuthController {
    session: AuthSession,
    provider: Arc<dyn AuthApiProvider>,
}

impl AuthController {
    pub fn new(provider: Arc<dyn AuthApiProvider>) -> Self {
        Self {
            session: AuthSession::default(),
            provider,
        }
    }

    pub fn status(&self) -> AuthStatus {
        self.session.status
    }

    pub fn email(&self) -> &str {
        &self.session.email
    }

    pub fn session_token(&self) -> Option<&SessionToken> {
        self.session.session.as_ref()
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Requests a one-time code for `email`. On success the controller is
    /// awaiting the code; on failure the state is left untouched.
    pub async fn sign_in(&mut self, email: &str) -> Result<(), AuthError> {
        if let Err(e) = self.provider.request_otp(email).await {
            log::error!("One-time code request failed for {}: {:?}", email, e);
            return Err(AuthError::OtpRequest(e.to_string()));
        }

        self.session.status = AuthStatus::AwaitingOtp;
        self.session.email = email.to_string();
        log::info!("One-time code sent to {}", email);
        Ok(())
    }

    /// Submits the code for the email recorded by `sign_in`. On success the
    /// returned session is stored and the controller is signed in.
    pub async fn verify_otp(&mut self, code: &str) -> Result<SessionToken, AuthError> {
        let email = self.session.email.clone();
        match self.provider.verify_otp(&email, code).await {
            Ok(token) => {
                self.session.status = AuthStatus::SignedIn;
                self.session.session = Some(token.clone());
                log::info!("Signed in as {}", email);
                Ok(token)
            }
            Err(e) => {
                log::error!("One-time code verification failed for {}: {:?}", email, e);
                Err(AuthError::OtpVerify(e.to_string()))
            }
        }
    }

    /// Exchanges a platform identity token for a session in one step, with
    /// no intermediate awaiting state.
    pub async fn sign_in_apple(&mut self, identity_token: &str) -> Result<(), AuthError> {
        match self.provider.exchange_apple_token(identity_token).await {
            Ok(token) => {
                self.session.status = AuthStatus::SignedIn;
                self.session.session = Some(token);
                log::info!("Signed in with Apple");
                Ok(())
            }
            Err(e) => {
                log::error!("Apple sign-in failed: {:?}", e);
                Err(AuthError::Apple(e.to_string()))
            }
        }
    }

    /// Invalidates the session remotely (failures logged, not fatal) and
    /// resets to SignedOut -- not Idle, so the UI can tell "never touched"
    /// from "explicitly signed out".
    pub async fn sign_out(&mut self) {
        if let Err(e) = self.provider.invalidate_session().await {
            log::warn!("Remote session invalidation failed: {:?}", e);
        }
        self.session = AuthSession {
            status: AuthStatus::SignedOut,
            ..AuthSession::default()
        };
        log::info!("Signed out");
    }

    /// Restores an existing session on process start. Absence of a session
    /// and lookup failures both resolve to sign-out; nothing escapes.
    pub async fn hydrate(&mut self) {
        match self.provider.current_session().await {
            Ok(Some(token)) => {
                self.session.status = AuthStatus::SignedIn;
                self.session.session = Some(token);
                log::info!("Restored existing session");
            }
            Ok(None) => {
                log::info!("No existing session found");
                self.sign_out().await;
            }
            Err(e) => {
                log::warn!("Session lookup failed, treating as signed out: {:?}", e);
                self.sign_out().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{token, MockAuthProvider};
    use std::sync::atomic::Ordering;

    fn controller(provider: MockAuthProvider) -> (AuthController, Arc<MockAuthProvider>) {
        let provider = Arc::new(provider);
        (AuthController::new(provider.clone()), provider)
    }

    #[tokio::test]
    async fn sign_in_failure_leaves_state_unchanged() {
        let (mut auth, _) = controller(MockAuthProvider {
            fail_otp_request: true,
            ..MockAuthProvider::default()
        });

        let result = auth.sign_in("a@b.com").await;

        assert!(matches!(result, Err(AuthError::OtpRequest(_))));
        assert_eq!(auth.status(), AuthStatus::Idle);
        assert_eq!(auth.email(), "");
        assert!(auth.session_token().is_none());
    }

    #[tokio::test]
    async fn sign_in_then_verify_reaches_signed_in() {
        let (mut auth, _) = controller(MockAuthProvider::default());

        auth.sign_in("a@b.com").await.unwrap();
        assert_eq!(auth.status(), AuthStatus::AwaitingOtp);
        assert_eq!(auth.email(), "a@b.com");

        let session = auth.verify_otp("123456").await.unwrap();
        assert_eq!(auth.status(), AuthStatus::SignedIn);
        assert_eq!(session.access_token, "access-token");
        assert!(auth.session_token().is_some());
    }

    #[tokio::test]
    async fn wrong_code_keeps_awaiting() {
        let (mut auth, _) = controller(MockAuthProvider::default());
        auth.sign_in("a@b.com").await.unwrap();

        let result = auth.verify_otp("999999").await;

        assert!(matches!(result, Err(AuthError::OtpVerify(_))));
        assert_eq!(auth.status(), AuthStatus::AwaitingOtp);
        assert!(auth.session_token().is_none());
    }

    #[tokio::test]
    async fn apple_sign_in_skips_awaiting_state() {
        let (mut auth, _) = controller(MockAuthProvider::default());

        auth.sign_in_apple("identity-token").await.unwrap();

        assert_eq!(auth.status(), AuthStatus::SignedIn);
        assert_eq!(
            auth.session_token().unwrap().access_token,
            "apple-access-token"
        );
    }

    #[tokio::test]
    async fn apple_sign_in_failure_is_returned_not_thrown() {
        let (mut auth, _) = controller(MockAuthProvider::default());

        let result = auth.sign_in_apple("bad-token").await;

        assert!(matches!(result, Err(AuthError::Apple(_))));
        assert_eq!(auth.status(), AuthStatus::Idle);
    }

    #[tokio::test]
    async fn sign_out_resets_everything_but_marks_signed_out() {
        let (mut auth, provider) = controller(MockAuthProvider::default());
        auth.sign_in("a@b.com").await.unwrap();
        auth.verify_otp("123456").await.unwrap();

        auth.sign_out().await;

        assert_eq!(auth.status(), AuthStatus::SignedOut);
        assert_eq!(auth.email(), "");
        assert!(auth.session_token().is_none());
        assert_eq!(provider.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hydrate_restores_persisted_session() {
        let (mut auth, _) = controller(MockAuthProvider {
            stored_session: Some(token("persisted")),
            ..MockAuthProvider::default()
        });

        auth.hydrate().await;

        assert_eq!(auth.status(), AuthStatus::SignedIn);
        assert_eq!(auth.session_token().unwrap().access_token, "persisted");
    }

    #[tokio::test]
    async fn hydrate_without_session_signs_out() {
        let (mut auth, _) = controller(MockAuthProvider::default());

        auth.hydrate().await;

        assert_eq!(auth.status(), AuthStatus::SignedOut);
    }

    #[tokio::test]
    async fn hydrate_swallows_lookup_errors_as_sign_out() {
        let (mut auth, _) = controller(MockAuthProvider {
            fail_session_lookup: true,
            ..MockAuthProvider::default()
        });

        auth.hydrate().await;

        assert_eq!(auth.status(), AuthStatus::SignedOut);
        assert!(auth.session_token().is_none());
    }
}
