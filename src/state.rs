use crate::auth::{AuthController, AuthError};
use crate::models::{AuthStatus, SessionToken};
use crate::responder::ResponseGenerator;
use crate::store::ConversationStore;
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

// Core application state handed to the UI layer. Explicitly constructed and
// dependency-injected; there is no process-wide singleton.
#[derive(Clone)] // Allow cloning for background tasks
pub struct AppState {
    pub store: Arc<Mutex<ConversationStore>>,
    pub auth: Arc<Mutex<AuthController>>,
    pub responder: Arc<dyn ResponseGenerator>,
    // In-flight operations keyed by logical key (email, conversation id),
    // so overlapping triggers don't fire duplicate remote work.
    in_flight: Arc<DashMap<String, ()>>,
}

impl AppState {
    pub fn new(
        store: ConversationStore,
        auth: AuthController,
        responder: Arc<dyn ResponseGenerator>,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            auth: Arc::new(Mutex::new(auth)),
            responder,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Claims the in-flight slot for `key`. Returns None if an operation
    /// with the same key is still running; the slot frees when the guard
    /// drops.
    pub(crate) fn try_begin(&self, key: String) -> Option<InFlightGuard> {
        use dashmap::mapref::entry::Entry;
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightGuard {
                    map: self.in_flight.clone(),
                    key,
                })
            }
        }
    }

    // --- Auth entry points for the UI ---

    /// Requests a one-time code. A second request for the same email while
    /// one is still in flight is rejected without touching the service.
    pub async fn sign_in(&self, email: &str) -> Result<(), AuthError> {
        let Some(_guard) = self.try_begin(format!("sign-in:{}", email)) else {
            log::warn!("Sign-in for {} is already in flight", email);
            return Err(AuthError::InFlight);
        };
        self.auth.lock().await.sign_in(email).await
    }

    pub async fn verify_otp(&self, code: &str) -> Result<SessionToken, AuthError> {
        self.auth.lock().await.verify_otp(code).await
    }

    pub async fn sign_in_apple(&self, identity_token: &str) -> Result<(), AuthError> {
        self.auth.lock().await.sign_in_apple(identity_token).await
    }

    pub async fn sign_out(&self) {
        self.auth.lock().await.sign_out().await
    }

    pub async fn hydrate_auth(&self) {
        self.auth.lock().await.hydrate().await
    }

    pub async fn auth_status(&self) -> AuthStatus {
        self.auth.lock().await.status()
    }

    /// Releases held resources. Call once when the embedding application
    /// shuts down.
    pub async fn shutdown(&self) -> Result<()> {
        log::info!("Shutting down application state");
        self.store.lock().await.close().await
    }
}

// Frees the in-flight slot when the owning operation finishes, even on the
// error path.
pub(crate) struct InFlightGuard {
    map: Arc<DashMap<String, ()>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::MockAuthProvider;
    use crate::responder::MockResponseGenerator;
    use crate::storage::testing::MemoryStore;
    use std::time::Duration;

    async fn app_state(provider: MockAuthProvider) -> AppState {
        let store = ConversationStore::load(Arc::new(MemoryStore::default()))
            .await
            .unwrap();
        let auth = AuthController::new(Arc::new(provider));
        AppState::new(
            store,
            auth,
            Arc::new(MockResponseGenerator::with_delay(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn concurrent_sign_in_for_same_email_is_rejected() {
        let state = app_state(MockAuthProvider {
            request_delay: Duration::from_millis(200),
            ..MockAuthProvider::default()
        })
        .await;

        let background = {
            let state = state.clone();
            tokio::spawn(async move { state.sign_in("a@b.com").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(state.sign_in("a@b.com").await, Err(AuthError::InFlight));
        background.await.unwrap().unwrap();

        assert_eq!(state.auth_status().await, AuthStatus::AwaitingOtp);
    }

    #[tokio::test]
    async fn slot_frees_after_completion() {
        let state = app_state(MockAuthProvider::default()).await;

        state.sign_in("a@b.com").await.unwrap();
        // Same email again, no longer in flight
        state.sign_in("a@b.com").await.unwrap();

        assert_eq!(state.auth_status().await, AuthStatus::AwaitingOtp);
    }

    #[tokio::test]
    async fn in_flight_keys_are_independent() {
        let state = app_state(MockAuthProvider {
            request_delay: Duration::from_millis(100),
            ..MockAuthProvider::default()
        })
        .await;

        let background = {
            let state = state.clone();
            tokio::spawn(async move { state.sign_in("a@b.com").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A different email is a different logical key
        let guard = state.try_begin("sign-in:c@d.com".to_string());
        assert!(guard.is_some());
        drop(guard);

        background.await.unwrap().unwrap();
    }
}
