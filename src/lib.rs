// Declare the modules
pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod models;
pub mod responder;
pub mod state;
pub mod storage;
pub mod store;

pub use auth::{AuthController, AuthError};
pub use chat::process_transcript;
pub use state::AppState;
pub use store::ConversationStore;

use crate::api::{AuthApiProvider, HostedAuthProvider};
use crate::config::AuthConfig;
use crate::responder::{MockResponseGenerator, ResponseGenerator};
use crate::storage::StorageManager;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Builds the fully wired application state: opens storage, rehydrates the
/// conversation snapshot, and restores any persisted auth session. The UI
/// layer owns the returned state and calls `shutdown` when it exits.
pub async fn init(db_path: &Path, auth_config: &AuthConfig) -> Result<AppState> {
    // Initialize logging; a no-op if the embedding application already did
    let _ = env_logger::try_init();

    let storage = StorageManager::new(db_path).await?;
    let store = ConversationStore::load(Arc::new(storage)).await?;

    let provider: Arc<dyn AuthApiProvider> = Arc::new(HostedAuthProvider::new(auth_config)?);
    let auth = AuthController::new(provider);

    let responder: Arc<dyn ResponseGenerator> = Arc::new(MockResponseGenerator::new());

    let state = AppState::new(store, auth, responder);
    state.hydrate_auth().await;

    log::info!("Application state initialized");
    Ok(state)
}
