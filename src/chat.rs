use crate::models::Sender;
use crate::responder::{extract_topics, generate_title};
use crate::state::AppState;
use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

/// Runs the full flow for one final speech transcript: title the
/// conversation if this is its first message, append the user message,
/// obtain the AI response, append it, and refresh the topic tags.
///
/// A transcript for a conversation that is already being processed is
/// dropped; the caller sees Ok and the store is untouched.
pub async fn process_transcript(
    state: &AppState,
    conversation_id: Uuid,
    transcript: &str,
) -> Result<()> {
    let Some(_guard) = state.try_begin(format!("respond:{}", conversation_id)) else {
        log::warn!(
            "Transcript for conversation {} ignored, a response is already in flight",
            conversation_id
        );
        return Ok(());
    };

    let result = respond(state, conversation_id, transcript).await;

    if result.is_err() {
        // The happy path clears the flag itself; make sure the error path
        // does too so the UI doesn't spin forever.
        let mut store = state.store.lock().await;
        if let Err(e) = store.set_is_processing(false).await {
            log::error!("Failed to clear processing flag: {:?}", e);
        }
    }
    result
}

async fn respond(state: &AppState, conversation_id: Uuid, transcript: &str) -> Result<()> {
    log::info!("Processing transcript for conversation {}", conversation_id);

    {
        let mut store = state.store.lock().await;
        store.set_is_processing(true).await?;

        // The first transcript doubles as the conversation title
        let is_first_message = store
            .conversation(conversation_id)
            .is_some_and(|c| c.messages.is_empty());
        if is_first_message {
            store
                .update_conversation_title(conversation_id, generate_title(transcript))
                .await?;
        }

        store
            .add_message(
                conversation_id,
                transcript.to_string(),
                Sender::User,
                Utc::now().timestamp_millis(),
            )
            .await?;
        // Lock released here so the store stays usable during the response call
    }

    let response = state.responder.generate_response(transcript).await;

    let mut store = state.store.lock().await;
    store
        .add_message(
            conversation_id,
            response,
            Sender::Ai,
            Utc::now().timestamp_millis(),
        )
        .await?;

    // Re-derive topic tags over the whole conversation
    let texts: Vec<String> = store
        .conversation(conversation_id)
        .map(|c| c.messages.iter().map(|m| m.text.clone()).collect())
        .unwrap_or_default();
    store
        .update_conversation_topics(conversation_id, extract_topics(&texts))
        .await?;

    store.set_is_processing(false).await?;
    log::info!("Finished processing transcript for {}", conversation_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::MockAuthProvider;
    use crate::auth::AuthController;
    use crate::responder::MockResponseGenerator;
    use crate::storage::testing::MemoryStore;
    use crate::store::ConversationStore;
    use std::sync::Arc;
    use std::time::Duration;

    async fn app_state(response_delay: Duration) -> AppState {
        let _ = env_logger::builder().is_test(true).try_init();
        let storage = Arc::new(MemoryStore::default());
        let store = ConversationStore::load(storage).await.unwrap();
        let auth = AuthController::new(Arc::new(MockAuthProvider::default()));
        let responder = Arc::new(MockResponseGenerator::with_delay(response_delay));
        AppState::new(store, auth, responder)
    }

    #[tokio::test]
    async fn transcript_flow_appends_titles_and_tags() {
        let state = app_state(Duration::ZERO).await;
        let id = {
            let mut store = state.store.lock().await;
            store.start_new_conversation().await.unwrap()
        };

        process_transcript(&state, id, "Let's journal about my work week")
            .await
            .unwrap();

        let store = state.store.lock().await;
        let conversation = store.conversation(id).unwrap();

        assert_eq!(conversation.title, "Let's journal about my...");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].sender, Sender::User);
        assert_eq!(
            conversation.messages[0].text,
            "Let's journal about my work week"
        );
        assert_eq!(conversation.messages[1].sender, Sender::Ai);
        assert_eq!(
            conversation.messages[1].text,
            "Let's journal together. How was your day? What were the highlights and challenges you faced?"
        );
        assert_eq!(conversation.topics, ["Work", "Journal"]);
        assert!(!store.is_processing());
    }

    #[tokio::test]
    async fn later_transcripts_do_not_retitle() {
        let state = app_state(Duration::ZERO).await;
        let id = {
            let mut store = state.store.lock().await;
            store.start_new_conversation().await.unwrap()
        };

        process_transcript(&state, id, "First message here").await.unwrap();
        process_transcript(&state, id, "Second message entirely different")
            .await
            .unwrap();

        let store = state.store.lock().await;
        let conversation = store.conversation(id).unwrap();
        assert_eq!(conversation.title, "First message here");
        assert_eq!(conversation.messages.len(), 4);
    }

    #[tokio::test]
    async fn overlapping_transcripts_for_one_conversation_are_dropped() {
        let state = app_state(Duration::from_millis(200)).await;
        let id = {
            let mut store = state.store.lock().await;
            store.start_new_conversation().await.unwrap()
        };

        let background = {
            let state = state.clone();
            tokio::spawn(async move {
                process_transcript(&state, id, "slow first transcript").await
            })
        };
        // Let the first run claim the in-flight slot and reach the responder
        tokio::time::sleep(Duration::from_millis(50)).await;

        process_transcript(&state, id, "second transcript").await.unwrap();
        background.await.unwrap().unwrap();

        let store = state.store.lock().await;
        let conversation = store.conversation(id).unwrap();
        // Only the first transcript produced a user/ai pair
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].text, "slow first transcript");
    }

    #[tokio::test]
    async fn unknown_conversation_runs_to_completion_as_noop() {
        let state = app_state(Duration::ZERO).await;

        process_transcript(&state, Uuid::new_v4(), "hello out there")
            .await
            .unwrap();

        let store = state.store.lock().await;
        assert!(store.conversations().is_empty());
        assert!(!store.is_processing());
    }
}
