use crate::models::{
    Conversation, ConversationStats, DailyActivity, Message, MessageCount, Sender, TopicCount,
};
use crate::storage::KeyValueStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Storage key holding the whole serialized store state.
pub const STATE_KEY: &str = "conversation-storage";

// The persisted portion of the store. Every mutation rewrites this as one
// JSON snapshot under STATE_KEY; there is no partial update path.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct StoreState {
    conversations: Vec<Conversation>,
    current_conversation_id: Option<Uuid>,
    is_recording: bool,
    is_processing: bool,
}

pub struct ConversationStore {
    state: StoreState,
    storage: Arc<dyn KeyValueStore>,
}

impl ConversationStore {
    /// Rehydrates the store from the durable snapshot, or starts empty.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let state = match storage.get(STATE_KEY).await? {
            Some(json) => serde_json::from_str(&json)
                .context("Failed to deserialize conversation snapshot")?,
            None => StoreState::default(),
        };
        log::info!(
            "Loaded {} conversations from storage",
            state.conversations.len()
        );
        Ok(Self { state, storage })
    }

    async fn persist(&self) -> Result<()> {
        let json = serde_json::to_string(&self.state)
            .context("Failed to serialize conversation snapshot")?;
        self.storage.set(STATE_KEY, &json).await
    }

    /// Creates an empty conversation, prepends it (most-recent-first) and
    /// makes it current.
    pub async fn start_new_conversation(&mut self) -> Result<Uuid> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            title: "New Conversation".to_string(),
            messages: Vec::new(),
            date: Utc::now().timestamp_millis(),
            topics: Vec::new(),
            summary: None,
        };
        let id = conversation.id;

        self.state.conversations.insert(0, conversation);
        self.state.current_conversation_id = Some(id);
        self.persist().await?;

        log::info!("Started new conversation {}", id);
        Ok(id)
    }

    /// Appends a message to the identified conversation, preserving arrival
    /// order. Silently ignored if the conversation does not exist.
    pub async fn add_message(
        &mut self,
        conversation_id: Uuid,
        text: String,
        sender: Sender,
        timestamp: i64,
    ) -> Result<()> {
        let Some(conversation) = self
            .state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            log::warn!(
                "Attempted to add message to non-existent conversation: {}",
                conversation_id
            );
            return Ok(());
        };

        conversation.messages.push(Message {
            id: Uuid::new_v4(),
            text,
            sender,
            timestamp,
        });
        self.persist().await
    }

    /// Replaces a conversation's title. No-op if not found.
    pub async fn update_conversation_title(
        &mut self,
        conversation_id: Uuid,
        title: String,
    ) -> Result<()> {
        let Some(conversation) = self
            .state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            log::warn!(
                "Attempted to rename non-existent conversation: {}",
                conversation_id
            );
            return Ok(());
        };

        conversation.title = title;
        self.persist().await
    }

    /// Replaces a conversation's topic tags. No-op if not found.
    pub async fn update_conversation_topics(
        &mut self,
        conversation_id: Uuid,
        topics: Vec<String>,
    ) -> Result<()> {
        let Some(conversation) = self
            .state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            log::warn!(
                "Attempted to update topics of non-existent conversation: {}",
                conversation_id
            );
            return Ok(());
        };

        conversation.topics = topics;
        self.persist().await
    }

    /// Removes a conversation. Clears the current-conversation pointer if it
    /// referenced the removed conversation.
    pub async fn delete_conversation(&mut self, conversation_id: Uuid) -> Result<()> {
        let before = self.state.conversations.len();
        self.state.conversations.retain(|c| c.id != conversation_id);
        if self.state.conversations.len() == before {
            log::warn!(
                "Attempted to delete non-existent conversation: {}",
                conversation_id
            );
            return Ok(());
        }

        if self.state.current_conversation_id == Some(conversation_id) {
            self.state.current_conversation_id = None;
        }
        log::info!("Deleted conversation {}", conversation_id);
        self.persist().await
    }

    pub async fn set_current_conversation(
        &mut self,
        conversation_id: Option<Uuid>,
    ) -> Result<()> {
        self.state.current_conversation_id = conversation_id;
        self.persist().await
    }

    pub async fn set_is_recording(&mut self, is_recording: bool) -> Result<()> {
        self.state.is_recording = is_recording;
        self.persist().await
    }

    pub async fn set_is_processing(&mut self, is_processing: bool) -> Result<()> {
        self.state.is_processing = is_processing;
        self.persist().await
    }

    // --- Read accessors ---

    pub fn conversations(&self) -> &[Conversation] {
        &self.state.conversations
    }

    pub fn conversation(&self, conversation_id: Uuid) -> Option<&Conversation> {
        self.state
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
    }

    pub fn current_conversation_id(&self) -> Option<Uuid> {
        self.state.current_conversation_id
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.state
            .current_conversation_id
            .and_then(|id| self.conversation(id))
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording
    }

    pub fn is_processing(&self) -> bool {
        self.state.is_processing
    }

    /// Derived statistics over the full collection, recomputed fresh on
    /// every call.
    pub fn conversation_stats(&self) -> ConversationStats {
        calculate_stats(&self.state.conversations, Utc::now())
    }

    /// Releases the underlying storage.
    pub async fn close(&self) -> Result<()> {
        self.storage.close().await
    }
}

fn calculate_stats(conversations: &[Conversation], now: DateTime<Utc>) -> ConversationStats {
    // Count topic occurrences. Linear scan keeps first-encounter order so a
    // stable sort breaks count ties in that order.
    let mut top_topics: Vec<TopicCount> = Vec::new();
    for conversation in conversations {
        for topic in &conversation.topics {
            match top_topics.iter_mut().find(|t| &t.topic == topic) {
                Some(entry) => entry.count += 1,
                None => top_topics.push(TopicCount {
                    topic: topic.clone(),
                    count: 1,
                }),
            }
        }
    }
    top_topics.sort_by(|a, b| b.count.cmp(&a.count));
    top_topics.truncate(5);

    // Count messages by sender
    let mut user_count = 0;
    let mut ai_count = 0;
    for conversation in conversations {
        for message in &conversation.messages {
            match message.sender {
                Sender::User => user_count += 1,
                Sender::Ai => ai_count += 1,
            }
        }
    }

    // Conversations started per day over the 7-day window ending today (UTC)
    let weekly_activity = (0..7i64)
        .map(|i| {
            let day = (now - Duration::days(6 - i)).date_naive();
            let count = conversations
                .iter()
                .filter(|c| {
                    DateTime::from_timestamp_millis(c.date)
                        .is_some_and(|d| d.date_naive() == day)
                })
                .count();
            DailyActivity {
                date: day.format("%Y-%m-%d").to_string(),
                count,
            }
        })
        .collect();

    let conversation_count = conversations.len();
    let total_messages = user_count + ai_count;

    ConversationStats {
        top_topics,
        conversation_count,
        message_count: MessageCount {
            user: user_count,
            ai: ai_count,
        },
        average_messages_per_conversation: if conversation_count == 0 {
            0.0
        } else {
            total_messages as f64 / conversation_count as f64
        },
        weekly_activity,
    }
}
