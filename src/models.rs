use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Who authored a message
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

// Represents a single message in a conversation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    #[serde(default = "Uuid::new_v4")] // Generate a new UUID if missing during deserialization
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    // Milliseconds since Unix epoch
    pub timestamp: i64,
}

// Represents a conversation thread and its derived topic tags
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Conversation {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String, // e.g., "New Conversation" until the first transcript titles it
    pub messages: Vec<Message>,
    // Creation time, milliseconds since Unix epoch
    pub date: i64,
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

// --- Derived statistics (recomputed on demand, never persisted) ---

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DailyActivity {
    pub date: String, // ISO date, "YYYY-MM-DD"
    pub count: usize,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MessageCount {
    pub user: usize,
    pub ai: usize,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub top_topics: Vec<TopicCount>,
    pub conversation_count: usize,
    pub message_count: MessageCount,
    pub average_messages_per_conversation: f64,
    // Always exactly 7 entries, consecutive days, the last one being today (UTC)
    pub weekly_activity: Vec<DailyActivity>,
}

// --- Auth session state ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthStatus {
    #[default]
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "signOut")]
    SignedOut,
    #[serde(rename = "signIn")]
    SignedIn,
    #[serde(rename = "awaitingOTP")]
    AwaitingOtp,
}

// Opaque session issued by the remote auth service
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    // Expiry as Unix seconds, when the service reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

// Sign-in progress as tracked by the auth controller
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AuthSession {
    pub status: AuthStatus,
    pub email: String,
    pub session: Option<SessionToken>,
}
