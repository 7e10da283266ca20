use async_trait::async_trait;
use std::time::Duration;

// Canned-response generator standing in for a real AI backend. Behind a
// trait so the UI layer and tests can inject their own.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate_response(&self, text: &str) -> String;
}

// Keyword tables for the mock. First match wins, top to bottom.
const RESPONSES: &[(&[&str], &str)] = &[
    (&["hello", "hi"], "Hello! How can I assist you today?"),
    (
        &["meeting", "transcribe"],
        "I'm ready to help transcribe your meeting. Just start speaking about the key points, and I'll organize them for you.",
    ),
    (
        &["journal", "diary"],
        "Let's journal together. How was your day? What were the highlights and challenges you faced?",
    ),
    (&["note"], "I'm ready to take notes. What would you like to remember?"),
    (
        &["brainstorm", "idea"],
        "Let's brainstorm together. What's the topic or problem you're working on?",
    ),
    (
        &["learn", "study"],
        "I'd be happy to help you learn. What topic are you interested in exploring?",
    ),
    (
        &["thank"],
        "You're welcome! Is there anything else I can help you with?",
    ),
    (
        &["bye"],
        "Goodbye! Feel free to chat again whenever you need assistance.",
    ),
];

const FALLBACK_RESPONSE: &str =
    "I understand. Please tell me more about what you're looking for, and I'll do my best to help.";

pub struct MockResponseGenerator {
    delay: Duration,
}

impl MockResponseGenerator {
    pub fn new() -> Self {
        // Simulated network delay
        Self::with_delay(Duration::from_millis(1000))
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockResponseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseGenerator for MockResponseGenerator {
    async fn generate_response(&self, text: &str) -> String {
        tokio::time::sleep(self.delay).await;

        let lower = text.to_lowercase();
        RESPONSES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
            .map_or(FALLBACK_RESPONSE, |&(_, response)| response)
            .to_string()
    }
}

// Vocabulary scanned by extract_topics
const COMMON_TOPICS: &[&str] = &[
    "meeting",
    "work",
    "project",
    "idea",
    "journal",
    "note",
    "reminder",
    "learning",
    "study",
    "brainstorm",
    "personal",
    "health",
    "finance",
    "travel",
    "technology",
];

/// Scans the given texts for the fixed topic vocabulary. Matches are
/// capitalized and deduplicated preserving first-encounter order, at most 5.
pub fn extract_topics(texts: &[String]) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();

    for text in texts {
        let lower = text.to_lowercase();
        for topic in COMMON_TOPICS {
            if lower.contains(topic) {
                let capitalized = capitalize(topic);
                if !topics.contains(&capitalized) {
                    topics.push(capitalized);
                }
            }
        }
    }

    topics.truncate(5);
    topics
}

/// Titles a conversation from its first message: the first four words, with
/// "..." appended when there were more.
pub fn generate_title(first_message: &str) -> String {
    let words: Vec<&str> = first_message.split(' ').collect();
    let mut title = words.iter().take(4).copied().collect::<Vec<_>>().join(" ");
    if words.len() > 4 {
        title.push_str("...");
    }
    title
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// --- Suggested prompts for the empty chat screen ---

pub struct SuggestedPrompt {
    pub id: &'static str,
    pub title: &'static str,
    pub prompt: &'static str,
}

pub const SUGGESTED_PROMPTS: &[SuggestedPrompt] = &[
    SuggestedPrompt {
        id: "1",
        title: "Meeting Transcription",
        prompt: "I'm in a meeting. Can you help me transcribe and summarize the key points?",
    },
    SuggestedPrompt {
        id: "2",
        title: "Daily Journal",
        prompt: "I'd like to journal about my day. Can you ask me some reflective questions?",
    },
    SuggestedPrompt {
        id: "3",
        title: "Voice Notes",
        prompt: "I want to take some voice notes. Can you help me organize my thoughts?",
    },
    SuggestedPrompt {
        id: "4",
        title: "Brainstorming",
        prompt: "I need to brainstorm ideas for a project. Can you help me think through it?",
    },
    SuggestedPrompt {
        id: "5",
        title: "Learning Assistant",
        prompt: "I'm trying to learn about a new topic. Can you be my study partner?",
    },
];
