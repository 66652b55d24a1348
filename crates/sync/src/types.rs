use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, FeedbackId};
use super::message::Message;

/// Title shown for conversations the server has not named yet.
pub const DEFAULT_CONVERSATION_TITLE: &str = "Untitled";

/// Greeting inserted locally into every freshly created conversation.
pub const WELCOME_TEXT: &str = "Hi there! How may I help you?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE)
    }
}

/// One page of the conversation listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationPage {
    pub results: Vec<Conversation>,
    #[serde(default)]
    pub count: u64,
}

/// Messages newer than a sequence watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBatch {
    pub results: Vec<Message>,
    #[serde(rename = "lastSeq")]
    pub last_seq: u64,
}

/// Server-confirmed pair returned by a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub user_message: Message,
    pub ai_message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedTitle {
    pub title: String,
}

/// The three 1-5 scores a conversation rating carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRatings {
    #[serde(rename = "overall_rating")]
    pub overall: u8,
    #[serde(rename = "helpfulness_rating")]
    pub helpfulness: u8,
    #[serde(rename = "accuracy_rating")]
    pub accuracy: u8,
}

impl ConversationRatings {
    pub const fn new(overall: u8, helpfulness: u8, accuracy: u8) -> Self {
        Self {
            overall,
            helpfulness,
            accuracy,
        }
    }

    pub(crate) fn fields(&self) -> [(&'static str, u8); 3] {
        [
            ("overall", self.overall),
            ("helpfulness", self.helpfulness),
            ("accuracy", self.accuracy),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationFeedback {
    pub id: FeedbackId,
    pub conversation: ConversationId,
    #[serde(flatten)]
    pub ratings: ConversationRatings,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
