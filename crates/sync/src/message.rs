use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, CorrelationToken, FeedbackId, MessageId};

/// Text placed in the transient thinking indicator.
pub const THINKING_TEXT: &str = "thinking";

/// Chat speaker role, spelled the way the server spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
}

/// Client-side lifecycle of one ledger entry.
///
/// A single enum keeps `Pending`, `Failed` and `Thinking` mutually exclusive, and
/// `Typing` can only be entered through [`Message::begin_typing`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MessageStatus {
    #[default]
    Confirmed,
    Pending,
    Failed {
        original_text: String,
    },
    Thinking,
    Typing,
}

/// Rating attached to a confirmed message. Absent means "not yet rated".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFeedback {
    pub id: FeedbackId,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Key a renderer uses to find the visual node of one ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Id(MessageId),
    Token(CorrelationToken),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation: ConversationId,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<MessageFeedback>,
    #[serde(skip)]
    pub token: Option<CorrelationToken>,
    #[serde(skip)]
    pub status: MessageStatus,
}

impl Message {
    fn local(
        conversation: ConversationId,
        role: Role,
        text: impl Into<String>,
        token: CorrelationToken,
        status: MessageStatus,
    ) -> Self {
        Self {
            id: MessageId::PROVISIONAL,
            conversation,
            role,
            text: text.into(),
            created_at: Utc::now(),
            sequence: 0,
            feedback: None,
            token: Some(token),
            status,
        }
    }

    /// Creates the optimistic user entry shown while a send is in flight.
    pub fn user_pending(
        conversation: ConversationId,
        text: impl Into<String>,
        token: CorrelationToken,
    ) -> Self {
        Self::local(conversation, Role::User, text, token, MessageStatus::Pending)
    }

    /// Creates the retry affordance left behind by a failed send.
    pub fn user_failed(
        conversation: ConversationId,
        text: impl Into<String>,
        token: CorrelationToken,
    ) -> Self {
        let text = text.into();
        let status = MessageStatus::Failed {
            original_text: text.clone(),
        };
        Self::local(conversation, Role::User, text, token, status)
    }

    pub fn thinking(conversation: ConversationId, token: CorrelationToken) -> Self {
        Self::local(
            conversation,
            Role::Assistant,
            THINKING_TEXT,
            token,
            MessageStatus::Thinking,
        )
    }

    pub fn welcome(
        conversation: ConversationId,
        text: impl Into<String>,
        token: CorrelationToken,
    ) -> Self {
        Self::local(
            conversation,
            Role::Assistant,
            text,
            token,
            MessageStatus::Confirmed,
        )
    }

    pub fn is_provisional(&self) -> bool {
        !self.id.is_confirmed()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, MessageStatus::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, MessageStatus::Failed { .. })
    }

    pub fn is_thinking(&self) -> bool {
        matches!(self.status, MessageStatus::Thinking)
    }

    pub fn is_typing(&self) -> bool {
        matches!(self.status, MessageStatus::Typing)
    }

    pub fn is_welcome(&self) -> bool {
        self.token.as_ref().is_some_and(CorrelationToken::is_welcome)
    }

    pub fn original_text(&self) -> Option<&str> {
        match &self.status {
            MessageStatus::Failed { original_text } => Some(original_text),
            _ => None,
        }
    }

    pub fn has_token(&self, token: &CorrelationToken) -> bool {
        self.token.as_ref() == Some(token)
    }

    pub fn key(&self) -> MessageKey {
        match (&self.token, self.id.is_confirmed()) {
            (Some(token), false) => MessageKey::Token(token.clone()),
            _ => MessageKey::Id(self.id),
        }
    }

    /// Marks an assistant reply as being revealed. Returns false when the
    /// entry cannot type (user role or thinking indicator).
    pub fn begin_typing(&mut self) -> bool {
        if self.role != Role::Assistant || self.is_thinking() {
            return false;
        }

        self.status = MessageStatus::Typing;
        true
    }

    pub fn finish_typing(&mut self, full_text: impl Into<String>) {
        self.text = full_text.into();
        if self.is_typing() {
            self.status = MessageStatus::Confirmed;
        }
    }
}
