use std::collections::HashSet;

use super::ids::{CorrelationToken, MessageId};
use super::message::{Message, Role};

/// Ordered, deduplicated messages of the active conversation.
///
/// Display order is array order: every insert lands at the tail. Confirmed
/// (positive) ids are unique; provisional entries are keyed by their
/// correlation token instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    messages: Vec<Message>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains_id(&self, id: MessageId) -> bool {
        id.is_confirmed() && self.messages.iter().any(|message| message.id == id)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        if !id.is_confirmed() {
            return None;
        }
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        if !id.is_confirmed() {
            return None;
        }
        self.messages.iter_mut().find(|message| message.id == id)
    }

    pub fn find_by_token(&self, token: &CorrelationToken) -> Option<&Message> {
        self.messages.iter().find(|message| message.has_token(token))
    }

    /// Appends a client-originated entry (pending, failed, thinking, welcome).
    pub fn push_local(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Appends a server-confirmed message unless its id is already held.
    pub fn insert_confirmed(&mut self, message: Message) -> bool {
        if self.contains_id(message.id) {
            return false;
        }

        self.messages.push(message);
        true
    }

    /// Removes the entry carrying exactly this token.
    pub fn remove_by_token(&mut self, token: &CorrelationToken) -> Option<Message> {
        let index = self
            .messages
            .iter()
            .position(|message| message.has_token(token))?;
        Some(self.messages.remove(index))
    }

    pub fn has_thinking(&self) -> bool {
        self.messages.iter().any(Message::is_thinking)
    }

    pub fn remove_thinking(&mut self) -> usize {
        let before = self.messages.len();
        self.messages.retain(|message| !message.is_thinking());
        before - self.messages.len()
    }

    /// Drops every failed or pending user entry whose text equals `text`, so a
    /// retry collapses all stale attempts of the same input.
    pub fn remove_stale_attempts(&mut self, text: &str) -> usize {
        let before = self.messages.len();
        self.messages.retain(|message| {
            !(message.role == Role::User
                && message.text == text
                && (message.is_failed() || message.is_pending()))
        });
        before - self.messages.len()
    }

    /// Appends the messages of `batch` whose ids are not yet held, preserving the
    /// batch order. Returns how many were appended.
    pub fn merge_batch(&mut self, batch: &[Message]) -> usize {
        let mut held = self
            .messages
            .iter()
            .filter(|message| message.id.is_confirmed())
            .map(|message| message.id)
            .collect::<HashSet<_>>();

        let mut appended = 0;
        for message in batch {
            // `insert` also rejects ids repeated inside the batch itself.
            if message.id.is_confirmed() && held.insert(message.id) {
                self.messages.push(message.clone());
                appended += 1;
            }
        }
        appended
    }

    /// Copies feedback carried by `batch` onto the matching held entries.
    pub fn apply_feedback(&mut self, batch: &[Message]) -> usize {
        let mut applied = 0;
        for incoming in batch {
            let Some(feedback) = &incoming.feedback else {
                continue;
            };
            let Some(existing) = self.get_mut(incoming.id) else {
                continue;
            };
            if existing.feedback.as_ref() != Some(feedback) {
                existing.feedback = Some(feedback.clone());
                applied += 1;
            }
        }
        applied
    }

    /// Counts confirmed user messages, ignoring the local welcome greeting.
    pub fn confirmed_user_messages(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| {
                message.role == Role::User && message.id.is_confirmed() && !message.is_welcome()
            })
            .count()
    }

    pub fn latest_failed(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|message| message.is_failed())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
