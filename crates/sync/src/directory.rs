use super::ids::ConversationId;
use super::types::Conversation;

/// Conversation listing plus the active selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationDirectory {
    conversations: Vec<Conversation>,
    active: Option<ConversationId>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active(&self) -> Option<ConversationId> {
        self.active
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == id)
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.get(id).is_some()
    }

    pub fn first(&self) -> Option<ConversationId> {
        self.conversations.first().map(|conversation| conversation.id)
    }

    /// Any conversation other than `excluded`, in listing order.
    pub fn fallback_for(&self, excluded: ConversationId) -> Option<ConversationId> {
        self.conversations
            .iter()
            .map(|conversation| conversation.id)
            .find(|id| *id != excluded)
    }

    /// Case-insensitive title search. A blank query matches everything.
    pub fn filter(&self, query: &str) -> Vec<&Conversation> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.conversations.iter().collect();
        }

        self.conversations
            .iter()
            .filter(|conversation| conversation.display_title().to_lowercase().contains(&query))
            .collect()
    }

    /// Replaces the listing. The active selection is kept as-is; callers decide
    /// whether to select the first entry.
    pub(crate) fn replace_listing(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    pub(crate) fn insert(&mut self, conversation: Conversation) {
        if let Some(existing) = self
            .conversations
            .iter_mut()
            .find(|existing| existing.id == conversation.id)
        {
            *existing = conversation;
            return;
        }
        self.conversations.push(conversation);
    }

    pub(crate) fn set_active(&mut self, id: Option<ConversationId>) {
        self.active = id;
    }

    pub(crate) fn rename(&mut self, id: ConversationId, title: &str) -> bool {
        match self
            .conversations
            .iter_mut()
            .find(|conversation| conversation.id == id)
        {
            Some(conversation) => {
                conversation.title = Some(title.to_string());
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: ConversationId) -> Option<Conversation> {
        let index = self
            .conversations
            .iter()
            .position(|conversation| conversation.id == id)?;
        Some(self.conversations.remove(index))
    }
}
