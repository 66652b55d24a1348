//! Collaborator seams the engine talks to.
//!
//! Futures are `!Send`: the engine runs on one cooperative thread and shares
//! state through `Rc`, so implementations are driven on a local task set.

use std::future::Future;
use std::pin::Pin;

use super::error::ServiceResult;
use super::ids::{ConversationId, MessageId};
use super::message::MessageFeedback;
use super::types::{
    Conversation, ConversationFeedback, ConversationPage, ConversationRatings, GeneratedTitle,
    MessageBatch, SendReceipt,
};

pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

pub trait MessageService {
    /// Messages of `conversation` with a sequence above `since`.
    fn fetch_messages<'a>(
        &'a self,
        conversation: ConversationId,
        since: u64,
    ) -> LocalBoxFuture<'a, ServiceResult<MessageBatch>>;

    fn send_message<'a>(
        &'a self,
        conversation: ConversationId,
        text: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<SendReceipt>>;
}

pub trait ConversationService {
    fn list_conversations<'a>(
        &'a self,
        limit: u32,
    ) -> LocalBoxFuture<'a, ServiceResult<ConversationPage>>;

    fn create_conversation<'a>(
        &'a self,
        title: Option<&'a str>,
    ) -> LocalBoxFuture<'a, ServiceResult<Conversation>>;

    fn rename_conversation<'a>(
        &'a self,
        conversation: ConversationId,
        title: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<Conversation>>;

    fn delete_conversation<'a>(
        &'a self,
        conversation: ConversationId,
    ) -> LocalBoxFuture<'a, ServiceResult<()>>;

    /// Title suggestion for a conversation that starts with `first_message`.
    fn generate_title<'a>(
        &'a self,
        first_message: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<GeneratedTitle>>;

    /// `None` when the conversation has not been rated yet.
    fn load_conversation_feedback<'a>(
        &'a self,
        conversation: ConversationId,
    ) -> LocalBoxFuture<'a, ServiceResult<Option<ConversationFeedback>>>;
}

pub trait FeedbackService {
    fn submit_message_feedback<'a>(
        &'a self,
        message: MessageId,
        rating: u8,
        comment: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<MessageFeedback>>;

    fn submit_conversation_feedback<'a>(
        &'a self,
        conversation: ConversationId,
        ratings: ConversationRatings,
        comment: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<ConversationFeedback>>;
}

/// Everything a chat session needs from the server.
pub trait ChatApi: MessageService + ConversationService + FeedbackService {}

impl<T> ChatApi for T where T: MessageService + ConversationService + FeedbackService {}
