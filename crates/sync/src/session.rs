use std::cell::{Ref, RefCell};
use std::rc::Rc;

use snafu::{OptionExt, ResultExt, ensure};

use super::context::SessionContext;
use super::delays::{Delays, Sleeper, TokioSleeper};
use super::error::{
    NoActiveConversationSnafu, ServiceSnafu, SyncResult, UnknownConversationSnafu,
    UnknownEntrySnafu,
};
use super::events::{PollOutcome, SendOutcome};
use super::feedback::FeedbackFlow;
use super::gate::RenderGate;
use super::ids::{ConversationId, CorrelationToken, MessageId, TokenKind};
use super::message::{Message, MessageFeedback};
use super::poll::PollSync;
use super::render::{Renderer, Surface};
use super::send::SendPipeline;
use super::service::ChatApi;
use super::state::{ChatState, RenamingGuard};
use super::types::{
    Conversation, ConversationFeedback, ConversationRatings, MessageBatch, WELCOME_TEXT,
};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;

pub struct SessionOptions {
    pub delays: Delays,
    pub sleeper: Rc<dyn Sleeper>,
    pub gate: Rc<RenderGate>,
    pub page_limit: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            delays: Delays::default(),
            sleeper: Rc::new(TokioSleeper),
            gate: Rc::new(RenderGate::new()),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// One chat client session: the conversation directory, the active ledger and
/// every flow operating on them.
///
/// All methods take `&self`; flows started concurrently on one local task set
/// interleave only at their suspension points.
pub struct ChatSession<A: ?Sized> {
    context: SessionContext,
    api: Rc<A>,
    pipeline: SendPipeline<A>,
    poller: PollSync<A>,
    feedback: FeedbackFlow<A>,
    page_limit: u32,
}

impl<A> ChatSession<A>
where
    A: ChatApi + ?Sized,
{
    pub fn new(api: Rc<A>, renderer: Rc<dyn Renderer>, options: SessionOptions) -> Self {
        let context = SessionContext {
            state: Rc::new(RefCell::new(ChatState::new())),
            surface: Surface::new(renderer, options.gate),
            sleeper: options.sleeper,
            delays: options.delays.normalized(),
        };

        Self {
            pipeline: SendPipeline::new(context.clone(), Rc::clone(&api)),
            poller: PollSync::new(context.clone(), Rc::clone(&api)),
            feedback: FeedbackFlow::new(context.clone(), Rc::clone(&api)),
            page_limit: options.page_limit.max(1),
            context,
            api,
        }
    }

    /// Read access to the current state. Do not hold it across an `.await`.
    pub fn state(&self) -> Ref<'_, ChatState> {
        self.context.state.borrow()
    }

    pub fn gate(&self) -> &Rc<RenderGate> {
        self.context.surface.gate()
    }

    pub fn delays(&self) -> &Delays {
        &self.context.delays
    }

    /// Re-renders the current state if the gate allows it.
    pub fn render(&self) -> bool {
        self.context.refresh()
    }

    /// Replaces the directory with the server listing and selects the first
    /// conversation when none is active.
    pub async fn load_conversations(&self) -> SyncResult<Option<ConversationId>> {
        let page = self
            .api
            .list_conversations(self.page_limit)
            .await
            .context(ServiceSnafu {
                stage: "list-conversations",
            })?;
        tracing::info!(count = page.results.len(), total = page.count, "loaded conversations");

        let active = {
            let mut state = self.context.state.borrow_mut();
            state.directory_mut().replace_listing(page.results);
            if state.active_conversation_id().is_none() {
                let first = state.directory().first();
                if first.is_some() {
                    state.activate(first);
                }
            }
            state.active_conversation_id()
        };
        self.context.refresh();
        Ok(active)
    }

    pub async fn create_conversation(&self, title: Option<&str>) -> SyncResult<Conversation> {
        let title = title.map(str::trim).filter(|title| !title.is_empty());
        let conversation = self
            .api
            .create_conversation(title)
            .await
            .context(ServiceSnafu {
                stage: "create-conversation",
            })?;

        {
            let mut state = self.context.state.borrow_mut();
            state.directory_mut().insert(conversation.clone());
            state.activate(Some(conversation.id));
            state.ledger_mut().push_local(Message::welcome(
                conversation.id,
                WELCOME_TEXT,
                CorrelationToken::mint(TokenKind::Welcome),
            ));
        }
        tracing::info!(conversation_id = %conversation.id, "created conversation");
        self.context.refresh_and_follow();
        Ok(conversation)
    }

    /// Switches to `id`, then pulls its messages and rating.
    pub async fn select_conversation(&self, id: ConversationId) -> SyncResult<PollOutcome> {
        {
            let mut state = self.context.state.borrow_mut();
            ensure!(
                state.directory().contains(id),
                UnknownConversationSnafu {
                    stage: "select-conversation",
                    conversation_id: id,
                }
            );
            state.activate(Some(id));
        }
        self.context.refresh();

        let outcome = self.poller.sync().await?;
        if let Err(error) = self.feedback.load_conversation_feedback().await {
            tracing::warn!(conversation_id = %id, error = %error, "failed to load conversation feedback");
        }
        Ok(outcome)
    }

    /// Renames `id`. Returns false when the trimmed title is empty or unchanged.
    pub async fn rename_conversation(&self, id: ConversationId, title: &str) -> SyncResult<bool> {
        let title = title.trim();
        let current = self
            .context
            .state
            .borrow()
            .directory()
            .get(id)
            .map(|conversation| conversation.display_title().to_string())
            .context(UnknownConversationSnafu {
                stage: "rename-conversation",
                conversation_id: id,
            })?;
        if title.is_empty() || title == current {
            return Ok(false);
        }

        let _renaming = RenamingGuard::engage(&self.context.state);
        self.api
            .rename_conversation(id, title)
            .await
            .context(ServiceSnafu {
                stage: "rename-conversation",
            })?;

        self.context
            .state
            .borrow_mut()
            .directory_mut()
            .rename(id, title);
        tracing::info!(conversation_id = %id, title, "renamed conversation");
        self.context.refresh();
        Ok(true)
    }

    /// Deletes `id`; when it was active the first remaining conversation takes over.
    pub async fn delete_conversation(&self, id: ConversationId) -> SyncResult<Option<ConversationId>> {
        self.api
            .delete_conversation(id)
            .await
            .context(ServiceSnafu {
                stage: "delete-conversation",
            })?;

        let active = {
            let mut state = self.context.state.borrow_mut();
            state.directory_mut().remove(id);
            if state.active_conversation_id() == Some(id) {
                let next = state.directory().first();
                state.activate(next);
            }
            state.active_conversation_id()
        };
        tracing::info!(conversation_id = %id, "deleted conversation");
        self.context.refresh();
        Ok(active)
    }

    pub fn filter_conversations(&self, query: &str) -> Vec<Conversation> {
        self.state()
            .directory()
            .filter(query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn send(&self, text: &str) -> SyncResult<SendOutcome> {
        self.pipeline.send(text).await
    }

    /// Retries the failed entry carrying `token`.
    pub async fn retry(&self, token: &CorrelationToken) -> SyncResult<SendOutcome> {
        let failed = self
            .state()
            .ledger()
            .find_by_token(token)
            .cloned()
            .context(UnknownEntrySnafu {
                stage: "retry-message",
                token: token.to_string(),
            })?;
        self.pipeline.retry(&failed).await
    }

    /// Retries the most recent failed entry, if any.
    pub async fn retry_latest_failed(&self) -> SyncResult<Option<SendOutcome>> {
        let failed = self.state().ledger().latest_failed().cloned();
        match failed {
            Some(failed) => self.pipeline.retry(&failed).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn sync(&self) -> SyncResult<PollOutcome> {
        self.poller.sync().await
    }

    /// Merges an already fetched batch into the active ledger.
    pub fn merge(&self, batch: &MessageBatch) -> SyncResult<PollOutcome> {
        self.context
            .active_context()
            .context(NoActiveConversationSnafu {
                stage: "merge-messages",
            })?;
        Ok(self.poller.merge(batch))
    }

    pub async fn rate_message(
        &self,
        message_id: MessageId,
        rating: u8,
        comment: &str,
    ) -> SyncResult<MessageFeedback> {
        self.feedback.rate_message(message_id, rating, comment).await
    }

    pub async fn rate_conversation(
        &self,
        ratings: ConversationRatings,
        comment: &str,
    ) -> SyncResult<ConversationFeedback> {
        self.feedback.rate_conversation(ratings, comment).await
    }

    pub async fn load_conversation_feedback(&self) -> SyncResult<Option<ConversationFeedback>> {
        self.feedback.load_conversation_feedback().await
    }
}
