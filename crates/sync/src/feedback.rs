use std::ops::RangeInclusive;
use std::rc::Rc;

use snafu::{OptionExt, ResultExt, ensure};

use super::context::SessionContext;
use super::error::{
    AlreadyRatedSnafu, InvalidRatingSnafu, NoActiveConversationSnafu, ServiceSnafu, SyncResult,
    UnknownMessageSnafu,
};
use super::ids::MessageId;
use super::message::MessageFeedback;
use super::service::{ConversationService, FeedbackService};
use super::types::{ConversationFeedback, ConversationRatings};

const RATING_RANGE: RangeInclusive<u8> = 1..=5;

fn validate_rating(field: &'static str, rating: u8) -> SyncResult<()> {
    ensure!(
        RATING_RANGE.contains(&rating),
        InvalidRatingSnafu {
            stage: "validate-rating",
            field,
            rating,
        }
    );
    Ok(())
}

/// User-initiated ratings. Failures are returned so the caller can tell the
/// user; attachments are immutable once stored.
pub(crate) struct FeedbackFlow<A: ?Sized> {
    context: SessionContext,
    api: Rc<A>,
}

impl<A> FeedbackFlow<A>
where
    A: FeedbackService + ConversationService + ?Sized,
{
    pub fn new(context: SessionContext, api: Rc<A>) -> Self {
        Self { context, api }
    }

    pub async fn rate_message(
        &self,
        message_id: MessageId,
        rating: u8,
        comment: &str,
    ) -> SyncResult<MessageFeedback> {
        validate_rating("message", rating)?;
        let target = {
            let state = self.context.state.borrow();
            let message = state
                .ledger()
                .get(message_id)
                .context(UnknownMessageSnafu {
                    stage: "rate-message",
                    message_id,
                })?;
            ensure!(
                message.feedback.is_none(),
                AlreadyRatedSnafu {
                    stage: "rate-message",
                    target: format!("message {message_id}"),
                }
            );
            state.active_context()
        };

        let feedback = self
            .api
            .submit_message_feedback(message_id, rating, comment.trim())
            .await
            .context(ServiceSnafu {
                stage: "submit-message-feedback",
            })?;

        let stored = {
            let mut state = self.context.state.borrow_mut();
            let current = target.is_some_and(|target| state.is_current(target));
            match state.ledger_mut().get_mut(message_id) {
                Some(message) if current => {
                    message.feedback = Some(feedback.clone());
                    true
                }
                _ => false,
            }
        };
        if stored {
            self.context.refresh();
        }
        tracing::info!(message_id = %message_id, rating, "message rated");
        Ok(feedback)
    }

    pub async fn rate_conversation(
        &self,
        ratings: ConversationRatings,
        comment: &str,
    ) -> SyncResult<ConversationFeedback> {
        for (field, rating) in ratings.fields() {
            validate_rating(field, rating)?;
        }
        let target = {
            let state = self.context.state.borrow();
            let target = state.active_context().context(NoActiveConversationSnafu {
                stage: "rate-conversation",
            })?;
            ensure!(
                state.conversation_feedback().is_none(),
                AlreadyRatedSnafu {
                    stage: "rate-conversation",
                    target: format!("conversation {}", target.conversation_id),
                }
            );
            target
        };

        let feedback = self
            .api
            .submit_conversation_feedback(target.conversation_id, ratings, comment.trim())
            .await
            .context(ServiceSnafu {
                stage: "submit-conversation-feedback",
            })?;

        let stored = {
            let mut state = self.context.state.borrow_mut();
            if state.is_current(target) {
                state.set_conversation_feedback(Some(feedback.clone()));
                true
            } else {
                false
            }
        };
        if stored {
            self.context.refresh();
        }
        tracing::info!(conversation_id = %target.conversation_id, "conversation rated");
        Ok(feedback)
    }

    /// Loads the active conversation's rating. Not found means "not yet rated".
    pub async fn load_conversation_feedback(&self) -> SyncResult<Option<ConversationFeedback>> {
        let Some(target) = self.context.active_context() else {
            return Ok(None);
        };

        let feedback = match self
            .api
            .load_conversation_feedback(target.conversation_id)
            .await
        {
            Ok(feedback) => feedback,
            Err(error) if error.is_not_found() => None,
            Err(error) => {
                return Err(error).context(ServiceSnafu {
                    stage: "load-conversation-feedback",
                });
            }
        };

        let stored = {
            let mut state = self.context.state.borrow_mut();
            if state.is_current(target) {
                state.set_conversation_feedback(feedback.clone());
                true
            } else {
                false
            }
        };
        if stored {
            self.context.refresh();
        }
        Ok(feedback)
    }
}
