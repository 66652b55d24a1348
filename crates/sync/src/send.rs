use std::rc::Rc;

use futures::future::{self, Either};
use snafu::OptionExt;

use super::context::SessionContext;
use super::error::{MissingOriginalTextSnafu, NoActiveConversationSnafu, ServiceError, SyncResult};
use super::events::SendOutcome;
use super::ids::{CorrelationToken, TokenKind};
use super::message::Message;
use super::playback::ReplyPlayback;
use super::service::{ConversationService, MessageService};
use super::state::{ActiveContext, SendingGuard};
use super::title::TitleUpdater;
use super::types::SendReceipt;

/// Optimistic send: show the user's text at once, reconcile when the server
/// answers, and leave a retryable entry behind when it does not.
pub(crate) struct SendPipeline<A: ?Sized> {
    context: SessionContext,
    api: Rc<A>,
    playback: ReplyPlayback,
    titles: TitleUpdater<A>,
}

impl<A> SendPipeline<A>
where
    A: MessageService + ConversationService + ?Sized,
{
    pub fn new(context: SessionContext, api: Rc<A>) -> Self {
        Self {
            playback: ReplyPlayback::new(context.clone()),
            titles: TitleUpdater::new(context.clone(), Rc::clone(&api)),
            context,
            api,
        }
    }

    /// Sends already validated `text` to the active conversation.
    pub async fn send(&self, text: &str) -> SyncResult<SendOutcome> {
        let target = self
            .context
            .active_context()
            .context(NoActiveConversationSnafu {
                stage: "send-message",
            })?;
        let conversation_id = target.conversation_id;
        let _sending = SendingGuard::engage(&self.context.state);

        let token = CorrelationToken::mint(TokenKind::Outgoing);
        self.context
            .state
            .borrow_mut()
            .ledger_mut()
            .push_local(Message::user_pending(conversation_id, text, token.clone()));
        self.context.refresh_and_follow();
        tracing::debug!(conversation_id = %conversation_id, token = %token, "sending message");

        let request = self.api.send_message(conversation_id, text);
        let indicator = Box::pin(self.show_thinking_after_delay(target));
        let result = match future::select(request, indicator).await {
            // Dropping the indicator future cancels its timer.
            Either::Left((result, _indicator)) => result,
            Either::Right(((), request)) => request.await,
        };

        if !self.context.is_current(target) {
            tracing::info!(
                conversation_id = %conversation_id,
                "conversation changed while sending, discarding the response"
            );
            return Ok(SendOutcome::Abandoned);
        }

        match result {
            Ok(receipt) => Ok(self.reconcile(target, &token, receipt, text).await),
            Err(error) => Ok(self.fail(target, &token, text, error).await),
        }
    }

    async fn show_thinking_after_delay(&self, target: ActiveContext) {
        self.context
            .sleep(self.context.delays.thinking_indicator())
            .await;

        {
            let mut state = self.context.state.borrow_mut();
            if !state.is_current(target) {
                return;
            }
            state.ledger_mut().push_local(Message::thinking(
                target.conversation_id,
                CorrelationToken::mint(TokenKind::Thinking),
            ));
        }
        tracing::debug!(conversation_id = %target.conversation_id, "reply is slow, showing thinking indicator");
        self.context.refresh_and_follow();
    }

    async fn reconcile(
        &self,
        target: ActiveContext,
        token: &CorrelationToken,
        receipt: SendReceipt,
        text: &str,
    ) -> SendOutcome {
        let SendReceipt {
            user_message,
            ai_message,
        } = receipt;

        let first_exchange = {
            let mut state = self.context.state.borrow_mut();
            let ledger = state.ledger_mut();
            ledger.remove_by_token(token);
            ledger.remove_thinking();
            ledger.insert_confirmed(user_message.clone());

            let mut reply = ai_message.clone();
            reply.begin_typing();
            if !ledger.insert_confirmed(reply) {
                // A poll merged the reply first; play the held entry back instead.
                if let Some(existing) = ledger.get_mut(ai_message.id) {
                    existing.begin_typing();
                }
            }
            let first_exchange = ledger.confirmed_user_messages() == 1;

            state.cursor_mut().advance_to(ai_message.sequence);
            first_exchange
        };
        self.context.refresh_and_follow();
        tracing::info!(
            conversation_id = %target.conversation_id,
            user_message_id = %user_message.id,
            ai_message_id = %ai_message.id,
            "message delivered"
        );

        let playback = self.playback.play(target, ai_message.id, &ai_message.text);
        if first_exchange {
            let titling = self.titles.apply_generated_title(target, text);
            future::join(titling, playback).await;
        } else {
            playback.await;
        }

        SendOutcome::Delivered {
            user_message,
            assistant_message: ai_message,
        }
    }

    async fn fail(
        &self,
        target: ActiveContext,
        token: &CorrelationToken,
        text: &str,
        error: ServiceError,
    ) -> SendOutcome {
        tracing::warn!(
            conversation_id = %target.conversation_id,
            error = %error,
            "send failed"
        );

        {
            let mut state = self.context.state.borrow_mut();
            let ledger = state.ledger_mut();
            ledger.remove_by_token(token);
            ledger.remove_thinking();
        }

        self.context.sleep(self.context.delays.failure_grace()).await;
        if !self.context.is_current(target) {
            return SendOutcome::Abandoned;
        }

        let failed_token = CorrelationToken::mint(TokenKind::Failed);
        self.context
            .state
            .borrow_mut()
            .ledger_mut()
            .push_local(Message::user_failed(
                target.conversation_id,
                text,
                failed_token.clone(),
            ));
        self.context.refresh_and_follow();

        SendOutcome::Failed {
            token: failed_token,
            error,
        }
    }

    /// Collapses every stale attempt of `failed`'s text and sends it again.
    pub async fn retry(&self, failed: &Message) -> SyncResult<SendOutcome> {
        let original_text = failed
            .original_text()
            .context(MissingOriginalTextSnafu {
                stage: "retry-message",
                token: failed
                    .token
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| failed.id.to_string()),
            })?
            .to_string();
        let target = self
            .context
            .active_context()
            .context(NoActiveConversationSnafu {
                stage: "retry-message",
            })?;

        let removed = self
            .context
            .state
            .borrow_mut()
            .ledger_mut()
            .remove_stale_attempts(&original_text);
        tracing::info!(removed, "retrying failed message");
        self.context.refresh();

        self.context.sleep(self.context.delays.retry_settle()).await;
        if !self.context.is_current(target) {
            tracing::info!(
                conversation_id = %target.conversation_id,
                "conversation changed before the retry went out"
            );
            return Ok(SendOutcome::Abandoned);
        }
        self.send(&original_text).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ids::{ConversationId, MessageId};
    use crate::message::{MessageStatus, Role};
    use crate::testing::{Harness, confirmed, network_error};
    use crate::types::GeneratedTitle;

    fn pipeline(harness: &Harness) -> SendPipeline<crate::testing::ScriptedApi> {
        SendPipeline::new(harness.context(), Rc::clone(&harness.api))
    }

    fn hello_receipt() -> SendReceipt {
        SendReceipt {
            user_message: confirmed(10, 1, Role::User, "Hello"),
            ai_message: confirmed(11, 2, Role::Assistant, "Hi!"),
        }
    }

    fn thinking_seen(harness: &Harness) -> usize {
        harness
            .renderer
            .snapshots
            .borrow()
            .iter()
            .map(|snapshot| snapshot.iter().filter(|m| m.is_thinking()).count())
            .max()
            .unwrap_or(0)
    }

    #[tokio::test(start_paused = true)]
    async fn fast_send_replaces_the_provisional_entry() {
        let harness = Harness::new();
        harness.activate(1);
        harness.api.script_send(50, Ok(hello_receipt()));

        let outcome = pipeline(&harness).send("Hello").await;

        assert!(outcome.as_ref().is_ok_and(SendOutcome::is_delivered));
        assert_eq!(harness.ledger_ids(), vec![10, 11]);
        let state = harness.state.borrow();
        assert_eq!(state.cursor().value(), 2);
        assert!(state.ledger().iter().all(|m| !m.is_provisional()));
        assert_eq!(
            state.ledger().get(MessageId::new(11)).map(|m| m.status.clone()),
            Some(MessageStatus::Confirmed)
        );
        assert_eq!(
            state.ledger().get(MessageId::new(11)).map(|m| m.text.as_str()),
            Some("Hi!")
        );
        assert!(!state.is_sending());
        drop(state);

        // The first snapshot shows the optimistic entry, later ones the typing reply.
        let snapshots = harness.renderer.snapshots.borrow();
        assert!(snapshots[0].iter().any(Message::is_pending));
        assert!(snapshots.iter().any(|s| s.iter().any(Message::is_typing)));
        assert_eq!(thinking_seen(&harness), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_failure_shows_one_thinking_entry_then_a_failed_one() {
        let harness = Harness::new();
        harness.activate(1);
        harness.api.script_send(5_000, Err(network_error()));
        let pipeline = pipeline(&harness);

        let probe = async {
            tokio::time::sleep(Duration::from_millis(2_100)).await;
            harness
                .state
                .borrow()
                .ledger()
                .iter()
                .filter(|m| m.is_thinking())
                .count()
        };
        let (outcome, thinking_at_2100) = future::join(pipeline.send("Hello"), probe).await;

        assert_eq!(thinking_at_2100, 1);
        let token = match outcome {
            Ok(SendOutcome::Failed { token, error }) => {
                assert!(error.is_network());
                token
            }
            other => panic!("expected a failed send, got {other:?}"),
        };

        let state = harness.state.borrow();
        let messages = state.ledger().messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].has_token(&token));
        assert_eq!(messages[0].original_text(), Some("Hello"));
        assert!(!state.ledger().has_thinking());
        assert!(!state.is_sending());
    }

    #[tokio::test(start_paused = true)]
    async fn indicator_never_fires_after_settlement() {
        let harness = Harness::new();
        harness.activate(1);
        harness.api.script_send(1_990, Err(network_error()));
        let pipeline = pipeline(&harness);

        let outcome = pipeline.send("Hello").await;
        tokio::time::sleep(Duration::from_millis(5_000)).await;

        assert!(outcome.is_ok_and(|outcome| outcome.is_failed()));
        assert_eq!(thinking_seen(&harness), 0);
        assert!(!harness.state.borrow().ledger().has_thinking());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_success_removes_thinking_before_playback() {
        let harness = Harness::new();
        harness.activate(1);
        harness.api.script_send(3_000, Ok(hello_receipt()));

        let outcome = pipeline(&harness).send("Hello").await;

        assert!(outcome.is_ok_and(|outcome| outcome.is_delivered()));
        assert_eq!(thinking_seen(&harness), 1);
        let snapshots = harness.renderer.snapshots.borrow();
        let typing_frames = snapshots
            .iter()
            .filter(|s| s.iter().any(Message::is_typing))
            .collect::<Vec<_>>();
        assert!(!typing_frames.is_empty());
        assert!(
            typing_frames
                .iter()
                .all(|s| !s.iter().any(Message::is_thinking))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_exchange_titles_the_conversation() {
        let harness = Harness::new();
        harness.activate(1);
        harness.api.script_send(50, Ok(hello_receipt()));
        harness.api.script_title(Ok(GeneratedTitle {
            title: "Greetings".to_string(),
        }));
        let pipeline = pipeline(&harness);

        let _ = pipeline.send("Hello").await;

        assert_eq!(harness.api.title_requests.borrow().clone(), vec!["Hello"]);
        assert_eq!(
            harness
                .state
                .borrow()
                .directory()
                .get(ConversationId::new(1))
                .map(|c| c.display_title().to_string()),
            Some("Greetings".to_string())
        );

        harness.api.script_send(
            50,
            Ok(SendReceipt {
                user_message: confirmed(12, 3, Role::User, "More"),
                ai_message: confirmed(13, 4, Role::Assistant, "Sure."),
            }),
        );
        let _ = pipeline.send("More").await;
        assert_eq!(harness.api.title_requests.borrow().len(), 1);
        assert_eq!(harness.state.borrow().cursor().value(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn title_failure_never_fails_the_send() {
        let harness = Harness::new();
        harness.activate(1);
        harness.api.script_send(50, Ok(hello_receipt()));
        harness.api.fail_renames.set(true);

        let outcome = pipeline(&harness).send("Hello").await;

        assert!(outcome.is_ok_and(|outcome| outcome.is_delivered()));
        assert_eq!(harness.ledger_ids(), vec![10, 11]);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_conversation_mid_send_abandons_the_response() {
        let harness = Harness::new();
        harness.activate(1);
        harness.api.script_send(500, Ok(hello_receipt()));
        let pipeline = pipeline(&harness);

        let switch = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            harness.activate(2);
        };
        let (outcome, ()) = future::join(pipeline.send("Hello"), switch).await;

        assert!(matches!(outcome, Ok(SendOutcome::Abandoned)));
        assert!(harness.state.borrow().ledger().is_empty());
        assert_eq!(harness.state.borrow().cursor().value(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_collapses_stale_attempts_into_one_send() {
        let harness = Harness::new();
        harness.activate(1);
        let conversation = ConversationId::new(1);
        let failed = Message::user_failed(
            conversation,
            "Hello",
            CorrelationToken::mint(TokenKind::Failed),
        );
        {
            let mut state = harness.state.borrow_mut();
            state.ledger_mut().push_local(failed.clone());
            state.ledger_mut().push_local(Message::user_pending(
                conversation,
                "Hello",
                CorrelationToken::mint(TokenKind::Outgoing),
            ));
        }
        harness.api.script_send(50, Ok(hello_receipt()));

        let started = tokio::time::Instant::now();
        let outcome = pipeline(&harness).retry(&failed).await;

        assert!(outcome.is_ok_and(|outcome| outcome.is_delivered()));
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(
            harness.api.sent.borrow().clone(),
            vec![(conversation, "Hello".to_string())]
        );
        assert_eq!(harness.ledger_ids(), vec![10, 11]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_is_abandoned_when_the_conversation_changes_while_settling() {
        let harness = Harness::new();
        harness.activate(1);
        let failed = Message::user_failed(
            ConversationId::new(1),
            "Hello",
            CorrelationToken::mint(TokenKind::Failed),
        );
        harness
            .state
            .borrow_mut()
            .ledger_mut()
            .push_local(failed.clone());
        harness.api.script_send(10, Ok(hello_receipt()));
        let pipeline = pipeline(&harness);

        let switch = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            harness.activate(2);
        };
        let (outcome, ()) = future::join(pipeline.retry(&failed), switch).await;

        assert!(matches!(outcome, Ok(SendOutcome::Abandoned)));
        assert!(harness.api.sent.borrow().is_empty());
        assert!(harness.ledger_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_requires_original_text() {
        let harness = Harness::new();
        harness.activate(1);
        let confirmed_message = confirmed(10, 1, Role::User, "Hello");

        let outcome = pipeline(&harness).retry(&confirmed_message).await;

        assert!(matches!(
            outcome,
            Err(crate::error::SyncError::MissingOriginalText { .. })
        ));
        assert!(harness.api.sent.borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn send_without_active_conversation_is_rejected() {
        let harness = Harness::new();

        let outcome = pipeline(&harness).send("Hello").await;

        assert!(matches!(
            outcome,
            Err(crate::error::SyncError::NoActiveConversation { .. })
        ));
    }
}
