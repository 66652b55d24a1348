use std::rc::Rc;

use snafu::ResultExt;

use super::context::SessionContext;
use super::error::{ServiceSnafu, SyncResult};
use super::events::PollOutcome;
use super::service::{LocalBoxFuture, MessageService};
use super::state::ActiveContext;
use super::types::MessageBatch;

/// Merges messages newer than the cursor into the ledger.
///
/// The driver decides when to call [`PollSync::sync`]; nothing here schedules
/// itself.
pub(crate) struct PollSync<A: ?Sized> {
    context: SessionContext,
    api: Rc<A>,
}

impl<A> PollSync<A>
where
    A: MessageService + ?Sized,
{
    pub fn new(context: SessionContext, api: Rc<A>) -> Self {
        Self { context, api }
    }

    pub async fn sync(&self) -> SyncResult<PollOutcome> {
        self.sync_once(true).await
    }

    fn sync_once(&self, allow_relocation: bool) -> LocalBoxFuture<'_, SyncResult<PollOutcome>> {
        Box::pin(async move {
            let (target, since) = {
                let state = self.context.state.borrow();
                let Some(target) = state.active_context() else {
                    return Ok(PollOutcome::Idle);
                };
                if state.is_sending() || state.is_renaming() {
                    return Ok(PollOutcome::Deferred);
                }
                (target, state.cursor().value())
            };

            let result = self
                .api
                .fetch_messages(target.conversation_id, since)
                .await;

            if !self.context.is_current(target) {
                tracing::debug!(
                    conversation_id = %target.conversation_id,
                    "conversation changed during poll, discarding batch"
                );
                return Ok(PollOutcome::Stale);
            }
            {
                // A send or rename started while the fetch was in flight; the
                // cursor is untouched, so the next tick fetches the same batch.
                let state = self.context.state.borrow();
                if state.is_sending() || state.is_renaming() {
                    tracing::debug!(
                        conversation_id = %target.conversation_id,
                        "send or rename began during poll, deferring batch"
                    );
                    return Ok(PollOutcome::Deferred);
                }
            }

            match result {
                Ok(batch) => Ok(self.merge(&batch)),
                Err(error) if error.is_network() => {
                    tracing::debug!(
                        conversation_id = %target.conversation_id,
                        error = %error,
                        "poll dropped on network error"
                    );
                    Ok(PollOutcome::Dropped)
                }
                Err(error) if error.is_not_found() => {
                    Ok(self.relocate(target, allow_relocation).await)
                }
                Err(error) => Err(error).context(ServiceSnafu {
                    stage: "poll-messages",
                }),
            }
        })
    }

    /// Appends the unseen part of `batch` and copies any feedback it carries.
    pub fn merge(&self, batch: &MessageBatch) -> PollOutcome {
        let (appended, feedback_updates, last_seq) = {
            let mut state = self.context.state.borrow_mut();
            let appended = state.ledger_mut().merge_batch(&batch.results);
            if appended > 0 {
                state.cursor_mut().advance_to(batch.last_seq);
            }
            let feedback_updates = state.ledger_mut().apply_feedback(&batch.results);
            (appended, feedback_updates, state.cursor().value())
        };

        if appended == 0 {
            if feedback_updates > 0 {
                self.context.refresh();
            }
            return PollOutcome::Unchanged;
        }

        tracing::debug!(appended, last_seq, "merged polled messages");
        self.context.refresh_and_follow();
        PollOutcome::Merged { appended, last_seq }
    }

    async fn relocate(&self, vanished: ActiveContext, allow_recursion: bool) -> PollOutcome {
        let from = vanished.conversation_id;
        let to = {
            let mut state = self.context.state.borrow_mut();
            state.directory_mut().remove(from);
            let fallback = state.directory().fallback_for(from);
            state.activate(fallback);
            fallback
        };
        tracing::warn!(
            conversation_id = %from,
            fallback = ?to,
            "active conversation no longer exists"
        );
        self.context.refresh();

        if to.is_some() && allow_recursion {
            match self.sync_once(false).await {
                Ok(outcome) => tracing::debug!(?outcome, "synced fallback conversation"),
                Err(error) => tracing::warn!(error = %error, "fallback conversation sync failed"),
            }
        }

        PollOutcome::Relocated { from, to }
    }
}
