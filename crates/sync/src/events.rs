use super::error::ServiceError;
use super::ids::{ConversationId, CorrelationToken};
use super::message::Message;

/// How one send attempt settled.
#[derive(Debug)]
pub enum SendOutcome {
    /// The server confirmed the pair and the reply has been played back.
    Delivered {
        user_message: Message,
        assistant_message: Message,
    },
    /// The attempt failed; the ledger now holds a retryable entry under `token`.
    Failed {
        token: CorrelationToken,
        error: ServiceError,
    },
    /// The active conversation changed while the request was in flight.
    Abandoned,
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// What one poll-sync invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No conversation is active.
    Idle,
    /// Skipped because a send or rename is in flight.
    Deferred,
    /// The batch held nothing new.
    Unchanged,
    Merged { appended: usize, last_seq: u64 },
    /// A connectivity failure was ignored; the next tick tries again.
    Dropped,
    /// The conversation changed while the fetch was suspended.
    Stale,
    /// The conversation vanished server-side and another one was selected.
    Relocated {
        from: ConversationId,
        to: Option<ConversationId>,
    },
}
