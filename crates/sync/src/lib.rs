//! Message synchronization engine of the chatline client.
//!
//! The engine keeps the active conversation's ledger consistent while an
//! optimistic send, its reply playback and background poll-sync interleave on
//! one cooperative thread.

mod context;
pub mod cursor;
pub mod delays;
pub mod directory;
pub mod error;
pub mod events;
mod feedback;
pub mod gate;
pub mod ids;
pub mod ledger;
pub mod message;
mod playback;
mod poll;
pub mod render;
mod send;
pub mod service;
pub mod session;
pub mod state;
#[cfg(test)]
mod testing;
pub mod title;
pub mod types;

pub use cursor::SequenceCursor;
pub use delays::{Delays, Sleeper, TokioSleeper};
pub use directory::ConversationDirectory;
pub use error::{ServiceError, ServiceResult, SyncError, SyncResult};
pub use events::{PollOutcome, SendOutcome};
pub use gate::RenderGate;
pub use ids::{ConversationId, CorrelationToken, FeedbackId, MessageId, TokenKind};
pub use ledger::Ledger;
pub use message::{Message, MessageFeedback, MessageKey, MessageStatus, Role, THINKING_TEXT};
pub use playback::TYPING_CURSOR;
pub use render::{NodeHandle, Renderer, Surface};
pub use service::{ChatApi, ConversationService, FeedbackService, LocalBoxFuture, MessageService};
pub use session::{ChatSession, DEFAULT_PAGE_LIMIT, SessionOptions};
pub use state::{ActiveContext, ChatState, SharedState};
pub use title::fallback_title;
pub use types::{
    Conversation, ConversationFeedback, ConversationPage, ConversationRatings,
    DEFAULT_CONVERSATION_TITLE, GeneratedTitle, MessageBatch, SendReceipt, WELCOME_TEXT,
};
