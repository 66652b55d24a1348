use std::cell::RefCell;
use std::rc::Rc;

use super::cursor::SequenceCursor;
use super::directory::ConversationDirectory;
use super::ids::ConversationId;
use super::ledger::Ledger;
use super::types::ConversationFeedback;

/// State shared by every flow of one session.
///
/// Flows borrow it between suspension points only; a borrow is never held
/// across an `.await`.
pub type SharedState = Rc<RefCell<ChatState>>;

/// Snapshot of which conversation a flow started against.
///
/// The epoch changes on every activation, including re-selecting the same
/// id, so a flow resumed after a switch can tell that its ledger is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveContext {
    pub conversation_id: ConversationId,
    pub epoch: u64,
}

#[derive(Debug, Default)]
pub struct ChatState {
    directory: ConversationDirectory,
    ledger: Ledger,
    cursor: SequenceCursor,
    conversation_feedback: Option<ConversationFeedback>,
    sending: usize,
    renaming: bool,
    epoch: u64,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn cursor(&self) -> SequenceCursor {
        self.cursor
    }

    pub fn conversation_feedback(&self) -> Option<&ConversationFeedback> {
        self.conversation_feedback.as_ref()
    }

    pub fn active_conversation_id(&self) -> Option<ConversationId> {
        self.directory.active()
    }

    pub fn is_sending(&self) -> bool {
        self.sending > 0
    }

    pub fn is_renaming(&self) -> bool {
        self.renaming
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn active_context(&self) -> Option<ActiveContext> {
        self.directory.active().map(|conversation_id| ActiveContext {
            conversation_id,
            epoch: self.epoch,
        })
    }

    /// True while `context` still names the loaded conversation.
    pub fn is_current(&self, context: ActiveContext) -> bool {
        self.epoch == context.epoch && self.directory.active() == Some(context.conversation_id)
    }

    pub(crate) fn directory_mut(&mut self) -> &mut ConversationDirectory {
        &mut self.directory
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub(crate) fn cursor_mut(&mut self) -> &mut SequenceCursor {
        &mut self.cursor
    }

    pub(crate) fn set_conversation_feedback(&mut self, feedback: Option<ConversationFeedback>) {
        self.conversation_feedback = feedback;
    }

    /// Switches the loaded conversation. The ledger, cursor and conversation
    /// feedback belong to the previous conversation and are discarded.
    pub(crate) fn activate(&mut self, conversation: Option<ConversationId>) {
        self.ledger.clear();
        self.cursor.reset();
        self.conversation_feedback = None;
        self.epoch = self.epoch.wrapping_add(1);
        self.directory.set_active(conversation);
        tracing::debug!(
            conversation_id = ?conversation,
            epoch = self.epoch,
            "activated conversation"
        );
    }
}

/// Marks a send in flight until dropped.
pub(crate) struct SendingGuard {
    state: SharedState,
}

impl SendingGuard {
    pub(crate) fn engage(state: &SharedState) -> Self {
        state.borrow_mut().sending += 1;
        Self {
            state: Rc::clone(state),
        }
    }
}

impl Drop for SendingGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.sending = state.sending.saturating_sub(1);
        } else {
            tracing::error!("state borrowed while releasing the sending flag");
        }
    }
}

/// Marks a rename in flight until dropped.
pub(crate) struct RenamingGuard {
    state: SharedState,
}

impl RenamingGuard {
    pub(crate) fn engage(state: &SharedState) -> Self {
        state.borrow_mut().renaming = true;
        Self {
            state: Rc::clone(state),
        }
    }
}

impl Drop for RenamingGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.renaming = false;
        } else {
            tracing::error!("state borrowed while releasing the renaming flag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_discards_the_previous_conversation() {
        let state = Rc::new(RefCell::new(ChatState::new()));
        state.borrow_mut().activate(Some(ConversationId::new(1)));
        let first = state.borrow().active_context();
        state.borrow_mut().cursor_mut().advance_to(9);

        state.borrow_mut().activate(Some(ConversationId::new(1)));

        let state = state.borrow();
        assert_eq!(state.cursor().value(), 0);
        assert!(state.ledger().is_empty());
        assert!(first.is_some_and(|context| !state.is_current(context)));
        assert!(
            state
                .active_context()
                .is_some_and(|context| state.is_current(context))
        );
    }

    #[test]
    fn guards_release_their_flags_on_drop() {
        let state = Rc::new(RefCell::new(ChatState::new()));

        {
            let _first = SendingGuard::engage(&state);
            let _second = SendingGuard::engage(&state);
            let _renaming = RenamingGuard::engage(&state);
            assert!(state.borrow().is_sending());
            assert!(state.borrow().is_renaming());
        }

        assert!(!state.borrow().is_sending());
        assert!(!state.borrow().is_renaming());
    }
}
