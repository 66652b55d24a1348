use super::context::SessionContext;
use super::ids::MessageId;
use super::message::MessageKey;
use super::render::NodeHandle;
use super::state::ActiveContext;

/// Marker appended to the revealed prefix while a reply is typing.
pub const TYPING_CURSOR: char = '●';

/// Byte offsets at which each whitespace-delimited word of `text` ends.
fn word_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut in_word = false;
    for (index, character) in text.char_indices() {
        if character.is_whitespace() {
            if in_word {
                ends.push(index);
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    if in_word {
        ends.push(text.len());
    }
    ends
}

/// Reveals a fully received assistant reply one word at a time.
///
/// Playback always runs to completion. A closed render gate skips the visual
/// patch of a step but never its pause; a conversation switch skips the
/// ledger mutation for the same reason.
pub(crate) struct ReplyPlayback {
    context: SessionContext,
}

impl ReplyPlayback {
    pub fn new(context: SessionContext) -> Self {
        Self { context }
    }

    pub async fn play(&self, target: ActiveContext, message_id: MessageId, full_text: &str) {
        let removed = {
            let mut state = self.context.state.borrow_mut();
            if state.is_current(target) {
                state.ledger_mut().remove_thinking()
            } else {
                0
            }
        };
        if removed > 0 {
            self.context.refresh();
        }

        let key = MessageKey::Id(message_id);
        let threshold = self.context.delays.near_bottom_threshold();
        let mut handle: Option<Box<dyn NodeHandle>> = None;
        let ends = word_ends(full_text);
        tracing::debug!(
            message_id = %message_id,
            words = ends.len(),
            "starting reply playback"
        );

        for end in ends {
            let shown = format!("{}{}", &full_text[..end], TYPING_CURSOR);
            let updated = self.reveal(target, message_id, &shown);

            if updated && !self.context.surface.is_suspended() {
                if handle.is_none() {
                    handle = self.context.surface.locate(&key);
                }
                match &handle {
                    Some(node) => node.set_text(&shown),
                    None => {
                        self.context.refresh();
                    }
                }
                self.context.surface.follow_if_near_bottom(threshold);
            }

            self.context
                .sleep(self.context.delays.playback_step())
                .await;
        }

        {
            let mut state = self.context.state.borrow_mut();
            if state.is_current(target) {
                if let Some(message) = state.ledger_mut().get_mut(message_id) {
                    message.finish_typing(full_text);
                }
            }
        }
        self.context.refresh_and_follow();
        tracing::debug!(message_id = %message_id, "reply playback finished");
    }

    fn reveal(&self, target: ActiveContext, message_id: MessageId, shown: &str) -> bool {
        let mut state = self.context.state.borrow_mut();
        if !state.is_current(target) {
            return false;
        }

        match state.ledger_mut().get_mut(message_id) {
            Some(message) => {
                message.text = shown.to_string();
                true
            }
            None => false,
        }
    }
}
