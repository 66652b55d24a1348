//! Line-oriented rendering of the chat state.
//!
//! A terminal cannot rewrite earlier lines, so the transcript remembers which
//! ledger entries it has already printed and only appends what is new. Reply
//! playback streams into one open line through [`NodeHandle`].

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::rc::Rc;

use chatline_sync::{
    ChatState, ConversationId, Message, MessageId, MessageKey, NodeHandle, Renderer, Role,
    TYPING_CURSOR,
};

enum Shown {
    Line,
    /// Bytes of the reply already written to the open line.
    Streaming(usize),
}

struct Transcript {
    out: Box<dyn Write>,
    started: bool,
    conversation: Option<ConversationId>,
    shown: HashMap<MessageKey, Shown>,
    echoed: Vec<String>,
    rated: HashSet<MessageId>,
    conversation_rated: bool,
    open_line: bool,
}

impl Transcript {
    fn emit(&mut self, text: &str) {
        // A broken stdout only loses transcript output; the session keeps going.
        if let Err(error) = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush()) {
            tracing::debug!(error = %error, "failed to write transcript");
        }
    }

    fn line(&mut self, text: &str) {
        if self.open_line {
            self.emit("\n");
            self.open_line = false;
        }
        self.emit(text);
        self.emit("\n");
    }

    fn reset(&mut self, conversation: Option<ConversationId>, title: Option<&str>) {
        self.conversation = conversation;
        self.shown.clear();
        self.echoed.clear();
        self.rated.clear();
        self.conversation_rated = false;
        match (conversation, title) {
            (Some(id), Some(title)) => self.line(&format!("== {title} (#{id}) ==")),
            (Some(id), None) => self.line(&format!("== #{id} ==")),
            (None, _) => self.line("== no conversation, /new to start one =="),
        }
    }

    /// Writes the part of `text` beyond what was already streamed for `key`.
    fn stream(&mut self, key: &MessageKey, text: &str) {
        let visible = text.trim_end_matches(TYPING_CURSOR);
        let written = match self.shown.get(key) {
            Some(Shown::Streaming(written)) => *written,
            Some(Shown::Line) => return,
            None => {
                self.line_prefix("ai");
                0
            }
        };
        if let Some(delta) = visible.get(written..) {
            if !delta.is_empty() {
                self.emit(delta);
                self.open_line = true;
            }
        }
        self.shown
            .insert(key.clone(), Shown::Streaming(visible.len().max(written)));
    }

    fn line_prefix(&mut self, label: &str) {
        if self.open_line {
            self.emit("\n");
        }
        self.emit(&format!("{label}: "));
        self.open_line = true;
    }

    fn close_stream(&mut self, key: &MessageKey, text: &str) {
        self.stream(key, text);
        if self.open_line {
            self.emit("\n");
            self.open_line = false;
        }
        self.shown.insert(key.clone(), Shown::Line);
    }

    fn show(&mut self, message: &Message) {
        let key = message.key();
        if message.is_typing() {
            // Playback has not revealed anything until the cursor shows up.
            if message.text.ends_with(TYPING_CURSOR) {
                self.stream(&key, &message.text);
            }
            return;
        }
        if matches!(self.shown.get(&key), Some(Shown::Streaming(_))) {
            self.close_stream(&key, &message.text);
            return;
        }
        if self.shown.contains_key(&key) {
            return;
        }

        self.shown.insert(key, Shown::Line);
        if message.is_pending() {
            // The terminal already echoed what the user typed.
            self.echoed.push(message.text.clone());
            return;
        }
        if message.is_thinking() {
            self.line("ai is thinking...");
            return;
        }
        if message.is_failed() {
            self.line(&format!("! not delivered: {} (/retry to resend)", message.text));
            return;
        }
        if message.role == Role::User {
            if let Some(position) = self.echoed.iter().position(|text| *text == message.text) {
                self.echoed.remove(position);
                return;
            }
        }

        let label = match message.role {
            Role::User => "you",
            Role::Assistant => "ai",
        };
        if message.id.is_confirmed() {
            self.line(&format!("{label} [#{}]: {}", message.id, message.text));
        } else {
            self.line(&format!("{label}: {}", message.text));
        }
    }

    fn show_feedback(&mut self, message: &Message) {
        let Some(feedback) = &message.feedback else {
            return;
        };
        if self.rated.insert(message.id) {
            self.line(&format!("  (#{} rated {}/5)", message.id, feedback.rating));
        }
    }
}

#[derive(Clone)]
pub struct TerminalRenderer {
    transcript: Rc<RefCell<Transcript>>,
}

impl TerminalRenderer {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            transcript: Rc::new(RefCell::new(Transcript {
                out,
                started: false,
                conversation: None,
                shown: HashMap::new(),
                echoed: Vec::new(),
                rated: HashSet::new(),
                conversation_rated: false,
                open_line: false,
            })),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Prints a line outside of the transcript, e.g. command output.
    pub fn notice(&self, text: &str) {
        self.transcript.borrow_mut().line(text);
    }
}

impl Renderer for TerminalRenderer {
    fn render(&self, state: &ChatState) {
        let mut transcript = self.transcript.borrow_mut();
        let active = state.active_conversation_id();
        if !transcript.started || transcript.conversation != active {
            transcript.started = true;
            let title = state
                .directory()
                .active_conversation()
                .map(|conversation| conversation.display_title().to_string());
            transcript.reset(active, title.as_deref());
        }

        for message in state.ledger().iter() {
            transcript.show(message);
            transcript.show_feedback(message);
        }

        if let Some(feedback) = state.conversation_feedback() {
            if !transcript.conversation_rated {
                transcript.conversation_rated = true;
                let ratings = feedback.ratings;
                transcript.line(&format!(
                    "  (conversation rated {}/{}/{})",
                    ratings.overall, ratings.helpfulness, ratings.accuracy
                ));
            }
        }
    }

    fn locate(&self, key: &MessageKey) -> Option<Box<dyn NodeHandle>> {
        Some(Box::new(StreamHandle {
            transcript: Rc::clone(&self.transcript),
            key: key.clone(),
        }))
    }
}

struct StreamHandle {
    transcript: Rc<RefCell<Transcript>>,
    key: MessageKey,
}

impl NodeHandle for StreamHandle {
    fn set_text(&self, text: &str) {
        self.transcript.borrow_mut().stream(&self.key, text);
    }
}
