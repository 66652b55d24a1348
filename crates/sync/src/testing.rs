//! Scripted collaborators shared by the engine tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;

use crate::context::SessionContext;
use crate::delays::{Delays, TokioSleeper};
use crate::error::{ServiceError, ServiceResult};
use crate::gate::RenderGate;
use crate::ids::{ConversationId, FeedbackId, MessageId};
use crate::message::{Message, MessageFeedback, MessageKey, MessageStatus, Role};
use crate::render::{NodeHandle, Renderer, Surface};
use crate::service::{ConversationService, FeedbackService, LocalBoxFuture, MessageService};
use crate::state::{ChatState, SharedState};
use crate::types::{
    Conversation, ConversationFeedback, ConversationPage, ConversationRatings, GeneratedTitle,
    MessageBatch, SendReceipt,
};

pub(crate) fn confirmed(id: i64, sequence: u64, role: Role, text: &str) -> Message {
    Message {
        id: MessageId::new(id),
        conversation: ConversationId::new(1),
        role,
        text: text.to_string(),
        created_at: Utc::now(),
        sequence,
        feedback: None,
        token: None,
        status: MessageStatus::Confirmed,
    }
}

pub(crate) fn conversation(id: u64, title: Option<&str>) -> Conversation {
    Conversation {
        id: ConversationId::new(id),
        title: title.map(str::to_string),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub(crate) fn network_error() -> ServiceError {
    ServiceError::Network {
        stage: "test",
        path: "conversations/1/messages/".to_string(),
        details: "connection reset".to_string(),
    }
}

pub(crate) fn not_found() -> ServiceError {
    ServiceError::NotFound {
        stage: "test",
        path: "conversations/1/messages/".to_string(),
        body: "{\"detail\":\"Not found.\"}".to_string(),
    }
}

/// Records every visual effect it is asked to perform.
#[derive(Default)]
pub(crate) struct RecordingRenderer {
    pub renders: Cell<usize>,
    pub scrolls: Cell<usize>,
    pub distance: Cell<f32>,
    pub addressable: Cell<bool>,
    pub snapshots: RefCell<Vec<Vec<Message>>>,
    pub patches: Rc<RefCell<Vec<String>>>,
}

struct RecordingHandle {
    patches: Rc<RefCell<Vec<String>>>,
}

impl NodeHandle for RecordingHandle {
    fn set_text(&self, text: &str) {
        self.patches.borrow_mut().push(text.to_string());
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, state: &ChatState) {
        self.renders.set(self.renders.get() + 1);
        self.snapshots
            .borrow_mut()
            .push(state.ledger().messages().to_vec());
    }

    fn locate(&self, _key: &MessageKey) -> Option<Box<dyn NodeHandle>> {
        if !self.addressable.get() {
            return None;
        }
        Some(Box::new(RecordingHandle {
            patches: Rc::clone(&self.patches),
        }))
    }

    fn scroll_to_bottom(&self) {
        self.scrolls.set(self.scrolls.get() + 1);
    }

    fn distance_from_bottom(&self) -> f32 {
        self.distance.get()
    }
}

pub(crate) struct Scripted<T> {
    delay: Duration,
    result: ServiceResult<T>,
}

/// In-memory server whose answers and latencies are queued up front.
///
/// Unscripted fetches return an empty batch and unscripted sends fail with a
/// network error.
#[derive(Default)]
pub(crate) struct ScriptedApi {
    fetches: RefCell<VecDeque<Scripted<MessageBatch>>>,
    sends: RefCell<VecDeque<Scripted<SendReceipt>>>,
    titles: RefCell<VecDeque<ServiceResult<GeneratedTitle>>>,
    pub conversations: RefCell<Vec<Conversation>>,
    pub stored_feedback: RefCell<Option<ConversationFeedback>>,
    pub fail_renames: Cell<bool>,
    pub fail_feedback: Cell<bool>,
    pub fetch_calls: RefCell<Vec<(ConversationId, u64)>>,
    pub sent: RefCell<Vec<(ConversationId, String)>>,
    pub renamed: RefCell<Vec<(ConversationId, String)>>,
    pub deleted: RefCell<Vec<ConversationId>>,
    pub title_requests: RefCell<Vec<String>>,
    pub rated_messages: RefCell<Vec<(MessageId, u8)>>,
}

impl ScriptedApi {
    pub fn script_fetch(&self, delay_ms: u64, result: ServiceResult<MessageBatch>) {
        self.fetches.borrow_mut().push_back(Scripted {
            delay: Duration::from_millis(delay_ms),
            result,
        });
    }

    pub fn script_send(&self, delay_ms: u64, result: ServiceResult<SendReceipt>) {
        self.sends.borrow_mut().push_back(Scripted {
            delay: Duration::from_millis(delay_ms),
            result,
        });
    }

    pub fn script_title(&self, result: ServiceResult<GeneratedTitle>) {
        self.titles.borrow_mut().push_back(result);
    }

    fn status_error(path: &str) -> ServiceError {
        ServiceError::Status {
            stage: "test",
            path: path.to_string(),
            status: 500,
            body: "server error".to_string(),
        }
    }
}

impl MessageService for ScriptedApi {
    fn fetch_messages<'a>(
        &'a self,
        conversation: ConversationId,
        since: u64,
    ) -> LocalBoxFuture<'a, ServiceResult<MessageBatch>> {
        self.fetch_calls.borrow_mut().push((conversation, since));
        let scripted = self.fetches.borrow_mut().pop_front();
        Box::pin(async move {
            match scripted {
                Some(Scripted { delay, result }) => {
                    tokio::time::sleep(delay).await;
                    result
                }
                None => Ok(MessageBatch {
                    results: Vec::new(),
                    last_seq: since,
                }),
            }
        })
    }

    fn send_message<'a>(
        &'a self,
        conversation: ConversationId,
        text: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<SendReceipt>> {
        self.sent.borrow_mut().push((conversation, text.to_string()));
        let scripted = self.sends.borrow_mut().pop_front();
        Box::pin(async move {
            match scripted {
                Some(Scripted { delay, result }) => {
                    tokio::time::sleep(delay).await;
                    result
                }
                None => Err(network_error()),
            }
        })
    }
}

impl ConversationService for ScriptedApi {
    fn list_conversations<'a>(
        &'a self,
        _limit: u32,
    ) -> LocalBoxFuture<'a, ServiceResult<ConversationPage>> {
        let results = self.conversations.borrow().clone();
        Box::pin(async move {
            Ok(ConversationPage {
                count: results.len() as u64,
                results,
            })
        })
    }

    fn create_conversation<'a>(
        &'a self,
        title: Option<&'a str>,
    ) -> LocalBoxFuture<'a, ServiceResult<Conversation>> {
        Box::pin(async move {
            let mut conversations = self.conversations.borrow_mut();
            let id = conversations
                .iter()
                .map(|conversation| conversation.id.get())
                .max()
                .unwrap_or(0)
                + 1;
            let created = conversation(id, title);
            conversations.push(created.clone());
            Ok(created)
        })
    }

    fn rename_conversation<'a>(
        &'a self,
        conversation_id: ConversationId,
        title: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<Conversation>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail_renames.get() {
                return Err(Self::status_error("conversations/1/"));
            }
            self.renamed
                .borrow_mut()
                .push((conversation_id, title.to_string()));
            Ok(conversation(conversation_id.get(), Some(title)))
        })
    }

    fn delete_conversation<'a>(
        &'a self,
        conversation_id: ConversationId,
    ) -> LocalBoxFuture<'a, ServiceResult<()>> {
        Box::pin(async move {
            self.deleted.borrow_mut().push(conversation_id);
            self.conversations
                .borrow_mut()
                .retain(|conversation| conversation.id != conversation_id);
            Ok(())
        })
    }

    fn generate_title<'a>(
        &'a self,
        first_message: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<GeneratedTitle>> {
        self.title_requests
            .borrow_mut()
            .push(first_message.to_string());
        let scripted = self.titles.borrow_mut().pop_front();
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            scripted.unwrap_or_else(|| Err(Self::status_error("conversations/generate-title/")))
        })
    }

    fn load_conversation_feedback<'a>(
        &'a self,
        _conversation: ConversationId,
    ) -> LocalBoxFuture<'a, ServiceResult<Option<ConversationFeedback>>> {
        let stored = self.stored_feedback.borrow().clone();
        Box::pin(async move { Ok(stored) })
    }
}

impl FeedbackService for ScriptedApi {
    fn submit_message_feedback<'a>(
        &'a self,
        message: MessageId,
        rating: u8,
        comment: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<MessageFeedback>> {
        Box::pin(async move {
            if self.fail_feedback.get() {
                return Err(Self::status_error("messages/1/feedback/"));
            }
            self.rated_messages.borrow_mut().push((message, rating));
            Ok(MessageFeedback {
                id: FeedbackId::new(1),
                rating,
                comment: (!comment.is_empty()).then(|| comment.to_string()),
                created_at: Utc::now(),
            })
        })
    }

    fn submit_conversation_feedback<'a>(
        &'a self,
        conversation: ConversationId,
        ratings: ConversationRatings,
        comment: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<ConversationFeedback>> {
        Box::pin(async move {
            if self.fail_feedback.get() {
                return Err(Self::status_error("conversations/1/feedback/"));
            }
            let feedback = ConversationFeedback {
                id: FeedbackId::new(2),
                conversation,
                ratings,
                comment: (!comment.is_empty()).then(|| comment.to_string()),
                created_at: Utc::now(),
            };
            *self.stored_feedback.borrow_mut() = Some(feedback.clone());
            Ok(feedback)
        })
    }
}

/// State, renderer, gate and server wired together for flow-level tests.
pub(crate) struct Harness {
    pub state: SharedState,
    pub renderer: Rc<RecordingRenderer>,
    pub gate: Rc<RenderGate>,
    pub api: Rc<ScriptedApi>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ChatState::new())),
            renderer: Rc::new(RecordingRenderer::default()),
            gate: Rc::new(RenderGate::new()),
            api: Rc::new(ScriptedApi::default()),
        }
    }

    /// Registers and activates conversation `id`.
    pub fn activate(&self, id: u64) {
        let mut state = self.state.borrow_mut();
        state.directory_mut().insert(conversation(id, None));
        state.activate(Some(ConversationId::new(id)));
    }

    pub fn context(&self) -> SessionContext {
        let renderer: Rc<dyn Renderer> = self.renderer.clone();
        SessionContext {
            state: Rc::clone(&self.state),
            surface: Surface::new(renderer, Rc::clone(&self.gate)),
            sleeper: Rc::new(TokioSleeper),
            delays: Delays::default(),
        }
    }

    pub fn ledger_ids(&self) -> Vec<i64> {
        self.state
            .borrow()
            .ledger()
            .iter()
            .map(|message| message.id.get())
            .collect()
    }
}
