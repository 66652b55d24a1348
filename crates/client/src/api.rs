use chatline_sync::{
    Conversation, ConversationFeedback, ConversationId, ConversationPage, ConversationRatings,
    ConversationService, FeedbackService, GeneratedTitle, LocalBoxFuture, MessageBatch,
    MessageFeedback, MessageId, MessageService, SendReceipt, ServiceResult,
};
use reqwest::Method;
use serde::Serialize;

use super::settings::ClientSettings;
use super::transport::HttpTransport;

#[derive(Serialize)]
struct SendMessageBody<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct TitleBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

#[derive(Serialize)]
struct GenerateTitleBody<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct MessageFeedbackBody<'a> {
    rating: u8,
    comment: &'a str,
}

#[derive(Serialize)]
struct ConversationFeedbackBody<'a> {
    #[serde(flatten)]
    ratings: ConversationRatings,
    comment: &'a str,
}

/// The chat server's REST surface, one method per endpoint.
#[derive(Clone)]
pub struct HttpChatApi {
    transport: HttpTransport,
}

impl HttpChatApi {
    pub fn new(settings: &ClientSettings) -> ServiceResult<Self> {
        Ok(Self {
            transport: HttpTransport::new(settings)?,
        })
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }
}

impl MessageService for HttpChatApi {
    fn fetch_messages<'a>(
        &'a self,
        conversation: ConversationId,
        since: u64,
    ) -> LocalBoxFuture<'a, ServiceResult<MessageBatch>> {
        Box::pin(async move {
            let path = format!("conversations/{conversation}/messages/?since={since}");
            self.transport.get(&path).await
        })
    }

    fn send_message<'a>(
        &'a self,
        conversation: ConversationId,
        text: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<SendReceipt>> {
        Box::pin(async move {
            let path = format!("conversations/{conversation}/messages/");
            self.transport.post(&path, &SendMessageBody { text }).await
        })
    }
}

impl ConversationService for HttpChatApi {
    fn list_conversations<'a>(
        &'a self,
        limit: u32,
    ) -> LocalBoxFuture<'a, ServiceResult<ConversationPage>> {
        Box::pin(async move {
            self.transport
                .get(&format!("conversations/?limit={limit}"))
                .await
        })
    }

    fn create_conversation<'a>(
        &'a self,
        title: Option<&'a str>,
    ) -> LocalBoxFuture<'a, ServiceResult<Conversation>> {
        Box::pin(async move {
            self.transport
                .post("conversations/", &TitleBody { title })
                .await
        })
    }

    fn rename_conversation<'a>(
        &'a self,
        conversation: ConversationId,
        title: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<Conversation>> {
        Box::pin(async move {
            let path = format!("conversations/{conversation}/");
            self.transport
                .patch(&path, &TitleBody { title: Some(title) })
                .await
        })
    }

    fn delete_conversation<'a>(
        &'a self,
        conversation: ConversationId,
    ) -> LocalBoxFuture<'a, ServiceResult<()>> {
        Box::pin(async move {
            self.transport
                .delete(&format!("conversations/{conversation}/"))
                .await
        })
    }

    fn generate_title<'a>(
        &'a self,
        first_message: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<GeneratedTitle>> {
        Box::pin(async move {
            self.transport
                .post(
                    "conversations/generate-title/",
                    &GenerateTitleBody {
                        message: first_message,
                    },
                )
                .await
        })
    }

    fn load_conversation_feedback<'a>(
        &'a self,
        conversation: ConversationId,
    ) -> LocalBoxFuture<'a, ServiceResult<Option<ConversationFeedback>>> {
        Box::pin(async move {
            let path = format!("conversations/{conversation}/feedback/");
            self.transport
                .request::<(), ConversationFeedback>(Method::GET, &path, None)
                .await
        })
    }
}

impl FeedbackService for HttpChatApi {
    fn submit_message_feedback<'a>(
        &'a self,
        message: MessageId,
        rating: u8,
        comment: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<MessageFeedback>> {
        Box::pin(async move {
            let path = format!("messages/{message}/feedback/");
            self.transport
                .post(&path, &MessageFeedbackBody { rating, comment })
                .await
        })
    }

    fn submit_conversation_feedback<'a>(
        &'a self,
        conversation: ConversationId,
        ratings: ConversationRatings,
        comment: &'a str,
    ) -> LocalBoxFuture<'a, ServiceResult<ConversationFeedback>> {
        Box::pin(async move {
            let path = format!("conversations/{conversation}/feedback/");
            self.transport
                .post(&path, &ConversationFeedbackBody { ratings, comment })
                .await
        })
    }
}
