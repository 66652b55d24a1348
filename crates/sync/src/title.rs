use std::rc::Rc;

use super::context::SessionContext;
use super::service::ConversationService;
use super::state::ActiveContext;

const FALLBACK_TITLE_WORDS: usize = 2;
const FALLBACK_TITLE_MAX_CHARS: usize = 14;
const FALLBACK_TITLE_KEEP_CHARS: usize = 11;

/// Client-computed title: the first two words, ellipsized when longer than
/// fourteen characters.
pub fn fallback_title(first_message: &str) -> String {
    let title = first_message
        .split(' ')
        .filter(|word| !word.is_empty())
        .take(FALLBACK_TITLE_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    if title.chars().count() > FALLBACK_TITLE_MAX_CHARS {
        let kept = title
            .chars()
            .take(FALLBACK_TITLE_KEEP_CHARS)
            .collect::<String>();
        return format!("{kept}...");
    }
    title
}

/// Names a conversation after its first user message.
///
/// Every failure here is a background enhancement failure: it is logged and
/// never reaches the send that triggered it.
pub(crate) struct TitleUpdater<S: ?Sized> {
    context: SessionContext,
    service: Rc<S>,
}

impl<S> TitleUpdater<S>
where
    S: ConversationService + ?Sized,
{
    pub fn new(context: SessionContext, service: Rc<S>) -> Self {
        Self { context, service }
    }

    pub async fn apply_generated_title(&self, target: ActiveContext, first_message: &str) {
        let conversation_id = target.conversation_id;
        let title = match self.service.generate_title(first_message).await {
            Ok(generated) if !generated.title.trim().is_empty() => generated.title.trim().to_string(),
            Ok(_) => fallback_title(first_message),
            Err(error) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %error,
                    "title generation failed, using fallback title"
                );
                fallback_title(first_message)
            }
        };

        if title.is_empty() {
            return;
        }

        if let Err(error) = self
            .service
            .rename_conversation(conversation_id, &title)
            .await
        {
            tracing::warn!(
                conversation_id = %conversation_id,
                error = %error,
                "failed to store generated conversation title"
            );
            return;
        }

        let renamed = self
            .context
            .state
            .borrow_mut()
            .directory_mut()
            .rename(conversation_id, &title);
        if renamed {
            tracing::info!(conversation_id = %conversation_id, title = %title, "conversation titled");
            self.context.refresh();
        }
    }
}
