use std::num::ParseIntError;
use std::time::Duration;

use snafu::Snafu;

use super::ids::{ConversationId, MessageId};

/// Failure reported by a collaborator service call.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServiceError {
    #[snafu(display("request to `{path}` timed out after {timeout:?}"))]
    Timeout {
        stage: &'static str,
        path: String,
        timeout: Duration,
    },
    #[snafu(display("network error while calling `{path}`: {details}"))]
    Network {
        stage: &'static str,
        path: String,
        details: String,
    },
    #[snafu(display("`{path}` was not found: {body}"))]
    NotFound {
        stage: &'static str,
        path: String,
        body: String,
    },
    #[snafu(display("`{path}` returned status {status}: {body}"))]
    Status {
        stage: &'static str,
        path: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode response from `{path}`: {details}"))]
    Decode {
        stage: &'static str,
        path: String,
        details: String,
    },
    #[snafu(display("`{path}` returned an empty body"))]
    EmptyBody { stage: &'static str, path: String },
    #[snafu(display("failed to build http client: {details}"))]
    BuildClient {
        stage: &'static str,
        details: String,
    },
}

impl ServiceError {
    /// Connectivity failures that a background poll may silently drop.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SyncError {
    #[snafu(display("no conversation is active on `{stage}`"))]
    NoActiveConversation { stage: &'static str },
    #[snafu(display("message {token} carries no original text to retry"))]
    MissingOriginalText { stage: &'static str, token: String },
    #[snafu(display("no ledger entry carries token {token}"))]
    UnknownEntry { stage: &'static str, token: String },
    #[snafu(display("conversation {conversation_id} is not in the directory"))]
    UnknownConversation {
        stage: &'static str,
        conversation_id: ConversationId,
    },
    #[snafu(display("message {message_id} is not a confirmed ledger entry"))]
    UnknownMessage {
        stage: &'static str,
        message_id: MessageId,
    },
    #[snafu(display("{field} rating {rating} is outside 1..=5"))]
    InvalidRating {
        stage: &'static str,
        field: &'static str,
        rating: u8,
    },
    #[snafu(display("{target} has already been rated"))]
    AlreadyRated { stage: &'static str, target: String },
    #[snafu(display("id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: ParseIntError,
    },
    #[snafu(display("service call failed on `{stage}`: {source}"))]
    Service {
        stage: &'static str,
        source: ServiceError,
    },
}

pub type SyncResult<T> = Result<T, SyncError>;
