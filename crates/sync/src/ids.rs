use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use uuid::Uuid;

use super::error::{InvalidIdSnafu, SyncError, SyncResult};

// Macro keeps all server-assigned ID wrappers structurally identical.
macro_rules! define_server_id {
    ($name:ident, $raw:ty, $id_type:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $raw);

        impl $name {
            pub const fn new(raw: $raw) -> Self {
                Self(raw)
            }

            pub fn parse(raw: &str) -> SyncResult<Self> {
                let parsed = raw.trim().parse::<$raw>().context(InvalidIdSnafu {
                    stage: "parse-server-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }

            pub const fn get(self) -> $raw {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<$raw> for $name {
            fn from(value: $raw) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = SyncError;

            fn from_str(raw: &str) -> SyncResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_server_id!(ConversationId, u64, "conversation-id");
define_server_id!(MessageId, i64, "message-id");
define_server_id!(FeedbackId, u64, "feedback-id");

impl MessageId {
    /// Sentinel carried by every entry the server has not confirmed.
    pub const PROVISIONAL: Self = Self(-1);

    /// Server ids are always positive.
    pub const fn is_confirmed(self) -> bool {
        self.0 > 0
    }
}

/// What a correlation token was minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Outgoing,
    Failed,
    Thinking,
    Welcome,
}

impl TokenKind {
    const ALL: [TokenKind; 4] = [
        TokenKind::Outgoing,
        TokenKind::Failed,
        TokenKind::Thinking,
        TokenKind::Welcome,
    ];

    pub const fn prefix(self) -> &'static str {
        match self {
            TokenKind::Outgoing => "tmp",
            TokenKind::Failed => "failed",
            TokenKind::Thinking => "thinking",
            TokenKind::Welcome => "welcome",
        }
    }
}

/// Client-only key matching a local ledger entry to its own resolution.
///
/// Tokens are never sent to the server. They always start with an alphabetic
/// prefix, so they cannot be confused with a numeric server id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn mint(kind: TokenKind) -> Self {
        Self(format!("{}-{}", kind.prefix(), Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> Option<TokenKind> {
        let (prefix, _) = self.0.split_once('-')?;
        TokenKind::ALL
            .into_iter()
            .find(|kind| kind.prefix() == prefix)
    }

    pub fn is_welcome(&self) -> bool {
        self.kind() == Some(TokenKind::Welcome)
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}
