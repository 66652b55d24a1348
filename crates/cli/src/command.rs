use chatline_sync::{ConversationId, ConversationRatings, MessageId};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

/// Longest message the input line accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New(Option<String>),
    List,
    Switch(ConversationId),
    Rename(String),
    Delete,
    Retry,
    Rate {
        message: MessageId,
        rating: u8,
        comment: String,
    },
    RateConversation {
        ratings: ConversationRatings,
        comment: String,
    },
    Find(String),
    Help,
    Quit,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommandError {
    #[snafu(display("message is empty"))]
    EmptyMessage { stage: &'static str },
    #[snafu(display("message is {length} characters, the limit is {MAX_MESSAGE_CHARS}"))]
    MessageTooLong { stage: &'static str, length: usize },
    #[snafu(display("unknown command `/{name}`, try /help"))]
    UnknownCommand { stage: &'static str, name: String },
    #[snafu(display("usage: {usage}"))]
    Usage {
        stage: &'static str,
        usage: &'static str,
    },
    #[snafu(display("{source}"))]
    InvalidArgument {
        stage: &'static str,
        source: chatline_sync::SyncError,
    },
    #[snafu(display("`{raw}` is not a rating between 1 and 5"))]
    InvalidRating { stage: &'static str, raw: String },
}

pub const HELP: &str = "\
commands:
  <text>                         send a message
  /new [title]                   start a conversation
  /list                          list conversations
  /switch <id>                   open a conversation
  /rename <title>                rename the open conversation
  /delete                        delete the open conversation
  /retry                         resend the latest failed message
  /rate <message-id> <1-5> [comment]
  /rate-conversation <overall> <helpfulness> <accuracy> [comment]
  /find <query>                  filter conversations by title
  /quit";

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return validate_message(line).map(|text| Self::Send(text.to_string()));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        match name {
            "new" => Ok(Self::New(non_empty(args))),
            "list" => Ok(Self::List),
            "switch" => {
                ensure!(
                    !args.is_empty(),
                    UsageSnafu {
                        stage: "parse-switch",
                        usage: "/switch <id>",
                    }
                );
                let id = ConversationId::parse(args).context(InvalidArgumentSnafu {
                    stage: "parse-switch",
                })?;
                Ok(Self::Switch(id))
            }
            "rename" => non_empty(args).map(Self::Rename).context(UsageSnafu {
                stage: "parse-rename",
                usage: "/rename <title>",
            }),
            "delete" => Ok(Self::Delete),
            "retry" => Ok(Self::Retry),
            "rate" => parse_rate(args),
            "rate-conversation" => parse_rate_conversation(args),
            "find" => Ok(Self::Find(args.to_string())),
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => UnknownCommandSnafu {
                stage: "parse-command",
                name: other,
            }
            .fail(),
        }
    }
}

/// Rejects empty input and input over [`MAX_MESSAGE_CHARS`] before it reaches the engine.
pub fn validate_message(text: &str) -> Result<&str, CommandError> {
    let text = text.trim();
    ensure!(
        !text.is_empty(),
        EmptyMessageSnafu {
            stage: "validate-message",
        }
    );
    let length = text.chars().count();
    ensure!(
        length <= MAX_MESSAGE_CHARS,
        MessageTooLongSnafu {
            stage: "validate-message",
            length,
        }
    );
    Ok(text)
}

fn non_empty(args: &str) -> Option<String> {
    let args = args.trim();
    (!args.is_empty()).then(|| args.to_string())
}

fn parse_rating(raw: &str) -> Result<u8, CommandError> {
    raw.parse::<u8>()
        .ok()
        .filter(|rating| (1..=5).contains(rating))
        .context(InvalidRatingSnafu {
            stage: "parse-rating",
            raw,
        })
}

fn parse_rate(args: &str) -> Result<Command, CommandError> {
    let mut parts = args.splitn(3, char::is_whitespace);
    let (Some(message), Some(rating)) = (parts.next(), parts.next()) else {
        return UsageSnafu {
            stage: "parse-rate",
            usage: "/rate <message-id> <1-5> [comment]",
        }
        .fail();
    };
    let message = MessageId::parse(message).context(InvalidArgumentSnafu {
        stage: "parse-rate",
    })?;

    Ok(Command::Rate {
        message,
        rating: parse_rating(rating)?,
        comment: parts.next().unwrap_or_default().trim().to_string(),
    })
}

fn parse_rate_conversation(args: &str) -> Result<Command, CommandError> {
    let mut parts = args.splitn(4, char::is_whitespace);
    let (Some(overall), Some(helpfulness), Some(accuracy)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return UsageSnafu {
            stage: "parse-rate-conversation",
            usage: "/rate-conversation <overall> <helpfulness> <accuracy> [comment]",
        }
        .fail();
    };

    Ok(Command::RateConversation {
        ratings: ConversationRatings::new(
            parse_rating(overall)?,
            parse_rating(helpfulness)?,
            parse_rating(accuracy)?,
        ),
        comment: parts.next().unwrap_or_default().trim().to_string(),
    })
}
