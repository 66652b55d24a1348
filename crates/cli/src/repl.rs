use std::rc::Rc;
use std::time::Duration;

use chatline_client::{ClientSettings, HttpChatApi};
use chatline_sync::{ChatSession, PollOutcome, SendOutcome, SessionOptions, SyncResult};
use snafu::ResultExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

use super::command::{Command, HELP};
use super::error::{ClientSnafu, CliError, ReadInputSnafu};
use super::terminal::TerminalRenderer;

type Session = ChatSession<HttpChatApi>;

/// Runs the input loop until `/quit` or end of input.
///
/// Must run inside a `LocalSet`: the poll driver is a local task sharing the
/// session with the input loop.
pub async fn run(settings: ClientSettings) -> Result<(), CliError> {
    let api = HttpChatApi::new(&settings).context(ClientSnafu {
        stage: "build-http-api",
    })?;
    let renderer = TerminalRenderer::stdout();
    let options = SessionOptions {
        delays: settings.delays,
        page_limit: settings.conversation_page_limit,
        ..SessionOptions::default()
    };
    let session = Rc::new(ChatSession::new(
        Rc::new(api),
        Rc::new(renderer.clone()),
        options,
    ));

    open_first_conversation(&session, &renderer).await;
    renderer.notice("type a message, or /help for commands");

    let poller = tokio::task::spawn_local(poll_loop(Rc::clone(&session), settings.poll_interval()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context(ReadInputSnafu {
        stage: "read-stdin-line",
    })? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(error) => {
                renderer.notice(&format!("! {error}"));
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        execute(&session, &renderer, command).await;
    }

    poller.abort();
    tracing::info!("input closed, shutting down");
    Ok(())
}

async fn open_first_conversation(session: &Session, renderer: &TerminalRenderer) {
    match session.load_conversations().await {
        Ok(Some(id)) => report(renderer, session.select_conversation(id).await),
        Ok(None) => renderer.notice("no conversations yet, /new to start one"),
        Err(error) => {
            tracing::warn!(error = %error, "failed to load conversations");
            renderer.notice(&format!("! {error}"));
        }
    }
}

async fn poll_loop(session: Rc<Session>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial load already synced.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match session.sync().await {
            Ok(PollOutcome::Relocated { from, to }) => {
                tracing::info!(from = %from, to = ?to, "active conversation disappeared");
            }
            Ok(outcome) => tracing::trace!(?outcome, "poll finished"),
            Err(error) => tracing::warn!(error = %error, "poll failed"),
        }
    }
}

fn report<T>(renderer: &TerminalRenderer, result: SyncResult<T>) {
    if let Err(error) = result {
        tracing::debug!(error = ?error, "command failed");
        renderer.notice(&format!("! {error}"));
    }
}

fn report_send(renderer: &TerminalRenderer, outcome: SyncResult<SendOutcome>) {
    match outcome {
        Ok(SendOutcome::Failed { error, .. }) => {
            renderer.notice(&format!("! {error}"));
        }
        Ok(SendOutcome::Abandoned) => {
            renderer.notice("conversation changed before the reply arrived");
        }
        other => report(renderer, other),
    }
}

async fn execute(session: &Session, renderer: &TerminalRenderer, command: Command) {
    match command {
        Command::Send(text) => report_send(renderer, session.send(&text).await),
        Command::New(title) => report(renderer, session.create_conversation(title.as_deref()).await),
        Command::List => list_conversations(session, renderer),
        Command::Switch(id) => report(renderer, session.select_conversation(id).await),
        Command::Rename(title) => {
            let Some(id) = session.state().active_conversation_id() else {
                renderer.notice("no conversation is open");
                return;
            };
            match session.rename_conversation(id, &title).await {
                Ok(false) => renderer.notice("title unchanged"),
                other => report(renderer, other),
            }
        }
        Command::Delete => {
            let Some(id) = session.state().active_conversation_id() else {
                renderer.notice("no conversation is open");
                return;
            };
            match session.delete_conversation(id).await {
                Ok(Some(next)) => report(renderer, session.select_conversation(next).await),
                other => report(renderer, other),
            }
        }
        Command::Retry => match session.retry_latest_failed().await {
            Ok(None) => renderer.notice("nothing to retry"),
            Ok(Some(outcome)) => report_send(renderer, Ok(outcome)),
            Err(error) => report::<()>(renderer, Err(error)),
        },
        Command::Rate {
            message,
            rating,
            comment,
        } => report(renderer, session.rate_message(message, rating, &comment).await),
        Command::RateConversation { ratings, comment } => {
            report(renderer, session.rate_conversation(ratings, &comment).await)
        }
        Command::Find(query) => find_conversations(session, renderer, &query),
        Command::Help => renderer.notice(HELP),
        Command::Quit => {}
    }
}

fn list_conversations(session: &Session, renderer: &TerminalRenderer) {
    let lines = {
        let state = session.state();
        let active = state.active_conversation_id();
        state
            .directory()
            .conversations()
            .iter()
            .map(|conversation| {
                let marker = if Some(conversation.id) == active { "*" } else { " " };
                format!("{marker} #{} {}", conversation.id, conversation.display_title())
            })
            .collect::<Vec<_>>()
    };
    if lines.is_empty() {
        renderer.notice("no conversations");
    }
    for line in lines {
        renderer.notice(&line);
    }
}

/// Search results are printed with the search field focused, so background
/// renders stay out of the listing until it is complete.
fn find_conversations(session: &Session, renderer: &TerminalRenderer, query: &str) {
    let gate = Rc::clone(session.gate());
    gate.set_search_focused(true);

    let matches = session.filter_conversations(query);
    if matches.is_empty() {
        renderer.notice(&format!("no conversation matches `{query}`"));
    }
    for conversation in &matches {
        renderer.notice(&format!("  #{} {}", conversation.id, conversation.display_title()));
    }

    gate.set_search_focused(false);
    session.render();
}
