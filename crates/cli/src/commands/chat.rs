use std::path::Path;

use ledgerchat_agent::documents::mime_type_for_path;
use ledgerchat_agent::{ActionResponse, AgentRuntime};
use ledgerchat_core::config::LoadOptions;
use ledgerchat_core::domain::conversation::ConversationKey;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::commands::{open_session, CommandResult, Session};
use crate::SessionArgs;

const BANNER: &str = "ledgerchat: type a request, /upload <path> to add a document, /quit to exit";
const HELP: &str = "Commands:\n  /upload <path> [mime]  extract invoice details from a document\n  \
                    /help                  show this message\n  /quit                  end the session";

#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Quit,
    Help,
    Upload { path: &'a str, mime: Option<&'a str> },
    UploadMissingPath,
    Message(&'a str),
    Blank,
}

fn parse_input(line: &str) -> ChatInput<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatInput::Blank;
    }

    let Some(command) = trimmed.strip_prefix('/') else {
        return ChatInput::Message(trimmed);
    };
    let mut parts = command.split_whitespace();
    match parts.next() {
        Some("quit" | "exit") => ChatInput::Quit,
        Some("help") => ChatInput::Help,
        Some("upload") => match parts.next() {
            Some(path) => ChatInput::Upload { path, mime: parts.next() },
            None => ChatInput::UploadMissingPath,
        },
        _ => ChatInput::Message(trimmed),
    }
}

pub fn run(options: &LoadOptions, session: &SessionArgs) -> CommandResult {
    let Session { runtime, agent } = match open_session("chat", options) {
        Ok(session) => session,
        Err(failure) => return failure,
    };

    let key = ConversationKey::new(session.user.as_str(), session.conversation.as_str());
    match runtime.block_on(repl(&agent, &key)) {
        Ok(()) => CommandResult::silent(),
        Err(error) => CommandResult::failure("chat", "io", error.to_string(), 1),
    }
}

async fn repl(agent: &AgentRuntime, key: &ConversationKey) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mode = if agent.availability().is_available() { "model" } else { "keyword fallback" };
    stdout.write_all(format!("{BANNER}\n(classifier: {mode})\n").as_bytes()).await?;
    info!(
        event_name = "cli.chat.started",
        user_id = %key.user_id,
        conversation_id = %key.conversation_id,
        "chat session started"
    );

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let response = match parse_input(&line) {
            ChatInput::Quit => break,
            ChatInput::Blank => continue,
            ChatInput::Help => {
                stdout.write_all(format!("{HELP}\n").as_bytes()).await?;
                continue;
            }
            ChatInput::UploadMissingPath => {
                stdout.write_all(b"usage: /upload <path> [mime]\n").await?;
                continue;
            }
            ChatInput::Upload { path, mime } => {
                let path = Path::new(path);
                let mime_type = mime.or_else(|| mime_type_for_path(path)).unwrap_or("text/plain");
                agent.handle_document(key, path, mime_type).await
            }
            ChatInput::Message(text) => agent.handle_message(key, text).await,
        };
        stdout.write_all(render(&response).as_bytes()).await?;
    }

    info!(
        event_name = "cli.chat.ended",
        user_id = %key.user_id,
        conversation_id = %key.conversation_id,
        "chat session ended"
    );
    stdout.write_all(b"bye\n").await?;
    Ok(())
}

fn render(response: &ActionResponse) -> String {
    format!("{}\n\n", response.message)
}
