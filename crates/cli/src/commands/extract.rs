use std::path::Path;

use ledgerchat_agent::documents::mime_type_for_path;
use ledgerchat_core::config::LoadOptions;
use ledgerchat_core::domain::conversation::ConversationKey;

use crate::commands::{open_session, CommandResult, Session};
use crate::SessionArgs;

pub fn run(
    options: &LoadOptions,
    session: &SessionArgs,
    path: &Path,
    mime: Option<&str>,
) -> CommandResult {
    let Session { runtime, agent } = match open_session("extract", options) {
        Ok(session) => session,
        Err(failure) => return failure,
    };

    let mime_type = mime.or_else(|| mime_type_for_path(path)).unwrap_or("text/plain");
    let key = ConversationKey::new(session.user.as_str(), session.conversation.as_str());
    let response = runtime.block_on(agent.handle_document(&key, path, mime_type));
    CommandResult::from_response("extract", response)
}
