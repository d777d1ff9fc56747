use ledgerchat_core::config::LoadOptions;
use ledgerchat_core::domain::conversation::ConversationKey;

use crate::commands::{open_session, CommandResult, Session};
use crate::SessionArgs;

pub fn run(options: &LoadOptions, session: &SessionArgs, message: &str) -> CommandResult {
    let Session { runtime, agent } = match open_session("ask", options) {
        Ok(session) => session,
        Err(failure) => return failure,
    };

    let key = ConversationKey::new(session.user.as_str(), session.conversation.as_str());
    let response = runtime.block_on(agent.handle_message(&key, message));
    CommandResult::from_response("ask", response)
}
