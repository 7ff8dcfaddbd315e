//! Prompt assembly for provider calls.
//!
//! Every provider in a batch receives the same two-message prompt: a fixed
//! system role plus the user's query verbatim.

use crate::provider::ChatMessage;

/// System role prepended to every dispatched query.
pub const SYSTEM_PROMPT: &str = "You are a senior Flutter and Django developer. \
Your code must be precise, optimized, complete, and documented.";

/// Build the message list sent to each provider.
pub fn build_messages(user_input: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_input),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_messages_roles_and_content() {
        let messages = build_messages("explain recursion");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "explain recursion");
    }
}
