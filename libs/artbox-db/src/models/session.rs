use serde::Serialize;

/// Conversation state of one (bot, chat) pair, persisted in `chat_sessions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ChatState {
    #[default]
    Idle,
    AwaitingPrompt,
}

impl ChatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatState::Idle => "idle",
            ChatState::AwaitingPrompt => "awaiting_prompt",
        }
    }

    /// Unknown values fall back to Idle so a schema hiccup never strands a
    /// chat in an unreachable state.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "awaiting_prompt" => ChatState::AwaitingPrompt,
            _ => ChatState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        assert_eq!(ChatState::parse(ChatState::Idle.as_str()), ChatState::Idle);
        assert_eq!(
            ChatState::parse(ChatState::AwaitingPrompt.as_str()),
            ChatState::AwaitingPrompt
        );
    }

    #[test]
    fn unknown_state_falls_back_to_idle() {
        assert_eq!(ChatState::parse("corrupted"), ChatState::Idle);
    }
}
