//! The simulated counterpart of the agent.

use std::collections::VecDeque;

use crate::task::UserScenario;

/// Token a simulated user includes to end the conversation.
pub const STOP_TOKEN: &str = "###STOP###";

/// The user side of a conversation.
///
/// The environment calls [`UserSimulator::reply`] whenever the agent responds
/// in free text and ends the run once a reply satisfies
/// [`UserSimulator::is_stop`].
pub trait UserSimulator: Send {
    /// First message of the conversation.
    fn opening_message(&mut self) -> String;

    /// Answers one free-text agent message.
    fn reply(&mut self, agent_message: &str) -> String;

    /// Returns true if `message` ends the conversation.
    fn is_stop(&self, message: &str) -> bool {
        message.contains(STOP_TOKEN)
    }
}

/// Replays a task's scripted user turns; stops once they run out.
#[derive(Debug, Clone)]
pub struct ScriptedUser {
    opening: String,
    replies: VecDeque<String>,
}

impl ScriptedUser {
    /// Creates a user from explicit turns.
    #[must_use]
    pub fn new(opening: impl Into<String>, replies: impl IntoIterator<Item = String>) -> Self {
        Self {
            opening: opening.into(),
            replies: replies.into_iter().collect(),
        }
    }

    /// Creates a user from a task scenario.
    #[must_use]
    pub fn from_scenario(scenario: &UserScenario) -> Self {
        Self::new(scenario.opening_message.clone(), scenario.replies.iter().cloned())
    }

    /// Replies not yet sent.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.replies.len()
    }
}

impl UserSimulator for ScriptedUser {
    fn opening_message(&mut self) -> String {
        self.opening.clone()
    }

    fn reply(&mut self, _agent_message: &str) -> String {
        self.replies
            .pop_front()
            .unwrap_or_else(|| STOP_TOKEN.to_string())
    }
}
