#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;

use agentbench::orchestrator::encode_action;
use agentbench::task::{load_tasks, Task};
use agentbench::{Action, LocalAgent};
use async_trait::async_trait;

pub fn data_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(relative)
}

pub fn bundled_tasks(domain: &str) -> Vec<Task> {
    load_tasks(data_path(&format!("{domain}/tasks.json"))).unwrap()
}

pub fn bundled_task(domain: &str, id: &str) -> Task {
    bundled_tasks(domain)
        .into_iter()
        .find(|t| t.id == id)
        .unwrap_or_else(|| panic!("no task {id} in {domain}"))
}

/// Sends pre-written replies in order, then keeps saying goodbye.
pub struct ScriptedAgent {
    replies: VecDeque<String>,
}

impl ScriptedAgent {
    pub fn new(actions: &[Action]) -> Self {
        Self::raw(actions.iter().map(encode_action).collect())
    }

    pub fn raw(replies: Vec<String>) -> Self {
        Self {
            replies: replies.into(),
        }
    }
}

#[async_trait]
impl LocalAgent for ScriptedAgent {
    async fn reply(&mut self, _text: &str) -> String {
        self.replies
            .pop_front()
            .unwrap_or_else(|| encode_action(&Action::respond("Goodbye.")))
    }
}
