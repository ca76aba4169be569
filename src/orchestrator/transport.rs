//! The channel between the orchestrator and the agent under test.
//!
//! The agent is addressed through a conversational message endpoint: every
//! request carries the text of one turn, and every reply echoes a context id
//! that identifies the session. The first reply assigns the id; all later
//! requests carry it and all later replies must echo it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ProtocolError, TransportError};

/// Maximum size of one reply text part.
pub const MAX_REPLY_BYTES: usize = 1024 * 1024; // 1 MiB

/// Default cap on concurrently open in-process sessions.
pub const MAX_OPEN_CONTEXTS: usize = 4096;

/// Session identifier assigned by the agent endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    /// Wraps an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One turn sent to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Session id; absent on the first turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ContextId>,
    /// Turn text.
    pub text: String,
}

/// A part of an agent reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyPart {
    /// Free text.
    Text {
        /// Text content.
        text: String,
    },
    /// Structured data. Never carries an action.
    Data {
        /// Payload.
        data: Value,
    },
}

/// The agent's answer to one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Session id the endpoint associated with this reply.
    pub context_id: ContextId,
    /// Reply parts.
    pub parts: Vec<ReplyPart>,
}

impl AgentReply {
    /// A reply with a single text part.
    #[must_use]
    pub fn text(context_id: ContextId, text: impl Into<String>) -> Self {
        Self {
            context_id,
            parts: vec![ReplyPart::Text { text: text.into() }],
        }
    }

    /// Returns the single text part, or the violation.
    pub fn single_text(&self) -> Result<&str, ProtocolError> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                ReplyPart::Text { text } => Some(text.as_str()),
                ReplyPart::Data { .. } => None,
            })
            .collect();
        match texts.as_slice() {
            [one] => Ok(*one),
            other => Err(ProtocolError::UnexpectedParts { count: other.len() }),
        }
    }
}

/// Sends turns to an agent endpoint.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Delivers one turn and waits for the reply.
    async fn send(&self, request: AgentRequest) -> Result<AgentReply, TransportError>;

    /// Ends the session `context_id` once the run using it has terminated.
    async fn close(&self, _context_id: &ContextId) {}
}

/// An agent hosted in the same process, one instance per session.
#[async_trait]
pub trait LocalAgent: Send {
    /// Answers one turn with free text.
    async fn reply(&mut self, text: &str) -> String;
}

type AgentFactory = Box<dyn Fn() -> Box<dyn LocalAgent> + Send + Sync>;

/// Transport that drives [`LocalAgent`]s directly.
///
/// A request without a context id opens a new session; requests naming an
/// unknown context fail. Closing a session drops its agent.
pub struct InProcessTransport {
    factory: AgentFactory,
    sessions: Mutex<HashMap<ContextId, Arc<Mutex<Box<dyn LocalAgent>>>>>,
    max_sessions: usize,
    opened: AtomicUsize,
}

impl fmt::Debug for InProcessTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessTransport").finish_non_exhaustive()
    }
}

impl InProcessTransport {
    /// Creates a transport that builds a fresh agent per session.
    #[must_use]
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn LocalAgent> + Send + Sync + 'static,
    {
        Self::with_session_limit(factory, MAX_OPEN_CONTEXTS)
    }

    /// Like [`InProcessTransport::new`], with at most `max_sessions` open at once.
    #[must_use]
    pub fn with_session_limit<F>(factory: F, max_sessions: usize) -> Self
    where
        F: Fn() -> Box<dyn LocalAgent> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
            opened: AtomicUsize::new(0),
        }
    }

    /// Number of sessions currently open.
    pub async fn open_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Number of sessions opened since creation, closed ones included.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    async fn session(
        &self,
        context_id: Option<ContextId>,
    ) -> Result<(ContextId, Arc<Mutex<Box<dyn LocalAgent>>>), TransportError> {
        let mut sessions = self.sessions.lock().await;
        match context_id {
            Some(id) => {
                let agent = sessions.get(&id).cloned().ok_or_else(|| {
                    TransportError::ConnectionFailed {
                        message: format!("unknown context '{id}'"),
                    }
                })?;
                Ok((id, agent))
            }
            None => {
                if sessions.len() >= self.max_sessions {
                    return Err(TransportError::ConnectionFailed {
                        message: "session registry is full".to_string(),
                    });
                }
                let id = ContextId::generate();
                let agent = Arc::new(Mutex::new((self.factory)()));
                sessions.insert(id.clone(), Arc::clone(&agent));
                self.opened.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(context_id = %id, "opened in-process session");
                Ok((id, agent))
            }
        }
    }
}

#[async_trait]
impl AgentTransport for InProcessTransport {
    async fn send(&self, request: AgentRequest) -> Result<AgentReply, TransportError> {
        let (context_id, agent) = self.session(request.context_id).await?;
        let text = agent.lock().await.reply(&request.text).await;
        if text.len() > MAX_REPLY_BYTES {
            return Err(TransportError::MalformedEnvelope {
                message: format!("reply of {} bytes exceeds size limit", text.len()),
            });
        }
        Ok(AgentReply::text(context_id, text))
    }

    async fn close(&self, context_id: &ContextId) {
        if self.sessions.lock().await.remove(context_id).is_some() {
            tracing::debug!(context_id = %context_id, "closed in-process session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        turns: usize,
    }

    #[async_trait]
    impl LocalAgent for Echo {
        async fn reply(&mut self, text: &str) -> String {
            self.turns += 1;
            format!("{}:{text}", self.turns)
        }
    }

    fn transport() -> InProcessTransport {
        InProcessTransport::new(|| Box::new(Echo { turns: 0 }))
    }

    #[tokio::test]
    async fn first_turn_opens_a_session_and_later_turns_reuse_it() {
        let transport = transport();
        let first = transport
            .send(AgentRequest {
                context_id: None,
                text: "hello".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(first.single_text().unwrap(), "1:hello");

        let second = transport
            .send(AgentRequest {
                context_id: Some(first.context_id.clone()),
                text: "again".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(second.context_id, first.context_id);
        assert_eq!(second.single_text().unwrap(), "2:again");
        assert_eq!(transport.open_sessions().await, 1);
    }

    #[tokio::test]
    async fn closed_sessions_free_their_slot() {
        let transport = InProcessTransport::with_session_limit(|| Box::new(Echo { turns: 0 }), 1);
        let open = || AgentRequest {
            context_id: None,
            text: "hi".to_string(),
        };
        let first = transport.send(open()).await.unwrap();
        let err = transport.send(open()).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));

        transport.close(&first.context_id).await;
        assert_eq!(transport.open_sessions().await, 0);
        let late = transport
            .send(AgentRequest {
                context_id: Some(first.context_id.clone()),
                text: "still there?".to_string(),
            })
            .await;
        assert!(late.is_err());

        let second = transport.send(open()).await.unwrap();
        assert_eq!(second.single_text().unwrap(), "1:hi");
        assert_eq!(transport.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn unknown_context_fails() {
        let err = transport()
            .send(AgentRequest {
                context_id: Some(ContextId::new("nope")),
                text: "hi".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));
    }

    #[test]
    fn reply_must_have_exactly_one_text_part() {
        let id = ContextId::new("c1");
        let empty = AgentReply {
            context_id: id.clone(),
            parts: vec![ReplyPart::Data {
                data: serde_json::json!({"name": "respond"}),
            }],
        };
        assert_eq!(empty.single_text().unwrap_err(), ProtocolError::UnexpectedParts { count: 0 });

        let two = AgentReply {
            context_id: id,
            parts: vec![
                ReplyPart::Text { text: "a".to_string() },
                ReplyPart::Text { text: "b".to_string() },
            ],
        };
        assert_eq!(two.single_text().unwrap_err(), ProtocolError::UnexpectedParts { count: 2 });
    }
}
