//! Event channel for observing conversations as they run

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::decision::Decision;

/// Something observable that happened during a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    SessionStarted {
        session_id: Uuid,
        user: String,
        task: String,
    },
    TerminationDecided {
        session_id: Uuid,
        terminate: bool,
        reason: String,
    },
    AgentSelected {
        session_id: Uuid,
        agent: String,
        reason: String,
    },
    AgentResponded {
        session_id: Uuid,
        agent: String,
        content: String,
    },
    ResultFiltered {
        session_id: Uuid,
        answer: String,
        reason: String,
    },
    SessionFailed {
        session_id: Uuid,
        error: String,
    },
}

impl ChatEvent {
    /// Event for a manager decision; a boolean decision is a termination check
    pub fn decided(session_id: Uuid, decision: Decision) -> Self {
        match decision {
            Decision::Boolean(b) => ChatEvent::TerminationDecided {
                session_id,
                terminate: b.result,
                reason: b.reason,
            },
            Decision::Selection(s) => ChatEvent::AgentSelected {
                session_id,
                agent: s.result,
                reason: s.reason,
            },
            Decision::Final(m) => ChatEvent::ResultFiltered {
                session_id,
                answer: m.result.content,
                reason: m.reason,
            },
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            ChatEvent::SessionStarted { session_id, .. }
            | ChatEvent::TerminationDecided { session_id, .. }
            | ChatEvent::AgentSelected { session_id, .. }
            | ChatEvent::AgentResponded { session_id, .. }
            | ChatEvent::ResultFiltered { session_id, .. }
            | ChatEvent::SessionFailed { session_id, .. } => *session_id,
        }
    }
}

/// Sending half, cloned into every orchestration
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl EventSink {
    /// Emit an event; dropped silently once the stream is gone
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.tx.send(event);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ChatEvent>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected sink/stream pair
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventStream { rx })
}
