//! Conversation sessions

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CouncilError, Result};
use crate::participants::Participants;
use crate::transcript::{ChatMessage, Role, Transcript};

/// A single conversation: its transcript and who has spoken
pub struct Session {
    pub id: Uuid,
    pub user: String,
    pub task: String,
    transcript: RwLock<Transcript>,
    spoken: RwLock<HashSet<String>>,
}

impl Session {
    /// Start a session seeded with the user's question
    pub fn new(user: impl Into<String>, task: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        let user = user.into();
        let task = task.into();

        info!(session_id = %id, user = %user, "Creating new session");

        Self {
            id,
            transcript: RwLock::new(Transcript::with_task(user.clone(), task.clone())),
            user,
            task,
            spoken: RwLock::new(HashSet::new()),
        }
    }

    /// Copy of the transcript as it stands
    pub fn transcript(&self) -> Transcript {
        self.transcript.read().clone()
    }

    /// Append a real turn
    pub fn record(&self, message: ChatMessage) {
        if message.role == Role::Assistant {
            if let Some(name) = &message.name {
                self.spoken.write().insert(name.clone());
            }
        }
        debug!(session_id = %self.id, role = ?message.role, "Recording message");
        self.transcript.write().push(message);
    }

    pub fn has_spoken(&self, name: &str) -> bool {
        self.spoken.read().contains(name)
    }

    /// Participants who have not taken a turn yet
    pub fn silent<'a>(&self, participants: &'a Participants) -> Vec<&'a str> {
        let spoken = self.spoken.read();
        participants
            .names()
            .filter(|name| !spoken.contains(*name))
            .collect()
    }

    /// Reject a repeat speaker while someone else has yet to speak
    pub fn check_fairness(&self, name: &str, participants: &Participants) -> Result<()> {
        if self.has_spoken(name) && !self.silent(participants).is_empty() {
            return Err(CouncilError::FairnessViolation(name.to_string()));
        }
        Ok(())
    }

    pub fn turn_count(&self) -> usize {
        self.transcript.read().agent_turns()
    }
}

/// Shared handle to a session
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Session>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(session),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }
}

impl std::ops::Deref for SessionHandle {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants() -> Participants {
        [("A", "a"), ("B", "b")].into_iter().collect()
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new("alice", "What is the NBA for Acme?");
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].content, "What is the NBA for Acme?");
        assert_eq!(session.turn_count(), 0);
    }

    #[test]
    fn test_record_tracks_speakers() {
        let session = Session::new("alice", "q");
        session.record(ChatMessage::assistant("hi").with_name("A"));
        session.record(ChatMessage::user("more"));

        assert!(session.has_spoken("A"));
        assert!(!session.has_spoken("alice"));
        assert_eq!(session.silent(&participants()), vec!["B"]);
        assert_eq!(session.turn_count(), 1);
    }

    #[test]
    fn test_fairness() {
        let session = Session::new("alice", "q");
        let participants = participants();

        assert!(session.check_fairness("A", &participants).is_ok());
        session.record(ChatMessage::assistant("1").with_name("A"));

        let err = session.check_fairness("A", &participants).unwrap_err();
        assert!(matches!(err, CouncilError::FairnessViolation(ref n) if n == "A"));
        assert!(session.check_fairness("B", &participants).is_ok());

        session.record(ChatMessage::assistant("2").with_name("B"));
        assert!(session.check_fairness("A", &participants).is_ok());
    }

    #[test]
    fn test_handle_deref() {
        let handle = SessionHandle::new(Session::new("alice", "q"));
        let clone = handle.clone();
        clone.record(ChatMessage::assistant("x").with_name("A"));
        assert_eq!(handle.turn_count(), 1);
        assert_eq!(handle.id(), clone.id);
    }
}
