use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::retriever::SearchableIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        })
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Ordered, append-only record of a conversation.
///
/// Entries alternate user, assistant, starting with user. Only the turn
/// handler appends; nothing is ever edited or removed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub(crate) fn push_user(&mut self, content: impl Into<String>) -> &Turn {
        debug_assert!(self.expects(Role::User), "user turn out of order");
        self.push(Role::User, content.into())
    }

    pub(crate) fn push_assistant(&mut self, content: impl Into<String>) -> &Turn {
        debug_assert!(self.expects(Role::Assistant), "assistant turn out of order");
        self.push(Role::Assistant, content.into())
    }

    fn expects(&self, role: Role) -> bool {
        let next = match self.turns.last().map(|t| t.role) {
            Some(Role::User) => Role::Assistant,
            _ => Role::User,
        };
        next == role
    }

    fn push(&mut self, role: Role, content: String) -> &Turn {
        self.turns.push(Turn {
            role,
            content,
            created_at: Utc::now(),
        });
        &self.turns[self.turns.len() - 1]
    }
}

/// State of one chat session: the attached document, its index, and the
/// conversation so far.
#[derive(Default)]
pub struct Session {
    document: Option<PathBuf>,
    index: Option<Arc<dyn SearchableIndex>>,
    transcript: Transcript,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session over an already-populated index.
    pub fn with_index(document: impl Into<PathBuf>, index: Arc<dyn SearchableIndex>) -> Self {
        let mut session = Self::new();
        session.attach(document, index);
        session
    }

    /// Points the session at a (re)built index. The transcript is kept.
    pub fn attach(&mut self, document: impl Into<PathBuf>, index: Arc<dyn SearchableIndex>) {
        self.document = Some(document.into());
        self.index = Some(index);
    }

    pub fn document(&self) -> Option<&Path> {
        self.document.as_deref()
    }

    pub fn index(&self) -> Option<Arc<dyn SearchableIndex>> {
        self.index.clone()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub(crate) fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_appends_in_order() {
        let mut transcript = Transcript::default();
        transcript.push_user("Q1");
        transcript.push_assistant("A1");
        transcript.push_user("Q2");
        transcript.push_assistant("");

        let roles: Vec<Role> = transcript.turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(transcript.turns()[2].content, "Q2");
        assert_eq!(transcript.last().unwrap().content, "");
        assert!(transcript.turns()[0].created_at <= transcript.turns()[3].created_at);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::User.to_string(), "user");
    }

    #[test]
    fn test_new_session_is_not_ready() {
        let session = Session::new();
        assert!(session.index().is_none());
        assert!(session.document().is_none());
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn test_with_index_records_document() {
        struct NoHits;

        #[async_trait::async_trait]
        impl SearchableIndex for NoHits {
            async fn search(
                &self,
                _query: &str,
                _k: usize,
            ) -> Result<Vec<crate::chat::RetrievedChunk>, crate::chat::ChatError> {
                Ok(Vec::new())
            }
        }

        let session = Session::with_index("docs/report.pdf", Arc::new(NoHits));
        assert_eq!(session.document(), Some(Path::new("docs/report.pdf")));
        assert!(session.index().is_some());
    }
}
