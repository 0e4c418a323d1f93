//! Consultation session and the reconciliation that keeps it in step with the
//! user's category selection.
//!
//! A [`SessionManager`] holds at most one live [`Session`]. Before handling
//! any interaction the caller runs [`SessionManager::ensure_session`] with the
//! selection it just read; the session is rebuilt whenever the selected
//! sub-category differs from the one it was opened for.
//!
//! Sessions are matched on the sub-category label alone. Two main categories
//! sharing a label would therefore be treated as the same topic.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::categories::Selection;
use crate::constants;
use crate::oracle::{Oracle, OracleError, OracleSession};
use crate::prompt::{self, PromptBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Error note shown in the transcript right after message `after`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub after: usize,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no consultation is open")]
    NoSession,
    #[error("failed to build the instruction preamble: {0}")]
    Prompt(#[from] minijinja::Error),
    #[error("failed to open a consultation: {0}")]
    Open(#[source] OracleError),
    #[error("{prefix}: {0}", prefix = constants::TURN_FAILURE_PREFIX)]
    Turn(#[source] OracleError),
}

pub struct Session {
    id: Uuid,
    selected: String,
    opened_at: DateTime<Local>,
    messages: Vec<Message>,
    annotations: Vec<Annotation>,
    handle: Box<dyn OracleSession>,
}

impl Session {
    /// Identity of the oracle handle this session talks through.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The sub-category this session was opened for.
    pub fn selected(&self) -> &str {
        &self.selected
    }

    pub fn opened_at(&self) -> DateTime<Local> {
        self.opened_at
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("selected", &self.selected)
            .field("messages", &self.messages.len())
            .field("annotations", &self.annotations.len())
            .finish()
    }
}

pub struct SessionManager {
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptBuilder>,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(oracle: Arc<dyn Oracle>, prompts: Arc<PromptBuilder>) -> Self {
        Self {
            oracle,
            prompts,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the live session for `selection`, opening a fresh one if there
    /// is none or it was opened for a different sub-category.
    pub async fn ensure_session(&mut self, selection: &Selection, now: DateTime<Local>) -> Result<&Session, SessionError> {
        let reusable = self
            .session
            .as_ref()
            .is_some_and(|s| s.selected == selection.sub);

        if !reusable {
            self.reinitialize(selection, now).await?;
        }
        self.session.as_ref().ok_or(SessionError::NoSession)
    }

    async fn reinitialize(&mut self, selection: &Selection, now: DateTime<Local>) -> Result<(), SessionError> {
        if let Some(old) = self.session.take() {
            debug!(session = %old.id, selected = %old.selected, "Discarding consultation");
        }

        let preamble = self.prompts.preamble(selection, &now)?;
        let handle = self.oracle.open_session(&preamble).await.map_err(|e| {
            warn!(error = %e, sub = %selection.sub, "Could not open oracle session");
            SessionError::Open(e)
        })?;

        let session = Session {
            id: Uuid::new_v4(),
            selected: selection.sub.clone(),
            opened_at: now,
            messages: vec![Message::assistant(prompt::greeting(selection))],
            annotations: Vec::new(),
            handle,
        };
        info!(session = %session.id, main = %selection.main, sub = %selection.sub, "Opened consultation");
        self.session = Some(session);
        Ok(())
    }

    /// Drops the live session; the next [`ensure_session`](Self::ensure_session) opens a new one.
    pub fn reset(&mut self) {
        if let Some(old) = self.session.take() {
            info!(session = %old.id, "Consultation reset");
        }
    }

    /// Records `text` as a user turn and asks the oracle for a reply.
    ///
    /// A failed reply leaves the user's message in place, attaches an error
    /// annotation after it and keeps the session live.
    pub async fn submit(&mut self, text: &str) -> Result<String, SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NoSession)?;

        session.messages.push(Message::user(text));
        match session.handle.turn(text).await {
            Ok(reply) => {
                session.messages.push(Message::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                let err = SessionError::Turn(e);
                warn!(session = %session.id, error = %err, "Oracle turn failed");
                session.annotations.push(Annotation {
                    after: session.messages.len() - 1,
                    text: err.to_string(),
                });
                Err(err)
            }
        }
    }
}
