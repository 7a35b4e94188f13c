//! Conversation session: transcript, pending input, and the `exit` command.
//!
//! A session is created per user conversation and dropped when it ends. It
//! owns the append-only transcript; the resolver never sees it, so every
//! query reaches the tiers without any chat history.

use medinfo_models::AnswerModel;
use medinfo_shared::{ConversationTurn, SessionId};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::resolver::{
    FAREWELL_MESSAGE, ResolveProgress, Resolution, Resolver, UserInput, classify_input,
};

/// Result of one submitted turn.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// Blank input, or the session already ended.
    Ignored,
    /// The user typed `exit`; the session is now over.
    Farewell(String),
    /// A query was resolved and appended to the transcript.
    Answered(Resolution),
}

#[derive(Serialize)]
struct TranscriptExport<'a> {
    session_id: &'a SessionId,
    turns: &'a [ConversationTurn],
}

/// One user's conversation.
#[derive(Debug, Default)]
pub struct ConversationSession {
    id: SessionId,
    transcript: Vec<ConversationTurn>,
    pending_input: String,
    ended: bool,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Text typed but not yet submitted.
    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn pending_input_mut(&mut self) -> &mut String {
        &mut self.pending_input
    }

    /// Submit the pending input buffer, clearing it.
    pub async fn submit_pending<M: AnswerModel, G: AnswerModel>(
        &mut self,
        resolver: &Resolver<M, G>,
        cancel: &CancellationToken,
        progress: &dyn ResolveProgress,
    ) -> TurnOutcome {
        let input = std::mem::take(&mut self.pending_input);
        self.submit(resolver, &input, cancel, progress).await
    }

    /// Handle one line of user input.
    ///
    /// `exit` never reaches the resolver. A query appends the user turn, the
    /// resolver's notice (if any), then the answer.
    pub async fn submit<M: AnswerModel, G: AnswerModel>(
        &mut self,
        resolver: &Resolver<M, G>,
        input: &str,
        cancel: &CancellationToken,
        progress: &dyn ResolveProgress,
    ) -> TurnOutcome {
        if self.ended {
            return TurnOutcome::Ignored;
        }

        let query = match classify_input(input) {
            UserInput::Empty => return TurnOutcome::Ignored,
            UserInput::Exit => {
                info!(session = %self.id, turns = self.transcript.len(), "session ended by user");
                self.pending_input.clear();
                self.ended = true;
                return TurnOutcome::Farewell(FAREWELL_MESSAGE.to_string());
            }
            UserInput::Query(q) => q,
        };

        self.transcript.push(ConversationTurn::user(query));
        let resolution = resolver.resolve(query, cancel, progress).await;
        debug!(session = %self.id, source = ?resolution.source, "turn resolved");

        if let Some(notice) = &resolution.notice {
            self.transcript.push(ConversationTurn::assistant(notice.clone()));
        }
        self.transcript
            .push(ConversationTurn::assistant(resolution.text.clone()));

        TurnOutcome::Answered(resolution)
    }

    /// Plain-text rendering of the transcript, one `Role: text` block per turn.
    pub fn render(&self) -> String {
        self.transcript
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Pretty JSON export of the transcript.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&TranscriptExport {
            session_id: &self.id,
            turns: &self.transcript,
        })
    }
}
