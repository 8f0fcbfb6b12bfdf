//! Per-call state: identity, clock and the conversation log.

use agentcall_types::{ConversationTurn, Speaker};
use agentcall_voice::CallLeg;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct TurnLog {
    turns: Vec<ConversationTurn>,
    last_user_utterance: Option<String>,
}

/// One live call.
///
/// The registry decides whether a session is addressable; the session only
/// guards its own conversation log. The log lock is never held across an
/// `.await`.
pub struct CallSession {
    id: String,
    leg: Arc<dyn CallLeg>,
    started_at: DateTime<Utc>,
    started: Instant,
    log: Mutex<TurnLog>,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("provider_id", &self.leg.provider_id())
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a session, for inspection endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub call_id: String,
    pub provider_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub turns: Vec<ConversationTurn>,
}

impl CallSession {
    pub fn new(id: impl Into<String>, leg: Arc<dyn CallLeg>) -> Self {
        Self {
            id: id.into(),
            leg,
            started_at: Utc::now(),
            started: Instant::now(),
            log: Mutex::new(TurnLog::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn leg(&self) -> &Arc<dyn CallLeg> {
        &self.leg
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn log(&self) -> MutexGuard<'_, TurnLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a turn stamped with the current time.
    pub fn append_turn(&self, speaker: Speaker, text: impl Into<String>) {
        let turn = ConversationTurn::now(speaker, text);
        let mut log = self.log();
        if speaker == Speaker::User {
            log.last_user_utterance = Some(turn.text.clone());
        }
        log.turns.push(turn);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Copy of the conversation so far, in order.
    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.log().turns.clone()
    }

    pub fn last_user_utterance(&self) -> Option<String> {
        self.log().last_user_utterance.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            call_id: self.id.clone(),
            provider_id: self.leg.provider_id().to_string(),
            started_at: self.started_at,
            elapsed_seconds: self.elapsed().as_secs_f64(),
            turns: self.transcript(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcall_voice::mock::MockSignaling;
    use agentcall_voice::SignalingBackend;

    async fn session() -> CallSession {
        let leg = MockSignaling::default().dial("+15550001111").await.unwrap();
        CallSession::new("call-1-0", leg)
    }

    #[tokio::test]
    async fn append_tracks_last_user_utterance() {
        let session = session().await;
        assert_eq!(session.last_user_utterance(), None);

        session.append_turn(Speaker::Assistant, "Hi, ready?");
        session.append_turn(Speaker::User, "yes");
        session.append_turn(Speaker::Assistant, "Great.");

        assert_eq!(session.last_user_utterance().as_deref(), Some("yes"));
        let speakers: Vec<Speaker> = session.transcript().iter().map(|t| t.speaker).collect();
        assert_eq!(
            speakers,
            vec![Speaker::Assistant, Speaker::User, Speaker::Assistant]
        );
    }

    #[tokio::test]
    async fn snapshot_serializes_turns() {
        let session = session().await;
        session.append_turn(Speaker::User, "hello");

        let snapshot = session.snapshot();
        assert_eq!(snapshot.call_id, "call-1-0");
        assert_eq!(snapshot.provider_id, "MOCK0001");

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["turns"][0]["speaker"], "user");
        assert_eq!(json["turns"][0]["text"], "hello");
    }
}
