//! The call orchestrator: session registry plus the four conversation
//! operations.

use crate::error::{CallError, NotAnsweredReason};
use crate::session::{CallSession, SessionSnapshot};
use crate::settings::CallSettings;
use crate::speech_in::{SpeechIn, Utterance};
use crate::speech_out::SpeechOut;
use agentcall_types::CallStatus;
use agentcall_voice::{CallLeg, SignalingBackend, SpeechRecognizer, SpeechSynthesizer};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of a successful `initiate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedCall {
    pub call_id: String,
    pub utterance: Utterance,
}

/// Owns every live call and drives their conversations.
///
/// The registry lock and each session's log lock are independent; the
/// registry lock is only held for map operations, never across an `.await`.
/// Operations on the same call must be sequenced by the caller.
pub struct CallManager {
    signaling: Arc<dyn SignalingBackend>,
    speech_out: SpeechOut,
    speech_in: SpeechIn,
    settings: CallSettings,
    calls: RwLock<HashMap<String, Arc<CallSession>>>,
    next_id: AtomicU64,
}

impl CallManager {
    pub fn new(
        signaling: Arc<dyn SignalingBackend>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        recognizer: Arc<dyn SpeechRecognizer>,
        settings: CallSettings,
    ) -> Self {
        Self {
            signaling,
            speech_out: SpeechOut::new(synthesizer, settings.synthesis.clone()),
            speech_in: SpeechIn::new(
                recognizer,
                settings.transcription.clone(),
                settings.transcript_timeout,
            ),
            settings,
            calls: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn next_call_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("call-{}-{}", n, Utc::now().timestamp())
    }

    fn register(&self, session: Arc<CallSession>) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id().to_string(), session);
    }

    fn evict(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(call_id)
    }

    fn lookup(&self, call_id: &str) -> Result<Arc<CallSession>, CallError> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(call_id)
            .cloned()
            .ok_or_else(|| CallError::CallNotFound(call_id.to_string()))
    }

    /// Number of registered calls.
    pub fn active_count(&self) -> usize {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Snapshot of one live call.
    pub fn get(&self, call_id: &str) -> Option<SessionSnapshot> {
        self.lookup(call_id).ok().map(|session| session.snapshot())
    }

    /// Snapshots of every live call, oldest first.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<Arc<CallSession>> = self
            .calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut snapshots: Vec<SessionSnapshot> =
            sessions.iter().map(|session| session.snapshot()).collect();
        snapshots.sort_by_key(|snapshot| snapshot.started_at);
        snapshots
    }

    /// Dials the user, waits for an answer, speaks `message` and returns
    /// their reply.
    ///
    /// The answer timeout bounds dialing and ringing together, and every
    /// provider call on the way is raced against `cancel`. When the call is
    /// not answered it is hung up (best effort) and never becomes
    /// addressable. Once answered, a failure to speak or listen is returned
    /// but the call stays registered so it can still be ended.
    pub async fn initiate(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<InitiatedCall, CallError> {
        let deadline = Instant::now() + self.settings.answer_timeout;
        let dialed = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NotAnsweredReason::Cancelled),
            dialed = tokio::time::timeout_at(
                deadline,
                self.signaling.dial(&self.settings.user_number),
            ) => dialed.map_err(|_| NotAnsweredReason::TimedOut),
        };
        let leg = match dialed {
            Ok(result) => result.map_err(CallError::DialFailed)?,
            Err(reason) => {
                tracing::info!(%reason, "dial abandoned");
                return Err(CallError::CallNotAnswered { reason });
            }
        };

        let call_id = self.next_call_id();
        let session = Arc::new(CallSession::new(call_id.clone(), leg.clone()));
        self.register(session.clone());
        tracing::info!(call_id = %call_id, provider_id = %leg.provider_id(), "call placed");

        if let Err(reason) = self.wait_for_answer(leg.as_ref(), deadline, cancel).await {
            tracing::info!(call_id = %call_id, %reason, "call not answered");
            // Whoever evicts owns the hangup; shutdown may already have done both.
            if self.evict(&call_id).is_some() {
                if let Err(e) = leg.hangup().await {
                    tracing::warn!(call_id = %call_id, error = %e, "hangup after no answer failed");
                }
            }
            return Err(CallError::CallNotAnswered { reason });
        }

        // Shutdown or `end` may have taken the call while it was ringing.
        if self.lookup(&call_id).is_err() {
            tracing::info!(call_id = %call_id, "call ended before it was answered");
            return Err(CallError::CallNotFound(call_id));
        }
        tracing::info!(call_id = %call_id, "call answered");

        let utterance = self.speak_and_listen(&session, message, cancel).await?;
        Ok(InitiatedCall { call_id, utterance })
    }

    /// Speaks `message` on a live call and returns the user's reply.
    pub async fn continue_call(
        &self,
        call_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Utterance, CallError> {
        let session = self.lookup(call_id)?;
        self.speak_and_listen(&session, message, cancel).await
    }

    /// Speaks `message` on a live call without waiting for a reply.
    pub async fn announce(
        &self,
        call_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CallError> {
        let session = self.lookup(call_id)?;
        self.speech_out.speak(&session, message, cancel).await
    }

    /// Optionally says goodbye, then hangs up and forgets the call.
    ///
    /// The goodbye is best effort. The call is evicted before the hangup is
    /// attempted, so it is gone even when `HangupFailed` is returned.
    pub async fn end(
        &self,
        call_id: &str,
        message: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Duration, CallError> {
        let session = self.lookup(call_id)?;

        if let Some(message) = message.filter(|m| !m.is_empty()) {
            if let Err(e) = self.speech_out.speak(&session, message, cancel).await {
                tracing::warn!(call_id = %call_id, error = %e, "final message not delivered");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.end_grace) => {}
                _ = cancel.cancelled() => {}
            }
        }

        // Whoever evicts owns the hangup.
        let session = self
            .evict(call_id)
            .ok_or_else(|| CallError::CallNotFound(call_id.to_string()))?;
        let duration = session.elapsed();

        session
            .leg()
            .hangup()
            .await
            .map_err(|source| CallError::HangupFailed {
                call_id: call_id.to_string(),
                source,
            })?;

        tracing::info!(call_id = %call_id, duration_secs = duration.as_secs_f64(), "call ended");
        Ok(duration)
    }

    /// Hangs up every live call and clears the registry.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<CallSession>> = self
            .calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, session)| session)
            .collect();

        if !sessions.is_empty() {
            tracing::info!(count = sessions.len(), "hanging up live calls");
        }
        for session in sessions {
            if let Err(e) = session.leg().hangup().await {
                tracing::warn!(call_id = %session.id(), error = %e, "hangup during shutdown failed");
            }
        }
    }

    async fn speak_and_listen(
        &self,
        session: &CallSession,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Utterance, CallError> {
        self.speech_out.speak(session, message, cancel).await?;
        self.speech_in.listen(session, cancel).await
    }

    async fn wait_for_answer(
        &self,
        leg: &dyn CallLeg,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), NotAnsweredReason> {
        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(NotAnsweredReason::Cancelled),
                polled = tokio::time::timeout_at(deadline, leg.status()) => polled,
            };

            match polled {
                Err(_) => return Err(NotAnsweredReason::TimedOut),
                Ok(Ok(CallStatus::Answered)) => return Ok(()),
                Ok(Ok(status)) if status.is_terminal() => {
                    return Err(NotAnsweredReason::Status(status));
                }
                Ok(Ok(status)) => tracing::trace!(provider_id = %leg.provider_id(), %status, "waiting for answer"),
                Ok(Err(e)) => {
                    tracing::warn!(provider_id = %leg.provider_id(), error = %e, "call status check failed");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(NotAnsweredReason::TimedOut);
            }
            let pause = self.settings.poll_interval.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => return Err(NotAnsweredReason::Cancelled),
            }
        }
    }
}
