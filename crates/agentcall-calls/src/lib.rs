//! Call orchestration for agentcall.
//!
//! [`CallManager`] places outbound calls through a signaling backend and
//! runs the conversation on them: it speaks through a [`SpeechOut`]
//! pipeline, listens through a [`SpeechIn`] pipeline, and keeps every live
//! call in a registry keyed by call id. Each [`CallSession`] carries the
//! call's turn log.
//!
//! Every operation takes a `CancellationToken`. Cancelling while the phone
//! rings hangs up; cancelling a listen returns what was heard so far;
//! cancelling while speaking interrupts delivery.

mod error;
pub mod manager;
pub mod session;
pub mod settings;
pub mod speech_in;
pub mod speech_out;

pub use error::{CallError, NotAnsweredReason};
pub use manager::{CallManager, InitiatedCall};
pub use session::{CallSession, SessionSnapshot};
pub use settings::CallSettings;
pub use speech_in::{Resolution, SpeechIn, Utterance};
pub use speech_out::SpeechOut;
