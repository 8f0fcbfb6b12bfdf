//! Request and response bodies for the conversation tools.
//!
//! Only primitive fields cross this boundary; audio never does.

use serde::{Deserialize, Serialize};

/// Input of `initiate_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateCallRequest {
    /// Spoken to the user as soon as they answer.
    pub message: String,
}

/// Output of `initiate_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateCallResponse {
    pub call_id: String,
    /// What the user said back, possibly empty.
    pub response: String,
}

/// Input of `continue_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueCallRequest {
    pub call_id: String,
    pub message: String,
}

/// Output of `continue_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueCallResponse {
    pub response: String,
}

/// Input of `speak_to_user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakToUserRequest {
    pub call_id: String,
    pub message: String,
}

/// Output of `speak_to_user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakToUserResponse {
    pub success: bool,
}

/// Input of `end_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndCallRequest {
    pub call_id: String,
    /// Optional goodbye spoken before hanging up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Output of `end_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndCallResponse {
    pub duration_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_call_message_is_optional() {
        let req: EndCallRequest =
            serde_json::from_str(r#"{"call_id":"call-1-1700000000"}"#).expect("deserialize");
        assert_eq!(req.call_id, "call-1-1700000000");
        assert!(req.message.is_none());

        let json = serde_json::to_value(&req).expect("serialize");
        assert!(json.get("message").is_none());
    }
}
