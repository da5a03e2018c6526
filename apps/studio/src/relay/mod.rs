//! Streaming Chat Relay: forwards a composed prompt, or a running
//! conversation, to the hosted model and streams its output back.

pub mod fences;
pub mod handlers;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::llm_client::{ChatRequest, ChatTurn};

pub use fences::strip_code_fences;

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<ChatTurn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl GenerateRequest {
    pub fn fresh(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    /// The caller has already appended the new user turn to `history`.
    pub fn conversation(history: Vec<ChatTurn>, system_prompt: Option<String>) -> Self {
        Self {
            prompt: None,
            conversation_history: Some(history),
            system_prompt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Fresh,
    Conversational,
}

/// Maps the wire request onto the model's turn sequence.
///
/// A non-empty history wins and `prompt` is ignored; the system prompt is
/// only honoured in conversational mode. Nothing is appended to the history.
pub fn build_chat_request(request: GenerateRequest) -> Result<(RelayMode, ChatRequest), AppError> {
    let GenerateRequest {
        prompt,
        conversation_history,
        system_prompt,
    } = request;

    if let Some(history) = conversation_history.filter(|h| !h.is_empty()) {
        let system = system_prompt.filter(|s| !s.trim().is_empty());
        return Ok((
            RelayMode::Conversational,
            ChatRequest {
                system,
                turns: history,
            },
        ));
    }

    match prompt.filter(|p| !p.is_empty()) {
        Some(prompt) => Ok((
            RelayMode::Fresh,
            ChatRequest {
                system: None,
                turns: vec![ChatTurn::user(prompt)],
            },
        )),
        None => Err(AppError::Validation("Prompt is required".to_string())),
    }
}
