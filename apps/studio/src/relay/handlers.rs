//! Axum route handler for the Relay API.

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::relay::{build_chat_request, GenerateRequest};
use crate::state::AppState;

/// POST /api/generate
///
/// Streams the model's reply as `text/plain`, one body frame per model
/// chunk, in arrival order. Errors before the first chunk map to a status
/// code; a failure mid-stream aborts the body so the client sees a broken
/// transfer rather than a short reply.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4();
    let (mode, chat) = build_chat_request(request)?;
    info!(
        %request_id,
        ?mode,
        turns = chat.turns.len(),
        system = chat.system.is_some(),
        "Relay request accepted"
    );

    let chunks = state.model.stream_chat(chat).await?;

    let mut forwarded = 0usize;
    let body = chunks.map(move |item| {
        match &item {
            Ok(chunk) => {
                forwarded += 1;
                debug!(%request_id, "Forwarding chunk {} ({} bytes)", forwarded, chunk.len());
            }
            Err(e) => {
                error!(%request_id, "Relay stream failed after {} chunks: {}", forwarded, e);
            }
        }
        item
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}
