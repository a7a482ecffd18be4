//! `/chat` routes: send a message, read a session's history.
//!
//! Wire format is camelCase JSON. Every failure body is `{ "error": "..." }`.

use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spurchat_core::error::Error;
use spurchat_core::message::{ConversationId, Message, Role};
use tracing::{debug, error};

use crate::SharedState;

/// Opaque body for anything that is not the caller's fault.
pub const INTERNAL_ERROR: &str = "Internal Server Error";

/// Body for requests whose JSON is malformed or has the wrong shape.
pub const INVALID_BODY: &str = "Invalid request body";

/// Body for requests over the gateway's body limit.
pub const BODY_TOO_LARGE: &str = "Request body too large";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub reply: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageDto {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id.0,
            role: message.role,
            content: message.content,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<MessageDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Validation problems are the client's; everything else is opaque.
fn map_error(err: Error) -> ApiError {
    if err.is_validation() {
        return api_error(StatusCode::BAD_REQUEST, err.to_string());
    }
    error!(error = %err, "Chat request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
}

/// Routes for sending messages. Rate limiting is applied by the caller.
pub fn message_routes() -> Router<SharedState> {
    Router::new().route("/message", post(send_message_handler))
}

/// Read-only routes.
pub fn history_routes() -> Router<SharedState> {
    Router::new().route("/{session_id}", get(history_handler))
}

async fn send_message_handler(
    State(state): State<SharedState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        debug!(reason = %rejection.body_text(), "Rejected chat request body");
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => api_error(StatusCode::PAYLOAD_TOO_LARGE, BODY_TOO_LARGE),
            _ => api_error(StatusCode::BAD_REQUEST, INVALID_BODY),
        }
    })?;

    let reply = state
        .chat
        .send_message(&payload.message, payload.session_id.as_deref())
        .await
        .map_err(map_error)?;

    Ok(Json(SendMessageResponse {
        reply: reply.reply,
        session_id: reply.session_id.0,
    }))
}

async fn history_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state
        .chat
        .get_history(&ConversationId::from(session_id.as_str()))
        .await
        .map_err(map_error)?;

    Ok(Json(HistoryResponse {
        history: history.into_iter().map(MessageDto::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spurchat_core::error::StoreError;

    #[test]
    fn message_dto_uses_camel_case() {
        let dto = MessageDto {
            id: "m1".into(),
            conversation_id: "c1".into(),
            role: Role::Assistant,
            content: "Hello!".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["role"], "assistant");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn request_session_id_is_optional() {
        let req: SendMessageRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(req.session_id.is_none());

        let req: SendMessageRequest =
            serde_json::from_str(r#"{"message":"hi","sessionId":"abc"}"#).unwrap();
        assert_eq!(req.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn store_errors_are_opaque() {
        let (status, Json(body)) =
            map_error(Error::Store(StoreError::Storage("disk full".into())));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, INTERNAL_ERROR);
    }

    #[test]
    fn validation_errors_keep_their_message() {
        let (status, Json(body)) = map_error(Error::validation("Message too long"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Message too long");
    }
}
