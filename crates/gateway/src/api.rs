//! REST API handlers.
//!
//! | Method | Path                   | Description                      |
//! |--------|------------------------|----------------------------------|
//! | GET    | /personas              | Catalog listing (gallery preview)|
//! | GET    | /personas/{id}         | Full persona                     |
//! | POST   | /personas/{id}/chat    | Run one chat turn                |
//! | GET    | /conversations/{id}    | Stored turns and score history   |

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use charmline_core::error::{Error, ErrorKind};
use charmline_core::message::{ConversationId, ConversationRecord};
use charmline_core::persona::{Persona, PersonaId};
use charmline_core::provider::Backend;
use charmline_core::store::{ConversationStore, PersonaCatalog};
use charmline_engine::{ChatOutcome, ChatRequest, rounded_mean};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::SharedState;

/// Number of gallery images shown in the catalog listing.
const GALLERY_PREVIEW: usize = 3;

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default, alias = "conversationId")]
    pub conversation_id: Option<ConversationId>,
    pub message: String,
    #[serde(default, alias = "llmType")]
    pub backend: Option<Backend>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    #[serde(flatten)]
    pub record: ConversationRecord,
    pub avg_score: u32,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for an error classification.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidScore | ErrorKind::BackendRejected => StatusCode::BAD_GATEWAY,
        ErrorKind::BackendUnavailable | ErrorKind::StoreUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorKind::BackendTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: Error) -> ApiError {
    let kind = e.kind();
    (
        status_for(kind),
        Json(ErrorResponse {
            error: e.to_string(),
            kind,
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub async fn list_personas(State(state): State<SharedState>) -> Result<Json<Vec<Persona>>, ApiError> {
    let personas = state
        .engine
        .catalog()
        .list()
        .await
        .map_err(|e| api_error(e.into()))?;

    Ok(Json(
        personas
            .iter()
            .map(|p| p.with_gallery_preview(GALLERY_PREVIEW))
            .collect(),
    ))
}

pub async fn get_persona(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Persona>, ApiError> {
    state
        .engine
        .catalog()
        .get(&PersonaId(id))
        .await
        .map(Json)
        .map_err(|e| api_error(e.into()))
}

pub async fn chat(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatOutcome>, ApiError> {
    let Json(body) = body.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected chat body");
        api_error(Error::Validation(rejection.body_text()))
    })?;

    let request = ChatRequest {
        persona_id: PersonaId(id),
        conversation_id: body.conversation_id,
        message: body.message,
        backend: body.backend,
    };

    match state.engine.handle(request).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            error!(error = %e, kind = %e.kind(), "Chat turn failed");
            Err(api_error(e))
        }
    }
}

pub async fn get_conversation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let record = state
        .engine
        .store()
        .load(&ConversationId(id))
        .await
        .map_err(|e| api_error(e.into()))?;

    Ok(Json(ConversationResponse {
        avg_score: rounded_mean(&record.score_history),
        record,
    }))
}
