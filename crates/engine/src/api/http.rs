//! HTTP routes.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::app::App;
use crate::use_cases::campaign::CampaignError;
use loreforge_domain::{CampaignId, StoredMessage};
use loreforge_shared::{CampaignCreateRequest, CampaignCreateResponse, TurnRequest, TurnResponse};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/campaigns", post(create_campaign))
        .route("/api/campaigns/{id}", get(get_campaign).delete(delete_campaign))
        .route("/api/campaigns/{id}/messages", get(list_messages))
        .route("/api/campaigns/{id}/turn", post(run_turn))
}

async fn health() -> &'static str {
    "OK"
}

async fn create_campaign(
    State(app): State<Arc<App>>,
    Json(request): Json<CampaignCreateRequest>,
) -> Result<Json<CampaignCreateResponse>, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Campaign name is required".to_string()));
    }
    let response = app.campaigns.create(request).await?;
    Ok(Json(response))
}

async fn get_campaign(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<loreforge_domain::Campaign>, ApiError> {
    let campaign = app.campaigns.get(CampaignId::from_uuid(id)).await?;
    Ok(Json(campaign))
}

#[derive(serde::Deserialize)]
struct MessagesQuery {
    limit: Option<usize>,
}

async fn list_messages(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    let limit = query.limit.unwrap_or(50).min(500);
    let messages = app
        .campaigns
        .messages(CampaignId::from_uuid(id), limit)
        .await?;
    Ok(Json(messages))
}

async fn delete_campaign(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    app.campaigns.delete(CampaignId::from_uuid(id)).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// The turn endpoint never surfaces an HTTP error for pipeline
/// failures; degraded outcomes come back as `success: false` in the
/// body so clients keep a consistent shape to render.
async fn run_turn(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(mut request): Json<TurnRequest>,
) -> Json<TurnResponse> {
    // The path is authoritative when body and path disagree.
    request.campaign_id = id;
    Json(app.orchestrator.execute(request).await)
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => {
                (axum::http::StatusCode::NOT_FOUND, "Not found").into_response()
            }
            ApiError::BadRequest(msg) => {
                (axum::http::StatusCode::BAD_REQUEST, msg).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error",
                )
                    .into_response()
            }
        }
    }
}

impl From<CampaignError> for ApiError {
    fn from(e: CampaignError) -> Self {
        match e {
            CampaignError::NotFound => ApiError::NotFound,
            CampaignError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<crate::infrastructure::ports::RepoError> for ApiError {
    fn from(e: crate::infrastructure::ports::RepoError) -> Self {
        ApiError::Internal(e.to_string())
    }
}
