//! HTTP surface: POST /analyze plus a health probe.
//!
//! Error classes map onto status codes the caller can act on: keyword
//! validation problems are the client's fault (422), insufficient collector
//! data is temporary (503), everything else is ours (500).

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::classify::{types::ClassificationResult, ClassifyError, HypeClassifier};

#[derive(Clone)]
pub struct AppState {
    classifier: Arc<HypeClassifier>,
}

impl AppState {
    pub fn new(classifier: Arc<HypeClassifier>) -> Self {
        Self { classifier }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/analyze", post(analyze))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct AnalyzeReq {
    keyword: String,
}

#[derive(serde::Serialize)]
struct ErrorBody {
    detail: String,
}

async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeReq>,
) -> Result<Json<ClassificationResult>, ApiError> {
    let result = state.classifier.classify(&body.keyword).await?;
    Ok(Json(result))
}

struct ApiError(ClassifyError);

impl From<ClassifyError> for ApiError {
    fn from(err: ClassifyError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ClassifyError::InvalidKeyword(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ClassifyError::InsufficientData { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ClassifyError::Classification(_)
            | ClassifyError::Synthesis(_)
            | ClassifyError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "analysis failed");
        }
        let body = ErrorBody {
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
