//! REST API handlers.
//!
//! Every body carries `success` and `msg`; successful calls add `data`.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::{debug, warn};

use cats_core::{ClientRequest, Selection, SelectionResult, SyncResponse};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    msg: String,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T, msg: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            msg: msg.into(),
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            msg: msg.to_string(),
        }),
    )
}

/// `data` of a successful `/select`.
#[derive(Serialize)]
struct SelectData {
    #[serde(flatten)]
    selection: Selection,
    service_name: String,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    msg: String,
}

/// GET /sync
pub async fn sync(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.store.read();
    debug!(cycle = snapshot.cycle(), services = snapshot.service_count(), "serving sync");
    Json(SyncResponse {
        success: true,
        data: snapshot.services().clone(),
        msg: format!("metrics synced (cycle {})", snapshot.cycle()),
    })
}

/// POST /select
pub async fn select(
    State(state): State<ApiState>,
    payload: Result<Json<ClientRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected select request");
            return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST).into_response();
        }
    };
    if request.service_id.trim().is_empty() {
        return error_response("service_id must not be empty", StatusCode::BAD_REQUEST).into_response();
    }
    let Some(selector) = state.selector.as_ref() else {
        return error_response("path selection is not enabled on this node", StatusCode::SERVICE_UNAVAILABLE)
            .into_response();
    };

    match selector.select(&request).await {
        SelectionResult::Selected(selection) => {
            let service_name = format!("best service: {}", selection.service_id);
            ApiResponse::ok(SelectData { selection, service_name }, "path selected").into_response()
        }
        SelectionResult::NoCandidate => error_response(
            "no qualifying instance: every site is down or outside the requested limits",
            StatusCode::NOT_FOUND,
        )
        .into_response(),
    }
}

/// GET /api/metrics/all
pub async fn all_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.store.read().services().clone())
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.store.read();
    Json(Health {
        status: "ok",
        msg: format!(
            "cats running: {} services, {} instances",
            snapshot.service_count(),
            snapshot.instance_count()
        ),
    })
}
