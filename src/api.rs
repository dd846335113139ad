use std::{future::Future, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{Error, Result},
    models::{
        health::{BrokerHealth, HealthCheckResponse, HealthStatus},
        message::NotificationRequest,
        response::{ApiResponse, CreatedNotification},
        status::{ConnectionState, NotificationStatus},
        validation::validate_request,
    },
    publisher::{MessagePublisher, Publisher},
    service::NotificationService,
};

const DEFAULT_FAILURE_REASON: &str = "marked failed by client";

pub struct AppState {
    service: Arc<NotificationService>,
    publisher: Arc<Publisher>,
}

impl AppState {
    pub fn new(service: Arc<NotificationService>, publisher: Arc<Publisher>) -> Self {
        Self { service, publisher }
    }
}

#[derive(Debug, Deserialize)]
struct StatusUpdateRequest {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/notifications", post(create_notification))
        .route("/notifications/{id}", get(get_notification))
        .route("/notifications/{id}/status", patch(update_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server<F>(config: &Config, state: Arc<AppState>, shutdown: F) -> AnyResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Notification API started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "Notification not found"),
            Error::Connection(_) | Error::Publish(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Notification could not be queued")
            }
            Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Storage failure"),
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "API error");
        }

        let body = ApiResponse::<()>::error(self.to_string(), message);
        (status, Json(body)).into_response()
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::validation(format!("invalid notification id '{}'", raw)))
}

async fn create_notification(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<NotificationRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload
        .map_err(|e| Error::validation(format!("invalid request format: {}", e.body_text())))?;

    validate_request(&request)?;

    let id = state.service.create(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            CreatedNotification { id: id.to_string() },
            "Notification queued successfully",
        )),
    ))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let id = parse_id(&id)?;

    let record = state
        .service
        .get_by_id(id)
        .await?
        .ok_or(Error::NotFound(id))?;

    Ok(Json(ApiResponse::success(record, "Notification retrieved")))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let id = parse_id(&id)?;
    let Json(update) = payload
        .map_err(|e| Error::validation(format!("invalid request format: {}", e.body_text())))?;

    match update.status.parse::<NotificationStatus>() {
        Ok(NotificationStatus::Delivered) => state.service.mark_delivered(id).await?,
        Ok(NotificationStatus::Failed) => {
            let reason = update.reason.as_deref().unwrap_or(DEFAULT_FAILURE_REASON);
            state.service.mark_failed(id, reason).await?
        }
        _ => {
            return Err(Error::validation("status must be 'delivered' or 'failed'"));
        }
    }

    Ok(Json(ApiResponse::ok("Status updated successfully")))
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connection = if state.publisher.is_connected() {
        ConnectionState::Connected
    } else {
        ConnectionState::Disconnected
    };

    let health = HealthCheckResponse::from_broker(
        BrokerHealth {
            state: connection,
            retry_backlog: state.publisher.retry_backlog(),
        },
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    );

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}
