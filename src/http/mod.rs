use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::polls::PollError;
use crate::state::AppState;

mod polls;

pub fn router(state: AppState) -> Router {
    assert!(
        state.start_time.elapsed() < Duration::from_secs(86_400),
        "Application uptime exceeds 24 hours before router creation"
    );

    // Poll widgets are embedded on other sites
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .merge(polls::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let uptime = state.start_time.elapsed().as_secs();
    let response = HealthResponse {
        status: "live",
        uptime_seconds: uptime,
    };
    Ok(Json(response))
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .database
        .ping()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    let response = ReadyResponse {
        status: "ready",
        polls_enabled: state.polls.is_poll_enabled(),
        cache_entries: CacheSummary {
            results: state.cache.results.entry_count(),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    polls_enabled: bool,
    cache_entries: CacheSummary,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    results: u64,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    redirect: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self {
            status,
            message,
            redirect: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Tells form clients where to send the user after this failure.
    pub fn with_redirect(mut self, redirect: &str) -> Self {
        assert!(redirect.starts_with('/'), "Redirect must be a local path");
        self.redirect = Some(redirect.to_string());
        self
    }
}

impl From<PollError> for HttpError {
    fn from(err: PollError) -> Self {
        let status = match &err {
            PollError::NotFound { .. } => StatusCode::NOT_FOUND,
            PollError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PollError::AlreadyVoted { .. } => StatusCode::CONFLICT,
            PollError::OptionMismatch { .. } => StatusCode::BAD_REQUEST,
            PollError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
            PollError::Persistence(cause) => {
                error!("Poll storage failure: {cause}");
                return HttpError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Poll storage is unavailable".to_string(),
                );
            }
        };
        HttpError::new(status, err.to_string())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error: {}", self.message);
        let body = Json(ErrorBody {
            error: self.message,
            redirect: self.redirect,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
}
