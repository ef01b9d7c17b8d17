use crate::config::ApiConfig;
use crate::error::Error;
use crate::report::ReportGenerator;
use crate::services::detection::DetectionService;
use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde::Serialize;
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

pub mod detect_controller;
pub mod pothole_controller;
pub mod report_controller;


// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: Arc<SqlitePool>,
    pub detection: Arc<DetectionService>,
    pub reports: Arc<dyn ReportGenerator>,
    pub report_dir: PathBuf,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub message: String,
    pub status: u16,
}

/// Error body shared by every endpoint
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            message: message.into(),
            status: StatusCode::BAD_REQUEST.as_u16(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::DetectionUnavailable(_) => StatusCode::BAD_GATEWAY,
            // Malformed predictions are skipped by the detection service
            Error::MalformedDetection(_)
            | Error::StorageUnavailable(_)
            | Error::ConfigurationMissing(_)
            | Error::Report(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        ApiError {
            message: err.to_string(),
            status: status.as_u16(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return (*err).clone().into();
        }

        ApiError {
            message: err.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

/// Implement IntoResponse for ApiError
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self.message);
        }
        let body = Json(ErrorBody {
            status: "error",
            message: &self.message,
        });
        (status, body).into_response()
    }
}

/// Build the full application router: API routes, HTML pages and static assets
pub fn build_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false)
        .max_age(Duration::from_secs(3600));

    let public_dir = &config.public_dir;

    Router::new()
        .route("/detect", post(detect_controller::detect))
        .route("/api/potholes", get(pothole_controller::list_potholes))
        .route("/api/health", get(pothole_controller::health))
        .route("/generate-report", post(report_controller::generate_report))
        .with_state(state)
        .route_service("/", ServeFile::new(public_dir.join("home.html")))
        .route_service("/detect-page", ServeFile::new(public_dir.join("detect.html")))
        .route_service("/report", ServeFile::new(public_dir.join("report_form.html")))
        .nest_service("/static", ServeDir::new(public_dir.join("static")))
        .layer(DefaultBodyLimit::max(config.max_upload_mb * 1024 * 1024))
        .layer(cors)
}

pub struct RestApi {
    config: ApiConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(config: &ApiConfig, state: AppState) -> Self {
        Self {
            config: config.clone(),
            state,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let app = build_router(self.state.clone(), &self.config);

        // Build the server address
        let addr = self.config.address.clone() + ":" + &self.config.port.to_string();
        let addr: SocketAddr = addr.parse()?;

        info!("API server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;

        axum::Server::from_tcp(listener.into_std()?)?
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
