use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::repositories::PotholesRepository;
use crate::error::Error;
use crate::report::{ComplaintDetails, REPORT_FILE_NAME};
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Route named in the complaint
#[derive(Debug, Deserialize)]
pub struct ReportForm {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
}

fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing form field: {}", name)))
}

/// Build a complaint report over every stored pothole and send it back as a PDF download
pub async fn generate_report(
    State(state): State<AppState>,
    form: Result<Form<ReportForm>, FormRejection>,
) -> ApiResult<Response> {
    let Form(form) =
        form.map_err(|e| ApiError::bad_request(format!("Expected a url-encoded form: {}", e)))?;
    let details = ComplaintDetails {
        source: required(form.source, "source")?,
        destination: required(form.destination, "destination")?,
        generated_at: Utc::now(),
    };

    let entries = PotholesRepository::new(Arc::clone(&state.db_pool))
        .list_all()
        .await?;
    info!(
        "Generating report from {} to {} over {} potholes",
        details.source,
        details.destination,
        entries.len()
    );

    // Unique per request so concurrent reports never share a file
    let output = state.report_dir.join(format!("{}.pdf", Uuid::new_v4()));
    let generator = Arc::clone(&state.reports);
    let path = output.clone();
    tokio::task::spawn_blocking(move || generator.generate(&details, &entries, &path))
        .await
        .map_err(|e| Error::Internal(format!("Report task failed: {}", e)))??;

    let bytes = tokio::fs::read(&output).await.map_err(Error::from)?;
    if let Err(e) = tokio::fs::remove_file(&output).await {
        warn!("Failed to remove report {:?}: {}", output, e);
    }

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", REPORT_FILE_NAME),
        ),
    ];
    Ok((headers, bytes).into_response())
}
