use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::Location;
use crate::detection::Classification;
use crate::services::detection::DetectionOutcome;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::Json;
use axum::body::Bytes;
use log::info;
use serde::{Deserialize, Serialize};

/// Response for a successful detect request
#[derive(Debug, Serialize, Deserialize)]
pub struct DetectResponse {
    pub status: String,
    pub count: usize,
    pub detections: Vec<Classification>,
    /// Name of the detector that produced the results
    pub fps: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skipped: usize,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

impl From<DetectionOutcome> for DetectResponse {
    fn from(outcome: DetectionOutcome) -> Self {
        Self {
            status: "success".to_string(),
            count: outcome.detections.len(),
            detections: outcome.detections,
            fps: outcome.source,
            skipped: outcome.skipped,
        }
    }
}

/// Fields of the detect form
struct DetectForm {
    image: Bytes,
    location: Location,
}

/// Run pothole detection on an uploaded image and record the results
pub async fn detect(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<DetectResponse>> {
    let mut multipart = multipart
        .map_err(|e| ApiError::bad_request(format!("Expected a multipart form: {}", e)))?;
    let form = read_detect_form(&mut multipart).await?;

    info!(
        "Detect request: {} byte image at ({}, {})",
        form.image.len(),
        form.location.latitude,
        form.location.longitude
    );

    let outcome = state.detection.detect(&form.image, form.location).await?;

    Ok(Json(outcome.into()))
}

async fn read_detect_form(multipart: &mut Multipart) -> ApiResult<DetectForm> {
    let mut image = None;
    let mut location = Location::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to parse multipart data: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read image: {}", e)))?;
                image = Some(bytes);
            }
            "latitude" | "longitude" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read {}: {}", name, e)))?;
                let value = parse_coordinate(&name, &text)?;
                if name == "latitude" {
                    location.latitude = value;
                } else {
                    location.longitude = value;
                }
            }
            _ => {}
        }
    }

    let image = image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("No image uploaded"))?;

    Ok(DetectForm { image, location })
}

/// Blank coordinates fall back to 0, like missing ones
fn parse_coordinate(name: &str, text: &str) -> ApiResult<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0.0);
    }
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ApiError::bad_request(format!("Invalid {}: {:?}", name, text)))
}
