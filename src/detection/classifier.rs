use crate::db::models::Severity;
use crate::detection::gateway::RawDetection;
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Boxes at or above this area are at least `Medium`
pub const MEDIUM_AREA_THRESHOLD: f64 = 3000.0;
/// Boxes at or above this area are `High`
pub const HIGH_AREA_THRESHOLD: f64 = 8000.0;

const DEPTH_SCALE: f64 = 10000.0;

/// Derived fields of one detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub severity: Severity,
    pub confidence: f64,
    pub depth: f64,
}

/// Round to two decimal places.
///
/// Rounds the exact binary value with ties going to the even digit, so
/// `3.125` becomes `3.12` and `2.675` (stored just below) becomes `2.67`.
pub fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

pub fn severity_for_area(area: f64) -> Severity {
    if area < MEDIUM_AREA_THRESHOLD {
        Severity::Low
    } else if area < HIGH_AREA_THRESHOLD {
        Severity::Medium
    } else {
        Severity::High
    }
}

/// Inverse-area depth estimate. A heuristic, not a physical measurement:
/// bigger boxes report smaller depths. The `+ 1` keeps a zero area finite.
pub fn depth_for_area(area: f64) -> f64 {
    round2(DEPTH_SCALE / (area + 1.0))
}

/// Classify one raw detection by its bounding-box area.
pub fn classify(detection: &RawDetection) -> Result<Classification, Error> {
    let width = dimension(detection, "width")?;
    let height = dimension(detection, "height")?;
    let confidence = detection
        .number("confidence")
        .ok_or_else(|| missing("confidence"))?;

    let area = width * height;

    Ok(Classification {
        severity: severity_for_area(area),
        confidence: round2(confidence),
        depth: depth_for_area(area),
    })
}

fn dimension(detection: &RawDetection, name: &str) -> Result<f64, Error> {
    let value = detection.number(name).ok_or_else(|| missing(name))?;
    if value < 0.0 {
        return Err(Error::MalformedDetection(format!(
            "prediction has negative `{}`: {}",
            name, value
        )));
    }
    Ok(value)
}

fn missing(name: &str) -> Error {
    Error::MalformedDetection(format!("prediction is missing numeric `{}`", name))
}
