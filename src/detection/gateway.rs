use crate::error::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// One prediction exactly as the provider returned it.
///
/// Field validation is deferred to the classifier so that a single bad
/// prediction can be told apart from a failed provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDetection(Value);

impl RawDetection {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Numeric field, accepting both integer and float encodings
    pub fn number(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64).filter(|v| v.is_finite())
    }

    pub fn label(&self) -> Option<&str> {
        self.0.get("class").and_then(Value::as_str)
    }
}

/// Access to an external pothole detector.
///
/// Implementations must report any transport or provider failure as
/// [`Error::DetectionUnavailable`]; an `Ok` with an empty list means the image
/// was analysed and contained no potholes.
#[async_trait]
pub trait DetectionGateway: Send + Sync {
    async fn detect(&self, image: &Path) -> Result<Vec<RawDetection>, Error>;

    /// Name of the detector, reported to clients alongside the results
    fn source_label(&self) -> &str;
}
