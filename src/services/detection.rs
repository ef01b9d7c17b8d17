use crate::db::models::{Location, NewPothole};
use crate::db::repositories::PotholesRepository;
use crate::detection::{classify, Classification, DetectionGateway};
use crate::error::Error;
use anyhow::Result;
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Result of one detect request
#[derive(Debug, Clone, Serialize)]
pub struct DetectionOutcome {
    pub detections: Vec<Classification>,
    /// Predictions dropped because they lacked usable dimensions or confidence
    pub skipped: usize,
    pub source: String,
}

/// Runs an uploaded image through the detector and records what it finds
pub struct DetectionService {
    gateway: Arc<dyn DetectionGateway>,
    potholes: PotholesRepository,
    upload_dir: PathBuf,
}

impl DetectionService {
    pub fn new(
        gateway: Arc<dyn DetectionGateway>,
        potholes: PotholesRepository,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            potholes,
            upload_dir: upload_dir.into(),
        }
    }

    /// Detect potholes in `image` and store one record per detection, all
    /// stamped with `location`. Either every detection of the request is
    /// stored or none is.
    pub async fn detect(&self, image: &[u8], location: Location) -> Result<DetectionOutcome> {
        let upload = TransientUpload::write(&self.upload_dir, image).await?;

        let response = self.gateway.detect(upload.path()).await;
        upload.remove().await;
        let raw_detections = response?;

        let mut detections = Vec::with_capacity(raw_detections.len());
        let mut skipped = 0;
        for (index, raw) in raw_detections.iter().enumerate() {
            match classify(raw) {
                Ok(classification) => detections.push(classification),
                Err(Error::MalformedDetection(reason)) => {
                    warn!("Skipping prediction {}: {}", index, reason);
                    skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let timestamp = Utc::now();
        let rows: Vec<NewPothole> = detections
            .iter()
            .map(|d| NewPothole {
                latitude: location.latitude,
                longitude: location.longitude,
                severity: d.severity,
                confidence: d.confidence,
                depth: d.depth,
                timestamp,
            })
            .collect();
        self.potholes.insert_batch(&rows).await?;

        info!(
            "Recorded {} potholes at ({}, {}), skipped {}",
            detections.len(),
            location.latitude,
            location.longitude,
            skipped
        );

        Ok(DetectionOutcome {
            detections,
            skipped,
            source: self.gateway.source_label().to_string(),
        })
    }
}

/// Uploaded image stored under a request-unique name.
///
/// Call [`TransientUpload::remove`] once the file is no longer needed; dropping
/// it without doing so still deletes the file, blocking.
struct TransientUpload {
    path: PathBuf,
    removed: bool,
}

impl TransientUpload {
    async fn write(dir: &Path, bytes: &[u8]) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Io(format!("Failed to create upload directory {:?}: {}", dir, e)))?;

        let path = dir.join(format!("{}.jpg", Uuid::new_v4()));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Io(format!("Failed to save upload {:?}: {}", path, e)))?;

        Ok(Self {
            path,
            removed: false,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove upload {:?}: {}", self.path, e);
            }
        }
    }
}

impl Drop for TransientUpload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove upload {:?}: {}", self.path, e);
            }
        }
    }
}
