use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity bucket of a detected pothole, derived from its bounding-box area
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geolocation shared by every detection of one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Pothole row as stored
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PotholeRecord {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub severity: Severity,
    pub confidence: f64,
    pub depth: f64,
    pub timestamp: DateTime<Utc>,
}

/// Insert payload; the id is assigned by the database
#[derive(Debug, Clone, PartialEq)]
pub struct NewPothole {
    pub latitude: f64,
    pub longitude: f64,
    pub severity: Severity,
    pub confidence: f64,
    pub depth: f64,
    pub timestamp: DateTime<Utc>,
}

/// Map marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MapPoint {
    pub lat: f64,
    pub lon: f64,
    pub severity: Severity,
}

/// One line of the complaint report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReportEntry {
    pub lat: f64,
    pub lon: f64,
    pub severity: Severity,
    pub confidence: f64,
    pub time: DateTime<Utc>,
}
