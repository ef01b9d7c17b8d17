//! Complaint reports built from the stored potholes.

pub mod pdf;

use crate::db::models::{ReportEntry, Severity};
use crate::error::Error;
use chrono::{DateTime, Utc};
use std::path::Path;

pub use pdf::PdfReportGenerator;

/// File name offered to clients downloading a report
pub const REPORT_FILE_NAME: &str = "road_health_complaint_report.pdf";

/// Route the complaint is about
#[derive(Debug, Clone)]
pub struct ComplaintDetails {
    pub source: String,
    pub destination: String,
    pub generated_at: DateTime<Utc>,
}

/// Renders a complaint report to a file
pub trait ReportGenerator: Send + Sync {
    fn generate(
        &self,
        details: &ComplaintDetails,
        potholes: &[ReportEntry],
        output: &Path,
    ) -> Result<(), Error>;
}

/// Per-severity totals printed at the top of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ReportSummary {
    pub fn from_entries(entries: &[ReportEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut summary, entry| {
            summary.total += 1;
            match entry.severity {
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
            summary
        })
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(severity: Severity) -> ReportEntry {
        ReportEntry {
            lat: 1.0,
            lon: 2.0,
            severity,
            confidence: 0.9,
            time: Utc::now(),
        }
    }

    #[test]
    fn summary_counts_each_severity() {
        let entries = vec![
            entry(Severity::High),
            entry(Severity::Low),
            entry(Severity::High),
            entry(Severity::Medium),
        ];
        let summary = ReportSummary::from_entries(&entries);
        assert_eq!(
            summary,
            ReportSummary {
                total: 4,
                high: 2,
                medium: 1,
                low: 1
            }
        );
        assert_eq!(summary.count(Severity::High), 2);
    }

    #[test]
    fn empty_summary() {
        assert_eq!(ReportSummary::from_entries(&[]), ReportSummary::default());
    }
}
