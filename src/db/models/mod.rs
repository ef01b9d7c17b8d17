pub mod pothole_models;

pub use pothole_models::{Location, MapPoint, NewPothole, PotholeRecord, ReportEntry, Severity};
