pub mod api;
pub mod config;
pub mod db;
pub mod detection;
pub mod error;
pub mod report;
pub mod services;

// Re-export main components for easier use
pub use config::Config;
pub use detection::{classify, Classification, DetectionGateway, RawDetection, RoboflowGateway};
pub use error::Error;
pub use services::detection::{DetectionOutcome, DetectionService};
