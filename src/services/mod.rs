pub mod detection;

pub use detection::{DetectionOutcome, DetectionService};
