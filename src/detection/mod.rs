//! Pothole detection: the external inference gateway and the local
//! severity classification applied to what it returns.

pub mod classifier;
pub mod gateway;
pub mod roboflow;

pub use classifier::{classify, Classification};
pub use gateway::{DetectionGateway, RawDetection};
pub use roboflow::RoboflowGateway;
