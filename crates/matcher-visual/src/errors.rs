///! Error types for visual matching
use std::fmt;

use resilience_core_types::DriverError;

#[derive(Debug)]
pub enum VisualError {
    /// Element screenshot could not be captured
    CaptureFailed(String),

    /// Image decoding or resizing failed
    ImageProcessing(String),

    /// Element has no usable geometry
    MissingGeometry(String),

    /// Driver call failed
    Driver(DriverError),

    /// Invalid input parameters
    InvalidInput(String),
}

impl fmt::Display for VisualError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaptureFailed(msg) => write!(f, "Screenshot capture failed: {}", msg),
            Self::ImageProcessing(msg) => write!(f, "Image processing error: {}", msg),
            Self::MissingGeometry(msg) => write!(f, "Missing element geometry: {}", msg),
            Self::Driver(err) => write!(f, "Driver error: {}", err),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for VisualError {}

impl From<image::ImageError> for VisualError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing(err.to_string())
    }
}

impl From<DriverError> for VisualError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}
