//! Camera/decoder capability consumed by the scan runtime.

/// Decoder fed programmatically through a [`feed::DecodeFeed`].
pub mod feed;
/// Decoder reading one code per line from an async reader.
pub mod lines;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::FacingMode;

/// Stream of decoded payloads for one camera session.
///
/// The stream ends when the decoder is stopped or its source runs dry.
pub type DecodeStream = mpsc::Receiver<String>;

/// Pass-through capture settings handed to the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Preferred camera.
    pub facing_mode: FacingMode,
    /// Target decode frame rate.
    pub fps: u32,
    /// Edge length of the square detection region, in pixels.
    pub detection_box_size: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Rear,
            fps: 10,
            detection_box_size: 250,
        }
    }
}

/// Reasons a decoder could not start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// Access to the camera was refused.
    #[error("camera permission denied")]
    PermissionDenied,
    /// No usable capture device.
    #[error("no camera device available")]
    NoDevice,
    /// Any other initialization failure.
    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

/// A source of decode events.
///
/// `stop` must be safe to call at any time, including after a failed or
/// partial `start`, and must release whatever `start` acquired.
#[async_trait]
pub trait Decoder: Send {
    /// Activates continuous decoding.
    async fn start(&mut self, config: &CameraConfig) -> Result<DecodeStream, CameraError>;
    /// Deactivates decoding and releases resources.
    async fn stop(&mut self);
}
