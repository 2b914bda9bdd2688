pub mod v4l2;

use crate::common::{ProctorError, Result};
use image::DynamicImage;

pub use v4l2::{list_cameras, CameraInfo, V4l2Camera, V4l2CameraProvider};

/// An opened camera. Dropping it releases the device.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<DynamicImage>;

    fn device_index(&self) -> u32;
}

pub trait CameraProvider: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn FrameSource>>;
}

/// Opens the first device in `indices` that works.
pub fn acquire_camera(provider: &dyn CameraProvider, indices: &[u32]) -> Result<Box<dyn FrameSource>> {
    for &index in indices {
        match provider.open(index) {
            Ok(source) => {
                tracing::info!("Using camera /dev/video{}", index);
                return Ok(source);
            }
            Err(e) => tracing::debug!("Camera {} unavailable: {}", index, e),
        }
    }

    Err(ProctorError::Camera(format!("No camera could be opened (tried {:?})", indices)))
}
