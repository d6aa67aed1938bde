use crate::error::{CameraError, Result};
use crate::frame::FrameData;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use tracing::debug;

/// EBUSY on Linux; V4L2 returns it when another process holds the device
const DEVICE_BUSY_OS_ERROR: i32 = 16;

/// A camera-like source of frames.
///
/// The source runs on its own once started; consumers sample the most recent
/// frame whenever they need one.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Acquire the device and begin producing frames
    async fn start(&self) -> Result<()>;

    /// Release the device. Clears the latest frame.
    async fn stop(&self) -> Result<()>;

    /// Most recent frame, if the source is running and has produced one
    fn latest_frame(&self) -> Option<FrameData>;

    fn is_capturing(&self) -> bool;

    /// Human-readable identity for logs
    fn describe(&self) -> String;
}

/// `/dev/videoN` for a camera index
pub fn device_path(index: u32) -> String {
    format!("/dev/video{}", index)
}

/// Map an error from opening a video device to an acquisition failure
pub fn classify_open_error(device: &str, err: &io::Error) -> CameraError {
    let device = device.to_string();
    if err.raw_os_error() == Some(DEVICE_BUSY_OS_ERROR) {
        return CameraError::DeviceBusy { device };
    }
    match err.kind() {
        io::ErrorKind::PermissionDenied => CameraError::PermissionDenied { device },
        io::ErrorKind::NotFound => CameraError::DeviceNotFound { device },
        _ => CameraError::Configuration {
            details: format!("Failed to open {}: {}", device, err),
        },
    }
}

/// Check that a video device exists and can be opened read/write
pub fn probe_device(device: &str) -> Result<()> {
    debug!("Probing camera device {}", device);
    if !Path::new(device).exists() {
        return Err(CameraError::DeviceNotFound {
            device: device.to_string(),
        }
        .into());
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .open(device)
        .map(|_| ())
        .map_err(|e| classify_open_error(device, &e).into())
}
