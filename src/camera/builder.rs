use super::interface::FrameSource;
use super::replay::ReplayFrameSource;
use crate::config::CameraConfig;
use crate::error::{HiitError, Result};
use std::sync::Arc;

/// Picks the frame source a camera configuration describes
pub struct FrameSourceBuilder {
    config: Option<CameraConfig>,
}

impl FrameSourceBuilder {
    pub fn new() -> Self {
        Self { config: None }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// A replay directory wins over a live device
    pub fn build(self) -> Result<Arc<dyn FrameSource>> {
        let config = self
            .config
            .ok_or_else(|| HiitError::system("Camera configuration must be specified"))?;

        if let Some(dir) = &config.replay_dir {
            return Ok(Arc::new(ReplayFrameSource::from_dir(dir, &config)?));
        }

        Self::live(config)
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    fn live(config: CameraConfig) -> Result<Arc<dyn FrameSource>> {
        Ok(Arc::new(super::gst::GstCamera::new(config)?))
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    fn live(config: CameraConfig) -> Result<Arc<dyn FrameSource>> {
        Err(crate::error::CameraError::Configuration {
            details: format!(
                "Live capture from {} needs the 'camera' feature on Linux; set camera.replay_dir to replay images instead",
                super::interface::device_path(config.index)
            ),
        }
        .into())
    }
}

impl Default for FrameSourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
