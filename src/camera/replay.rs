use super::interface::FrameSource;
use crate::config::{fps_period, CameraConfig};
use crate::error::{CameraError, Result};
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Replays a fixed list of JPEG images as if they came from a camera,
/// looping at the configured frame rate.
pub struct ReplayFrameSource {
    frames: Arc<Vec<Arc<Vec<u8>>>>,
    resolution: (u32, u32),
    fps: u32,
    label: String,
    frame_counter: Arc<AtomicU64>,
    is_running: Arc<AtomicBool>,
    latest: watch::Sender<Option<FrameData>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReplayFrameSource {
    /// Replay JPEG images held in memory
    pub fn from_frames(frames: Vec<Vec<u8>>, resolution: (u32, u32), fps: u32) -> Result<Self> {
        if frames.is_empty() {
            return Err(CameraError::Configuration {
                details: "Replay source needs at least one frame".to_string(),
            }
            .into());
        }
        let count = frames.len();
        Ok(Self::with_label(
            frames.into_iter().map(Arc::new).collect(),
            resolution,
            fps,
            format!("replay of {} in-memory frames", count),
        ))
    }

    /// Replay every `.jpg`/`.jpeg` file of a directory in file name order
    pub fn from_dir<P: AsRef<Path>>(dir: P, config: &CameraConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|_| CameraError::DeviceNotFound {
            device: dir.display().to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_jpeg = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
                .unwrap_or(false);
            if is_jpeg {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(CameraError::Configuration {
                details: format!("No JPEG files found in replay directory {}", dir.display()),
            }
            .into());
        }

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            frames.push(Arc::new(std::fs::read(path)?));
        }
        info!("Loaded {} replay frames from {}", frames.len(), dir.display());

        Ok(Self::with_label(
            frames,
            config.resolution,
            config.fps,
            format!("replay of {}", dir.display()),
        ))
    }

    fn with_label(
        frames: Vec<Arc<Vec<u8>>>,
        resolution: (u32, u32),
        fps: u32,
        label: String,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            frames: Arc::new(frames),
            resolution,
            fps: fps.max(1),
            label,
            frame_counter: Arc::new(AtomicU64::new(0)),
            is_running: Arc::new(AtomicBool::new(false)),
            latest,
            task: Mutex::new(None),
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    fn make_frame(
        frames: &[Arc<Vec<u8>>],
        counter: &AtomicU64,
        resolution: (u32, u32),
    ) -> FrameData {
        let id = counter.fetch_add(1, Ordering::Relaxed);
        let data = Arc::clone(&frames[(id as usize) % frames.len()]);
        FrameData {
            id,
            timestamp: SystemTime::now(),
            data,
            width: resolution.0,
            height: resolution.1,
            format: FrameFormat::Mjpeg,
        }
    }
}

#[async_trait]
impl FrameSource for ReplayFrameSource {
    async fn start(&self) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("Replay source already running");
            return Ok(());
        }

        // First frame is available as soon as start returns
        self.latest.send_replace(Some(Self::make_frame(
            &self.frames,
            &self.frame_counter,
            self.resolution,
        )));

        let frames = Arc::clone(&self.frames);
        let counter = Arc::clone(&self.frame_counter);
        let is_running = Arc::clone(&self.is_running);
        let latest = self.latest.clone();
        let resolution = self.resolution;
        let period = fps_period(self.fps);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            while is_running.load(Ordering::Relaxed) {
                ticker.tick().await;
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }
                let frame = Self::make_frame(&frames, &counter, resolution);
                trace!("Replay frame {}", frame.id);
                latest.send_replace(Some(frame));
            }
        });
        *self.task.lock() = Some(task);

        info!("Started {}", self.label);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.latest.send_replace(None);
        info!("Stopped {}", self.label);
        Ok(())
    }

    fn latest_frame(&self) -> Option<FrameData> {
        self.latest.borrow().clone()
    }

    fn is_capturing(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
