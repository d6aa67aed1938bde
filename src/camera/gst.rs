use super::interface::{device_path, probe_device, FrameSource};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(5);

/// V4L2 webcam read through a GStreamer MJPEG pipeline
pub struct GstCamera {
    config: CameraConfig,
    device: String,
    frame_counter: Arc<AtomicU64>,
    is_running: Arc<AtomicBool>,
    latest: watch::Sender<Option<FrameData>>,
    pipeline: Mutex<Option<Pipeline>>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl GstCamera {
    pub fn new(config: CameraConfig) -> Result<Self> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let (latest, _) = watch::channel(None);
        Ok(Self {
            device: device_path(config.index),
            config,
            frame_counter: Arc::new(AtomicU64::new(0)),
            is_running: Arc::new(AtomicBool::new(false)),
            latest,
            pipeline: Mutex::new(None),
            watchdog: Mutex::new(None),
        })
    }

    fn pipeline_description(&self) -> String {
        let (width, height) = self.config.resolution;
        format!(
            "v4l2src device={} io-mode=mmap do-timestamp=true ! \
             image/jpeg,width={},height={},framerate={}/1 ! \
             queue max-size-buffers=2 leaky=downstream ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            self.device, width, height, self.config.fps
        )
    }

    fn build_pipeline(&self) -> Result<Pipeline> {
        let description = self.pipeline_description();
        info!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink named 'sink'".to_string(),
            })?;

        let latest = self.latest.clone();
        let counter = Arc::clone(&self.frame_counter);
        let fallback = self.config.resolution;
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    match frame_from_sample(&sample, &counter, fallback) {
                        Ok(frame) => {
                            trace!("Captured MJPEG frame {} ({} bytes)", frame.id, frame.data.len());
                            latest.send_replace(Some(frame));
                        }
                        Err(e) => warn!("Dropping camera sample: {}", e),
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        Ok(pipeline)
    }
}

fn frame_from_sample(
    sample: &gstreamer::Sample,
    counter: &AtomicU64,
    fallback: (u32, u32),
) -> std::result::Result<FrameData, CameraError> {
    let buffer = sample.buffer().ok_or_else(|| CameraError::CaptureStream {
        details: "No buffer in sample".to_string(),
    })?;

    // image/jpeg caps carry width/height but are not raw video caps
    let (width, height) = sample
        .caps()
        .and_then(|caps| caps.structure(0))
        .and_then(|s| Some((s.get::<i32>("width").ok()?, s.get::<i32>("height").ok()?)))
        .map(|(w, h)| (w as u32, h as u32))
        .unwrap_or(fallback);

    let map = buffer
        .map_readable()
        .map_err(|e| CameraError::CaptureStream {
            details: format!("Failed to map buffer: {}", e),
        })?;

    Ok(FrameData::new(
        counter.fetch_add(1, Ordering::Relaxed),
        SystemTime::now(),
        map.as_slice().to_vec(),
        width,
        height,
        FrameFormat::Mjpeg,
    ))
}

#[async_trait]
impl FrameSource for GstCamera {
    async fn start(&self) -> Result<()> {
        if self.is_running.load(Ordering::SeqCst) {
            warn!("Camera {} is already capturing", self.device);
            return Ok(());
        }

        // Surface permission / missing / busy before GStreamer swallows the cause
        probe_device(&self.device)?;

        let pipeline = self.build_pipeline()?;
        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::CaptureStream {
                details: format!("Failed to start pipeline for {}: {}", self.device, e),
            })?;
        self.is_running.store(true, Ordering::SeqCst);
        info!("Camera {} streaming", self.device);

        let is_running = Arc::clone(&self.is_running);
        let mut frames = self.latest.subscribe();
        let watched = pipeline.clone();
        let device = self.device.clone();
        let watchdog = tokio::spawn(async move {
            while is_running.load(Ordering::Relaxed) {
                match tokio::time::timeout(WATCHDOG_TIMEOUT, frames.changed()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => break,
                    Err(_) => {
                        if !is_running.load(Ordering::Relaxed) {
                            break;
                        }
                        warn!(
                            "No frames from {} for {:?}; restarting pipeline",
                            device, WATCHDOG_TIMEOUT
                        );
                        let _ = watched.set_state(gstreamer::State::Null);
                        if let Err(e) = watched.set_state(gstreamer::State::Playing) {
                            error!("Failed to restart pipeline for {}: {}", device, e);
                        }
                    }
                }
            }
        });

        *self.pipeline.lock() = Some(pipeline);
        *self.watchdog.lock() = Some(watchdog);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(watchdog) = self.watchdog.lock().take() {
            watchdog.abort();
        }
        if let Some(pipeline) = self.pipeline.lock().take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop pipeline for {}: {}", self.device, e);
            }
        }
        self.latest.send_replace(None);

        info!("Camera {} stopped", self.device);
        Ok(())
    }

    fn latest_frame(&self) -> Option<FrameData> {
        self.latest.borrow().clone()
    }

    fn is_capturing(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    fn describe(&self) -> String {
        format!(
            "{} ({}x{} @ {}fps)",
            self.device, self.config.resolution.0, self.config.resolution.1, self.config.fps
        )
    }
}
