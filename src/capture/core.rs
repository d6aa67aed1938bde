use super::overlay::{OverlayJob, OverlayWriter};
use super::state::DetectionState;
use crate::backend::Detector;
use crate::camera::FrameSource;
use crate::config::CaptureConfig;
use crate::error::Result;
use crate::events::{EventBus, HiitEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

enum CaptureCommand {
    ResetCounters { generation: u64 },
}

/// Frame submission counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_submitted: u64,
    pub frames_failed: u64,
    pub frames_skipped: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Everything the capture task needs, shared with the owning `FrameCapture`
struct CaptureContext {
    config: CaptureConfig,
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn Detector>,
    event_bus: Arc<EventBus>,
    state: watch::Sender<DetectionState>,
    counters: Counters,
    overlay: Option<mpsc::Sender<OverlayJob>>,
}

/// Samples the camera at a fixed cadence, ships each frame to the detector
/// and publishes the resulting counters.
///
/// The latest detector output is held in a watch channel; `current()` and
/// `subscribe()` always see the newest snapshot. Counter resets are queued
/// to the capture task so they never interleave with an in-flight frame.
pub struct FrameCapture {
    ctx: Arc<CaptureContext>,
    commands: mpsc::UnboundedSender<CaptureCommand>,
    command_rx: Arc<Mutex<mpsc::UnboundedReceiver<CaptureCommand>>>,
    is_running: AtomicBool,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    _overlay_writer: Option<OverlayWriter>,
}

impl FrameCapture {
    pub fn new(
        config: CaptureConfig,
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn Detector>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (state, _) = watch::channel(DetectionState {
            counters: crate::exercise::CounterSnapshot::zeroed(),
            ..DetectionState::default()
        });
        let (commands, command_rx) = mpsc::unbounded_channel();

        let overlay_writer = config
            .overlay_path
            .as_ref()
            .map(|path| OverlayWriter::spawn(path.into(), config.min_landmark_visibility));
        let overlay = overlay_writer.as_ref().map(OverlayWriter::sender);

        Self {
            ctx: Arc::new(CaptureContext {
                config,
                source,
                detector,
                event_bus,
                state,
                counters: Counters::default(),
                overlay,
            }),
            commands,
            command_rx: Arc::new(Mutex::new(command_rx)),
            is_running: AtomicBool::new(false),
            task: Mutex::new(None),
            _overlay_writer: overlay_writer,
        }
    }

    /// Latest detector output
    pub fn current(&self) -> DetectionState {
        self.ctx.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DetectionState> {
        self.ctx.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_submitted: self.ctx.counters.submitted.load(Ordering::Relaxed),
            frames_failed: self.ctx.counters.failed.load(Ordering::Relaxed),
            frames_skipped: self.ctx.counters.skipped.load(Ordering::Relaxed),
        }
    }

    /// Start the camera and the capture loop.
    ///
    /// Camera acquisition failures are returned; nothing is left running.
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Frame capture is already running");
            return Ok(());
        }

        self.ctx.source.start().await?;
        info!(
            "Frame capture started on {} at {:?} per frame",
            self.ctx.source.describe(),
            self.ctx.config.interval()
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(
            Arc::clone(&self.ctx),
            Arc::clone(&self.command_rx),
            cancel.clone(),
        ));
        *task = Some((cancel, handle));
        self.is_running.store(true, Ordering::SeqCst);

        let _ = self
            .ctx
            .event_bus
            .publish(HiitEvent::CameraStatusChanged { connected: true });
        Ok(())
    }

    /// Cancel the next tick, release the camera and forget the pose.
    /// Counters and their generation survive.
    pub async fn stop(&self) -> Result<()> {
        let Some((cancel, handle)) = self.task.lock().await.take() else {
            debug!("Frame capture is not running");
            return Ok(());
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            error!("Capture task ended abnormally: {}", e);
        }
        self.is_running.store(false, Ordering::SeqCst);

        if let Err(e) = self.ctx.source.stop().await {
            warn!("Failed to stop {}: {}", self.ctx.source.describe(), e);
        }
        self.ctx.state.send_modify(DetectionState::clear_pose);

        let _ = self
            .ctx
            .event_bus
            .publish(HiitEvent::CameraStatusChanged { connected: false });
        info!("Frame capture stopped");
        Ok(())
    }

    /// Queue a remote counter reset. Snapshots taken after it carry
    /// `generation`. Runs when the loop next gets a turn; if capture is
    /// stopped, it runs on the next start.
    pub fn request_reset(&self, generation: u64) {
        if self
            .commands
            .send(CaptureCommand::ResetCounters { generation })
            .is_err()
        {
            error!("Capture command channel closed; reset {} dropped", generation);
        }
    }
}

async fn capture_loop(
    ctx: Arc<CaptureContext>,
    command_rx: Arc<Mutex<mpsc::UnboundedReceiver<CaptureCommand>>>,
    cancel: CancellationToken,
) {
    let mut commands = command_rx.lock().await;
    let mut ticker = interval(ctx.config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(command) = commands.recv() => match command {
                CaptureCommand::ResetCounters { generation } => {
                    reset_counters(&ctx, generation).await;
                }
            },
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = capture_once(&ctx, &mut consecutive_failures) => {}
                }
            }
        }
    }

    debug!("Capture loop exited");
}

async fn reset_counters(ctx: &CaptureContext, generation: u64) {
    match ctx.detector.reset_counters().await {
        Ok(()) => {
            ctx.state.send_modify(|state| state.begin_generation(generation));
            debug!("Counters reset, generation {}", generation);
        }
        Err(e) => {
            warn!(
                "Remote counter reset failed ({}); generation {} will re-baseline",
                e, generation
            );
            ctx.state
                .send_modify(|state| state.begin_stale_generation(generation));
        }
    }

    let detected = ctx.state.borrow().detected;
    let _ = ctx.event_bus.publish(HiitEvent::CountersUpdated {
        generation,
        detected,
    });
}

async fn capture_once(ctx: &CaptureContext, consecutive_failures: &mut u32) {
    let Some(frame) = ctx.source.latest_frame() else {
        ctx.counters.skipped.fetch_add(1, Ordering::Relaxed);
        trace!("No frame available yet");
        return;
    };

    let jpeg = match frame.to_jpeg(ctx.config.jpeg_quality) {
        Ok(jpeg) => jpeg,
        Err(e) => {
            ctx.counters.skipped.fetch_add(1, Ordering::Relaxed);
            warn!("Skipping frame {}: {}", frame.id, e);
            return;
        }
    };

    ctx.counters.submitted.fetch_add(1, Ordering::Relaxed);
    match ctx.detector.process_frame(Arc::clone(&jpeg)).await {
        Ok(detection) => {
            if *consecutive_failures > 0 {
                info!(
                    "Detector reachable again after {} failed frames",
                    consecutive_failures
                );
                *consecutive_failures = 0;
            }

            let mut published = (0, false);
            ctx.state.send_modify(|state| {
                state.apply(detection);
                published = (state.generation, state.detected);
            });
            let (generation, detected) = published;
            trace!("Frame {} processed (generation {})", frame.id, generation);

            if let Some(overlay) = &ctx.overlay {
                let landmarks = ctx.state.borrow().landmarks.clone();
                // Drop the frame if the writer is still busy with the last one
                let _ = overlay.try_send(OverlayJob { jpeg, landmarks });
            }

            let _ = ctx.event_bus.publish(HiitEvent::CountersUpdated {
                generation,
                detected,
            });
        }
        Err(e) => {
            ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
            *consecutive_failures += 1;
            if *consecutive_failures == 1 {
                warn!("Frame {} submission failed: {}", frame.id, e);
            } else {
                debug!(
                    "Frame {} submission failed ({} in a row): {}",
                    frame.id, consecutive_failures, e
                );
            }
        }
    }
}
