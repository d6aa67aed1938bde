use super::plan::WorkoutPlan;
use super::progression::{
    DetectionUpdate, Effect, ProgressionEvent, ProgressionSettings, ProgressionState,
    QuestionProgression, TimerKind,
};
use crate::backend::{AnswerEntry, ResponseSubmitter, SubmitOutcome};
use crate::capture::FrameCapture;
use crate::error::Result;
use crate::events::{EventBus, EventBusError, EventFilter, EventReceiver, HiitEvent};
use crate::narration::NarrationSequencer;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of one survey session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub survey_id: String,
    pub title: String,
    pub total_questions: usize,
    pub answers: Vec<AnswerEntry>,
    pub completed: bool,
    /// `None` if nothing was submitted or the submission failed
    pub submission: Option<SubmitOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Feeds answers into a running session from outside the event bus
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<ProgressionEvent>,
}

impl SessionHandle {
    pub fn select_option(&self, option: impl Into<String>) -> bool {
        self.send(ProgressionEvent::OptionSelected(option.into()))
    }

    /// Free-text answer for the active open-ended question
    pub fn submit_answer(&self, text: impl Into<String>) -> bool {
        self.send(ProgressionEvent::AnswerSubmitted(text.into()))
    }

    pub fn skip(&self) -> bool {
        self.send(ProgressionEvent::QuestionSkipped)
    }

    pub fn reset_score(&self) -> bool {
        self.send(ProgressionEvent::UserReset)
    }

    fn send(&self, event: ProgressionEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Runs the progression state machine against the live capture loop,
/// narration and backend, and carries out its effects.
pub struct SessionDriver {
    progression: QuestionProgression,
    capture: Arc<FrameCapture>,
    narration: Option<Arc<NarrationSequencer>>,
    submitter: Arc<dyn ResponseSubmitter>,
    event_bus: Arc<EventBus>,
    commands: mpsc::UnboundedReceiver<ProgressionEvent>,
    handle: SessionHandle,
    timer: Option<(TimerKind, Instant)>,
    retry_camera: bool,
    submission: Option<SubmitOutcome>,
}

impl SessionDriver {
    pub fn new(
        plan: Arc<WorkoutPlan>,
        settings: ProgressionSettings,
        capture: Arc<FrameCapture>,
        submitter: Arc<dyn ResponseSubmitter>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (events, commands) = mpsc::unbounded_channel();
        Self {
            progression: QuestionProgression::new(plan, settings),
            capture,
            narration: None,
            submitter,
            event_bus,
            commands,
            handle: SessionHandle { events },
            timer: None,
            retry_camera: false,
            submission: None,
        }
    }

    pub fn with_narration(mut self, narration: Arc<NarrationSequencer>) -> Self {
        self.narration = Some(narration);
        self
    }

    /// Keep the session alive when the camera cannot be opened, waiting for
    /// a camera toggle instead of failing
    pub fn allow_camera_retry(mut self, retry: bool) -> Self {
        self.retry_camera = retry;
        self
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn progression(&self) -> &QuestionProgression {
        &self.progression
    }

    /// Start the camera and drive the survey until it completes, the token
    /// is cancelled or shutdown is requested
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SessionSummary> {
        let mut events = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::EventTypes(vec![
                "counters_updated",
                "camera_toggle_requested",
                "option_chosen",
                "reset_score_requested",
                "skip_requested",
                "shutdown_requested",
            ]),
            "session".to_string(),
        );

        let session_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            "Session {} starting survey '{}' ({} questions)",
            session_id,
            self.progression.plan().title,
            self.progression.plan().len()
        );

        if let Err(e) = self.start_camera().await {
            if !self.retry_camera {
                return Err(e);
            }
            warn!("Camera unavailable; press 'c' to try again");
        }

        while !self.progression.is_finished() {
            let deadline = self.timer.map(|(_, at)| at);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Session cancelled");
                    break;
                }
                _ = timer_elapsed(deadline) => {
                    if let Some((kind, _)) = self.timer.take() {
                        let event = match kind {
                            TimerKind::Countdown => ProgressionEvent::CountdownTick,
                            TimerKind::Settle => ProgressionEvent::SettleElapsed,
                        };
                        self.dispatch(event).await;
                    }
                }
                Some(event) = self.commands.recv() => {
                    self.dispatch(event).await;
                }
                received = events.recv() => match received {
                    Ok(HiitEvent::ShutdownRequested { .. }) => break,
                    Ok(event) => self.on_bus_event(event).await,
                    Err(EventBusError::Lagged { .. }) => {
                        // Notifications were lost; the watch still has the newest counters
                        self.sync_counters().await;
                    }
                    Err(e) => {
                        warn!("Session event stream ended: {}", e);
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.capture.stop().await {
            warn!("Failed to stop capture: {}", e);
        }

        let plan = self.progression.plan();
        Ok(SessionSummary {
            session_id,
            survey_id: plan.survey_id.clone(),
            title: plan.title.clone(),
            total_questions: plan.len(),
            answers: self.progression.answers_in_order(),
            completed: self.progression.is_finished(),
            submission: self.submission,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn on_bus_event(&mut self, event: HiitEvent) {
        match event {
            HiitEvent::CountersUpdated { .. } => self.sync_counters().await,
            HiitEvent::CameraToggleRequested => self.toggle_camera().await,
            HiitEvent::OptionChosen { position } => {
                let ProgressionState::Active { index } = self.progression.state() else {
                    return;
                };
                let option = self
                    .progression
                    .plan()
                    .get(index)
                    .and_then(|q| q.option_at(position))
                    .map(str::to_string);
                match option {
                    Some(option) => self.dispatch(ProgressionEvent::OptionSelected(option)).await,
                    None => debug!("No option {} for question {}", position + 1, index + 1),
                }
            }
            HiitEvent::ResetScoreRequested => self.dispatch(ProgressionEvent::UserReset).await,
            HiitEvent::SkipRequested => self.dispatch(ProgressionEvent::QuestionSkipped).await,
            _ => {}
        }
    }

    /// Read the newest detector state rather than trusting the notification
    async fn sync_counters(&mut self) {
        let state = self.capture.current();
        self.dispatch(ProgressionEvent::CountersUpdated(DetectionUpdate {
            generation: state.generation,
            counters: state.counters,
            stale_remote: state.stale_remote,
        }))
        .await;
    }

    async fn start_camera(&mut self) -> Result<()> {
        match self.capture.start().await {
            Ok(()) => {
                self.dispatch(ProgressionEvent::CameraStarted).await;
                Ok(())
            }
            Err(e) => {
                error!("Camera failed to start: {}", e);
                let _ = self.event_bus.publish(HiitEvent::SystemError {
                    component: "camera".to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn toggle_camera(&mut self) {
        if self.capture.is_running() {
            if let Err(e) = self.capture.stop().await {
                warn!("Failed to stop capture: {}", e);
            }
            self.dispatch(ProgressionEvent::CameraStopped).await;
        } else {
            let _ = self.start_camera().await;
        }
    }

    async fn dispatch(&mut self, event: ProgressionEvent) {
        for effect in self.progression.handle(event) {
            self.execute(effect).await;
        }
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartTimer(kind, delay) => {
                self.timer = Some((kind, Instant::now() + delay));
            }
            Effect::CancelTimer => self.timer = None,
            Effect::ResetCounters { generation } => self.capture.request_reset(generation),
            Effect::Announce { key, text } => {
                if let Some(narration) = &self.narration {
                    // The ticket is not awaited; the queue keeps utterances ordered
                    let _ = narration.announce(key, text);
                }
            }
            Effect::SubmitResponses(answers) => self.submit(answers).await,
            Effect::Notify(event) => {
                let _ = self.event_bus.publish(event);
            }
        }
    }

    /// Best effort: the session is complete whether or not this succeeds
    async fn submit(&mut self, answers: Vec<AnswerEntry>) {
        let survey_id = self.progression.plan().survey_id.clone();
        info!("Submitting {} answers for survey {}", answers.len(), survey_id);

        match self.submitter.submit_responses(&survey_id, answers).await {
            Ok(outcome) => {
                if outcome.success {
                    info!(
                        "Responses recorded{}",
                        outcome
                            .response_id
                            .as_deref()
                            .map(|id| format!(" as {}", id))
                            .unwrap_or_default()
                    );
                } else {
                    warn!(
                        "Backend rejected responses: {}",
                        outcome.message.as_deref().unwrap_or("no reason given")
                    );
                }
                self.submission = Some(outcome);
            }
            Err(e) => error!("Failed to submit responses: {}", e),
        }
    }
}

async fn timer_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
