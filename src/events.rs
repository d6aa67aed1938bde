use crate::exercise::ExerciseKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur during a survey session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HiitEvent {
    /// The detector returned a new counter snapshot
    CountersUpdated { generation: u64, detected: bool },
    /// Camera connection status changed
    CameraStatusChanged { connected: bool },
    /// Pre-question countdown advanced
    CountdownTick { remaining: u32 },
    /// A question became the active one
    QuestionActivated {
        index: usize,
        question_id: String,
        heading: String,
    },
    /// An answer was recorded for a question
    AnswerSelected {
        question_id: String,
        answer: String,
        auto: bool,
    },
    /// The answer for a question was cleared by a score reset
    AnswerCleared { question_id: String },
    /// Rep progress for the active question changed
    RepProgress {
        index: usize,
        exercise: Option<ExerciseKey>,
        reps: u32,
        required: u32,
    },
    /// The active question reached its rep target (or was answered/skipped)
    QuestionCompleted { index: usize },
    /// All questions done
    SurveyCompleted { answered: usize, total: usize },
    /// User asked to reset the score for the active question
    ResetScoreRequested,
    /// User picked the option at this 0-based position
    OptionChosen { position: usize },
    /// User skipped the active question
    SkipRequested,
    /// User asked to start or stop the camera
    CameraToggleRequested,
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested { reason: String },
}

impl HiitEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            HiitEvent::CountersUpdated {
                generation,
                detected,
            } => format!(
                "Counters updated (generation {}, pose {})",
                generation,
                if *detected { "detected" } else { "not detected" }
            ),
            HiitEvent::CameraStatusChanged { connected } => format!(
                "Camera {}",
                if *connected {
                    "connected"
                } else {
                    "disconnected"
                }
            ),
            HiitEvent::CountdownTick { remaining } => format!("Countdown: {}", remaining),
            HiitEvent::QuestionActivated { index, heading, .. } => {
                format!("Question {}: {}", index + 1, heading)
            }
            HiitEvent::AnswerSelected {
                question_id,
                answer,
                auto,
            } => format!(
                "Answer '{}' selected for {}{}",
                answer,
                question_id,
                if *auto { " (by motion)" } else { "" }
            ),
            HiitEvent::AnswerCleared { question_id } => {
                format!("Answer cleared for {}", question_id)
            }
            HiitEvent::RepProgress {
                exercise,
                reps,
                required,
                ..
            } => match exercise {
                Some(exercise) => format!("{}: {}/{} reps", exercise, reps, required),
                None => "No exercise selected".to_string(),
            },
            HiitEvent::QuestionCompleted { index } => format!("Question {} complete", index + 1),
            HiitEvent::SurveyCompleted { answered, total } => {
                format!("Survey complete ({}/{} answered)", answered, total)
            }
            HiitEvent::ResetScoreRequested => "Score reset requested".to_string(),
            HiitEvent::OptionChosen { position } => format!("Option {} chosen", position + 1),
            HiitEvent::SkipRequested => "Skip requested".to_string(),
            HiitEvent::CameraToggleRequested => "Camera toggle requested".to_string(),
            HiitEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            HiitEvent::ShutdownRequested { reason } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            HiitEvent::CountersUpdated { .. } => "counters_updated",
            HiitEvent::CameraStatusChanged { .. } => "camera_status_changed",
            HiitEvent::CountdownTick { .. } => "countdown_tick",
            HiitEvent::QuestionActivated { .. } => "question_activated",
            HiitEvent::AnswerSelected { .. } => "answer_selected",
            HiitEvent::AnswerCleared { .. } => "answer_cleared",
            HiitEvent::RepProgress { .. } => "rep_progress",
            HiitEvent::QuestionCompleted { .. } => "question_completed",
            HiitEvent::SurveyCompleted { .. } => "survey_completed",
            HiitEvent::ResetScoreRequested => "reset_score_requested",
            HiitEvent::OptionChosen { .. } => "option_chosen",
            HiitEvent::SkipRequested => "skip_requested",
            HiitEvent::CameraToggleRequested => "camera_toggle_requested",
            HiitEvent::SystemError { .. } => "system_error",
            HiitEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event channel closed")]
    ChannelClosed,
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<HiitEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<HiitEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: HiitEvent) -> Result<usize, EventBusError> {
        match &event {
            HiitEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            HiitEvent::CameraStatusChanged { connected } => {
                if *connected {
                    info!("Camera connected");
                } else {
                    warn!("Camera disconnected");
                }
            }
            HiitEvent::ShutdownRequested { reason } => {
                info!("Shutdown requested: {}", reason);
            }
            HiitEvent::CountersUpdated { .. } => {
                // Published ~10 times a second
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&HiitEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &HiitEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<HiitEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<HiitEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event.
    ///
    /// Lag is reported as an error but the receiver stays usable.
    pub async fn recv(&mut self) -> Result<HiitEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<HiitEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
