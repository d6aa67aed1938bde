pub mod app;
pub mod backend;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod exercise;
pub mod frame;
pub mod keyboard_input;
pub mod narration;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{ComponentState, HiitOrchestrator, Services, ShutdownReason};
pub use backend::{
    BackendClient, Detection, Detector, GeneratedWorkout, Question, ResponseSubmitter,
    SpeechSynthesizer, Survey, SurveyProvider,
};
pub use camera::{FrameSource, FrameSourceBuilder, ReplayFrameSource};
pub use capture::{CaptureStats, DetectionState, FrameCapture};
pub use config::HiitConfig;
pub use error::{BackendError, CameraError, HiitError, Result};
pub use events::{EventBus, EventBusError, EventFilter, EventReceiver, HiitEvent};
pub use exercise::{CounterSnapshot, ExerciseKey, Landmark};
pub use frame::{FrameData, FrameFormat};
pub use keyboard_input::KeyboardInputHandler;
pub use narration::{AudioSink, NarrationKey, NarrationOutcome, NarrationSequencer};
pub use session::{
    ProgressionEvent, ProgressionState, QuestionProgression, SessionDriver, SessionHandle,
    SessionSummary, WorkoutPlan,
};
