//! Survey question progression driven by detected exercise reps.

mod baseline;
mod driver;
mod plan;
mod progression;
mod resolver;

#[cfg(test)]
mod tests;

pub use baseline::RepBaseline;
pub use driver::{SessionDriver, SessionHandle, SessionSummary};
pub use plan::{QuestionPlan, WorkoutPlan};
pub use progression::{
    DetectionUpdate, Effect, ProgressionEvent, ProgressionSettings, ProgressionState,
    QuestionProgression, TimerKind,
};
pub use resolver::{auto_select, match_option, resolve_answer, ResolvedExercise};
