//! Which exercise the active question is waiting for.
//!
//! Everything here is a pure function of the option/exercise mapping, the
//! recorded answer, the counters and the baseline.

use super::baseline::RepBaseline;
use crate::backend::ExerciseMapping;
use crate::exercise::{CounterSnapshot, ExerciseKey};
use tracing::{debug, warn};

/// Exercise assigned to an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExercise {
    /// Mapping entry option text
    pub option: String,
    /// Human exercise name, e.g. "Push-ups"
    pub name: String,
    /// Detector counter, if the exercise has one
    pub key: Option<ExerciseKey>,
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Find the mapping entry for an option text.
///
/// Exact match first, then case-insensitive trimmed match, then substring
/// either way. The first entry that matches at the earliest tier wins.
pub fn match_option<'a>(mapping: &'a [ExerciseMapping], option: &str) -> Option<&'a ExerciseMapping> {
    if let Some(entry) = mapping.iter().find(|entry| entry.option == option) {
        return Some(entry);
    }

    let wanted = normalize(option);
    if wanted.is_empty() {
        return None;
    }
    if let Some(entry) = mapping.iter().find(|entry| normalize(&entry.option) == wanted) {
        return Some(entry);
    }

    mapping.iter().find(|entry| {
        let candidate = normalize(&entry.option);
        !candidate.is_empty() && (candidate.contains(&wanted) || wanted.contains(&candidate))
    })
}

/// Exercise for a recorded answer; `None` if no mapping entry matches
pub fn resolve_answer(mapping: &[ExerciseMapping], answer: &str) -> Option<ResolvedExercise> {
    let Some(entry) = match_option(mapping, answer) else {
        debug!("No exercise mapped to option '{}'", answer);
        return None;
    };

    let key = ExerciseKey::from_exercise_name(&entry.exercise.name);
    if key.is_none() {
        warn!(
            "Exercise '{}' for option '{}' has no detector counter",
            entry.exercise.name, answer
        );
    }

    Some(ResolvedExercise {
        option: entry.option.clone(),
        name: entry.exercise.name.clone(),
        key,
    })
}

/// First mapping entry, in mapping order, whose counter moved past the
/// baseline
pub fn auto_select<'a>(
    mapping: &'a [ExerciseMapping],
    baseline: &RepBaseline,
    counters: &CounterSnapshot,
) -> Option<&'a ExerciseMapping> {
    mapping.iter().find(|entry| {
        ExerciseKey::from_exercise_name(&entry.exercise.name)
            .map(|key| baseline.advanced(key, counters))
            .unwrap_or(false)
    })
}
