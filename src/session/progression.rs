//! Question progression as one explicit state machine.
//!
//! `QuestionProgression::handle` consumes one event and returns the effects
//! the caller must carry out (timers, counter resets, narration, submission,
//! bus notifications). It performs no I/O itself.

use super::baseline::RepBaseline;
use super::plan::WorkoutPlan;
use super::resolver::{auto_select, ResolvedExercise};
use crate::backend::AnswerEntry;
use crate::config::{NarrationConfig, ProgressionConfig};
use crate::events::HiitEvent;
use crate::exercise::CounterSnapshot;
use crate::narration::NarrationKey;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionState {
    Idle,
    Countdown { remaining: u32 },
    Active { index: usize },
    /// Transient: waiting out the settle delay before advancing
    Completed { index: usize },
    SurveyComplete,
}

impl fmt::Display for ProgressionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressionState::Idle => write!(f, "idle"),
            ProgressionState::Countdown { remaining } => write!(f, "countdown({})", remaining),
            ProgressionState::Active { index } => write!(f, "active({})", index),
            ProgressionState::Completed { index } => write!(f, "completed({})", index),
            ProgressionState::SurveyComplete => write!(f, "survey complete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Countdown,
    Settle,
}

/// Counter snapshot handed to the state machine
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionUpdate {
    pub generation: u64,
    pub counters: CounterSnapshot,
    /// The remote reset for this generation failed
    pub stale_remote: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressionEvent {
    CameraStarted,
    CameraStopped,
    CountdownTick,
    CountersUpdated(DetectionUpdate),
    SettleElapsed,
    /// Explicit choice of a multiple-choice option
    OptionSelected(String),
    /// Free-text answer for an open-ended question
    AnswerSubmitted(String),
    QuestionSkipped,
    UserReset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Arm the single session timer, replacing any armed one
    StartTimer(TimerKind, Duration),
    CancelTimer,
    /// Reset remote counters; later snapshots carry `generation`
    ResetCounters { generation: u64 },
    Announce { key: NarrationKey, text: String },
    /// Answers in question order
    SubmitResponses(Vec<AnswerEntry>),
    Notify(HiitEvent),
}

/// Idempotency keys of one-shot transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TransitionKey {
    Complete(usize),
    Advance(usize),
    Submit,
}

#[derive(Debug, Clone)]
pub struct ProgressionSettings {
    pub required_reps: u32,
    pub countdown_seconds: u32,
    pub settle_delay: Duration,
    pub ready_cue: bool,
}

impl ProgressionSettings {
    pub fn from_config(progression: &ProgressionConfig, narration: &NarrationConfig) -> Self {
        Self {
            required_reps: progression.required_reps,
            countdown_seconds: progression.countdown_seconds,
            settle_delay: progression.settle_delay(),
            ready_cue: narration.ready_cue,
        }
    }
}

pub struct QuestionProgression {
    plan: Arc<WorkoutPlan>,
    settings: ProgressionSettings,
    state: ProgressionState,
    /// Counter generation the next snapshots must carry
    generation: u64,
    /// Newest counters of the current generation
    counters: CounterSnapshot,
    /// Stale generation already re-baselined
    rebased_generation: Option<u64>,
    baseline: RepBaseline,
    answers: HashMap<String, String>,
    locked: HashSet<String>,
    resolved: Option<ResolvedExercise>,
    current_reps: u32,
    complete: bool,
    /// Question to activate when the countdown finishes
    resume_index: usize,
    ledger: HashSet<TransitionKey>,
    camera_runs: u64,
}

impl QuestionProgression {
    pub fn new(plan: Arc<WorkoutPlan>, settings: ProgressionSettings) -> Self {
        Self {
            plan,
            settings,
            state: ProgressionState::Idle,
            generation: 0,
            counters: CounterSnapshot::zeroed(),
            rebased_generation: None,
            baseline: RepBaseline::new(),
            answers: HashMap::new(),
            locked: HashSet::new(),
            resolved: None,
            current_reps: 0,
            complete: false,
            resume_index: 0,
            ledger: HashSet::new(),
            camera_runs: 0,
        }
    }

    pub fn state(&self) -> ProgressionState {
        self.state
    }

    pub fn plan(&self) -> &WorkoutPlan {
        &self.plan
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn counters(&self) -> &CounterSnapshot {
        &self.counters
    }

    pub fn baseline(&self) -> &RepBaseline {
        &self.baseline
    }

    pub fn answer(&self, question_id: &str) -> Option<&str> {
        self.answers.get(question_id).map(String::as_str)
    }

    pub fn is_locked(&self, question_id: &str) -> bool {
        self.locked.contains(question_id)
    }

    pub fn resolved_exercise(&self) -> Option<&ResolvedExercise> {
        self.resolved.as_ref()
    }

    pub fn current_reps(&self) -> u32 {
        self.current_reps
    }

    pub fn is_exercise_complete(&self) -> bool {
        self.complete
    }

    pub fn is_finished(&self) -> bool {
        self.state == ProgressionState::SurveyComplete
    }

    /// Recorded answers in question order
    pub fn answers_in_order(&self) -> Vec<AnswerEntry> {
        self.plan
            .questions
            .iter()
            .filter_map(|q| {
                self.answers.get(q.id()).map(|answer| AnswerEntry {
                    question_id: q.id().to_string(),
                    answer: answer.clone(),
                })
            })
            .collect()
    }

    /// Apply one event
    pub fn handle(&mut self, event: ProgressionEvent) -> Vec<Effect> {
        trace!("{} <- {:?}", self.state, event);
        let mut effects = Vec::new();

        match event {
            ProgressionEvent::CameraStarted => self.on_camera_started(&mut effects),
            ProgressionEvent::CameraStopped => self.on_camera_stopped(&mut effects),
            ProgressionEvent::CountdownTick => self.on_countdown_tick(&mut effects),
            ProgressionEvent::CountersUpdated(update) => self.on_counters(update, &mut effects),
            ProgressionEvent::SettleElapsed => {
                if let ProgressionState::Completed { index } = self.state {
                    self.advance(index, &mut effects);
                }
            }
            ProgressionEvent::OptionSelected(option) => self.on_option(option, &mut effects),
            ProgressionEvent::AnswerSubmitted(text) => self.on_free_text(text, &mut effects),
            ProgressionEvent::QuestionSkipped => {
                if let ProgressionState::Active { index } = self.state {
                    debug!("Question {} skipped", index);
                    self.complete_question(index, &mut effects);
                }
            }
            ProgressionEvent::UserReset => self.on_user_reset(&mut effects),
        }

        effects
    }

    fn on_camera_started(&mut self, effects: &mut Vec<Effect>) {
        if self.state != ProgressionState::Idle {
            debug!("Camera start ignored in state {}", self.state);
            return;
        }
        if self.plan.is_empty() {
            self.finish(effects);
            return;
        }

        self.camera_runs += 1;
        if self.settings.ready_cue {
            effects.push(Effect::Announce {
                key: NarrationKey::Cue {
                    name: "ready".to_string(),
                    run: self.camera_runs,
                },
                text: "Get ready!".to_string(),
            });
        }

        let remaining = self.settings.countdown_seconds;
        if remaining == 0 {
            self.activate(self.resume_index, effects);
            return;
        }
        self.state = ProgressionState::Countdown { remaining };
        effects.push(Effect::Notify(HiitEvent::CountdownTick { remaining }));
        effects.push(Effect::StartTimer(TimerKind::Countdown, COUNTDOWN_STEP));
    }

    fn on_camera_stopped(&mut self, effects: &mut Vec<Effect>) {
        if let ProgressionState::Completed { index } = self.state {
            // The completion already happened; do not lose it
            self.advance(index, effects);
        }

        match self.state {
            ProgressionState::Countdown { .. } => {}
            ProgressionState::Active { index } => self.resume_index = index,
            _ => return,
        }

        info!("Camera stopped; will resume at question {}", self.resume_index + 1);
        self.state = ProgressionState::Idle;
        effects.push(Effect::CancelTimer);
    }

    fn on_countdown_tick(&mut self, effects: &mut Vec<Effect>) {
        let ProgressionState::Countdown { remaining } = self.state else {
            return;
        };

        if remaining > 1 {
            let remaining = remaining - 1;
            self.state = ProgressionState::Countdown { remaining };
            effects.push(Effect::Notify(HiitEvent::CountdownTick { remaining }));
            effects.push(Effect::StartTimer(TimerKind::Countdown, COUNTDOWN_STEP));
        } else {
            effects.push(Effect::Notify(HiitEvent::CountdownTick { remaining: 0 }));
            self.activate(self.resume_index, effects);
        }
    }

    /// Enter `Active(index)` from the countdown. The baseline is armed from
    /// the newest counters before the index becomes active.
    fn activate(&mut self, index: usize, effects: &mut Vec<Effect>) {
        let counters = self.counters.clone();
        self.baseline.set_baseline(index, &counters);
        self.state = ProgressionState::Active { index };
        self.announce_question(index, effects);
        self.evaluate(index, effects);
    }

    fn announce_question(&self, index: usize, effects: &mut Vec<Effect>) {
        let Some(question) = self.plan.get(index) else {
            return;
        };
        info!("Question {}/{}: {}", index + 1, self.plan.len(), question.heading());
        effects.push(Effect::Notify(HiitEvent::QuestionActivated {
            index,
            question_id: question.id().to_string(),
            heading: question.heading().to_string(),
        }));
        effects.push(Effect::Announce {
            key: NarrationKey::Question {
                question_id: question.id().to_string(),
                index,
            },
            text: question.heading().to_string(),
        });
    }

    fn on_counters(&mut self, update: DetectionUpdate, effects: &mut Vec<Effect>) {
        if update.generation != self.generation {
            trace!(
                "Dropping snapshot of generation {} (current {})",
                update.generation,
                self.generation
            );
            return;
        }
        self.counters = update.counters;

        if update.stale_remote && self.rebased_generation != Some(update.generation) {
            // Remote counters kept running; measure from where they are now
            self.rebased_generation = Some(update.generation);
            let counters = self.counters.clone();
            self.baseline.rebase(&counters);
        }

        if let ProgressionState::Active { index } = self.state {
            self.evaluate(index, effects);
        }
    }

    /// Auto-select, resolve the exercise, recompute reps and check completion
    fn evaluate(&mut self, index: usize, effects: &mut Vec<Effect>) {
        let plan = Arc::clone(&self.plan);
        let Some(question) = plan.get(index) else {
            return;
        };
        let question_id = question.id();

        if question.is_multiple_choice()
            && !self.locked.contains(question_id)
            && !self.answers.contains_key(question_id)
        {
            if let Some(entry) = auto_select(&question.mapping, &self.baseline, &self.counters) {
                info!(
                    "Motion picked '{}' ({}) for question {}",
                    entry.option,
                    entry.exercise.name,
                    index + 1
                );
                self.answers
                    .insert(question_id.to_string(), entry.option.clone());
                self.locked.insert(question_id.to_string());
                effects.push(Effect::Notify(HiitEvent::AnswerSelected {
                    question_id: question_id.to_string(),
                    answer: entry.option.clone(),
                    auto: true,
                }));
            }
        }

        let resolved = self
            .answers
            .get(question_id)
            .and_then(|answer| question.exercise_for(answer));
        let previous_key = self.resolved.as_ref().and_then(|r| r.key);
        let resolved_key = resolved.as_ref().and_then(|r| r.key);
        if resolved_key != previous_key {
            // Progress never carries over between exercises
            self.current_reps = 0;
            self.complete = false;
        }
        self.resolved = resolved;

        let reps = resolved_key
            .map(|key| self.baseline.reps_done(key, &self.counters))
            .unwrap_or(0);
        if reps != self.current_reps {
            self.current_reps = reps;
            effects.push(Effect::Notify(HiitEvent::RepProgress {
                index,
                exercise: resolved_key,
                reps,
                required: self.settings.required_reps,
            }));
        }

        self.complete = resolved_key.is_some() && reps >= self.settings.required_reps;
        if self.complete {
            self.complete_question(index, effects);
        }
    }

    /// `Active(index) -> Completed(index)`, once per index
    fn complete_question(&mut self, index: usize, effects: &mut Vec<Effect>) {
        if !self.ledger.insert(TransitionKey::Complete(index)) {
            return;
        }
        info!("Question {} complete", index + 1);
        self.state = ProgressionState::Completed { index };
        effects.push(Effect::Notify(HiitEvent::QuestionCompleted { index }));
        effects.push(Effect::StartTimer(TimerKind::Settle, self.settings.settle_delay));
    }

    /// `Completed(index) -> Active(index + 1)` or `SurveyComplete`, once per
    /// index
    fn advance(&mut self, index: usize, effects: &mut Vec<Effect>) {
        if !self.ledger.insert(TransitionKey::Advance(index)) {
            return;
        }

        let next = index + 1;
        let Some(question) = self.plan.get(next) else {
            self.finish(effects);
            return;
        };
        if self.baseline.is_armed_for(next) {
            debug!("Question {} already armed; advance skipped", next + 1);
            return;
        }

        // Counters and baseline are zeroed together, before the index flips
        self.generation += 1;
        self.counters = CounterSnapshot::zeroed();
        let zeroed = self.counters.clone();
        self.baseline.set_baseline(next, &zeroed);
        effects.push(Effect::ResetCounters {
            generation: self.generation,
        });

        let question_id = question.id().to_string();
        self.answers.remove(&question_id);
        self.locked.remove(&question_id);
        self.resolved = None;
        self.current_reps = 0;
        self.complete = false;

        self.state = ProgressionState::Active { index: next };
        self.resume_index = next;
        self.announce_question(next, effects);
    }

    fn finish(&mut self, effects: &mut Vec<Effect>) {
        if !self.ledger.insert(TransitionKey::Submit) {
            return;
        }
        let answers = self.answers_in_order();
        info!(
            "Survey complete: {}/{} questions answered",
            answers.len(),
            self.plan.len()
        );
        self.state = ProgressionState::SurveyComplete;
        effects.push(Effect::CancelTimer);
        effects.push(Effect::Notify(HiitEvent::SurveyCompleted {
            answered: answers.len(),
            total: self.plan.len(),
        }));
        effects.push(Effect::SubmitResponses(answers));
    }

    fn on_option(&mut self, option: String, effects: &mut Vec<Effect>) {
        let ProgressionState::Active { index } = self.state else {
            debug!("Option '{}' ignored in state {}", option, self.state);
            return;
        };
        let plan = Arc::clone(&self.plan);
        let Some(question) = plan.get(index) else {
            return;
        };
        if !question.is_multiple_choice() {
            debug!("Question {} takes a free-text answer", index + 1);
            return;
        }
        if !question.question.option_texts().contains(&option.as_str()) {
            debug!("'{}' is not an option of question {}", option, index + 1);
            return;
        }

        self.answers.insert(question.id().to_string(), option.clone());
        effects.push(Effect::Notify(HiitEvent::AnswerSelected {
            question_id: question.id().to_string(),
            answer: option,
            auto: false,
        }));
        self.evaluate(index, effects);
    }

    fn on_free_text(&mut self, text: String, effects: &mut Vec<Effect>) {
        let ProgressionState::Active { index } = self.state else {
            return;
        };
        let plan = Arc::clone(&self.plan);
        let Some(question) = plan.get(index) else {
            return;
        };
        if question.is_multiple_choice() {
            debug!("Question {} needs one of its options", index + 1);
            return;
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        self.answers.insert(question.id().to_string(), text.clone());
        effects.push(Effect::Notify(HiitEvent::AnswerSelected {
            question_id: question.id().to_string(),
            answer: text,
            auto: false,
        }));
        self.complete_question(index, effects);
    }

    /// Counters and baseline are re-zeroed as one step
    fn on_user_reset(&mut self, effects: &mut Vec<Effect>) {
        match self.state {
            ProgressionState::Completed { .. } | ProgressionState::SurveyComplete => {
                debug!("Reset ignored in state {}", self.state);
                return;
            }
            _ => {}
        }

        self.generation += 1;
        self.counters = CounterSnapshot::zeroed();
        let zeroed = self.counters.clone();
        self.baseline.rebase(&zeroed);
        effects.push(Effect::ResetCounters {
            generation: self.generation,
        });

        let ProgressionState::Active { index } = self.state else {
            return;
        };
        let plan = Arc::clone(&self.plan);
        if let Some(question) = plan.get(index) {
            let question_id = question.id().to_string();
            self.locked.remove(&question_id);
            if self.answers.remove(&question_id).is_some() {
                effects.push(Effect::Notify(HiitEvent::AnswerCleared { question_id }));
            }
        }
        self.resolved = None;
        self.complete = false;
        self.current_reps = 0;
        effects.push(Effect::Notify(HiitEvent::RepProgress {
            index,
            exercise: None,
            reps: 0,
            required: self.settings.required_reps,
        }));
        info!("Score reset for question {}", index + 1);
    }
}
