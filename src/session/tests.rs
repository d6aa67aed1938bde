use super::*;
use crate::backend::{
    Exercise, ExerciseMapping, GeneratedWorkout, Question, QuestionType, Survey, SurveyOption,
    WorkoutSegment,
};
use crate::camera::FrameSource;
use crate::capture::FrameCapture;
use crate::config::CaptureConfig;
use crate::error::{CameraError, Result};
use crate::events::{EventBus, HiitEvent};
use crate::exercise::{CounterSnapshot, ExerciseKey};
use crate::frame::FrameData;
use crate::narration::{NarrationKey, NarrationSequencer, PacedAudioSink};
use crate::testing::{replay_source, EchoSynthesizer, FakeDetector, RecordingSubmitter};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn mapping(option: &str, exercise: &str) -> ExerciseMapping {
    ExerciseMapping {
        option: option.to_string(),
        exercise: Exercise {
            name: exercise.to_string(),
            sets: None,
            reps: Some(10),
            duration: None,
            equipment: None,
        },
    }
}

fn multiple_choice(id: &str, heading: &str, options: &[&str]) -> Question {
    Question {
        id: id.to_string(),
        heading: heading.to_string(),
        kind: QuestionType::MultipleChoice,
        options: Some(
            options
                .iter()
                .enumerate()
                .map(|(i, text)| SurveyOption {
                    id: format!("{}-{}", id, i),
                    text: text.to_string(),
                })
                .collect(),
        ),
    }
}

fn open_ended(id: &str, heading: &str) -> Question {
    Question {
        id: id.to_string(),
        heading: heading.to_string(),
        kind: QuestionType::OpenEnded,
        options: None,
    }
}

fn segment(question_id: &str, entries: Vec<ExerciseMapping>) -> WorkoutSegment {
    WorkoutSegment {
        question_id: question_id.to_string(),
        question: String::new(),
        question_type: "multiple_choice".to_string(),
        option_exercise_mapping: Some(entries),
        is_break: false,
    }
}

fn survey() -> Survey {
    Survey {
        id: "s-1".to_string(),
        title: "Morning check-in".to_string(),
        questions: vec![
            multiple_choice("q1", "A or B?", &["A", "B"]),
            multiple_choice("q2", "Slept well?", &["Yes", "No"]),
            open_ended("q3", "Anything else?"),
        ],
    }
}

fn workout() -> GeneratedWorkout {
    GeneratedWorkout {
        total_duration: 10,
        segments: vec![
            segment("q1", vec![mapping("A", "Push-ups"), mapping("B", "Squats")]),
            segment(
                "q2",
                vec![mapping("Yes", "Jumping Jacks"), mapping("No", "Arm Circles")],
            ),
        ],
        summary: String::new(),
    }
}

fn settings() -> ProgressionSettings {
    ProgressionSettings {
        required_reps: 5,
        countdown_seconds: 3,
        settle_delay: Duration::from_millis(800),
        ready_cue: true,
    }
}

fn progression() -> QuestionProgression {
    QuestionProgression::new(Arc::new(WorkoutPlan::new(survey(), &workout())), settings())
}

fn counters(entries: &[(ExerciseKey, u32)]) -> CounterSnapshot {
    entries
        .iter()
        .fold(CounterSnapshot::zeroed(), |snap, (key, count)| snap.with(*key, *count))
}

fn update(generation: u64, entries: &[(ExerciseKey, u32)]) -> ProgressionEvent {
    ProgressionEvent::CountersUpdated(DetectionUpdate {
        generation,
        counters: counters(entries),
        stale_remote: false,
    })
}

fn stale_update(generation: u64, entries: &[(ExerciseKey, u32)]) -> ProgressionEvent {
    ProgressionEvent::CountersUpdated(DetectionUpdate {
        generation,
        counters: counters(entries),
        stale_remote: true,
    })
}

/// Camera on and countdown run out
fn activate(p: &mut QuestionProgression) -> Vec<Effect> {
    let mut effects = p.handle(ProgressionEvent::CameraStarted);
    while matches!(p.state(), ProgressionState::Countdown { .. }) {
        effects.extend(p.handle(ProgressionEvent::CountdownTick));
    }
    effects
}

fn notified(effects: &[Effect]) -> Vec<&HiitEvent> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Notify(event) => Some(event),
            _ => None,
        })
        .collect()
}

/// Drive question 0 to completion with push-ups and advance
fn finish_first_question(p: &mut QuestionProgression) -> Vec<Effect> {
    activate(p);
    p.handle(update(0, &[(ExerciseKey::PushUp, 5)]));
    assert_eq!(p.state(), ProgressionState::Completed { index: 0 });
    p.handle(ProgressionEvent::SettleElapsed)
}

#[test]
fn test_reps_never_negative() {
    let mut baseline = RepBaseline::new();
    baseline.set_baseline(0, &counters(&[(ExerciseKey::Squat, 7)]));

    let lower = counters(&[(ExerciseKey::Squat, 3)]);
    assert_eq!(baseline.reps_done(ExerciseKey::Squat, &lower), 0);
    assert!(!baseline.advanced(ExerciseKey::Squat, &lower));
    assert_eq!(
        baseline.reps_done(ExerciseKey::Squat, &counters(&[(ExerciseKey::Squat, 9)])),
        2
    );
    // A key missing from both reads as zero
    assert_eq!(baseline.reps_done(ExerciseKey::Burpee, &lower), 0);
}

#[test]
fn test_baseline_armed_once_per_index() {
    let mut baseline = RepBaseline::new();
    let first = counters(&[(ExerciseKey::PushUp, 2)]);
    let second = counters(&[(ExerciseKey::PushUp, 6)]);

    assert!(baseline.set_baseline(0, &first));
    assert!(!baseline.set_baseline(0, &second));
    assert_eq!(baseline.values(), &first);
    assert!(baseline.is_armed_for(0));

    assert!(baseline.set_baseline(1, &second));
    assert_eq!(baseline.armed_for(), Some(1));
    assert_eq!(baseline.values(), &second);

    // Rebase keeps the armed index
    baseline.rebase(&first);
    assert_eq!(baseline.armed_for(), Some(1));
    assert_eq!(baseline.values(), &first);
}

#[test]
fn test_rebase_without_armed_index_is_ignored() {
    let mut baseline = RepBaseline::new();
    baseline.rebase(&counters(&[(ExerciseKey::Squat, 4)]));
    assert_eq!(baseline.armed_for(), None);
    assert_eq!(baseline.values().get(ExerciseKey::Squat), 0);
}

#[test]
fn test_option_matching_tiers() {
    let entries = vec![
        mapping("Squats and lunges", "Lunges"),
        mapping("Squats", "Squats"),
        mapping("Yes", "Jumping Jacks"),
    ];

    // Exact match beats the earlier substring match
    assert_eq!(match_option(&entries, "Squats").unwrap().exercise.name, "Squats");
    // Trimmed, case-insensitive
    assert_eq!(match_option(&entries, " squats ").unwrap().exercise.name, "Squats");
    assert_eq!(match_option(&entries, "YES").unwrap().exercise.name, "Jumping Jacks");
    // Substring either way
    assert_eq!(
        match_option(&entries, "lunges").unwrap().exercise.name,
        "Lunges"
    );
    assert_eq!(
        match_option(&entries, "Yes, definitely").unwrap().exercise.name,
        "Jumping Jacks"
    );
    assert!(match_option(&entries, "Maybe").is_none());
    assert!(match_option(&entries, "   ").is_none());
}

#[test]
fn test_resolve_answer_detector_key() {
    let entries = vec![mapping("A", "Push-ups"), mapping("B", "Bicep Curls")];

    let resolved = resolve_answer(&entries, "A").unwrap();
    assert_eq!(resolved.name, "Push-ups");
    assert_eq!(resolved.key, Some(ExerciseKey::PushUp));

    // Mapped but not countable
    let resolved = resolve_answer(&entries, "B").unwrap();
    assert_eq!(resolved.key, None);

    assert!(resolve_answer(&entries, "C").is_none());
}

#[test]
fn test_auto_select_follows_mapping_order() {
    let entries = vec![mapping("A", "Push-ups"), mapping("B", "Squats")];
    let mut baseline = RepBaseline::new();
    baseline.set_baseline(0, &counters(&[(ExerciseKey::Squat, 3)]));

    assert!(auto_select(&entries, &baseline, &counters(&[(ExerciseKey::Squat, 3)])).is_none());

    let moved = counters(&[(ExerciseKey::PushUp, 1), (ExerciseKey::Squat, 4)]);
    assert_eq!(auto_select(&entries, &baseline, &moved).unwrap().option, "A");
}

#[test]
fn test_plan_aligns_segments_by_question_id() {
    let mut generated = workout();
    generated.segments.reverse();
    generated.segments.push(WorkoutSegment {
        question_id: "q3".to_string(),
        question: String::new(),
        question_type: "short_answer".to_string(),
        option_exercise_mapping: Some(vec![mapping("x", "Burpees")]),
        is_break: true,
    });

    let plan = WorkoutPlan::new(survey(), &generated);
    assert_eq!(plan.len(), 3);
    assert_eq!(plan.survey_id, "s-1");
    assert_eq!(plan.get(0).unwrap().mapping.len(), 2);
    assert_eq!(
        plan.get(1).unwrap().exercise_for("No").unwrap().key,
        Some(ExerciseKey::ArmCircle)
    );
    // Break segments carry no exercises
    assert!(plan.get(2).unwrap().mapping.is_empty());
    assert_eq!(plan.get(0).unwrap().option_at(1), Some("B"));
    assert_eq!(plan.get(0).unwrap().option_at(2), None);

    let bare = WorkoutPlan::without_workout(survey());
    assert!(bare.questions.iter().all(|q| q.mapping.is_empty()));
}

#[test]
fn test_countdown_then_first_question_with_baseline() {
    let mut p = progression();
    // Counters left over from before the session
    p.handle(update(0, &[(ExerciseKey::Squat, 7)]));

    let effects = p.handle(ProgressionEvent::CameraStarted);
    assert_eq!(p.state(), ProgressionState::Countdown { remaining: 3 });
    assert!(effects.contains(&Effect::Announce {
        key: NarrationKey::Cue {
            name: "ready".to_string(),
            run: 1,
        },
        text: "Get ready!".to_string(),
    }));
    assert!(effects.contains(&Effect::StartTimer(TimerKind::Countdown, Duration::from_secs(1))));
    assert!(effects.contains(&Effect::Notify(HiitEvent::CountdownTick { remaining: 3 })));

    p.handle(ProgressionEvent::CountdownTick);
    p.handle(ProgressionEvent::CountdownTick);
    assert_eq!(p.state(), ProgressionState::Countdown { remaining: 1 });
    assert_eq!(p.baseline().armed_for(), None);

    let effects = p.handle(ProgressionEvent::CountdownTick);
    assert_eq!(p.state(), ProgressionState::Active { index: 0 });
    assert!(p.baseline().is_armed_for(0));
    assert_eq!(p.baseline().values().get(ExerciseKey::Squat), 7);
    assert!(effects.contains(&Effect::Announce {
        key: NarrationKey::Question {
            question_id: "q1".to_string(),
            index: 0,
        },
        text: "A or B?".to_string(),
    }));
    assert!(notified(&effects).contains(&&HiitEvent::QuestionActivated {
        index: 0,
        question_id: "q1".to_string(),
        heading: "A or B?".to_string(),
    }));
}

#[test]
fn test_zero_second_countdown_activates_immediately() {
    let mut s = settings();
    s.countdown_seconds = 0;
    s.ready_cue = false;
    let mut p = QuestionProgression::new(Arc::new(WorkoutPlan::new(survey(), &workout())), s);

    let effects = p.handle(ProgressionEvent::CameraStarted);
    assert_eq!(p.state(), ProgressionState::Active { index: 0 });
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::Announce { key: NarrationKey::Cue { .. }, .. })));
}

#[test]
fn test_motion_selects_and_locks_answer() {
    let mut p = progression();
    activate(&mut p);

    let effects = p.handle(update(0, &[(ExerciseKey::PushUp, 1)]));
    assert_eq!(p.answer("q1"), Some("A"));
    assert!(p.is_locked("q1"));
    assert!(notified(&effects).contains(&&HiitEvent::AnswerSelected {
        question_id: "q1".to_string(),
        answer: "A".to_string(),
        auto: true,
    }));
    assert_eq!(p.current_reps(), 1);
    assert_eq!(
        p.resolved_exercise().map(|r| r.key),
        Some(Some(ExerciseKey::PushUp))
    );

    // Squats afterwards do not move the locked answer
    p.handle(update(0, &[(ExerciseKey::PushUp, 1), (ExerciseKey::Squat, 3)]));
    assert_eq!(p.answer("q1"), Some("A"));
    assert_eq!(p.current_reps(), 1);
    assert_eq!(p.state(), ProgressionState::Active { index: 0 });
}

#[test]
fn test_required_reps_complete_question_once() {
    let mut p = progression();
    activate(&mut p);

    let effects = p.handle(update(0, &[(ExerciseKey::Squat, 4)]));
    assert_eq!(p.answer("q1"), Some("B"));
    assert!(notified(&effects).contains(&&HiitEvent::RepProgress {
        index: 0,
        exercise: Some(ExerciseKey::Squat),
        reps: 4,
        required: 5,
    }));
    assert_eq!(p.state(), ProgressionState::Active { index: 0 });

    let effects = p.handle(update(0, &[(ExerciseKey::Squat, 5)]));
    assert_eq!(p.state(), ProgressionState::Completed { index: 0 });
    assert!(p.is_exercise_complete());
    assert!(effects.contains(&Effect::StartTimer(
        TimerKind::Settle,
        Duration::from_millis(800)
    )));
    assert!(notified(&effects).contains(&&HiitEvent::QuestionCompleted { index: 0 }));

    // More reps while settling do nothing
    let effects = p.handle(update(0, &[(ExerciseKey::Squat, 9)]));
    assert!(effects.is_empty());
    assert_eq!(p.state(), ProgressionState::Completed { index: 0 });
}

#[test]
fn test_advance_zeroes_counters_and_baseline() {
    let mut p = progression();
    let effects = finish_first_question(&mut p);

    assert_eq!(p.state(), ProgressionState::Active { index: 1 });
    assert!(effects.contains(&Effect::ResetCounters { generation: 1 }));
    assert_eq!(p.generation(), 1);
    assert_eq!(p.counters().total(), 0);
    assert!(p.baseline().is_armed_for(1));
    assert_eq!(p.baseline().values().total(), 0);
    assert_eq!(p.answer("q2"), None);
    assert_eq!(p.current_reps(), 0);
    assert!(!p.is_exercise_complete());
    assert!(effects.contains(&Effect::Announce {
        key: NarrationKey::Question {
            question_id: "q2".to_string(),
            index: 1,
        },
        text: "Slept well?".to_string(),
    }));

    // A second settle for the same index is a no-op
    assert!(p.handle(ProgressionEvent::SettleElapsed).is_empty());
    assert_eq!(p.generation(), 1);
}

#[test]
fn test_snapshots_of_old_generation_are_dropped() {
    let mut p = progression();
    finish_first_question(&mut p);

    // In flight before the reset: would auto-select "Yes" if accepted
    let effects = p.handle(update(0, &[(ExerciseKey::JumpingJack, 6), (ExerciseKey::PushUp, 5)]));
    assert!(effects.is_empty());
    assert_eq!(p.counters().total(), 0);
    assert_eq!(p.answer("q2"), None);

    p.handle(update(1, &[(ExerciseKey::ArmCircle, 1)]));
    assert_eq!(p.answer("q2"), Some("No"));
}

#[test]
fn test_failed_remote_reset_rebaselines_once() {
    let mut p = progression();
    finish_first_question(&mut p);

    // The detector kept its old totals
    let effects = p.handle(stale_update(1, &[(ExerciseKey::PushUp, 5), (ExerciseKey::JumpingJack, 2)]));
    assert_eq!(p.baseline().values().get(ExerciseKey::JumpingJack), 2);
    assert_eq!(p.answer("q2"), None);
    assert!(notified(&effects).is_empty());

    p.handle(stale_update(1, &[(ExerciseKey::PushUp, 5), (ExerciseKey::JumpingJack, 3)]));
    assert_eq!(p.baseline().values().get(ExerciseKey::JumpingJack), 2);
    assert_eq!(p.answer("q2"), Some("Yes"));
    assert_eq!(p.current_reps(), 1);
}

#[test]
fn test_switching_option_restarts_rep_count() {
    let mut p = progression();
    activate(&mut p);

    p.handle(update(0, &[(ExerciseKey::PushUp, 3)]));
    assert_eq!(p.current_reps(), 3);

    p.handle(ProgressionEvent::OptionSelected("B".to_string()));
    assert_eq!(p.answer("q1"), Some("B"));
    assert_eq!(p.current_reps(), 0);
    assert_eq!(
        p.resolved_exercise().and_then(|r| r.key),
        Some(ExerciseKey::Squat)
    );

    // Not an option of this question
    let effects = p.handle(ProgressionEvent::OptionSelected("Maybe".to_string()));
    assert!(effects.is_empty());
    assert_eq!(p.answer("q1"), Some("B"));
}

#[test]
fn test_user_reset_clears_answer_and_counters() {
    let mut p = progression();
    activate(&mut p);
    p.handle(update(0, &[(ExerciseKey::PushUp, 2)]));
    assert!(p.is_locked("q1"));

    let effects = p.handle(ProgressionEvent::UserReset);
    assert!(effects.contains(&Effect::ResetCounters { generation: 1 }));
    assert!(notified(&effects).contains(&&HiitEvent::AnswerCleared {
        question_id: "q1".to_string(),
    }));
    assert_eq!(p.answer("q1"), None);
    assert!(!p.is_locked("q1"));
    assert_eq!(p.current_reps(), 0);
    assert_eq!(p.counters().total(), 0);
    assert_eq!(p.baseline().values().total(), 0);
    assert_eq!(p.state(), ProgressionState::Active { index: 0 });

    // Late snapshot from before the reset
    p.handle(update(0, &[(ExerciseKey::PushUp, 4)]));
    assert_eq!(p.answer("q1"), None);

    p.handle(update(1, &[(ExerciseKey::Squat, 1)]));
    assert_eq!(p.answer("q1"), Some("B"));
}

#[test]
fn test_user_reset_ignored_while_settling() {
    let mut p = progression();
    activate(&mut p);
    p.handle(update(0, &[(ExerciseKey::PushUp, 5)]));

    assert!(p.handle(ProgressionEvent::UserReset).is_empty());
    assert_eq!(p.generation(), 0);
    assert_eq!(p.answer("q1"), Some("A"));
}

#[test]
fn test_camera_stop_resumes_same_question() {
    let mut p = progression();
    finish_first_question(&mut p);
    p.handle(update(1, &[(ExerciseKey::JumpingJack, 2)]));
    let armed = p.baseline().values().clone();

    let effects = p.handle(ProgressionEvent::CameraStopped);
    assert_eq!(p.state(), ProgressionState::Idle);
    assert!(effects.contains(&Effect::CancelTimer));

    let effects = activate(&mut p);
    assert_eq!(p.state(), ProgressionState::Active { index: 1 });
    assert_eq!(p.baseline().values(), &armed);
    assert_eq!(p.answer("q2"), Some("Yes"));
    assert!(effects.contains(&Effect::Announce {
        key: NarrationKey::Cue {
            name: "ready".to_string(),
            run: 2,
        },
        text: "Get ready!".to_string(),
    }));
}

#[test]
fn test_camera_stop_while_settling_keeps_completion() {
    let mut p = progression();
    activate(&mut p);
    p.handle(update(0, &[(ExerciseKey::PushUp, 5)]));

    let effects = p.handle(ProgressionEvent::CameraStopped);
    assert!(effects.contains(&Effect::ResetCounters { generation: 1 }));
    assert_eq!(p.state(), ProgressionState::Idle);

    activate(&mut p);
    assert_eq!(p.state(), ProgressionState::Active { index: 1 });
    assert_eq!(p.answer("q1"), Some("A"));
}

#[test]
fn test_survey_submits_once_in_question_order() {
    let mut p = progression();
    finish_first_question(&mut p);

    p.handle(ProgressionEvent::OptionSelected("No".to_string()));
    p.handle(update(1, &[(ExerciseKey::ArmCircle, 5)]));
    p.handle(ProgressionEvent::SettleElapsed);
    assert_eq!(p.state(), ProgressionState::Active { index: 2 });

    // Open-ended: options do not apply, blank text is ignored
    assert!(p.handle(ProgressionEvent::OptionSelected("A".to_string())).is_empty());
    assert!(p.handle(ProgressionEvent::AnswerSubmitted("  ".to_string())).is_empty());

    p.handle(ProgressionEvent::AnswerSubmitted("  all good ".to_string()));
    assert_eq!(p.state(), ProgressionState::Completed { index: 2 });

    let effects = p.handle(ProgressionEvent::SettleElapsed);
    assert!(p.is_finished());
    let submissions: Vec<_> = effects
        .iter()
        .filter_map(|e| match e {
            Effect::SubmitResponses(answers) => Some(answers.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(submissions.len(), 1);
    let answers: Vec<(&str, &str)> = submissions[0]
        .iter()
        .map(|a| (a.question_id.as_str(), a.answer.as_str()))
        .collect();
    assert_eq!(answers, vec![("q1", "A"), ("q2", "No"), ("q3", "all good")]);
    assert!(notified(&effects).contains(&&HiitEvent::SurveyCompleted {
        answered: 3,
        total: 3,
    }));

    for event in [
        ProgressionEvent::SettleElapsed,
        ProgressionEvent::QuestionSkipped,
        ProgressionEvent::CameraStopped,
        ProgressionEvent::UserReset,
        ProgressionEvent::CameraStarted,
    ] {
        assert!(p.handle(event).is_empty());
    }
}

#[test]
fn test_skip_completes_without_answer() {
    let mut p = progression();
    activate(&mut p);

    p.handle(ProgressionEvent::QuestionSkipped);
    assert_eq!(p.state(), ProgressionState::Completed { index: 0 });
    p.handle(ProgressionEvent::SettleElapsed);
    assert_eq!(p.state(), ProgressionState::Active { index: 1 });
    assert_eq!(p.answer("q1"), None);
}

#[test]
fn test_empty_survey_completes_on_camera_start() {
    let empty = Survey {
        id: "empty".to_string(),
        title: String::new(),
        questions: Vec::new(),
    };
    let mut p = QuestionProgression::new(Arc::new(WorkoutPlan::without_workout(empty)), settings());

    let effects = p.handle(ProgressionEvent::CameraStarted);
    assert!(p.is_finished());
    assert!(effects.contains(&Effect::SubmitResponses(Vec::new())));
}

// Driver

fn capture_config() -> CaptureConfig {
    CaptureConfig {
        fps: 10,
        jpeg_quality: 80,
        min_landmark_visibility: 0.5,
        overlay_path: None,
    }
}

fn driver_settings() -> ProgressionSettings {
    ProgressionSettings {
        required_reps: 2,
        countdown_seconds: 1,
        settle_delay: Duration::from_millis(100),
        ready_cue: true,
    }
}

fn two_question_plan() -> Arc<WorkoutPlan> {
    let survey = Survey {
        id: "s-2".to_string(),
        title: "Quick".to_string(),
        questions: vec![
            multiple_choice("q1", "A or B?", &["A", "B"]),
            open_ended("q2", "How do you feel?"),
        ],
    };
    let generated = GeneratedWorkout {
        total_duration: 5,
        segments: vec![segment(
            "q1",
            vec![mapping("A", "Push-ups"), mapping("B", "Squats")],
        )],
        summary: String::new(),
    };
    Arc::new(WorkoutPlan::new(survey, &generated))
}

struct Fixture {
    bus: Arc<EventBus>,
    detector: Arc<FakeDetector>,
    submitter: Arc<RecordingSubmitter>,
    driver: SessionDriver,
}

fn fixture() -> Fixture {
    let bus = Arc::new(EventBus::new(64));
    let detector = FakeDetector::new();
    let capture = Arc::new(FrameCapture::new(
        capture_config(),
        replay_source(),
        detector.clone(),
        Arc::clone(&bus),
    ));
    let submitter = Arc::new(RecordingSubmitter::default());
    let driver = SessionDriver::new(
        two_question_plan(),
        driver_settings(),
        capture,
        submitter.clone(),
        Arc::clone(&bus),
    );
    Fixture {
        bus,
        detector,
        submitter,
        driver,
    }
}

#[tokio::test(start_paused = true)]
async fn test_driver_runs_survey_to_submission() {
    let Fixture {
        bus: _bus,
        detector,
        submitter,
        driver,
    } = fixture();
    let narration = Arc::new(NarrationSequencer::spawn(
        Arc::new(EchoSynthesizer::default()),
        Arc::new(PacedAudioSink::new("mp3_44100_128")),
    ));
    let driver = driver.with_narration(Arc::clone(&narration));
    let handle = driver.handle();
    let session = tokio::spawn(driver.run(CancellationToken::new()));

    // Countdown
    tokio::time::sleep(Duration::from_millis(1500)).await;
    detector.add_reps(ExerciseKey::PushUp, 2);

    // Picked up, completed, settled, advanced
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(detector.resets() >= 1);
    assert!(handle.submit_answer("energized"));

    let summary = tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(summary.completed);
    assert_eq!(summary.survey_id, "s-2");
    assert_eq!(summary.total_questions, 2);
    let answers: Vec<(&str, &str)> = summary
        .answers
        .iter()
        .map(|a| (a.question_id.as_str(), a.answer.as_str()))
        .collect();
    assert_eq!(answers, vec![("q1", "A"), ("q2", "energized")]);
    assert_eq!(summary.submission.map(|s| s.success), Some(true));
    assert!(summary.finished_at >= summary.started_at);
    assert!(!summary.session_id.is_empty());

    let submissions = submitter.submissions.lock();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].0, "s-2");

    assert!(narration.was_requested(&NarrationKey::Question {
        question_id: "q2".to_string(),
        index: 1,
    }));
}

#[tokio::test(start_paused = true)]
async fn test_driver_follows_bus_commands() {
    let Fixture {
        bus,
        detector,
        submitter,
        driver,
    } = fixture();
    let session = tokio::spawn(driver.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    bus.publish(HiitEvent::OptionChosen { position: 1 }).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    detector.add_reps(ExerciseKey::Squat, 2);
    tokio::time::sleep(Duration::from_secs(1)).await;

    bus.publish(HiitEvent::SkipRequested).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(summary.completed);
    assert_eq!(summary.answers.len(), 1);
    assert_eq!(summary.answers[0].answer, "B");
    assert_eq!(submitter.submissions.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_driver_submission_failure_still_completes() {
    let Fixture {
        bus: _bus,
        submitter,
        driver,
        ..
    } = fixture();
    submitter.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let handle = driver.handle();
    let session = tokio::spawn(driver.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(handle.skip());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(handle.skip());

    let summary = session.await.unwrap().unwrap();
    assert!(summary.completed);
    assert!(summary.answers.is_empty());
    assert!(summary.submission.is_none());
    assert_eq!(submitter.submissions.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_driver_stops_on_shutdown_request() {
    let Fixture {
        bus,
        submitter,
        driver,
        ..
    } = fixture();
    let session = tokio::spawn(driver.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    bus.publish(HiitEvent::ShutdownRequested {
        reason: "user quit".to_string(),
    })
    .unwrap();

    let summary = session.await.unwrap().unwrap();
    assert!(!summary.completed);
    assert!(submitter.submissions.lock().is_empty());
}

struct BusyCamera;

#[async_trait]
impl FrameSource for BusyCamera {
    async fn start(&self) -> Result<()> {
        Err(CameraError::DeviceBusy {
            device: "/dev/video0".to_string(),
        }
        .into())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn latest_frame(&self) -> Option<FrameData> {
        None
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        "busy camera".to_string()
    }
}

#[tokio::test]
async fn test_driver_reports_camera_failure() {
    let bus = Arc::new(EventBus::new(16));
    let mut events = bus.subscribe();
    let capture = Arc::new(FrameCapture::new(
        capture_config(),
        Arc::new(BusyCamera),
        FakeDetector::new(),
        Arc::clone(&bus),
    ));
    let driver = SessionDriver::new(
        two_question_plan(),
        driver_settings(),
        capture,
        Arc::new(RecordingSubmitter::default()),
        Arc::clone(&bus),
    );

    let err = driver.run(CancellationToken::new()).await.unwrap_err();
    assert!(err.to_string().contains("busy"));

    match events.recv().await.unwrap() {
        HiitEvent::SystemError { component, error } => {
            assert_eq!(component, "camera");
            assert!(error.contains("Close other applications"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}
