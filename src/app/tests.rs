use super::*;
use crate::backend::{
    Exercise, ExerciseMapping, GeneratedWorkout, Question, QuestionType, Survey, SurveyOption,
    WorkoutSegment,
};
use crate::config::HiitConfig;
use crate::error::{BackendError, HiitError};
use crate::events::HiitEvent;
use crate::exercise::ExerciseKey;
use crate::testing::{
    replay_source, EchoSynthesizer, FakeDetector, FixedSurveyProvider, RecordingSubmitter,
};
use std::sync::Arc;
use std::time::Duration;

fn create_test_config() -> HiitConfig {
    let mut config = HiitConfig::default();
    config.progression.required_reps = 2;
    config.progression.countdown_seconds = 1;
    config.progression.settle_delay_ms = 100;
    config
}

fn survey() -> Survey {
    Survey {
        id: "s-1".to_string(),
        title: "Check-in".to_string(),
        questions: vec![
            Question {
                id: "q1".to_string(),
                heading: "Coffee or tea?".to_string(),
                kind: QuestionType::MultipleChoice,
                options: Some(vec![
                    SurveyOption {
                        id: "o1".to_string(),
                        text: "Coffee".to_string(),
                    },
                    SurveyOption {
                        id: "o2".to_string(),
                        text: "Tea".to_string(),
                    },
                ]),
            },
            Question {
                id: "q2".to_string(),
                heading: "Anything to add?".to_string(),
                kind: QuestionType::OpenEnded,
                options: None,
            },
        ],
    }
}

fn workout() -> GeneratedWorkout {
    let exercise = |name: &str| Exercise {
        name: name.to_string(),
        sets: Some(1),
        reps: Some(10),
        duration: None,
        equipment: None,
    };
    GeneratedWorkout {
        total_duration: 5,
        segments: vec![WorkoutSegment {
            question_id: "q1".to_string(),
            question: "Coffee or tea?".to_string(),
            question_type: "multiple_choice".to_string(),
            option_exercise_mapping: Some(vec![
                ExerciseMapping {
                    option: "Coffee".to_string(),
                    exercise: exercise("Squats"),
                },
                ExerciseMapping {
                    option: "Tea".to_string(),
                    exercise: exercise("Jumping Jacks"),
                },
            ]),
            is_break: false,
        }],
        summary: "Short session".to_string(),
    }
}

struct Harness {
    orchestrator: HiitOrchestrator,
    detector: Arc<FakeDetector>,
    submitter: Arc<RecordingSubmitter>,
}

fn harness(workout: Option<GeneratedWorkout>) -> Harness {
    let detector = FakeDetector::new();
    let submitter = Arc::new(RecordingSubmitter::default());
    let services = Services {
        surveys: Arc::new(FixedSurveyProvider {
            survey: survey(),
            workout,
        }),
        detector: detector.clone(),
        synthesizer: Arc::new(EchoSynthesizer::default()),
        submitter: submitter.clone(),
        source: replay_source(),
    };
    let mut orchestrator = HiitOrchestrator::with_services(create_test_config(), services);
    orchestrator.set_keyboard_enabled(false);
    Harness {
        orchestrator,
        detector,
        submitter,
    }
}

#[tokio::test]
async fn test_component_state_management() {
    let Harness { orchestrator, .. } = harness(Some(workout()));

    assert!(orchestrator.get_all_component_states().await.is_empty());

    orchestrator
        .set_component_state("capture", ComponentState::Starting)
        .await;
    assert_eq!(
        orchestrator.get_component_state("capture").await,
        Some(ComponentState::Starting)
    );

    let previous = orchestrator
        .set_component_state("capture", ComponentState::Running)
        .await;
    assert_eq!(previous, Some(ComponentState::Starting));
    orchestrator
        .set_component_state("narration", ComponentState::Failed)
        .await;

    let all_states = orchestrator.get_all_component_states().await;
    assert_eq!(all_states.len(), 2);
    assert_eq!(all_states.get("capture"), Some(&ComponentState::Running));
    assert_eq!(all_states.get("narration"), Some(&ComponentState::Failed));
}

#[tokio::test]
async fn test_initialize_registers_enabled_components() {
    let Harness {
        mut orchestrator, ..
    } = harness(Some(workout()));
    orchestrator.set_narration_enabled(false);
    orchestrator.initialize().await.unwrap();

    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.get("capture"), Some(&ComponentState::Stopped));
    assert_eq!(states.get("session"), Some(&ComponentState::Stopped));
    assert!(!states.contains_key("narration"));
    assert!(!states.contains_key("keyboard"));
}

#[tokio::test]
async fn test_prepare_pairs_survey_with_workout() {
    let Harness { orchestrator, .. } = harness(Some(workout()));

    let plan = orchestrator.prepare("s-1").await.unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(
        plan.get(0).unwrap().exercise_for("Tea").unwrap().key,
        Some(ExerciseKey::JumpingJack)
    );
}

#[tokio::test]
async fn test_prepare_without_workout_keeps_survey() {
    let Harness { orchestrator, .. } = harness(None);
    let mut events = orchestrator.event_bus().subscribe();

    let plan = orchestrator.prepare("s-1").await.unwrap();
    assert_eq!(plan.len(), 2);
    assert!(plan.questions.iter().all(|q| q.mapping.is_empty()));

    match events.recv().await.unwrap() {
        HiitEvent::SystemError { component, .. } => assert_eq!(component, "workout"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_prepare_unknown_survey_fails() {
    let Harness { orchestrator, .. } = harness(Some(workout()));

    let err = orchestrator.prepare("missing").await.unwrap_err();
    assert!(matches!(
        err,
        HiitError::Backend(BackendError::Status { status: 404, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_run_completes_survey_and_shuts_down() {
    let Harness {
        mut orchestrator,
        detector,
        submitter,
    } = harness(Some(workout()));
    let bus = orchestrator.event_bus();

    let driver = tokio::spawn(async move {
        // Countdown, then squats pick "Coffee"
        tokio::time::sleep(Duration::from_millis(1500)).await;
        detector.add_reps(ExerciseKey::Squat, 2);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let _ = bus.publish(HiitEvent::SkipRequested);
    });

    let summary = orchestrator.run("s-1").await.unwrap();
    driver.await.unwrap();

    assert!(summary.completed);
    assert_eq!(summary.answers.len(), 1);
    assert_eq!(summary.answers[0].question_id, "q1");
    assert_eq!(summary.answers[0].answer, "Coffee");
    assert_eq!(submitter.submissions.lock().len(), 1);

    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.get("capture"), Some(&ComponentState::Stopped));
    assert_eq!(states.get("session"), Some(&ComponentState::Stopped));
    assert_eq!(states.get("narration"), Some(&ComponentState::Stopped));
    assert!(!orchestrator.capture().unwrap().is_running());
}

#[tokio::test]
async fn test_run_twice_is_rejected() {
    let Harness {
        mut orchestrator, ..
    } = harness(Some(workout()));
    orchestrator.shutdown_sender.take();

    let err = orchestrator.run("s-1").await.unwrap_err();
    assert!(err.to_string().contains("Shutdown sender already taken"));
}

#[test]
fn test_shutdown_reason_types() {
    let signal_reason = ShutdownReason::Signal("SIGTERM".to_string());
    match signal_reason {
        ShutdownReason::Signal(sig) => assert_eq!(sig, "SIGTERM"),
        _ => panic!("Expected Signal shutdown reason"),
    }

    assert_ne!(ShutdownReason::SessionComplete, ShutdownReason::UserRequest);
}
