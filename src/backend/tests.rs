use super::*;
use crate::config::{BackendConfig, HiitConfig};
use crate::exercise::ExerciseKey;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Default)]
struct Recorded {
    frame_fields: Vec<(String, usize)>,
    resets: u32,
    workout_body: Option<Value>,
    submit_body: Option<Value>,
    tts_body: Option<Value>,
}

type Shared = Arc<Mutex<Recorded>>;

async fn process_frame(State(state): State<Shared>, mut multipart: Multipart) -> Json<Value> {
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.unwrap();
        state.lock().frame_fields.push((name, bytes.len()));
    }
    Json(json!({
        "detected": true,
        "exercises": {"push_up": 1, "squat": 4, "jumping_jack": 0, "arm_circle": 0, "wall_sit": 2},
        "landmarks": [{"x": 0.5, "y": 0.5, "z": 0.0, "visibility": 0.9}],
        "current_detections": {"squat": true}
    }))
}

async fn reset_counters(State(state): State<Shared>) -> Json<Value> {
    state.lock().resets += 1;
    Json(json!({"message": "Counters reset"}))
}

async fn counters() -> Json<Value> {
    Json(json!({"push_up": 0, "squat": 7, "jumping_jack": 1, "arm_circle": 0}))
}

async fn get_survey(Path(id): Path<String>) -> Result<Json<Value>, (StatusCode, String)> {
    match id.as_str() {
        "s1" | "with space" => Ok(Json(json!({
            "id": id,
            "title": "Morning check-in",
            "questions": [
                {"id": "q1", "heading": "Coffee or tea?", "type": "multiple_choice",
                 "options": [{"id": "o1", "text": "Coffee"}, {"id": "o2", "text": "Tea"}]},
                {"id": "q2", "heading": "Anything else?", "type": "open_ended", "options": null}
            ]
        }))),
        _ => Err((StatusCode::NOT_FOUND, "Survey not found".to_string())),
    }
}

async fn list_surveys() -> Json<Value> {
    Json(json!({
        "surveys": [{"id": "s1", "title": "Morning check-in", "questions": []}],
        "total": 1
    }))
}

async fn generate_workout(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    state.lock().workout_body = Some(body);
    Json(json!({
        "total_duration": 20,
        "summary": "Quick full body",
        "segments": [{
            "question_id": "q1",
            "question": "Coffee or tea?",
            "question_type": "multiple_choice",
            "option_exercise_mapping": [
                {"option": "Coffee", "exercise": {"name": "Squats", "reps": 10}},
                {"option": "Tea", "exercise": {"name": "Push-ups", "reps": 10}}
            ],
            "exercises": [],
            "is_break": false
        }, {
            "question_id": "q2",
            "question": "Anything else?",
            "question_type": "short_answer",
            "is_break": true
        }]
    }))
}

async fn submit(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.lock().submit_body = Some(body);
    Json(json!({"success": true, "response_id": format!("{}-r1", id)}))
}

async fn tts(State(state): State<Shared>, Json(body): Json<Value>) -> Vec<u8> {
    state.lock().tts_body = Some(body);
    vec![0xFF, 0xFB, 0x90, 0x64]
}

async fn spawn_backend() -> (BackendClient, Shared) {
    let state: Shared = Arc::default();
    let app = Router::new()
        .route("/api/process-frame", post(process_frame))
        .route("/api/reset-counters", post(reset_counters))
        .route("/api/counters", get(counters))
        .route("/api/generate-workout", post(generate_workout))
        .route("/api/text-to-speech", post(tts))
        .route("/surveys", get(list_surveys))
        .route("/surveys/:id", get(get_survey))
        .route("/surveys/:id/responses", post(submit))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = HiitConfig::default();
    let backend = BackendConfig {
        base_url: format!("http://{}", addr),
        request_timeout_ms: 2000,
    };
    (BackendClient::new(&backend, &config.narration).unwrap(), state)
}

#[tokio::test]
async fn test_process_frame_sends_file_field() {
    let (client, state) = spawn_backend().await;

    let detection = client
        .process_frame(Arc::new(vec![0xFF, 0xD8, 0xFF, 0xD9]))
        .await
        .unwrap();

    assert!(detection.detected);
    assert_eq!(detection.exercises.get(ExerciseKey::Squat), 4);
    assert_eq!(detection.exercises.iter().count(), 4);
    assert_eq!(detection.landmarks.unwrap().len(), 1);
    assert_eq!(state.lock().frame_fields, vec![("file".to_string(), 4)]);
}

#[test]
fn test_detection_without_flag_keeps_pose() {
    let detection: Detection = serde_json::from_value(json!({
        "exercises": {"squat": 2},
        "landmarks": null
    }))
    .unwrap();
    assert!(detection.detected);

    let mut state = crate::capture::DetectionState::default();
    state.apply(Detection {
        exercises: detection.exercises.clone(),
        detected: true,
        landmarks: Some(vec![crate::exercise::Landmark {
            x: 0.5,
            y: 0.5,
            z: 0.0,
            visibility: 0.9,
        }]),
    });
    state.apply(detection);
    assert!(state.detected);
    assert_eq!(state.landmarks.len(), 1);

    let explicit: Detection =
        serde_json::from_value(json!({"exercises": {}, "detected": false})).unwrap();
    state.apply(explicit);
    assert!(!state.detected);
    assert!(state.landmarks.is_empty());
}

#[tokio::test]
async fn test_reset_and_read_counters() {
    let (client, state) = spawn_backend().await;

    Detector::reset_counters(&client).await.unwrap();
    assert_eq!(state.lock().resets, 1);

    let counters = client.counters().await.unwrap();
    assert_eq!(counters.get(ExerciseKey::Squat), 7);
    assert_eq!(counters.get(ExerciseKey::JumpingJack), 1);
}

#[tokio::test]
async fn test_get_survey_and_not_found() {
    let (client, _) = spawn_backend().await;

    let survey = client.get_survey("s1").await.unwrap();
    assert_eq!(survey.questions.len(), 2);
    assert!(survey.questions[0].is_multiple_choice());
    assert_eq!(survey.questions[0].option_texts(), vec!["Coffee", "Tea"]);
    assert_eq!(survey.questions[1].kind, QuestionType::OpenEnded);
    assert!(survey.questions[1].option_texts().is_empty());

    // Path segments are percent-encoded
    let spaced = client.get_survey("with space").await.unwrap();
    assert_eq!(spaced.id, "with space");

    match client.get_survey("missing").await {
        Err(BackendError::Status { status, endpoint, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(endpoint, "/surveys/missing");
        }
        other => panic!("Expected 404, got {:?}", other.map(|s| s.id)),
    }
}

#[tokio::test]
async fn test_list_surveys() {
    let (client, _) = spawn_backend().await;
    let list = client.list_surveys().await.unwrap();
    assert_eq!(list.total, 1);
    assert_eq!(list.surveys[0].title, "Morning check-in");
}

#[tokio::test]
async fn test_generate_workout_request_shape() {
    let (client, state) = spawn_backend().await;
    let survey = client.get_survey("s1").await.unwrap();
    let preferences = WorkoutPreferences::from(&HiitConfig::default().workout);

    let workout = client
        .generate_workout(preferences, &survey.questions)
        .await
        .unwrap();
    assert_eq!(workout.segments.len(), 2);
    assert!(workout.segments[1].is_break);
    assert!(workout.segments[1].option_exercise_mapping.is_none());

    let body = state.lock().workout_body.clone().unwrap();
    assert_eq!(body["preferences"]["intensity"], "medium");
    assert_eq!(body["preferences"]["body_part"], "full");
    assert_eq!(body["survey_questions"][0]["type"], "multiple_choice");
    assert_eq!(body["survey_questions"][0]["options"], json!(["Coffee", "Tea"]));
    assert_eq!(body["survey_questions"][1]["type"], "short_answer");
    assert!(body["survey_questions"][1].get("options").is_none());
}

#[tokio::test]
async fn test_submit_responses_body() {
    let (client, state) = spawn_backend().await;
    let answers = vec![
        AnswerEntry {
            question_id: "q1".to_string(),
            answer: "Tea".to_string(),
        },
        AnswerEntry {
            question_id: "q2".to_string(),
            answer: "More stretching".to_string(),
        },
    ];

    let outcome = ResponseSubmitter::submit_responses(&client, "s1", answers)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.response_id.as_deref(), Some("s1-r1"));

    let body = state.lock().submit_body.clone().unwrap();
    assert_eq!(body["survey_id"], "s1");
    assert_eq!(body["answers"][0], json!({"question_id": "q1", "answer": "Tea"}));
    assert_eq!(body["answers"][1]["question_id"], "q2");
}

#[tokio::test]
async fn test_text_to_speech() {
    let (client, state) = spawn_backend().await;

    let audio = client.synthesize("Coffee or tea?").await.unwrap();
    assert_eq!(audio, vec![0xFF, 0xFB, 0x90, 0x64]);

    let body = state.lock().tts_body.clone().unwrap();
    assert_eq!(body["text"], "Coffee or tea?");
    assert_eq!(body["voice_id"], "JBFqnCBsd6RMkjVDRZzb");
    assert_eq!(body["model_id"], "eleven_multilingual_v2");
    assert_eq!(body["output_format"], "mp3_44100_128");

    assert!(matches!(
        client.synthesize("   ").await,
        Err(BackendError::InvalidRequest { .. })
    ));
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let config = HiitConfig::default();
    let backend = BackendConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        request_timeout_ms: 500,
    };
    let client = BackendClient::new(&backend, &config.narration).unwrap();
    assert!(matches!(
        client.reset_counters().await,
        Err(BackendError::Transport { .. })
    ));
}
