//! Wire types of the backend API.

use crate::config::{Intensity, NarrationConfig, WorkoutConfig};
use crate::exercise::{CounterSnapshot, Landmark};
use serde::{Deserialize, Serialize};

/// Response of `POST /api/process-frame`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub exercises: CounterSnapshot,
    /// Absent means the detector did not say; only an explicit `false` clears the pose
    #[serde(default = "default_detected")]
    pub detected: bool,
    /// `null` when no pose was found
    #[serde(default)]
    pub landmarks: Option<Vec<Landmark>>,
}

fn default_detected() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    #[serde(alias = "short_answer")]
    OpenEnded,
    /// Any other survey question type; answered like an open-ended one
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub heading: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub options: Option<Vec<SurveyOption>>,
}

impl Question {
    pub fn is_multiple_choice(&self) -> bool {
        self.kind == QuestionType::MultipleChoice
    }

    /// Option texts in display order
    pub fn option_texts(&self) -> Vec<&str> {
        self.options
            .iter()
            .flatten()
            .map(|option| option.text.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub questions: Vec<Question>,
}

/// Response of `GET /surveys`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyList {
    pub surveys: Vec<Survey>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPreferences {
    pub time: u32,
    pub intensity: Intensity,
    pub body_part: String,
    #[serde(default)]
    pub equipment_available: Vec<String>,
}

impl From<&WorkoutConfig> for WorkoutPreferences {
    fn from(config: &WorkoutConfig) -> Self {
        Self {
            time: config.time,
            intensity: config.intensity,
            body_part: config.body_part.clone(),
            equipment_available: config.equipment_available.clone(),
        }
    }
}

/// A survey question as the workout generator wants it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutQuestion {
    pub id: String,
    pub question: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl From<&Question> for WorkoutQuestion {
    fn from(question: &Question) -> Self {
        if question.is_multiple_choice() {
            Self {
                id: question.id.clone(),
                question: question.heading.clone(),
                kind: "multiple_choice".to_string(),
                options: Some(question.option_texts().into_iter().map(String::from).collect()),
            }
        } else {
            Self {
                id: question.id.clone(),
                question: question.heading.clone(),
                kind: "short_answer".to_string(),
                options: None,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateWorkoutRequest {
    pub preferences: WorkoutPreferences,
    pub survey_questions: Vec<WorkoutQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseMapping {
    pub option: String,
    pub exercise: Exercise,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutSegment {
    pub question_id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub question_type: String,
    #[serde(default)]
    pub option_exercise_mapping: Option<Vec<ExerciseMapping>>,
    #[serde(default)]
    pub is_break: bool,
}

/// Response of `POST /api/generate-workout`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedWorkout {
    #[serde(default)]
    pub total_duration: u32,
    pub segments: Vec<WorkoutSegment>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponsesRequest {
    pub survey_id: String,
    pub answers: Vec<AnswerEntry>,
}

/// Response of `POST /surveys/{id}/responses`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
}

/// Voice settings sent with every text-to-speech request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub voice_id: String,
    pub model_id: String,
    pub output_format: String,
}

impl From<&NarrationConfig> for VoiceSettings {
    fn from(config: &NarrationConfig) -> Self {
        Self {
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            output_format: config.output_format.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextToSpeechRequest<'a> {
    pub text: &'a str,
    #[serde(flatten)]
    pub voice: &'a VoiceSettings,
}
