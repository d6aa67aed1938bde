use super::resolver::{match_option, resolve_answer, ResolvedExercise};
use crate::backend::{ExerciseMapping, GeneratedWorkout, Question, Survey};
use tracing::warn;

/// One survey question with the exercises assigned to its options
#[derive(Debug, Clone)]
pub struct QuestionPlan {
    pub question: Question,
    pub mapping: Vec<ExerciseMapping>,
}

impl QuestionPlan {
    pub fn id(&self) -> &str {
        &self.question.id
    }

    pub fn heading(&self) -> &str {
        &self.question.heading
    }

    pub fn is_multiple_choice(&self) -> bool {
        self.question.is_multiple_choice()
    }

    /// Option text at a 0-based display position
    pub fn option_at(&self, position: usize) -> Option<&str> {
        self.question.option_texts().get(position).copied()
    }

    pub fn exercise_for(&self, option: &str) -> Option<ResolvedExercise> {
        resolve_answer(&self.mapping, option)
    }
}

/// The questions of a survey in order, aligned with the generated workout
#[derive(Debug, Clone)]
pub struct WorkoutPlan {
    pub survey_id: String,
    pub title: String,
    pub questions: Vec<QuestionPlan>,
}

impl WorkoutPlan {
    /// Pair every survey question with its workout segment by question id.
    ///
    /// Questions without a segment, break segments and segments without a
    /// mapping get no exercises.
    pub fn new(survey: Survey, workout: &GeneratedWorkout) -> Self {
        let questions = survey
            .questions
            .into_iter()
            .map(|question| {
                let segment = workout
                    .segments
                    .iter()
                    .find(|segment| segment.question_id == question.id);

                let mapping = match segment {
                    None => {
                        if question.is_multiple_choice() {
                            warn!("No workout segment for question {}", question.id);
                        }
                        Vec::new()
                    }
                    Some(segment) if segment.is_break => Vec::new(),
                    Some(segment) => segment.option_exercise_mapping.clone().unwrap_or_default(),
                };

                for option in question.option_texts() {
                    if match_option(&mapping, option).is_none() {
                        warn!(
                            "Option '{}' of question {} has no exercise",
                            option, question.id
                        );
                    }
                }

                QuestionPlan { question, mapping }
            })
            .collect();

        Self {
            survey_id: survey.id,
            title: survey.title,
            questions,
        }
    }

    /// A plan without any exercises, for when workout generation failed
    pub fn without_workout(survey: Survey) -> Self {
        Self::new(survey, &GeneratedWorkout::default())
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QuestionPlan> {
        self.questions.get(index)
    }
}
