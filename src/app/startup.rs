use super::{ComponentState, HiitOrchestrator};
use crate::backend::WorkoutPreferences;
use crate::capture::FrameCapture;
use crate::config::NarrationConfig;
use crate::error::Result;
use crate::events::HiitEvent;
use crate::narration::{AudioSink, NarrationSequencer, PacedAudioSink};
use crate::session::WorkoutPlan;
use std::sync::Arc;
use tracing::{error, info, warn};

impl HiitOrchestrator {
    /// Register every component this run will manage
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing survey session components");

        let mut states = self.component_states.lock().await;
        states.insert("capture".to_string(), ComponentState::Stopped);
        states.insert("session".to_string(), ComponentState::Stopped);

        if self.narration_enabled {
            states.insert("narration".to_string(), ComponentState::Stopped);
        }
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Fetch the survey and pair it with a generated workout.
    ///
    /// A missing survey is fatal. Without a workout the survey still runs,
    /// answered by keys only.
    pub async fn prepare(&self, survey_id: &str) -> Result<Arc<WorkoutPlan>> {
        let survey = self
            .services
            .surveys
            .get_survey(survey_id)
            .await
            .map_err(|e| {
                error!("Failed to fetch survey {}: {}", survey_id, e);
                e
            })?;

        let preferences = WorkoutPreferences::from(&self.config.workout);
        let plan = match self
            .services
            .surveys
            .generate_workout(preferences, &survey.questions)
            .await
        {
            Ok(workout) => WorkoutPlan::new(survey, &workout),
            Err(e) => {
                warn!("Workout generation failed, continuing without exercises: {}", e);
                let _ = self.event_bus.publish(HiitEvent::SystemError {
                    component: "workout".to_string(),
                    error: e.to_string(),
                });
                WorkoutPlan::without_workout(survey)
            }
        };

        info!(
            "Survey '{}' ready with {} questions",
            plan.title,
            plan.len()
        );
        Ok(Arc::new(plan))
    }

    /// Build capture and start narration and keyboard input. The camera
    /// itself is opened by the session.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting survey session components");

        if self.capture.is_none() {
            self.capture = Some(Arc::new(FrameCapture::new(
                self.config.capture.clone(),
                Arc::clone(&self.services.source),
                Arc::clone(&self.services.detector),
                Arc::clone(&self.event_bus),
            )));
        }

        if self.narration_enabled && self.narration.is_none() {
            self.set_component_state("narration", ComponentState::Starting)
                .await;
            let sink = audio_sink(&self.config.narration);
            self.narration = Some(Arc::new(NarrationSequencer::spawn(
                Arc::clone(&self.services.synthesizer),
                sink,
            )));
            self.set_component_state("narration", ComponentState::Running)
                .await;
            info!("Narration started");
        }

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting)
                    .await;

                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard handler: {}", e);
                    e
                })?;

                self.set_component_state("keyboard", ComponentState::Running)
                    .await;
            }
        }

        info!("Survey session components started");
        Ok(())
    }
}

#[cfg(feature = "playback")]
fn audio_sink(config: &NarrationConfig) -> Arc<dyn AudioSink> {
    match crate::narration::CpalSink::new() {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!("{}; narration will be silent", e);
            Arc::new(PacedAudioSink::new(&config.output_format))
        }
    }
}

#[cfg(not(feature = "playback"))]
fn audio_sink(config: &NarrationConfig) -> Arc<dyn AudioSink> {
    info!("Built without audio playback; narration will be silent");
    Arc::new(PacedAudioSink::new(&config.output_format))
}
