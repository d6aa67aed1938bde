use super::types::{ComponentState, ShutdownReason};
use crate::backend::{
    BackendClient, Detector, ResponseSubmitter, SpeechSynthesizer, SurveyProvider,
};
use crate::camera::{FrameSource, FrameSourceBuilder};
use crate::capture::FrameCapture;
use crate::config::HiitConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::keyboard_input::KeyboardInputHandler;
use crate::narration::NarrationSequencer;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The backend and camera seams a session runs against
#[derive(Clone)]
pub struct Services {
    pub surveys: Arc<dyn SurveyProvider>,
    pub detector: Arc<dyn Detector>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub submitter: Arc<dyn ResponseSubmitter>,
    pub source: Arc<dyn FrameSource>,
}

impl Services {
    /// One HTTP client for every backend role, plus the configured camera
    pub fn from_config(config: &HiitConfig) -> Result<Self> {
        let client = Arc::new(BackendClient::new(&config.backend, &config.narration)?);
        let source = FrameSourceBuilder::new()
            .config(config.camera.clone())
            .build()?;

        Ok(Self {
            surveys: client.clone(),
            detector: client.clone(),
            synthesizer: client.clone(),
            submitter: client,
            source,
        })
    }
}

/// Main application coordinator: prepares the survey, starts capture,
/// narration and keyboard input, runs one session and shuts everything down
pub struct HiitOrchestrator {
    pub(super) config: HiitConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) services: Services,

    // Components
    pub(super) capture: Option<Arc<FrameCapture>>,
    pub(super) narration: Option<Arc<NarrationSequencer>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,
    pub(super) narration_enabled: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl HiitOrchestrator {
    /// Create an orchestrator talking to the configured backend and camera
    pub fn new(config: HiitConfig) -> Result<Self> {
        let services = Services::from_config(&config)?;
        Ok(Self::with_services(config, services))
    }

    pub fn with_services(config: HiitConfig, services: Services) -> Self {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let keyboard_handler = Some(KeyboardInputHandler::new(Arc::clone(&event_bus)));
        let narration_enabled = config.narration.enabled;

        Self {
            config,
            event_bus,
            services,
            capture: None,
            narration: None,
            keyboard_handler,
            keyboard_enabled: true,
            narration_enabled,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Enable or disable the keyboard input handler
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn set_narration_enabled(&mut self, enabled: bool) {
        self.narration_enabled = enabled;
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Capture loop, once `start` has built it
    pub fn capture(&self) -> Option<Arc<FrameCapture>> {
        self.capture.clone()
    }

    /// Record where a component is in its lifecycle; returns the state it left
    pub async fn set_component_state(
        &self,
        component: &str,
        state: ComponentState,
    ) -> Option<ComponentState> {
        let previous = self
            .component_states
            .lock()
            .await
            .insert(component.to_string(), state.clone());
        match &previous {
            Some(from) if *from != state => {
                debug!("Component '{}': {:?} -> {:?}", component, from, state)
            }
            Some(_) => {}
            None => debug!("Component '{}' registered as {:?}", component, state),
        }
        previous
    }

    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).cloned()
    }

    /// Snapshot of every registered component
    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().await.clone()
    }
}
