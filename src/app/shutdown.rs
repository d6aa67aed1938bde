use super::{ComponentState, HiitOrchestrator};
use crate::error::{HiitError, Result};
use std::time::Duration;
use tokio::time::{error::Elapsed, timeout};
use tracing::{error, info, warn};

/// How long queued narration may keep speaking after the session ends
const NARRATION_DRAIN: Duration = Duration::from_secs(10);

impl HiitOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        // Input first, then the camera, then let narration finish
        for component in ["keyboard", "capture", "narration"] {
            if let Err(e) = self.stop_component(component).await {
                error!("Error stopping {}: {}", component, e);
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Stop a specific component
    async fn stop_component(&mut self, component: &str) -> Result<()> {
        if self.get_component_state(component).await.is_none() {
            return Ok(());
        }

        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let result = match component {
            "keyboard" => match &self.keyboard_handler {
                Some(keyboard_handler) => timeout(Duration::from_secs(2), keyboard_handler.stop()).await,
                None => Ok(Ok(())),
            },
            "capture" => match &self.capture {
                Some(capture) => timeout(Duration::from_secs(5), capture.stop()).await,
                None => Ok(Ok(())),
            },
            "narration" => match &self.narration {
                Some(narration) => {
                    if timeout(NARRATION_DRAIN, narration.idle()).await.is_err() {
                        warn!("Narration still speaking after {:?}; cutting it off", NARRATION_DRAIN);
                    }
                    narration.shutdown();
                    Ok(Ok(()))
                }
                None => Ok(Ok(())),
            },
            other => {
                warn!("Unknown component '{}'", other);
                Ok(Ok(()))
            }
        };

        self.record_stop(component, result).await
    }

    async fn record_stop(
        &self,
        component: &str,
        result: std::result::Result<Result<()>, Elapsed>,
    ) -> Result<()> {
        match result {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Error stopping {} component: {}", component, e);
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", component);
                Err(HiitError::system(format!("{} component stop timeout", component)))
            }
        }
    }
}
