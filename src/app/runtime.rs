use super::{ComponentState, HiitOrchestrator, ShutdownReason};
use crate::error::{HiitError, Result};
use crate::session::{ProgressionSettings, SessionDriver, SessionSummary};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

impl HiitOrchestrator {
    /// Run one survey session end to end with signal handling
    pub async fn run(&mut self, survey_id: &str) -> Result<SessionSummary> {
        self.initialize().await?;
        let plan = self.prepare(survey_id).await?;
        self.start().await?;

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| HiitError::system("Shutdown sender already taken"))?;
        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| HiitError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender).await;

        let capture = self
            .capture
            .clone()
            .ok_or_else(|| HiitError::system("Frame capture was not started"))?;
        let settings =
            ProgressionSettings::from_config(&self.config.progression, &self.config.narration);
        let mut driver = SessionDriver::new(
            plan,
            settings,
            Arc::clone(&capture),
            Arc::clone(&self.services.submitter),
            Arc::clone(&self.event_bus),
        )
        .allow_camera_retry(self.keyboard_enabled);
        if let Some(narration) = &self.narration {
            driver = driver.with_narration(Arc::clone(narration));
        }

        info!("Survey session is running");
        self.set_component_state("capture", ComponentState::Running)
            .await;
        self.set_component_state("session", ComponentState::Running)
            .await;

        let session_token = self.cancellation_token.child_token();
        let mut session = tokio::spawn(driver.run(session_token.clone()));

        let mut signalled = None;
        let joined = tokio::select! {
            joined = &mut session => joined,
            Ok(reason) = &mut shutdown_receiver => {
                info!("Shutdown initiated: {:?}", reason);
                signalled = Some(reason);
                session_token.cancel();
                session.await
            }
        };

        let outcome = joined
            .map_err(|e| HiitError::component("session", format!("session task failed: {}", e)))
            .and_then(|result| result);

        let reason = match (&outcome, signalled) {
            (_, Some(reason)) => reason,
            (Err(e), None) => ShutdownReason::Error(e.to_string()),
            (Ok(summary), None) if summary.completed => ShutdownReason::SessionComplete,
            (Ok(_), None) => ShutdownReason::UserRequest,
        };
        let session_state = match reason {
            ShutdownReason::Error(_) => ComponentState::Failed,
            _ => ComponentState::Stopped,
        };
        self.set_component_state("session", session_state).await;
        info!("Session ended: {:?}", reason);

        let exit_code = self.shutdown().await?;
        if exit_code != 0 {
            warn!("Some components did not stop cleanly");
        }

        outcome
    }

    /// Set up signal handlers for graceful shutdown
    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // SIGTERM (systemd stop)
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // SIGINT (Ctrl+C)
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
