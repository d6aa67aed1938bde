use crate::error::Result;
use crate::events::{EventBus, HiitEvent};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Map one key press to the intent it stands for
pub fn key_to_event(code: KeyCode) -> Option<HiitEvent> {
    match code {
        KeyCode::Char(c @ '1'..='9') => Some(HiitEvent::OptionChosen {
            position: (c as usize) - ('1' as usize),
        }),
        KeyCode::Char('r') | KeyCode::Char('R') => Some(HiitEvent::ResetScoreRequested),
        KeyCode::Char('s') | KeyCode::Char('S') | KeyCode::Enter => Some(HiitEvent::SkipRequested),
        KeyCode::Char('c') | KeyCode::Char('C') => Some(HiitEvent::CameraToggleRequested),
        KeyCode::Char('q') | KeyCode::Esc => Some(HiitEvent::ShutdownRequested {
            reason: "User requested via keyboard".to_string(),
        }),
        _ => None,
    }
}

/// Terminal key bindings for the survey session
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard: 1-9 choose option, r reset score, s/Enter skip, c camera on/off, q quit");

        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();

        // crossterm polling blocks
        let handle = task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }
            debug!("Raw mode enabled");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }
                        let Some(hiit_event) = key_to_event(key_event.code) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };

                        let quit = matches!(hiit_event, HiitEvent::ShutdownRequested { .. });
                        debug!("Key {:?} -> {}", key_event.code, hiit_event.description());
                        if let Err(e) = event_bus.publish(hiit_event) {
                            warn!("Failed to publish key event: {}", e);
                        }
                        if quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Stop the keyboard input handler and restore the terminal
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_millis(500), handle)
                .await
                .is_err()
            {
                warn!("Keyboard task did not exit in time");
            }
        }

        let _ = disable_raw_mode();
        Ok(())
    }
}
