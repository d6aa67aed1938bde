use super::{AudioSink, NarrationKey};
use crate::backend::SpeechSynthesizer;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How one narration request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationOutcome {
    Played,
    /// The key had been requested before
    Duplicate,
    /// Synthesis or playback failed; the queue moved on
    Failed(String),
    /// The sequencer shut down before the request ran
    Dropped,
}

enum Request {
    Speak {
        key: NarrationKey,
        text: String,
        done: oneshot::Sender<NarrationOutcome>,
    },
    Barrier(oneshot::Sender<()>),
}

/// Serialises speech: each request is synthesized and played to the end
/// before the next one starts. Every request gets its own completion
/// ticket.
pub struct NarrationSequencer {
    requests: mpsc::UnboundedSender<Request>,
    requested: Mutex<HashSet<NarrationKey>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NarrationSequencer {
    pub fn spawn(synthesizer: Arc<dyn SpeechSynthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        let (requests, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_queue(receiver, synthesizer, sink));

        Self {
            requests,
            requested: Mutex::new(HashSet::new()),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue `text` under `key`. The returned ticket resolves once the
    /// utterance has finished, failed, or was found to be a duplicate.
    pub fn announce(&self, key: NarrationKey, text: impl Into<String>) -> oneshot::Receiver<NarrationOutcome> {
        let (done, ticket) = oneshot::channel();

        if !self.requested.lock().insert(key.clone()) {
            debug!("Narration {:?} already requested", key);
            let _ = done.send(NarrationOutcome::Duplicate);
            return ticket;
        }

        let request = Request::Speak {
            key,
            text: text.into(),
            done,
        };
        if let Err(mpsc::error::SendError(request)) = self.requests.send(request) {
            if let Request::Speak { done, .. } = request {
                let _ = done.send(NarrationOutcome::Dropped);
            }
        }
        ticket
    }

    /// Wait until everything queued so far has been spoken
    pub async fn idle(&self) {
        let (done, wait) = oneshot::channel();
        if self.requests.send(Request::Barrier(done)).is_ok() {
            let _ = wait.await;
        }
    }

    pub fn was_requested(&self, key: &NarrationKey) -> bool {
        self.requested.lock().contains(key)
    }

    /// Stop the worker; tickets of queued requests are cancelled
    pub fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
            info!("Narration stopped");
        }
    }
}

impl Drop for NarrationSequencer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_queue(
    mut receiver: mpsc::UnboundedReceiver<Request>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
) {
    while let Some(request) = receiver.recv().await {
        match request {
            Request::Speak { key, text, done } => {
                let outcome = speak(&*synthesizer, &*sink, &text).await;
                if let NarrationOutcome::Failed(reason) = &outcome {
                    warn!("Narration {:?} skipped: {}", key, reason);
                } else {
                    debug!("Narration {:?} finished", key);
                }
                let _ = done.send(outcome);
            }
            Request::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn speak(synthesizer: &dyn SpeechSynthesizer, sink: &dyn AudioSink, text: &str) -> NarrationOutcome {
    let audio = match synthesizer.synthesize(text).await {
        Ok(audio) => audio,
        Err(e) => return NarrationOutcome::Failed(e.to_string()),
    };
    match sink.play(audio).await {
        Ok(()) => NarrationOutcome::Played,
        Err(e) => NarrationOutcome::Failed(e.to_string()),
    }
}
