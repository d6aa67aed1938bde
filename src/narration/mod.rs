//! Spoken narration, one utterance at a time.

mod playback;
mod sequencer;

use crate::error::Result;
use async_trait::async_trait;

#[cfg(feature = "playback")]
pub use playback::CpalSink;
pub use playback::{bitrate_kbps, PacedAudioSink};
pub use sequencer::{NarrationOutcome, NarrationSequencer};

/// Identity of an utterance; the same key is never spoken twice
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NarrationKey {
    /// A question heading on arrival at that question
    Question { question_id: String, index: usize },
    /// A one-off cue such as "get ready"; `run` counts camera starts
    Cue { name: String, run: u64 },
}

/// Plays an encoded audio clip to the end
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: Vec<u8>) -> Result<()>;
}
