use super::AudioSink;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Bitrate from an output format such as `mp3_44100_128`
pub fn bitrate_kbps(output_format: &str) -> Option<u32> {
    output_format
        .rsplit('_')
        .next()
        .and_then(|kbps| kbps.parse().ok())
        .filter(|kbps| *kbps > 0)
}

/// Sink without an audio device: holds the queue for as long as the clip
/// would play
pub struct PacedAudioSink {
    kbps: u32,
}

impl PacedAudioSink {
    pub fn new(output_format: &str) -> Self {
        Self {
            kbps: bitrate_kbps(output_format).unwrap_or(128),
        }
    }

    pub fn duration_of(&self, bytes: usize) -> Duration {
        Duration::from_millis(bytes as u64 * 8 / self.kbps as u64)
    }
}

#[async_trait]
impl AudioSink for PacedAudioSink {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        let duration = self.duration_of(audio.len());
        debug!("Pacing {} bytes of audio for {:?}", audio.len(), duration);
        tokio::time::sleep(duration).await;
        Ok(())
    }
}

#[cfg(feature = "playback")]
pub use device::CpalSink;

#[cfg(feature = "playback")]
mod device {
    use super::AudioSink;
    use crate::error::{HiitError, Result};
    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tracing::{debug, error};

    /// Decodes MP3 and plays it on the default output device
    pub struct CpalSink;

    impl CpalSink {
        pub fn new() -> Result<Self> {
            cpal::default_host()
                .default_output_device()
                .ok_or_else(|| HiitError::narration("no audio output device available"))?;
            Ok(Self)
        }
    }

    #[async_trait]
    impl AudioSink for CpalSink {
        async fn play(&self, audio: Vec<u8>) -> Result<()> {
            tokio::task::spawn_blocking(move || play_blocking(&audio))
                .await
                .map_err(|e| HiitError::narration(format!("playback task failed: {}", e)))?
        }
    }

    struct Decoded {
        samples: Vec<f32>,
        sample_rate: u32,
    }

    /// Mono f32 samples; stereo frames are averaged
    fn decode_mp3(data: &[u8]) -> Result<Decoded> {
        let mut decoder = minimp3::Decoder::new(Cursor::new(data));
        let mut samples = Vec::new();
        let mut sample_rate = 0;

        loop {
            match decoder.next_frame() {
                Ok(frame) => {
                    sample_rate = frame.sample_rate as u32;
                    if frame.channels == 2 {
                        samples.extend(frame.data.chunks(2).map(|pair| {
                            let left = f32::from(pair[0]) / 32768.0;
                            let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                            (left + right) / 2.0
                        }));
                    } else {
                        samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                    }
                }
                Err(minimp3::Error::Eof) => break,
                Err(e) => return Err(HiitError::narration(format!("MP3 decode error: {}", e))),
            }
        }

        Ok(Decoded {
            samples,
            sample_rate,
        })
    }

    fn play_blocking(data: &[u8]) -> Result<()> {
        let decoded = decode_mp3(data)?;
        if decoded.samples.is_empty() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| HiitError::narration("no audio output device"))?;
        let supported = device
            .supported_output_configs()
            .map_err(|e| HiitError::narration(e.to_string()))?
            .find(|c| {
                c.min_sample_rate().0 <= decoded.sample_rate
                    && c.max_sample_rate().0 >= decoded.sample_rate
                    && c.sample_format() == cpal::SampleFormat::F32
            })
            .ok_or_else(|| HiitError::narration("no suitable output config found"))?;
        let config = supported
            .with_sample_rate(cpal::SampleRate(decoded.sample_rate))
            .config();
        let channels = config.channels as usize;

        let total = decoded.samples.len();
        let samples = Arc::new(decoded.samples);
        let position = Arc::new(AtomicUsize::new(0));
        let stream_samples = Arc::clone(&samples);
        let stream_position = Arc::clone(&position);

        let stream = device
            .build_output_stream(
                &config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in out.chunks_mut(channels) {
                        let pos = stream_position.fetch_add(1, Ordering::Relaxed);
                        let sample = stream_samples.get(pos).copied().unwrap_or(0.0);
                        frame.iter_mut().for_each(|s| *s = sample);
                    }
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| HiitError::narration(e.to_string()))?;
        stream
            .play()
            .map_err(|e| HiitError::narration(e.to_string()))?;

        let expected = Duration::from_millis(total as u64 * 1000 / decoded.sample_rate as u64);
        let deadline = Instant::now() + expected + Duration::from_millis(500);
        while position.load(Ordering::Relaxed) < total && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        drop(stream);

        debug!("Played {} samples", total);
        Ok(())
    }
}
