use crate::error::{HiitError, Result};
use crate::exercise::Landmark;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Pose landmark index pairs drawn as bones: arms, torso, legs, face
pub const SKELETON_CONNECTIONS: [(usize, usize); 16] = [
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (25, 27),
    (24, 26),
    (26, 28),
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
];

const BONE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const JOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const JOINT_RADIUS: i32 = 4;

/// Bone endpoints in pixel coordinates, skipping bones with a hidden end
pub fn skeleton_segments(
    landmarks: &[Landmark],
    width: u32,
    height: u32,
    min_visibility: f32,
) -> Vec<((f32, f32), (f32, f32))> {
    let visible = |index: usize| {
        landmarks
            .get(index)
            .filter(|lm| lm.visibility > min_visibility)
            .map(|lm| (lm.x * width as f32, lm.y * height as f32))
    };

    SKELETON_CONNECTIONS
        .iter()
        .filter_map(|&(a, b)| Some((visible(a)?, visible(b)?)))
        .collect()
}

/// Decode a JPEG frame, draw the skeleton on it and re-encode it
pub fn render_overlay(
    jpeg: &[u8],
    landmarks: &[Landmark],
    min_visibility: f32,
    quality: u8,
) -> Result<Vec<u8>> {
    let mut img: RgbImage = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
        .map_err(|e| {
            HiitError::component("overlay", &format!("Failed to decode frame: {}", e))
        })?
        .to_rgb8();
    let (width, height) = img.dimensions();

    for (start, end) in skeleton_segments(landmarks, width, height, min_visibility) {
        draw_line_segment_mut(&mut img, start, end, BONE_COLOR);
    }
    for lm in landmarks.iter().filter(|lm| lm.visibility > min_visibility) {
        let center = (
            (lm.x * width as f32).round() as i32,
            (lm.y * height as f32).round() as i32,
        );
        draw_filled_circle_mut(&mut img, center, JOINT_RADIUS, JOINT_COLOR);
    }

    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, quality)
        .encode_image(&img)
        .map_err(|e| {
            HiitError::component("overlay", &format!("Failed to encode overlay: {}", e))
        })?;
    Ok(output)
}

pub(crate) struct OverlayJob {
    pub jpeg: Arc<Vec<u8>>,
    pub landmarks: Vec<Landmark>,
}

/// Background writer that keeps the overlay file in sync with the newest
/// frame. Holds at most one pending job so the capture loop never waits.
pub(crate) struct OverlayWriter {
    sender: mpsc::Sender<OverlayJob>,
    task: JoinHandle<()>,
}

impl OverlayWriter {
    pub fn spawn(path: PathBuf, min_visibility: f32) -> Self {
        let (sender, mut receiver) = mpsc::channel::<OverlayJob>(1);

        let task = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let target = path.clone();
                let result = tokio::task::spawn_blocking(move || {
                    let rendered = render_overlay(&job.jpeg, &job.landmarks, min_visibility, 85)?;
                    // Write then rename so readers never see a torn image
                    let tmp = target.with_extension("tmp");
                    std::fs::write(&tmp, rendered)?;
                    std::fs::rename(&tmp, &target)?;
                    Ok::<_, HiitError>(())
                })
                .await;

                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Overlay not written: {}", e),
                    Err(e) => warn!("Overlay task failed: {}", e),
                }
            }
            debug!("Overlay writer stopped");
        });

        Self { sender, task }
    }

    pub fn sender(&self) -> mpsc::Sender<OverlayJob> {
        self.sender.clone()
    }
}

impl Drop for OverlayWriter {
    fn drop(&mut self) {
        self.task.abort();
    }
}
