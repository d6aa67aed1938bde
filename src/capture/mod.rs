mod core;
mod overlay;
mod state;

pub use core::{CaptureStats, FrameCapture};
pub use overlay::{render_overlay, skeleton_segments, SKELETON_CONNECTIONS};
pub use state::DetectionState;
