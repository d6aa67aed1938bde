mod builder;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod interface;
mod replay;

pub use builder::FrameSourceBuilder;
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstCamera;
pub use interface::{classify_open_error, device_path, probe_device, FrameSource};
pub use replay::ReplayFrameSource;
