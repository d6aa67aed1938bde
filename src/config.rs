use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HiitConfig {
    pub backend: BackendConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub progression: ProgressionConfig,
    pub narration: NarrationConfig,
    pub workout: WorkoutConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the detection / survey backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second delivered by the device
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Video format (MJPG, YUYV, etc.)
    #[serde(default = "default_camera_format")]
    pub format: String,

    /// Directory of JPEG files replayed instead of a live device
    #[serde(default)]
    pub replay_dir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Frames submitted to the detector per second (upper bound)
    #[serde(default = "default_capture_fps")]
    pub fps: u32,

    /// JPEG quality used when a raw frame has to be encoded
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Landmarks below this visibility are not drawn
    #[serde(default = "default_min_landmark_visibility")]
    pub min_landmark_visibility: f32,

    /// Where to write the skeleton overlay image, if anywhere
    #[serde(default)]
    pub overlay_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProgressionConfig {
    /// Reps of the selected exercise needed to complete a question
    #[serde(default = "default_required_reps")]
    pub required_reps: u32,

    /// Length of the pre-question countdown in seconds
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u32,

    /// Pause between completion and advancing to the next question
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NarrationConfig {
    /// Speak question headings
    #[serde(default = "default_narration_enabled")]
    pub enabled: bool,

    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Announce "get ready" when the countdown starts
    #[serde(default = "default_ready_cue")]
    pub ready_cue: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkoutConfig {
    /// Workout length in minutes
    #[serde(default = "default_workout_time")]
    pub time: u32,

    #[serde(default = "default_intensity")]
    pub intensity: Intensity,

    /// e.g. "upper", "lower", "full", "arms", "legs", "core"
    #[serde(default = "default_body_part")]
    pub body_part: String,

    #[serde(default)]
    pub equipment_available: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl HiitConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("hiitsurvey.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("backend.base_url", default_base_url())?
            .set_default("backend.request_timeout_ms", default_request_timeout_ms())?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.format", default_camera_format())?
            .set_default("capture.fps", default_capture_fps())?
            .set_default("capture.jpeg_quality", default_jpeg_quality() as u64)?
            .set_default(
                "capture.min_landmark_visibility",
                default_min_landmark_visibility() as f64,
            )?
            .set_default("progression.required_reps", default_required_reps())?
            .set_default("progression.countdown_seconds", default_countdown_seconds())?
            .set_default("progression.settle_delay_ms", default_settle_delay_ms())?
            .set_default("narration.enabled", default_narration_enabled())?
            .set_default("narration.voice_id", default_voice_id())?
            .set_default("narration.model_id", default_model_id())?
            .set_default("narration.output_format", default_output_format())?
            .set_default("narration.ready_cue", default_ready_cue())?
            .set_default("workout.time", default_workout_time())?
            .set_default("workout.intensity", "medium")?
            .set_default("workout.body_part", default_body_part())?
            .set_default("workout.equipment_available", Vec::<String>::new())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // HIIT_BACKEND__BASE_URL -> backend.base_url
            .add_source(
                Environment::with_prefix("HIIT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut config: HiitConfig = settings.try_deserialize()?;
        config.backend.base_url = config.backend.base_url.trim_end_matches('/').to_string();

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "Backend base_url must not be empty".to_string(),
            ));
        }

        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(ConfigError::Message(format!(
                "Backend base_url must be an http(s) URL, got '{}'",
                self.backend.base_url
            )));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 || self.camera.fps > 120 {
            return Err(ConfigError::Message(
                "Camera fps must be between 1 and 120".to_string(),
            ));
        }

        if self.capture.fps == 0 || self.capture.fps > 30 {
            return Err(ConfigError::Message(
                "Capture fps must be between 1 and 30".to_string(),
            ));
        }

        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Capture jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.progression.required_reps == 0 {
            return Err(ConfigError::Message(
                "Progression required_reps must be greater than 0".to_string(),
            ));
        }

        if self.progression.settle_delay_ms > 10_000 {
            return Err(ConfigError::Message(
                "Progression settle_delay_ms must not exceed 10000".to_string(),
            ));
        }

        if self.workout.time == 0 {
            return Err(ConfigError::Message(
                "Workout time must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl CameraConfig {
    pub fn frame_period(&self) -> Duration {
        fps_period(self.fps)
    }
}

impl CaptureConfig {
    /// Minimum spacing between two detector submissions
    pub fn interval(&self) -> Duration {
        fps_period(self.fps)
    }
}

/// Tick spacing for a frame rate; never zero, even for absurd rates
pub(crate) fn fps_period(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64).max(Duration::from_millis(1))
}

impl ProgressionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for HiitConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: default_base_url(),
                request_timeout_ms: default_request_timeout_ms(),
            },
            camera: CameraConfig {
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                format: default_camera_format(),
                replay_dir: None,
            },
            capture: CaptureConfig {
                fps: default_capture_fps(),
                jpeg_quality: default_jpeg_quality(),
                min_landmark_visibility: default_min_landmark_visibility(),
                overlay_path: None,
            },
            progression: ProgressionConfig {
                required_reps: default_required_reps(),
                countdown_seconds: default_countdown_seconds(),
                settle_delay_ms: default_settle_delay_ms(),
            },
            narration: NarrationConfig {
                enabled: default_narration_enabled(),
                voice_id: default_voice_id(),
                model_id: default_model_id(),
                output_format: default_output_format(),
                ready_cue: default_ready_cue(),
            },
            workout: WorkoutConfig {
                time: default_workout_time(),
                intensity: default_intensity(),
                body_part: default_body_part(),
                equipment_available: Vec::new(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}
fn default_camera_format() -> String {
    "MJPG".to_string()
}

fn default_capture_fps() -> u32 {
    10
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_min_landmark_visibility() -> f32 {
    0.5
}

fn default_required_reps() -> u32 {
    5
}
fn default_countdown_seconds() -> u32 {
    3
}
fn default_settle_delay_ms() -> u64 {
    800
}

fn default_narration_enabled() -> bool {
    true
}
fn default_voice_id() -> String {
    "JBFqnCBsd6RMkjVDRZzb".to_string()
}
fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}
fn default_output_format() -> String {
    "mp3_44100_128".to_string()
}
fn default_ready_cue() -> bool {
    true
}

fn default_workout_time() -> u32 {
    20
}
fn default_intensity() -> Intensity {
    Intensity::Medium
}
fn default_body_part() -> String {
    "full".to_string()
}

fn default_event_bus_capacity() -> usize {
    256
}
