use thiserror::Error;

#[derive(Error, Debug)]
pub enum HiitError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Narration error: {details}")]
    Narration { details: String },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl HiitError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn narration<S: Into<String>>(details: S) -> Self {
        Self::Narration {
            details: details.into(),
        }
    }
}

/// Camera acquisition and streaming failures.
///
/// Acquisition variants render as messages a user can act on.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera access denied for {device}. Grant this user access to the video device (e.g. add it to the 'video' group) and try again.")]
    PermissionDenied { device: String },

    #[error("No camera found at {device}. Check that a webcam is connected or set camera.index / camera.replay_dir.")]
    DeviceNotFound { device: String },

    #[error("Camera {device} is busy. Close other applications using the webcam and try again.")]
    DeviceBusy { device: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Camera stream error: {details}")]
    CaptureStream { details: String },
}

/// Failures talking to the backend service
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{endpoint}: request failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint}: HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint}: invalid response: {details}")]
    InvalidResponse { endpoint: String, details: String },

    #[error("{endpoint}: invalid request: {details}")]
    InvalidRequest { endpoint: String, details: String },
}

impl BackendError {
    pub fn endpoint(&self) -> &str {
        match self {
            BackendError::Transport { endpoint, .. }
            | BackendError::Status { endpoint, .. }
            | BackendError::InvalidResponse { endpoint, .. }
            | BackendError::InvalidRequest { endpoint, .. } => endpoint,
        }
    }
}

pub type Result<T> = std::result::Result<T, HiitError>;
