use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct InputTraceConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub pointer: PointerConfig,
    #[serde(default)]
    pub keyboard: KeyboardConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
    /// One entry per webcam stream; empty disables webcam capture.
    #[serde(default)]
    pub webcam: Vec<WebcamConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Base directory; each session creates a timestamped subdirectory.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Write a metadata.json manifest into the session directory
    #[serde(default = "default_save_metadata")]
    pub save_metadata: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PointerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Minimum seconds between two emitted moves; absent records every
    /// positional change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_time: Option<f64>,

    /// Fetch buffer bound in records; absent keeps everything until the
    /// next fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<usize>,

    /// Input device path for the native backend (e.g. /dev/input/event4).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KeyboardConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Fetch buffer bound in records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<usize>,

    /// Input device path for the native backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScreenConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Frames per second
    #[serde(default = "default_screen_fps")]
    pub fps: f64,

    /// Screen resolution (width, height)
    #[serde(default = "default_screen_resolution")]
    pub resolution: (u32, u32),

    /// Half-extent of the pointer-following capture window (rx, ry).
    /// Larger than the screen means full-screen capture.
    #[serde(default = "default_capture_radius")]
    pub capture_radius: (u32, u32),

    /// Integer downscale factor applied before frames leave the recorder
    #[serde(default = "default_downscale_factor")]
    pub downscale_factor: u32,

    /// Fetch buffer bound in frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<usize>,

    /// Also append raw RGB24 pixel buffers to <stream>.raw
    #[serde(default)]
    pub write_raw_frames: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebcamConfig {
    /// Camera device index (e.g. 0 for /dev/video0)
    #[serde(default)]
    pub index: u32,

    /// Frames per second
    #[serde(default = "default_webcam_fps")]
    pub fps: f64,

    /// Native frame size (width, height)
    #[serde(default = "default_webcam_resolution")]
    pub resolution: (u32, u32),

    /// Fetch buffer bound in frames
    #[serde(
        default = "default_webcam_memory_limit",
        skip_serializing_if = "Option::is_none"
    )]
    pub memory_limit: Option<usize>,

    /// Also append raw RGB24 pixel buffers to <stream>.raw
    #[serde(default)]
    pub write_raw_frames: bool,
}

impl InputTraceConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("inputtrace.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with INPUTTRACE_ prefix
            .add_source(Environment::with_prefix("INPUTTRACE").separator("_"))
            .build()?;

        let config: InputTraceConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.data_dir.is_empty() {
            return Err(ConfigError::Message(
                "Session data_dir must not be empty".to_string(),
            ));
        }

        if let Some(delta_time) = self.pointer.delta_time {
            if delta_time < 0.0 {
                return Err(ConfigError::Message(
                    "Pointer delta_time must not be negative".to_string(),
                ));
            }
        }

        if self.screen.enabled {
            if self.screen.fps <= 0.0 {
                return Err(ConfigError::Message(
                    "Screen fps must be greater than 0".to_string(),
                ));
            }
            if self.screen.resolution.0 == 0 || self.screen.resolution.1 == 0 {
                return Err(ConfigError::Message(
                    "Screen resolution must be greater than 0".to_string(),
                ));
            }
            if self.screen.capture_radius.0 == 0 || self.screen.capture_radius.1 == 0 {
                return Err(ConfigError::Message(
                    "Screen capture_radius must be greater than 0".to_string(),
                ));
            }
            if self.screen.downscale_factor == 0 {
                return Err(ConfigError::Message(
                    "Screen downscale_factor must be at least 1".to_string(),
                ));
            }
        }

        for webcam in &self.webcam {
            if webcam.fps <= 0.0 {
                return Err(ConfigError::Message(format!(
                    "Webcam {} fps must be greater than 0",
                    webcam.index
                )));
            }
            if webcam.resolution.0 == 0 || webcam.resolution.1 == 0 {
                return Err(ConfigError::Message(format!(
                    "Webcam {} resolution must be greater than 0",
                    webcam.index
                )));
            }
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            save_metadata: default_save_metadata(),
        }
    }
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            delta_time: None,
            memory_limit: None,
            device: None,
        }
    }
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            memory_limit: None,
            device: None,
        }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            fps: default_screen_fps(),
            resolution: default_screen_resolution(),
            capture_radius: default_capture_radius(),
            downscale_factor: default_downscale_factor(),
            memory_limit: None,
            write_raw_frames: false,
        }
    }
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            index: 0,
            fps: default_webcam_fps(),
            resolution: default_webcam_resolution(),
            memory_limit: default_webcam_memory_limit(),
            write_raw_frames: false,
        }
    }
}

// Default value functions
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_save_metadata() -> bool {
    true
}
fn default_enabled() -> bool {
    true
}
fn default_screen_fps() -> f64 {
    4.0
}
fn default_screen_resolution() -> (u32, u32) {
    (1920, 1080)
}
fn default_capture_radius() -> (u32, u32) {
    (5000, 3000)
}
fn default_downscale_factor() -> u32 {
    1
}
fn default_webcam_fps() -> f64 {
    15.0
}
fn default_webcam_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_webcam_memory_limit() -> Option<usize> {
    Some(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = InputTraceConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.pointer.enabled);
        assert!(config.pointer.delta_time.is_none());
        assert_eq!(config.screen.capture_radius, (5000, 3000));
        assert!(config.webcam.is_empty());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inputtrace.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[session]
data_dir = "/tmp/traces"

[pointer]
delta_time = 0.03

[screen]
fps = 10.0
capture_radius = [100, 40]
downscale_factor = 2

[[webcam]]
index = 0
fps = 15.0

[[webcam]]
index = 2
fps = 30.0
"#
        )
        .unwrap();

        let config = InputTraceConfig::load_from_file(&path).unwrap();
        assert_eq!(config.session.data_dir, "/tmp/traces");
        assert_eq!(config.pointer.delta_time, Some(0.03));
        assert_eq!(config.screen.capture_radius, (100, 40));
        assert_eq!(config.screen.downscale_factor, 2);
        assert_eq!(config.webcam.len(), 2);
        assert_eq!(config.webcam[1].index, 2);
        assert_eq!(config.webcam[1].fps, 30.0);
        // Untouched sections keep their defaults.
        assert!(config.keyboard.enabled);
        assert_eq!(config.webcam[0].memory_limit, Some(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = InputTraceConfig::load_from_file("/nonexistent/inputtrace.toml").unwrap();
        assert_eq!(config.session.data_dir, "./data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = InputTraceConfig::default();
        config.screen.fps = 0.0;
        assert!(config.validate().is_err());

        config.screen.fps = 4.0;
        assert!(config.validate().is_ok());

        config.pointer.delta_time = Some(-0.5);
        assert!(config.validate().is_err());

        config.pointer.delta_time = Some(0.03);
        config.webcam.push(WebcamConfig {
            fps: 0.0,
            ..WebcamConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = InputTraceConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: InputTraceConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.session.data_dir, config.session.data_dir);
        assert_eq!(parsed.screen.capture_radius, config.screen.capture_radius);
    }
}
