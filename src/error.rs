use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputTraceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Startup error in {source_name}: {details}")]
    Startup { source_name: String, details: String },

    #[error("Malformed record: expected {expected} bytes, got {actual}")]
    MalformedRecord { expected: usize, actual: usize },

    #[error("Unknown event kind {kind} for {stream} stream")]
    UnknownEvent { stream: &'static str, kind: u8 },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl InputTraceError {
    pub fn startup<S: Into<String>>(source_name: S, details: S) -> Self {
        Self::Startup {
            source_name: source_name.into(),
            details: details.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InputTraceError>;
