use thiserror::Error;

/// Broad category of a fatal invocation error, used to keep log lines distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Input,
    Mapping,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Input => "input",
            ErrorKind::Mapping => "mapping",
        }
    }
}

/// Errors that abort an invocation before any twin write.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("event carries no data")]
    EmptyEvent,

    #[error("payload decode error: {0}")]
    PayloadDecode(String),

    #[error("decoded batch contains no nodes")]
    EmptyPayload,

    #[error("mapping document unavailable: {0}")]
    MappingUnavailable(String),

    #[error("node key '{key}' matched {matches} mapping entries (expected exactly one)")]
    MappingResolution { key: String, matches: usize },

    #[error("mapping entry for node key '{key}' has an empty property name")]
    EmptyPropertyName { key: String },

    #[error("node '{address}' has unparseable source timestamp '{raw}'")]
    TimestampParse { address: String, raw: String },

    #[error("no readings resolved to a twin update")]
    EmptyResultSet,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Configuration(_) => ErrorKind::Configuration,
            BridgeError::EmptyEvent
            | BridgeError::PayloadDecode(_)
            | BridgeError::EmptyPayload
            | BridgeError::EmptyResultSet => ErrorKind::Input,
            BridgeError::MappingUnavailable(_)
            | BridgeError::MappingResolution { .. }
            | BridgeError::EmptyPropertyName { .. }
            | BridgeError::TimestampParse { .. } => ErrorKind::Mapping,
        }
    }
}

impl From<crate::config::ConfigError> for BridgeError {
    fn from(value: crate::config::ConfigError) -> Self {
        BridgeError::Configuration(value.to_string())
    }
}
