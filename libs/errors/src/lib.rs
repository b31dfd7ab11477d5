//! Unified error handling for the station controller
//!
//! One error type shared by every crate in the workspace. Variants are grouped
//! by where they originate (MES chain, pre-flight validation, signal dispatch,
//! material accounting) so callers can decide how far an error may travel
//! without matching on every variant.

use thiserror::Error;

// ============================================================================
// StationError - Main error type
// ============================================================================

/// Main error type for the station controller
#[derive(Debug, Error)]
pub enum StationError {
    // ======================================
    // MES Chain Errors (per-SN NG)
    // ======================================
    #[error("SN lookup failed: {0}")]
    LookupFailed(String),

    #[error("Product recruitment failed: {0}")]
    RecruitmentFailed(String),

    #[error("Process start rejected: {0}")]
    StartRejected(String),

    #[error("Lot bind failed: {0}")]
    BindFailed(String),

    #[error("Process complete failed: {0}")]
    CompleteFailed(String),

    // ======================================
    // Pre-flight Validation Errors
    // ======================================
    #[error("No batch material lot bound to side {side}")]
    NoLotForSide { side: String },

    #[error("Configuration incomplete: {0}")]
    ConfigIncomplete(String),

    // ======================================
    // Signal Dispatch Errors (contained)
    // ======================================
    #[error("Invalid PLC address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("No confirmation from {channel} within {timeout_ms}ms")]
    ConfirmationTimeout { channel: String, timeout_ms: u64 },

    // ======================================
    // Material Errors (system halt)
    // ======================================
    #[error("Material exhausted: lot {lot_id} remaining {remaining}")]
    MaterialExhausted { lot_id: String, remaining: f64 },

    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Communication Errors
    // ======================================
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Result type alias using StationError
pub type StationResult<T> = Result<T, StationError>;

/// Coarse error classification, drives the log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorCategory {
    /// MES rejected or failed a step of the SN chain
    Mes,
    /// Pre-flight validation, blocks start
    Validation,
    /// Signal dispatch, contained in the dispatcher
    Dispatch,
    /// Usage counter reached zero
    Material,
    Configuration,
    Communication,
    Io,
}

impl StationError {
    /// Stable error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::LookupFailed(_) => "LOOKUP_FAILED",
            Self::RecruitmentFailed(_) => "RECRUITMENT_FAILED",
            Self::StartRejected(_) => "START_REJECTED",
            Self::BindFailed(_) => "BIND_FAILED",
            Self::CompleteFailed(_) => "COMPLETE_FAILED",
            Self::NoLotForSide { .. } => "NO_LOT_FOR_SIDE",
            Self::ConfigIncomplete(_) => "CONFIG_INCOMPLETE",
            Self::InvalidAddress { .. } => "INVALID_ADDRESS",
            Self::ChannelUnavailable(_) => "CHANNEL_UNAVAILABLE",
            Self::ConfirmationTimeout { .. } => "CONFIRMATION_TIMEOUT",
            Self::MaterialExhausted { .. } => "MATERIAL_EXHAUSTED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::HttpClient(_) => "HTTP_CLIENT_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Deserialization(_) => "DESERIALIZATION_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::LookupFailed(_)
            | Self::RecruitmentFailed(_)
            | Self::StartRejected(_)
            | Self::BindFailed(_)
            | Self::CompleteFailed(_) => ErrorCategory::Mes,

            Self::NoLotForSide { .. } | Self::ConfigIncomplete(_) => ErrorCategory::Validation,

            Self::InvalidAddress { .. }
            | Self::ChannelUnavailable(_)
            | Self::ConfirmationTimeout { .. } => ErrorCategory::Dispatch,

            Self::MaterialExhausted { .. } => ErrorCategory::Material,

            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,

            Self::Transport(_) | Self::HttpClient(_) => ErrorCategory::Communication,

            Self::Io(_) | Self::Serialization(_) | Self::Deserialization(_) => ErrorCategory::Io,
        }
    }

    /// Missing PLC acknowledgement counts as success for the station
    pub fn is_soft_success(&self) -> bool {
        matches!(self, Self::ConfirmationTimeout { .. })
    }

    /// Level at which the error should be reported
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Dispatch if self.is_soft_success() => Level::INFO,
            ErrorCategory::Mes | ErrorCategory::Dispatch | ErrorCategory::Communication => {
                Level::WARN
            },
            ErrorCategory::Material
            | ErrorCategory::Validation
            | ErrorCategory::Configuration
            | ErrorCategory::Io => Level::ERROR,
        }
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for StationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for StationError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}
