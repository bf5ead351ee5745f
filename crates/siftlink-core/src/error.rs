//! Typed error hierarchy for the bridge.
//!
//! Uses `thiserror` for library-grade errors. The CLI maps every variant to a
//! process exit code through [`BridgeError::error_code`].
//!
//! # Error codes
//!
//! Each variant maps to a stable integer code so diagnostics can be grouped
//! without string parsing.

use crate::types::ElementType;

/// All errors originating from the siftlink bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    // ── Loader ───────────────────────────────────────────────────────
    #[error("Engine module load error: {0}")]
    Load(String),

    #[error("Engine symbol `{symbol}` could not be resolved: {detail}")]
    Symbol { symbol: &'static str, detail: String },

    // ── GPU context ──────────────────────────────────────────────────
    #[error("GPU capability error: {0}")]
    Capability(String),

    #[error("Graphics API error: {0}")]
    Gl(String),

    // ── Session state ────────────────────────────────────────────────
    #[error("Session not initialized: call configure() first")]
    NotInitialized,

    #[error("Matcher unavailable: session was configured without matching")]
    MatcherUnavailable,

    // ── Buffer contracts ─────────────────────────────────────────────
    #[error("Unsupported buffer rank {rank}: only single-channel 2D images are supported")]
    UnsupportedRank { rank: usize },

    #[error("Unsupported element type {0}")]
    UnsupportedElementType(ElementType),

    #[error("Invalid descriptor shape: {0}")]
    InvalidDescriptorShape(String),

    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Empty image: {height}x{width}")]
    EmptyImage { height: usize, width: usize },

    // ── Engine runtime ───────────────────────────────────────────────
    #[error("Engine runtime failure: {0}")]
    EngineRuntime(String),

    #[error("Match request of {requested} descriptors exceeds matcher capacity {capacity}")]
    MatcherCapacityExceeded { requested: usize, capacity: usize },

    // ── Configuration / IO ───────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image decode error: {0}")]
    Image(String),
}

impl BridgeError {
    /// Stable integer error code.
    ///
    /// Codes are grouped by category:
    /// - 1xx: loader
    /// - 2xx: GPU / graphics context
    /// - 3xx: session state
    /// - 4xx: buffer contracts
    /// - 5xx: engine runtime and matching
    /// - 6xx: configuration and IO
    pub fn error_code(&self) -> u32 {
        match self {
            Self::Load(_) => 100,
            Self::Symbol { .. } => 101,
            Self::Capability(_) => 200,
            Self::Gl(_) => 201,
            Self::NotInitialized => 300,
            Self::MatcherUnavailable => 301,
            Self::UnsupportedRank { .. } => 400,
            Self::UnsupportedElementType(_) => 401,
            Self::InvalidDescriptorShape(_) => 402,
            Self::BufferSizeMismatch { .. } => 403,
            Self::EmptyImage { .. } => 404,
            Self::EngineRuntime(_) => 500,
            Self::MatcherCapacityExceeded { .. } => 501,
            Self::InvalidConfig(_) => 600,
            Self::Io(_) => 601,
            Self::Json(_) => 602,
            Self::Image(_) => 603,
        }
    }

    /// Whether this error leaves a session unconfigured or failed when it is
    /// raised from `configure`.
    pub fn is_configuration_failure(&self) -> bool {
        matches!(
            self,
            Self::Load(_)
                | Self::Symbol { .. }
                | Self::Capability(_)
                | Self::Gl(_)
                | Self::InvalidConfig(_)
        )
    }
}

/// Convenience alias used throughout the bridge crates.
pub type Result<T> = std::result::Result<T, BridgeError>;
