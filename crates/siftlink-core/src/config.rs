//! Session and matching configuration.

use std::os::raw::c_int;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::ffi_types::ENGINE_MAX_FEATURES;

/// Environment variable naming the engine module to load when the
/// configuration does not carry an explicit path.
pub const MODULE_ENV_VAR: &str = "SIFTLINK_MODULE";

/// Parameters for one `configure` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Feature cap forwarded to the engine. `0` lets the engine keep every
    /// feature it finds.
    pub max_features: u32,
    /// DOG levels per octave.
    pub octave_layers: i32,
    /// Contrast threshold for rejecting low-contrast extrema.
    pub contrast_threshold: f32,
    /// Edge threshold for rejecting edge-like extrema.
    pub edge_threshold: f32,
    /// Run the engine on a dedicated context that shares the caller's
    /// device instead of letting the engine create its own.
    pub share_caller_context: bool,
    /// Construct the matcher alongside the engine.
    pub enable_matching: bool,
    /// Explicit engine module path. Falls back to [`MODULE_ENV_VAR`] and then
    /// to the platform's default library names.
    pub module: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_features: 4096,
            octave_layers: 3,
            contrast_threshold: 0.01472,
            edge_threshold: 10.0,
            share_caller_context: false,
            enable_matching: true,
            module: None,
        }
    }
}

impl SessionConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg = serde_json::from_str::<Self>(&data)?;
        Ok(cfg)
    }

    /// Number of descriptors the matcher (and its scratch buffer) is sized for.
    pub fn matcher_capacity(&self) -> usize {
        match self.max_features {
            0 => ENGINE_MAX_FEATURES,
            n => n as usize,
        }
    }
}

/// Thresholds for one match call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    /// Upper bound on raw descriptor distance.
    pub distance_max: f32,
    /// Upper bound on best/second-best distance ratio.
    pub ratio_max: f32,
    /// Keep only pairs that are each other's best match.
    pub mutual_best_match: bool,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            distance_max: 0.70,
            ratio_max: 0.80,
            mutual_best_match: true,
        }
    }
}

fn require_positive(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(BridgeError::InvalidConfig(format!(
            "{name} must be a positive finite number (got {value})"
        )));
    }
    Ok(())
}

/// Thresholds travel as six-decimal `%f` text; anything that widens to below
/// half a unit in the last place prints as "0.000000".
fn require_printable(name: &str, value: f32) -> Result<()> {
    if f64::from(value) < 0.000_000_5 {
        return Err(BridgeError::InvalidConfig(format!(
            "{name} {value} is below the engine's argument precision"
        )));
    }
    Ok(())
}

/// Validate a [`SessionConfig`] before anything is loaded.
///
/// The engine parses its arguments leniently and silently falls back to
/// defaults on garbage, so bad values are rejected here instead.
pub fn validate_session_config(cfg: &SessionConfig) -> Result<()> {
    if cfg.octave_layers < 1 {
        return Err(BridgeError::InvalidConfig(format!(
            "octave_layers must be >= 1 (got {})",
            cfg.octave_layers
        )));
    }
    if cfg.max_features > c_int::MAX as u32 {
        return Err(BridgeError::InvalidConfig(format!(
            "max_features must fit the engine's int argument (got {}, max {})",
            cfg.max_features,
            c_int::MAX
        )));
    }
    require_positive("contrast_threshold", cfg.contrast_threshold)?;
    require_positive("edge_threshold", cfg.edge_threshold)?;
    require_printable("contrast_threshold", cfg.contrast_threshold)?;
    require_printable("edge_threshold", cfg.edge_threshold)?;
    if let Some(module) = &cfg.module
        && module.as_os_str().is_empty()
    {
        return Err(BridgeError::InvalidConfig("module path is empty".into()));
    }
    Ok(())
}

/// Validate [`MatchParams`] before any GPU call.
pub fn validate_match_params(params: &MatchParams) -> Result<()> {
    require_positive("distance_max", params.distance_max)?;
    require_positive("ratio_max", params.ratio_max)?;
    Ok(())
}
