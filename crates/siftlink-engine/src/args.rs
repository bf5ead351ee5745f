//! Engine argument marshalling.
//!
//! The engine is configured through a flat `argc`/`argv` list parsed by its
//! own option reader. Numbers must be formatted the way the engine's C
//! parser expects: integers in decimal, floats in `%f` (six fixed decimals).

use std::ffi::CString;
use std::os::raw::{c_char, c_int};

use siftlink_core::config::SessionConfig;
use siftlink_core::error::{BridgeError, Result};

/// First octave; `-1` lets the engine upsample the first octave automatically.
pub const FLAG_FIRST_OCTAVE: &str = "-fo";
/// Maximum number of features kept.
pub const FLAG_FEATURE_CAP: &str = "-tc";
/// DOG levels per octave.
pub const FLAG_OCTAVE_LAYERS: &str = "-d";
/// DOG contrast threshold.
pub const FLAG_CONTRAST: &str = "-t";
/// Edge threshold.
pub const FLAG_EDGE: &str = "-e";
/// Verbosity level.
pub const FLAG_VERBOSE: &str = "-v";
/// Disable the engine's internal image pre-processing.
pub const FLAG_NO_PREPROCESS: &str = "-noprep";

/// Owned engine argument list with a stable `argv` view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineArgs {
    args: Vec<CString>,
}

/// C `%d`.
pub fn format_int(value: i64) -> String {
    value.to_string()
}

/// C `%f`: the float is promoted to double and printed with six decimals.
pub fn format_float(value: f32) -> String {
    format!("{:.6}", f64::from(value))
}

impl EngineArgs {
    pub fn from_config(cfg: &SessionConfig) -> Result<Self> {
        Self::from_strings([
            FLAG_FIRST_OCTAVE.to_string(),
            "-1".to_string(),
            FLAG_FEATURE_CAP.to_string(),
            format_int(i64::from(cfg.max_features)),
            FLAG_OCTAVE_LAYERS.to_string(),
            format_int(i64::from(cfg.octave_layers)),
            FLAG_CONTRAST.to_string(),
            format_float(cfg.contrast_threshold),
            FLAG_EDGE.to_string(),
            format_float(cfg.edge_threshold),
            FLAG_VERBOSE.to_string(),
            "0".to_string(),
            FLAG_NO_PREPROCESS.to_string(),
        ])
    }

    fn from_strings(items: impl IntoIterator<Item = String>) -> Result<Self> {
        let args = items
            .into_iter()
            .map(|s| {
                CString::new(s)
                    .map_err(|e| BridgeError::InvalidConfig(format!("engine argument: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { args })
    }

    #[inline]
    pub fn argc(&self) -> c_int {
        self.args.len() as c_int
    }

    /// Pointer array for the engine call. Valid while `self` is alive.
    pub fn argv(&self) -> Vec<*const c_char> {
        self.args.iter().map(|a| a.as_ptr()).collect()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Value following `flag`, if present.
    pub fn value_of(&self, flag: &str) -> Option<String> {
        let strings = self.to_strings();
        let pos = strings.iter().position(|s| s == flag)?;
        strings.get(pos + 1).cloned()
    }
}
