#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod config;
pub mod error;
pub mod ffi_types;
pub mod types;

pub use config::{MatchParams, SessionConfig};
pub use error::{BridgeError, Result};
pub use types::{DescriptorMatrix, ElementType, Features, HostArray, Keypoint, MatchResult};
