#![doc = include_str!("../README.md")]

pub mod matching;
pub mod session;

pub use session::{Session, SessionState};
pub use siftlink_core::{
    BridgeError, DescriptorMatrix, ElementType, Features, HostArray, Keypoint, MatchParams,
    MatchResult, Result, SessionConfig,
};
