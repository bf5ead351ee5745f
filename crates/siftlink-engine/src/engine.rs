//! Engine-side trait boundaries.
//!
//! ```text
//!   EngineBackend ──load_module──▶ EngineModule ──create_engine──▶ FeatureEngine
//!        │                              └────────create_matcher─▶ DescriptorMatcher
//!        └──gl_platform──▶ GlPlatform
//! ```
//!
//! The session only talks to these traits. [`crate::native`] implements them
//! over the dynamically loaded module; tests implement them in-process.

use std::path::Path;
use std::rc::Rc;

use siftlink_core::buffer::{DescriptorView, ImageView};
use siftlink_core::config::MatchParams;
use siftlink_core::error::Result;
use siftlink_core::ffi_types::EngineCapability;
use siftlink_core::types::Keypoint;

use crate::args::EngineArgs;
use crate::gl::GlPlatform;

/// One live detector instance.
pub trait FeatureEngine {
    /// Apply the engine argument list.
    fn parse_args(&mut self, args: &EngineArgs);

    /// Let the engine create (and make current) its own context.
    fn create_context(&mut self) -> EngineCapability;

    /// Probe the context current on the calling thread.
    fn verify_context(&mut self) -> EngineCapability;

    /// Run detection on one image. `false` means the engine rejected it.
    fn run(&mut self, image: &ImageView<'_>) -> bool;

    /// Features found by the last successful [`run`](Self::run).
    fn feature_count(&self) -> i32;

    /// Copy the last result out. Both buffers must hold at least
    /// `feature_count()` entries (`× 128` for descriptors).
    fn read_features(&mut self, keypoints: &mut [Keypoint], descriptors: &mut [f32]) -> Result<()>;
}

/// The matcher's two descriptor input slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum MatchSlot {
    A = 0,
    B = 1,
}

/// One live matcher instance, sized at construction.
pub trait DescriptorMatcher {
    /// Maximum descriptors per slot.
    fn capacity(&self) -> usize;

    /// Probe the context current on the calling thread.
    fn verify_context(&mut self) -> bool;

    /// Upload one descriptor set. Fails if it exceeds [`capacity`](Self::capacity).
    fn set_descriptors(&mut self, slot: MatchSlot, descriptors: &DescriptorView<'_>) -> Result<()>;

    /// Write up to `out.len()` index pairs and return the engine's count.
    fn get_matches(&mut self, out: &mut [[i32; 2]], params: &MatchParams) -> i32;
}

/// A loaded engine module.
pub trait EngineModule {
    /// Where the module came from, for diagnostics.
    fn name(&self) -> String;

    fn create_engine(&self) -> Result<Box<dyn FeatureEngine>>;

    fn create_matcher(&self, capacity: usize) -> Result<Box<dyn DescriptorMatcher>>;

    /// Release the module. Idempotent; instances already created keep
    /// their own reference.
    fn unload(&mut self);

    fn is_loaded(&self) -> bool;
}

/// Source of engine modules and of the graphics platform.
pub trait EngineBackend {
    fn load_module(&self, module: Option<&Path>) -> Result<Box<dyn EngineModule>>;

    /// Graphics platform used for shared-context mode.
    fn gl_platform(&self) -> Result<Rc<dyn GlPlatform>>;
}
