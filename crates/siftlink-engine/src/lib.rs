#![doc = include_str!("../README.md")]

pub mod api;
pub mod arbiter;
pub mod args;
pub mod engine;
pub mod gl;
pub mod gl_native;
pub mod native;
pub mod sys;

pub use arbiter::{ContextArbiter, ContextGuard, RenderContext};
pub use args::EngineArgs;
pub use engine::{DescriptorMatcher, EngineBackend, EngineModule, FeatureEngine, MatchSlot};
pub use gl::{GlBinding, GlContext, GlPlatform, GlSurface};
pub use native::NativeBackend;
