//! Graphics-context abstraction.
//!
//! Handles are carried as plain addresses so they can be compared, logged,
//! and faked in tests without touching a real driver.

use std::fmt;

use siftlink_core::error::Result;

/// Opaque rendering-context handle (`HGLRC` / `GLXContext`). Zero is "none".
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GlContext(pub usize);

impl GlContext {
    pub const NULL: Self = Self(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for GlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlContext({:#x})", self.0)
    }
}

/// Device/drawable side of a binding.
///
/// On WGL `display` is unused and `drawable` is the `HDC`. On GLX `display`
/// is the X `Display*` and `drawable` the `GLXDrawable`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GlSurface {
    pub display: usize,
    pub drawable: usize,
}

/// What is current on the calling thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GlBinding {
    pub surface: GlSurface,
    pub context: GlContext,
}

impl GlBinding {
    /// Nothing current.
    pub const NONE: Self = Self {
        surface: GlSurface {
            display: 0,
            drawable: 0,
        },
        context: GlContext::NULL,
    };

    #[inline]
    pub fn is_none(&self) -> bool {
        self.context.is_null()
    }

    /// The same surface with a different context.
    #[inline]
    pub fn with_context(self, context: GlContext) -> Self {
        Self { context, ..self }
    }
}

/// Thread-local current-context operations of the graphics API.
pub trait GlPlatform {
    /// Backend name for diagnostics (`"wgl"`, `"glx"`, ...).
    fn name(&self) -> &'static str;

    /// Binding current on the calling thread. [`GlBinding::NONE`] if nothing is.
    fn current(&self) -> GlBinding;

    /// Make `binding` current. A null context releases the current one.
    fn make_current(&self, binding: GlBinding) -> Result<()>;

    /// Create a context compatible with `template` (the caller's binding).
    fn create_context(&self, template: &GlBinding) -> Result<GlContext>;

    /// Destroy a context created by [`create_context`](Self::create_context).
    fn destroy_context(&self, template: &GlBinding, context: GlContext);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_binding_has_null_context() {
        assert!(GlBinding::NONE.is_none());
        assert_eq!(GlBinding::default(), GlBinding::NONE);
    }

    #[test]
    fn with_context_keeps_surface() {
        let b = GlBinding {
            surface: GlSurface {
                display: 1,
                drawable: 2,
            },
            context: GlContext(3),
        };
        let swapped = b.with_context(GlContext(9));
        assert_eq!(swapped.surface, b.surface);
        assert_eq!(swapped.context, GlContext(9));
        assert!(!swapped.is_none());
    }

    #[test]
    fn context_debug_is_hex() {
        assert_eq!(format!("{:?}", GlContext(255)), "GlContext(0xff)");
    }
}
