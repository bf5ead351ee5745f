//! GPU context arbiter.
//!
//! Owned mode: the engine created its own context at configure time and
//! calls run on it directly; entering is a no-op.
//!
//! Shared mode: a dedicated context is created next to the caller's context
//! at configure time. Every engine call runs inside a [`ContextGuard`] that
//! makes the dedicated context current and restores whatever was current at
//! entry when dropped, on every exit path.

use std::rc::Rc;

use siftlink_core::error::{BridgeError, Result};
use tracing::{debug, info, warn};

use crate::gl::{GlBinding, GlContext, GlPlatform};

/// Which context engine calls run on.
pub enum RenderContext {
    /// Created and owned by the engine itself.
    Owned,
    /// Dedicated context created beside the caller's.
    Shared {
        gl: Rc<dyn GlPlatform>,
        caller: GlBinding,
        dedicated: GlContext,
    },
}

pub struct ContextArbiter {
    context: RenderContext,
}

impl ContextArbiter {
    pub fn owned() -> Self {
        Self {
            context: RenderContext::Owned,
        }
    }

    /// Capture the caller's current binding and create a dedicated context
    /// compatible with it.
    pub fn shared(gl: Rc<dyn GlPlatform>) -> Result<Self> {
        let caller = gl.current();
        if caller.is_none() {
            return Err(BridgeError::Capability(
                "no GL context is current on the calling thread to share".into(),
            ));
        }
        let dedicated = gl.create_context(&caller)?;
        info!(
            platform = gl.name(),
            caller = ?caller.context,
            ?dedicated,
            "dedicated GL context created"
        );
        Ok(Self {
            context: RenderContext::Shared {
                gl,
                caller,
                dedicated,
            },
        })
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        matches!(self.context, RenderContext::Shared { .. })
    }

    /// Dedicated context, while one is held.
    pub fn dedicated(&self) -> Option<GlContext> {
        match &self.context {
            RenderContext::Shared { dedicated, .. } if !dedicated.is_null() => Some(*dedicated),
            _ => None,
        }
    }

    /// Make the engine's context current until the guard drops.
    pub fn enter(&self) -> Result<ContextGuard> {
        let RenderContext::Shared {
            gl,
            caller,
            dedicated,
        } = &self.context
        else {
            return Ok(ContextGuard::noop());
        };
        if dedicated.is_null() {
            return Err(BridgeError::Capability(
                "dedicated GL context already released".into(),
            ));
        }
        let previous = gl.current();
        let target = caller.with_context(*dedicated);
        if previous == target {
            return Ok(ContextGuard::noop());
        }
        gl.make_current(target)?;
        debug!(?previous, target = ?target.context, "engine context entered");
        Ok(ContextGuard {
            restore: Some((Rc::clone(gl), previous)),
        })
    }

    /// Destroy the dedicated context. Idempotent; a no-op in owned mode.
    pub fn release(&mut self) {
        let RenderContext::Shared {
            gl,
            caller,
            dedicated,
        } = &mut self.context
        else {
            return;
        };
        if dedicated.is_null() {
            return;
        }
        if gl.current().context == *dedicated
            && let Err(err) = gl.make_current(*caller)
        {
            warn!(error = %err, "could not unbind dedicated GL context before destroying it");
        }
        gl.destroy_context(caller, *dedicated);
        info!(dedicated = ?*dedicated, "dedicated GL context destroyed");
        *dedicated = GlContext::NULL;
    }
}

impl Drop for ContextArbiter {
    fn drop(&mut self) {
        self.release();
    }
}

/// Scoped context switch. Restores the entry binding on drop.
#[must_use = "the engine context is only current while the guard is alive"]
pub struct ContextGuard {
    restore: Option<(Rc<dyn GlPlatform>, GlBinding)>,
}

impl ContextGuard {
    fn noop() -> Self {
        Self { restore: None }
    }

    /// Whether dropping this guard switches contexts.
    #[inline]
    pub fn switched(&self) -> bool {
        self.restore.is_some()
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some((gl, previous)) = self.restore.take()
            && let Err(err) = gl.make_current(previous)
        {
            warn!(error = %err, previous = ?previous.context, "GL context restore failed");
        }
    }
}
