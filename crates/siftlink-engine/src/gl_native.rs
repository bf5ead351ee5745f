//! Native [`GlPlatform`] implementations.
//!
//! The window-system GL library is opened at run time through
//! [`SharedLibrary`], so nothing links against OpenGL at build time and a
//! host without GL only fails when shared-context mode is requested.

use std::rc::Rc;

use siftlink_core::error::{BridgeError, Result};

use crate::gl::GlPlatform;

/// Open the platform's window-system GL binding.
pub fn load_native_gl() -> Result<Rc<dyn GlPlatform>> {
    #[cfg(windows)]
    {
        Ok(Rc::new(wgl::Wgl::load()?))
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Ok(Rc::new(glx::Glx::load()?))
    }
    #[cfg(not(any(windows, all(unix, not(target_os = "macos")))))]
    {
        Err(BridgeError::Gl(
            "shared GL contexts are not supported on this platform".into(),
        ))
    }
}

fn gl_call_failed(call: &str) -> BridgeError {
    BridgeError::Gl(format!("{call} failed"))
}

// ─── WGL ────────────────────────────────────────────────────────────────

#[cfg(windows)]
mod wgl {
    use std::ffi::c_void;
    use std::path::Path;

    use tracing::warn;

    use super::gl_call_failed;
    use crate::gl::{GlBinding, GlContext, GlPlatform, GlSurface};
    use crate::sys::SharedLibrary;
    use siftlink_core::error::Result;

    type Hdc = *mut c_void;
    type Hglrc = *mut c_void;

    type GetCurrentDcFn = unsafe extern "system" fn() -> Hdc;
    type GetCurrentContextFn = unsafe extern "system" fn() -> Hglrc;
    type CreateContextFn = unsafe extern "system" fn(Hdc) -> Hglrc;
    type MakeCurrentFn = unsafe extern "system" fn(Hdc, Hglrc) -> i32;
    type DeleteContextFn = unsafe extern "system" fn(Hglrc) -> i32;

    pub(super) struct Wgl {
        get_current_dc: GetCurrentDcFn,
        get_current_context: GetCurrentContextFn,
        create_context: CreateContextFn,
        make_current: MakeCurrentFn,
        delete_context: DeleteContextFn,
        _library: SharedLibrary,
    }

    impl Wgl {
        pub(super) fn load() -> Result<Self> {
            let library = SharedLibrary::open(Path::new("opengl32.dll"))?;
            // SAFETY: signatures follow the WGL headers.
            unsafe {
                Ok(Self {
                    get_current_dc: library.symbol("wglGetCurrentDC")?,
                    get_current_context: library.symbol("wglGetCurrentContext")?,
                    create_context: library.symbol("wglCreateContext")?,
                    make_current: library.symbol("wglMakeCurrent")?,
                    delete_context: library.symbol("wglDeleteContext")?,
                    _library: library,
                })
            }
        }
    }

    impl GlPlatform for Wgl {
        fn name(&self) -> &'static str {
            "wgl"
        }

        fn current(&self) -> GlBinding {
            // SAFETY: thread-local queries with no arguments.
            let (dc, ctx) =
                unsafe { ((self.get_current_dc)(), (self.get_current_context)()) };
            GlBinding {
                surface: GlSurface {
                    display: 0,
                    drawable: dc as usize,
                },
                context: GlContext(ctx as usize),
            }
        }

        fn make_current(&self, binding: GlBinding) -> Result<()> {
            let (dc, ctx) = if binding.is_none() {
                (std::ptr::null_mut(), std::ptr::null_mut())
            } else {
                (
                    binding.surface.drawable as Hdc,
                    binding.context.0 as Hglrc,
                )
            };
            // SAFETY: dc/ctx are either null (release) or handles obtained
            // from this API.
            if unsafe { (self.make_current)(dc, ctx) } == 0 {
                return Err(gl_call_failed("wglMakeCurrent"));
            }
            Ok(())
        }

        fn create_context(&self, template: &GlBinding) -> Result<GlContext> {
            // SAFETY: the caller's device context is live while it is current.
            let ctx = unsafe { (self.create_context)(template.surface.drawable as Hdc) };
            if ctx.is_null() {
                return Err(gl_call_failed("wglCreateContext"));
            }
            Ok(GlContext(ctx as usize))
        }

        fn destroy_context(&self, _template: &GlBinding, context: GlContext) {
            if context.is_null() {
                return;
            }
            // SAFETY: context came from wglCreateContext and is deleted once.
            if unsafe { (self.delete_context)(context.0 as Hglrc) } == 0 {
                warn!(?context, "wglDeleteContext failed");
            }
        }
    }
}

// ─── GLX ────────────────────────────────────────────────────────────────

#[cfg(all(unix, not(target_os = "macos")))]
mod glx {
    use std::ffi::c_void;
    use std::os::raw::{c_int, c_ulong};
    use std::path::PathBuf;

    use tracing::{debug, warn};

    use super::gl_call_failed;
    use crate::gl::{GlBinding, GlContext, GlPlatform, GlSurface};
    use crate::sys::SharedLibrary;
    use siftlink_core::error::{BridgeError, Result};

    type Display = c_void;
    type GlxContext = *mut c_void;
    type GlxFbConfig = *mut c_void;
    type GlxDrawable = c_ulong;

    const SUCCESS: c_int = 0;
    const GLX_SCREEN: c_int = 0x800C;
    const GLX_FBCONFIG_ID: c_int = 0x8013;
    const GLX_RGBA_TYPE: c_int = 0x8014;
    const TRUE: c_int = 1;

    type GetCurrentDisplayFn = unsafe extern "C" fn() -> *mut Display;
    type GetCurrentDrawableFn = unsafe extern "C" fn() -> GlxDrawable;
    type GetCurrentContextFn = unsafe extern "C" fn() -> GlxContext;
    type MakeCurrentFn = unsafe extern "C" fn(*mut Display, GlxDrawable, GlxContext) -> c_int;
    type QueryContextFn =
        unsafe extern "C" fn(*mut Display, GlxContext, c_int, *mut c_int) -> c_int;
    type ChooseFbConfigFn =
        unsafe extern "C" fn(*mut Display, c_int, *const c_int, *mut c_int) -> *mut GlxFbConfig;
    type CreateNewContextFn =
        unsafe extern "C" fn(*mut Display, GlxFbConfig, c_int, GlxContext, c_int) -> GlxContext;
    type DestroyContextFn = unsafe extern "C" fn(*mut Display, GlxContext);
    type XFreeFn = unsafe extern "C" fn(*mut c_void) -> c_int;

    pub(super) struct Glx {
        get_current_display: GetCurrentDisplayFn,
        get_current_drawable: GetCurrentDrawableFn,
        get_current_context: GetCurrentContextFn,
        make_current: MakeCurrentFn,
        query_context: QueryContextFn,
        choose_fb_config: ChooseFbConfigFn,
        create_new_context: CreateNewContextFn,
        destroy_context: DestroyContextFn,
        x_free: XFreeFn,
        _libgl: SharedLibrary,
        _libx11: SharedLibrary,
    }

    impl Glx {
        pub(super) fn load() -> Result<Self> {
            let libgl = SharedLibrary::open_first(&[
                PathBuf::from("libGL.so.1"),
                PathBuf::from("libGL.so"),
            ])?;
            let libx11 = SharedLibrary::open_first(&[
                PathBuf::from("libX11.so.6"),
                PathBuf::from("libX11.so"),
            ])?;
            // SAFETY: signatures follow GL/glx.h and X11/Xlib.h.
            unsafe {
                Ok(Self {
                    get_current_display: libgl.symbol("glXGetCurrentDisplay")?,
                    get_current_drawable: libgl.symbol("glXGetCurrentDrawable")?,
                    get_current_context: libgl.symbol("glXGetCurrentContext")?,
                    make_current: libgl.symbol("glXMakeCurrent")?,
                    query_context: libgl.symbol("glXQueryContext")?,
                    choose_fb_config: libgl.symbol("glXChooseFBConfig")?,
                    create_new_context: libgl.symbol("glXCreateNewContext")?,
                    destroy_context: libgl.symbol("glXDestroyContext")?,
                    x_free: libx11.symbol("XFree")?,
                    _libgl: libgl,
                    _libx11: libx11,
                })
            }
        }

        fn query(&self, dpy: *mut Display, ctx: GlxContext, attribute: c_int) -> Result<c_int> {
            let mut value: c_int = 0;
            // SAFETY: dpy/ctx describe the caller's live current context.
            let rc = unsafe { (self.query_context)(dpy, ctx, attribute, &mut value) };
            if rc != SUCCESS {
                return Err(BridgeError::Gl(format!(
                    "glXQueryContext(0x{attribute:x}) failed with {rc}"
                )));
            }
            Ok(value)
        }
    }

    impl GlPlatform for Glx {
        fn name(&self) -> &'static str {
            "glx"
        }

        fn current(&self) -> GlBinding {
            // SAFETY: thread-local queries with no arguments.
            unsafe {
                GlBinding {
                    surface: GlSurface {
                        display: (self.get_current_display)() as usize,
                        drawable: (self.get_current_drawable)() as usize,
                    },
                    context: GlContext((self.get_current_context)() as usize),
                }
            }
        }

        fn make_current(&self, binding: GlBinding) -> Result<()> {
            let (dpy, drawable, ctx) = if binding.is_none() {
                // Releasing needs a display; with none current there is
                // nothing to release.
                // SAFETY: thread-local query.
                let dpy = unsafe { (self.get_current_display)() };
                if dpy.is_null() {
                    return Ok(());
                }
                (dpy, 0, std::ptr::null_mut())
            } else {
                (
                    binding.surface.display as *mut Display,
                    binding.surface.drawable as GlxDrawable,
                    binding.context.0 as GlxContext,
                )
            };
            // SAFETY: handles were captured from this API on this thread.
            if unsafe { (self.make_current)(dpy, drawable, ctx) } == 0 {
                return Err(gl_call_failed("glXMakeCurrent"));
            }
            Ok(())
        }

        fn create_context(&self, template: &GlBinding) -> Result<GlContext> {
            let dpy = template.surface.display as *mut Display;
            let caller_ctx = template.context.0 as GlxContext;
            if dpy.is_null() || caller_ctx.is_null() {
                return Err(BridgeError::Gl(
                    "no current GLX context to derive a config from".into(),
                ));
            }
            let screen = self.query(dpy, caller_ctx, GLX_SCREEN)?;
            let fb_config_id = self.query(dpy, caller_ctx, GLX_FBCONFIG_ID)?;
            debug!(screen, fb_config_id, "deriving dedicated GLX context");

            let attribs = [GLX_FBCONFIG_ID, fb_config_id, 0];
            let mut count: c_int = 0;
            // SAFETY: attribs is a None-terminated list; count is written.
            let configs =
                unsafe { (self.choose_fb_config)(dpy, screen, attribs.as_ptr(), &mut count) };
            if configs.is_null() || count < 1 {
                if !configs.is_null() {
                    // SAFETY: list allocated by Xlib.
                    unsafe { (self.x_free)(configs.cast()) };
                }
                return Err(gl_call_failed("glXChooseFBConfig"));
            }
            // SAFETY: count >= 1, so the first element exists.
            let config = unsafe { *configs };
            // SAFETY: config belongs to dpy; no share list.
            let ctx = unsafe {
                (self.create_new_context)(dpy, config, GLX_RGBA_TYPE, std::ptr::null_mut(), TRUE)
            };
            // SAFETY: list allocated by Xlib, freed once.
            unsafe { (self.x_free)(configs.cast()) };
            if ctx.is_null() {
                return Err(gl_call_failed("glXCreateNewContext"));
            }
            Ok(GlContext(ctx as usize))
        }

        fn destroy_context(&self, template: &GlBinding, context: GlContext) {
            if context.is_null() {
                return;
            }
            let dpy = template.surface.display as *mut Display;
            if dpy.is_null() {
                warn!(?context, "no display to destroy GLX context on; leaking it");
                return;
            }
            // SAFETY: context was created on dpy and is destroyed once.
            unsafe { (self.destroy_context)(dpy, context.0 as GlxContext) };
        }
    }
}
