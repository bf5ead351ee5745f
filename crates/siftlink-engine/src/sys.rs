//! Minimal run-time shared-library loader.
//!
//! `dlopen`/`dlsym` on Unix, `LoadLibraryW`/`GetProcAddress` on Windows.
//! Every raw symbol-to-function-pointer cast in the workspace goes through
//! [`SharedLibrary::symbol`].

use std::ffi::{CString, c_void};
use std::path::{Path, PathBuf};

use siftlink_core::error::{BridgeError, Result};
use tracing::debug;

#[cfg(unix)]
mod imp {
    use std::ffi::{CStr, CString, c_char, c_void};
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    unsafe extern "C" {
        fn dlopen(filename: *const c_char, flags: i32) -> *mut c_void;
        fn dlerror() -> *const c_char;
        fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
        fn dlclose(handle: *mut c_void) -> i32;
    }

    const RTLD_NOW: i32 = 2;
    #[cfg(target_os = "macos")]
    const RTLD_LOCAL: i32 = 0x4;
    #[cfg(not(target_os = "macos"))]
    const RTLD_LOCAL: i32 = 0;

    fn last_error(fallback: &str) -> String {
        // SAFETY: dlerror returns a thread-local C string or null.
        unsafe {
            let p = dlerror();
            if p.is_null() {
                fallback.to_string()
            } else {
                CStr::from_ptr(p).to_string_lossy().to_string()
            }
        }
    }

    pub(super) fn open(path: &Path) -> Result<*mut c_void, String> {
        let cpath = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| format!("invalid module path: {}", path.display()))?;
        // SAFETY: NUL-terminated path and valid dlopen flags.
        let handle = unsafe { dlopen(cpath.as_ptr(), RTLD_NOW | RTLD_LOCAL) };
        if handle.is_null() {
            Err(last_error("unknown dlopen error"))
        } else {
            Ok(handle)
        }
    }

    pub(super) fn symbol(handle: *mut c_void, name: &CString) -> Result<*mut c_void, String> {
        // Clear stale state so a null symbol value is distinguishable.
        let _ = last_error("");
        // SAFETY: handle is a live dlopen handle and name is NUL-terminated.
        let ptr = unsafe { dlsym(handle, name.as_ptr()) };
        if ptr.is_null() {
            Err(last_error("symbol resolved to null"))
        } else {
            Ok(ptr)
        }
    }

    pub(super) fn close(handle: *mut c_void) {
        // SAFETY: handle came from dlopen and is closed exactly once.
        unsafe {
            dlclose(handle);
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::ffi::{CString, c_char, c_void};
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    unsafe extern "system" {
        fn LoadLibraryW(filename: *const u16) -> *mut c_void;
        fn GetProcAddress(module: *mut c_void, name: *const c_char) -> *mut c_void;
        fn FreeLibrary(module: *mut c_void) -> i32;
        fn GetLastError() -> u32;
    }

    pub(super) fn open(path: &Path) -> Result<*mut c_void, String> {
        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
        // SAFETY: NUL-terminated UTF-16 path.
        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
        if handle.is_null() {
            // SAFETY: plain thread-local error query.
            Err(format!("LoadLibraryW failed with error {}", unsafe { GetLastError() }))
        } else {
            Ok(handle)
        }
    }

    pub(super) fn symbol(handle: *mut c_void, name: &CString) -> Result<*mut c_void, String> {
        // SAFETY: handle is a live module handle and name is NUL-terminated.
        let ptr = unsafe { GetProcAddress(handle, name.as_ptr()) };
        if ptr.is_null() {
            // SAFETY: plain thread-local error query.
            Err(format!("GetProcAddress failed with error {}", unsafe { GetLastError() }))
        } else {
            Ok(ptr)
        }
    }

    pub(super) fn close(handle: *mut c_void) {
        // SAFETY: handle came from LoadLibraryW and is freed exactly once.
        unsafe {
            FreeLibrary(handle);
        }
    }
}

/// An open shared library. Closed on [`close`](Self::close) or drop.
#[derive(Debug)]
pub struct SharedLibrary {
    handle: Option<*mut c_void>,
    path: PathBuf,
}

impl SharedLibrary {
    /// Open a library by path or bare name (searched by the platform loader).
    pub fn open(path: &Path) -> Result<Self> {
        let handle = imp::open(path)
            .map_err(|err| BridgeError::Load(format!("{}: {err}", path.display())))?;
        debug!(module = %path.display(), "shared library opened");
        Ok(Self {
            handle: Some(handle),
            path: path.to_path_buf(),
        })
    }

    /// Open the first candidate that loads; report the last failure otherwise.
    pub fn open_first(candidates: &[PathBuf]) -> Result<Self> {
        let mut last_err = BridgeError::Load("no module candidates".into());
        for candidate in candidates {
            match Self::open(candidate) {
                Ok(lib) => return Ok(lib),
                Err(err) => {
                    debug!(module = %candidate.display(), error = %err, "module candidate rejected");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    /// Resolve `name` and reinterpret it as a function pointer of type `T`.
    ///
    /// # Safety
    /// `T` must be an `unsafe extern` function pointer type whose signature and
    /// calling convention match the exported symbol.
    pub unsafe fn symbol<T: Copy>(&self, name: &'static str) -> Result<T> {
        if std::mem::size_of::<T>() != std::mem::size_of::<*mut c_void>() {
            return Err(BridgeError::Symbol {
                symbol: name,
                detail: "target type is not pointer-sized".into(),
            });
        }
        let handle = self.handle.ok_or(BridgeError::Symbol {
            symbol: name,
            detail: "library already closed".into(),
        })?;
        let cname = CString::new(name).map_err(|_| BridgeError::Symbol {
            symbol: name,
            detail: "symbol name contains NUL".into(),
        })?;
        let ptr = imp::symbol(handle, &cname).map_err(|detail| BridgeError::Symbol {
            symbol: name,
            detail,
        })?;
        // SAFETY: size checked above; caller guarantees the signature matches.
        Ok(unsafe { std::mem::transmute_copy::<*mut c_void, T>(&ptr) })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Close the library. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            imp::close(handle);
            debug!(module = %self.path.display(), "shared library closed");
        }
    }
}

impl Drop for SharedLibrary {
    fn drop(&mut self) {
        self.close();
    }
}
