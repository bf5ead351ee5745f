//! Raw FFI types and constants shared by the engine boundary.
//!
//! Values mirror the OpenGL headers and the SiftGPU public header. Only the
//! subset the bridge passes across the ABI is defined here.

use std::ffi::c_void;
use std::os::raw::{c_int, c_uint};

/// Opaque `SiftGPU*` instance pointer.
pub type SiftGpuPtr = *mut c_void;
/// Opaque `SiftMatchGPU*` instance pointer.
pub type SiftMatchGpuPtr = *mut c_void;

pub type GLenum = c_uint;

pub const GL_LUMINANCE: GLenum = 0x1909;
pub const GL_UNSIGNED_BYTE: GLenum = 0x1401;
pub const GL_UNSIGNED_SHORT: GLenum = 0x1403;
pub const GL_FLOAT: GLenum = 0x1406;

/// Width of every SIFT descriptor produced or consumed by the engine.
pub const DESCRIPTOR_DIM: usize = 128;

/// Feature cap the engine documents as its maximum; used to size the matcher
/// when the session is configured with an unbounded feature count.
pub const ENGINE_MAX_FEATURES: usize = 4096;

/// `SiftGPU::SIFTGPU_*_SUPPORTED` codes returned by the context probes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineCapability {
    NotSupported,
    /// Detection works, orientation/descriptor do not.
    PartialSupported,
    FullSupported,
}

impl EngineCapability {
    pub fn from_raw(code: c_int) -> Self {
        match code {
            2 => Self::FullSupported,
            1 => Self::PartialSupported,
            _ => Self::NotSupported,
        }
    }

    #[inline]
    pub fn is_full(self) -> bool {
        matches!(self, Self::FullSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::EngineCapability;

    #[test]
    fn only_code_two_is_full_support() {
        assert!(EngineCapability::from_raw(2).is_full());
        assert_eq!(
            EngineCapability::from_raw(1),
            EngineCapability::PartialSupported
        );
        assert_eq!(EngineCapability::from_raw(0), EngineCapability::NotSupported);
        assert_eq!(EngineCapability::from_raw(-7), EngineCapability::NotSupported);
    }
}
