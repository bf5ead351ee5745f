//! Host buffer validation.
//!
//! Turns a [`HostArray`] into the pointer + format tuple the engine consumes.
//! Nothing here copies pixel or descriptor data.

use std::ffi::c_void;
use std::os::raw::c_int;

use crate::error::{BridgeError, Result};
use crate::ffi_types::{
    DESCRIPTOR_DIM, GL_FLOAT, GL_LUMINANCE, GL_UNSIGNED_BYTE, GL_UNSIGNED_SHORT, GLenum,
};
use crate::types::{ElementType, HostArray};

/// `glTexImage2D`-style format/type pair describing image memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelFormat {
    pub gl_format: GLenum,
    pub gl_type: GLenum,
}

impl PixelFormat {
    /// Single-channel format for a supported element type.
    pub fn luminance(dtype: ElementType) -> Result<Self> {
        let gl_type = match dtype {
            ElementType::Uint8 => GL_UNSIGNED_BYTE,
            ElementType::Uint16 => GL_UNSIGNED_SHORT,
            ElementType::Float32 => GL_FLOAT,
            other => return Err(BridgeError::UnsupportedElementType(other)),
        };
        Ok(Self {
            gl_format: GL_LUMINANCE,
            gl_type,
        })
    }
}

/// Validated single-channel image ready for the engine.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    bytes: &'a [u8],
    height: c_int,
    width: c_int,
    format: PixelFormat,
}

impl ImageView<'_> {
    #[inline]
    pub fn width(&self) -> c_int {
        self.width
    }

    #[inline]
    pub fn height(&self) -> c_int {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn as_ptr(&self) -> *const c_void {
        self.bytes.as_ptr().cast()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}

/// Validated `[rows, 128]` float32 descriptor set.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorView<'a> {
    bytes: &'a [u8],
    rows: usize,
}

impl DescriptorView<'_> {
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Start of the row-major float data. May be unaligned if the host handed
    /// over unaligned bytes; it is only ever passed to the engine.
    #[inline]
    pub fn as_ptr(&self) -> *const f32 {
        self.bytes.as_ptr().cast()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}

fn expected_len(shape: &[usize], dtype: ElementType) -> Option<usize> {
    shape
        .iter()
        .try_fold(dtype.size_bytes(), |acc, &d| acc.checked_mul(d))
}

fn check_len(array: &HostArray<'_>) -> Result<()> {
    let actual = array.bytes().len();
    let expected = expected_len(array.shape(), array.dtype()).ok_or(
        BridgeError::BufferSizeMismatch {
            expected: usize::MAX,
            actual,
        },
    )?;
    if expected != actual {
        return Err(BridgeError::BufferSizeMismatch { expected, actual });
    }
    Ok(())
}

/// Validate a host image for detection.
///
/// Rank must be exactly 2; rank 3 is a multi-channel image and is rejected.
pub fn validate_image<'a>(image: &HostArray<'a>) -> Result<ImageView<'a>> {
    if image.rank() != 2 {
        return Err(BridgeError::UnsupportedRank { rank: image.rank() });
    }
    let format = PixelFormat::luminance(image.dtype())?;
    let (h, w) = (image.shape()[0], image.shape()[1]);
    if h == 0 || w == 0 {
        return Err(BridgeError::EmptyImage {
            height: h,
            width: w,
        });
    }
    check_len(image)?;
    let to_int = |d: usize| {
        c_int::try_from(d).map_err(|_| BridgeError::BufferSizeMismatch {
            expected: c_int::MAX as usize,
            actual: d,
        })
    };
    Ok(ImageView {
        bytes: image.bytes(),
        height: to_int(h)?,
        width: to_int(w)?,
        format,
    })
}

/// Validate one descriptor set: rank 2, width 128, at least one row, float32.
pub fn validate_descriptors<'a>(desc: &HostArray<'a>) -> Result<DescriptorView<'a>> {
    if desc.rank() != 2 {
        return Err(BridgeError::InvalidDescriptorShape(format!(
            "expected rank 2, got rank {}",
            desc.rank()
        )));
    }
    let (rows, cols) = (desc.shape()[0], desc.shape()[1]);
    if cols != DESCRIPTOR_DIM {
        return Err(BridgeError::InvalidDescriptorShape(format!(
            "expected {DESCRIPTOR_DIM} columns, got {cols}"
        )));
    }
    if rows == 0 {
        return Err(BridgeError::InvalidDescriptorShape(
            "descriptor set has no rows".into(),
        ));
    }
    if desc.dtype() != ElementType::Float32 {
        return Err(BridgeError::UnsupportedElementType(desc.dtype()));
    }
    check_len(desc)?;
    if c_int::try_from(rows).is_err() {
        return Err(BridgeError::InvalidDescriptorShape(format!(
            "{rows} rows exceed the engine's index range"
        )));
    }
    Ok(DescriptorView {
        bytes: desc.bytes(),
        rows,
    })
}

/// Validate both sides of a match request.
pub fn validate_descriptor_pair<'a, 'b>(
    a: &HostArray<'a>,
    b: &HostArray<'b>,
) -> Result<(DescriptorView<'a>, DescriptorView<'b>)> {
    Ok((validate_descriptors(a)?, validate_descriptors(b)?))
}
