//! Host-facing buffer views and engine result types.
//!
//! # Ownership
//!
//! [`HostArray`] borrows caller memory and never copies it. Results returned
//! by the session ([`Features`], [`MatchResult`]) own their storage; the
//! descriptor matrix is a shaped view over the exact flat buffer the engine
//! wrote into.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::ffi_types::DESCRIPTOR_DIM;

// ─── Element types ───────────────────────────────────────────────────────

/// Element type tag of a host array.
///
/// Covers the numeric kinds a host tensor library commonly hands over so the
/// validator can name what it rejected. Only `Uint8`, `Uint16` and `Float32`
/// are accepted for images, and only `Float32` for descriptors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float16,
    Float32,
    Float64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 | Self::Float16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Uint64 | Self::Float64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rust scalar types that can back a [`HostArray`].
pub trait HostElement: Pod {
    const ELEMENT_TYPE: ElementType;
}

macro_rules! host_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl HostElement for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$tag;
        })*
    };
}

host_element! {
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
}

// ─── Host array view ─────────────────────────────────────────────────────

/// Borrowed view over caller-owned, C-contiguous array memory.
///
/// This is the host tensor contract: a byte range, a shape, and an element
/// type. Construction checks nothing beyond what is needed to keep the view
/// memory-safe; shape/type validation belongs to [`crate::buffer`].
#[derive(Clone, Debug)]
pub struct HostArray<'a> {
    bytes: &'a [u8],
    shape: Vec<usize>,
    dtype: ElementType,
}

impl<'a> HostArray<'a> {
    /// View a typed slice with the given shape.
    pub fn from_slice<T: HostElement>(data: &'a [T], shape: &[usize]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data),
            shape: shape.to_vec(),
            dtype: T::ELEMENT_TYPE,
        }
    }

    /// View untyped bytes tagged with an element type.
    pub fn from_bytes(bytes: &'a [u8], shape: &[usize], dtype: ElementType) -> Self {
        Self {
            bytes,
            shape: shape.to_vec(),
            dtype,
        }
    }

    /// View foreign memory described by pointer, shape and element type.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `product(shape) * dtype.size_bytes()`
    /// bytes for `'a`, and the memory must not be mutated while the view lives.
    pub unsafe fn from_raw_parts(ptr: *const u8, shape: &[usize], dtype: ElementType) -> Self {
        let len = shape
            .iter()
            .try_fold(dtype.size_bytes(), |acc, &d| acc.checked_mul(d))
            .unwrap_or(0);
        let bytes = if ptr.is_null() || len == 0 {
            &[][..]
        } else {
            // SAFETY: caller guarantees `ptr` is readable for `len` bytes for `'a`.
            unsafe { std::slice::from_raw_parts(ptr, len) }
        };
        Self {
            bytes,
            shape: shape.to_vec(),
            dtype,
        }
    }

    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn dtype(&self) -> ElementType {
        self.dtype
    }
}

// ─── Detection results ───────────────────────────────────────────────────

/// One detected feature: location, scale and orientation.
///
/// Layout-compatible with the engine's `SiftKeypoint {x, y, s, o}` so the
/// engine writes directly into a `Vec<Keypoint>`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub orientation: f32,
}

/// Row-major `[rows, 128]` descriptor matrix over a flat buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DescriptorMatrix {
    rows: usize,
    data: Vec<f32>,
}

impl DescriptorMatrix {
    /// Reshape a flat `rows × 128` buffer into a matrix without copying.
    pub fn from_flat(data: Vec<f32>, rows: usize) -> Result<Self> {
        let expected = rows.checked_mul(DESCRIPTOR_DIM).ok_or_else(|| {
            BridgeError::InvalidDescriptorShape(format!("{rows} rows overflow"))
        })?;
        if data.len() != expected {
            return Err(BridgeError::InvalidDescriptorShape(format!(
                "flat buffer of {} floats cannot be reshaped to [{rows}, {DESCRIPTOR_DIM}]",
                data.len()
            )));
        }
        Ok(Self { rows, data })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, DESCRIPTOR_DIM]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Descriptor `i`, or `None` when out of range.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        let start = i.checked_mul(DESCRIPTOR_DIM)?;
        let end = start.checked_add(DESCRIPTOR_DIM)?;
        self.data.get(start..end)
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(DESCRIPTOR_DIM)
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Borrow as a host array, e.g. to feed back into matching.
    pub fn as_host_array(&self) -> HostArray<'_> {
        HostArray::from_slice(&self.data, &[self.rows, DESCRIPTOR_DIM])
    }
}

/// Output of one detect-and-compute call.
///
/// `keypoints[i]` and `descriptors.row(i)` describe the same feature.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: DescriptorMatrix,
}

impl Features {
    /// Zero features detected. A defined result, not an error.
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

// ─── Match results ───────────────────────────────────────────────────────

/// Parallel index sequences: `indices_a[k]` matches `indices_b[k]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub indices_a: Vec<u32>,
    pub indices_b: Vec<u32>,
}

impl MatchResult {
    #[inline]
    pub fn len(&self) -> usize {
        self.indices_a.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices_a.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.indices_a
            .iter()
            .copied()
            .zip(self.indices_b.iter().copied())
    }
}
