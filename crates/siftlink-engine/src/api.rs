//! Typed SiftGPU ABI table.
//!
//! All engine symbols are resolved here, once, into strongly-typed function
//! pointers. Nothing outside this module casts a raw symbol address.

use std::ffi::c_void;
use std::os::raw::{c_char, c_float, c_int, c_uint};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use siftlink_core::config::MODULE_ENV_VAR;
use siftlink_core::error::Result;
use siftlink_core::ffi_types::{SiftGpuPtr, SiftMatchGpuPtr};
use siftlink_core::types::Keypoint;
use tracing::info;

use crate::sys::SharedLibrary;

pub const SYM_CREATE_SIFT_GPU: &str = "CreateNewSiftGPU";
pub const SYM_CREATE_SIFT_MATCH_GPU: &str = "CreateNewSiftMatchGPU";

pub type CreateSiftGpuFn = unsafe extern "C" fn(np: c_int) -> SiftGpuPtr;
pub type CreateSiftMatchGpuFn = unsafe extern "C" fn(max_sift: c_int) -> SiftMatchGpuPtr;
pub type ParseParamFn = unsafe extern "C" fn(SiftGpuPtr, argc: c_int, argv: *const *const c_char);
pub type ContextProbeFn = unsafe extern "C" fn(SiftGpuPtr) -> c_int;
pub type RunSiftFn = unsafe extern "C" fn(
    SiftGpuPtr,
    width: c_int,
    height: c_int,
    data: *const c_void,
    gl_format: c_uint,
    gl_type: c_uint,
) -> c_int;
pub type GetFeatureNumFn = unsafe extern "C" fn(SiftGpuPtr) -> c_int;
pub type GetFeatureVectorFn =
    unsafe extern "C" fn(SiftGpuPtr, keys: *mut Keypoint, descriptors: *mut c_float);
pub type DestroySiftGpuFn = unsafe extern "C" fn(SiftGpuPtr);
pub type MatchVerifyContextFn = unsafe extern "C" fn(SiftMatchGpuPtr) -> c_int;
pub type SetDescriptorsFn = unsafe extern "C" fn(
    SiftMatchGpuPtr,
    index: c_int,
    num: c_int,
    descriptors: *const c_float,
    id: c_int,
);
pub type GetSiftMatchFn = unsafe extern "C" fn(
    SiftMatchGpuPtr,
    max_match: c_int,
    match_buffer: *mut [c_int; 2],
    distmax: c_float,
    ratiomax: c_float,
    mutual_best_match: c_int,
) -> c_int;
pub type DestroySiftMatchGpuFn = unsafe extern "C" fn(SiftMatchGpuPtr);

/// Instance-method entry points, one per engine call the bridge makes.
#[derive(Clone, Copy)]
pub struct MethodTable {
    pub parse_param: ParseParamFn,
    pub create_context_gl: ContextProbeFn,
    pub verify_context_gl: ContextProbeFn,
    pub run_sift: RunSiftFn,
    pub get_feature_num: GetFeatureNumFn,
    pub get_feature_vector: GetFeatureVectorFn,
    pub destroy_sift_gpu: DestroySiftGpuFn,
    pub match_verify_context_gl: MatchVerifyContextFn,
    pub match_set_descriptors: SetDescriptorsFn,
    pub match_get_sift_match: GetSiftMatchFn,
    pub destroy_sift_match_gpu: DestroySiftMatchGpuFn,
}

impl MethodTable {
    /// Flat `SiftGPU_*` / `SiftMatchGPU_*` exports carried by a module that
    /// bundles its own C wrapper.
    fn exported_by(library: &SharedLibrary) -> Result<Self> {
        // SAFETY: each type alias above matches the wrapper's C ABI.
        unsafe {
            Ok(Self {
                parse_param: library.symbol("SiftGPU_ParseParam")?,
                create_context_gl: library.symbol("SiftGPU_CreateContextGL")?,
                verify_context_gl: library.symbol("SiftGPU_VerifyContextGL")?,
                run_sift: library.symbol("SiftGPU_RunSIFT")?,
                get_feature_num: library.symbol("SiftGPU_GetFeatureNum")?,
                get_feature_vector: library.symbol("SiftGPU_GetFeatureVector")?,
                destroy_sift_gpu: library.symbol("SiftGPU_Destroy")?,
                match_verify_context_gl: library.symbol("SiftMatchGPU_VerifyContextGL")?,
                match_set_descriptors: library.symbol("SiftMatchGPU_SetDescriptors")?,
                match_get_sift_match: library.symbol("SiftMatchGPU_GetSiftMatch")?,
                destroy_sift_match_gpu: library.symbol("SiftMatchGPU_Destroy")?,
            })
        }
    }

    /// Entry points compiled into this crate from `shim/siftlink_shim.cpp`.
    /// They dispatch through the instance vtable, so a stock SiftGPU module
    /// only has to export its factories.
    #[cfg(siftlink_shim)]
    pub fn linked() -> Option<Self> {
        Some(Self {
            parse_param: shim::siftlink_sift_parse_param,
            create_context_gl: shim::siftlink_sift_create_context_gl,
            verify_context_gl: shim::siftlink_sift_verify_context_gl,
            run_sift: shim::siftlink_sift_run,
            get_feature_num: shim::siftlink_sift_feature_count,
            get_feature_vector: shim::siftlink_sift_feature_vector,
            destroy_sift_gpu: shim::siftlink_sift_destroy,
            match_verify_context_gl: shim::siftlink_match_verify_context_gl,
            match_set_descriptors: shim::siftlink_match_set_descriptors,
            match_get_sift_match: shim::siftlink_match_get_sift_match,
            destroy_sift_match_gpu: shim::siftlink_match_destroy,
        })
    }

    #[cfg(not(siftlink_shim))]
    pub fn linked() -> Option<Self> {
        None
    }
}

#[cfg(siftlink_shim)]
mod shim {
    use super::*;

    unsafe extern "C" {
        pub fn siftlink_sift_parse_param(p: SiftGpuPtr, argc: c_int, argv: *const *const c_char);
        pub fn siftlink_sift_create_context_gl(p: SiftGpuPtr) -> c_int;
        pub fn siftlink_sift_verify_context_gl(p: SiftGpuPtr) -> c_int;
        pub fn siftlink_sift_run(
            p: SiftGpuPtr,
            width: c_int,
            height: c_int,
            data: *const c_void,
            gl_format: c_uint,
            gl_type: c_uint,
        ) -> c_int;
        pub fn siftlink_sift_feature_count(p: SiftGpuPtr) -> c_int;
        pub fn siftlink_sift_feature_vector(
            p: SiftGpuPtr,
            keys: *mut Keypoint,
            descriptors: *mut c_float,
        );
        pub fn siftlink_sift_destroy(p: SiftGpuPtr);
        pub fn siftlink_match_verify_context_gl(p: SiftMatchGpuPtr) -> c_int;
        pub fn siftlink_match_set_descriptors(
            p: SiftMatchGpuPtr,
            index: c_int,
            num: c_int,
            descriptors: *const c_float,
            id: c_int,
        );
        pub fn siftlink_match_get_sift_match(
            p: SiftMatchGpuPtr,
            max_match: c_int,
            match_buffer: *mut [c_int; 2],
            distmax: c_float,
            ratiomax: c_float,
            mutual_best_match: c_int,
        ) -> c_int;
        pub fn siftlink_match_destroy(p: SiftMatchGpuPtr);
    }
}

/// Where an [`EngineApi`] found its instance methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodSource {
    /// The module exports the flat wrapper symbols.
    Module,
    /// The shim linked into this crate.
    Linked,
}

impl MethodSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Linked => "linked",
        }
    }
}

/// Module exports win; otherwise fall back to the linked shim. With neither,
/// the module's resolution error is reported.
fn select_methods(
    exported: Result<MethodTable>,
    linked: Option<MethodTable>,
) -> Result<(MethodTable, MethodSource)> {
    match (exported, linked) {
        (Ok(table), _) => Ok((table, MethodSource::Module)),
        (Err(_), Some(table)) => Ok((table, MethodSource::Linked)),
        (Err(err), None) => Err(err),
    }
}

/// Resolved engine entry points plus the library that backs them.
///
/// Instances are shared (`Arc`) by every engine/matcher created from them, so
/// the library stays mapped until the last instance is gone.
pub struct EngineApi {
    pub create_sift_gpu: CreateSiftGpuFn,
    pub create_sift_match_gpu: CreateSiftMatchGpuFn,
    pub methods: MethodTable,
    source: MethodSource,
    library: SharedLibrary,
}

impl EngineApi {
    /// Open the first loadable candidate and resolve the engine entry points.
    pub fn load(candidates: &[PathBuf]) -> Result<Arc<Self>> {
        let library = SharedLibrary::open_first(candidates)?;
        let api = Self::resolve(library)?;
        info!(
            module = %api.library.path().display(),
            methods = api.source.as_str(),
            "SiftGPU module loaded"
        );
        Ok(Arc::new(api))
    }

    /// Resolve both factories, then the instance methods. The library is
    /// closed again (by drop) if anything is missing.
    pub fn resolve(library: SharedLibrary) -> Result<Self> {
        // SAFETY: the factory aliases match SiftGPU's exported `extern "C"`
        // constructors.
        let (create_sift_gpu, create_sift_match_gpu) = unsafe {
            (
                library.symbol::<CreateSiftGpuFn>(SYM_CREATE_SIFT_GPU)?,
                library.symbol::<CreateSiftMatchGpuFn>(SYM_CREATE_SIFT_MATCH_GPU)?,
            )
        };
        let (methods, source) =
            select_methods(MethodTable::exported_by(&library), MethodTable::linked())?;
        Ok(Self {
            create_sift_gpu,
            create_sift_match_gpu,
            methods,
            source,
            library,
        })
    }

    #[inline]
    pub fn module_path(&self) -> &Path {
        self.library.path()
    }

    #[inline]
    pub fn method_source(&self) -> MethodSource {
        self.source
    }
}

/// Platform default names for the engine module.
pub fn default_module_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["SiftGPU.dll", "siftgpu.dll"]
    } else if cfg!(target_os = "macos") {
        &["libsiftgpu.dylib", "libSiftGPU.dylib"]
    } else {
        &["libsiftgpu.so", "libsiftgpu.so.1", "libSiftGPU.so"]
    }
}

/// Candidate module paths in resolution order: explicit path, then
/// `SIFTLINK_MODULE`, then the platform defaults.
pub fn module_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    module_candidates_with_env(explicit, std::env::var_os(MODULE_ENV_VAR).map(PathBuf::from))
}

fn module_candidates_with_env(explicit: Option<&Path>, env: Option<PathBuf>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    if let Some(path) = env.filter(|p| !p.as_os_str().is_empty()) {
        return vec![path];
    }
    default_module_names()
        .iter()
        .map(PathBuf::from)
        .collect()
}
