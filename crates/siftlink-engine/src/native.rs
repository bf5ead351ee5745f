//! Engine traits implemented over the dynamically loaded SiftGPU module.

use std::os::raw::c_int;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use siftlink_core::buffer::{DescriptorView, ImageView};
use siftlink_core::config::MatchParams;
use siftlink_core::error::{BridgeError, Result};
use siftlink_core::ffi_types::{
    DESCRIPTOR_DIM, EngineCapability, SiftGpuPtr, SiftMatchGpuPtr,
};
use siftlink_core::types::Keypoint;
use tracing::debug;

use crate::api::{EngineApi, module_candidates};
use crate::args::EngineArgs;
use crate::engine::{DescriptorMatcher, EngineBackend, EngineModule, FeatureEngine, MatchSlot};
use crate::gl::GlPlatform;
use crate::gl_native::load_native_gl;

/// Backend that loads the real module and the platform GL binding.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl EngineBackend for NativeBackend {
    fn load_module(&self, module: Option<&Path>) -> Result<Box<dyn EngineModule>> {
        let api = EngineApi::load(&module_candidates(module))?;
        Ok(Box::new(NativeModule {
            name: api.module_path().display().to_string(),
            api: Some(api),
        }))
    }

    fn gl_platform(&self) -> Result<Rc<dyn GlPlatform>> {
        load_native_gl()
    }
}

pub struct NativeModule {
    api: Option<Arc<EngineApi>>,
    name: String,
}

impl NativeModule {
    fn api(&self) -> Result<&Arc<EngineApi>> {
        self.api
            .as_ref()
            .ok_or_else(|| BridgeError::Load(format!("{} is unloaded", self.name)))
    }
}

impl EngineModule for NativeModule {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn create_engine(&self) -> Result<Box<dyn FeatureEngine>> {
        let api = Arc::clone(self.api()?);
        // SAFETY: factory resolved with its exact signature; `np` is unused
        // by the engine and passed as 1.
        let handle = unsafe { (api.create_sift_gpu)(1) };
        if handle.is_null() {
            return Err(BridgeError::Load(format!(
                "{} returned a null engine instance",
                crate::api::SYM_CREATE_SIFT_GPU
            )));
        }
        debug!(module = %self.name, "engine instance created");
        Ok(Box::new(NativeEngine { api, handle }))
    }

    fn create_matcher(&self, capacity: usize) -> Result<Box<dyn DescriptorMatcher>> {
        let api = Arc::clone(self.api()?);
        let max_sift = c_int::try_from(capacity).map_err(|_| {
            BridgeError::InvalidConfig(format!("matcher capacity {capacity} exceeds int range"))
        })?;
        // SAFETY: factory resolved with its exact signature.
        let handle = unsafe { (api.create_sift_match_gpu)(max_sift) };
        if handle.is_null() {
            return Err(BridgeError::Load(format!(
                "{} returned a null matcher instance",
                crate::api::SYM_CREATE_SIFT_MATCH_GPU
            )));
        }
        debug!(module = %self.name, capacity, "matcher instance created");
        Ok(Box::new(NativeMatcher {
            api,
            handle,
            capacity,
        }))
    }

    fn unload(&mut self) {
        if self.api.take().is_some() {
            debug!(module = %self.name, "module released");
        }
    }

    fn is_loaded(&self) -> bool {
        self.api.is_some()
    }
}

/// Owned `SiftGPU*`. Destroyed on drop.
pub struct NativeEngine {
    api: Arc<EngineApi>,
    handle: SiftGpuPtr,
}

impl FeatureEngine for NativeEngine {
    fn parse_args(&mut self, args: &EngineArgs) {
        let argv = args.argv();
        // SAFETY: argv points into `args`, alive for the whole call.
        unsafe { (self.api.methods.parse_param)(self.handle, args.argc(), argv.as_ptr()) };
    }

    fn create_context(&mut self) -> EngineCapability {
        // SAFETY: live handle.
        EngineCapability::from_raw(unsafe { (self.api.methods.create_context_gl)(self.handle) })
    }

    fn verify_context(&mut self) -> EngineCapability {
        // SAFETY: live handle.
        EngineCapability::from_raw(unsafe { (self.api.methods.verify_context_gl)(self.handle) })
    }

    fn run(&mut self, image: &ImageView<'_>) -> bool {
        let format = image.format();
        // SAFETY: the view was validated against its shape and element type,
        // so the engine reads exactly width * height pixels of that type.
        let ok = unsafe {
            (self.api.methods.run_sift)(
                self.handle,
                image.width(),
                image.height(),
                image.as_ptr(),
                format.gl_format,
                format.gl_type,
            )
        };
        ok != 0
    }

    fn feature_count(&self) -> i32 {
        // SAFETY: live handle.
        unsafe { (self.api.methods.get_feature_num)(self.handle) }
    }

    fn read_features(&mut self, keypoints: &mut [Keypoint], descriptors: &mut [f32]) -> Result<()> {
        let n = usize::try_from(self.feature_count()).unwrap_or(0);
        if keypoints.len() < n || descriptors.len() < n * DESCRIPTOR_DIM {
            return Err(BridgeError::EngineRuntime(format!(
                "feature buffers too small for {n} features"
            )));
        }
        // SAFETY: both buffers hold at least `n` records; Keypoint is
        // layout-compatible with the engine's keypoint struct.
        unsafe {
            (self.api.methods.get_feature_vector)(
                self.handle,
                keypoints.as_mut_ptr(),
                descriptors.as_mut_ptr(),
            )
        };
        Ok(())
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        // SAFETY: handle came from the factory and is destroyed once.
        unsafe { (self.api.methods.destroy_sift_gpu)(self.handle) };
        debug!("engine instance destroyed");
    }
}

/// Owned `SiftMatchGPU*`. Destroyed on drop.
pub struct NativeMatcher {
    api: Arc<EngineApi>,
    handle: SiftMatchGpuPtr,
    capacity: usize,
}

impl DescriptorMatcher for NativeMatcher {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn verify_context(&mut self) -> bool {
        // SAFETY: live handle.
        unsafe { (self.api.methods.match_verify_context_gl)(self.handle) != 0 }
    }

    fn set_descriptors(&mut self, slot: MatchSlot, descriptors: &DescriptorView<'_>) -> Result<()> {
        let rows = descriptors.rows();
        if rows > self.capacity {
            return Err(BridgeError::MatcherCapacityExceeded {
                requested: rows,
                capacity: self.capacity,
            });
        }
        // SAFETY: rows <= capacity <= c_int::MAX and the view holds
        // rows * 128 floats; id = -1 lets the engine skip its cache check.
        unsafe {
            (self.api.methods.match_set_descriptors)(
                self.handle,
                slot as c_int,
                rows as c_int,
                descriptors.as_ptr(),
                -1,
            )
        };
        Ok(())
    }

    fn get_matches(&mut self, out: &mut [[i32; 2]], params: &MatchParams) -> i32 {
        let max_match = c_int::try_from(out.len()).unwrap_or(c_int::MAX);
        // SAFETY: `out` holds `max_match` pairs.
        unsafe {
            (self.api.methods.match_get_sift_match)(
                self.handle,
                max_match,
                out.as_mut_ptr(),
                params.distance_max,
                params.ratio_max,
                c_int::from(params.mutual_best_match),
            )
        }
    }
}

impl Drop for NativeMatcher {
    fn drop(&mut self) {
        // SAFETY: handle came from the factory and is destroyed once.
        unsafe { (self.api.methods.destroy_sift_match_gpu)(self.handle) };
        debug!("matcher instance destroyed");
    }
}
