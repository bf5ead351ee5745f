//! Session state machine.
//!
//! A [`Session`] is the sole owner of the loaded module, the engine and
//! matcher instances, the match scratch buffer, and the context arbiter.
//!
//! ```text
//!                configure ok
//!  Uninitialized ────────────▶ Ready
//!        ▲  │ configure: capability/GL failure      │
//!        │  └──────────────▶ Failed                  │
//!        └──────── teardown (from any state) ◀───────┘
//! ```
//!
//! `configure` always tears down first, so configuration is never additive.

use siftlink_core::buffer::{validate_descriptor_pair, validate_image};
use siftlink_core::config::{
    MatchParams, SessionConfig, validate_match_params, validate_session_config,
};
use siftlink_core::error::{BridgeError, Result};
use siftlink_core::ffi_types::DESCRIPTOR_DIM;
use siftlink_core::types::{DescriptorMatrix, Features, HostArray, Keypoint, MatchResult};
use siftlink_engine::{
    ContextArbiter, DescriptorMatcher, EngineArgs, EngineBackend, EngineModule, FeatureEngine,
    MatchSlot, NativeBackend,
};
use tracing::{debug, error, info, warn};

use crate::matching::{MatchScratch, unpack_matches};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No handles held.
    Uninitialized,
    /// Engine live and context arbiter armed.
    Ready,
    /// The last configure reached the GPU and was refused.
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// One engine session. Not `Send`: it is bound to the thread whose GL
/// context it arbitrates.
pub struct Session {
    backend: Box<dyn EngineBackend>,
    state: SessionState,
    config: Option<SessionConfig>,
    module: Option<Box<dyn EngineModule>>,
    engine: Option<Box<dyn FeatureEngine>>,
    matcher: Option<Box<dyn DescriptorMatcher>>,
    scratch: Option<MatchScratch>,
    arbiter: Option<ContextArbiter>,
}

impl Session {
    pub fn new(backend: Box<dyn EngineBackend>) -> Self {
        Self {
            backend,
            state: SessionState::Uninitialized,
            config: None,
            module: None,
            engine: None,
            matcher: None,
            scratch: None,
            arbiter: None,
        }
    }

    /// Session over the dynamically loaded SiftGPU module.
    pub fn native() -> Self {
        Self::new(Box::new(NativeBackend))
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configuration of the current (or last failed) session.
    #[inline]
    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    #[inline]
    pub fn has_matcher(&self) -> bool {
        self.matcher.is_some()
    }

    /// Whether engine calls run on a dedicated context beside the caller's.
    pub fn shares_caller_context(&self) -> bool {
        self.arbiter.as_ref().is_some_and(ContextArbiter::is_shared)
    }

    pub fn module_name(&self) -> Option<String> {
        self.module.as_ref().map(|m| m.name())
    }

    /// Tear down any previous session and bring up a new one.
    ///
    /// On error the session holds no handles. It is `Failed` when the GPU
    /// refused the context and `Uninitialized` otherwise.
    pub fn configure(&mut self, config: SessionConfig) -> Result<()> {
        self.teardown();
        match self.try_configure(&config) {
            Ok(()) => {
                info!(
                    max_features = config.max_features,
                    octave_layers = config.octave_layers,
                    contrast_threshold = config.contrast_threshold,
                    edge_threshold = config.edge_threshold,
                    shared_context = config.share_caller_context,
                    matching = self.matcher.is_some(),
                    "session ready"
                );
                self.state = SessionState::Ready;
                self.config = Some(config);
                Ok(())
            }
            Err(err) => {
                self.release_handles();
                self.state = match err {
                    BridgeError::Capability(_) | BridgeError::Gl(_) => SessionState::Failed,
                    _ => SessionState::Uninitialized,
                };
                error!(
                    error = %err,
                    code = err.error_code(),
                    state = self.state.as_str(),
                    "abort: session configuration failed"
                );
                if self.state == SessionState::Failed {
                    self.config = Some(config);
                }
                Err(err)
            }
        }
    }

    fn try_configure(&mut self, cfg: &SessionConfig) -> Result<()> {
        validate_session_config(cfg)?;

        let module = self
            .module
            .insert(self.backend.load_module(cfg.module.as_deref())?);
        info!(module = %module.name(), "engine module loaded");

        let engine = self.engine.insert(module.create_engine()?);
        let args = EngineArgs::from_config(cfg)?;
        debug!(argv = ?args.to_strings(), "engine arguments");
        engine.parse_args(&args);

        let arbiter = if cfg.share_caller_context {
            let arbiter = self
                .arbiter
                .insert(ContextArbiter::shared(self.backend.gl_platform()?)?);
            let _guard = arbiter.enter()?;
            let capability = engine.verify_context();
            if !capability.is_full() {
                return Err(BridgeError::Capability(format!(
                    "engine reports {capability:?} on the dedicated context"
                )));
            }
            arbiter
        } else {
            let capability = engine.create_context();
            if !capability.is_full() {
                return Err(BridgeError::Capability(format!(
                    "engine reports {capability:?} on its own context"
                )));
            }
            self.arbiter.insert(ContextArbiter::owned())
        };

        if cfg.enable_matching {
            let capacity = cfg.matcher_capacity();
            let matcher = self.matcher.insert(module.create_matcher(capacity)?);
            let _guard = arbiter.enter()?;
            if !matcher.verify_context() {
                return Err(BridgeError::Capability(
                    "matcher rejected the GL context".into(),
                ));
            }
            self.scratch = Some(MatchScratch::new(capacity));
        }
        Ok(())
    }

    /// Release everything and return to `Uninitialized`. Idempotent.
    pub fn teardown(&mut self) {
        let had_session = self.release_handles();
        self.state = SessionState::Uninitialized;
        self.config = None;
        if had_session {
            info!("session torn down");
        }
    }

    /// Scratch, matcher, engine (under the engine context), context, module.
    fn release_handles(&mut self) -> bool {
        let had_any = self.module.is_some()
            || self.engine.is_some()
            || self.matcher.is_some()
            || self.arbiter.is_some();

        self.scratch = None;
        {
            let _guard = match self.arbiter.as_ref().map(ContextArbiter::enter).transpose() {
                Ok(guard) => guard,
                Err(err) => {
                    warn!(error = %err, "releasing engine without its context current");
                    None
                }
            };
            self.matcher = None;
            self.engine = None;
        }
        if let Some(mut arbiter) = self.arbiter.take() {
            arbiter.release();
        }
        if let Some(mut module) = self.module.take() {
            module.unload();
        }
        had_any
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state != SessionState::Ready {
            return Err(BridgeError::NotInitialized);
        }
        Ok(())
    }

    /// Detect keypoints and compute descriptors on a single-channel image.
    ///
    /// Zero detected features is an empty [`Features`], not an error. On any
    /// error nothing is returned.
    pub fn detect_and_compute(&mut self, image: &HostArray<'_>) -> Result<Features> {
        self.ensure_ready()?;
        let view = validate_image(image)?;
        let (Some(engine), Some(arbiter)) = (self.engine.as_mut(), self.arbiter.as_ref()) else {
            return Err(BridgeError::NotInitialized);
        };

        let _guard = arbiter.enter()?;
        let capability = engine.verify_context();
        debug!(?capability, "engine context probe");
        if !engine.run(&view) {
            return Err(BridgeError::EngineRuntime(format!(
                "engine rejected {}x{} image",
                view.width(),
                view.height()
            )));
        }

        let count = engine.feature_count();
        if count <= 0 {
            debug!(count, "no features detected");
            return Ok(Features::empty());
        }
        let n = count as usize;
        let mut keypoints = vec![Keypoint::default(); n];
        let mut descriptors = vec![0f32; n * DESCRIPTOR_DIM];
        engine.read_features(&mut keypoints, &mut descriptors)?;
        debug!(features = n, "features read back");
        Ok(Features {
            keypoints,
            descriptors: DescriptorMatrix::from_flat(descriptors, n)?,
        })
    }

    /// Match two `[N, 128]` float32 descriptor sets.
    ///
    /// Requests at most `min(|A|, |B|)` pairs; every returned index is within
    /// its set.
    pub fn match_descriptors(
        &mut self,
        a: &HostArray<'_>,
        b: &HostArray<'_>,
        params: &MatchParams,
    ) -> Result<MatchResult> {
        self.ensure_ready()?;
        let (Some(matcher), Some(scratch), Some(arbiter)) = (
            self.matcher.as_mut(),
            self.scratch.as_mut(),
            self.arbiter.as_ref(),
        ) else {
            return Err(BridgeError::MatcherUnavailable);
        };
        let (va, vb) = validate_descriptor_pair(a, b)?;
        validate_match_params(params)?;
        let capacity = scratch.capacity();
        for rows in [va.rows(), vb.rows()] {
            if rows > capacity {
                return Err(BridgeError::MatcherCapacityExceeded {
                    requested: rows,
                    capacity,
                });
            }
        }
        let requested = va.rows().min(vb.rows());
        let out = scratch.request(requested)?;

        let _guard = arbiter.enter()?;
        matcher.set_descriptors(MatchSlot::A, &va)?;
        matcher.set_descriptors(MatchSlot::B, &vb)?;
        let count = matcher.get_matches(out, params);
        let result = unpack_matches(out, count, va.rows(), vb.rows())?;
        debug!(
            rows_a = va.rows(),
            rows_b = vb.rows(),
            matches = result.len(),
            "descriptors matched"
        );
        Ok(result)
    }

    /// [`match_descriptors`](Self::match_descriptors) over two detection results.
    pub fn match_features(
        &mut self,
        a: &Features,
        b: &Features,
        params: &MatchParams,
    ) -> Result<MatchResult> {
        self.match_descriptors(
            &a.descriptors.as_host_array(),
            &b.descriptors.as_host_array(),
            params,
        )
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("module", &self.module_name())
            .field("has_matcher", &self.has_matcher())
            .field("shared_context", &self.shares_caller_context())
            .finish()
    }
}
