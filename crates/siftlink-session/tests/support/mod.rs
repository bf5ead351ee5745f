//! In-process engine, matcher and GL doubles shared by the session tests.
//!
//! Every double reports into one [`World`] so a test can assert on the exact
//! sequence of GPU-side calls and on which context was current for each.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use siftlink_core::buffer::{DescriptorView, ImageView};
use siftlink_core::config::MatchParams;
use siftlink_core::error::{BridgeError, Result};
use siftlink_core::ffi_types::{DESCRIPTOR_DIM, EngineCapability};
use siftlink_core::types::Keypoint;
use siftlink_engine::{
    DescriptorMatcher, EngineArgs, EngineBackend, EngineModule, FeatureEngine, GlBinding,
    GlContext, GlPlatform, GlSurface, MatchSlot,
};
use siftlink_session::Session;

pub const CALLER: GlBinding = GlBinding {
    surface: GlSurface {
        display: 0xd15,
        drawable: 0xd4a,
    },
    context: GlContext(0xc0),
};

/// The engine's own context in owned mode.
pub const ENGINE_OWNED: GlContext = GlContext(0xe0);

pub struct World {
    pub events: RefCell<Vec<String>>,
    pub gpu_calls: Cell<usize>,
    pub current: Cell<GlBinding>,
    pub next_context: Cell<usize>,
    pub contexts_created: Cell<usize>,
    pub contexts_destroyed: Cell<usize>,
    pub live_modules: Cell<isize>,
    pub live_engines: Cell<isize>,
    pub live_matchers: Cell<isize>,
    pub parsed_args: RefCell<Vec<Vec<String>>>,
    pub matcher_capacities: RefCell<Vec<usize>>,
    pub max_match_requests: RefCell<Vec<usize>>,
    pub contexts_during_calls: RefCell<Vec<GlContext>>,

    pub fail_load: Cell<bool>,
    pub capability: Cell<EngineCapability>,
    pub matcher_verifies: Cell<bool>,
    pub run_ok: Cell<bool>,
    pub features: Cell<i32>,
    pub match_count: Cell<Option<i32>>,
    pub match_pair: Cell<Option<[i32; 2]>>,
    pub fail_create_context: Cell<bool>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            events: RefCell::default(),
            gpu_calls: Cell::new(0),
            current: Cell::new(CALLER),
            next_context: Cell::new(0x100),
            contexts_created: Cell::new(0),
            contexts_destroyed: Cell::new(0),
            live_modules: Cell::new(0),
            live_engines: Cell::new(0),
            live_matchers: Cell::new(0),
            parsed_args: RefCell::default(),
            matcher_capacities: RefCell::default(),
            max_match_requests: RefCell::default(),
            contexts_during_calls: RefCell::default(),
            fail_load: Cell::new(false),
            capability: Cell::new(EngineCapability::FullSupported),
            matcher_verifies: Cell::new(true),
            run_ok: Cell::new(true),
            features: Cell::new(3),
            match_count: Cell::new(None),
            match_pair: Cell::new(None),
            fail_create_context: Cell::new(false),
        }
    }
}

impl World {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn log(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }

    fn gpu_call(&self) {
        self.gpu_calls.set(self.gpu_calls.get() + 1);
        self.contexts_during_calls
            .borrow_mut()
            .push(self.current.get().context);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    /// Nothing created by the backend is still alive.
    pub fn assert_nothing_live(&self) {
        assert_eq!(self.live_modules.get(), 0, "module leaked");
        assert_eq!(self.live_engines.get(), 0, "engine leaked");
        assert_eq!(self.live_matchers.get(), 0, "matcher leaked");
        assert_eq!(
            self.contexts_created.get(),
            self.contexts_destroyed.get(),
            "GL context leaked"
        );
    }
}

fn bump(cell: &Cell<isize>, by: isize) {
    cell.set(cell.get() + by);
}

// ─── Backend / module ───────────────────────────────────────────────────

pub struct FakeBackend(pub Rc<World>);

impl EngineBackend for FakeBackend {
    fn load_module(&self, module: Option<&Path>) -> Result<Box<dyn EngineModule>> {
        if self.0.fail_load.get() {
            return Err(BridgeError::Load(format!(
                "{}: cannot open shared object file",
                module.map_or("libsiftgpu.so".into(), |p| p.display().to_string())
            )));
        }
        bump(&self.0.live_modules, 1);
        self.0.log("module.load");
        Ok(Box::new(FakeModule {
            world: Rc::clone(&self.0),
            loaded: true,
        }))
    }

    fn gl_platform(&self) -> Result<Rc<dyn GlPlatform>> {
        Ok(Rc::new(FakeGl(Rc::clone(&self.0))))
    }
}

pub struct FakeModule {
    world: Rc<World>,
    loaded: bool,
}

impl EngineModule for FakeModule {
    fn name(&self) -> String {
        "fake-siftgpu".into()
    }

    fn create_engine(&self) -> Result<Box<dyn FeatureEngine>> {
        bump(&self.world.live_engines, 1);
        self.world.log("engine.create");
        Ok(Box::new(FakeEngine {
            world: Rc::clone(&self.world),
            last_count: 0,
        }))
    }

    fn create_matcher(&self, capacity: usize) -> Result<Box<dyn DescriptorMatcher>> {
        bump(&self.world.live_matchers, 1);
        self.world.matcher_capacities.borrow_mut().push(capacity);
        self.world.log("matcher.create");
        Ok(Box::new(FakeMatcher {
            world: Rc::clone(&self.world),
            capacity,
            rows: [0, 0],
        }))
    }

    fn unload(&mut self) {
        if self.loaded {
            self.loaded = false;
            bump(&self.world.live_modules, -1);
            self.world.log("module.unload");
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }
}

impl Drop for FakeModule {
    fn drop(&mut self) {
        self.unload();
    }
}

// ─── Engine ─────────────────────────────────────────────────────────────

pub struct FakeEngine {
    world: Rc<World>,
    last_count: i32,
}

impl FeatureEngine for FakeEngine {
    fn parse_args(&mut self, args: &EngineArgs) {
        self.world.parsed_args.borrow_mut().push(args.to_strings());
    }

    fn create_context(&mut self) -> EngineCapability {
        self.world.gpu_call();
        self.world
            .current
            .set(CALLER.with_context(ENGINE_OWNED));
        self.world.capability.get()
    }

    fn verify_context(&mut self) -> EngineCapability {
        self.world.gpu_call();
        self.world.capability.get()
    }

    fn run(&mut self, image: &ImageView<'_>) -> bool {
        self.world.gpu_call();
        self.world
            .log(format!("engine.run {}x{}", image.width(), image.height()));
        if self.world.run_ok.get() {
            self.last_count = self.world.features.get();
            true
        } else {
            self.last_count = 0;
            false
        }
    }

    fn feature_count(&self) -> i32 {
        self.last_count
    }

    fn read_features(&mut self, keypoints: &mut [Keypoint], descriptors: &mut [f32]) -> Result<()> {
        let n = self.last_count.max(0) as usize;
        assert_eq!(keypoints.len(), n, "keypoint buffer sized to feature count");
        assert_eq!(descriptors.len(), n * DESCRIPTOR_DIM, "descriptor buffer sized to n x 128");
        for (i, kp) in keypoints.iter_mut().enumerate() {
            *kp = Keypoint {
                x: 32.0 + i as f32,
                y: 32.0,
                scale: 2.0,
                orientation: 0.5,
            };
        }
        for (i, row) in descriptors.chunks_exact_mut(DESCRIPTOR_DIM).enumerate() {
            row.fill(i as f32);
        }
        Ok(())
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        bump(&self.world.live_engines, -1);
        let ctx = self.world.current.get().context;
        self.world.log(format!("engine.destroy on {:#x}", ctx.0));
    }
}

// ─── Matcher ────────────────────────────────────────────────────────────

pub struct FakeMatcher {
    world: Rc<World>,
    capacity: usize,
    rows: [usize; 2],
}

impl DescriptorMatcher for FakeMatcher {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn verify_context(&mut self) -> bool {
        self.world.gpu_call();
        self.world.matcher_verifies.get()
    }

    fn set_descriptors(&mut self, slot: MatchSlot, descriptors: &DescriptorView<'_>) -> Result<()> {
        self.world.gpu_call();
        self.rows[slot as usize] = descriptors.rows();
        Ok(())
    }

    fn get_matches(&mut self, out: &mut [[i32; 2]], _params: &MatchParams) -> i32 {
        self.world.gpu_call();
        self.world.max_match_requests.borrow_mut().push(out.len());
        if let Some(pair) = self.world.match_pair.get() {
            if let Some(first) = out.first_mut() {
                *first = pair;
            }
            return 1;
        }
        // Identity matches: descriptor k of A pairs with descriptor k of B.
        for (k, slot) in out.iter_mut().enumerate() {
            *slot = [k as i32, k as i32];
        }
        self.world.match_count.get().unwrap_or(out.len() as i32)
    }
}

impl Drop for FakeMatcher {
    fn drop(&mut self) {
        bump(&self.world.live_matchers, -1);
        let ctx = self.world.current.get().context;
        self.world.log(format!("matcher.destroy on {:#x}", ctx.0));
    }
}

// ─── GL ─────────────────────────────────────────────────────────────────

pub struct FakeGl(pub Rc<World>);

impl GlPlatform for FakeGl {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn current(&self) -> GlBinding {
        self.0.current.get()
    }

    fn make_current(&self, binding: GlBinding) -> Result<()> {
        self.0.current.set(binding);
        Ok(())
    }

    fn create_context(&self, _template: &GlBinding) -> Result<GlContext> {
        if self.0.fail_create_context.get() {
            return Err(BridgeError::Gl("glXCreateNewContext failed".into()));
        }
        let ctx = GlContext(self.0.next_context.get());
        self.0.next_context.set(ctx.0 + 1);
        self.0.contexts_created.set(self.0.contexts_created.get() + 1);
        self.0.log(format!("gl.create {:#x}", ctx.0));
        Ok(ctx)
    }

    fn destroy_context(&self, _template: &GlBinding, context: GlContext) {
        self.0
            .contexts_destroyed
            .set(self.0.contexts_destroyed.get() + 1);
        self.0.log(format!("gl.destroy {:#x}", context.0));
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

pub fn session(world: &Rc<World>) -> Session {
    Session::new(Box::new(FakeBackend(Rc::clone(world))))
}

/// 64x64 image with one bright blob in the middle.
pub fn blob_image() -> Vec<u8> {
    let mut img = vec![0u8; 64 * 64];
    for y in 28..36 {
        for x in 28..36 {
            img[y * 64 + x] = 255;
        }
    }
    img
}

pub fn descriptors(rows: usize) -> Vec<f32> {
    (0..rows * DESCRIPTOR_DIM).map(|v| v as f32 / 1024.0).collect()
}
