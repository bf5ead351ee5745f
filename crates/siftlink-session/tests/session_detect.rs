mod support;

use proptest::prelude::*;
use siftlink_core::error::BridgeError;
use siftlink_core::ffi_types::DESCRIPTOR_DIM;
use siftlink_session::{ElementType, HostArray, Session, SessionConfig, SessionState};
use support::{CALLER, World, blob_image, session};

fn ready(world: &std::rc::Rc<World>, share: bool) -> Session {
    let mut s = session(world);
    s.configure(SessionConfig {
        max_features: 100,
        octave_layers: 3,
        contrast_threshold: 0.02,
        edge_threshold: 8.0,
        share_caller_context: share,
        ..SessionConfig::default()
    })
    .expect("configure");
    world.gpu_calls.set(0);
    world.contexts_during_calls.borrow_mut().clear();
    s
}

#[test]
fn detect_before_configure_is_not_initialized() {
    let world = World::new();
    let mut s = session(&world);
    let img = blob_image();
    let err = s
        .detect_and_compute(&HostArray::from_slice(&img, &[64, 64]))
        .expect_err("not configured");
    assert!(matches!(err, BridgeError::NotInitialized));
    assert_eq!(world.gpu_calls.get(), 0);
    assert!(world.events().is_empty());
}

#[test]
fn detect_after_failed_configure_is_not_initialized() {
    let world = World::new();
    world
        .capability
        .set(siftlink_core::ffi_types::EngineCapability::NotSupported);
    let mut s = session(&world);
    s.configure(SessionConfig::default()).expect_err("unsupported");
    assert_eq!(s.state(), SessionState::Failed);
    world.gpu_calls.set(0);
    let img = blob_image();
    let err = s
        .detect_and_compute(&HostArray::from_slice(&img, &[64, 64]))
        .expect_err("failed session");
    assert!(matches!(err, BridgeError::NotInitialized));
    assert_eq!(world.gpu_calls.get(), 0);
}

#[test]
fn single_blob_yields_one_keypoint_near_center() {
    let world = World::new();
    world.features.set(1);
    let mut s = ready(&world, false);
    let img = blob_image();
    let features = s
        .detect_and_compute(&HostArray::from_slice(&img, &[64, 64]))
        .expect("detect");
    assert_eq!(features.len(), 1);
    assert_eq!(features.descriptors.shape(), [1, DESCRIPTOR_DIM]);
    let kp = features.keypoints[0];
    assert!((kp.x - 32.0).abs() < 2.0 && (kp.y - 32.0).abs() < 2.0);
    assert_eq!(world.events().last().map(String::as_str), Some("engine.run 64x64"));
}

#[test]
fn descriptors_pair_with_keypoints_by_index() {
    let world = World::new();
    world.features.set(5);
    let mut s = ready(&world, false);
    let img = vec![0u16; 48 * 80];
    let features = s
        .detect_and_compute(&HostArray::from_slice(&img, &[48, 80]))
        .expect("detect");
    assert_eq!(features.keypoints.len(), features.descriptors.rows());
    for (i, row) in features.descriptors.iter_rows().enumerate() {
        assert_eq!(row.len(), DESCRIPTOR_DIM);
        assert!(row.iter().all(|&v| v == i as f32));
    }
    assert_eq!(world.events().last().map(String::as_str), Some("engine.run 80x48"));
}

#[test]
fn zero_features_is_an_empty_result() {
    let world = World::new();
    world.features.set(0);
    let mut s = ready(&world, false);
    let img = vec![0f32; 32 * 32];
    let features = s
        .detect_and_compute(&HostArray::from_slice(&img, &[32, 32]))
        .expect("empty is not an error");
    assert!(features.is_empty());
    assert_eq!(features.descriptors.shape(), [0, DESCRIPTOR_DIM]);
}

#[test]
fn engine_failure_returns_nothing() {
    let world = World::new();
    world.run_ok.set(false);
    let mut s = ready(&world, true);
    let img = blob_image();
    let err = s
        .detect_and_compute(&HostArray::from_slice(&img, &[64, 64]))
        .expect_err("engine rejects");
    assert!(matches!(err, BridgeError::EngineRuntime(_)));
    assert_eq!(world.current.get(), CALLER, "caller context restored on failure");
    assert_eq!(s.state(), SessionState::Ready);
}

#[test]
fn shared_detect_runs_on_dedicated_context_and_restores_caller() {
    let world = World::new();
    let mut s = ready(&world, true);
    let img = blob_image();
    s.detect_and_compute(&HostArray::from_slice(&img, &[64, 64]))
        .expect("detect");
    assert_eq!(world.current.get(), CALLER);
    let during = world.contexts_during_calls.borrow().clone();
    assert_eq!(during.len(), 2, "verify + run");
    assert!(during.iter().all(|c| c.0 == 0x100));
}

#[test]
fn color_images_are_rejected_without_gpu_calls() {
    let world = World::new();
    let mut s = ready(&world, true);
    let img = vec![0u8; 64 * 64 * 3];
    let err = s
        .detect_and_compute(&HostArray::from_slice(&img, &[64, 64, 3]))
        .expect_err("rank 3");
    assert!(matches!(err, BridgeError::UnsupportedRank { rank: 3 }));
    assert_eq!(world.gpu_calls.get(), 0);
    assert_eq!(world.current.get(), CALLER);
}

fn supported() -> impl Strategy<Value = ElementType> {
    prop_oneof![
        Just(ElementType::Uint8),
        Just(ElementType::Uint16),
        Just(ElementType::Float32),
    ]
}

fn unsupported() -> impl Strategy<Value = ElementType> {
    prop_oneof![
        Just(ElementType::Int8),
        Just(ElementType::Int16),
        Just(ElementType::Int32),
        Just(ElementType::Uint32),
        Just(ElementType::Float16),
        Just(ElementType::Float64),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn supported_images_yield_equal_length_outputs(
        h in 1usize..40,
        w in 1usize..40,
        dtype in supported(),
        n in 0i32..20,
        share in any::<bool>(),
    ) {
        let world = World::new();
        world.features.set(n);
        let mut s = ready(&world, share);
        let bytes = vec![0u8; h * w * dtype.size_bytes()];
        let features = s
            .detect_and_compute(&HostArray::from_bytes(&bytes, &[h, w], dtype))
            .expect("detect");
        prop_assert_eq!(features.keypoints.len(), n as usize);
        prop_assert_eq!(features.descriptors.rows(), n as usize);
        prop_assert_eq!(features.descriptors.shape()[1], DESCRIPTOR_DIM);
        if share {
            prop_assert_eq!(world.current.get(), CALLER);
        }
    }

    #[test]
    fn rejected_images_never_reach_the_gpu(
        h in 1usize..16,
        w in 1usize..16,
        channels in 2usize..5,
        dtype in unsupported(),
        as_rank3 in any::<bool>(),
    ) {
        let world = World::new();
        let mut s = ready(&world, true);
        let (shape, bytes) = if as_rank3 {
            (vec![h, w, channels], vec![0u8; h * w * channels])
        } else {
            (vec![h, w], vec![0u8; h * w * dtype.size_bytes()])
        };
        let dtype = if as_rank3 { ElementType::Uint8 } else { dtype };
        let result = s.detect_and_compute(&HostArray::from_bytes(&bytes, &shape, dtype));
        prop_assert!(result.is_err());
        prop_assert_eq!(world.gpu_calls.get(), 0);
        prop_assert_eq!(world.current.get(), CALLER);
    }
}
