use microcr::alphabet::MicrSymbol::{Five, Four, One, Three};
use microcr::{ImageBuffer, MicrEngine, MicrError};

mod common;
use common::{compose_band, to_buffer};

fn sample_buffer() -> ImageBuffer {
    let (canvas, _) = compose_band(
        &[(Three, 3), (One, 3), (Four, 3), (One, 3), (Five, 0)],
        (280, 160),
        (40, 60),
    );
    to_buffer(&canvas)
}

#[test]
fn init_deinit_init_lifecycle() {
    let _ = env_logger::builder().is_test(true).try_init();

    let buffer = sample_buffer();
    let mut engine = MicrEngine::init("{}").expect("first init");
    let first = engine.process(&buffer).expect("process");
    engine.deinit().expect("deinit");

    let mut engine = MicrEngine::init("{}").expect("init after deinit");
    let second = engine.process(&buffer).expect("process after re-init");
    assert_eq!(
        first.to_json().unwrap(),
        second.to_json().unwrap(),
        "fresh engines agree on the same image"
    );
}

#[test]
fn deinit_is_idempotent() {
    let mut engine = MicrEngine::init("{}").expect("init");
    engine.deinit().expect("first deinit");
    engine.deinit().expect("second deinit is a no-op");
}

#[test]
fn process_after_deinit_is_an_invalid_state_error() {
    let buffer = sample_buffer();
    let mut engine = MicrEngine::init("{}").expect("init");
    engine.deinit().expect("deinit");
    match engine.process(&buffer) {
        Err(MicrError::InvalidState { operation, .. }) => assert_eq!(operation, "process"),
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn builder_overrides_win_over_json() {
    let engine = MicrEngine::builder()
        .config_json(r#"{"min_score": 0.3, "num_threads": 2}"#)
        .min_score(0.7)
        .num_threads(1)
        .build()
        .expect("build");
    assert!((engine.config().min_score - 0.7).abs() < 1e-6);
    assert_eq!(engine.config().num_threads, 1);
}

#[test]
fn malformed_config_fails_init() {
    assert!(matches!(
        MicrEngine::init(r#"{"min_score": -2}"#),
        Err(MicrError::Config { .. })
    ));
    assert!(matches!(
        MicrEngine::init("not json at all"),
        Err(MicrError::Config { .. })
    ));
}

#[cfg(not(any(
    feature = "cuda",
    feature = "tensorrt",
    feature = "directml",
    feature = "coreml"
)))]
#[test]
fn strict_acceleration_without_gpu_features_fails_init() {
    // Default config requests gpgpu; the lenient path falls back to CPU, the
    // strict path refuses.
    assert!(MicrEngine::builder().build().is_ok());
    assert!(matches!(
        MicrEngine::builder().strict_acceleration(true).build(),
        Err(MicrError::Resource { .. })
    ));
    assert!(MicrEngine::builder()
        .config_json(r#"{"gpgpu_enabled": false}"#)
        .strict_acceleration(true)
        .build()
        .is_ok());
}

#[test]
fn image_buffer_rejects_structural_faults() {
    assert!(matches!(
        ImageBuffer::from_gray8(0, 10, vec![]),
        Err(MicrError::InvalidImage { .. })
    ));
    assert!(matches!(
        ImageBuffer::from_gray8(10, 10, vec![0u8; 50]),
        Err(MicrError::InvalidImage { .. })
    ));
    assert!(ImageBuffer::from_gray8(10, 10, vec![0u8; 100]).is_ok());
}

#[test]
fn license_token_passthrough_never_fails_init() {
    // Licensing is carried, not enforced; bogus tokens only warn.
    let engine = MicrEngine::init(
        r#"{"license_token_data": "!!not-base64!!", "license_token_file": "/nonexistent/token.lic"}"#,
    );
    assert!(engine.is_ok());
}
