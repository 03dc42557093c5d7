use image::{GrayImage, Luma};
use microcr::alphabet::MicrSymbol::{self, *};
use microcr::classifier::{ClassifierBackend, TemplateClassifier};
use microcr::config::{Config, ScoreType};
use microcr::{MicrEngine, ProcessResult};

mod common;
use common::{compose_band, degrade_checkerboard, to_buffer, SCALE};

const BAND_Y: u32 = 60;

fn spaced(symbols: &[MicrSymbol]) -> Vec<(MicrSymbol, u32)> {
    symbols.iter().map(|&s| (s, 3)).collect()
}

#[test]
fn nine_digit_band_segments_in_reading_order() {
    let _ = env_logger::builder().is_test(true).try_init();

    let digits = [One, Two, Three, Four, Five, Six, Seven, Eight, Nine];
    let (canvas, positions) = compose_band(&spaced(&digits), (440, 160), (40, BAND_Y));
    let mut engine = MicrEngine::init("{}").expect("default config");
    let result = engine.process(&to_buffer(&canvas)).expect("process");

    assert!(result.is_ok());
    assert_eq!(result.payload.lines.len(), 1);
    let line = &result.payload.lines[0];
    assert_eq!(line.text, "123456789");
    assert_eq!(line.glyph_confidences.len(), 9);
    assert!(line.confidence > 0.95, "confidence {}", line.confidence);

    // Band region covers the rendered glyph run.
    let (first_x, _) = positions[0];
    let (last_x, last_w) = positions[positions.len() - 1];
    assert_eq!(line.region.y, BAND_Y);
    assert_eq!(line.region.x, first_x);
    assert_eq!(line.region.x + line.region.width, last_x + last_w);
    assert_eq!(line.region.height, 12 * SCALE);
}

#[test]
fn touching_pair_wider_than_median_splits_in_two() {
    let _ = env_logger::builder().is_test(true).try_init();

    // '0' and '7' are rendered with no gap; their combined fragment is wider
    // than 1.5x the median width and must come back as two glyphs.
    let entries = [(One, 3), (Two, 3), (Zero, 0), (Seven, 3), (Five, 0)];
    let (canvas, _) = compose_band(&entries, (280, 160), (40, BAND_Y));
    let mut engine = MicrEngine::init("{}").expect("default config");
    let result = engine.process(&to_buffer(&canvas)).expect("process");

    let line = &result.payload.lines[0];
    assert_eq!(line.text, "12075");
    assert_eq!(line.glyph_confidences.len(), 5);
}

#[test]
fn band_free_image_yields_zero_lines_not_an_error() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut canvas = GrayImage::from_pixel(200, 120, Luma([255u8]));
    // Sparse speckle, nothing band-shaped.
    for (x, y) in [(15u32, 10u32), (90, 30), (160, 55), (40, 80), (120, 100)] {
        for dy in 0..3 {
            for dx in 0..3 {
                canvas.put_pixel(x + dx, y + dy, Luma([0u8]));
            }
        }
    }
    let mut engine = MicrEngine::init("{}").expect("default config");
    let result = engine.process(&to_buffer(&canvas)).expect("process");

    assert!(result.is_ok());
    assert!(result.payload.lines.is_empty());
}

#[test]
fn processing_the_same_image_twice_is_identical() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (canvas, _) = compose_band(&spaced(&[Three, One, Four, One, Five]), (280, 160), (40, BAND_Y));
    let buffer = to_buffer(&canvas);
    let mut engine = MicrEngine::init("{}").expect("default config");
    let first = engine.process(&buffer).expect("first run").to_json().unwrap();
    let second = engine.process(&buffer).expect("second run").to_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn result_json_round_trips_within_tolerance() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (canvas, _) = compose_band(&spaced(&[Nine, Eight, Seven, Six, Five]), (280, 160), (40, BAND_Y));
    let mut engine = MicrEngine::init("{}").expect("default config");
    let result = engine.process(&to_buffer(&canvas)).expect("process");

    let parsed = ProcessResult::from_json(&result.to_json().unwrap()).unwrap();
    assert_eq!(parsed.status_code, result.status_code);
    assert_eq!(parsed.payload.lines.len(), result.payload.lines.len());
    for (a, b) in parsed.payload.lines.iter().zip(&result.payload.lines) {
        assert_eq!(a.text, b.text);
        assert_eq!(a.region, b.region);
        assert!((a.confidence - b.confidence).abs() < 1e-6);
        for (x, y) in a.glyph_confidences.iter().zip(&b.glyph_confidences) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}

#[test]
fn high_min_score_turns_degraded_glyphs_into_placeholders() {
    let _ = env_logger::builder().is_test(true).try_init();

    let entries = [(One, 3), (Two, 3), (Eight, 3), (Four, 3), (Five, 0)];
    let (mut canvas, positions) = compose_band(&entries, (280, 160), (40, BAND_Y));
    let (x, w) = positions[2];
    degrade_checkerboard(&mut canvas, x, BAND_Y, w, 12 * SCALE);

    let mut engine = MicrEngine::builder()
        .config_json("{}")
        .min_score(0.9)
        .build()
        .expect("build");
    let result = engine.process(&to_buffer(&canvas)).expect("process");

    let line = &result.payload.lines[0];
    assert_eq!(line.text, "12?45");
    assert_eq!(line.glyph_confidences[2], 0.0);
    assert!(line.glyph_confidences[0] >= 0.9);
}

#[test]
fn roi_restricts_the_band_search() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (canvas, _) = compose_band(&spaced(&[One, Two, Three, Four, Five]), (280, 160), (40, BAND_Y));
    let buffer = to_buffer(&canvas);

    // ROI above the band: nothing to find.
    let mut engine =
        MicrEngine::init(r#"{"roi": [0, 0, 280, 40]}"#).expect("config with blind roi");
    let result = engine.process(&buffer).expect("process");
    assert!(result.payload.lines.is_empty());

    // Oversized ROI clamps to the image and still finds the band.
    let mut engine =
        MicrEngine::init(r#"{"roi": [10, 20, 999, 999]}"#).expect("config with large roi");
    let result = engine.process(&buffer).expect("process");
    assert_eq!(result.payload.lines.len(), 1);
    assert_eq!(result.payload.lines[0].text, "12345");
}

#[test]
fn candidate_lists_are_sorted_non_increasing() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (gray, _) = compose_band(&spaced(&[Two, Zero, Seven, One, Three]), (280, 160), (40, BAND_Y));

    let config = Config::default();
    let bands = microcr::locator::locate(&gray, None, &config);
    assert_eq!(bands.len(), 1);
    let glyphs = microcr::segmenter::segment(&gray, &bands[0].region, &config);
    assert_eq!(glyphs.len(), 5);

    let backend = TemplateClassifier::new(ScoreType::Min);
    for glyph in &glyphs {
        let candidates = backend.classify(&glyph.crop);
        assert!(!candidates.is_empty());
        for pair in candidates.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}

#[test]
fn score_type_policies_agree_on_clean_glyphs() {
    let _ = env_logger::builder().is_test(true).try_init();

    // A pristine render matches its template perfectly under every
    // aggregation policy.
    for score_type in [ScoreType::Min, ScoreType::Max, ScoreType::Avg] {
        let backend = TemplateClassifier::new(score_type);
        let crop = microcr::alphabet::render_e13b(Two, SCALE).unwrap();
        let top = backend.classify(&crop)[0];
        assert_eq!(top.symbol, Two);
        assert!((top.score - 1.0).abs() < 1e-6);
    }
}
