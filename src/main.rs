use std::collections::HashMap;
use std::process::ExitCode;

use microcr::{ImageBuffer, MicrEngine};
use serde_json::json;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

// Matches the SDK sample's embedded engine configuration; CLI options append
// the assets folder and license token on top.
fn base_config() -> serde_json::Value {
    json!({
        "debug_level": "info",
        "debug_write_input_image_enabled": false,
        "debug_internal_data_path": ".",

        "num_threads": -1,
        "gpgpu_enabled": true,

        "segmenter_accuracy": "high",
        "interpolation": "bilinear",
        "roi": [0, 0, 0, 0],
        "min_score": 0.3,
        "score_type": "min"
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(args) = parse_args(&args) else {
        print_usage(Some("arguments must come in --key value pairs"));
        return ExitCode::from(255);
    };
    let Some(image_path) = args.get("--image") else {
        print_usage(Some("--image required"));
        return ExitCode::from(255);
    };

    let mut config = base_config();
    if let Some(assets) = args.get("--assets") {
        config["assets_folder"] = json!(assets);
    }
    if let Some(token_file) = args.get("--tokenfile") {
        config["license_token_file"] = json!(token_file);
    }
    if let Some(token_data) = args.get("--tokendata") {
        config["license_token_data"] = json!(token_data);
    }

    let decoded = match image::open(image_path) {
        Ok(decoded) => decoded,
        Err(e) => {
            eprintln!("failed to read image file {image_path}: {e}");
            return ExitCode::from(255);
        }
    };
    let buffer = match ImageBuffer::from_dynamic(&decoded) {
        Ok(buffer) => buffer,
        Err(e) => {
            eprintln!("failed to wrap decoded image: {e}");
            return ExitCode::from(255);
        }
    };

    log::info!("starting recognizer...");
    let mut engine = match MicrEngine::init(&config.to_string()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("engine init failed: {e}");
            return ExitCode::from(255);
        }
    };

    let result = match engine.process(&buffer) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("processing failed: {e}");
            let _ = engine.deinit();
            return ExitCode::from(255);
        }
    };
    log::info!("processing done");

    match result.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("result serialization failed: {e}");
            let _ = engine.deinit();
            return ExitCode::from(255);
        }
    }

    log::info!("ending recognizer...");
    if let Err(e) = engine.deinit() {
        eprintln!("engine deinit failed: {e}");
        return ExitCode::from(255);
    }
    ExitCode::SUCCESS
}

fn parse_args(args: &[String]) -> Option<HashMap<String, String>> {
    if args.len() % 2 != 0 {
        return None;
    }
    let mut map = HashMap::new();
    for pair in args.chunks_exact(2) {
        if !pair[0].starts_with("--") {
            return None;
        }
        map.insert(pair[0].clone(), pair[1].clone());
    }
    Some(map)
}

fn print_usage(message: Option<&str>) {
    if let Some(message) = message {
        eprintln!("error: {message}");
    }
    eprintln!(
        "\nrecognizer\n\
         \t--image <path-to-image-with-micr-zone-to-recognize>\n\
         \t[--assets <path-to-assets-folder>]\n\
         \t[--tokenfile <path-to-license-token-file>]\n\
         \t[--tokendata <base64-license-token-data>]\n\
         \n\
         Options surrounded with [] are optional.\n\
         --image: Path to the JPEG/PNG/BMP image to process.\n\
         --assets: Path to the assets folder holding optional model files. Default: none.\n\
         --tokenfile: Path to a file holding a base64 license token. Default: none (trial).\n\
         --tokendata: Base64 license token. Default: none (trial).\n"
    );
}
