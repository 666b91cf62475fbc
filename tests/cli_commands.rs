use std::path::PathBuf;
use std::process::Command;

use image::{Rgb, RgbImage};
use serde_json::Value;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_guardian_cli"))
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("guardian_cli_{}_{}", std::process::id(), name))
}

#[test]
fn classify_reports_simulated_emergency() {
    let output = cli()
        .args([
            "classify",
            "--simulation",
            "--message",
            r#"{"gestures":[{"tag":"Help","probability":0.95}]}"#,
        ])
        .output()
        .expect("failed to run guardian_cli classify");
    assert!(output.status.success(), "exit {:?}", output.status.code());

    let json: Value = serde_json::from_slice(&output.stdout).expect("classify JSON");
    assert_eq!(json["route"], "result");
    assert_eq!(json["emergency"], true);
    assert_eq!(json["decision"]["decision"], "simulated_gesture");
}

#[test]
fn classify_filters_control_messages() {
    let output = cli()
        .args(["classify", "--message", r#"{"type":"pong"}"#])
        .output()
        .expect("failed to run guardian_cli classify");
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).expect("classify JSON");
    assert_eq!(json["route"], "control");
}

#[test]
fn classify_malformed_exits_with_code_two() {
    let output = cli()
        .args(["classify", "--message", "[1,2]"])
        .output()
        .expect("failed to run guardian_cli classify");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn encode_reports_bounded_payload() {
    let image_path = temp_path("scene.png");
    let payload_path = temp_path("scene.txt");
    RgbImage::from_fn(320, 200, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
        .save(&image_path)
        .expect("write test image");

    let output = cli()
        .args([
            "encode",
            "--image",
            image_path.to_str().unwrap(),
            "--fit",
            "crop",
            "--output",
            payload_path.to_str().unwrap(),
        ])
        .output()
        .expect("failed to run guardian_cli encode");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: Value = serde_json::from_slice(&output.stdout).expect("encode JSON");
    assert_eq!(json["target"]["width"], 640);
    assert_eq!(json["target"]["height"], 480);
    assert_eq!(json["fit"], "crop");
    let payload = json["payload_bytes"].as_u64().unwrap();
    assert!(payload <= json["max_payload_bytes"].as_u64().unwrap());

    let written = std::fs::read_to_string(&payload_path).expect("payload file");
    assert_eq!(written.len() as u64, payload);
    assert!(written.starts_with("data:image/jpeg;base64,"));

    let _ = std::fs::remove_file(image_path);
    let _ = std::fs::remove_file(payload_path);
}

#[test]
fn encode_rejects_out_of_range_quality() {
    let image_path = temp_path("quality.png");
    RgbImage::new(8, 8).save(&image_path).expect("write test image");
    let output = cli()
        .args([
            "encode",
            "--image",
            image_path.to_str().unwrap(),
            "--quality",
            "0.99",
        ])
        .output()
        .expect("failed to run guardian_cli encode");
    assert_eq!(output.status.code(), Some(1));
    let _ = std::fs::remove_file(image_path);
}
