mod common;

use common::{find_model_path, run_cli, write_test_image};

#[test]
fn help_lists_the_batch_flags() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--input",
        "--mapping-file",
        "--positioning-mode",
        "--max-retries",
        "--memory-policy",
        "--page-size",
        "--stop-on-error",
    ] {
        assert!(help.contains(flag), "help should mention {flag}");
    }
}

#[test]
fn missing_input_is_rejected() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--input"));
}

#[test]
fn export_settings_writes_a_named_snapshot() {
    let temp_dir = tempfile::TempDir::new().expect("create temp dir");
    let snapshot_path = temp_dir.path().join("snapshot.json");

    let output = run_cli(&[
        "--export-settings",
        snapshot_path.to_str().unwrap(),
        "--snapshot-name",
        "regression",
        "--output-width",
        "512",
        "--output-height",
        "512",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json = std::fs::read_to_string(&snapshot_path).expect("read snapshot");
    let snapshot =
        cropflow_utils::SettingsSnapshot::from_json(&json).expect("parse snapshot");
    assert_eq!(snapshot.name, "regression");
    assert_eq!(snapshot.settings.crop.output_width, 512);
}

#[test]
fn missing_model_fails_with_attribution() {
    let temp_dir = tempfile::TempDir::new().expect("create temp dir");
    let input = temp_dir.path().join("input.png");
    write_test_image(&input, 320, 240);

    let output = run_cli(&[
        "--input",
        input.to_str().unwrap(),
        "--model",
        temp_dir.path().join("no_such_model.bin").to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("no_such_model.bin"),
        "stderr should name the missing model: {stderr}"
    );
}

#[test]
fn crops_a_directory_end_to_end() {
    let Some(model) = find_model_path() else {
        eprintln!("Skipping test: SeetaFace model not found");
        return;
    };

    let temp_dir = tempfile::TempDir::new().expect("create temp dir");
    let input_dir = temp_dir.path().join("input");
    let output_dir = temp_dir.path().join("output");
    std::fs::create_dir_all(&input_dir).expect("create input dir");
    for name in ["one.png", "two.png"] {
        write_test_image(&input_dir.join(name), 320, 240);
    }

    let json_path = temp_dir.path().join("report.json");
    let output = run_cli(&[
        "--input",
        input_dir.to_str().unwrap(),
        "--model",
        model.to_str().unwrap(),
        "--output-dir",
        output_dir.to_str().unwrap(),
        "--json",
        json_path.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // Synthetic images may legitimately contain zero detectable faces; the
    // run still completes and reports every item.
    let report = std::fs::read_to_string(&json_path).expect("read report");
    let parsed: serde_json::Value = serde_json::from_str(&report).expect("parse report");
    assert_eq!(parsed["failed"], 0);
    assert_eq!(parsed["items"].as_array().map(|a| a.len()), Some(2));
}
