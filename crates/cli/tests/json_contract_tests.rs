// Integration tests enforcing the --json stdout contract and exit codes.
//
// stdout from --json commands must be:
//   1. Valid JSON
//   2. Exactly one JSON value (no log lines, no banners)
//   3. The correct shape for its command
//
// Run with: cargo test -p reclink-cli --test json_contract_tests -- --nocapture

use std::path::PathBuf;
use std::process::{Command, Output};

fn reclink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_reclink"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../linkage/tests/fixtures")
}

fn fixture(name: &str) -> String {
    fixtures_dir().join(name).to_string_lossy().into_owned()
}

/// Write a config next to copies of the fixture CSVs.
fn scratch_config(dir: &tempfile::TempDir, toml: &str) -> String {
    for csv in ["sba.csv", "gl.csv"] {
        std::fs::copy(fixtures_dir().join(csv), dir.path().join(csv)).unwrap();
    }
    let path = dir.path().join("link.toml");
    std::fs::write(&path, toml).unwrap();
    path.to_string_lossy().into_owned()
}

fn fixture_toml() -> String {
    std::fs::read_to_string(fixtures_dir().join("link.toml")).unwrap()
}

/// Assert stdout is a single, parseable JSON value with no extra lines.
fn assert_single_json(stdout: &str) -> serde_json::Value {
    let trimmed = stdout.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty");

    serde_json::from_str(trimmed).unwrap_or_else(|e| {
        panic!("stdout must be valid JSON.\nParse error: {}\nstdout:\n{}", e, trimmed)
    })
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ===========================================================================
// reclink run
// ===========================================================================

#[test]
fn run_json_produces_single_result_object() {
    let output = reclink()
        .args(["run", &fixture("link.toml"), "--json"])
        .output()
        .expect("reclink run --json");

    assert!(output.status.success(), "exit code: {:?}\nstderr: {}", output.status, stderr(&output));

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    let obj = val.as_object().expect("should be JSON object");
    for key in ["meta", "summary", "parameters", "training", "matches"] {
        assert!(obj.contains_key(key), "must have '{key}' key");
    }
    assert_eq!(val["meta"]["config_name"], "SBA to GL");
    assert_eq!(val["summary"]["candidate_pairs"], 7);

    let matches = val["matches"].as_array().expect("matches must be array");
    assert!(!matches.is_empty());
    for m in matches {
        assert!(m["match_probability"].as_f64().unwrap() >= 0.5);
        assert!(m["left_id"].is_string());
        assert_eq!(m["contributions"].as_array().unwrap().len(), 4);
    }
}

#[test]
fn run_verbose_keeps_stdout_clean() {
    let output = reclink()
        .args(["run", &fixture("link.toml"), "--json", "-vv"])
        .output()
        .expect("reclink run --json -vv");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert!(stderr(&output).contains("reclink::training"));
}

#[test]
fn run_without_json_prints_summary_to_stderr_only() {
    let output = reclink()
        .args(["run", &fixture("link.toml")])
        .output()
        .expect("reclink run");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(output.stdout.is_empty());
    let err = stderr(&output);
    assert!(err.contains("7 candidate pairs"), "stderr: {err}");
    assert!(err.contains("training 'jobid_desc1'"), "stderr: {err}");
}

#[test]
fn run_output_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("result.json");

    let output = reclink()
        .args(["run", &fixture("link.toml"), "--output", out.to_str().unwrap()])
        .output()
        .expect("reclink run --output");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let written = std::fs::read_to_string(&out).unwrap();
    let val: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(val["summary"]["left_records"], 8);
}

#[test]
fn zero_threshold_returns_every_candidate() {
    let output = reclink()
        .args(["run", &fixture("link.toml"), "--json", "--threshold", "0"])
        .output()
        .expect("reclink run --threshold 0");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["matches"].as_array().unwrap().len(), 7);
}

// ===========================================================================
// Exit codes
// ===========================================================================

#[test]
fn invalid_threshold_override_exits_60() {
    let output = reclink()
        .args(["run", &fixture("link.toml"), "--threshold", "1.5"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(60));
    assert!(stderr(&output).contains("match_threshold"));
}

#[test]
fn invalid_config_exits_60() {
    let dir = tempfile::tempdir().unwrap();
    let toml = fixture_toml().replace("match_threshold = 0.5", "match_threshold = 3.0");
    let config = scratch_config(&dir, &toml);

    let output = reclink().args(["run", &config]).output().unwrap();
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn unknown_config_key_exits_60() {
    let dir = tempfile::tempdir().unwrap();
    let toml = format!("unexpected = true\n{}", fixture_toml());
    let config = scratch_config(&dir, &toml);

    let output = reclink().args(["validate", &config]).output().unwrap();
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn missing_input_file_exits_61() {
    let dir = tempfile::tempdir().unwrap();
    let toml = fixture_toml().replace("file = \"gl.csv\"", "file = \"missing.csv\"");
    let config = scratch_config(&dir, &toml);

    let output = reclink().args(["run", &config]).output().unwrap();
    assert_eq!(output.status.code(), Some(61));
    assert!(stderr(&output).contains("missing.csv"));
}

#[test]
fn missing_schema_field_exits_61() {
    let dir = tempfile::tempdir().unwrap();
    let toml = fixture_toml().replace(
        r#"identity_fields = ["jobid", "client_name"]"#,
        r#"identity_fields = ["jobid", "client_nmae"]"#,
    );
    let config = scratch_config(&dir, &toml);

    let output = reclink().args(["run", &config]).output().unwrap();
    assert_eq!(output.status.code(), Some(61));
    assert!(stderr(&output).contains("client_nmae"));
}

#[test]
fn fail_on_empty_exits_62() {
    let output = reclink()
        .args(["run", &fixture("link.toml"), "--threshold", "1", "--fail-on-empty"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(62));
}

#[test]
fn bad_arguments_exit_2() {
    let output = reclink().args(["run"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// reclink validate / columns
// ===========================================================================

#[test]
fn validate_resolves_columns() {
    let output = reclink().args(["validate", &fixture("link.toml")]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let err = stderr(&output);
    assert!(err.contains("config ok: SBA to GL"), "stderr: {err}");
    assert!(err.contains("4 comparison columns"), "stderr: {err}");
    assert!(err.contains("client_name_desc2"), "stderr: {err}");
}

#[test]
fn columns_json_lists_standardized_names() {
    let output = reclink()
        .args(["columns", &fixture("sba.csv"), "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    let columns: Vec<&str> = val["columns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap())
        .collect();
    assert_eq!(columns, vec!["jobid", "client_name", "city", "unique_id"]);
    assert_eq!(val["rows"], 8);
}
