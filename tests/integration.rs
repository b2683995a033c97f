use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn fsc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("fsc");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    // Campaign-report style records: two shapes of the same feed.
    let records = serde_json::json!({
        "sourceId": "acme-ads",
        "companyName": "Acme Corp",
        "records": [
            {
                "campaign": "spring-launch",
                "budget": { "total": 5000, "currency": "USD" },
                "lines": [ { "cost": 120.5 }, { "cost": 99.0 } ]
            },
            {
                "campaign": "summer-sale",
                "budget": { "total": 7200, "currency": "USD" },
                "lines": [ { "cost": 310.0 } ]
            },
            {
                "campaign": "brand-awareness",
                "budget": { "total": "1000", "currency": "USD" }
            }
        ]
    });
    fs::write(
        root.join("records.json"),
        serde_json::to_string_pretty(&records).unwrap(),
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/fsc.sqlite"

[discovery]
noise_threshold = 0.05

[scoring]
provider = "disabled"

[server]
bind = "127.0.0.1:7441"
"#,
        root.display()
    );

    let config_path = config_dir.join("fsc.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_fsc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = fsc_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run fsc binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn write_records(tmp: &TempDir, name: &str, records: serde_json::Value) -> String {
    let path = tmp.path().join(name);
    fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_fsc(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("fsc.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_fsc(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_fsc(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_discover_catalogs_fields() {
    let (tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let input = tmp.path().join("records.json");
    let (stdout, stderr, success) = run_fsc(&config_path, &["discover", input.to_str().unwrap()]);
    assert!(
        success,
        "discover failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("records: 3"));
    // campaign, budget.total, budget.currency, lines[*].cost
    assert!(stdout.contains("new fields: 4"), "got: {}", stdout);
    assert!(stdout.contains("ok"));

    let (fields_out, _, _) = run_fsc(&config_path, &["fields"]);
    assert!(fields_out.contains("budget.total"));
    assert!(fields_out.contains("lines[*].cost"));
    assert!(fields_out.contains("4 field(s)"));
}

#[test]
fn test_discover_bare_array_requires_source() {
    let (tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let input = write_records(&tmp, "bare.json", serde_json::json!([{"a": 1}]));

    let (_, stderr, success) = run_fsc(&config_path, &["discover", &input]);
    assert!(!success, "bare array without --source should fail");
    assert!(stderr.contains("--source"), "got: {}", stderr);

    let (stdout, _, success) =
        run_fsc(&config_path, &["discover", &input, "--source", "manual"]);
    assert!(success);
    assert!(stdout.contains("new fields: 1"));
}

#[test]
fn test_two_runs_accumulate_statistics() {
    let (tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let input = tmp.path().join("records.json");
    let (stdout1, _, _) = run_fsc(&config_path, &["discover", input.to_str().unwrap()]);
    assert!(stdout1.contains("new fields: 4"));

    // Same shape again: nothing new, everything updated.
    let (stdout2, _, success) = run_fsc(&config_path, &["discover", input.to_str().unwrap()]);
    assert!(success);
    assert!(stdout2.contains("new fields: 0"), "got: {}", stdout2);
    assert!(stdout2.contains("updated fields: 4"), "got: {}", stdout2);

    let (runs_out, _, _) = run_fsc(&config_path, &["runs"]);
    assert!(runs_out.contains("acme-ads"));
    assert_eq!(
        runs_out.matches("acme-ads").count(),
        2,
        "expected two run logs, got: {}",
        runs_out
    );
}

#[test]
fn test_noise_threshold_filters_rare_fields() {
    let (tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);

    // "rare" appears in 1 of 40 records (0.025 < 0.05); "edge" in 1 of 20
    // within a second run (exactly 0.05, persists).
    let mut batch1: Vec<serde_json::Value> =
        (0..39).map(|i| serde_json::json!({"common": i})).collect();
    batch1.push(serde_json::json!({"common": 39, "rare": true}));
    let input1 = write_records(&tmp, "batch1.json", serde_json::Value::Array(batch1));

    let (stdout, _, success) = run_fsc(&config_path, &["discover", &input1, "--source", "s1"]);
    assert!(success);
    assert!(stdout.contains("skipped (noise): 1"), "got: {}", stdout);

    let mut batch2: Vec<serde_json::Value> =
        (0..19).map(|i| serde_json::json!({"common": i})).collect();
    batch2.push(serde_json::json!({"common": 19, "edge": 1}));
    let input2 = write_records(&tmp, "batch2.json", serde_json::Value::Array(batch2));
    run_fsc(&config_path, &["discover", &input2, "--source", "s2"]);

    let (fields_out, _, _) = run_fsc(&config_path, &["fields"]);
    assert!(!fields_out.contains("rare"), "got: {}", fields_out);
    assert!(fields_out.contains("edge"), "got: {}", fields_out);
    assert!(fields_out.contains("common"));
}

#[test]
fn test_fields_mark_is_terminal() {
    let (tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let input = tmp.path().join("records.json");
    run_fsc(&config_path, &["discover", input.to_str().unwrap()]);

    let (stdout, _, success) =
        run_fsc(&config_path, &["fields", "mark", "budget.total", "ignored"]);
    assert!(success, "mark failed: {}", stdout);

    let (_, stderr, success) =
        run_fsc(&config_path, &["fields", "mark", "budget.total", "approved"]);
    assert!(!success, "re-marking a resolved field should fail");
    assert!(stderr.contains("already resolved"), "got: {}", stderr);

    let (_, stderr, success) =
        run_fsc(&config_path, &["fields", "mark", "no.such.path", "approved"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "got: {}", stderr);
}

#[test]
fn test_fields_status_filter() {
    let (tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let input = tmp.path().join("records.json");
    run_fsc(&config_path, &["discover", input.to_str().unwrap()]);
    run_fsc(&config_path, &["fields", "mark", "campaign", "ignored"]);

    let (stdout, _, success) = run_fsc(&config_path, &["fields", "--status", "ignored"]);
    assert!(success);
    assert!(stdout.contains("campaign"));
    assert!(stdout.contains("1 field(s)"), "got: {}", stdout);

    let (_, stderr, success) = run_fsc(&config_path, &["fields", "--status", "bogus"]);
    assert!(!success);
    assert!(stderr.contains("invalid field status"), "got: {}", stderr);
}

#[test]
fn test_suggest_generate_disabled_provider_degrades_gracefully() {
    let (tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let input = tmp.path().join("records.json");
    run_fsc(&config_path, &["discover", input.to_str().unwrap()]);

    let (stdout, stderr, success) = run_fsc(&config_path, &["suggest", "generate"]);
    assert!(
        success,
        "generate with disabled provider should still exit 0: {}",
        stderr
    );
    assert!(stdout.contains("fields submitted: 4"), "got: {}", stdout);
    assert!(stdout.contains("suggestions: 0"));
    assert!(stdout.contains("ok"));
    assert!(stderr.contains("scoring collaborator failed"), "got: {}", stderr);

    // Submitted fields advance to reviewed even on failure.
    let (fields_out, _, _) = run_fsc(&config_path, &["fields", "--status", "reviewed"]);
    assert!(fields_out.contains("4 field(s)"), "got: {}", fields_out);

    // Nothing left for an only-new pass.
    let (stdout, _, _) = run_fsc(&config_path, &["suggest", "generate", "--only-new"]);
    assert!(stdout.contains("fields submitted: 0"), "got: {}", stdout);
}

#[test]
fn test_suggest_list_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let (stdout, _, success) = run_fsc(&config_path, &["suggest", "list"]);
    assert!(success);
    assert!(stdout.contains("No suggestions"));
}

#[test]
fn test_suggest_approve_unknown_id() {
    let (_tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let (_, stderr, success) = run_fsc(&config_path, &["suggest", "approve", "no-such-id"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "got: {}", stderr);
}

#[test]
fn test_suggest_export_empty() {
    let (tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let (stdout, _, success) = run_fsc(&config_path, &["suggest", "export"]);
    assert!(success);
    assert_eq!(stdout.trim(), "[]");

    let out_path = tmp.path().join("out").join("extractors.json");
    let (_, _, success) = run_fsc(
        &config_path,
        &["suggest", "export", "-o", out_path.to_str().unwrap()],
    );
    assert!(success);
    assert_eq!(fs::read_to_string(&out_path).unwrap().trim(), "[]");
}

#[test]
fn test_bulk_approve_validates_threshold() {
    let (_tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let (_, stderr, success) = run_fsc(
        &config_path,
        &["suggest", "bulk-approve", "--min-confidence", "1.5"],
    );
    assert!(!success);
    assert!(stderr.contains("[0.0, 1.0]"), "got: {}", stderr);

    let (stdout, _, success) = run_fsc(&config_path, &["suggest", "bulk-approve"]);
    assert!(success);
    assert!(stdout.contains("approved 0 of 0"), "got: {}", stdout);
}

#[test]
fn test_stats_overview() {
    let (tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);
    let input = tmp.path().join("records.json");
    run_fsc(&config_path, &["discover", input.to_str().unwrap()]);

    let (stdout, _, success) = run_fsc(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Fields:       4"), "got: {}", stdout);
    assert!(stdout.contains("Runs:         1"));
    assert!(stdout.contains("discovered"));
}

#[test]
fn test_invalid_input_file_errors() {
    let (tmp, config_path) = setup_test_env();

    run_fsc(&config_path, &["init"]);

    let bad = tmp.path().join("bad.json");
    fs::write(&bad, "not json at all").unwrap();
    let (_, stderr, success) = run_fsc(&config_path, &["discover", bad.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("not valid JSON"), "got: {}", stderr);

    let scalar = write_records(&tmp, "scalar.json", serde_json::json!(42));
    let (_, stderr, success) = run_fsc(&config_path, &["discover", &scalar]);
    assert!(!success);
    assert!(stderr.contains("array"), "got: {}", stderr);
}

#[test]
fn test_bad_config_rejected() {
    let (tmp, config_path) = setup_test_env();

    let bad_config = tmp.path().join("config").join("bad.toml");
    fs::write(
        &bad_config,
        r#"[db]
path = "x.sqlite"

[discovery]
noise_threshold = 2.0

[server]
bind = "127.0.0.1:7441"
"#,
    )
    .unwrap();

    let output = Command::new(fsc_binary())
        .arg("--config")
        .arg(bad_config.to_str().unwrap())
        .arg("init")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("noise_threshold"), "got: {}", stderr);
    drop(config_path);
}
