//! `lens` binary: subcommands, the internal coverage flag and error exits

use std::collections::BTreeMap;
use std::fs;
use std::process::{Command, Output};

use lens_protocol::{encode_payload, CoverageArguments, JobResponse};
use tempfile::TempDir;

fn lens(dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lens"))
        .args(args)
        .current_dir(dir.path())
        .env_remove("LENS_LOG")
        .output()
        .unwrap()
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("lib/App")).unwrap();
    fs::write(
        dir.path().join("lens.toml"),
        "[paths]\nsrc = \"lib\"\ncache = \"build/cache\"\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("lib/App/Greeter.php"),
        "<?php\nnamespace App;\n\nclass Greeter\n{\n    public function hi()\n    {\n        return 'hi';\n    }\n}\n",
    )
    .unwrap();
    dir
}

#[test]
fn test_cache_command_reports_summary() {
    let dir = project();

    let output = lens(&dir, &["cache"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "1 added, 0 modified, 0 removed, 0 skipped (2 artifacts written, 0 deleted)"
    );
    assert!(dir.path().join("build/cache/code/live/App/Greeter.php").is_file());
    assert!(dir.path().join("build/cache/code/index/lib/App/Greeter.php").is_file());

    let output = lens(&dir, &["cache", "--json"]);
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["added"], 0);
    assert_eq!(summary["modified"], 0);
}

#[test]
fn test_coverage_command_in_both_modes() {
    let dir = project();

    for mode in ["in_process", "subprocess"] {
        let output = lens(&dir, &["coverage", "--mode", mode, "lib/App/Greeter.php"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let lines: BTreeMap<String, Vec<u32>> = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(lines["lib/App/Greeter.php"], vec![8]);
    }
}

#[test]
fn test_internal_coverage_flag_prints_envelope() {
    let dir = project();
    let payload = encode_payload(&CoverageArguments {
        core_directory: dir.path().to_path_buf(),
        cache_directory: dir.path().join("build/cache"),
        file_path: dir.path().join("lib/App/Greeter.php"),
    })
    .unwrap();

    let output = lens(&dir, &[&format!("--internal-coverage={}", payload)]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"{"ok":true,"payload":[8]}"#
    );
}

#[test]
fn test_internal_coverage_bad_payload() {
    let dir = project();
    let output = lens(&dir, &["--internal-coverage=%%%"]);

    assert_eq!(output.status.code(), Some(1));
    let response = JobResponse::from_output(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert!(!response.ok);
}

#[test]
fn test_missing_config_exits_with_code() {
    let dir = project();
    let output = lens(&dir, &["--config", "nope.toml", "cache"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("Error 2: config file not found"), "{}", stderr);
}

#[test]
fn test_missing_source_file_exits_with_job_code() {
    let dir = project();
    let output = lens(&dir, &["coverage", "lib/App/Nope.php"]);

    assert_eq!(output.status.code(), Some(6));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("Error 6: cannot read lib/App/Nope.php"));
}
