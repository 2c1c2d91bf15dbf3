//! Coverage jobs through the dispatcher, in-process and as `lens` subprocesses

use std::fs;
use std::path::{Path, PathBuf};

use lens::jobs::{CoverageJob, Dispatcher, ExecutionMode, Job, JobError, JobState};
use lens_protocol::{decode_payload, split_flag, CoverageArguments, ErrorCode};
use tempfile::TempDir;

const CALC: &str = "<?php\nnamespace App;\n\nclass Calc\n{\n    public function add($a, $b)\n    {\n        $sum = $a + $b;\n        return $sum;\n    }\n}\n";

const SWITCH: &str = "<?php\nfunction grade($n)\n{\n    if ($n > 90) {\n        return 'a';\n    }\n    return 'b';\n}\n";

fn lens_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lens"))
}

fn coverage_job(dir: &TempDir, file: &str) -> CoverageJob {
    CoverageJob::new(
        lens_binary(),
        dir.path().to_path_buf(),
        dir.path().join(".lens/cache"),
        dir.path().join(file),
    )
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn run_all(mode: ExecutionMode, dir: &TempDir, files: &[&str]) -> Vec<Result<Vec<u32>, JobError>> {
    let mut dispatcher = Dispatcher::new(mode, 2);
    let ids: Vec<_> = files
        .iter()
        .map(|file| dispatcher.submit(coverage_job(dir, file)))
        .collect();
    dispatcher.run().unwrap();

    ids.iter()
        .map(|id| {
            let state = dispatcher.state(id).unwrap();
            assert!(state.is_terminal(), "job left in {:?}", state);
            dispatcher.take_result(id).unwrap()
        })
        .collect()
}

#[test]
fn test_in_process_coverage_lines() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "Calc.php", CALC);
    write(dir.path(), "grade.php", SWITCH);

    let results = run_all(ExecutionMode::InProcess, &dir, &["Calc.php", "grade.php"]);
    assert_eq!(results[0].as_ref().unwrap(), &vec![8, 9]);
    assert_eq!(results[1].as_ref().unwrap(), &vec![4, 5, 7]);
}

#[test]
fn test_subprocess_matches_in_process() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "Calc.php", CALC);
    write(dir.path(), "grade.php", SWITCH);
    let files = ["Calc.php", "grade.php"];

    let local: Vec<Vec<u32>> = run_all(ExecutionMode::InProcess, &dir, &files)
        .into_iter()
        .map(Result::unwrap)
        .collect();
    let remote: Vec<Vec<u32>> = run_all(ExecutionMode::Subprocess, &dir, &files)
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(local, remote);
}

#[test]
fn test_subprocess_reports_unparsable_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "bad.php", "<?php\nfunction f() {\n");

    let results = run_all(ExecutionMode::Subprocess, &dir, &["bad.php"]);
    match &results[0] {
        Err(JobError::Remote(error)) => assert_eq!(error.code, ErrorCode::Unparsable),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_in_process_missing_file_fails_job() {
    let dir = TempDir::new().unwrap();
    let mut dispatcher = Dispatcher::new(ExecutionMode::InProcess, 1);
    let id = dispatcher.submit(coverage_job(&dir, "missing.php"));
    dispatcher.run().unwrap();

    assert_eq!(dispatcher.state(&id), Some(JobState::Failed));
    assert!(matches!(
        dispatcher.take_result(&id),
        Some(Err(JobError::Source { .. }))
    ));
}

#[test]
fn test_command_line_round_trip() {
    let dir = TempDir::new().unwrap();
    let job = coverage_job(&dir, "Calc.php");
    let command = job.command().unwrap();

    let rendered = command.to_string();
    let (program, argument) = rendered.split_once(' ').unwrap();
    assert_eq!(Path::new(program), lens_binary());

    let decoded: CoverageArguments = decode_payload(split_flag(argument).unwrap()).unwrap();
    assert_eq!(decoded.core_directory, dir.path());
    assert_eq!(decoded.cache_directory, dir.path().join(".lens/cache"));
    assert_eq!(decoded.file_path, dir.path().join("Calc.php"));
}

#[test]
fn test_payload_is_deflated_json_array() {
    use base64::Engine;
    use std::io::Read;

    let dir = TempDir::new().unwrap();
    let command = coverage_job(&dir, "Calc.php").command().unwrap();
    let payload = split_flag(&command.args[0]).unwrap();

    let compressed = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .unwrap();
    let mut json = String::new();
    flate2::read::DeflateDecoder::new(compressed.as_slice())
        .read_to_string(&mut json)
        .unwrap();

    let fields: Vec<String> = serde_json::from_str(&json).unwrap();
    assert_eq!(
        fields,
        vec![
            dir.path().to_string_lossy().into_owned(),
            dir.path().join(".lens/cache").to_string_lossy().into_owned(),
            dir.path().join("Calc.php").to_string_lossy().into_owned(),
        ]
    );
}

#[test]
fn test_published_once() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "Calc.php", CALC);

    let mut dispatcher = Dispatcher::new(ExecutionMode::Subprocess, 1);
    let id = dispatcher.submit(coverage_job(&dir, "Calc.php"));
    dispatcher.run().unwrap();

    assert!(matches!(
        dispatcher.publish(&id, Ok(vec![1])),
        Err(JobError::AlreadyCompleted(_))
    ));
    assert_eq!(dispatcher.take_result(&id).unwrap().unwrap(), vec![8, 9]);
}
