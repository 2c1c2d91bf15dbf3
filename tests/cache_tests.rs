//! Cache update scenarios over a real source tree

mod fixtures;

use std::fs;
use std::time::Duration;

use fixtures::Project;
use lens::cache::{ArtifactKind, ArtifactVariant, CacheError, CacheLock, LockError};
use lens::Cacher;

const USER: &str = "<?php\nnamespace App;\n\nuse App\\Support\\Str;\n\nclass User\n{\n    public function name(): string\n    {\n        return Str::title($this->name);\n    }\n\n    private function secret()\n    {\n        return 1;\n    }\n}\n";

const HELPERS: &str = "<?php\nnamespace App\\Support;\n\nfunction slug($s)\n{\n    return strtolower($s);\n}\n\nfunction title($s)\n{\n    return ucfirst($s);\n}\n";

// =============================================================================
// Added files
// =============================================================================

#[test]
fn test_added_file_produces_record_and_artifacts() {
    let project = Project::new();
    project.write("App/User.php", USER);

    let summary = project.update();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.artifacts_written, 2);

    let record = project.record("App/User.php").expect("index record");
    assert_eq!(record.classes.iter().collect::<Vec<_>>(), vec!["App\\User"]);
    assert!(record.functions.is_empty());

    let [live, mock] = project.class_artifacts("App\\User");
    let live = fs::read_to_string(live).unwrap();
    let mock = fs::read_to_string(mock).unwrap();
    assert!(live.starts_with("<?php namespace App; use App\\Support\\Str;"));
    assert!(live.contains("return \\App\\Support\\Str::title($this->name);"));
    assert!(mock.contains("public function name(): string"));
    assert!(!mock.contains("secret"));
    assert!(!mock.contains("Str::title"));

    project.assert_consistent();
}

#[test]
fn test_functions_get_function_artifacts() {
    let project = Project::new();
    project.write("App/Support/helpers.php", HELPERS);
    project.update();

    let record = project.record("App/Support/helpers.php").unwrap();
    assert_eq!(
        record.functions.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["App\\Support\\slug", "App\\Support\\title"]
    );
    for variant in ArtifactVariant::ALL {
        let path = project.artifact(variant, ArtifactKind::Function, "App\\Support\\slug");
        assert!(path.is_file(), "missing {}", path.display());
        assert!(path.ends_with("App/Support/slug.function.php"));
    }
    project.assert_consistent();
}

#[test]
fn test_second_update_is_noop() {
    let project = Project::new();
    project.write("App/User.php", USER);
    project.write("App/Support/helpers.php", HELPERS);

    project.update();
    let before = project.generated_files();
    let summary = project.update();

    assert!(summary.is_noop(), "unexpected changes: {}", summary);
    assert_eq!(summary.artifacts_written, 0);
    assert_eq!(project.generated_files(), before);
}

// =============================================================================
// Modified and renamed declarations
// =============================================================================

#[test]
fn test_rename_leaves_no_stale_artifacts() {
    let project = Project::new();
    project.write("App/User.php", USER);
    project.update();

    project.write("App/User.php", &USER.replace("class User", "class Member"));
    let summary = project.update();
    assert_eq!(summary.modified, 1);

    for path in project.class_artifacts("App\\User") {
        assert!(!path.exists(), "stale {}", path.display());
    }
    for path in project.class_artifacts("App\\Member") {
        assert!(path.is_file());
    }
    let record = project.record("App/User.php").unwrap();
    assert!(record.classes.contains("App\\Member"));
    assert!(!record.classes.contains("App\\User"));
    project.assert_consistent();
}

#[test]
fn test_modified_body_regenerates_live() {
    let project = Project::new();
    project.write("App/User.php", USER);
    project.update();

    project.write("App/User.php", &USER.replace("return 1;", "return 2;"));
    project.update();

    let [live, _] = project.class_artifacts("App\\User");
    assert!(fs::read_to_string(live).unwrap().contains("return 2;"));
    project.assert_consistent();
}

// =============================================================================
// Removed files
// =============================================================================

#[test]
fn test_removed_file_deletes_everything_it_produced() {
    let project = Project::new();
    project.write("App/User.php", USER);
    project.write("App/Support/helpers.php", HELPERS);
    project.update();

    project.remove("App/Support");
    let summary = project.update();

    assert_eq!(summary.removed, 1);
    assert_eq!(summary.artifacts_deleted, 4);
    assert!(project.record("App/Support/helpers.php").is_none());
    assert!(!project.index_path("App/Support").exists());
    assert!(project.record("App/User.php").is_some());
    project.assert_consistent();
}

#[test]
fn test_malformed_record_is_dropped_on_removal() {
    let project = Project::new();
    project.write("App/User.php", USER);
    project.update();

    fs::write(project.index_path("App/User.php"), "not json").unwrap();
    project.remove("App/User.php");
    project.update();

    assert!(!project.index_path("App/User.php").exists());
    // Artifacts are only ever deleted through a readable record.
    for path in project.class_artifacts("App\\User") {
        assert!(path.is_file());
    }
}

#[test]
fn test_undeletable_artifact_stays_recorded() {
    let project = Project::new();
    project.write("App/User.php", USER);
    project.update();

    let [live, mock] = project.class_artifacts("App\\User");
    fs::remove_file(&live).unwrap();
    fs::create_dir_all(live.join("stuck")).unwrap();

    project.remove("App/User.php");
    let summary = project.update();
    assert_eq!(summary.removed, 1);
    assert!(!mock.exists());
    let record = project.record("App/User.php").expect("record kept for the stuck artifact");
    assert_eq!(record.classes.iter().collect::<Vec<_>>(), vec!["App\\User"]);

    fs::remove_dir_all(&live).unwrap();
    project.write("App/User.php", USER);
    let summary = project.update();
    assert_eq!(summary.added, 1);
    assert!(live.is_file());
    project.assert_consistent();
}

// =============================================================================
// Partial failures
// =============================================================================

#[test]
fn test_failed_write_rolls_back_the_file() {
    let project = Project::new();
    project.write("App/User.php", USER);
    project.write("App/Support/helpers.php", HELPERS);

    // The live artifact is written first; a directory in place of the mock
    // makes the second write fail.
    let [live, mock] = project.class_artifacts("App\\User");
    fs::create_dir_all(&mock).unwrap();

    let summary = project.update();
    assert_eq!(summary.skipped, 1);
    assert!(project.record("App/User.php").is_none());
    assert!(!live.exists());
    assert!(mock.is_dir());

    assert!(project.record("App/Support/helpers.php").is_some());
    assert_eq!(summary.artifacts_written, 4);
    project.assert_consistent();
}

// =============================================================================
// Unparsable files
// =============================================================================

#[test]
fn test_unparsable_file_is_skipped_until_fixed() {
    let project = Project::new();
    project.write("App/Broken.php", "<?php\nclass Broken {\n    public function f() {\n");

    let summary = project.update();
    assert_eq!(summary.skipped, 1);
    assert!(project.record("App/Broken.php").is_none());
    assert!(project.generated_files().is_empty());

    project.write("App/Broken.php", "<?php\nclass Broken {\n    public function f() {}\n}\n");
    let summary = project.update();
    assert_eq!(summary.modified, 1);
    assert!(project.record("App/Broken.php").is_some());
    project.assert_consistent();
}

#[test]
fn test_file_without_declarations_gets_empty_record() {
    let project = Project::new();
    project.write("bootstrap.php", "<?php\nrequire 'vendor/autoload.php';\n");
    project.update();

    let record = project.record("bootstrap.php").unwrap();
    assert!(record.is_empty());
    assert!(project.generated_files().is_empty());
}

// =============================================================================
// Tree shape changes and exclusions
// =============================================================================

#[test]
fn test_file_replaced_by_directory_converges() {
    let project = Project::new();
    project.write("Legacy", "<?php\nclass Legacy {}\n");
    project.update();

    project.remove("Legacy");
    project.write("Legacy/Modern.php", "<?php\nclass Modern {}\n");
    let summary = project.update();

    assert_eq!(summary.removed, 1);
    assert_eq!(summary.added, 1);
    assert_eq!(summary.deferred, 0);
    assert!(project.record("Legacy/Modern.php").is_some());
    for path in project.class_artifacts("Legacy") {
        assert!(!path.exists());
    }
    project.assert_consistent();
    assert!(project.update().is_noop());
}

#[test]
fn test_excluded_paths_are_not_cached() {
    let mut project = Project::new();
    project.excludes = vec!["vendor/**".to_string()];
    project.write("vendor/lib/Client.php", "<?php\nclass Client {}\n");
    project.write("App/User.php", USER);
    project.write(".git/hooks/pre-commit.php", "<?php\nfunction hook() {}\n");

    let summary = project.update();
    assert_eq!(summary.added, 1);
    assert!(project.record("vendor/lib/Client.php").is_none());
    assert!(project.record(".git/hooks/pre-commit.php").is_none());
    project.assert_consistent();
}

#[test]
fn test_cache_inside_source_root_is_ignored() {
    let project = Project::new();
    project.write("App/User.php", USER);
    let cache = project.src().join(".cache");

    let cacher = Cacher::new(Vec::new(), Duration::from_secs(5));
    let first = cacher.update(project.root(), &project.src(), &cache).unwrap();
    let second = cacher.update(project.root(), &project.src(), &cache).unwrap();

    assert_eq!(first.added, 1);
    assert!(second.is_noop(), "cache files were picked up: {}", second);
}

// =============================================================================
// Locking
// =============================================================================

#[test]
fn test_held_lock_times_out() {
    let project = Project::new();
    project.write("App/User.php", USER);
    fs::create_dir_all(project.cache()).unwrap();

    let _held = CacheLock::acquire(&project.cache(), Duration::from_secs(1)).unwrap();
    let cacher = Cacher::new(Vec::new(), Duration::from_millis(200));
    let err = cacher
        .update(project.root(), &project.src(), &project.cache())
        .unwrap_err();

    assert!(matches!(err, CacheError::Lock(LockError::Timeout { .. })));
    assert!(project.record("App/User.php").is_none());
}

#[test]
fn test_lock_is_released_after_update() {
    let project = Project::new();
    project.write("App/User.php", USER);
    project.update();

    let lock = CacheLock::acquire(&project.cache(), Duration::from_millis(200));
    assert!(lock.is_ok());
}

#[test]
fn test_missing_source_root_is_fatal() {
    let project = Project::new();
    let cacher = Cacher::new(Vec::new(), Duration::from_secs(1));
    let err = cacher
        .update(project.root(), &project.root().join("nope"), &project.cache())
        .unwrap_err();
    assert!(matches!(err, CacheError::Watcher(_)));
}
