//! CLI end-to-end tests.
//!
//! These tests spawn the actual `varpatch` binary and validate stdout/exit codes.
//!
//! Exit code expectations:
//! - 0: Success
//! - 2: Invalid arguments (unreadable file, malformed options)
//! - 3: Parse error (unbalanced directives, unparseable formula)
//! - 4: Patch rejected

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

/// Run varpatch with given arguments and return (stdout, stderr, exit_code).
fn run_varpatch(args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_varpatch"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute varpatch");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

/// Write `content` to `name` inside `dir` and return the path as a string.
fn write_file(dir: &Path, name: &str, content: &str) -> String {
    let path: PathBuf = dir.join(name);
    fs::write(&path, content).expect("write fixture file");
    path.display().to_string()
}

/// A temp dir holding `before.c`, `after.c` and `target.c`.
fn fixture(before: &str, after: &str, target: &str) -> (TempDir, [String; 3]) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let paths = [
        write_file(dir.path(), "before.c", before),
        write_file(dir.path(), "after.c", after),
        write_file(dir.path(), "target.c", target),
    ];
    (dir, paths)
}

// ============================================================================
// Patch
// ============================================================================

#[test]
fn patch_prints_patched_source() {
    let (_dir, [before, after, target]) = fixture(
        "int a;\nint b;\n",
        "int a;\nint x;\nint b;\n",
        "int a;\nint b;\n#if DEBUG\nlog();\n#endif\n",
    );
    let (stdout, _stderr, exit_code) = run_varpatch(&[
        "patch", "--before", &before, "--after", &after, "--target", &target,
    ]);
    assert_eq!(exit_code, 0);
    assert_eq!(stdout, "int a;\nint x;\nint b;\n#if DEBUG\nlog();\n#endif\n");
}

#[test]
fn patch_json_reports_outcome() {
    let (dir, [before, after, target]) = fixture(
        "a\nx\nb\n",
        "a\nb\n",
        "a\n#if T\nt\n#endif\nx\n#if T2\nt2\n#endif\nb\n",
    );
    let expected = write_file(
        dir.path(),
        "expected.c",
        "a\n#if T\nt\n#endif\n#if T2\nt2\n#endif\nb\n",
    );
    let (stdout, _stderr, exit_code) = run_varpatch(&[
        "patch", "--before", &before, "--after", &after, "--target", &target, "--expected",
        &expected, "--format", "json",
    ]);
    assert_eq!(exit_code, 0);

    let json: Value = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["removed_roots"], 1);
    assert_eq!(json["alignment_problems"], 1);
    assert_eq!(json["deselected"], serde_json::json!(["T", "T2"]));
    assert_eq!(json["matches_expected"], true);
}

#[test]
fn patch_from_unified_diff() {
    let dir = tempfile::tempdir().unwrap();
    let diff = write_file(
        dir.path(),
        "change.patch",
        "--- a/f.c\n+++ b/f.c\n@@ -1,2 +1,3 @@\n a\n+x\n b\n",
    );
    let target = write_file(dir.path(), "target.c", "a\nb\nc\n");
    let (stdout, _stderr, exit_code) =
        run_varpatch(&["patch", "--diff", &diff, "--target", &target]);
    assert_eq!(exit_code, 0);
    assert_eq!(stdout, "a\nx\nb\nc\n");
}

#[test]
fn options_file_enables_new_features() {
    let (dir, [before, after, target]) =
        fixture("a\nb\n", "a\n#if NEW\nn\n#endif\nb\n", "a\nb\n");
    let options = write_file(dir.path(), "options.json", r#"{"patch_new_features": true}"#);

    let (stdout, _stderr, exit_code) = run_varpatch(&[
        "patch", "--before", &before, "--after", &after, "--target", &target,
    ]);
    assert_eq!(exit_code, 0);
    assert_eq!(stdout, "a\nb\n");

    let (stdout, _stderr, exit_code) = run_varpatch(&[
        "patch", "--before", &before, "--after", &after, "--target", &target, "--options",
        &options,
    ]);
    assert_eq!(exit_code, 0);
    assert_eq!(stdout, "a\n#if NEW\nn\n#endif\nb\n");
}

#[test]
fn rejected_patch_exits_4() {
    let (_dir, [before, after, target]) = fixture("x\n", "x\ny\n", "x\nx\n");
    let (stdout, _stderr, exit_code) = run_varpatch(&[
        "patch", "--before", &before, "--after", &after, "--target", &target,
    ]);
    assert_eq!(exit_code, 4);

    let json: Value = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"]["code"], 4);
    assert_eq!(json["error"]["details"]["stage"], "additions_applied");
}

// ============================================================================
// Input Errors
// ============================================================================

#[test]
fn missing_file_exits_2() {
    let (_dir, [before, after, _target]) = fixture("a\n", "b\n", "a\n");
    let (stdout, _stderr, exit_code) = run_varpatch(&[
        "patch",
        "--before",
        &before,
        "--after",
        &after,
        "--target",
        "/nonexistent/target.c",
    ]);
    assert_eq!(exit_code, 2);
    let json: Value = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["schema_version"], "1");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("/nonexistent/target.c"));
}

#[test]
fn unbalanced_target_exits_3() {
    let (_dir, [before, after, target]) = fixture("a\n", "a\nb\n", "#if A\na\n");
    let (stdout, _stderr, exit_code) = run_varpatch(&[
        "patch", "--before", &before, "--after", &after, "--target", &target,
    ]);
    assert_eq!(exit_code, 3);
    let json: Value = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["error"]["details"]["file"], target.as_str());
}

// ============================================================================
// Annotation and Tree
// ============================================================================

#[test]
fn annotation_prints_formula() {
    let (stdout, _stderr, exit_code) = run_varpatch(&["annotation", "#ifndef CONFIG_X"]);
    assert_eq!(exit_code, 0);
    assert!(stdout.starts_with("if"));
    assert!(stdout.contains("defined(CONFIG_X)"));

    let (stdout, _stderr, exit_code) =
        run_varpatch(&["annotation", "#if A &&", "--format", "json"]);
    assert_eq!(exit_code, 3);
    let json: Value = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["error"]["code"], 3);
}

#[test]
fn annotation_json_for_jpp() {
    let (stdout, _stderr, exit_code) = run_varpatch(&[
        "annotation",
        "//#if ${os} == \"linux\" and DEBUG",
        "--dialect",
        "jpp",
        "--format",
        "json",
    ]);
    assert_eq!(exit_code, 0);
    let json: Value = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["kind"], "if");
    assert_eq!(json["features"].as_array().unwrap().len(), 2);
}

#[test]
fn tree_json_reports_size() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "f.c", "a\n#if A\nb\n#else\nc\n#endif\n");
    let (stdout, _stderr, exit_code) = run_varpatch(&["tree", &file, "--format", "json"]);
    assert_eq!(exit_code, 0);
    let json: Value = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["size"], 5);
    assert!(json["rendered"].as_str().unwrap().contains("#else"));
}
