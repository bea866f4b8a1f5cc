// CLI integration tests for the `machinery` diagnostic binary.
use std::process::Command;

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_machinery");
    let mut command = Command::new(exe);
    command.env_remove("MACHINERY_LIBRARY").env_remove("RUST_LOG");
    command
}

fn fixture() -> Option<&'static str> {
    let path = option_env!("MACHINERY_FIXTURE_LIB");
    if path.is_none() {
        eprintln!("libmachinery fixture not built; skipping");
    }
    path
}

fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("valid json")
}

#[test]
fn default_report_prints_grouped_lines() {
    let Some(lib) = fixture() else { return };
    let output = cmd().args(["--library", lib]).output().expect("run");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let expected = "machinery.version_string(): 1.2.3\n\
                    \n\
                    machinery.has_feature('ascii'): true\n\
                    machinery.has_feature('debug'): false\n\
                    machinery.has_feature('unicode'): true\n\
                    \n\
                    machinery.has_module('arm'): false\n\
                    machinery.has_module('mips'): false\n\
                    machinery.has_module('x86'): true\n\
                    machinery.has_module('ir'): true\n\
                    machinery.has_module('jit'): true\n\
                    \n";
    assert_eq!(stdout, expected);
}

#[test]
fn library_env_var_is_honored() {
    let Some(lib) = fixture() else { return };
    let output = cmd()
        .env("MACHINERY_LIBRARY", lib)
        .args(["version"])
        .output()
        .expect("run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).expect("utf8"),
        "machinery.version_string(): 1.2.3\n"
    );
}

#[test]
fn json_report_includes_origin() {
    let Some(lib) = fixture() else { return };
    let output = cmd()
        .args(["--library", lib, "--format", "json", "report"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let value = parse_json(&output.stdout);
    assert_eq!(value["version"]["string"], "1.2.3");
    assert_eq!(value["version"]["major"], 1);
    assert_eq!(value["origin"]["strategy"], "explicit");
    assert_eq!(value["origin"]["target"], lib);
    assert_eq!(value["features"][2]["name"], "unicode");
    assert_eq!(value["features"][2]["present"], true);
    assert_eq!(value["modules"][0]["name"], "arm");
    assert_eq!(value["modules"][0]["present"], false);
}

#[test]
fn feature_and_module_subcommands_keep_argument_order() {
    let Some(lib) = fixture() else { return };
    let features = cmd()
        .args(["--library", lib, "feature", "unicode", "nonexistent"])
        .output()
        .expect("run");
    assert!(features.status.success());
    assert_eq!(
        String::from_utf8(features.stdout).expect("utf8"),
        "machinery.has_feature('unicode'): true\nmachinery.has_feature('nonexistent'): false\n"
    );

    let modules = cmd()
        .args(["--library", lib, "--format", "json", "module", "x86", "arm"])
        .output()
        .expect("run");
    assert!(modules.status.success());
    let value = parse_json(&modules.stdout);
    assert_eq!(
        value,
        serde_json::json!([
            {"name": "x86", "present": true},
            {"name": "arm", "present": false},
        ])
    );
}

#[test]
fn repeated_names_are_reported_each_time() {
    let Some(lib) = fixture() else { return };
    let text = cmd()
        .args(["--library", lib, "feature", "ascii", "ascii"])
        .output()
        .expect("run");
    assert!(text.status.success());
    assert_eq!(
        String::from_utf8(text.stdout).expect("utf8"),
        "machinery.has_feature('ascii'): true\nmachinery.has_feature('ascii'): true\n"
    );

    let json = cmd()
        .args(["--library", lib, "--format", "json", "feature", "ascii", "ascii"])
        .output()
        .expect("run");
    assert!(json.status.success());
    let value = parse_json(&json.stdout);
    let entries = value.as_array().expect("array");
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry["name"] == "ascii" && entry["present"] == true));
}

#[test]
fn missing_library_exits_with_load_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("libmachinery.so.0");
    let output = cmd()
        .args(["--library", missing.to_str().unwrap()])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(3));
    assert!(output.stdout.is_empty());
    let value = parse_json(&output.stderr);
    assert_eq!(value["error"]["kind"], "LibraryLoad");
    assert_eq!(value["error"]["path"], missing.to_str().unwrap());
    assert!(value["error"]["hint"].as_str().unwrap().contains("--library"));
}

#[test]
fn missing_subcommand_argument_is_usage_error() {
    let output = cmd().args(["feature"]).output().expect("run");
    assert_eq!(output.status.code(), Some(2));
    let value = parse_json(&output.stderr);
    assert_eq!(value["error"]["kind"], "Usage");
}

#[test]
fn completion_does_not_need_the_library() {
    let output = cmd()
        .args(["--library", "/nonexistent/libmachinery.so.0", "completion", "bash"])
        .output()
        .expect("run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("machinery"));
}
