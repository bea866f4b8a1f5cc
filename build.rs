//! Purpose: Build the stand-in libmachinery used by the binding tests.
//! Role: Cargo build-script; compiles `c/machinery_fixture.c` into shared objects under `OUT_DIR`.
//! Invariants: Never fails the build; a missing C toolchain only disables fixture-backed tests.
//! Invariants: Exposes fixture paths via `MACHINERY_FIXTURE_LIB` and `MACHINERY_PARTIAL_FIXTURE_LIB`.
//! Invariants: Only builds for native unix targets (the fixture must be loadable by the test host).
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=c/machinery_fixture.c");
    println!("cargo:rerun-if-env-changed=MACHINERY_SKIP_FIXTURE");

    let target = env::var("TARGET").unwrap_or_default();
    let host = env::var("HOST").unwrap_or_default();
    if env::var_os("MACHINERY_SKIP_FIXTURE").is_some() {
        return;
    }
    if target != host || target.contains("windows") {
        println!("cargo:warning=skipping libmachinery test fixture for target `{target}`");
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let source = manifest_dir.join("c").join("machinery_fixture.c");
    let fixture_dir = out_dir.join("fixture");
    let partial_dir = out_dir.join("fixture-partial");
    for dir in [&fixture_dir, &partial_dir] {
        fs::create_dir_all(dir).expect("failed to create fixture directory");
    }

    let file_name = if target.contains("apple") {
        "libmachinery.0.dylib"
    } else {
        "libmachinery.so.0"
    };

    let full = fixture_dir.join(file_name);
    if compile_shared(&target, &source, &full, &[]) {
        println!("cargo:rustc-env=MACHINERY_FIXTURE_LIB={}", full.display());
    }
    let partial = partial_dir.join(file_name);
    if compile_shared(&target, &source, &partial, &["MACHINERY_FIXTURE_PARTIAL"]) {
        println!(
            "cargo:rustc-env=MACHINERY_PARTIAL_FIXTURE_LIB={}",
            partial.display()
        );
    }
}

fn compile_shared(target: &str, source: &Path, output: &Path, defines: &[&str]) -> bool {
    let compiler = match cc::Build::new().cargo_metadata(false).try_get_compiler() {
        Ok(compiler) => compiler,
        Err(err) => {
            println!("cargo:warning=no C compiler for libmachinery test fixture: {err}");
            return false;
        }
    };

    let mut command = compiler.to_command();
    if target.contains("apple") {
        command.arg("-dynamiclib");
    } else {
        command.arg("-shared");
    }
    command.arg("-fPIC").arg("-std=c99");
    for define in defines {
        command.arg(format!("-D{define}"));
    }
    command.arg("-o").arg(output).arg(source);

    match command.status() {
        Ok(status) if status.success() => true,
        Ok(status) => {
            println!(
                "cargo:warning=libmachinery test fixture build exited with {status}; fixture tests will be skipped"
            );
            false
        }
        Err(err) => {
            println!(
                "cargo:warning=failed to run C compiler for libmachinery test fixture: {err}"
            );
            false
        }
    }
}
