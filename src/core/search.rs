//! Purpose: Locate a shared library by logical name on the system search path.
//! Exports: `find_library`, `find_library_in`, `default_search_dirs`, `default_search_dirs_with`.
//! Exports: `ld_so_conf_dirs`, `library_file_matches`, `LD_SO_CONF`.
//! Role: Name-based fallback used after the canonical soname fails to load.
//! Invariants: Directories are scanned in order; the first directory with a match wins.
//! Invariants: Within a directory the unversioned file wins, else the numerically highest version.
//! Invariants: On Linux the dynamic linker's `ld.so.conf` directories follow the environment path.
//! Invariants: Only returns a path; never loads anything.
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

/// Environment variables consulted before the default directories.
#[cfg(target_os = "macos")]
const SEARCH_PATH_VARS: &[&str] = &["DYLD_LIBRARY_PATH", "DYLD_FALLBACK_LIBRARY_PATH"];
#[cfg(windows)]
const SEARCH_PATH_VARS: &[&str] = &["PATH"];
#[cfg(not(any(target_os = "macos", windows)))]
const SEARCH_PATH_VARS: &[&str] = &["LD_LIBRARY_PATH"];

#[cfg(target_os = "macos")]
const DEFAULT_DIRS: &[&str] = &["/usr/local/lib", "/opt/homebrew/lib", "/usr/lib"];
#[cfg(windows)]
const DEFAULT_DIRS: &[&str] = &[];
#[cfg(not(any(target_os = "macos", windows)))]
const DEFAULT_DIRS: &[&str] = &["/usr/local/lib", "/usr/local/lib64", "/usr/lib64", "/lib64", "/usr/lib", "/lib"];

/// Dynamic-linker configuration read for registered library directories.
#[cfg(target_os = "linux")]
pub const LD_SO_CONF: Option<&str> = Some("/etc/ld.so.conf");
#[cfg(not(target_os = "linux"))]
pub const LD_SO_CONF: Option<&str> = None;

// ld.so.conf files may include each other; cycles stop here.
const MAX_CONF_DEPTH: usize = 8;

/// Search the environment's loader path, then the platform defaults.
pub fn find_library(name: &str) -> Option<PathBuf> {
    let dirs = default_search_dirs(|key| std::env::var_os(key));
    find_library_in(name, &dirs)
}

pub fn find_library_in(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| best_match_in(name, dir))
}

/// Search directories in precedence order, with duplicates removed.
pub fn default_search_dirs<F>(lookup: F) -> Vec<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    default_search_dirs_with(lookup, LD_SO_CONF.map(Path::new))
}

/// Like [`default_search_dirs`], reading linker directories from `ld_so_conf`.
pub fn default_search_dirs_with<F>(lookup: F, ld_so_conf: Option<&Path>) -> Vec<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    let mut dirs: Vec<PathBuf> = Vec::new();
    for var in SEARCH_PATH_VARS {
        if let Some(value) = lookup(var) {
            dirs.extend(std::env::split_paths(&value).filter(|dir| !dir.as_os_str().is_empty()));
        }
    }
    if let Some(conf) = ld_so_conf {
        dirs.extend(ld_so_conf_dirs(conf));
    }
    dirs.extend(multiarch_dirs());
    dirs.extend(DEFAULT_DIRS.iter().map(PathBuf::from));

    let mut unique = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if !unique.contains(&dir) {
            unique.push(dir);
        }
    }
    unique
}

/// Directories registered in an `ld.so.conf`-style file, following `include` lines.
///
/// A missing or unreadable file contributes nothing.
pub fn ld_so_conf_dirs(conf: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    read_ld_so_conf(conf, 0, &mut dirs);
    dirs
}

fn read_ld_so_conf(conf: &Path, depth: usize, dirs: &mut Vec<PathBuf>) {
    if depth > MAX_CONF_DEPTH {
        trace!(conf = %conf.display(), "ld.so.conf include depth exceeded");
        return;
    }
    let Ok(text) = fs::read_to_string(conf) else {
        return;
    };
    let base = conf.parent().unwrap_or_else(|| Path::new("/"));
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(pattern) = line.strip_prefix("include") {
            if pattern.starts_with(char::is_whitespace) {
                for pattern in pattern.split_whitespace() {
                    for included in expand_include(base, pattern) {
                        read_ld_so_conf(&included, depth + 1, dirs);
                    }
                }
                continue;
            }
        }
        if line.starts_with("hwcap") {
            continue;
        }
        dirs.extend(
            line.split(|c: char| c.is_whitespace() || c == ',' || c == ':')
                .filter(|dir| dir.starts_with('/'))
                .map(PathBuf::from),
        );
    }
}

/// Expand an include pattern; a `*` is honored in the final path component only.
fn expand_include(base: &Path, pattern: &str) -> Vec<PathBuf> {
    let pattern = base.join(pattern);
    let Some(file_pattern) = pattern.file_name().and_then(|name| name.to_str()) else {
        return Vec::new();
    };
    let Some((prefix, suffix)) = file_pattern.split_once('*') else {
        return vec![pattern.clone()];
    };
    let dir = pattern.parent().unwrap_or_else(|| Path::new("/"));
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        })
        .map(|name| dir.join(name))
        .collect();
    matches.sort();
    matches
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn multiarch_dirs() -> Vec<PathBuf> {
    let triple = format!("{}-linux-gnu", std::env::consts::ARCH);
    vec![
        Path::new("/usr/lib").join(&triple),
        Path::new("/lib").join(&triple),
    ]
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn multiarch_dirs() -> Vec<PathBuf> {
    Vec::new()
}

fn best_match_in(name: &str, dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let exact = unversioned_file_name(name);
    let mut candidates: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ty| !ty.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|file_name| library_file_matches(name, file_name))
        .collect();
    if candidates.is_empty() {
        trace!(dir = %dir.display(), name, "no library candidates");
        return None;
    }
    if candidates.iter().any(|file_name| *file_name == exact) {
        return Some(dir.join(exact));
    }
    candidates.sort();
    candidates
        .into_iter()
        .max_by_key(|file_name| version_parts(name, &exact, file_name).unwrap_or_default())
        .map(|file_name| dir.join(file_name))
}

fn unversioned_file_name(name: &str) -> String {
    libloading::library_filename(name)
        .to_string_lossy()
        .into_owned()
}

/// Whether `file_name` is a shared-library file for the logical `name`,
/// versioned or not.
pub fn library_file_matches(name: &str, file_name: &str) -> bool {
    let exact = unversioned_file_name(name);
    if file_name == exact {
        return true;
    }
    versioned_match(name, &exact, file_name)
}

fn versioned_match(name: &str, exact: &str, file_name: &str) -> bool {
    version_parts(name, exact, file_name).is_some()
}

/// Numeric version components of a versioned library file name.
fn version_parts(name: &str, exact: &str, file_name: &str) -> Option<Vec<u64>> {
    let suffix = version_suffix(name, exact, file_name)?;
    if suffix.is_empty() {
        return None;
    }
    suffix
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some(part.parse::<u64>().unwrap_or(u64::MAX))
        })
        .collect()
}

#[cfg(target_os = "macos")]
fn version_suffix<'a>(name: &str, _exact: &str, file_name: &'a str) -> Option<&'a str> {
    // libNAME.1.dylib
    file_name
        .strip_prefix(&format!("lib{name}."))
        .and_then(|rest| rest.strip_suffix(".dylib"))
}

#[cfg(windows)]
fn version_suffix<'a>(name: &str, _exact: &str, file_name: &'a str) -> Option<&'a str> {
    // NAME-1.dll, libNAME-1.dll
    let stem = file_name.strip_suffix(".dll")?;
    let stem = stem.strip_prefix("lib").unwrap_or(stem);
    stem.strip_prefix(name)?.strip_prefix('-')
}

#[cfg(not(any(target_os = "macos", windows)))]
fn version_suffix<'a>(_name: &str, exact: &str, file_name: &'a str) -> Option<&'a str> {
    // libNAME.so.1, libNAME.so.1.2.3
    file_name.strip_prefix(exact)?.strip_prefix('.')
}
