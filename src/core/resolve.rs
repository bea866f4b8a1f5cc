//! Purpose: Ordered, data-driven resolution of the libmachinery shared library.
//! Exports: `Resolver`, `Strategy`, `Origin`, `Resolved`, `LibraryOpener`, `NativeOpener`.
//! Role: Turns "find libmachinery" into a handle, or a fatal `LibraryLoad` error.
//! Invariants: Strategies run in order and short-circuit on the first handle.
//! Invariants: A failed canonical load falls through; a failed explicit or searched load is fatal.
//! Invariants: Without configuration the chain is canonical soname, then name search.
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::search;

/// Logical library name used by the name-based search.
pub const LIBRARY_NAME: &str = "machinery";

/// Environment variable naming an explicit library path.
pub const LIBRARY_ENV: &str = "MACHINERY_LIBRARY";

#[cfg(target_os = "macos")]
pub const CANONICAL_NAME: &str = "libmachinery.0.dylib";
#[cfg(windows)]
pub const CANONICAL_NAME: &str = "libmachinery-0.dll";
#[cfg(not(any(target_os = "macos", windows)))]
pub const CANONICAL_NAME: &str = "libmachinery.so.0";

/// Opens a shared library by soname or path.
pub trait LibraryOpener {
    type Handle;

    fn open(&self, target: &OsStr) -> Result<Self::Handle, Error>;
}

/// Opens libraries with the platform dynamic loader.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeOpener;

impl LibraryOpener for NativeOpener {
    type Handle = libloading::Library;

    fn open(&self, target: &OsStr) -> Result<Self::Handle, Error> {
        // Loading runs the library's initializers; libmachinery's are trusted.
        unsafe { libloading::Library::new(target) }.map_err(|err| {
            Error::new(ErrorKind::LibraryLoad)
                .with_message("failed to load shared library")
                .with_path(PathBuf::from(target))
                .with_source(err)
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Strategy {
    /// A configured path; failure to load it is fatal.
    Explicit(PathBuf),
    /// A soname handed straight to the loader; failure falls through.
    Canonical(OsString),
    /// Name-based scan of `dirs`; a found path that fails to load is fatal.
    Search { name: String, dirs: Vec<PathBuf> },
}

/// Where a loaded library came from.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "strategy", content = "target", rename_all = "snake_case")]
pub enum Origin {
    Explicit(PathBuf),
    Canonical(String),
    Search(PathBuf),
    /// Symbols supplied by the caller rather than resolved.
    Provided,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Explicit(path) => write!(f, "explicit path {}", path.display()),
            Origin::Canonical(name) => write!(f, "canonical name {name}"),
            Origin::Search(path) => write!(f, "search result {}", path.display()),
            Origin::Provided => f.write_str("provided symbols"),
        }
    }
}

#[derive(Debug)]
pub struct Resolved<H> {
    pub handle: H,
    pub origin: Origin,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolver {
    strategies: Vec<Strategy>,
}

impl Default for Resolver {
    /// Canonical soname, then name search; ignores `MACHINERY_LIBRARY`.
    fn default() -> Self {
        Self::from_lookup(|key| match key {
            LIBRARY_ENV => None,
            _ => std::env::var_os(key),
        })
    }
}

impl Resolver {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    /// Default chain, preceded by `MACHINERY_LIBRARY` when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut strategies = vec![Strategy::Canonical(OsString::from(CANONICAL_NAME))];
        strategies.push(Strategy::Search {
            name: LIBRARY_NAME.to_string(),
            dirs: search::default_search_dirs(&lookup),
        });
        let resolver = Self::new(strategies);
        match lookup(LIBRARY_ENV).filter(|value| !value.is_empty()) {
            Some(path) => resolver.with_explicit(PathBuf::from(path)),
            None => resolver,
        }
    }

    /// Consult `path` before every other strategy.
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.strategies.insert(0, Strategy::Explicit(path.into()));
        self
    }

    pub fn push(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn resolve<O: LibraryOpener>(&self, opener: &O) -> Result<Resolved<O::Handle>, Error> {
        for strategy in &self.strategies {
            if let Some(resolved) = attempt(strategy, opener)? {
                return Ok(resolved);
            }
        }
        Err(not_found())
    }
}

fn attempt<O: LibraryOpener>(
    strategy: &Strategy,
    opener: &O,
) -> Result<Option<Resolved<O::Handle>>, Error> {
    match strategy {
        Strategy::Explicit(path) => {
            debug!(path = %path.display(), "loading configured library");
            let handle = opener.open(path.as_os_str()).map_err(|err| {
                err.with_hint(format!(
                    "Check the path given via --library or {LIBRARY_ENV}."
                ))
            })?;
            Ok(Some(Resolved {
                handle,
                origin: Origin::Explicit(path.clone()),
            }))
        }
        Strategy::Canonical(name) => match opener.open(name) {
            Ok(handle) => Ok(Some(Resolved {
                handle,
                origin: Origin::Canonical(name.to_string_lossy().into_owned()),
            })),
            Err(err) => {
                debug!(name = %name.to_string_lossy(), error = %err, "canonical load failed");
                Ok(None)
            }
        },
        Strategy::Search { name, dirs } => {
            let Some(path) = search::find_library_in(name, dirs) else {
                debug!(name = %name, dirs = dirs.len(), "library search found nothing");
                return Ok(None);
            };
            debug!(path = %path.display(), "loading searched library");
            let handle = opener.open(path.as_os_str())?;
            Ok(Some(Resolved {
                handle,
                origin: Origin::Search(path),
            }))
        }
    }
}

fn not_found() -> Error {
    Error::new(ErrorKind::LibraryLoad)
        .with_message("Machinery shared library not found")
        .with_hint(format!(
            "Install libmachinery, add its directory to the loader path, or set {LIBRARY_ENV} to the library file."
        ))
}
