//! Purpose: The libmachinery binding object: version info plus capability queries.
//! Exports: `Machinery`, `VersionInfo`.
//! Role: Load once, copy the version globals, then forward queries on demand.
//! Invariants: A `Machinery` value exists only when every symbol was bound.
//! Invariants: Version fields are read once, from one library instance, and never recomputed.
//! Invariants: Queries are not cached; every call crosses into the library.
use std::ffi::CString;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::error::Error;
use crate::core::resolve::{NativeOpener, Origin, Resolver, Strategy};
use crate::core::symbols::{SymbolSource, read_c_string};
use crate::core::sys::{self, QueryFn, VersionNumber};

/// Version globals copied out of the library at bind time.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VersionInfo {
    pub string: String,
    pub major: VersionNumber,
    pub minor: VersionNumber,
    pub patch: VersionNumber,
}

impl VersionInfo {
    pub fn triple(&self) -> (VersionNumber, VersionNumber, VersionNumber) {
        (self.major, self.minor, self.patch)
    }

    /// Whether the text starts with the `major.minor.patch` the integers describe.
    pub fn is_consistent(&self) -> bool {
        let numeric = format!("{}.{}.{}", self.major, self.minor, self.patch);
        match self.string.strip_prefix(&numeric) {
            Some(rest) => rest.is_empty() || !rest.starts_with(|c: char| c.is_ascii_digit()),
            None => false,
        }
    }

    unsafe fn read<S: SymbolSource>(source: &S) -> Result<Self, Error> {
        let info = unsafe {
            Self {
                string: read_c_string(source, sys::VERSION_STRING)?,
                major: source.read_data(sys::VERSION_MAJOR)?,
                minor: source.read_data(sys::VERSION_MINOR)?,
                patch: source.read_data(sys::VERSION_PATCH)?,
            }
        };
        if !info.is_consistent() {
            warn!(
                version = %info.string,
                major = info.major,
                minor = info.minor,
                patch = info.patch,
                "version string disagrees with version numbers"
            );
        }
        Ok(info)
    }
}

/// A bound libmachinery.
///
/// Owns the library handle, so the bound query functions stay valid for the
/// lifetime of the value.
pub struct Machinery<S = libloading::Library> {
    version: VersionInfo,
    feature_exists: QueryFn,
    module_exists: QueryFn,
    origin: Origin,
    _source: S,
}

impl Machinery {
    /// Resolve with the default chain (plus `MACHINERY_LIBRARY`) and bind.
    pub fn load() -> Result<Self, Error> {
        Self::load_with(&Resolver::from_env())
    }

    pub fn load_with(resolver: &Resolver) -> Result<Self, Error> {
        let resolved = resolver.resolve(&NativeOpener)?;
        let machinery = Self::bind_with_origin(resolved.handle, resolved.origin)?;
        info!(
            origin = %machinery.origin,
            version = %machinery.version.string,
            "libmachinery loaded"
        );
        Ok(machinery)
    }

    /// Load and bind the library at `path`, skipping the search chain.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        Self::load_with(&Resolver::new(vec![Strategy::Explicit(path.into())]))
    }
}

impl<S: SymbolSource> Machinery<S> {
    /// Bind an already-opened symbol source.
    pub fn bind(source: S) -> Result<Self, Error> {
        Self::bind_with_origin(source, Origin::Provided)
    }

    fn bind_with_origin(source: S, origin: Origin) -> Result<Self, Error> {
        // Safety: the symbol types below are the libmachinery C declarations.
        let (version, feature_exists, module_exists) = unsafe {
            (
                VersionInfo::read(&source)?,
                source.query_fn(sys::FEATURE_EXISTS)?,
                source.query_fn(sys::MODULE_EXISTS)?,
            )
        };
        debug!(%origin, "libmachinery symbols bound");
        Ok(Self {
            version,
            feature_exists,
            module_exists,
            origin,
            _source: source,
        })
    }
}

impl<S> Machinery<S> {
    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn version_string(&self) -> &str {
        &self.version.string
    }

    pub fn version_major(&self) -> VersionNumber {
        self.version.major
    }

    pub fn version_minor(&self) -> VersionNumber {
        self.version.minor
    }

    pub fn version_patch(&self) -> VersionNumber {
        self.version.patch
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Whether the library was built with the named feature (`ascii`, `debug`, `unicode`, ...).
    pub fn has_feature(&self, name: &str) -> bool {
        query(self.feature_exists, name)
    }

    /// Whether the library includes the named module (`arm`, `mips`, `x86`, `ir`, `jit`, ...).
    pub fn has_module(&self, name: &str) -> bool {
        query(self.module_exists, name)
    }
}

impl<S> std::fmt::Debug for Machinery<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machinery")
            .field("version", &self.version)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

fn query(function: QueryFn, name: &str) -> bool {
    // C text cannot carry an interior NUL, so no library could report such a name.
    let Ok(name) = CString::new(name) else {
        debug!(name, "query name contains NUL; reporting absent");
        return false;
    };
    unsafe { function(name.as_ptr()) }
}
