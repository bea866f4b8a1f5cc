//! Purpose: Define the stable public Rust API boundary for the machinery binding.
//! Exports: Binding, resolution, and error types needed by the CLI and callers.
//! Role: Public, additive-only surface over the `core` modules.
//! Invariants: Symbol dereferencing stays inside `core::symbols`; only its trait is exposed.

pub use crate::core::binding::{Machinery, VersionInfo};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::resolve::{
    CANONICAL_NAME, LIBRARY_ENV, LIBRARY_NAME, LibraryOpener, NativeOpener, Origin, Resolved,
    Resolver, Strategy,
};
pub use crate::core::search::find_library;
pub use crate::core::symbols::SymbolSource;
pub use crate::core::sys::{QueryFn, VersionNumber};
