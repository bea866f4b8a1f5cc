//! Purpose: Runtime binding to the libmachinery native library.
//! Exports: `api` (binding object, resolution chain, errors) and `core` (implementation).
//! Role: Library crate backing the `machinery` diagnostic CLI and external callers.
//! Invariants: The native library is only ever consumed; no machinery functionality is reimplemented.
//! Invariants: Binding state is an explicit value; there is no hidden global handle.
pub mod api;
pub mod core;
