//! Purpose: Typed access to data symbols and query functions of a loaded library.
//! Exports: `SymbolSource`, `read_c_string`, `missing_symbol`.
//! Role: The only place raw symbol addresses are dereferenced.
//! Invariants: Missing or null symbols surface as `SymbolNotFound`, never as a crash.
//! Invariants: Values are copied out; no reference into library memory escapes.
use std::ffi::CStr;
use std::os::raw::c_char;

use crate::core::error::{Error, ErrorKind};
use crate::core::sys::{QueryFn, symbol_name};

/// Something that can resolve libmachinery symbols.
///
/// Implemented for [`libloading::Library`]; tests supply in-process doubles.
pub trait SymbolSource {
    /// Copy the value of the data symbol `symbol` (NUL-terminated name).
    ///
    /// # Safety
    /// `T` must match the C type the library declares for `symbol`.
    unsafe fn read_data<T: Copy>(&self, symbol: &[u8]) -> Result<T, Error>;

    /// Resolve `symbol` as a capability query function.
    ///
    /// # Safety
    /// The exported function must have the [`QueryFn`] signature, and the
    /// returned pointer must not be called after `self` is dropped.
    unsafe fn query_fn(&self, symbol: &[u8]) -> Result<QueryFn, Error>;
}

impl SymbolSource for libloading::Library {
    unsafe fn read_data<T: Copy>(&self, symbol: &[u8]) -> Result<T, Error> {
        let address: libloading::Symbol<'_, *const T> =
            unsafe { self.get(symbol) }.map_err(|err| missing_symbol(symbol).with_source(err))?;
        let address = *address;
        if address.is_null() {
            return Err(missing_symbol(symbol).with_message("symbol address is null"));
        }
        Ok(unsafe { address.read() })
    }

    unsafe fn query_fn(&self, symbol: &[u8]) -> Result<QueryFn, Error> {
        let function: libloading::Symbol<'_, QueryFn> =
            unsafe { self.get(symbol) }.map_err(|err| missing_symbol(symbol).with_source(err))?;
        Ok(*function)
    }
}

/// Read a `const char*` data symbol into an owned string.
///
/// # Safety
/// `symbol` must be declared as `const char*` and point at NUL-terminated text.
pub unsafe fn read_c_string<S: SymbolSource>(source: &S, symbol: &[u8]) -> Result<String, Error> {
    let text: *const c_char = unsafe { source.read_data(symbol)? };
    if text.is_null() {
        return Err(missing_symbol(symbol).with_message("string symbol is a null pointer"));
    }
    Ok(unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned())
}

pub fn missing_symbol(symbol: &[u8]) -> Error {
    Error::new(ErrorKind::SymbolNotFound)
        .with_message("symbol not found in library")
        .with_symbol(symbol_name(symbol))
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-process stand-in for a loaded libmachinery.
    use std::any::Any;
    use std::collections::HashMap;
    use std::ffi::{CStr, CString};
    use std::os::raw::{c_char, c_void};

    use super::{SymbolSource, missing_symbol};
    use crate::core::error::Error;
    use crate::core::sys::{self, QueryFn, VersionNumber};

    pub(crate) struct FakeLibrary {
        data: HashMap<Vec<u8>, *const c_void>,
        functions: HashMap<Vec<u8>, QueryFn>,
        _storage: Vec<Box<dyn Any>>,
    }

    unsafe extern "C" fn feature_exists(name: *const c_char) -> bool {
        let name = unsafe { CStr::from_ptr(name) };
        matches!(name.to_bytes(), b"ascii" | b"unicode")
    }

    unsafe extern "C" fn module_exists(name: *const c_char) -> bool {
        let name = unsafe { CStr::from_ptr(name) };
        matches!(name.to_bytes(), b"x86" | b"ir" | b"jit")
    }

    impl FakeLibrary {
        pub(crate) fn empty() -> Self {
            Self {
                data: HashMap::new(),
                functions: HashMap::new(),
                _storage: Vec::new(),
            }
        }

        /// Version 1.2.3; features ascii + unicode; modules x86, ir, jit.
        pub(crate) fn reference() -> Self {
            Self::empty()
                .with_version_string(Some("1.2.3"))
                .with_number(sys::VERSION_MAJOR, 1)
                .with_number(sys::VERSION_MINOR, 2)
                .with_number(sys::VERSION_PATCH, 3)
                .with_function(sys::FEATURE_EXISTS, feature_exists)
                .with_function(sys::MODULE_EXISTS, module_exists)
        }

        pub(crate) fn with_version_string(mut self, text: Option<&str>) -> Self {
            let pointer: Box<*const c_char> = match text {
                Some(text) => {
                    let owned = CString::new(text).expect("no interior nul");
                    let pointer = Box::new(owned.as_ptr());
                    self._storage.push(Box::new(owned));
                    pointer
                }
                None => Box::new(std::ptr::null()),
            };
            let address = &*pointer as *const *const c_char as *const c_void;
            self._storage.push(pointer);
            self.data.insert(sys::VERSION_STRING.to_vec(), address);
            self
        }

        pub(crate) fn with_number(mut self, symbol: &[u8], value: VersionNumber) -> Self {
            let boxed = Box::new(value);
            let address = &*boxed as *const VersionNumber as *const c_void;
            self._storage.push(boxed);
            self.data.insert(symbol.to_vec(), address);
            self
        }

        pub(crate) fn with_function(mut self, symbol: &[u8], function: QueryFn) -> Self {
            self.functions.insert(symbol.to_vec(), function);
            self
        }

        pub(crate) fn without(mut self, symbol: &[u8]) -> Self {
            self.data.remove(symbol);
            self.functions.remove(symbol);
            self
        }
    }

    impl SymbolSource for FakeLibrary {
        unsafe fn read_data<T: Copy>(&self, symbol: &[u8]) -> Result<T, Error> {
            let address = self
                .data
                .get(symbol)
                .ok_or_else(|| missing_symbol(symbol))?;
            Ok(unsafe { address.cast::<T>().read() })
        }

        unsafe fn query_fn(&self, symbol: &[u8]) -> Result<QueryFn, Error> {
            self.functions
                .get(symbol)
                .copied()
                .ok_or_else(|| missing_symbol(symbol))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeLibrary;
    use super::*;
    use crate::core::sys;

    #[test]
    fn reads_string_and_numbers() {
        let library = FakeLibrary::reference();
        let text = unsafe { read_c_string(&library, sys::VERSION_STRING) }.expect("string");
        assert_eq!(text, "1.2.3");
        let minor: sys::VersionNumber =
            unsafe { library.read_data(sys::VERSION_MINOR) }.expect("minor");
        assert_eq!(minor, 2);
    }

    #[test]
    fn null_string_pointer_is_symbol_error() {
        let library = FakeLibrary::reference().with_version_string(None);
        let err = unsafe { read_c_string(&library, sys::VERSION_STRING) }.expect_err("null");
        assert_eq!(err.kind(), ErrorKind::SymbolNotFound);
        assert_eq!(err.symbol(), Some("machinery_version_string"));
    }

    #[test]
    fn missing_function_names_the_symbol() {
        let library = FakeLibrary::reference().without(sys::FEATURE_EXISTS);
        let err = unsafe { library.query_fn(sys::FEATURE_EXISTS) }.expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::SymbolNotFound);
        assert_eq!(err.symbol(), Some("machinery_feature_exists"));
    }
}
