// Raw symbol contract of the libmachinery C interface.
use std::os::raw::{c_char, c_short};

/// `extern const char* machinery_version_string;`
pub const VERSION_STRING: &[u8] = b"machinery_version_string\0";
/// `extern const short machinery_version_major;`
pub const VERSION_MAJOR: &[u8] = b"machinery_version_major\0";
pub const VERSION_MINOR: &[u8] = b"machinery_version_minor\0";
pub const VERSION_PATCH: &[u8] = b"machinery_version_patch\0";

/// `bool machinery_feature_exists(const char* feature_name);`
pub const FEATURE_EXISTS: &[u8] = b"machinery_feature_exists\0";
/// `bool machinery_module_exists(const char* module_name);`
pub const MODULE_EXISTS: &[u8] = b"machinery_module_exists\0";

pub type VersionNumber = c_short;

/// Signature shared by both capability queries. The argument must be a
/// non-null, NUL-terminated string.
pub type QueryFn = unsafe extern "C" fn(name: *const c_char) -> bool;

/// Symbol name without the trailing NUL, for diagnostics.
pub fn symbol_name(symbol: &[u8]) -> &str {
    let trimmed = symbol.strip_suffix(b"\0").unwrap_or(symbol);
    std::str::from_utf8(trimmed).unwrap_or("<non-utf8 symbol>")
}
