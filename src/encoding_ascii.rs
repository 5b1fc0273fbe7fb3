//! OEM encoding functions for operating systems other than Windows.
//!
//! Other operating systems have no configured ANSI code page to fall back on. The only single-byte
//! encoding every peer agrees on is ASCII, so anything outside of it is rejected.


/// Converts the given Rust string into a single-byte OEM string.
///
/// Returns `None` if the string contains characters outside of ASCII.
pub fn rust_string_to_oem(rust_str: &str) -> Option<Vec<u8>> {
    if !rust_str.is_ascii() {
        return None;
    }
    Some(Vec::from(rust_str.as_bytes()))
}
