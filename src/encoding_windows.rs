//! Windows-specific OEM encoding functions.
//!
//! On Windows, the LM one-way function encodes the password using the configured OEM code page, as
//! the system's own LM hash does. The operating system provides the conversion from Unicode
//! (UTF-16) to that code page.


use windows::Win32::Foundation::BOOL;
use windows::Win32::Globalization::{CP_OEMCP, WC_NO_BEST_FIT_CHARS, WideCharToMultiByte};


/// Converts the given Rust string into a string in the OEM code page.
///
/// Best-fit mappings are turned off, so a character without an exact counterpart becomes the code
/// page's default character. Returns `None` in that case or if the conversion fails, since a lossy
/// password would silently yield the wrong key.
pub fn rust_string_to_oem(rust_str: &str) -> Option<Vec<u8>> {
    if rust_str.len() == 0 {
        return Some(Vec::new());
    }

    // first, obtain Unicode (UTF-16) string from the Rust string
    let unicode: Vec<u16> = rust_str.encode_utf16().collect();

    // then, convert to the OEM codepage
    // how many bytes will we require?
    let byte_count = unsafe {
        WideCharToMultiByte(
            CP_OEMCP,
            WC_NO_BEST_FIT_CHARS,
            &unicode,
            None,
            None,
            None,
        )
    };
    let byte_count_usize: usize = byte_count.try_into().ok()?;
    if byte_count_usize == 0 {
        return None;
    }

    let mut buf = vec![0u8; byte_count_usize];
    let mut used_default_char = BOOL(0);
    let bytes_written = unsafe {
        WideCharToMultiByte(
            CP_OEMCP,
            WC_NO_BEST_FIT_CHARS,
            &unicode,
            Some(buf.as_mut_slice()),
            None,
            Some(&mut used_default_char as *mut BOOL),
        )
    };
    let bytes_written_usize: usize = bytes_written.try_into().ok()?;
    if bytes_written_usize == 0 || used_default_char.as_bool() {
        return None;
    }
    buf.truncate(bytes_written_usize);

    Some(buf)
}
