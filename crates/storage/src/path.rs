//! Object key validation.
//!
//! Keys are `/`-separated and relative to the store root. They must never be
//! able to escape it (no `..` traversal), whichever backend ends up mapping
//! them onto a filesystem.

use std::path::{Component, Path};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes an object key.
///
/// > **Note:** This does **not** normalize backslashes or platform-specific
/// >           weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized key if valid, or [`InvalidKey`](crate::error::ErrorKind::InvalidKey)
/// if invalid.
///
/// # Examples
///
/// ```
/// use ferry_storage::validate_key;
/// // Valid keys
/// assert!(validate_key("media/abc-123/6602.jpg").is_ok());
/// assert!(validate_key("a/../file.jpg").is_ok()); // (never leaves the root)
/// // Invalid keys
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a/../../b").is_err());
/// assert!(validate_key("a\0b").is_err());
/// // Keys get resolved
/// assert_eq!(validate_key("wrong/.././media//./a.jpg/").unwrap(), "media/a.jpg");
/// ```
pub fn validate(key: impl AsRef<str>) -> Result<String> {
    let key = key.as_ref();
    let invalid = || exn::Exn::from(ErrorKind::InvalidKey(key.to_string()));
    let mut components: Vec<&str> = Vec::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                let s = s.to_str().ok_or_else(invalid)?;
                if s.contains('\0') {
                    return Err(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => return Err(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    return Err(invalid());
                }
            },
        }
    }
    match components.is_empty() {
        true => Err(invalid()),
        false => Ok(components.join("/")),
    }
}
