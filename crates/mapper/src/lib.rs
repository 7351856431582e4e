//! Filename classification.
//!
//! Source files are named after the sequential identifier(s) of the records
//! they belong to. [`classify`] turns a filename into zero, one or many of
//! those identifiers, without any I/O:
//!
//! | Filename        | Pattern               | Identifiers          |
//! |-----------------|-----------------------|----------------------|
//! | `6602.jpg`      | [`Pattern::Single`]   | `[6602]`             |
//! | `6602a.jpg`     | [`Pattern::Multiple`] | `[6602]`             |
//! | `6000-6002.jpg` | [`Pattern::Range`]    | `[6000, 6001, 6002]` |
//! | `photo.jpg`     | [`Pattern::Invalid`]  | `[]`                 |

mod consts;
mod media;

pub use crate::consts::STORAGE_PREFIX;
pub use crate::media::{MediaType, content_type, is_valid_extension};
use crate::consts::{MAX_RANGE_LEN, MULTIPLE_REGEX, RANGE_REGEX, SINGLE_REGEX};
use crate::media::normalize_extension;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::instrument;

/// Which naming rule a filename matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// `<digits>.<ext>`
    Single,
    /// `<digits><lowercase letter>.<ext>`, one of several files for the same identifier.
    Multiple,
    /// `<digits>-<digits>.<ext>`, one file shared by every identifier in the interval.
    Range,
    /// Nothing matched; the file needs a human to look at it.
    Invalid,
}
impl Pattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multiple => "multiple",
            Self::Range => "range",
            Self::Invalid => "invalid",
        }
    }
}
impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// The result of running a filename through [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub pattern: Pattern,
    /// Identifiers in ascending order; empty when [`Pattern::Invalid`].
    pub identifiers: Vec<u64>,
    /// Lower-cased extension without the dot (empty when missing).
    pub extension: String,
    /// The filename exactly as it was given.
    pub original: String,
    /// Why the filename is [`Pattern::Invalid`].
    pub error: Option<String>,
}
impl Classification {
    fn valid(pattern: Pattern, identifiers: Vec<u64>, extension: String, original: &str) -> Self {
        Self { pattern, identifiers, extension, original: original.to_string(), error: None }
    }

    fn invalid(extension: String, original: &str, error: impl Into<String>) -> Self {
        Self {
            pattern: Pattern::Invalid,
            identifiers: Vec::new(),
            extension,
            original: original.to_string(),
            error: Some(error.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.pattern != Pattern::Invalid
    }

    /// Media type derived from the extension. Always `Some` for valid
    /// classifications.
    pub fn media_type(&self) -> Option<MediaType> {
        MediaType::from_extension(&self.extension)
    }

    pub fn content_type(&self) -> Option<&'static str> {
        content_type(&self.extension)
    }
}

/// Classify a filename into its [`Pattern`] and identifiers.
///
/// The extension is checked first and independently of the base name: an
/// otherwise valid name with a missing or unsupported extension is
/// [`Pattern::Invalid`]. Base-name rules are then tried in a fixed order:
/// range, multiple, single.
///
/// A range whose end is below its start (`6001-6000.jpg`) is invalid rather
/// than silently swapped, and so is one spanning a thousand identifiers or
/// more.
#[instrument(level = "trace")]
pub fn classify(filename: &str) -> Classification {
    let Some((base, extension)) = filename.rsplit_once('.').filter(|(_, ext)| !ext.is_empty()) else {
        return Classification::invalid(String::new(), filename, "Missing file extension");
    };
    let extension = normalize_extension(extension);
    if !is_valid_extension(&extension) {
        let error = format!("Unsupported extension: {extension}");
        return Classification::invalid(extension, filename, error);
    }

    if let Some(captures) = RANGE_REGEX.captures(base) {
        let (Ok(start), Ok(end)) = (captures[1].parse::<u64>(), captures[2].parse::<u64>()) else {
            return Classification::invalid(extension, filename, "Filename does not match any valid pattern");
        };
        if start > end {
            let error = format!("Range start {start} is greater than end {end}");
            return Classification::invalid(extension, filename, error);
        }
        if end - start >= MAX_RANGE_LEN {
            let error = format!("Range {start}-{end} is too large");
            return Classification::invalid(extension, filename, error);
        }
        return Classification::valid(Pattern::Range, (start..=end).collect(), extension, filename);
    }
    for (regex, pattern) in [(&*MULTIPLE_REGEX, Pattern::Multiple), (&*SINGLE_REGEX, Pattern::Single)] {
        if let Some(captures) = regex.captures(base) {
            return match captures[1].parse::<u64>() {
                Ok(id) => Classification::valid(pattern, vec![id], extension, filename),
                // Too many digits to be an identifier.
                Err(_) => Classification::invalid(extension, filename, "Filename does not match any valid pattern"),
            };
        }
    }
    Classification::invalid(extension, filename, "Filename does not match any valid pattern")
}

/// Object store key for a file: `media/{target_id}/{filename}`.
///
/// The target is the one resolved from the *first* identifier, so a range
/// file is stored once regardless of how many targets it links to.
pub fn storage_key(target_id: &str, filename: &str) -> String {
    format!("{STORAGE_PREFIX}/{target_id}/{filename}")
}
