use crate::consts::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Kind of media a linking record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum MediaType {
    Image,
    Video,
}
impl MediaType {
    /// Derive the media type from a file extension (case-insensitive, with
    /// or without a leading dot). Returns `None` for unsupported extensions.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = normalize_extension(extension);
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
        }
    }
}
impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// MIME type sent to the object store alongside the uploaded bytes.
pub fn content_type(extension: &str) -> Option<&'static str> {
    Some(match normalize_extension(extension).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        _ => return None,
    })
}

/// Whether the extension is one the migration accepts at all.
pub fn is_valid_extension(extension: &str) -> bool {
    MediaType::from_extension(extension).is_some()
}

pub(crate) fn normalize_extension(extension: &str) -> String {
    extension.strip_prefix('.').unwrap_or(extension).to_ascii_lowercase()
}
