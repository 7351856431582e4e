use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Base names only; the extension has already been split off and checked.
regex!(RANGE_REGEX, r"^([0-9]+)-([0-9]+)$");
regex!(MULTIPLE_REGEX, r"^([0-9]+)[a-z]$");
regex!(SINGLE_REGEX, r"^([0-9]+)$");

/// Widest range a single filename may cover.
pub(crate) const MAX_RANGE_LEN: u64 = 1000;

pub(crate) const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];
pub(crate) const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mov", "avi"];

/// Prefix under which every uploaded object is stored.
pub const STORAGE_PREFIX: &str = "media";
