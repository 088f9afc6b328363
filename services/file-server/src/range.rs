//! Byte-range parsing and the response headers derived from a key.

pub const PRIVATE_CACHE_CONTROL: &str = "private, max-age=0, must-revalidate";
pub const PUBLIC_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Inclusive byte range within an object of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Parse a single `bytes=<start>-<end>` range against an object of `total` bytes.
///
/// A missing start means 0 and a missing end means the last byte. Anything
/// malformed, multi-range or unsatisfiable yields `None`, and the caller
/// serves the whole object.
pub fn parse_range(header: &str, total: u64) -> Option<ByteRange> {
    let bounds = header.trim().strip_prefix("bytes=")?;
    let (start, end) = bounds.split_once('-')?;

    let start = parse_bound(start)?.unwrap_or(0);
    let end = match parse_bound(end)? {
        Some(end) => end,
        None => total.checked_sub(1)?,
    };

    (start <= end && end < total).then_some(ByteRange { start, end })
}

/// `Some(None)` for an empty bound, `None` for anything that is not all digits.
fn parse_bound(value: &str) -> Option<Option<u64>> {
    if value.is_empty() {
        return Some(None);
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok().map(Some)
}

pub fn content_type_for_key(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .filter(|(_, ext)| !ext.contains('/'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" | "heif" | "hif" => "image/heic",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

pub fn cache_control_for(authenticated: bool) -> &'static str {
    if authenticated {
        PRIVATE_CACHE_CONTROL
    } else {
        PUBLIC_CACHE_CONTROL
    }
}
