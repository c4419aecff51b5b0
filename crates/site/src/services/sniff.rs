//! Content sniffing from leading bytes.
//!
//! Classifies a file from its first bytes into a short human-readable
//! description in the style of `file(1)`, e.g. `"JPEG image data"` or
//! `"PDF document"`. Callers decide by the first word of the description.

/// How many leading bytes are inspected.
pub const SNIFF_LEN: usize = 16;

/// Brands in an ISO base media `ftyp` box that mark a HEIF/HEIC image.
const HEIC_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
];

/// Describe the content type of a file from its leading bytes.
///
/// Only the first [`SNIFF_LEN`] bytes are looked at. Unknown content is
/// described as `"data"`.
#[must_use]
pub fn describe(data: &[u8]) -> &'static str {
    let header = data.get(..SNIFF_LEN).unwrap_or(data);

    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "JPEG image data"
    } else if header.starts_with(b"\x89PNG\r\n\x1a\n") {
        "PNG image data"
    } else if is_heic(header) {
        "HEIC image data"
    } else if header.starts_with(b"%PDF-") {
        "PDF document"
    } else if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        "GIF image data"
    } else if header.starts_with(b"RIFF") && header.get(8..12) == Some(b"WEBP".as_slice()) {
        "RIFF (little-endian) data, Web/P image"
    } else if header.starts_with(b"II*\0") || header.starts_with(b"MM\0*") {
        "TIFF image data"
    } else if header.starts_with(b"BM") {
        "PC bitmap"
    } else if header.starts_with(b"PK\x03\x04") {
        "Zip archive data"
    } else if header.starts_with(b"\x7fELF") {
        "ELF executable"
    } else if !header.is_empty() && header.iter().all(|b| b.is_ascii_graphic() || b.is_ascii_whitespace()) {
        "ASCII text"
    } else if header.is_empty() {
        "empty"
    } else {
        "data"
    }
}

/// The first word of the description, lowercased (`"jpeg"`, `"png"`, ...).
#[must_use]
pub fn primary_token(data: &[u8]) -> String {
    describe(data)
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// An ISO base media file whose major brand is a HEIF image brand.
fn is_heic(header: &[u8]) -> bool {
    header.get(4..8) == Some(b"ftyp".as_slice())
        && header
            .get(8..12)
            .is_some_and(|brand| HEIC_BRANDS.iter().any(|b| b.as_slice() == brand))
}
