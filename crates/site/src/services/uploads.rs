//! Inquiry upload validation.
//!
//! A batch of uploaded files is checked in stages. The first stage that finds
//! a problem ends validation and its violations are reported:
//!
//! 1. required - at least one non-empty file
//! 2. count - at most [`MAX_IMAGE_UPLOAD`] files (nothing is sniffed past this)
//! 3. declared extension - one of [`ALLOWED_EXTENSIONS`]
//! 4. sniffed content - first word of the sniffed type in [`ALLOWED_SNIFFED_TYPES`]
//! 5. size - at most [`MAX_IMAGE_SIZE`] bytes per file
//!
//! `pdf` is accepted by the extension stage but never by the sniffing stage,
//! so PDFs are rejected as "not an image file".

use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use super::sniff;

/// Most files accepted in one inquiry.
pub const MAX_IMAGE_UPLOAD: usize = 5;

/// Largest accepted file, in bytes.
pub const MAX_IMAGE_SIZE: usize = 10_000_000;

/// Smallest file size worth compressing. Not enforced.
pub const MIN_IMAGE_SIZE: usize = 500_000;

/// Extensions accepted by the declared-extension stage.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "pdf"];

/// First words of a sniffed description accepted by the content stage.
pub const ALLOWED_SNIFFED_TYPES: &[&str] = &["jpg", "jpeg", "png", "heic"];

/// Windows device names that cannot be used as file names.
const WINDOWS_DEVICE_FILES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "LPT1", "LPT2", "LPT3",
];

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("static regex is valid"));

/// One uploaded file, fully buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// File name as sent by the browser.
    pub filename: String,
    /// Content type as declared by the browser.
    pub content_type: Option<String>,
    /// File content.
    pub data: Bytes,
}

impl UploadedFile {
    #[must_use]
    pub fn new(filename: impl Into<String>, content_type: Option<String>, data: Bytes) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            data,
        }
    }

    /// Lowercased text after the last dot, or the whole name if there is none.
    #[must_use]
    pub fn extension(&self) -> String {
        self.filename
            .rsplit_once('.')
            .map_or(self.filename.as_str(), |(_, ext)| ext)
            .to_lowercase()
    }

    /// File size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A reason an upload batch was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadViolation {
    /// No file was uploaded.
    Missing,
    /// More files than allowed.
    TooMany { count: usize },
    /// Declared extension not accepted.
    ExtensionNotAllowed { filename: String },
    /// Sniffed content is not an accepted image type.
    NotAnImage { filename: String, sniffed: &'static str },
    /// File larger than allowed.
    TooLarge { filename: String, size: usize },
    /// The request body passed its limit before every file was read.
    BodyTooLarge,
}

impl UploadViolation {
    /// The violation for a body cut off after `files_seen` files had started.
    ///
    /// More files than allowed explains the size best; otherwise some file
    /// was too big.
    #[must_use]
    pub const fn for_truncated_body(files_seen: usize) -> Self {
        if files_seen > MAX_IMAGE_UPLOAD {
            Self::TooMany { count: files_seen }
        } else {
            Self::BodyTooLarge
        }
    }
}

impl std::fmt::Display for UploadViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("This field is required."),
            Self::TooMany { .. } => write!(f, "Max file upload is {MAX_IMAGE_UPLOAD}!"),
            Self::ExtensionNotAllowed { .. } => f.write_str("Only specified images types!"),
            Self::NotAnImage { filename, .. } => {
                write!(f, "the file: \n{filename} is not an image file.")
            }
            Self::TooLarge { .. } | Self::BodyTooLarge => write!(
                f,
                "File must be less than {} MB.",
                MAX_IMAGE_SIZE / 1_000_000
            ),
        }
    }
}

/// Validate a batch of uploads.
///
/// # Errors
///
/// Returns the violations found by the first failing stage.
pub fn validate_batch(files: &[UploadedFile]) -> Result<(), Vec<UploadViolation>> {
    let stages: [fn(&[UploadedFile]) -> Vec<UploadViolation>; 5] = [
        check_required,
        check_count,
        check_extensions,
        check_sniffed_types,
        check_sizes,
    ];

    for stage in stages {
        let violations = stage(files);
        if !violations.is_empty() {
            return Err(violations);
        }
    }
    Ok(())
}

/// At least one non-empty file must be present.
#[must_use]
pub fn check_required(files: &[UploadedFile]) -> Vec<UploadViolation> {
    if files.iter().any(|f| !f.filename.is_empty() || !f.data.is_empty()) {
        Vec::new()
    } else {
        vec![UploadViolation::Missing]
    }
}

/// No more than [`MAX_IMAGE_UPLOAD`] files.
#[must_use]
pub fn check_count(files: &[UploadedFile]) -> Vec<UploadViolation> {
    if files.len() > MAX_IMAGE_UPLOAD {
        vec![UploadViolation::TooMany { count: files.len() }]
    } else {
        Vec::new()
    }
}

/// Every declared extension must be in [`ALLOWED_EXTENSIONS`].
#[must_use]
pub fn check_extensions(files: &[UploadedFile]) -> Vec<UploadViolation> {
    files
        .iter()
        .filter(|f| !ALLOWED_EXTENSIONS.contains(&f.extension().as_str()))
        .map(|f| UploadViolation::ExtensionNotAllowed {
            filename: f.filename.clone(),
        })
        .collect()
}

/// Every file's sniffed type must start with a word in [`ALLOWED_SNIFFED_TYPES`].
///
/// Stops at the first offending file.
#[must_use]
pub fn check_sniffed_types(files: &[UploadedFile]) -> Vec<UploadViolation> {
    files
        .iter()
        .find(|f| !ALLOWED_SNIFFED_TYPES.contains(&sniff::primary_token(&f.data).as_str()))
        .map(|f| UploadViolation::NotAnImage {
            filename: f.filename.clone(),
            sniffed: sniff::describe(&f.data),
        })
        .into_iter()
        .collect()
}

/// No file may exceed [`MAX_IMAGE_SIZE`] bytes.
#[must_use]
pub fn check_sizes(files: &[UploadedFile]) -> Vec<UploadViolation> {
    files
        .iter()
        .filter(|f| f.size() > MAX_IMAGE_SIZE)
        .map(|f| UploadViolation::TooLarge {
            filename: f.filename.clone(),
            size: f.size(),
        })
        .collect()
}

/// Reduce a browser-supplied file name to a safe flat ASCII name.
///
/// The name is NFKD-normalized before non-ASCII characters are dropped, so
/// accented letters keep their base letter. Path separators become spaces,
/// whitespace runs become `_`, anything outside `[A-Za-z0-9_.-]` is dropped
/// and leading/trailing `.` and `_` are stripped. Windows device names get a
/// `_` prefix. An empty result becomes `upload`.
#[must_use]
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        return "upload".to_string();
    }

    let stem = trimmed.split('.').next().unwrap_or_default().to_uppercase();
    if WINDOWS_DEVICE_FILES.contains(&stem.as_str()) {
        return format!("_{trimmed}");
    }

    trimmed.to_string()
}
