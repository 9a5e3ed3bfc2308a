//! Document format detection feeding the parser router.
//!
//! Magic bytes win over extensions where they exist; the MIME guess from
//! the extension breaks ties for text-like formats.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Broad document categories the router understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Markdown,
    PlainText,
    Html,
    Pdf,
    Unsupported,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::PlainText => "plain_text",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of format detection for one input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatDetection {
    pub mime_type: String,
    pub format: DocumentFormat,
    pub file_size_bytes: u64,
}

const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024; // 100MB

/// Detect a document's format from magic bytes plus the extension MIME guess.
pub fn detect_format(path: &Path) -> std::io::Result<FormatDetection> {
    let metadata = std::fs::metadata(path)?;
    let file_size = metadata.len();

    if file_size > MAX_FILE_SIZE {
        return Ok(FormatDetection {
            mime_type: "unknown".into(),
            format: DocumentFormat::Unsupported,
            file_size_bytes: file_size,
        });
    }

    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; 16];
    let bytes_read = file.read(&mut header)?;

    // PDF magic bytes don't lie — extensions can be wrong.
    if matches!(&header[..bytes_read.min(4)], [0x25, 0x50, 0x44, 0x46]) {
        return Ok(FormatDetection {
            mime_type: "application/pdf".into(),
            format: DocumentFormat::Pdf,
            file_size_bytes: file_size,
        });
    }

    let guess = mime_guess::from_path(path).first_or_octet_stream();
    let mime_type = guess.essence_str().to_string();

    let format = match mime_type.as_str() {
        "text/markdown" => DocumentFormat::Markdown,
        "text/html" => DocumentFormat::Html,
        "text/plain" => DocumentFormat::PlainText,
        _ if is_likely_text(path)? => DocumentFormat::PlainText,
        _ => DocumentFormat::Unsupported,
    };

    Ok(FormatDetection {
        mime_type,
        format,
        file_size_bytes: file_size,
    })
}

/// UTF-8 validation on the first chunk of the file.
fn is_likely_text(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; 4096];
    let n = file.read(&mut buf)?;
    if n == 0 {
        return Ok(true);
    }
    // A trailing byte may split a multi-byte sequence; only reject on an
    // invalid sequence that starts well before the chunk boundary.
    match std::str::from_utf8(&buf[..n]) {
        Ok(_) => Ok(true),
        Err(e) => Ok(e.valid_up_to() + 4 >= n && e.error_len().is_none()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_markdown_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.md");
        std::fs::write(&path, "# Requirements\n\n- REQ-1").unwrap();

        let detection = detect_format(&path).unwrap();
        assert_eq!(detection.format, DocumentFormat::Markdown);
        assert_eq!(detection.mime_type, "text/markdown");
    }

    #[test]
    fn detects_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "project kickoff notes").unwrap();

        let detection = detect_format(&path).unwrap();
        assert_eq!(detection.format, DocumentFormat::PlainText);
    }

    #[test]
    fn detects_pdf_by_magic_bytes() {
        let dir = tempfile::tempdir().unwrap();
        // Wrong extension on purpose — magic bytes win.
        let path = dir.path().join("plan.txt");
        std::fs::write(&path, b"%PDF-1.7 fake content").unwrap();

        let detection = detect_format(&path).unwrap();
        assert_eq!(detection.format, DocumentFormat::Pdf);
        assert_eq!(detection.mime_type, "application/pdf");
    }

    #[test]
    fn binary_blob_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [0x00, 0xFF, 0xFE, 0x01, 0x80, 0x81]).unwrap();

        let detection = detect_format(&path).unwrap();
        assert_eq!(detection.format, DocumentFormat::Unsupported);
        assert!(!detection.format.is_supported());
    }

    #[test]
    fn unknown_extension_with_text_content_is_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.reqif");
        std::fs::write(&path, "REQ-1 The system shall respond within 200ms").unwrap();

        let detection = detect_format(&path).unwrap();
        assert_eq!(detection.format, DocumentFormat::PlainText);
    }

    #[test]
    fn empty_file_is_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();

        let detection = detect_format(&path).unwrap();
        assert_eq!(detection.format, DocumentFormat::PlainText);
        assert_eq!(detection.file_size_bytes, 0);
    }
}
