//! Text extraction for uploaded resumes. PDF and DOCX only.

use std::io::{Cursor, Read};

use bytes::Bytes;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;
use thiserror::Error;
use zip::ZipArchive;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Upper bound on the uncompressed `word/document.xml` we are willing to read.
const MAX_DOCX_XML_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("could not read PDF: {0}")]
    Pdf(String),
    #[error("could not read DOCX: {0}")]
    Docx(String),
    #[error("text extraction aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Magic bytes win; the declared content type and then the file
    /// extension are only consulted when the bytes are inconclusive.
    pub fn sniff(bytes: &[u8], content_type: Option<&str>, file_name: Option<&str>) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            return Some(DocumentKind::Pdf);
        }
        if bytes.starts_with(b"PK\x03\x04") {
            return Some(DocumentKind::Docx);
        }
        if let Some(kind) = content_type.and_then(Self::from_content_type) {
            return Some(kind);
        }
        let ext = file_name?.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            _ => None,
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
        if essence == PDF_CONTENT_TYPE {
            Some(DocumentKind::Pdf)
        } else if essence == DOCX_CONTENT_TYPE {
            Some(DocumentKind::Docx)
        } else {
            None
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            DocumentKind::Pdf => PDF_CONTENT_TYPE,
            DocumentKind::Docx => DOCX_CONTENT_TYPE,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
        }
    }
}

/// Best-effort plain text. CPU-bound; call through `extract_text_blocking`
/// from async code.
pub fn extract_text(bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractError> {
    match kind {
        DocumentKind::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        DocumentKind::Docx => extract_docx(bytes),
    }
}

/// Runs extraction on the blocking pool. A panic inside the PDF parser
/// surfaces as `ExtractError::Aborted` instead of taking the worker down.
pub async fn extract_text_blocking(bytes: Bytes, kind: DocumentKind) -> Result<String, ExtractError> {
    tokio::task::spawn_blocking(move || extract_text(&bytes, kind))
        .await
        .map_err(|e| ExtractError::Aborted(e.to_string()))?
}

/// True when `bytes` is a ZIP archive holding `word/document.xml`.
/// Other OOXML files (xlsx, pptx) and plain archives share the ZIP magic.
pub fn is_docx_archive(bytes: &[u8]) -> bool {
    let Ok(mut archive) = ZipArchive::new(Cursor::new(bytes)) else {
        return false;
    };
    let found = archive.by_name("word/document.xml").is_ok();
    found
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut xml = String::new();
    entry
        .take(MAX_DOCX_XML_BYTES)
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    Ok(document_xml_to_text(&xml))
}

/// Flattens WordprocessingML into text: paragraphs and breaks become
/// newlines, tabs stay tabs, everything else is dropped.
fn document_xml_to_text(xml: &str) -> String {
    lazy_static! {
        static ref PARAGRAPH_END: Regex = Regex::new(r"</w:p>").unwrap();
        static ref LINE_BREAK: Regex = Regex::new(r"<w:(?:br|cr)\b[^>]*/>").unwrap();
        static ref TAB: Regex = Regex::new(r"<w:tab\b[^>]*/>").unwrap();
        static ref ANY_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
        static ref ENTITY: Regex =
            Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);").unwrap();
    }

    let text = PARAGRAPH_END.replace_all(xml, "\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = TAB.replace_all(&text, "\t");
    let text = ANY_TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &Captures| decode_entity(&caps[1]));
    text.trim().to_string()
}

fn decode_entity(name: &str) -> String {
    let code_point = if let Some(hex) = name.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    if let Some(cp) = code_point {
        return char::from_u32(cp).map(String::from).unwrap_or_default();
    }
    match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        _ => "",
    }
    .to_string()
}

/// Builds a ZIP archive from `(path, contents)` entries.
#[cfg(test)]
pub fn zip_for_tests(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, contents) in entries {
        writer
            .start_file(*path, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Builds a minimal DOCX whose body has one paragraph per entry.
#[cfg(test)]
pub fn docx_for_tests(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    zip_for_tests(&[("word/document.xml", xml.as_bytes())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_prefers_magic_bytes() {
        assert_eq!(
            DocumentKind::sniff(b"%PDF-1.7\n...", Some("text/plain"), Some("cv.txt")),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::sniff(b"PK\x03\x04rest", None, None),
            Some(DocumentKind::Docx)
        );
    }

    #[test]
    fn test_sniff_falls_back_to_content_type_then_extension() {
        assert_eq!(
            DocumentKind::sniff(b"????", Some("application/pdf; charset=binary"), None),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::sniff(b"????", Some("application/octet-stream"), Some("Resume.DOCX")),
            Some(DocumentKind::Docx)
        );
        assert_eq!(DocumentKind::sniff(b"hello", Some("text/plain"), Some("cv.txt")), None);
        assert_eq!(DocumentKind::sniff(b"", None, Some("noext")), None);
    }

    #[test]
    fn test_kind_metadata() {
        assert_eq!(DocumentKind::Pdf.extension(), "pdf");
        assert_eq!(DocumentKind::Docx.content_type(), DOCX_CONTENT_TYPE);
        assert_eq!(
            DocumentKind::from_content_type(DOCX_CONTENT_TYPE),
            Some(DocumentKind::Docx)
        );
    }

    #[test]
    fn test_document_xml_flattening() {
        let xml = r#"<w:body><w:p><w:r><w:t>Jane &amp; Co</w:t></w:r></w:p><w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>&#x2022; Led &lt;team&gt; &#51;</w:t></w:r></w:p></w:body>"#;
        assert_eq!(document_xml_to_text(xml), "Jane & Co\na\tb\n• Led <team> 3");
    }

    #[test]
    fn test_docx_extraction() {
        let docx = docx_for_tests(&["Jane Doe", "Experience", "Led a team of 5"]);
        let text = extract_text(&docx, DocumentKind::Docx).unwrap();
        assert_eq!(text, "Jane Doe\nExperience\nLed a team of 5");
    }

    #[test]
    fn test_zip_without_document_is_an_error() {
        let xlsx = zip_for_tests(&[("xl/workbook.xml", b"<workbook/>")]);

        assert!(matches!(
            extract_text(&xlsx, DocumentKind::Docx),
            Err(ExtractError::Docx(_))
        ));
    }

    #[test]
    fn test_docx_archive_check() {
        assert!(is_docx_archive(&docx_for_tests(&["Jane"])));
        assert!(!is_docx_archive(&zip_for_tests(&[("xl/workbook.xml", b"<workbook/>")])));
        assert!(!is_docx_archive(&zip_for_tests(&[("notes.txt", b"hello")])));
        assert!(!is_docx_archive(b"PK\x03\x04 truncated"));
        assert!(!is_docx_archive(b""));
    }

    #[tokio::test]
    async fn test_garbage_pdf_fails_cleanly() {
        let result = extract_text_blocking(Bytes::from_static(b"%PDF-1.4 not really"), DocumentKind::Pdf).await;
        assert!(result.is_err());
    }
}
