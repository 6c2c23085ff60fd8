//! Plain-text extraction for the corpus formats: txt/md read directly,
//! HTML is stripped of markup, PDF and OOXML (docx, pptx) are unpacked.
//! Extraction never panics; an unreadable file returns an error and the
//! ingest loop skips it.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Decompressed bytes allowed per ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["txt", "md", "html", "htm", "pdf", "docx", "pptx"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Read one document as plain UTF-8 text, dispatching on file extension.
pub fn read_document(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" => {
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        "html" | "htm" => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            extract_html_text(&raw)
        }
        "pdf" => pdf_extract::extract_text(path)
            .with_context(|| format!("extract PDF text from {}", path.display())),
        "docx" => {
            let bytes =
                std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
            extract_docx(&bytes)
        }
        "pptx" => {
            let bytes =
                std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
            extract_pptx(&bytes)
        }
        other => bail!("unsupported file extension: {other}"),
    }
}

/// Strip markup from an HTML document, keeping text content. Script and
/// style bodies are dropped.
fn extract_html_text(html: &str) -> Result<String> {
    let mut reader = quick_xml::Reader::from_str(html);
    reader.config_mut().trim_text(true);
    // Real-world HTML has unclosed tags; keep reading anyway
    reader.config_mut().check_end_names = false;

    let mut out = String::new();
    let mut skip_depth = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"script" || name.as_ref() == b"style" {
                    skip_depth += 1;
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = e.local_name();
                if (name.as_ref() == b"script" || name.as_ref() == b"style") && skip_depth > 0 {
                    skip_depth -= 1;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if skip_depth == 0 => {
                let text = t.unescape().unwrap_or_default();
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(trimmed);
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            // Malformed markup past this point: keep what was extracted
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .with_context(|| format!("ZIP entry {name} not found"))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .with_context(|| format!("read ZIP entry {name}"))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        bail!("ZIP entry {name} exceeds size limit");
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).context("open docx archive")?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    extract_t_elements(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).context("open pptx archive")?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut out = String::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = extract_t_elements(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&text);
    }
    Ok(out)
}

/// Collect the text of every `<w:t>`/`<a:t>` run. Both OOXML vocabularies
/// use the local name `t` for text runs.
fn extract_t_elements(xml: &[u8]) -> Result<String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut out = String::new();
    let mut in_t = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = false;
                } else if e.local_name().as_ref() == b"p" && !out.is_empty() {
                    // paragraph boundary
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_t => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("malformed document XML: {e}"),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(&PathBuf::from("notes.md")));
        assert!(is_supported(&PathBuf::from("Slides.PPTX")));
        assert!(!is_supported(&PathBuf::from("archive.tar.gz")));
        assert!(!is_supported(&PathBuf::from("no_extension")));
    }

    #[test]
    fn test_plain_text_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello corpus").unwrap();
        assert_eq!(read_document(&path).unwrap(), "hello corpus");
    }

    #[test]
    fn test_html_markup_stripped() {
        let text = extract_html_text(
            "<html><head><style>body{color:red}</style></head>\
             <body><h1>Week 1</h1><p>Introduction to <b>Rust</b>.</p></body></html>",
        )
        .unwrap();
        assert!(text.contains("Week 1"));
        assert!(text.contains("Introduction to"));
        assert!(text.contains("Rust"));
        assert!(!text.contains("color:red"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_docx_text_runs_extracted() {
        let xml = br#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
              <w:body>
                <w:p><w:r><w:t>Learning outcomes</w:t></w:r></w:p>
                <w:p><w:r><w:t>Students will master ownership.</w:t></w:r></w:p>
              </w:body>
            </w:document>"#;
        let text = extract_t_elements(xml).unwrap();
        assert!(text.contains("Learning outcomes"));
        assert!(text.contains("master ownership"));
    }

    #[test]
    fn test_invalid_zip_is_error_not_panic() {
        assert!(extract_docx(b"not a zip").is_err());
        assert!(extract_pptx(b"also not a zip").is_err());
    }

    #[test]
    fn test_unsupported_extension_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [0u8; 4]).unwrap();
        assert!(read_document(&path).is_err());
    }
}
