use std::collections::BTreeMap;

use crate::content::DEFAULT_MIME_TYPE;

pub const JSON_MIME_TYPE: &str = "application/json";
pub const XML_MIME_TYPE: &str = "text/xml";

/// Maps file extensions and content signatures to mime types.
pub trait MimeTypeMapper: Send + Sync {
    fn mime_for_extension(&self, extension: &str) -> Option<String>;

    fn mime_for_content(&self, bytes: &[u8]) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct DefaultMimeTypeMapper {
    extensions: BTreeMap<String, String>,
}

impl Default for DefaultMimeTypeMapper {
    fn default() -> Self {
        let table = [
            ("json", JSON_MIME_TYPE),
            ("geojson", "application/geo+json"),
            ("xml", XML_MIME_TYPE),
            ("txt", "text/plain"),
            ("csv", "text/csv"),
            ("html", "text/html"),
            ("htm", "text/html"),
            ("pdf", "application/pdf"),
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("gif", "image/gif"),
            ("tif", "image/tiff"),
            ("tiff", "image/tiff"),
            ("nitf", "image/nitf"),
            ("ntf", "image/nitf"),
            ("zip", "application/zip"),
            ("gz", "application/gzip"),
            ("kml", "application/vnd.google-earth.kml+xml"),
        ];
        Self {
            extensions: table
                .into_iter()
                .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
                .collect(),
        }
    }
}

impl DefaultMimeTypeMapper {
    pub fn with_mapping(mut self, extension: &str, mime_type: &str) -> Self {
        self.extensions
            .insert(extension.to_ascii_lowercase(), mime_type.to_string());
        self
    }
}

impl MimeTypeMapper for DefaultMimeTypeMapper {
    fn mime_for_extension(&self, extension: &str) -> Option<String> {
        self.extensions
            .get(&extension.trim_start_matches('.').to_ascii_lowercase())
            .cloned()
    }

    fn mime_for_content(&self, bytes: &[u8]) -> Option<String> {
        const SIGNATURES: &[(&[u8], &str)] = &[
            (b"\x89PNG\r\n\x1a\n", "image/png"),
            (b"\xFF\xD8\xFF", "image/jpeg"),
            (b"GIF87a", "image/gif"),
            (b"GIF89a", "image/gif"),
            (b"%PDF-", "application/pdf"),
            (b"PK\x03\x04", "application/zip"),
            (b"\x1F\x8B", "application/gzip"),
            (b"NITF", "image/nitf"),
        ];
        if let Some((_, mime)) = SIGNATURES
            .iter()
            .find(|(signature, _)| bytes.starts_with(signature))
        {
            return Some(mime.to_string());
        }
        let text = strip_bom(bytes);
        let trimmed = text.trim_ascii_start();
        if trimmed.starts_with(b"<?xml") {
            return Some(XML_MIME_TYPE.to_string());
        }
        None
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Whether `mime_type` carries no real information.
pub fn is_unspecified(mime_type: &str) -> bool {
    let base = base_type(mime_type);
    base.is_empty() || base == DEFAULT_MIME_TYPE
}

/// `type/subtype` without parameters, lowercased.
pub fn base_type(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Settles on a mime type for an upload: the declared type unless it is empty or
/// `application/octet-stream`, then the extension, then magic bytes, then a look
/// at the first non-blank line for JSON or XML.
pub fn detect_mime_type(
    mapper: &dyn MimeTypeMapper,
    declared: &str,
    filename: &str,
    bytes: &[u8],
) -> String {
    if !is_unspecified(declared) {
        return declared.trim().to_string();
    }
    if let Some(mime) = filename
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .and_then(|(_, ext)| mapper.mime_for_extension(ext))
    {
        return mime;
    }
    if let Some(mime) = mapper.mime_for_content(bytes) {
        return mime;
    }
    first_line_guess(bytes).unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

fn first_line_guess(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(strip_bom(bytes));
    let line = text.lines().map(str::trim).find(|line| !line.is_empty())?;
    if line.starts_with('{') || line.starts_with('[') {
        Some(JSON_MIME_TYPE.to_string())
    } else if line.starts_with('<') {
        Some(XML_MIME_TYPE.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_wins() {
        let mapper = DefaultMimeTypeMapper::default();
        assert_eq!(
            detect_mime_type(&mapper, "image/png", "a.json", b"{}"),
            "image/png"
        );
    }

    #[test]
    fn octet_stream_falls_back_to_extension() {
        let mapper = DefaultMimeTypeMapper::default();
        assert_eq!(
            detect_mime_type(&mapper, DEFAULT_MIME_TYPE, "report.PDF", b"hello"),
            "application/pdf"
        );
    }

    #[test]
    fn json_without_extension_is_sniffed() {
        let mapper = DefaultMimeTypeMapper::default();
        assert_eq!(
            detect_mime_type(&mapper, DEFAULT_MIME_TYPE, "foo", b"{\"a\":1}"),
            JSON_MIME_TYPE
        );
    }

    #[test]
    fn xml_detected_by_first_line_and_prolog() {
        let mapper = DefaultMimeTypeMapper::default();
        assert_eq!(
            detect_mime_type(&mapper, "", "foo", b"\n\n  <root/>"),
            XML_MIME_TYPE
        );
        assert_eq!(
            detect_mime_type(&mapper, "", "foo", b"<?xml version=\"1.0\"?><a/>"),
            XML_MIME_TYPE
        );
    }

    #[test]
    fn magic_bytes_detected() {
        let mapper = DefaultMimeTypeMapper::default();
        assert_eq!(
            detect_mime_type(&mapper, "", "image", b"\x89PNG\r\n\x1a\nrest"),
            "image/png"
        );
    }

    #[test]
    fn unknown_content_stays_octet_stream() {
        let mapper = DefaultMimeTypeMapper::default();
        assert_eq!(
            detect_mime_type(&mapper, "", "blob", b"plain words"),
            DEFAULT_MIME_TYPE
        );
    }

    #[test]
    fn dotfile_is_not_an_extension() {
        let mapper = DefaultMimeTypeMapper::default();
        assert_eq!(detect_mime_type(&mapper, "", ".json", b"x"), DEFAULT_MIME_TYPE);
    }
}
