//! PDF header sniffing.
//!
//! lopdf is lenient about leading garbage, so the extractor checks the magic
//! bytes itself to turn "this is not a PDF at all" into a clear
//! [`Error::UnreadableDocument`] instead of a parser message.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
const PDF_MAGIC_LEN: usize = 5;
const VERSION_LEN: usize = 3; // e.g., "1.7"

/// Read the header of a file and return its PDF version (e.g. "1.7").
pub fn pdf_version_from_path<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| {
        Error::UnreadableDocument(format!("cannot open {}: {}", path.display(), e))
    })?;
    let mut header = [0u8; 16];
    let read = file.read(&mut header)?;
    pdf_version_from_bytes(&header[..read])
}

/// Return the PDF version declared in a header byte slice.
pub fn pdf_version_from_bytes(data: &[u8]) -> Result<String> {
    if data.len() < PDF_MAGIC_LEN + VERSION_LEN || !data.starts_with(PDF_MAGIC) {
        return Err(Error::UnreadableDocument("not a PDF file".to_string()));
    }

    let version = String::from_utf8_lossy(&data[PDF_MAGIC_LEN..PDF_MAGIC_LEN + VERSION_LEN]);
    let mut chars = version.chars();
    let valid = matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(major), Some('.'), Some(minor)) if major.is_ascii_digit() && minor.is_ascii_digit()
    );
    if !valid {
        return Err(Error::UnreadableDocument(format!(
            "unsupported PDF version header: {version}"
        )));
    }

    Ok(version.into_owned())
}
