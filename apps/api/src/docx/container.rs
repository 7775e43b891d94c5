//! `.docx` container codec: read, override and re-pack parts of the zip package.
//!
//! Only overridden parts are re-encoded; every other entry is raw-copied, so
//! images, styles and relationships pass through byte-for-byte.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use bytes::Bytes;
use thiserror::Error;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// The WordprocessingML main document part.
pub const PRIMARY_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("not a zip archive: {0}")]
    NotAnArchive(String),

    #[error("document package has no '{0}' part")]
    MissingPart(String),

    #[error("part '{path}' could not be read: {reason}")]
    UnreadablePart { path: String, reason: String },

    #[error("failed to write document package: {0}")]
    Write(String),
}

/// An opened `.docx` package with staged part overrides.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    bytes: Bytes,
    overrides: BTreeMap<String, String>,
}

impl DocxPackage {
    /// Opens `bytes` as a zip archive and checks the primary part is present.
    pub fn unpack(bytes: Bytes) -> Result<Self, ContainerError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.clone()))
            .map_err(|e| ContainerError::NotAnArchive(e.to_string()))?;
        match archive.by_name(PRIMARY_PART) {
            Ok(_) => {}
            Err(ZipError::FileNotFound) => {
                return Err(ContainerError::MissingPart(PRIMARY_PART.to_string()))
            }
            Err(e) => {
                return Err(ContainerError::UnreadablePart {
                    path: PRIMARY_PART.to_string(),
                    reason: e.to_string(),
                })
            }
        }
        Ok(Self {
            bytes,
            overrides: BTreeMap::new(),
        })
    }

    /// Reads a part as UTF-8 text, preferring a staged override.
    pub fn read_part(&self, path: &str) -> Result<String, ContainerError> {
        if let Some(text) = self.overrides.get(path) {
            return Ok(text.clone());
        }

        let unreadable = |reason: String| ContainerError::UnreadablePart {
            path: path.to_string(),
            reason,
        };
        let mut archive = self.archive()?;
        let mut file = archive.by_name(path).map_err(|e| match e {
            ZipError::FileNotFound => ContainerError::MissingPart(path.to_string()),
            other => unreadable(other.to_string()),
        })?;
        let mut text = String::new();
        file.read_to_string(&mut text)
            .map_err(|e| unreadable(e.to_string()))?;
        Ok(text)
    }

    /// Stages new content for a part; applied by `pack`.
    pub fn write_part(&mut self, path: &str, text: String) {
        self.overrides.insert(path.to_string(), text);
    }

    /// Re-emits the archive with staged overrides applied, entries in their
    /// original order. Overrides for parts not yet in the archive are appended.
    pub fn pack(&self) -> Result<Vec<u8>, ContainerError> {
        let write_err = |e: ZipError| ContainerError::Write(e.to_string());
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut archive = self.archive()?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(self.bytes.len())));
        let mut written = Vec::new();

        for index in 0..archive.len() {
            let file = archive.by_index_raw(index).map_err(write_err)?;
            let name = file.name().to_string();
            match self.overrides.get(&name) {
                Some(text) => {
                    drop(file);
                    writer.start_file(name.as_str(), options).map_err(write_err)?;
                    writer
                        .write_all(text.as_bytes())
                        .map_err(|e| ContainerError::Write(e.to_string()))?;
                    written.push(name);
                }
                None => writer.raw_copy_file(file).map_err(write_err)?,
            }
        }

        for (name, text) in &self.overrides {
            if written.contains(name) {
                continue;
            }
            writer.start_file(name.as_str(), options).map_err(write_err)?;
            writer
                .write_all(text.as_bytes())
                .map_err(|e| ContainerError::Write(e.to_string()))?;
        }

        Ok(writer.finish().map_err(write_err)?.into_inner())
    }

    fn archive(&self) -> Result<ZipArchive<Cursor<Bytes>>, ContainerError> {
        ZipArchive::new(Cursor::new(self.bytes.clone()))
            .map_err(|e| ContainerError::NotAnArchive(e.to_string()))
    }
}

/// Builds a minimal `.docx` in memory around `document_xml`.
#[cfg(test)]
pub fn build_test_docx(document_xml: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file("[Content_Types].xml", options).unwrap();
    writer
        .write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
        .unwrap();
    writer.start_file(PRIMARY_PART, options).unwrap();
    writer.write_all(document_xml.as_bytes()).unwrap();
    writer
        .start_file(
            "word/media/logo.bin",
            FileOptions::default().compression_method(CompressionMethod::Stored),
        )
        .unwrap();
    writer.write_all(&[0u8, 159, 146, 150, 1, 2, 3]).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Wraps body content in a `w:document` element.
#[cfg(test)]
pub fn wrap_body(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
}
