use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use anyhow::Context;
use encoding_rs::{UTF_16BE, UTF_16LE, UTF_8};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::docx::tree::XmlDocument;
use crate::docx::{CONTENT_TYPES, MAIN_DOCUMENT};
use crate::error::MergeError;

const MAX_PREALLOC: u64 = 4 * 1024 * 1024;

/// An OOXML package held fully in memory: an ordered list of named parts.
#[derive(Clone)]
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

#[derive(Clone)]
pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open docx: {}", path.display()))?;
        Self::from_reader(f).with_context(|| format!("read docx: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    fn from_reader<R: Read + Seek>(reader: R) -> anyhow::Result<Self> {
        let corrupt = |e: zip::result::ZipError| {
            anyhow::Error::new(MergeError::CorruptArchive(e.to_string()))
        };
        let mut zip = ZipArchive::new(reader).map_err(corrupt)?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(corrupt)?;
            let mut data = Vec::with_capacity(initial_capacity(file.size()));
            file.read_to_end(&mut data).map_err(|e| {
                anyhow::Error::new(MergeError::CorruptArchive(format!(
                    "{}: {e}",
                    file.name()
                )))
            })?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    /// Fails with `MissingRequiredPart` when the package lacks its main document or its
    /// content-types manifest.
    pub fn validate(&self) -> anyhow::Result<()> {
        for required in [MAIN_DOCUMENT, CONTENT_TYPES] {
            if !self.has_part(required) {
                return Err(MergeError::MissingRequiredPart(required.to_string()).into());
            }
        }
        Ok(())
    }

    pub fn has_part(&self, path: &str) -> bool {
        self.part(path).is_some()
    }

    pub fn part(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| !e.is_dir && e.name == path)
            .map(|e| e.data.as_slice())
    }

    /// Decoded text of a part; `None` when the part is absent.
    pub fn part_text(&self, path: &str) -> Option<anyhow::Result<String>> {
        self.part(path).map(|bytes| decode_text(path, bytes))
    }

    /// Parsed XML of a part; `Ok(None)` when the part is absent.
    pub fn read_xml(&self, path: &str) -> anyhow::Result<Option<XmlDocument>> {
        match self.part_text(path) {
            None => Ok(None),
            Some(text) => Ok(Some(XmlDocument::parse(path, &text?)?)),
        }
    }

    pub fn write_xml(&mut self, doc: &XmlDocument) -> anyhow::Result<()> {
        let bytes = doc
            .to_bytes()
            .with_context(|| format!("serialize xml: {}", doc.name))?;
        self.set_part(&doc.name, bytes);
        Ok(())
    }

    /// Replace a part's bytes, or append a new deflate-compressed part.
    pub fn set_part(&mut self, path: &str, data: impl Into<Vec<u8>>) {
        let data = data.into();
        if let Some(ent) = self.entries.iter_mut().find(|e| !e.is_dir && e.name == path) {
            ent.data = data;
            return;
        }
        self.entries.push(DocxEntry {
            name: path.to_string(),
            data,
            compression: CompressionMethod::Deflated,
            last_modified: zip::DateTime::default(),
            unix_mode: None,
            is_dir: false,
        });
    }

    pub fn remove_part(&mut self, path: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.is_dir || e.name != path);
        before != self.entries.len()
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.name.as_str())
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(&ent.data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        let cursor = zout.finish().context("finish zip")?;
        Ok(cursor.into_inner())
    }

    pub fn write(&self, output_path: &Path) -> anyhow::Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(output_path, bytes)
            .with_context(|| format!("write output docx: {}", output_path.display()))
    }
}

/// Pre-allocation for an entry. The size in the zip header is only a hint.
fn initial_capacity(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

/// Decode XML part bytes: UTF-8 (with or without BOM) or BOM-marked UTF-16.
pub fn decode_text(path: &str, bytes: &[u8]) -> anyhow::Result<String> {
    let encoding = if bytes.starts_with(&[0xFF, 0xFE]) {
        UTF_16LE
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        UTF_16BE
    } else {
        UTF_8
    };
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(MergeError::MalformedXml {
            part: path.to_string(),
            detail: format!("invalid {} text", encoding.name()),
        }
        .into());
    }
    Ok(text.into_owned())
}
