//! The DOCX package: a zip archive of parts, loaded fully into memory.
//!
//! Parts the engine edits are parsed; everything else is carried through as
//! bytes. Parsed parts that were not modified are written back from their
//! original bytes.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::body::{Body, DOCUMENT_PART};
use crate::error::{DocxError, DocxResult};
use crate::numbering::{Numbering, NUMBERING_PART};
use crate::rels::{ContentTypes, Relationships, CONTENT_TYPES_PART, DOCUMENT_RELS_PART};

#[derive(Debug, Clone)]
struct PackageEntry {
    name: String,
    compression: CompressionMethod,
    is_dir: bool,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Docx {
    entries: Vec<PackageEntry>,
    body: Body,
    numbering: Option<Numbering>,
    rels: Relationships,
    content_types: ContentTypes,
}

impl Docx {
    pub fn open(path: &Path) -> DocxResult<Self> {
        let bytes = fs::read(path).map_err(|source| DocxError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "reading package");
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> DocxResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                compression: file.compression(),
                is_dir: file.is_dir(),
                data,
            });
        }

        let text = |name: &str| part_text(&entries, name);

        let document = text(DOCUMENT_PART)?
            .ok_or_else(|| DocxError::MissingPart(DOCUMENT_PART.to_string()))?;
        let body = Body::parse(document)?;
        let numbering = text(NUMBERING_PART)?.map(Numbering::parse).transpose()?;
        let rels = match text(DOCUMENT_RELS_PART)? {
            Some(src) => Relationships::parse(src)?,
            None => Relationships::empty()?,
        };
        let content_types = text(CONTENT_TYPES_PART)?
            .map(ContentTypes::parse)
            .transpose()?
            .ok_or_else(|| DocxError::MissingPart(CONTENT_TYPES_PART.to_string()))?;

        Ok(Self {
            entries,
            body,
            numbering,
            rels,
            content_types,
        })
    }

    /// Serializes the package. Entry order and compression are kept.
    pub fn to_bytes(&self) -> DocxResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &self.entries {
            let options = entry_options(entry.compression);
            if entry.is_dir {
                writer.add_directory(entry.name.as_str(), options)?;
                continue;
            }
            writer.start_file(entry.name.as_str(), options)?;
            match entry.name.as_str() {
                DOCUMENT_PART => writer.write_all(self.body.to_xml().as_bytes())?,
                NUMBERING_PART => match &self.numbering {
                    Some(numbering) if numbering.is_dirty() => {
                        writer.write_all(numbering.to_xml().as_bytes())?
                    }
                    _ => writer.write_all(&entry.data)?,
                },
                DOCUMENT_RELS_PART if self.rels.is_dirty() => {
                    writer.write_all(self.rels.to_xml().as_bytes())?
                }
                CONTENT_TYPES_PART if self.content_types.is_dirty() => {
                    writer.write_all(self.content_types.to_xml().as_bytes())?
                }
                _ => writer.write_all(&entry.data)?,
            }
        }
        let has_rels_entry = self.entries.iter().any(|entry| entry.name == DOCUMENT_RELS_PART);
        if self.rels.is_dirty() && !has_rels_entry {
            writer.start_file(DOCUMENT_RELS_PART, entry_options(CompressionMethod::Deflated))?;
            writer.write_all(self.rels.to_xml().as_bytes())?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Serialized main document part.
    pub fn document_xml(&self) -> String {
        self.body.to_xml()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn numbering(&self) -> Option<&Numbering> {
        self.numbering.as_ref()
    }

    pub fn numbering_mut(&mut self) -> Option<&mut Numbering> {
        self.numbering.as_mut()
    }

    pub fn relationships(&self) -> &Relationships {
        &self.rels
    }

    pub fn relationships_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    pub fn content_types_mut(&mut self) -> &mut ContentTypes {
        &mut self.content_types
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.name.as_str())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.data.as_slice())
    }

    /// Adds a part or replaces the bytes of an existing one. Parsed parts
    /// cannot be replaced this way.
    pub fn put_part(&mut self, name: &str, data: Vec<u8>) -> DocxResult<()> {
        if matches!(
            name,
            DOCUMENT_PART | NUMBERING_PART | DOCUMENT_RELS_PART | CONTENT_TYPES_PART
        ) {
            return Err(DocxError::structure(name, "parsed parts cannot be overwritten"));
        }
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.data = data,
            None => self.entries.push(PackageEntry {
                name: name.to_string(),
                compression: CompressionMethod::Stored,
                is_dir: false,
                data,
            }),
        }
        Ok(())
    }

    /// Part name a main-document relationship points at.
    pub fn relationship_part(&self, id: &str) -> Option<String> {
        let target = self.rels.target(id)?;
        Some(resolve_target(target))
    }
}

fn part_text<'a>(entries: &'a [PackageEntry], name: &str) -> DocxResult<Option<&'a str>> {
    match entries.iter().find(|entry| entry.name == name) {
        Some(entry) => std::str::from_utf8(&entry.data)
            .map(Some)
            .map_err(|_| DocxError::Encoding {
                part: name.to_string(),
            }),
        None => Ok(None),
    }
}

fn entry_options(compression: CompressionMethod) -> SimpleFileOptions {
    let method = match compression {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    };
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default())
}

/// Resolves a relationship target relative to `word/`.
fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = vec!["word"];
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_resolve_against_word_directory() {
        assert_eq!(resolve_target("media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("/word/media/a.png"), "word/media/a.png");
        assert_eq!(resolve_target("../customXml/item1.xml"), "customXml/item1.xml");
    }
}
