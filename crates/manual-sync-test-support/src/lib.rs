//! Shared test harness utilities for manual-sync crates.
//!
//! [`DocxFixture`] assembles small but structurally faithful DOCX packages
//! in memory: styled headings with number runs, marker paragraphs, list
//! paragraphs backed by `numbering.xml`, tables and inline images.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use manual_sync_config::Config;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Returns a baseline configuration for tests.
pub fn test_config() -> Config {
    Config::default()
}

/// Numbering instance used by bullet list paragraphs.
pub const BULLET_NUM_ID: &str = "1";
/// Numbering instance used by numbered list paragraphs.
pub const DECIMAL_NUM_ID: &str = "2";
/// Numbering instance used by auto-numbered headings.
pub const HEADING_NUM_ID: &str = "3";

const NAMESPACES: &str = concat!(
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#
);

const NUMBERING_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    r#"<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
    r#"<w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="bullet"/><w:lvlText w:val="•"/></w:lvl></w:abstractNum>"#,
    r#"<w:abstractNum w:abstractNumId="1"><w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1."/></w:lvl><w:lvl w:ilvl="1"><w:start w:val="1"/><w:numFmt w:val="lowerLetter"/><w:lvlText w:val="%2)"/></w:lvl></w:abstractNum>"#,
    r#"<w:abstractNum w:abstractNumId="2"><w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1"/></w:lvl><w:lvl w:ilvl="1"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1.%2"/></w:lvl><w:lvl w:ilvl="2"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1.%2.%3"/></w:lvl></w:abstractNum>"#,
    r#"<w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>"#,
    r#"<w:num w:numId="2"><w:abstractNumId w:val="1"/></w:num>"#,
    r#"<w:num w:numId="3"><w:abstractNumId w:val="2"/></w:num>"#,
    "</w:numbering>"
);

/// Bytes standing in for a PNG image. Distinct seeds give distinct bytes.
pub fn png_bytes(seed: u8) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
    bytes.extend(std::iter::repeat(seed).take(16));
    bytes
}

#[derive(Debug, Clone)]
pub struct DocxFixture {
    body: Vec<String>,
    media: Vec<(String, Vec<u8>)>,
    numbering: bool,
    next_drawing: u32,
}

impl Default for DocxFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl DocxFixture {
    pub fn new() -> Self {
        Self {
            body: Vec::new(),
            media: Vec::new(),
            numbering: true,
            next_drawing: 1,
        }
    }

    /// Leaves `word/numbering.xml` out of the package.
    pub fn without_numbering(mut self) -> Self {
        self.numbering = false;
        self
    }

    /// Heading paragraph. With `number`, the label sits in a
    /// `SectionNumber` run followed by a tab, as the manual template does.
    pub fn heading(mut self, level: u8, number: Option<&str>, title: &str) -> Self {
        let mut xml = format!(r#"<w:p><w:pPr><w:pStyle w:val="Heading{level}"/></w:pPr>"#);
        if let Some(number) = number {
            xml.push_str(&format!(
                r#"<w:r><w:rPr><w:rStyle w:val="SectionNumber"/></w:rPr><w:t>{}</w:t></w:r><w:r><w:tab/></w:r>"#,
                escape(number)
            ));
        }
        xml.push_str(&format!(r#"<w:r><w:t>{}</w:t></w:r></w:p>"#, escape(title)));
        self.body.push(xml);
        self
    }

    /// Heading numbered by the word processor through `numbering.xml`.
    pub fn auto_heading(mut self, level: u8, title: &str) -> Self {
        self.body.push(format!(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading{level}"/><w:numPr><w:ilvl w:val="{}"/><w:numId w:val="{HEADING_NUM_ID}"/></w:numPr></w:pPr><w:r><w:t>{}</w:t></w:r></w:p>"#,
            level.saturating_sub(1),
            escape(title)
        ));
        self
    }

    pub fn paragraph(self, text: &str) -> Self {
        self.styled("BodyText", text)
    }

    pub fn styled(mut self, style: &str, text: &str) -> Self {
        self.body.push(format!(
            r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr><w:r><w:rPr><w:sz w:val="22"/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
            escape(text)
        ));
        self
    }

    /// Marker paragraph holding exactly `token`.
    pub fn marker(mut self, token: &str) -> Self {
        self.body.push(format!(
            r#"<w:p><w:r><w:rPr><w:vanish/></w:rPr><w:t>{}</w:t></w:r></w:p>"#,
            escape(token)
        ));
        self
    }

    pub fn bullet(self, text: &str) -> Self {
        self.list_item("ListBullet", BULLET_NUM_ID, text)
    }

    pub fn numbered(self, text: &str) -> Self {
        self.list_item("ListNumber", DECIMAL_NUM_ID, text)
    }

    pub fn list_item(mut self, style: &str, num_id: &str, text: &str) -> Self {
        self.body.push(format!(
            r#"<w:p><w:pPr><w:pStyle w:val="{style}"/><w:numPr><w:ilvl w:val="0"/><w:numId w:val="{num_id}"/></w:numPr></w:pPr><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
            escape(text)
        ));
        self
    }

    /// Table whose first row is the header.
    pub fn table(mut self, rows: &[&[&str]]) -> Self {
        let columns = rows.first().map(|row| row.len()).unwrap_or(0);
        let mut xml = String::from(r#"<w:tbl><w:tblPr><w:tblStyle w:val="TableGrid"/></w:tblPr><w:tblGrid>"#);
        for _ in 0..columns {
            xml.push_str(r#"<w:gridCol w:w="2000"/>"#);
        }
        xml.push_str("</w:tblGrid>");
        for (index, row) in rows.iter().enumerate() {
            xml.push_str("<w:tr>");
            if index == 0 {
                xml.push_str("<w:trPr><w:tblHeader/></w:trPr>");
            }
            for cell in row.iter() {
                xml.push_str(&format!(
                    r#"<w:tc><w:tcPr><w:tcW w:w="2000" w:type="dxa"/></w:tcPr><w:p><w:pPr><w:pStyle w:val="TableText"/></w:pPr><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p></w:tc>"#,
                    escape(cell)
                ));
            }
            xml.push_str("</w:tr>");
        }
        xml.push_str("</w:tbl>");
        self.body.push(xml);
        self
    }

    /// Inline image paragraph backed by `word/media/<media_name>`.
    pub fn image(mut self, media_name: &str, bytes: Vec<u8>) -> Self {
        let id = self.next_drawing;
        self.next_drawing += 1;
        let rel_id = format!("rIdImg{}", self.media.len() + 1);
        self.body.push(format!(
            concat!(
                r#"<w:p><w:pPr><w:pStyle w:val="Figure"/><w:jc w:val="center"/></w:pPr><w:r><w:drawing>"#,
                r#"<wp:inline distT="0" distB="0" distL="0" distR="0"><wp:extent cx="5486400" cy="3086100"/>"#,
                r#"<wp:docPr id="{id}" name="{name}"/>"#,
                r#"<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:pic><pic:nvPicPr><pic:cNvPr id="0" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="5486400" cy="3086100"/></a:xfrm><a:prstGeom prst="rect"/></pic:spPr>"#,
                r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
            ),
            id = id,
            name = escape(media_name),
            rel = rel_id,
        ));
        self.media.push((media_name.to_string(), bytes));
        self
    }

    /// Caption paragraph styled `ImageCaption`.
    pub fn caption(self, text: &str) -> Self {
        self.styled("ImageCaption", text)
    }

    /// Image paragraph followed by its caption.
    pub fn figure(self, media_name: &str, bytes: Vec<u8>, caption: &str) -> Self {
        self.image(media_name, bytes).caption(caption)
    }

    pub fn document_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
        xml.push_str(&format!("<w:document {NAMESPACES}><w:body>"));
        for element in &self.body {
            xml.push_str(element);
        }
        xml.push_str(r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#);
        xml
    }

    fn relationships_xml(&self) -> String {
        let mut xml = String::from(concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#
        ));
        if self.numbering {
            xml.push_str(r#"<Relationship Id="rIdNum" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering" Target="numbering.xml"/>"#);
        }
        for (index, (name, _)) in self.media.iter().enumerate() {
            xml.push_str(&format!(
                r#"<Relationship Id="rIdImg{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/{}"/>"#,
                index + 1,
                escape(name)
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }

    fn content_types_xml(&self) -> String {
        let mut xml = String::from(concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#
        ));
        if self.media.iter().any(|(name, _)| name.ends_with(".png")) {
            xml.push_str(r#"<Default Extension="png" ContentType="image/png"/>"#);
        }
        xml.push_str(r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#);
        if self.numbering {
            xml.push_str(r#"<Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/>"#);
        }
        xml.push_str("</Types>");
        xml
    }

    /// Zip archive bytes of the package.
    pub fn build(&self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        let mut parts: Vec<(String, Vec<u8>, SimpleFileOptions)> = vec![
            (
                "[Content_Types].xml".into(),
                self.content_types_xml().into_bytes(),
                deflated,
            ),
            (
                "_rels/.rels".into(),
                concat!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
                    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#
                )
                .as_bytes()
                .to_vec(),
                deflated,
            ),
            (
                "word/document.xml".into(),
                self.document_xml().into_bytes(),
                deflated,
            ),
            (
                "word/_rels/document.xml.rels".into(),
                self.relationships_xml().into_bytes(),
                deflated,
            ),
        ];
        if self.numbering {
            parts.push((
                "word/numbering.xml".into(),
                NUMBERING_XML.as_bytes().to_vec(),
                deflated,
            ));
        }
        for (name, bytes) in &self.media {
            parts.push((format!("word/media/{name}"), bytes.clone(), stored));
        }

        for (name, bytes, options) in parts {
            writer
                .start_file(name.as_str(), options)
                .expect("start fixture entry");
            writer.write_all(&bytes).expect("write fixture entry");
        }
        writer.finish().expect("finish fixture archive").into_inner()
    }

    /// Writes the package to `dir/name` and returns the path.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, self.build()).expect("write fixture package");
        path
    }
}

/// Reads one part out of package bytes.
pub fn read_part(package: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(package)).ok()?;
    let mut file = archive.by_name(name).ok()?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).ok()?;
    Some(data)
}

/// The main document XML of a package on disk.
pub fn document_xml_at(path: &Path) -> String {
    let bytes = fs::read(path).expect("read package");
    let part = read_part(&bytes, "word/document.xml").expect("document part");
    String::from_utf8(part).expect("utf-8 document part")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
