//! In-memory fixture packages for unit tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const NS_DECLS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

const DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/";

pub fn document(body: &str) -> String {
    format!("{DECL}<w:document {NS_DECLS}><w:body>{body}</w:body></w:document>")
}

pub fn styles(inner: &str) -> String {
    format!("{DECL}<w:styles {NS_DECLS}>{inner}</w:styles>")
}

pub fn header(inner: &str) -> String {
    format!("{DECL}<w:hdr {NS_DECLS}>{inner}</w:hdr>")
}

pub fn footer(inner: &str) -> String {
    format!("{DECL}<w:ftr {NS_DECLS}>{inner}</w:ftr>")
}

pub fn para(text: &str) -> String {
    format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
}

pub fn styled_para(style: &str, text: &str) -> String {
    format!(
        r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr><w:r><w:t>{text}</w:t></w:r></w:p>"#
    )
}

pub fn numbered_para(text: &str) -> String {
    format!(
        r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/><w:numPr><w:ilvl w:val="0"/><w:numId w:val="3"/></w:numPr></w:pPr><w:r><w:t>{text}</w:t></w:r></w:p>"#
    )
}

/// `refs` entries: (`"header"` | `"footer"`, section type, relationship id).
pub fn sect_pr(refs: &[(&str, &str, &str)]) -> String {
    let mut out = String::from("<w:sectPr>");
    for (kind, ty, rid) in refs {
        out.push_str(&format!(
            r#"<w:{kind}Reference w:type="{ty}" r:id="{rid}"/>"#
        ));
    }
    out.push_str(r#"<w:pgSz w:w="12240" w:h="15840"/></w:sectPr>"#);
    out
}

/// `rels` entries: (id, relationship type suffix, target).
pub fn rels(list: &[(&str, &str, &str)]) -> String {
    let mut out = format!(
        r#"{DECL}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#
    );
    for (id, ty, target) in list {
        out.push_str(&format!(
            r#"<Relationship Id="{id}" Type="{REL_BASE}{ty}" Target="{target}"/>"#
        ));
    }
    out.push_str("</Relationships>");
    out
}

pub fn content_types(overrides: &[(&str, &str)]) -> String {
    let mut out = format!(
        r#"{DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#
    );
    for (part, ct) in overrides {
        out.push_str(&format!(
            r#"<Override PartName="{part}" ContentType="{ct}"/>"#
        ));
    }
    out.push_str("</Types>");
    out
}

/// Template with a placeholder header bound through `rId5` and an Arial default font.
pub fn sample_template() -> Vec<u8> {
    PackageBuilder::minimal()
        .text(
            "word/header1.xml",
            &header(&para("Company SOP: {Enter SOP Title}")),
        )
        .text(
            "word/document.xml",
            &document(&format!("{}{}", para("x"), sect_pr(&[("header", "default", "rId5")]))),
        )
        .text(
            "word/_rels/document.xml.rels",
            &rels(&[("rId1", "styles", "styles.xml"), ("rId5", "header", "header1.xml")]),
        )
        .text(
            "word/styles.xml",
            &styles(r#"<w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Arial"/></w:rPr></w:rPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>"#),
        )
        .text(
            "[Content_Types].xml",
            &content_types(&[("/word/header1.xml", crate::docx::CT_HEADER)]),
        )
        .build()
}

/// Target whose header carries a title line with metadata, plus one media part.
pub fn sample_target(body: &str) -> Vec<u8> {
    PackageBuilder::minimal()
        .text(
            "word/header1.xml",
            &header(&para("Line Clearance Document MF0415 Revision 2")),
        )
        .text("word/document.xml", &document(body))
        .part("word/media/image1.png", b"target-image".to_vec())
        .build()
}

pub struct PackageBuilder {
    parts: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn empty() -> Self {
        Self { parts: Vec::new() }
    }

    /// Content types, package rels, a one-paragraph body with a plain `sectPr`, document
    /// rels pointing at styles, and a style sheet holding `Normal`.
    pub fn minimal() -> Self {
        Self::empty()
            .text("[Content_Types].xml", &content_types(&[]))
            .text(
                "_rels/.rels",
                &rels(&[("rId1", "officeDocument", "word/document.xml")]),
            )
            .text(
                "word/document.xml",
                &document(&format!("{}{}", para("Body text"), sect_pr(&[]))),
            )
            .text(
                "word/_rels/document.xml.rels",
                &rels(&[("rId1", "styles", "styles.xml")]),
            )
            .text(
                "word/styles.xml",
                &styles(r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>"#),
            )
    }

    pub fn part(mut self, name: &str, data: Vec<u8>) -> Self {
        self.parts.retain(|(n, _)| n != name);
        self.parts.push((name.to_string(), data));
        self
    }

    pub fn text(self, name: &str, text: &str) -> Self {
        self.part(name, text.as_bytes().to_vec())
    }

    pub fn without(mut self, name: &str) -> Self {
        self.parts.retain(|(n, _)| n != name);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in &self.parts {
            zout.start_file(name.as_str(), opts).expect("start fixture entry");
            zout.write_all(data).expect("write fixture entry");
        }
        zout.finish().expect("finish fixture zip").into_inner()
    }
}
