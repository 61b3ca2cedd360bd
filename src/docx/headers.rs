//! Header/footer replacement and section-property rewiring.
//!
//! Copying `word/headerN.xml` bytes is not enough for Word to show them: a section binds
//! its headers and footers through `w:headerReference`/`w:footerReference` elements that
//! name a main-document relationship id. After the parts are copied, every target
//! `w:sectPr` gets the template's references and the target's relationship manifest is
//! made to resolve each referenced id to the copied part.

use std::collections::HashMap;

use serde::Serialize;

use crate::docx::package::DocxPackage;
use crate::docx::rels::{
    copy_part_relationships, install_document_relationship, resolve_target, ContentTypes,
    Relationships,
};
use crate::docx::styles::{reconcile_styles, StyleMergeReport};
use crate::docx::tree::{Element, XmlDocument};
use crate::docx::xml::escape_text;
use crate::docx::{
    CT_FOOTER, CT_HEADER, DOCUMENT_RELS, FOOTER_PARTS, HEADER_PARTS, MAIN_DOCUMENT, R_NS,
    STYLES, W_NS,
};
use crate::error::{classify, ErrorKind, MergeError};
use crate::progress::ConsoleProgress;

pub const TITLE_PLACEHOLDER: &str = "{Enter SOP Title}";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Header,
    Footer,
}

impl SlotKind {
    pub fn content_type(self) -> &'static str {
        match self {
            SlotKind::Header => CT_HEADER,
            SlotKind::Footer => CT_FOOTER,
        }
    }
}

/// The six fixed header/footer part paths, headers first.
pub fn slots() -> impl Iterator<Item = (SlotKind, &'static str)> {
    HEADER_PARTS
        .iter()
        .map(|p| (SlotKind::Header, *p))
        .chain(FOOTER_PARTS.iter().map(|p| (SlotKind::Footer, *p)))
}

#[derive(Clone, Debug, Default)]
pub struct HeaderFooterReport {
    pub copied_parts: Vec<String>,
    pub titles_inserted: usize,
    pub references_rewired: usize,
    pub styles: Option<StyleMergeReport>,
    pub warnings: Vec<String>,
}

impl HeaderFooterReport {
    fn warn(&mut self, progress: &ConsoleProgress, msg: String) {
        progress.warn(&msg);
        self.warnings.push(msg);
    }
}

/// Replace every occurrence of the title placeholder with `title`, escaped for markup.
/// Returns the new text and the number of replacements.
pub fn substitute_placeholder(xml: &str, title: &str) -> (String, usize) {
    let count = xml.matches(TITLE_PLACEHOLDER).count();
    if count == 0 {
        return (xml.to_string(), 0);
    }
    (xml.replace(TITLE_PLACEHOLDER, &escape_text(title)), count)
}

/// Install the template's header/footer parts into `target`, rewire section properties
/// to them and reconcile the styles they use.
///
/// `title` is spliced into the placeholder when given. A missing `w:sectPr` on either
/// side, or a style sheet without its root, only produces a warning.
pub fn replace_headers_footers(
    target: &mut DocxPackage,
    template: &DocxPackage,
    title: Option<&str>,
    progress: &ConsoleProgress,
) -> anyhow::Result<HeaderFooterReport> {
    let mut report = HeaderFooterReport::default();
    let mut installed = Vec::new();

    for (kind, path) in slots() {
        let Some(raw) = template.part(path) else {
            continue;
        };
        let text = match template.part_text(path) {
            Some(t) => t?,
            None => continue,
        };
        let (text, n) = match title {
            Some(t) if !t.trim().is_empty() => substitute_placeholder(&text, t),
            _ => (text, 0),
        };
        let bytes = if n == 0 {
            raw.to_vec()
        } else if raw.starts_with(&[0xFF, 0xFE]) || raw.starts_with(&[0xFE, 0xFF]) {
            XmlDocument::parse(path, &text)?.to_bytes()?
        } else {
            text.clone().into_bytes()
        };
        if n > 0 {
            report.titles_inserted += n;
            progress.success(format!("Title inserted in {path}"));
        }

        target.set_part(path, bytes);
        // Loaded after the rels copy, which may have registered media types of its own.
        copy_part_relationships(target, template, path)?;
        let mut ct = ContentTypes::load(target)?;
        if ct.ensure_override(path, kind.content_type()) {
            ct.save(target)?;
        }
        report.copied_parts.push(path.to_string());
        progress.info(format!("Replaced {}: {path}", slot_label(kind)));

        match XmlDocument::parse(path, &text) {
            Ok(doc) => installed.push(doc),
            Err(e) => report.warn(progress, format!("{path} not scanned for styles: {e:#}")),
        }
    }

    rewire_section_references(target, template, &mut report, progress)?;
    merge_referenced_styles(target, template, &installed, &mut report, progress)?;

    progress.success(format!(
        "Replaced {} header/footer parts",
        report.copied_parts.len()
    ));
    Ok(report)
}

fn slot_label(kind: SlotKind) -> &'static str {
    match kind {
        SlotKind::Header => "header",
        SlotKind::Footer => "footer",
    }
}

fn main_document(pkg: &DocxPackage, side: &str) -> anyhow::Result<XmlDocument> {
    pkg.read_xml(MAIN_DOCUMENT)?
        .ok_or_else(|| MergeError::MissingRequiredPart(format!("{side} {MAIN_DOCUMENT}")).into())
}

/// Section properties that carry the template's header/footer binding: the body-level
/// `w:sectPr`, or the last one in the body.
fn source_section(doc: &XmlDocument) -> Option<&Element> {
    let body = doc.root.child(W_NS, "body")?;
    body.child(W_NS, "sectPr")
        .or_else(|| body.descendants_named(W_NS, "sectPr").into_iter().last())
}

fn section_paths(root: &Element) -> Vec<Vec<usize>> {
    let Some(body_idx) = root.child_position(W_NS, "body") else {
        return Vec::new();
    };
    let Some(body) = root.at_path(&[body_idx]) else {
        return Vec::new();
    };
    let sect_pr = |e: &Element| e.is(W_NS, "sectPr");
    body.find_paths(&sect_pr)
        .into_iter()
        .filter(|p| {
            // History copies inside w:sectPrChange are not live sections.
            let parent = body.at_path(&p[..p.len() - 1]);
            !parent.is_some_and(|e| e.is(W_NS, "sectPrChange"))
        })
        .map(|mut p| {
            p.insert(0, body_idx);
            p
        })
        .collect()
}

fn is_reference(el: &Element) -> bool {
    el.is(W_NS, "headerReference") || el.is(W_NS, "footerReference")
}

fn rewire_section_references(
    target: &mut DocxPackage,
    template: &DocxPackage,
    report: &mut HeaderFooterReport,
    progress: &ConsoleProgress,
) -> anyhow::Result<()> {
    let template_doc = main_document(template, "template")?;
    let mut target_doc = main_document(target, "target")?;

    let Some(source) = source_section(&template_doc) else {
        let e = MergeError::MissingSectionProperties(format!("template {MAIN_DOCUMENT}"));
        report.warn(progress, format!("{e}; header/footer references not rewired"));
        return Ok(());
    };
    let paths = section_paths(&target_doc.root);
    if paths.is_empty() {
        let e = MergeError::MissingSectionProperties(format!("target {MAIN_DOCUMENT}"));
        report.warn(progress, format!("{e}; header/footer references not rewired"));
        return Ok(());
    }

    let template_rels = Relationships::load(template, DOCUMENT_RELS)?;
    let mut refs = Vec::new();
    let mut id_map: HashMap<String, String> = HashMap::new();
    for r in source.elements().filter(|e| is_reference(e)) {
        let Some(rid) = r.attr_ns(R_NS, "id") else {
            report.warn(progress, format!("template {} without r:id skipped", r.local_name()));
            continue;
        };
        let Some(rel) = template_rels.as_ref().and_then(|rels| rels.get(&rid)) else {
            report.warn(progress, format!("template relationship {rid} not found; reference skipped"));
            continue;
        };
        let part = resolve_target(MAIN_DOCUMENT, &rel.target);
        if !target.has_part(&part) {
            report.warn(progress, format!("{part} was not installed; reference {rid} skipped"));
            continue;
        }
        let id = match id_map.get(&rid) {
            Some(id) => id.clone(),
            None => {
                let id = install_document_relationship(target, template, &rid)?;
                if id != rid {
                    progress.debug(format!("relationship {rid} installed as {id}"));
                }
                id_map.insert(rid.clone(), id.clone());
                id
            }
        };
        let mut clone = target_doc.import(r);
        clone.set_attr_ns(R_NS, "id", &id);
        refs.push(clone);
    }

    for path in &paths {
        let Some(sect) = target_doc.root.at_path_mut(path) else {
            continue;
        };
        let removed = sect.retain_elements(|e| !is_reference(e));
        progress.debug(format!("removed {removed} old header/footer references"));
        for (i, r) in refs.iter().enumerate() {
            sect.insert(i, r.clone());
        }
        report.references_rewired += refs.len();
    }
    target.write_xml(&target_doc)?;
    progress.success(format!(
        "Section properties now reference template headers/footers ({} sections)",
        paths.len()
    ));
    Ok(())
}

fn merge_referenced_styles(
    target: &mut DocxPackage,
    template: &DocxPackage,
    installed: &[XmlDocument],
    report: &mut HeaderFooterReport,
    progress: &ConsoleProgress,
) -> anyhow::Result<()> {
    let Some(template_styles) = template.read_xml(STYLES)? else {
        report.warn(progress, format!("template has no {STYLES}; style merge skipped"));
        return Ok(());
    };
    let Some(mut target_styles) = target.read_xml(STYLES)? else {
        report.warn(progress, format!("target has no {STYLES}; style merge skipped"));
        return Ok(());
    };
    match reconcile_styles(&template_styles, &mut target_styles, installed) {
        Ok(styles) => {
            if styles.changed() > 0 {
                target.write_xml(&target_styles)?;
            }
            progress.info(format!(
                "Styles: {} referenced, {} imported, {} replaced",
                styles.referenced.len(),
                styles.imported.len(),
                styles.replaced.len()
            ));
            report.styles = Some(styles);
            Ok(())
        }
        Err(e) if classify(&e) == ErrorKind::MissingStylesRoot => {
            report.warn(progress, format!("{e}; style merge skipped"));
            Ok(())
        }
        Err(e) => Err(e),
    }
}
