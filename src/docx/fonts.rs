use anyhow::Context;

use crate::docx::package::DocxPackage;
use crate::docx::rels::{copy_part_relationships, ensure_document_relationship, ContentTypes};
use crate::docx::tree::{Element, XmlDocument};
use crate::docx::{CT_FONT_TABLE, FONT_TABLE, MAIN_DOCUMENT, REL_TYPE_FONT_TABLE, STYLES, W_NS};
use crate::error::{classify, ErrorKind, MergeError};
use crate::progress::ConsoleProgress;

pub const FALLBACK_FONT: &str = "Calibri";

/// Face attributes with the theme attributes that would otherwise win over them.
const FACE_THEMES: [(&str, &str); 3] = [
    ("ascii", "asciiTheme"),
    ("hAnsi", "hAnsiTheme"),
    ("cs", "cstheme"),
];

#[derive(Clone, Debug, Default)]
pub struct FontReport {
    pub font: String,
    pub styles_forced: usize,
    pub inline_corrected: usize,
    pub font_table_copied: bool,
    pub warnings: Vec<String>,
}

fn face_of(rfonts: &Element) -> Option<String> {
    rfonts
        .attr_ns(W_NS, "ascii")
        .or_else(|| rfonts.attr_ns(W_NS, "hAnsi"))
        .filter(|f| !f.trim().is_empty())
}

/// Default body font a style sheet declares: document defaults first, then `Normal`.
pub fn default_font(styles: &XmlDocument) -> Option<String> {
    let from_defaults = styles
        .root
        .child(W_NS, "docDefaults")
        .and_then(|d| d.child(W_NS, "rPrDefault"))
        .and_then(|d| d.child(W_NS, "rPr"))
        .and_then(|r| r.child(W_NS, "rFonts"))
        .and_then(face_of);
    if from_defaults.is_some() {
        return from_defaults;
    }
    styles
        .root
        .children_named(W_NS, "style")
        .find(|s| s.attr_ns(W_NS, "styleId").as_deref() == Some("Normal"))
        .and_then(|s| s.child(W_NS, "rPr"))
        .and_then(|r| r.child(W_NS, "rFonts"))
        .and_then(face_of)
}

/// Font to normalize to, or `None` when the target keeps its own fonts.
pub fn resolve_target_font(
    font_override: Option<&str>,
    preserve_target_fonts: bool,
    template: &DocxPackage,
    progress: &ConsoleProgress,
) -> Option<String> {
    if let Some(font) = font_override.map(str::trim).filter(|f| !f.is_empty()) {
        return Some(font.to_string());
    }
    if preserve_target_fonts {
        return None;
    }
    let detected = match template.read_xml(STYLES) {
        Ok(Some(styles)) => default_font(&styles),
        Ok(None) => None,
        Err(e) => {
            progress.warn(format!("could not read template styles for font: {e:#}"));
            None
        }
    };
    match detected {
        Some(font) => {
            progress.info(format!("Template default font: {font}"));
            Some(font)
        }
        None => {
            progress.warn(format!("Could not detect template font, using {FALLBACK_FONT}"));
            Some(FALLBACK_FONT.to_string())
        }
    }
}

fn force_faces(rfonts: &mut Element, font: &str) {
    for (face, theme) in FACE_THEMES {
        rfonts.remove_attr_ns(W_NS, theme);
        rfonts.set_attr_ns(W_NS, face, font);
    }
}

/// Force the faces of `rpr`'s `w:rFonts`, inserting one as its first child if absent.
fn force_rpr_faces(rpr: &mut Element, proto: &Element, font: &str) {
    if rpr.child(W_NS, "rFonts").is_none() {
        rpr.insert(0, proto.clone());
    }
    if let Some(rfonts) = rpr.child_mut(W_NS, "rFonts") {
        force_faces(rfonts, font);
    }
}

/// Point the document defaults and every style of a style sheet at `font`.
/// Returns the number of `w:rFonts` elements forced.
pub fn force_style_fonts(styles: &mut XmlDocument, font: &str) -> anyhow::Result<usize> {
    if !styles.root.is(W_NS, "styles") {
        return Err(MergeError::MissingStylesRoot(styles.name.clone()).into());
    }
    let rfonts = styles.create_element(W_NS, "rFonts");
    let rpr = styles.create_element(W_NS, "rPr");
    let rpr_default = styles.create_element(W_NS, "rPrDefault");
    let doc_defaults = styles.create_element(W_NS, "docDefaults");

    let root = &mut styles.root;
    if root.child(W_NS, "docDefaults").is_none() {
        root.insert(0, doc_defaults);
    }
    let defaults = root
        .child_mut(W_NS, "docDefaults")
        .context("docDefaults present")?;
    if defaults.child(W_NS, "rPrDefault").is_none() {
        defaults.insert(0, rpr_default);
    }
    let rpr_default = defaults
        .child_mut(W_NS, "rPrDefault")
        .context("rPrDefault present")?;
    if rpr_default.child(W_NS, "rPr").is_none() {
        rpr_default.push(rpr.clone());
    }
    let default_rpr = rpr_default.child_mut(W_NS, "rPr").context("rPr present")?;
    force_rpr_faces(default_rpr, &rfonts, font);
    let mut forced = 1;

    for style in root.elements_mut().filter(|e| e.is(W_NS, "style")) {
        if style.child(W_NS, "rPr").is_none() {
            let at = style
                .child_position(W_NS, "name")
                .map(|i| i + 1)
                .unwrap_or(0);
            style.insert(at, rpr.clone());
        }
        let style_rpr = style.child_mut(W_NS, "rPr").context("style rPr present")?;
        force_rpr_faces(style_rpr, &rfonts, font);
        forced += 1;
    }
    Ok(forced)
}

/// Rewrite every existing `w:rFonts` in a part: ASCII and high-ANSI faces always, the
/// complex-script face only where one is already named.
pub fn correct_inline_fonts(doc: &mut XmlDocument, font: &str) -> usize {
    let mut corrected = 0;
    doc.root.for_each_descendant_mut(&mut |el| {
        if !el.is(W_NS, "rFonts") {
            return;
        }
        for (face, theme) in &FACE_THEMES[..2] {
            el.remove_attr_ns(W_NS, theme);
            el.set_attr_ns(W_NS, face, font);
        }
        if el.has_attr_ns(W_NS, "cs") {
            el.set_attr_ns(W_NS, "cs", font);
        }
        corrected += 1;
    });
    corrected
}

/// Replace the target's font table with the template's and make sure it is wired in.
pub fn copy_font_table(target: &mut DocxPackage, template: &DocxPackage) -> anyhow::Result<bool> {
    let Some(bytes) = template.part(FONT_TABLE) else {
        return Ok(false);
    };
    target.set_part(FONT_TABLE, bytes.to_vec());
    ensure_document_relationship(target, "", REL_TYPE_FONT_TABLE, "fontTable.xml")?;
    let mut ct = ContentTypes::load(target)?;
    if ct.ensure_override(FONT_TABLE, CT_FONT_TABLE) {
        ct.save(target)?;
    }
    copy_part_relationships(target, template, FONT_TABLE)?;
    Ok(true)
}

/// Force `font` on the target's style sheet and inline font references, and install the
/// template's font table.
pub fn normalize_fonts(
    target: &mut DocxPackage,
    template: &DocxPackage,
    font: &str,
    progress: &ConsoleProgress,
) -> anyhow::Result<FontReport> {
    progress.info(format!("Applying font: {font}"));
    let mut report = FontReport {
        font: font.to_string(),
        ..Default::default()
    };

    match target.read_xml(STYLES)? {
        None => {
            let msg = format!("Target document is missing {STYLES}, cannot apply font");
            progress.warn(&msg);
            report.warnings.push(msg);
        }
        Some(mut styles) => match force_style_fonts(&mut styles, font) {
            Ok(n) => {
                report.styles_forced = n;
                target.write_xml(&styles)?;
            }
            Err(e) if classify(&e) == ErrorKind::MissingStylesRoot => {
                let msg = format!("{e}; style fonts not forced");
                progress.warn(&msg);
                report.warnings.push(msg);
            }
            Err(e) => return Err(e),
        },
    }

    report.font_table_copied = copy_font_table(target, template)?;
    if report.font_table_copied {
        progress.info("Applied template font table");
    }

    if let Some(mut doc) = target.read_xml(MAIN_DOCUMENT)? {
        report.inline_corrected = correct_inline_fonts(&mut doc, font);
        if report.inline_corrected > 0 {
            target.write_xml(&doc)?;
        }
    }
    progress.success(format!(
        "Font {font}: {} styles forced, {} inline references corrected",
        report.styles_forced, report.inline_corrected
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{
        correct_inline_fonts, default_font, force_style_fonts, normalize_fonts,
        resolve_target_font, FALLBACK_FONT,
    };
    use crate::docx::package::DocxPackage;
    use crate::docx::rels::{ContentTypes, Relationships};
    use crate::docx::testutil::{document, sect_pr, styles, PackageBuilder};
    use crate::docx::tree::{Element, XmlDocument};
    use crate::docx::{
        CT_FONT_TABLE, DOCUMENT_RELS, FONT_TABLE, MAIN_DOCUMENT, REL_TYPE_FONT_TABLE, STYLES,
        W_NS,
    };
    use crate::progress::ConsoleProgress;

    const SHEET: &str = r#"<w:style w:type="paragraph" w:styleId="Normal"><w:name w:val="Normal"/><w:pPr><w:spacing w:after="0"/></w:pPr><w:rPr><w:rFonts w:asciiTheme="minorHAnsi" w:ascii="Times New Roman"/><w:sz w:val="22"/></w:rPr></w:style><w:style w:type="character" w:styleId="Plain"><w:name w:val="Plain"/><w:basedOn w:val="Normal"/></w:style><w:style w:type="table" w:styleId="NoName"/>"#;

    fn faces(rfonts: &Element) -> [Option<String>; 3] {
        ["ascii", "hAnsi", "cs"].map(|f| rfonts.attr_ns(W_NS, f))
    }

    fn arial() -> [Option<String>; 3] {
        [Some("Arial".into()), Some("Arial".into()), Some("Arial".into())]
    }

    #[test]
    fn every_style_and_defaults_forced() {
        let mut doc = XmlDocument::parse(STYLES, &styles(SHEET)).unwrap();
        let n = force_style_fonts(&mut doc, "Arial").unwrap();
        assert_eq!(n, 4);

        let defaults = doc.root.elements().next().unwrap();
        assert!(defaults.is(W_NS, "docDefaults"));
        let rfonts = defaults.find_descendant(W_NS, "rFonts").unwrap();
        assert_eq!(faces(rfonts), arial());

        for style in doc.root.children_named(W_NS, "style") {
            let rpr = style.child(W_NS, "rPr").unwrap();
            let first = rpr.elements().next().unwrap();
            assert!(first.is(W_NS, "rFonts"));
            assert_eq!(faces(first), arial());
            assert!(!first.has_attr_ns(W_NS, "asciiTheme"));
        }
        let plain = doc
            .root
            .children_named(W_NS, "style")
            .find(|s| s.attr_ns(W_NS, "styleId").as_deref() == Some("Plain"))
            .unwrap();
        let order: Vec<&str> = plain.elements().map(Element::local_name).collect();
        assert_eq!(order, vec!["name", "rPr", "basedOn"]);
        let unnamed = doc.root.children_named(W_NS, "style").last().unwrap();
        assert!(unnamed.elements().next().unwrap().is(W_NS, "rPr"));
    }

    #[test]
    fn forcing_twice_is_stable() {
        let mut doc = XmlDocument::parse(STYLES, &styles(SHEET)).unwrap();
        force_style_fonts(&mut doc, "Arial").unwrap();
        let once = doc.to_text().unwrap();
        force_style_fonts(&mut doc, "Arial").unwrap();
        assert_eq!(doc.to_text().unwrap(), once);
    }

    #[test]
    fn inline_cs_only_when_present() {
        let body = r#"<w:p><w:r><w:rPr><w:rFonts w:ascii="Times" w:hAnsi="Times"/></w:rPr><w:t>a</w:t></w:r><w:r><w:rPr><w:rFonts w:ascii="Times" w:cs="Mangal"/></w:rPr><w:t>b</w:t></w:r><w:r><w:t>c</w:t></w:r></w:p>"#;
        let mut doc = XmlDocument::parse(MAIN_DOCUMENT, &document(body)).unwrap();
        assert_eq!(correct_inline_fonts(&mut doc, "Arial"), 2);
        let all = doc.root.descendants_named(W_NS, "rFonts");
        assert_eq!(faces(all[0]), [Some("Arial".into()), Some("Arial".into()), None]);
        assert_eq!(faces(all[1]), arial());
        assert_eq!(doc.root.descendants_named(W_NS, "rPr").len(), 2);
    }

    #[test]
    fn font_resolution_order() {
        let tpl = DocxPackage::from_bytes(
            &PackageBuilder::minimal()
                .text(
                    STYLES,
                    &styles(r#"<w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:hAnsi="Verdana"/></w:rPr></w:rPrDefault></w:docDefaults>"#),
                )
                .build(),
        )
        .unwrap();
        let quiet = ConsoleProgress::new(false);
        assert_eq!(resolve_target_font(Some("Arial"), true, &tpl, &quiet).as_deref(), Some("Arial"));
        assert_eq!(resolve_target_font(None, true, &tpl, &quiet), None);
        assert_eq!(resolve_target_font(Some("  "), false, &tpl, &quiet).as_deref(), Some("Verdana"));

        let bare = DocxPackage::from_bytes(&PackageBuilder::minimal().build()).unwrap();
        assert_eq!(resolve_target_font(None, false, &bare, &quiet).as_deref(), Some(FALLBACK_FONT));

        let normal = XmlDocument::parse(STYLES, &styles(SHEET)).unwrap();
        assert_eq!(default_font(&normal).as_deref(), Some("Times New Roman"));
    }

    #[test]
    fn normalize_installs_font_table() {
        let tpl = DocxPackage::from_bytes(
            &PackageBuilder::minimal()
                .text(FONT_TABLE, r#"<w:fonts xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:font w:name="Arial"/></w:fonts>"#)
                .build(),
        )
        .unwrap();
        let mut tgt = DocxPackage::from_bytes(
            &PackageBuilder::minimal()
                .text(MAIN_DOCUMENT, &document(&sect_pr(&[])))
                .build(),
        )
        .unwrap();
        let report = normalize_fonts(&mut tgt, &tpl, "Arial", &ConsoleProgress::new(false)).unwrap();
        assert!(report.font_table_copied);
        assert_eq!(report.styles_forced, 2);
        assert_eq!(tgt.part(FONT_TABLE), tpl.part(FONT_TABLE));
        let rels = Relationships::load(&tgt, DOCUMENT_RELS).unwrap().unwrap();
        assert!(rels.find(REL_TYPE_FONT_TABLE, "fontTable.xml").is_some());
        let ct = ContentTypes::load(&tgt).unwrap();
        assert_eq!(ct.content_type_for(FONT_TABLE).as_deref(), Some(CT_FONT_TABLE));
    }

    #[test]
    fn missing_styles_part_is_a_warning() {
        let tpl = DocxPackage::from_bytes(&PackageBuilder::minimal().build()).unwrap();
        let mut tgt =
            DocxPackage::from_bytes(&PackageBuilder::minimal().without(STYLES).build()).unwrap();
        let report = normalize_fonts(&mut tgt, &tpl, "Arial", &ConsoleProgress::new(false)).unwrap();
        assert_eq!(report.styles_forced, 0);
        assert_eq!(report.warnings.len(), 1);
    }
}
