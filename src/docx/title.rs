//! Title inference for a target document.
//!
//! Strategies run in a fixed order and the first non-empty result wins: core properties,
//! header text, heading-styled paragraph, opening words of the body, file name. A
//! strategy that fails (malformed part, bad encoding) is logged and yields nothing.

use serde::Serialize;

use crate::docx::package::DocxPackage;
use crate::docx::tree::Element;
use crate::docx::{CORE_PROPS, DC_NS, HEADER_PARTS, MAIN_DOCUMENT, W_NS};
use crate::progress::ConsoleProgress;
use crate::textutil::{clean_header_title, first_words, title_from_filename};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleSource {
    Property,
    Header,
    Heading,
    FirstParagraph,
    Filename,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtractedTitle {
    pub text: String,
    pub source: TitleSource,
}

/// Concatenated `w:t` text under `el`, joined with `sep`.
pub fn run_text(el: &Element, sep: &str) -> String {
    el.descendants_named(W_NS, "t")
        .into_iter()
        .map(Element::text)
        .collect::<Vec<_>>()
        .join(sep)
}

pub fn extract_title(
    pkg: &DocxPackage,
    filename: Option<&str>,
    progress: &ConsoleProgress,
) -> ExtractedTitle {
    progress.info("Extracting title from target document");
    type Strategy = fn(&DocxPackage, &ConsoleProgress) -> anyhow::Result<Option<String>>;
    let strategies: [(TitleSource, Strategy); 4] = [
        (TitleSource::Property, from_core_properties),
        (TitleSource::Header, from_headers),
        (TitleSource::Heading, from_headings),
        (TitleSource::FirstParagraph, from_first_words),
    ];
    for (source, strategy) in strategies {
        match strategy(pkg, progress) {
            Ok(Some(text)) if !text.trim().is_empty() => {
                let text = text.trim().to_string();
                progress.success(format!("Found title ({source:?}): \"{text}\""));
                return ExtractedTitle { text, source };
            }
            Ok(_) => progress.debug(format!("no title from {source:?}")),
            Err(e) => progress.warn(format!("title strategy {source:?} failed: {e:#}")),
        }
    }
    let text = title_from_filename(filename);
    progress.warn(format!("Using filename as title: \"{text}\""));
    ExtractedTitle {
        text,
        source: TitleSource::Filename,
    }
}

fn from_core_properties(
    pkg: &DocxPackage,
    _progress: &ConsoleProgress,
) -> anyhow::Result<Option<String>> {
    let Some(core) = pkg.read_xml(CORE_PROPS)? else {
        return Ok(None);
    };
    Ok(core
        .root
        .find_descendant(DC_NS, "title")
        .map(|t| t.text().trim().to_string())
        .filter(|t| !t.is_empty()))
}

fn from_headers(pkg: &DocxPackage, progress: &ConsoleProgress) -> anyhow::Result<Option<String>> {
    for path in HEADER_PARTS {
        let doc = match pkg.read_xml(path) {
            Ok(Some(doc)) => doc,
            Ok(None) => continue,
            Err(e) => {
                progress.warn(format!("could not read {path} for title: {e:#}"));
                continue;
            }
        };
        let raw = run_text(&doc.root, " ");
        let raw = raw.trim();
        if raw.chars().count() <= 5 {
            continue;
        }
        progress.debug(format!("header text in {path}: \"{raw}\""));
        if let Some(title) = clean_header_title(raw) {
            return Ok(Some(title));
        }
    }
    Ok(None)
}

fn is_heading_style(id: &str) -> bool {
    let id = id.to_lowercase();
    id.contains("heading") || id.contains("title")
}

fn from_headings(pkg: &DocxPackage, _progress: &ConsoleProgress) -> anyhow::Result<Option<String>> {
    let Some(doc) = pkg.read_xml(MAIN_DOCUMENT)? else {
        return Ok(None);
    };
    let body = doc.root.child(W_NS, "body").unwrap_or(&doc.root);
    for p in body.descendants_named(W_NS, "p") {
        let styled = p
            .child(W_NS, "pPr")
            .and_then(|ppr| ppr.child(W_NS, "pStyle"))
            .and_then(|s| s.attr_ns(W_NS, "val"))
            .is_some_and(|id| is_heading_style(&id));
        if !styled {
            continue;
        }
        let text = run_text(p, "");
        let text = text.trim();
        let len = text.chars().count();
        if len > 5 && len < 100 {
            return Ok(Some(text.to_string()));
        }
    }
    Ok(None)
}

fn from_first_words(
    pkg: &DocxPackage,
    _progress: &ConsoleProgress,
) -> anyhow::Result<Option<String>> {
    let Some(doc) = pkg.read_xml(MAIN_DOCUMENT)? else {
        return Ok(None);
    };
    Ok(first_words(&run_text(&doc.root, " "), 10))
}

#[cfg(test)]
mod tests {
    use super::{extract_title, TitleSource};
    use crate::docx::package::DocxPackage;
    use crate::docx::testutil::{document, header, para, sect_pr, styled_para, PackageBuilder};
    use crate::docx::{CORE_PROPS, MAIN_DOCUMENT};
    use crate::progress::{ConsoleProgress, LogLevel};

    fn core(title: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{title}</dc:title></cp:coreProperties>"#
        )
    }

    fn pkg(builder: PackageBuilder) -> DocxPackage {
        DocxPackage::from_bytes(&builder.build()).unwrap()
    }

    fn extract(p: &DocxPackage) -> (String, TitleSource) {
        let t = extract_title(p, Some("Fallback_Name.docx"), &ConsoleProgress::new(false));
        (t.text, t.source)
    }

    #[test]
    fn core_property_wins() {
        let p = pkg(PackageBuilder::minimal()
            .text(CORE_PROPS, &core("  Batch Record Review "))
            .text("word/header1.xml", &header(&para("Quality Manual Document Revision 3"))));
        assert_eq!(extract(&p), ("Batch Record Review".to_string(), TitleSource::Property));
    }

    #[test]
    fn blank_property_falls_through_to_header() {
        let p = pkg(PackageBuilder::minimal()
            .text(CORE_PROPS, &core("   "))
            .text(
                "word/header1.xml",
                &header(&format!("{}{}", para("Quality Manual"), para("Document Revision 3"))),
            ));
        assert_eq!(extract(&p), ("Quality Manual".to_string(), TitleSource::Header));
    }

    #[test]
    fn rejected_header_falls_through_to_heading() {
        let body = format!(
            "{}{}{}{}",
            para("intro line"),
            styled_para("Heading1", "Short"),
            styled_para("Heading1", "Cleaning Validation"),
            sect_pr(&[])
        );
        let p = pkg(PackageBuilder::minimal()
            .text("word/header2.xml", &header(&para("SOP MF0415 12/26/2019")))
            .text(MAIN_DOCUMENT, &document(&body)));
        assert_eq!(extract(&p), ("Cleaning Validation".to_string(), TitleSource::Heading));
    }

    #[test]
    fn body_words_then_filename() {
        let body = format!(
            "{}{}",
            para("one two three four five six seven eight nine ten eleven"),
            sect_pr(&[])
        );
        let p = pkg(PackageBuilder::minimal().text(MAIN_DOCUMENT, &document(&body)));
        assert_eq!(
            extract(&p),
            (
                "one two three four five six seven eight nine ten".to_string(),
                TitleSource::FirstParagraph
            )
        );

        let p = pkg(PackageBuilder::minimal().text(MAIN_DOCUMENT, &document(&sect_pr(&[]))));
        assert_eq!(extract(&p), ("Fallback Name".to_string(), TitleSource::Filename));
    }

    #[test]
    fn malformed_part_is_skipped_with_warning() {
        let p = pkg(PackageBuilder::minimal()
            .text(CORE_PROPS, "<cp:coreProperties><dc:title>broken")
            .text("word/header1.xml", &header(&para("Line Clearance Procedure"))));
        let progress = ConsoleProgress::new(false);
        let t = extract_title(&p, None, &progress);
        assert_eq!(t.source, TitleSource::Header);
        assert_eq!(t.text, "Line Clearance Procedure");
        assert!(progress.count(LogLevel::Warning) >= 1);
    }
}
