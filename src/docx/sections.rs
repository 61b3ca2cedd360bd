use serde::Serialize;

use crate::docx::package::DocxPackage;
use crate::docx::title::run_text;
use crate::docx::tree::{Element, XmlDocument};
use crate::docx::{MAIN_DOCUMENT, W_NS};
use crate::progress::ConsoleProgress;

pub const MARKER: &str = "PROCEDURE";
pub const SECTION_HEADING: &str = "PROCESS FLOW CHART";
pub const PLACEHOLDER_TEXT: &str = "NA";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionInsertion {
    Inserted,
    Skipped,
}

fn is_numbered(p: &Element) -> bool {
    p.child(W_NS, "pPr")
        .and_then(|ppr| ppr.child(W_NS, "numPr"))
        .is_some()
}

fn is_marker(p: &Element) -> bool {
    is_numbered(p) && run_text(p, "").trim().to_uppercase().contains(MARKER)
}

fn text_run(doc: &XmlDocument, text: &str, bold: bool) -> Element {
    let mut run = doc.create_element(W_NS, "r");
    if bold {
        let mut rpr = doc.create_element(W_NS, "rPr");
        rpr.push(doc.create_element(W_NS, "b"));
        run.push(rpr);
    }
    let mut t = doc.create_element(W_NS, "t");
    if bold {
        t.set_attr("xml:space", "preserve");
    }
    t.push_text(text);
    run.push(t);
    run
}

/// Insert a "PROCESS FLOW CHART" heading, an "NA" paragraph and a blank paragraph before
/// the first numbered paragraph whose text contains "PROCEDURE".
///
/// The heading is a clone of the matched paragraph with its runs replaced by one bold
/// run. The "NA" paragraph borrows the paragraph properties of the paragraph after the
/// match, minus its numbering.
pub fn insert_flow_chart_section(doc: &mut XmlDocument, progress: &ConsoleProgress) -> SectionInsertion {
    let Some(body_idx) = doc.root.child_position(W_NS, "body") else {
        progress.warn("Document has no body; section insertion skipped");
        return SectionInsertion::Skipped;
    };
    let is_p = |e: &Element| e.is(W_NS, "p");
    let (found, next_ppr, path) = {
        let Some(body) = doc.root.at_path(&[body_idx]) else {
            return SectionInsertion::Skipped;
        };
        let paths = body.find_paths(&is_p);
        let Some(i) = paths
            .iter()
            .position(|p| body.at_path(p).is_some_and(is_marker))
        else {
            progress.warn(format!(
                "Could not find a numbered heading containing \"{MARKER}\"; section insertion skipped"
            ));
            return SectionInsertion::Skipped;
        };
        let found = body.at_path(&paths[i]).cloned();
        let next_ppr = paths
            .get(i + 1)
            .and_then(|p| body.at_path(p))
            .and_then(|p| p.child(W_NS, "pPr"))
            .cloned();
        (found, next_ppr, paths[i].clone())
    };
    let Some(mut heading) = found else {
        return SectionInsertion::Skipped;
    };

    heading.remove_descendants_named(W_NS, "r");
    // Bookmark names must stay unique.
    heading.remove_descendants_named(W_NS, "bookmarkStart");
    heading.remove_descendants_named(W_NS, "bookmarkEnd");
    heading.remove_descendants_named(W_NS, "sectPr");
    heading.push(text_run(doc, SECTION_HEADING, true));

    let mut na = doc.create_element(W_NS, "p");
    if let Some(mut ppr) = next_ppr {
        ppr.remove_descendants_named(W_NS, "numPr");
        ppr.remove_descendants_named(W_NS, "sectPr");
        na.push(ppr);
        progress.debug("NA paragraph takes the following paragraph's properties");
    }
    na.push(text_run(doc, PLACEHOLDER_TEXT, false));
    let blank = doc.create_element(W_NS, "p");

    let Some((&idx, parent)) = path.split_last() else {
        return SectionInsertion::Skipped;
    };
    let mut parent_path = vec![body_idx];
    parent_path.extend_from_slice(parent);
    let Some(parent) = doc.root.at_path_mut(&parent_path) else {
        return SectionInsertion::Skipped;
    };
    parent.insert(idx, blank);
    parent.insert(idx, na);
    parent.insert(idx, heading);
    progress.success(format!("Inserted \"{SECTION_HEADING}\" section"));
    SectionInsertion::Inserted
}

/// Run [`insert_flow_chart_section`] on a package's main document.
pub fn apply_flow_chart_section(
    pkg: &mut DocxPackage,
    progress: &ConsoleProgress,
) -> anyhow::Result<SectionInsertion> {
    let Some(mut doc) = pkg.read_xml(MAIN_DOCUMENT)? else {
        progress.warn(format!("{MAIN_DOCUMENT} missing; section insertion skipped"));
        return Ok(SectionInsertion::Skipped);
    };
    let outcome = insert_flow_chart_section(&mut doc, progress);
    if outcome == SectionInsertion::Inserted {
        pkg.write_xml(&doc)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::{insert_flow_chart_section, SectionInsertion};
    use crate::docx::testutil::{document, numbered_para, para, sect_pr};
    use crate::docx::title::run_text;
    use crate::docx::tree::{Element, XmlDocument};
    use crate::docx::{MAIN_DOCUMENT, W_NS};
    use crate::progress::ConsoleProgress;

    const LIST_PARA: &str = r#"<w:p><w:pPr><w:pStyle w:val="ListParagraph"/><w:numPr><w:ilvl w:val="1"/><w:numId w:val="3"/></w:numPr><w:ind w:left="720"/></w:pPr><w:r><w:t>3.1 Sample the line</w:t></w:r></w:p>"#;

    fn parse(body: &str) -> XmlDocument {
        XmlDocument::parse(MAIN_DOCUMENT, &document(body)).unwrap()
    }

    fn body(doc: &XmlDocument) -> Vec<&Element> {
        doc.root.child(W_NS, "body").unwrap().elements().collect()
    }

    fn style_of(p: &Element) -> Option<String> {
        p.child(W_NS, "pPr")?.child(W_NS, "pStyle")?.attr_ns(W_NS, "val")
    }

    #[test]
    fn inserts_three_paragraphs_before_procedure() {
        let src = format!(
            "{}{}{LIST_PARA}{}",
            para("2. SCOPE"),
            numbered_para("3. PROCEDURE"),
            sect_pr(&[])
        );
        let original = parse(&src);
        let mut doc = parse(&src);
        let outcome = insert_flow_chart_section(&mut doc, &ConsoleProgress::new(false));
        assert_eq!(outcome, SectionInsertion::Inserted);

        let before = body(&original);
        let after = body(&doc);
        assert_eq!(after.len(), before.len() + 3);

        let heading = after[1];
        assert_eq!(run_text(heading, ""), "PROCESS FLOW CHART");
        let runs = heading.children_named(W_NS, "r").collect::<Vec<_>>();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].child(W_NS, "rPr").unwrap().child(W_NS, "b").is_some());
        let t = runs[0].child(W_NS, "t").unwrap();
        assert_eq!(t.attr("xml:space").as_deref(), Some("preserve"));
        assert_eq!(style_of(heading).as_deref(), Some("Heading1"));

        let na = after[2];
        assert_eq!(run_text(na, ""), "NA");
        assert_eq!(style_of(na).as_deref(), Some("ListParagraph"));
        let na_ppr = na.child(W_NS, "pPr").unwrap();
        assert!(na_ppr.child(W_NS, "numPr").is_none());
        assert!(na_ppr.child(W_NS, "ind").is_some());

        let blank = after[3];
        assert!(blank.is(W_NS, "p"));
        assert!(blank.children.is_empty());

        assert!(after[4].canonical_eq(before[1]));
        assert!(after[5].canonical_eq(before[2]));
    }

    #[test]
    fn unnumbered_marker_is_skipped() {
        let src = format!("{}{}", para("3. PROCEDURE"), sect_pr(&[]));
        let mut doc = parse(&src);
        let progress = ConsoleProgress::new(false);
        assert_eq!(insert_flow_chart_section(&mut doc, &progress), SectionInsertion::Skipped);
        assert!(doc.root.canonical_eq(&parse(&src).root));
        assert_eq!(progress.count(crate::progress::LogLevel::Warning), 1);
    }

    #[test]
    fn section_break_stays_on_the_procedure_paragraph() {
        let procedure = format!(
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="3"/></w:numPr>{}</w:pPr><w:r><w:t>3. PROCEDURE</w:t></w:r></w:p>"#,
            sect_pr(&[])
        );
        let src = format!("{procedure}{}{}", para("Step"), sect_pr(&[]));
        let mut doc = parse(&src);
        assert_eq!(doc.root.descendants_named(W_NS, "sectPr").len(), 2);
        assert_eq!(
            insert_flow_chart_section(&mut doc, &ConsoleProgress::new(false)),
            SectionInsertion::Inserted
        );
        assert_eq!(doc.root.descendants_named(W_NS, "sectPr").len(), 2);
        let paras = body(&doc);
        assert_eq!(run_text(paras[0], ""), "PROCESS FLOW CHART");
        assert!(paras[0].find_descendant(W_NS, "sectPr").is_none());
        assert!(paras[3].find_descendant(W_NS, "sectPr").is_some());
    }

    #[test]
    fn match_inside_table_cell_and_last_paragraph() {
        let src = format!(
            "<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>{}",
            numbered_para("Procedure"),
            sect_pr(&[])
        );
        let mut doc = parse(&src);
        assert_eq!(
            insert_flow_chart_section(&mut doc, &ConsoleProgress::new(false)),
            SectionInsertion::Inserted
        );
        let cell = doc.root.find_descendant(W_NS, "tc").unwrap();
        let paras: Vec<&Element> = cell.children_named(W_NS, "p").collect();
        assert_eq!(paras.len(), 4);
        assert!(paras[1].child(W_NS, "pPr").is_none());
        assert_eq!(run_text(paras[3], ""), "Procedure");
    }
}
