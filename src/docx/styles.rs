use std::collections::{BTreeMap, BTreeSet};

use crate::docx::tree::{Element, XmlDocument, XmlNode};
use crate::docx::W_NS;
use crate::error::MergeError;

const STYLE_REF_ELEMENTS: [&str; 3] = ["pStyle", "rStyle", "tblStyle"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StyleMergeReport {
    pub referenced: BTreeSet<String>,
    pub imported: Vec<String>,
    pub replaced: Vec<String>,
}

impl StyleMergeReport {
    pub fn changed(&self) -> usize {
        self.imported.len() + self.replaced.len()
    }
}

/// Style ids named by `w:pStyle`, `w:rStyle` and `w:tblStyle` anywhere in `parts`.
pub fn referenced_style_ids<'a>(parts: impl IntoIterator<Item = &'a XmlDocument>) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for doc in parts {
        for el in doc.root.descendants() {
            if el.ns.as_deref() != Some(W_NS) || !STYLE_REF_ELEMENTS.contains(&el.local_name()) {
                continue;
            }
            if let Some(id) = el.attr_ns(W_NS, "val") {
                let id = id.trim();
                if !id.is_empty() {
                    ids.insert(id.to_string());
                }
            }
        }
    }
    ids
}

fn style_id(el: &Element) -> Option<String> {
    if !el.is(W_NS, "style") {
        return None;
    }
    el.attr_ns(W_NS, "styleId")
}

fn style_map(styles: &Element) -> BTreeMap<String, &Element> {
    let mut map = BTreeMap::new();
    for el in styles.elements() {
        if let Some(id) = style_id(el) {
            map.entry(id).or_insert(el);
        }
    }
    map
}

fn target_position(styles: &Element, id: &str) -> Option<usize> {
    styles.children.iter().position(|n| match n {
        XmlNode::Element(e) => style_id(e).as_deref() == Some(id),
        _ => false,
    })
}

/// Ensure the styles used by `installed` header/footer parts exist in `target` exactly as
/// the template defines them.
///
/// Referenced ids missing from the target are imported; ids present in both but
/// structurally different are replaced by the template's definition. Styles the
/// template's referenced styles are based on are imported when the target lacks them,
/// but never replaced. Everything else in the target is left alone.
pub fn reconcile_styles(
    template: &XmlDocument,
    target: &mut XmlDocument,
    installed: &[XmlDocument],
) -> anyhow::Result<StyleMergeReport> {
    for doc in [template, &*target] {
        if !doc.root.is(W_NS, "styles") {
            return Err(MergeError::MissingStylesRoot(doc.name.clone()).into());
        }
    }

    let referenced = referenced_style_ids(installed);
    let template_styles = style_map(&template.root);
    let mut report = StyleMergeReport {
        referenced: referenced.clone(),
        ..Default::default()
    };

    for id in &referenced {
        let Some(tpl) = template_styles.get(id) else {
            continue;
        };
        match target_position(&target.root, id) {
            None => {
                let imported = target.import(tpl);
                target.root.push(imported);
                report.imported.push(id.clone());
            }
            Some(i) => {
                let same = matches!(&target.root.children[i], XmlNode::Element(e) if e.canonical_eq(tpl));
                if !same {
                    target.root.children[i] = XmlNode::Element(target.import(tpl));
                    report.replaced.push(id.clone());
                }
            }
        }
    }

    // basedOn ancestors of referenced styles, imported only when absent.
    let mut pending: Vec<String> = referenced
        .iter()
        .filter_map(|id| template_styles.get(id))
        .filter_map(|el| based_on(el))
        .collect();
    let mut seen: BTreeSet<String> = referenced.clone();
    while let Some(id) = pending.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(tpl) = template_styles.get(&id) else {
            continue;
        };
        if target_position(&target.root, &id).is_none() {
            let imported = target.import(tpl);
            target.root.push(imported);
            report.imported.push(id.clone());
        }
        if let Some(parent) = based_on(tpl) {
            pending.push(parent);
        }
    }

    Ok(report)
}

fn based_on(style: &Element) -> Option<String> {
    style.child(W_NS, "basedOn")?.attr_ns(W_NS, "val")
}

#[cfg(test)]
mod tests {
    use super::{reconcile_styles, referenced_style_ids};
    use crate::docx::testutil::{header, styles};
    use crate::docx::tree::XmlDocument;
    use crate::docx::W_NS;
    use crate::error::{classify, ErrorKind};

    fn doc(name: &str, xml: &str) -> XmlDocument {
        XmlDocument::parse(name, xml).unwrap()
    }

    fn template_styles() -> XmlDocument {
        doc(
            "word/styles.xml",
            &styles(
                r#"<w:style w:type="paragraph" w:styleId="Header"><w:name w:val="header"/><w:basedOn w:val="Base"/><w:rPr><w:sz w:val="18"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Base"><w:name w:val="base"/></w:style><w:style w:type="character" w:styleId="Strong"><w:name w:val="Strong"/><w:rPr><w:b/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Body"><w:name w:val="tpl body"/></w:style>"#,
            ),
        )
    }

    fn target_styles() -> XmlDocument {
        doc(
            "word/styles.xml",
            &styles(
                r#"<w:style w:type="character" w:styleId="Strong"><w:name w:val="Strong"/><w:rPr><w:i/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Body"><w:name w:val="target body"/></w:style>"#,
            ),
        )
    }

    fn installed() -> Vec<XmlDocument> {
        vec![doc(
            "word/header1.xml",
            &header(
                r#"<w:p><w:pPr><w:pStyle w:val="Header"/></w:pPr><w:r><w:rPr><w:rStyle w:val="Strong"/></w:rPr><w:t>x</w:t></w:r></w:p><w:tbl><w:tblPr><w:tblStyle w:val="Grid"/></w:tblPr></w:tbl>"#,
            ),
        )]
    }

    fn style<'a>(d: &'a XmlDocument, id: &str) -> Vec<&'a crate::docx::tree::Element> {
        d.root
            .children_named(W_NS, "style")
            .filter(|s| s.attr_ns(W_NS, "styleId").as_deref() == Some(id))
            .collect()
    }

    #[test]
    fn collects_all_reference_kinds() {
        let ids = referenced_style_ids(&installed());
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["Grid", "Header", "Strong"]);
    }

    #[test]
    fn imports_missing_and_replaces_differing() {
        let tpl = template_styles();
        let mut tgt = target_styles();
        let report = reconcile_styles(&tpl, &mut tgt, &installed()).unwrap();

        assert_eq!(report.imported, vec!["Header".to_string(), "Base".to_string()]);
        assert_eq!(report.replaced, vec!["Strong".to_string()]);

        let strong = style(&tgt, "Strong");
        assert_eq!(strong.len(), 1);
        assert!(strong[0].find_descendant(W_NS, "b").is_some());
        assert!(strong[0].find_descendant(W_NS, "i").is_none());

        // Not referenced by any header/footer: target keeps its own.
        let body = style(&tgt, "Body");
        assert_eq!(
            body[0].child(W_NS, "name").unwrap().attr_ns(W_NS, "val").as_deref(),
            Some("target body")
        );
        // Referenced but defined nowhere: nothing to import.
        assert!(style(&tgt, "Grid").is_empty());
    }

    #[test]
    fn second_run_changes_nothing() {
        let tpl = template_styles();
        let mut tgt = target_styles();
        reconcile_styles(&tpl, &mut tgt, &installed()).unwrap();
        let once = tgt.to_text().unwrap();
        let report = reconcile_styles(&tpl, &mut tgt, &installed()).unwrap();
        assert_eq!(report.changed(), 0);
        assert_eq!(tgt.to_text().unwrap(), once);
    }

    #[test]
    fn missing_root_is_reported() {
        let tpl = template_styles();
        let mut tgt = doc("word/styles.xml", "<notStyles/>");
        let err = reconcile_styles(&tpl, &mut tgt, &installed()).unwrap_err();
        assert_eq!(classify(&err), ErrorKind::MissingStylesRoot);
    }
}
