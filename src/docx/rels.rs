//! Relationship manifests (`*.rels`) and the content-types manifest.
//!
//! Copying a part between packages only helps if the destination can still resolve it:
//! the owner's relationship manifest must point at it and `[Content_Types].xml` must give
//! it a type. The helpers here keep both manifests consistent with the parts copied
//! from a template.

use anyhow::Context;

use crate::docx::package::DocxPackage;
use crate::docx::tree::{Element, XmlDocument};
use crate::docx::{rels_path_for, CONTENT_TYPES, CT_NS, CT_RELATIONSHIPS, DOCUMENT_RELS, PKG_REL_NS};
use crate::error::MergeError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

fn to_relationship(el: &Element) -> Option<Relationship> {
    Some(Relationship {
        id: el.attr("Id")?,
        rel_type: el.attr("Type").unwrap_or_default(),
        target: el.attr("Target").unwrap_or_default(),
        external: el
            .attr("TargetMode")
            .is_some_and(|m| m.eq_ignore_ascii_case("External")),
    })
}

pub struct Relationships {
    doc: XmlDocument,
}

impl Relationships {
    pub fn load(pkg: &DocxPackage, path: &str) -> anyhow::Result<Option<Self>> {
        Ok(pkg.read_xml(path)?.map(|doc| Self { doc }))
    }

    pub fn empty(path: &str) -> anyhow::Result<Self> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_REL_NS}"/>"#
        );
        Ok(Self {
            doc: XmlDocument::parse(path, &xml)?,
        })
    }

    pub fn list(&self) -> Vec<Relationship> {
        self.doc
            .root
            .children_named(PKG_REL_NS, "Relationship")
            .filter_map(to_relationship)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Relationship> {
        self.list().into_iter().find(|r| r.id == id)
    }

    pub fn find(&self, rel_type: &str, target: &str) -> Option<Relationship> {
        self.list()
            .into_iter()
            .find(|r| r.rel_type == rel_type && same_target(&r.target, target))
    }

    /// Add a relationship under `preferred_id`, or under a fresh `rIdN` when that id is
    /// taken. Returns the id used.
    pub fn add(&mut self, preferred_id: &str, rel_type: &str, target: &str) -> String {
        let id = if preferred_id.is_empty() || self.get(preferred_id).is_some() {
            self.fresh_id()
        } else {
            preferred_id.to_string()
        };
        let mut el = self.doc.create_element(PKG_REL_NS, "Relationship");
        el.set_attr("Id", &id);
        el.set_attr("Type", rel_type);
        el.set_attr("Target", target);
        self.doc.root.push(el);
        id
    }

    pub fn set_target(&mut self, id: &str, target: &str) -> bool {
        match self
            .doc
            .root
            .elements_mut()
            .find(|e| e.is(PKG_REL_NS, "Relationship") && e.attr("Id").as_deref() == Some(id))
        {
            Some(el) => {
                el.set_attr("Target", target);
                true
            }
            None => false,
        }
    }

    fn fresh_id(&self) -> String {
        let max = self
            .list()
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }

    pub fn save(&self, pkg: &mut DocxPackage) -> anyhow::Result<()> {
        pkg.write_xml(&self.doc)
    }
}

fn same_target(a: &str, b: &str) -> bool {
    a.trim_start_matches('/') == b.trim_start_matches('/')
}

pub struct ContentTypes {
    doc: XmlDocument,
}

impl ContentTypes {
    pub fn load(pkg: &DocxPackage) -> anyhow::Result<Self> {
        let doc = pkg
            .read_xml(CONTENT_TYPES)?
            .ok_or_else(|| MergeError::MissingRequiredPart(CONTENT_TYPES.to_string()))?;
        Ok(Self { doc })
    }

    /// Content type of a package part (`word/header1.xml`), override first.
    pub fn content_type_for(&self, part: &str) -> Option<String> {
        let part_name = format!("/{}", part.trim_start_matches('/'));
        let by_override = self
            .doc
            .root
            .children_named(CT_NS, "Override")
            .find(|e| {
                e.attr("PartName")
                    .is_some_and(|p| p.eq_ignore_ascii_case(&part_name))
            })
            .and_then(|e| e.attr("ContentType"));
        if by_override.is_some() {
            return by_override;
        }
        let ext = part.rsplit_once('.').map(|(_, e)| e)?;
        self.default_for(ext)
    }

    pub fn default_for(&self, ext: &str) -> Option<String> {
        self.doc
            .root
            .children_named(CT_NS, "Default")
            .find(|e| e.attr("Extension").is_some_and(|x| x.eq_ignore_ascii_case(ext)))
            .and_then(|e| e.attr("ContentType"))
    }

    /// Returns true when the manifest changed.
    pub fn ensure_override(&mut self, part: &str, content_type: &str) -> bool {
        let part_name = format!("/{}", part.trim_start_matches('/'));
        if let Some(el) = self.doc.root.elements_mut().find(|e| {
            e.is(CT_NS, "Override")
                && e.attr("PartName")
                    .is_some_and(|p| p.eq_ignore_ascii_case(&part_name))
        }) {
            if el.attr("ContentType").as_deref() == Some(content_type) {
                return false;
            }
            el.set_attr("ContentType", content_type);
            return true;
        }
        let mut el = self.doc.create_element(CT_NS, "Override");
        el.set_attr("PartName", &part_name);
        el.set_attr("ContentType", content_type);
        self.doc.root.push(el);
        true
    }

    /// Returns true when the manifest changed.
    pub fn ensure_default(&mut self, ext: &str, content_type: &str) -> bool {
        if self.default_for(ext).is_some() {
            return false;
        }
        let mut el = self.doc.create_element(CT_NS, "Default");
        el.set_attr("Extension", &ext.to_ascii_lowercase());
        el.set_attr("ContentType", content_type);
        // Defaults precede overrides in the manifest.
        let at = self
            .doc
            .root
            .child_position(CT_NS, "Override")
            .unwrap_or(self.doc.root.children.len());
        self.doc.root.insert(at, el);
        true
    }

    pub fn save(&self, pkg: &mut DocxPackage) -> anyhow::Result<()> {
        pkg.write_xml(&self.doc)
    }
}

/// Resolve a relationship target against the part that owns the relationship.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut segs: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segs.pop();
            }
            s => segs.push(s),
        }
    }
    segs.join("/")
}

/// Relationship target for `part` as seen from `source_part`.
pub fn relative_target(source_part: &str, part: &str) -> String {
    match source_part.rsplit_once('/') {
        Some((dir, _)) => match part.strip_prefix(&format!("{dir}/")) {
            Some(rest) => rest.to_string(),
            None => format!("/{part}"),
        },
        None => part.to_string(),
    }
}

/// Make sure the target's main-document relationships resolve `rel_id` of the template
/// the same way the template does. Returns the id the target uses for that relationship.
pub fn install_document_relationship(
    target: &mut DocxPackage,
    template: &DocxPackage,
    rel_id: &str,
) -> anyhow::Result<String> {
    let template_rels = Relationships::load(template, DOCUMENT_RELS)?
        .ok_or_else(|| MergeError::MissingRequiredPart(format!("template {DOCUMENT_RELS}")))?;
    let rel = template_rels.get(rel_id).with_context(|| {
        format!("template {DOCUMENT_RELS} has no relationship {rel_id}")
    })?;
    ensure_document_relationship(target, rel_id, &rel.rel_type, &rel.target)
}

/// Find or add a main-document relationship `(rel_type, target)`, creating the
/// relationship part if the package has none.
pub fn ensure_document_relationship(
    pkg: &mut DocxPackage,
    preferred_id: &str,
    rel_type: &str,
    target: &str,
) -> anyhow::Result<String> {
    let mut rels = match Relationships::load(pkg, DOCUMENT_RELS)? {
        Some(r) => r,
        None => {
            let mut ct = ContentTypes::load(pkg)?;
            if ct.ensure_default("rels", CT_RELATIONSHIPS) {
                ct.save(pkg)?;
            }
            Relationships::empty(DOCUMENT_RELS)?
        }
    };
    if let Some(existing) = rels.find(rel_type, target) {
        return Ok(existing.id);
    }
    let id = rels.add(preferred_id, rel_type, target);
    rels.save(pkg)?;
    Ok(id)
}

/// Copy a template part's own relationship part into the target, bringing along any
/// internal part it references. A differing same-named target part is kept and the
/// template's copy is installed beside it under a `template_` name.
///
/// When the template part has no relationships, a stale target relationship part for the
/// same path is removed. Returns the paths of parts copied.
pub fn copy_part_relationships(
    target: &mut DocxPackage,
    template: &DocxPackage,
    part: &str,
) -> anyhow::Result<Vec<String>> {
    let rels_path = rels_path_for(part);
    let Some(mut rels) = Relationships::load(template, &rels_path)? else {
        target.remove_part(&rels_path);
        return Ok(Vec::new());
    };

    let template_ct = ContentTypes::load(template)?;
    let mut target_ct = ContentTypes::load(target)?;
    let mut ct_changed = false;
    let mut copied = Vec::new();

    for rel in rels.list().into_iter().filter(|r| !r.external) {
        let src = resolve_target(part, &rel.target);
        let Some(bytes) = template.part(&src) else {
            continue;
        };
        let dest = match target.part(&src) {
            None => src.clone(),
            Some(existing) if existing == bytes => continue,
            Some(_) => free_name(target, &src, bytes),
        };
        if target.part(&dest) != Some(bytes) {
            target.set_part(&dest, bytes.to_vec());
            copied.push(dest.clone());
        }
        if dest != src {
            rels.set_target(&rel.id, &relative_target(part, &dest));
        }
        if let Some(ct) = template_ct.content_type_for(&src) {
            let ext = dest.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();
            if target_ct.content_type_for(&dest).is_none() {
                ct_changed |= if template_ct.default_for(ext).as_deref() == Some(ct.as_str()) {
                    target_ct.ensure_default(ext, &ct)
                } else {
                    target_ct.ensure_override(&dest, &ct)
                };
            }
        }
    }

    rels.save(target)?;
    if ct_changed {
        target_ct.save(target)?;
    }
    Ok(copied)
}

fn free_name(pkg: &DocxPackage, path: &str, bytes: &[u8]) -> String {
    let (dir, file) = path.rsplit_once('/').unwrap_or(("", path));
    let mut n = 0usize;
    loop {
        let candidate_file = if n == 0 {
            format!("template_{file}")
        } else {
            format!("template{n}_{file}")
        };
        let candidate = if dir.is_empty() {
            candidate_file
        } else {
            format!("{dir}/{candidate_file}")
        };
        match pkg.part(&candidate) {
            None => return candidate,
            Some(existing) if existing == bytes => return candidate,
            Some(_) => n += 1,
        }
    }
}
