//! Mutable, namespace-aware XML tree built on the event codec in [`crate::docx::xml`].
//!
//! Element and attribute names keep the qualified form they were written with, so an
//! untouched subtree serializes the way it was read. Every element and prefixed attribute
//! also records the namespace URI its prefix resolved to at parse time; queries go through
//! that URI (`is(W_NS, "p")`) and never through the prefix text.

use std::collections::HashMap;

use crate::docx::xml::{escape_attr, parse_events, unescape_attr, write_events, XmlEvent};
use crate::docx::{conventional_prefix, XMLNS_NS, XML_NS};
use crate::error::MergeError;

#[derive(Clone, Debug, PartialEq)]
pub struct Attr {
    pub name: String,
    pub ns: Option<String>,
    /// Raw (escaped) value as it appears in markup.
    pub raw: String,
}

impl Attr {
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn is_ns_decl(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }

    pub fn value(&self) -> String {
        unescape_attr(&self.raw)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    PI(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub name: String,
    pub ns: Option<String>,
    pub attrs: Vec<Attr>,
    pub children: Vec<XmlNode>,
}

fn local_part(qname: &str) -> &str {
    qname.rsplit_once(':').map(|(_, l)| l).unwrap_or(qname)
}

fn prefix_part(qname: &str) -> Option<&str> {
    qname.split_once(':').map(|(p, _)| p)
}

impl Element {
    pub fn new(name: impl Into<String>, ns: Option<&str>) -> Self {
        Self {
            name: name.into(),
            ns: ns.map(str::to_string),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        prefix_part(&self.name)
    }

    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.ns.as_deref() == Some(ns) && self.local_name() == local
    }

    /// Attribute value by qualified name, e.g. `xml:space`.
    pub fn attr(&self, qname: &str) -> Option<String> {
        self.attrs.iter().find(|a| a.name == qname).map(Attr::value)
    }

    pub fn attr_ns(&self, ns: &str, local: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|a| !a.is_ns_decl() && a.ns.as_deref() == Some(ns) && a.local_name() == local)
            .map(Attr::value)
    }

    pub fn has_attr_ns(&self, ns: &str, local: &str) -> bool {
        self.attr_ns(ns, local).is_some()
    }

    /// Set a namespaced attribute, reusing the element's own prefix when it shares the
    /// namespace.
    pub fn set_attr_ns(&mut self, ns: &str, local: &str, value: &str) {
        let raw = escape_attr(value);
        if let Some(a) = self
            .attrs
            .iter_mut()
            .find(|a| !a.is_ns_decl() && a.ns.as_deref() == Some(ns) && a.local_name() == local)
        {
            a.raw = raw;
            return;
        }
        let prefix = match (self.ns.as_deref(), self.prefix()) {
            (Some(own), Some(p)) if own == ns => Some(p.to_string()),
            _ => conventional_prefix(ns).map(str::to_string),
        };
        let name = match prefix {
            Some(p) => format!("{p}:{local}"),
            None => local.to_string(),
        };
        self.attrs.push(Attr {
            name,
            ns: Some(ns.to_string()),
            raw,
        });
    }

    pub fn remove_attr_ns(&mut self, ns: &str, local: &str) -> bool {
        let before = self.attrs.len();
        self.attrs
            .retain(|a| a.is_ns_decl() || a.ns.as_deref() != Some(ns) || a.local_name() != local);
        before != self.attrs.len()
    }

    /// Set an attribute by qualified name (`xml:space`, or an unprefixed name).
    pub fn set_attr(&mut self, qname: &str, value: &str) {
        let raw = escape_attr(value);
        if let Some(a) = self.attrs.iter_mut().find(|a| a.name == qname) {
            a.raw = raw;
            return;
        }
        let ns = match prefix_part(qname) {
            Some("xml") => Some(XML_NS.to_string()),
            _ => None,
        };
        self.attrs.push(Attr {
            name: qname.to_string(),
            ns,
            raw,
        });
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, ns: &str, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(ns, local))
    }

    pub fn child_mut(&mut self, ns: &str, local: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.is(ns, local))
    }

    pub fn children_named<'a>(
        &'a self,
        ns: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.is(ns, local))
    }

    /// Node index (into `children`) of the first child element with this name.
    pub fn child_position(&self, ns: &str, local: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|n| matches!(n, XmlNode::Element(e) if e.is(ns, local)))
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        fn walk<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
            for c in el.elements() {
                out.push(c);
                walk(c, out);
            }
        }
        walk(self, &mut out);
        out
    }

    pub fn descendants_named(&self, ns: &str, local: &str) -> Vec<&Element> {
        self.descendants()
            .into_iter()
            .filter(|e| e.is(ns, local))
            .collect()
    }

    pub fn find_descendant(&self, ns: &str, local: &str) -> Option<&Element> {
        self.elements().find_map(|c| {
            if c.is(ns, local) {
                Some(c)
            } else {
                c.find_descendant(ns, local)
            }
        })
    }

    /// Visit every descendant element (pre-order), excluding `self`.
    pub fn for_each_descendant_mut(&mut self, f: &mut dyn FnMut(&mut Element)) {
        for c in self.elements_mut() {
            f(c);
            c.for_each_descendant_mut(f);
        }
    }

    /// Concatenated character data of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        fn walk(el: &Element, out: &mut String) {
            for n in &el.children {
                match n {
                    XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                    XmlNode::Element(e) => walk(e, out),
                    _ => {}
                }
            }
        }
        walk(self, &mut out);
        out
    }

    pub fn push(&mut self, el: Element) {
        self.children.push(XmlNode::Element(el));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }

    pub fn insert(&mut self, index: usize, el: Element) {
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(el));
    }

    /// Keep direct child elements for which `keep` returns true; other nodes stay.
    pub fn retain_elements(&mut self, mut keep: impl FnMut(&Element) -> bool) -> usize {
        let before = self.children.len();
        self.children.retain(|n| match n {
            XmlNode::Element(e) => keep(e),
            _ => true,
        });
        before - self.children.len()
    }

    /// Remove every descendant element with this name, at any depth.
    pub fn remove_descendants_named(&mut self, ns: &str, local: &str) -> usize {
        let mut removed = self.retain_elements(|e| !e.is(ns, local));
        for c in self.elements_mut() {
            removed += c.remove_descendants_named(ns, local);
        }
        removed
    }

    /// Node-index paths (relative to `self`) of descendants matching `pred`, pre-order.
    pub fn find_paths(&self, pred: &dyn Fn(&Element) -> bool) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        fn walk(
            el: &Element,
            pred: &dyn Fn(&Element) -> bool,
            path: &mut Vec<usize>,
            out: &mut Vec<Vec<usize>>,
        ) {
            for (i, n) in el.children.iter().enumerate() {
                if let XmlNode::Element(c) = n {
                    path.push(i);
                    if pred(c) {
                        out.push(path.clone());
                    }
                    walk(c, pred, path, out);
                    path.pop();
                }
            }
        }
        walk(self, pred, &mut path, &mut out);
        out
    }

    pub fn at_path(&self, path: &[usize]) -> Option<&Element> {
        let mut cur = self;
        for &i in path {
            cur = match cur.children.get(i)? {
                XmlNode::Element(e) => e,
                _ => return None,
            };
        }
        Some(cur)
    }

    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut cur = self;
        for &i in path {
            cur = match cur.children.get_mut(i)? {
                XmlNode::Element(e) => e,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Structural equality: same resolved names, same attributes in any order (namespace
    /// declarations ignored), same children ignoring comments and whitespace-only text.
    pub fn canonical_eq(&self, other: &Element) -> bool {
        if self.ns != other.ns || self.local_name() != other.local_name() {
            return false;
        }
        if canonical_attrs(self) != canonical_attrs(other) {
            return false;
        }
        let a = significant_children(self);
        let b = significant_children(other);
        a.len() == b.len()
            && a.iter().zip(b.iter()).all(|(x, y)| match (x, y) {
                (XmlNode::Element(x), XmlNode::Element(y)) => x.canonical_eq(y),
                (XmlNode::Text(x) | XmlNode::CData(x), XmlNode::Text(y) | XmlNode::CData(y)) => {
                    x == y
                }
                _ => false,
            })
    }

    fn write_into(&self, out: &mut Vec<XmlEvent>) {
        let attrs: Vec<(String, String)> = self
            .attrs
            .iter()
            .map(|a| (a.name.clone(), a.raw.clone()))
            .collect();
        if self.children.is_empty() {
            out.push(XmlEvent::Empty {
                name: self.name.clone(),
                attrs,
            });
            return;
        }
        out.push(XmlEvent::Start {
            name: self.name.clone(),
            attrs,
        });
        for n in &self.children {
            match n {
                XmlNode::Element(e) => e.write_into(out),
                XmlNode::Text(t) => out.push(XmlEvent::Text { text: t.clone() }),
                XmlNode::CData(t) => out.push(XmlEvent::CData { text: t.clone() }),
                XmlNode::Comment(t) => out.push(XmlEvent::Comment { text: t.clone() }),
                XmlNode::PI(c) => out.push(XmlEvent::PI { content: c.clone() }),
            }
        }
        out.push(XmlEvent::End {
            name: self.name.clone(),
        });
    }
}

fn canonical_attrs(el: &Element) -> Vec<(Option<&str>, &str, String)> {
    let mut v: Vec<(Option<&str>, &str, String)> = el
        .attrs
        .iter()
        .filter(|a| !a.is_ns_decl())
        .map(|a| {
            let name = if a.ns.is_some() { a.local_name() } else { a.name.as_str() };
            (a.ns.as_deref(), name, a.value())
        })
        .collect();
    v.sort();
    v
}

fn significant_children(el: &Element) -> Vec<&XmlNode> {
    el.children
        .iter()
        .filter(|n| match n {
            XmlNode::Element(_) | XmlNode::CData(_) => true,
            XmlNode::Text(t) => !t.trim().is_empty(),
            XmlNode::Comment(_) | XmlNode::PI(_) => false,
        })
        .collect()
}

/// A parsed XML part.
#[derive(Clone, Debug)]
pub struct XmlDocument {
    pub name: String,
    prolog: Vec<XmlEvent>,
    pub root: Element,
    epilog: Vec<XmlEvent>,
}

struct Frame {
    element: Element,
    scope: HashMap<String, String>,
}

fn resolve_prefix(frames: &[Frame], prefix: &str) -> Option<String> {
    match prefix {
        "xml" => return Some(XML_NS.to_string()),
        "xmlns" => return Some(XMLNS_NS.to_string()),
        _ => {}
    }
    frames
        .iter()
        .rev()
        .find_map(|f| f.scope.get(prefix).cloned())
}

fn open_element(frames: &[Frame], name: &str, raw_attrs: &[(String, String)]) -> Frame {
    let mut scope = HashMap::new();
    for (k, v) in raw_attrs {
        if k == "xmlns" {
            scope.insert(String::new(), unescape_attr(v));
        } else if let Some(p) = k.strip_prefix("xmlns:") {
            scope.insert(p.to_string(), unescape_attr(v));
        }
    }
    let lookup = |prefix: &str| -> Option<String> {
        if let Some(uri) = scope.get(prefix) {
            return Some(uri.clone());
        }
        resolve_prefix(frames, prefix)
    };

    let ns = match prefix_part(name) {
        Some(p) => lookup(p),
        None => lookup("").filter(|u| !u.is_empty()),
    };
    let attrs = raw_attrs
        .iter()
        .map(|(k, v)| {
            let ns = if k == "xmlns" {
                Some(XMLNS_NS.to_string())
            } else {
                prefix_part(k).and_then(|p| lookup(p))
            };
            Attr {
                name: k.clone(),
                ns,
                raw: v.clone(),
            }
        })
        .collect();
    Frame {
        element: Element {
            name: name.to_string(),
            ns,
            attrs,
            children: Vec::new(),
        },
        scope,
    }
}

fn malformed(part: &str, detail: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(MergeError::MalformedXml {
        part: part.to_string(),
        detail: detail.into(),
    })
}

impl XmlDocument {
    pub fn parse(name: &str, text: &str) -> anyhow::Result<Self> {
        let events = parse_events(name, text.as_bytes())?;

        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<Element> = None;
        let mut frames: Vec<Frame> = Vec::new();

        let attach = |frames: &mut Vec<Frame>,
                          root: &mut Option<Element>,
                          el: Element|
         -> anyhow::Result<()> {
            match frames.last_mut() {
                Some(parent) => parent.element.push(el),
                None if root.is_none() => *root = Some(el),
                None => return Err(malformed(name, "multiple root elements")),
            }
            Ok(())
        };

        for ev in events {
            match ev {
                XmlEvent::Start { name: tag, attrs } => {
                    let frame = open_element(&frames, &tag, &attrs);
                    frames.push(frame);
                }
                XmlEvent::Empty { name: tag, attrs } => {
                    let frame = open_element(&frames, &tag, &attrs);
                    attach(&mut frames, &mut root, frame.element)?;
                }
                XmlEvent::End { name: tag } => {
                    let frame = frames
                        .pop()
                        .ok_or_else(|| malformed(name, format!("unexpected </{tag}>")))?;
                    attach(&mut frames, &mut root, frame.element)?;
                }
                XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                } => {
                    // Text reaches us decoded; whatever we write back is UTF-8.
                    let encoding = encoding.map(|e| {
                        if e.to_ascii_lowercase().starts_with("utf-16") {
                            "UTF-8".to_string()
                        } else {
                            e
                        }
                    });
                    prolog.push(XmlEvent::Decl {
                        version,
                        encoding,
                        standalone,
                    });
                }
                other => {
                    if let Some(parent) = frames.last_mut() {
                        let node = match other {
                            XmlEvent::Text { text } => XmlNode::Text(text),
                            XmlEvent::CData { text } => XmlNode::CData(text),
                            XmlEvent::Comment { text } => XmlNode::Comment(text),
                            XmlEvent::PI { content } => XmlNode::PI(content),
                            _ => continue,
                        };
                        parent.element.children.push(node);
                    } else if root.is_none() {
                        prolog.push(other);
                    } else {
                        epilog.push(other);
                    }
                }
            }
        }

        if let Some(open) = frames.last() {
            return Err(malformed(
                name,
                format!("unclosed element <{}>", open.element.name),
            ));
        }
        let root = root.ok_or_else(|| malformed(name, "no root element"))?;
        Ok(Self {
            name: name.to_string(),
            prolog,
            root,
            epilog,
        })
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut events = self.prolog.clone();
        self.root.write_into(&mut events);
        events.extend(self.epilog.iter().cloned());
        write_events(&events)
    }

    pub fn to_text(&self) -> anyhow::Result<String> {
        Ok(String::from_utf8(self.to_bytes()?)?)
    }

    /// Prefix the root element binds to `ns` (`""` for a default namespace).
    pub fn prefix_for(&self, ns: &str) -> Option<String> {
        if ns == XML_NS {
            return Some("xml".to_string());
        }
        let mut default = None;
        for a in self.root.attrs.iter().filter(|a| a.is_ns_decl()) {
            if a.value() != ns {
                continue;
            }
            match a.name.strip_prefix("xmlns:") {
                Some(p) => return Some(p.to_string()),
                None => default = Some(String::new()),
            }
        }
        default
    }

    /// New element in `ns`, named with this document's prefix for it.
    pub fn create_element(&self, ns: &str, local: &str) -> Element {
        match self.prefix_for(ns) {
            Some(p) if p.is_empty() => Element::new(local, Some(ns)),
            Some(p) => Element::new(format!("{p}:{local}"), Some(ns)),
            None => {
                let p = conventional_prefix(ns).unwrap_or("ns0");
                let mut el = Element::new(format!("{p}:{local}"), Some(ns));
                el.attrs.push(Attr {
                    name: format!("xmlns:{p}"),
                    ns: Some(XMLNS_NS.to_string()),
                    raw: escape_attr(ns),
                });
                el
            }
        }
    }

    /// Deep-clone an element from another document so it is namespace-correct here.
    pub fn import(&self, el: &Element) -> Element {
        let mut out = el.clone();
        let mut missing: Vec<(String, String)> = Vec::new();
        self.requalify(&mut out, &mut missing);
        for (prefix, uri) in missing {
            let decl = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{prefix}")
            };
            if out.attrs.iter().any(|a| a.name == decl) {
                continue;
            }
            out.attrs.push(Attr {
                name: decl,
                ns: Some(XMLNS_NS.to_string()),
                raw: escape_attr(&uri),
            });
        }
        out
    }

    fn requalify(&self, el: &mut Element, missing: &mut Vec<(String, String)>) {
        if let Some(ns) = el.ns.clone() {
            el.name = self.qualify(&ns, &el.name, true, missing);
        }
        for a in el.attrs.iter_mut() {
            if a.is_ns_decl() {
                continue;
            }
            if let Some(ns) = a.ns.clone() {
                a.name = self.qualify(&ns, &a.name, false, missing);
            }
        }
        for c in el.elements_mut() {
            self.requalify(c, missing);
        }
    }

    fn qualify(
        &self,
        ns: &str,
        qname: &str,
        is_element: bool,
        missing: &mut Vec<(String, String)>,
    ) -> String {
        let local = local_part(qname);
        match self.prefix_for(ns) {
            Some(p) if !p.is_empty() => return format!("{p}:{local}"),
            Some(_) if is_element => return local.to_string(),
            _ => {}
        }
        let prefix = prefix_part(qname)
            .map(str::to_string)
            .or_else(|| conventional_prefix(ns).map(str::to_string))
            .unwrap_or_default();
        if !missing.iter().any(|(p, _)| *p == prefix) {
            missing.push((prefix.clone(), ns.to_string()));
        }
        if prefix.is_empty() {
            local.to_string()
        } else {
            format!("{prefix}:{local}")
        }
    }
}
