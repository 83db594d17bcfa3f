//! Arena DOM built from html5ever's RcDom.
//!
//! RcDom handles are not `Send`, so parsed trees are copied into a flat
//! arena. Node indexes are never reused; detached nodes simply lose their
//! parent.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use indexmap::IndexMap;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

use crate::errors::PageError;

pub(crate) type NodeIdx = usize;

pub(crate) const ROOT: NodeIdx = 0;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    Document,
    Doctype(String),
    Element {
        tag: String,
        attrs: IndexMap<String, String>,
    },
    Text(String),
    Comment(String),
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
}

#[derive(Clone, Debug)]
pub(crate) struct Dom {
    nodes: Vec<Node>,
}

impl Dom {
    pub fn parse(html: &str) -> Result<Self, PageError> {
        let rc = parse_rc(html)?;
        let mut dom = Dom {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        };
        for child in rc.document.children.borrow().iter() {
            if let Some(idx) = dom.import(child) {
                dom.append(ROOT, idx);
            }
        }
        tracing::debug!(nodes = dom.nodes.len(), "page parsed");
        Ok(dom)
    }

    /// Parses a body-level fragment into detached nodes.
    pub fn parse_fragment(&mut self, html: &str) -> Result<Vec<NodeIdx>, PageError> {
        let rc = parse_rc(&format!("<!DOCTYPE html><html><head></head><body>{html}</body></html>"))?;
        let Some(body) = find_rc_element(&rc.document, "body") else {
            return Ok(Vec::new());
        };
        let children = body.children.borrow();
        Ok(children.iter().filter_map(|child| self.import(child)).collect())
    }

    fn import(&mut self, handle: &Handle) -> Option<NodeIdx> {
        let kind = match &handle.data {
            RcNodeData::Document | RcNodeData::ProcessingInstruction { .. } => return None,
            RcNodeData::Doctype { name, .. } => NodeKind::Doctype(name.to_string()),
            RcNodeData::Text { contents } => NodeKind::Text(contents.borrow().to_string()),
            RcNodeData::Comment { contents } => NodeKind::Comment(contents.to_string()),
            RcNodeData::Element { name, attrs, .. } => NodeKind::Element {
                tag: name.local.to_string(),
                attrs: attrs
                    .borrow()
                    .iter()
                    .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                    .collect(),
            },
        };
        let idx = self.push(kind);
        for child in handle.children.borrow().iter() {
            if let Some(child_idx) = self.import(child) {
                self.append(idx, child_idx);
            }
        }
        Some(idx)
    }

    fn push(&mut self, kind: NodeKind) -> NodeIdx {
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn node(&self, idx: NodeIdx) -> Option<&Node> {
        self.nodes.get(idx)
    }

    pub fn parent(&self, idx: NodeIdx) -> Option<NodeIdx> {
        self.nodes.get(idx).and_then(|node| node.parent)
    }

    pub fn children(&self, idx: NodeIdx) -> &[NodeIdx] {
        self.nodes.get(idx).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    pub fn tag(&self, idx: NodeIdx) -> Option<&str> {
        match &self.nodes.get(idx)?.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn is_element(&self, idx: NodeIdx) -> bool {
        self.tag(idx).is_some()
    }

    pub fn attr(&self, idx: NodeIdx, name: &str) -> Option<&str> {
        match &self.nodes.get(idx)?.kind {
            NodeKind::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            _ => None,
        }
    }

    pub fn has_attr(&self, idx: NodeIdx, name: &str) -> bool {
        self.attr(idx, name).is_some()
    }

    pub fn set_attr(&mut self, idx: NodeIdx, name: &str, value: impl Into<String>) {
        if let Some(Node {
            kind: NodeKind::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(idx)
        {
            attrs.insert(name.to_string(), value.into());
        }
    }

    pub fn remove_attr(&mut self, idx: NodeIdx, name: &str) {
        if let Some(Node {
            kind: NodeKind::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(idx)
        {
            attrs.shift_remove(name);
        }
    }

    pub fn classes(&self, idx: NodeIdx) -> Vec<String> {
        self.attr(idx, "class")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, idx: NodeIdx, class: &str) -> bool {
        self.attr(idx, "class")
            .map(|value| value.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn set_classes(&mut self, idx: NodeIdx, classes: &[String]) {
        if classes.is_empty() {
            self.remove_attr(idx, "class");
        } else {
            self.set_attr(idx, "class", classes.join(" "));
        }
    }

    /// Attached nodes below `root` in document order, excluding `root`.
    pub fn descendants(&self, root: NodeIdx) -> Vec<NodeIdx> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeIdx> = self.children(root).iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            out.push(idx);
            stack.extend(self.children(idx).iter().rev().copied());
        }
        out
    }

    pub fn elements(&self, root: NodeIdx) -> impl Iterator<Item = NodeIdx> + '_ {
        self.descendants(root)
            .into_iter()
            .filter(move |idx| self.is_element(*idx))
    }

    pub fn is_ancestor(&self, ancestor: NodeIdx, node: NodeIdx) -> bool {
        let mut cursor = self.parent(node);
        while let Some(idx) = cursor {
            if idx == ancestor {
                return true;
            }
            cursor = self.parent(idx);
        }
        false
    }

    pub fn is_attached(&self, idx: NodeIdx) -> bool {
        idx == ROOT || self.is_ancestor(ROOT, idx)
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeIdx> {
        self.elements(ROOT).find(|idx| self.attr(*idx, "id") == Some(id))
    }

    pub fn first_element(&self, tag: &str) -> Option<NodeIdx> {
        self.elements(ROOT).find(|idx| self.tag(*idx) == Some(tag))
    }

    pub fn detach(&mut self, idx: NodeIdx) {
        let Some(parent) = self.parent(idx) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.retain(|child| *child != idx);
        }
        if let Some(node) = self.nodes.get_mut(idx) {
            node.parent = None;
        }
    }

    pub fn append(&mut self, parent: NodeIdx, child: NodeIdx) {
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
    }

    pub fn insert_before(&mut self, reference: NodeIdx, child: NodeIdx) {
        let Some(parent) = self.parent(reference) else {
            return;
        };
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(parent) {
            let position = node
                .children
                .iter()
                .position(|idx| *idx == reference)
                .unwrap_or(node.children.len());
            node.children.insert(position, child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
    }

    /// Puts `replacements` where `target` was and detaches `target`.
    pub fn replace(&mut self, target: NodeIdx, replacements: &[NodeIdx]) {
        for idx in replacements {
            self.insert_before(target, *idx);
        }
        self.detach(target);
    }

    pub fn clear_children(&mut self, idx: NodeIdx) {
        for child in self.children(idx).to_vec() {
            self.detach(child);
        }
    }

    pub fn set_text(&mut self, idx: NodeIdx, text: &str) {
        self.clear_children(idx);
        if !text.is_empty() {
            let text_idx = self.push(NodeKind::Text(text.to_string()));
            self.append(idx, text_idx);
        }
    }

    pub fn text_content(&self, idx: NodeIdx) -> String {
        let mut out = String::new();
        if let Some(Node {
            kind: NodeKind::Text(text),
            ..
        }) = self.nodes.get(idx)
        {
            out.push_str(text);
        }
        for child in self.descendants(idx) {
            if let Some(Node {
                kind: NodeKind::Text(text),
                ..
            }) = self.nodes.get(child)
            {
                out.push_str(text);
            }
        }
        out
    }

    pub fn outer_html(&self, idx: NodeIdx) -> String {
        let mut out = String::new();
        self.write_node(idx, &mut out);
        out
    }

    pub fn inner_html(&self, idx: NodeIdx) -> String {
        let mut out = String::new();
        for child in self.children(idx) {
            self.write_node(*child, &mut out);
        }
        out
    }

    fn write_node(&self, idx: NodeIdx, out: &mut String) {
        let Some(node) = self.nodes.get(idx) else {
            return;
        };
        match &node.kind {
            NodeKind::Document => {
                for child in &node.children {
                    self.write_node(*child, out);
                }
            }
            NodeKind::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Text(text) => {
                let raw = node
                    .parent
                    .and_then(|parent| self.tag(parent))
                    .map(|tag| matches!(tag, "script" | "style"))
                    .unwrap_or(false);
                if raw {
                    out.push_str(text);
                } else {
                    out.push_str(&escape(text, false));
                }
            }
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in &node.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn parse_rc(html: &str) -> Result<RcDom, PageError> {
    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|err| PageError::Parse(err.to_string()))
}

fn find_rc_element(handle: &Handle, tag: &str) -> Option<Handle> {
    if let RcNodeData::Element { name, .. } = &handle.data {
        if name.local.as_ref() == tag {
            return Some(handle.clone());
        }
    }
    handle
        .children
        .borrow()
        .iter()
        .find_map(|child| find_rc_element(child, tag))
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
    out
}
