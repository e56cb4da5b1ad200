//! MemoryDom: arena-backed document tree
//!
//! Mirrors the small part of the DOM the scanner touches: elements with
//! attributes, text nodes, tree edits, `innerHTML` serialization and a
//! mutation log that behaves like a `MutationObserver` queue.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dom::{MutationRecord, NodeKind, PageDom};
use crate::error::{CoreError, CoreResult};

/// Elements serialized without an end tag.
const VOID_TAGS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose text children are written verbatim.
const RAW_TEXT_TAGS: [&str; 6] = ["script", "style", "xmp", "iframe", "noembed", "noframes"];

/// Handle into a [`MemoryDom`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeData {
    Element { tag: String, attrs: Vec<(String, String)> },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// In-memory document rooted at a `<body>` element.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    nodes: Vec<Slot>,
    body: NodeId,
    observing: bool,
    records: Vec<MutationRecord<NodeId>>,
    /// Nodes whose writes fail, to simulate hostile pages.
    rejected: HashSet<NodeId>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    pub fn new() -> Self {
        let body = Slot {
            data: NodeData::Element {
                tag: "body".to_string(),
                attrs: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![body],
            body: NodeId(0),
            observing: false,
            records: Vec::new(),
            rejected: HashSet::new(),
        }
    }

    /// Build a document whose body holds the parsed HTML fragment.
    pub fn from_html(html: &str) -> Self {
        let mut dom = Self::new();
        let fragment = scraper::Html::parse_fragment(html);
        let body = dom.body;

        // Depth-first with reversed children so siblings link in order
        let mut stack: Vec<_> = fragment
            .root_element()
            .children()
            .rev()
            .map(|child| (child, body))
            .collect();
        while let Some((source, parent)) = stack.pop() {
            let id = match source.value() {
                scraper::Node::Text(text) => dom.alloc(NodeData::Text(text.to_string())),
                scraper::Node::Comment(comment) => {
                    dom.alloc(NodeData::Comment(comment.comment.to_string()))
                }
                scraper::Node::Element(element) => {
                    let attrs = element
                        .attrs()
                        .map(|(name, value)| (name.to_string(), value.to_string()))
                        .collect();
                    let id = dom.alloc(NodeData::Element {
                        tag: element.name().to_ascii_lowercase(),
                        attrs,
                    });
                    stack.extend(source.children().rev().map(|child| (child, id)));
                    id
                }
                _ => continue,
            };
            dom.link(parent, id, None);
        }
        dom
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Start recording mutations.
    pub fn observe(&mut self) {
        self.observing = true;
    }

    pub fn disconnect(&mut self) {
        self.observing = false;
        self.records.clear();
    }

    /// Drain pending mutation records (`MutationObserver.takeRecords`).
    pub fn take_records(&mut self) -> Vec<MutationRecord<NodeId>> {
        std::mem::take(&mut self.records)
    }

    fn record(&mut self, record: MutationRecord<NodeId>) {
        if self.observing {
            self.records.push(record);
        }
    }

    // -------------------------------------------------------------------------
    // Test helpers
    // -------------------------------------------------------------------------

    /// Make every write touching `node` fail.
    pub fn reject_writes_to(&mut self, node: NodeId) {
        self.rejected.insert(node);
    }

    /// Detach `node` from its parent, as foreign page code would.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.slot(node).parent {
            self.unlink(parent, node);
        }
    }

    /// Serialized markup of the body's contents.
    pub fn body_html(&self) -> String {
        self.inner_html(&self.body)
    }

    /// Connected elements carrying `class`, in document order.
    pub fn elements_with_class(&self, class: &str) -> Vec<NodeId> {
        self.descendants(&self.body)
            .into_iter()
            .filter(|node| self.has_class(node, class))
            .collect()
    }

    /// Connected elements with `tag`, in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(&self.body)
            .into_iter()
            .filter(|node| self.has_tag(node, tag))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Arena internals
    // -------------------------------------------------------------------------

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Slot {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn slot(&self, node: NodeId) -> &Slot {
        &self.nodes[node.0]
    }

    fn slot_mut(&mut self, node: NodeId) -> &mut Slot {
        &mut self.nodes[node.0]
    }

    fn attrs(&self, node: NodeId) -> Option<&Vec<(String, String)>> {
        match &self.slot(node).data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    fn check_writable(&self, node: NodeId, op: &'static str) -> CoreResult<()> {
        if node.0 >= self.nodes.len() {
            return Err(CoreError::dom_write(op, "unknown node"));
        }
        if self.rejected.contains(&node) {
            return Err(CoreError::dom_write(op, "write rejected by page"));
        }
        Ok(())
    }

    fn link(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        let children = &mut self.slot_mut(parent).children;
        let index = reference
            .and_then(|r| children.iter().position(|c| *c == r))
            .unwrap_or(children.len());
        children.insert(index, child);
        self.slot_mut(child).parent = Some(parent);
    }

    fn unlink(&mut self, parent: NodeId, child: NodeId) {
        self.slot_mut(parent).children.retain(|c| *c != child);
        self.slot_mut(child).parent = None;
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            current = self.slot(candidate).parent;
        }
        false
    }

    fn write_outer_html(&self, node: NodeId, out: &mut String) {
        match &self.slot(node).data {
            NodeData::Text(text) => {
                let raw = self
                    .slot(node)
                    .parent
                    .and_then(|parent| self.tag_name(&parent))
                    .map_or(false, |tag| RAW_TEXT_TAGS.contains(&tag.as_str()));
                if raw {
                    out.push_str(text);
                } else {
                    out.push_str(&html_escape::encode_text(text));
                }
            }
            NodeData::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            NodeData::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                for child in &self.slot(node).children {
                    self.write_outer_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl PageDom for MemoryDom {
    type Node = NodeId;

    fn body(&self) -> NodeId {
        self.body
    }

    fn node_kind(&self, node: &NodeId) -> NodeKind {
        match self.nodes.get(node.0).map(|slot| &slot.data) {
            Some(NodeData::Element { .. }) => NodeKind::Element,
            Some(NodeData::Text(_)) => NodeKind::Text,
            Some(NodeData::Comment(_)) | None => NodeKind::Other,
        }
    }

    fn tag_name(&self, node: &NodeId) -> Option<String> {
        match &self.slot(*node).data {
            NodeData::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.slot(*node).parent
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.slot(*node).children.clone()
    }

    fn next_sibling(&self, node: &NodeId) -> Option<NodeId> {
        let parent = self.slot(*node).parent?;
        let siblings = &self.slot(parent).children;
        let index = siblings.iter().position(|c| c == node)?;
        siblings.get(index + 1).copied()
    }

    fn text(&self, node: &NodeId) -> Option<String> {
        match &self.slot(*node).data {
            NodeData::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    fn text_content(&self, node: &NodeId) -> String {
        match &self.slot(*node).data {
            NodeData::Text(text) => text.clone(),
            NodeData::Comment(_) => String::new(),
            NodeData::Element { .. } => self
                .descendants(node)
                .iter()
                .filter_map(|d| self.text(d))
                .collect(),
        }
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.attrs(*node)?
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    fn has_class(&self, node: &NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .map_or(false, |classes| classes.split_whitespace().any(|c| c == class))
    }

    fn inner_html(&self, node: &NodeId) -> String {
        let mut out = String::new();
        for child in &self.slot(*node).children {
            self.write_outer_html(*child, &mut out);
        }
        out
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        node.0 < self.nodes.len() && self.is_ancestor_or_self(self.body, *node)
    }

    fn create_element(&mut self, tag: &str) -> CoreResult<NodeId> {
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(CoreError::dom_write("create_element", format!("invalid tag {:?}", tag)));
        }
        Ok(self.alloc(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        }))
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> CoreResult<()> {
        self.check_writable(*node, "set_attribute")?;
        match &mut self.slot_mut(*node).data {
            NodeData::Element { attrs, .. } => {
                match attrs.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
                    Some(entry) => entry.1 = value.to_string(),
                    None => attrs.push((name.to_ascii_lowercase(), value.to_string())),
                }
            }
            _ => {
                return Err(CoreError::dom_write("set_attribute", "not an element"));
            }
        }
        self.record(MutationRecord::Attributes {
            target: *node,
            name: name.to_ascii_lowercase(),
        });
        Ok(())
    }

    fn add_class(&mut self, node: &NodeId, class: &str) -> CoreResult<()> {
        if self.has_class(node, class) {
            return Ok(());
        }
        let classes = match self.attribute(node, "class") {
            Some(existing) if !existing.trim().is_empty() => {
                format!("{} {}", existing.trim(), class)
            }
            _ => class.to_string(),
        };
        self.set_attribute(node, "class", &classes)
    }

    fn hide(&mut self, node: &NodeId) -> CoreResult<()> {
        self.set_attribute(node, "style", "display: none;")
    }

    fn set_text(&mut self, node: &NodeId, text: &str) -> CoreResult<()> {
        self.check_writable(*node, "set_text")?;
        match &mut self.slot_mut(*node).data {
            NodeData::Text(value) => {
                *value = text.to_string();
                self.record(MutationRecord::CharacterData { target: *node });
                return Ok(());
            }
            NodeData::Comment(_) => {
                return Err(CoreError::dom_write("set_text", "not a text node or element"));
            }
            NodeData::Element { .. } => {}
        }
        for child in self.children(node) {
            self.unlink(*node, child);
        }
        let text_node = self.create_text(text);
        self.link(*node, text_node, None);
        self.record(MutationRecord::ChildList {
            target: *node,
            added: vec![text_node],
        });
        Ok(())
    }

    fn append_child(&mut self, parent: &NodeId, child: &NodeId) -> CoreResult<()> {
        self.insert_before(parent, child, None)
    }

    fn insert_before(
        &mut self,
        parent: &NodeId,
        child: &NodeId,
        reference: Option<&NodeId>,
    ) -> CoreResult<()> {
        self.check_writable(*parent, "insert_before")?;
        if !self.is_element(parent) {
            return Err(CoreError::dom_write("insert_before", "parent is not an element"));
        }
        if self.is_ancestor_or_self(*child, *parent) {
            return Err(CoreError::dom_write("insert_before", "would create a cycle"));
        }
        if let Some(reference) = reference {
            if self.slot(*reference).parent != Some(*parent) {
                return Err(CoreError::dom_write("insert_before", "reference is not a child"));
            }
        }
        if let Some(old_parent) = self.slot(*child).parent {
            self.unlink(old_parent, *child);
        }
        self.link(*parent, *child, reference.copied());
        self.record(MutationRecord::ChildList {
            target: *parent,
            added: vec![*child],
        });
        Ok(())
    }

    fn remove_child(&mut self, parent: &NodeId, child: &NodeId) -> CoreResult<()> {
        self.check_writable(*parent, "remove_child")?;
        if self.slot(*child).parent != Some(*parent) {
            return Err(CoreError::dom_write("remove_child", "not a child of parent"));
        }
        self.unlink(*parent, *child);
        self.record(MutationRecord::ChildList {
            target: *parent,
            added: Vec::new(),
        });
        Ok(())
    }
}
