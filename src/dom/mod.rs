//! Page DOM abstraction
//!
//! The scanner reads and rewrites the page only through [`PageDom`], so the
//! same replacement logic runs against the live document (feature `browser`)
//! and against [`MemoryDom`] in tests or for offline HTML rewriting.

pub mod memory;

pub use memory::{MemoryDom, NodeId};

use std::fmt;

use crate::error::CoreResult;

/// Node classification the scanner cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Other,
}

/// One observed DOM change, shaped like a `MutationObserver` record.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRecord<N> {
    ChildList { target: N, added: Vec<N> },
    CharacterData { target: N },
    Attributes { target: N, name: String },
}

impl<N> MutationRecord<N> {
    pub fn target(&self) -> &N {
        match self {
            MutationRecord::ChildList { target, .. }
            | MutationRecord::CharacterData { target }
            | MutationRecord::Attributes { target, .. } => target,
        }
    }
}

/// Read/write access to a document tree.
///
/// Reads are infallible; writes may fail when the page races the scanner.
pub trait PageDom {
    type Node: Clone + PartialEq + fmt::Debug;

    /// Scan root (`document.body`).
    fn body(&self) -> Self::Node;
    fn node_kind(&self, node: &Self::Node) -> NodeKind;
    /// Lowercase tag name, `None` for non-elements.
    fn tag_name(&self, node: &Self::Node) -> Option<String>;
    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;
    fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;
    /// Value of a text node.
    fn text(&self, node: &Self::Node) -> Option<String>;
    fn text_content(&self, node: &Self::Node) -> String;
    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
    fn has_class(&self, node: &Self::Node, class: &str) -> bool;
    fn inner_html(&self, node: &Self::Node) -> String;
    fn is_connected(&self, node: &Self::Node) -> bool;

    fn create_element(&mut self, tag: &str) -> CoreResult<Self::Node>;
    fn create_text(&mut self, text: &str) -> Self::Node;
    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str) -> CoreResult<()>;
    fn add_class(&mut self, node: &Self::Node, class: &str) -> CoreResult<()>;
    /// `style.display = "none"`
    fn hide(&mut self, node: &Self::Node) -> CoreResult<()>;
    /// Replace a text node's value, or an element's whole text content.
    fn set_text(&mut self, node: &Self::Node, text: &str) -> CoreResult<()>;
    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> CoreResult<()>;
    fn insert_before(
        &mut self,
        parent: &Self::Node,
        child: &Self::Node,
        reference: Option<&Self::Node>,
    ) -> CoreResult<()>;
    fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node) -> CoreResult<()>;

    // -------------------------------------------------------------------------
    // Provided helpers
    // -------------------------------------------------------------------------

    fn is_element(&self, node: &Self::Node) -> bool {
        self.node_kind(node) == NodeKind::Element
    }

    fn is_text(&self, node: &Self::Node) -> bool {
        self.node_kind(node) == NodeKind::Text
    }

    fn has_tag(&self, node: &Self::Node, tag: &str) -> bool {
        self.tag_name(node).map_or(false, |t| t.eq_ignore_ascii_case(tag))
    }

    /// Pre-order descendants (document order), excluding `node` itself.
    fn descendants(&self, node: &Self::Node) -> Vec<Self::Node> {
        let mut out = Vec::new();
        let mut stack: Vec<Self::Node> = self.children(node).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            stack.extend(self.children(&next).into_iter().rev());
            out.push(next);
        }
        out
    }

    /// Nearest ancestor-or-self matching `pred`.
    fn closest<F>(&self, node: &Self::Node, mut pred: F) -> Option<Self::Node>
    where
        F: FnMut(&Self, &Self::Node) -> bool,
        Self: Sized,
    {
        let mut current = Some(node.clone());
        while let Some(candidate) = current {
            if pred(self, &candidate) {
                return Some(candidate);
            }
            current = self.parent(&candidate);
        }
        None
    }
}
