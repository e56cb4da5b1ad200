//! Replacer: DOM writes for one occurrence
//!
//! Builds the access affordance, swaps anchors for it, collapses duplicate
//! occurrences, and splices text nodes. Every write goes through `PageDom`
//! and surfaces failures as `CoreError` for the caller to log and skip.

use crate::dom::PageDom;
use crate::error::{CoreError, CoreResult};

use super::markers::{
    BUTTON_CLASS, CONTAINER_CLASS, ICON_CLASS, INLINE_CLASS, POINTS_CLASS, PROCESSED_ATTR,
    PROCESSED_CLASS, SUPERSEDED_CLASS,
};
use super::patterns::PlatformKind;

/// What one affordance shows and carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affordance<'a> {
    pub platform: PlatformKind,
    pub url: &'a str,
    pub password: Option<&'a str>,
    pub points: u32,
    /// Rendered inside running text rather than replacing an anchor.
    pub inline: bool,
}

/// A piece of a spliced text node.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment<N> {
    Text(String),
    Node(N),
}

pub fn button_label(platform: PlatformKind) -> String {
    format!("一键访问{}", platform.display_name())
}

pub fn points_label(points: u32) -> String {
    format!("消耗1积分 (剩余: {})", points)
}

/// `div.netdisk-container > button.netdisk-link-button + span.netdisk-points-info`
pub fn build_affordance<D: PageDom>(dom: &mut D, params: &Affordance<'_>) -> CoreResult<D::Node> {
    let kind = params.platform.as_str();

    let container = dom.create_element("div")?;
    dom.add_class(&container, CONTAINER_CLASS)?;
    if params.inline {
        dom.add_class(&container, INLINE_CLASS)?;
    }

    let button = dom.create_element("button")?;
    dom.set_attribute(
        &button,
        "class",
        &format!("{} with-icon {}", BUTTON_CLASS, kind),
    )?;
    dom.set_attribute(&button, "data-url", params.url)?;
    dom.set_attribute(&button, "data-type", kind)?;
    if let Some(password) = params.password {
        dom.set_attribute(&button, "data-password", password)?;
    }

    let icon = dom.create_element("span")?;
    dom.set_attribute(&icon, "class", &format!("{} {}-icon", ICON_CLASS, kind))?;
    dom.append_child(&button, &icon)?;
    let label = dom.create_text(&button_label(params.platform));
    dom.append_child(&button, &label)?;

    let points = dom.create_element("span")?;
    dom.add_class(&points, POINTS_CLASS)?;
    dom.set_text(&points, &points_label(params.points))?;

    dom.append_child(&container, &button)?;
    dom.append_child(&container, &points)?;
    Ok(container)
}

/// Plain-text stand-in for a duplicate text occurrence.
pub fn build_superseded<D: PageDom>(dom: &mut D, raw_url: &str) -> CoreResult<D::Node> {
    let span = dom.create_element("span")?;
    dom.add_class(&span, SUPERSEDED_CLASS)?;
    dom.set_attribute(&span, PROCESSED_ATTR, "true")?;
    dom.set_text(&span, raw_url)?;
    Ok(span)
}

fn parent_of<D: PageDom>(dom: &D, node: &D::Node) -> CoreResult<D::Node> {
    if !dom.is_connected(node) {
        return Err(CoreError::Detached);
    }
    dom.parent(node).ok_or(CoreError::Detached)
}

/// Put `affordance` in front of `anchor` and hide the anchor.
pub fn replace_anchor<D: PageDom>(
    dom: &mut D,
    anchor: &D::Node,
    affordance: &D::Node,
) -> CoreResult<()> {
    let parent = parent_of(dom, anchor)?;
    dom.insert_before(&parent, affordance, Some(anchor))?;
    mark_anchor_processed(dom, anchor)
}

/// Duplicate anchor: marked processed and hidden, nothing inserted.
pub fn supersede_anchor<D: PageDom>(dom: &mut D, anchor: &D::Node) -> CoreResult<()> {
    parent_of(dom, anchor)?;
    mark_anchor_processed(dom, anchor)
}

fn mark_anchor_processed<D: PageDom>(dom: &mut D, anchor: &D::Node) -> CoreResult<()> {
    dom.add_class(anchor, PROCESSED_CLASS)?;
    dom.set_attribute(anchor, PROCESSED_ATTR, "true")?;
    dom.hide(anchor)
}

/// Replace `text_node`'s value with `prefix` and insert `rest` after it.
///
/// An empty prefix removes the original node.
pub fn splice_text<D: PageDom>(
    dom: &mut D,
    text_node: &D::Node,
    prefix: &str,
    rest: Vec<Segment<D::Node>>,
) -> CoreResult<()> {
    let parent = parent_of(dom, text_node)?;
    let reference = dom.next_sibling(text_node);

    for segment in rest {
        let node = match segment {
            Segment::Text(text) if text.is_empty() => continue,
            Segment::Text(text) => dom.create_text(&text),
            Segment::Node(node) => node,
        };
        dom.insert_before(&parent, &node, reference.as_ref())?;
    }

    if prefix.is_empty() {
        dom.remove_child(&parent, text_node)
    } else {
        dom.set_text(text_node, prefix)
    }
}
