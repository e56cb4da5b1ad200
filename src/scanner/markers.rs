//! Marker classes and attributes carried by everything the scanner writes.
//!
//! The scanner and the mutation watcher both use these to recognize their
//! own output. Serialized markup is searched with a single Aho-Corasick pass.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::sync::OnceLock;

use crate::dom::PageDom;

pub const CONTAINER_CLASS: &str = "netdisk-container";
pub const INLINE_CLASS: &str = "inline";
pub const BUTTON_CLASS: &str = "netdisk-link-button";
pub const INLINE_BUTTON_CLASS: &str = "netdisk-inline-btn";
pub const ICON_CLASS: &str = "netdisk-button-icon";
pub const POINTS_CLASS: &str = "netdisk-points-info";
pub const PROCESSED_CLASS: &str = "netdisk-processed";
pub const SUPERSEDED_CLASS: &str = "netdisk-superseded";

pub const CHECKED_ATTR: &str = "data-netdisk-checked";
pub const PROCESSED_ATTR: &str = "data-netdisk-processed";

/// Classes that mark a subtree as scanner output.
const MARKER_CLASSES: [&str; 5] = [
    CONTAINER_CLASS,
    BUTTON_CLASS,
    INLINE_BUTTON_CLASS,
    SUPERSEDED_CLASS,
    PROCESSED_CLASS,
];

/// Strings whose presence in serialized markup means scanner output is inside.
const MARKUP_NEEDLES: [&str; 5] = [
    CONTAINER_CLASS,
    BUTTON_CLASS,
    INLINE_BUTTON_CLASS,
    SUPERSEDED_CLASS,
    PROCESSED_ATTR,
];

static NEEDLES: OnceLock<AhoCorasick> = OnceLock::new();

fn needles() -> &'static AhoCorasick {
    NEEDLES.get_or_init(|| {
        AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostFirst)
            .build(MARKUP_NEEDLES)
            .expect("marker needles must build")
    })
}

/// `true` if `markup` contains any marker string.
pub fn markup_has_marker(markup: &str) -> bool {
    needles().is_match(markup)
}

/// Injected affordance, superseded span or processed anchor.
pub fn is_output_element<D: PageDom>(dom: &D, node: &D::Node) -> bool {
    dom.is_element(node)
        && (MARKER_CLASSES.iter().any(|class| dom.has_class(node, class))
            || dom.attribute(node, PROCESSED_ATTR).is_some())
}

/// The element itself carries a marker class or attribute.
pub fn is_marker_element<D: PageDom>(dom: &D, node: &D::Node) -> bool {
    is_output_element(dom, node)
        || (dom.is_element(node) && dom.attribute(node, CHECKED_ATTR).is_some())
}

/// Scanner output lives in or below `node`.
pub fn is_self_authored<D: PageDom>(dom: &D, node: &D::Node) -> bool {
    if is_marker_element(dom, node) {
        return true;
    }
    dom.is_element(node) && markup_has_marker(&dom.inner_html(node))
}

/// `node` sits inside an injected affordance or superseded span.
pub fn is_inside_output<D: PageDom>(dom: &D, node: &D::Node) -> bool {
    dom.closest(node, |dom, n| {
        dom.is_element(n)
            && (dom.has_class(n, CONTAINER_CLASS)
                || dom.has_class(n, SUPERSEDED_CLASS)
                || dom.has_class(n, BUTTON_CLASS)
                || dom.has_class(n, INLINE_BUTTON_CLASS))
    })
    .is_some()
}

/// Container already flagged as scanned.
pub fn is_checked<D: PageDom>(dom: &D, node: &D::Node) -> bool {
    dom.attribute(node, CHECKED_ATTR).as_deref() == Some("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;

    #[test]
    fn test_markup_needles() {
        assert!(markup_has_marker(r#"<div class="netdisk-container inline">"#));
        assert!(markup_has_marker(r#"<a data-netdisk-processed="true">"#));
        assert!(!markup_has_marker("<p>plain text</p>"));
    }

    #[test]
    fn test_marker_element_and_subtree() {
        let dom = MemoryDom::from_html(concat!(
            r#"<div id="outer"><div class="netdisk-container">"#,
            r#"<button class="netdisk-link-button">x</button></div></div><p>plain</p>"#,
        ));
        let divs = dom.elements_by_tag("div");
        let outer = divs[0];
        let container = divs[1];
        assert!(!is_marker_element(&dom, &outer));
        assert!(is_marker_element(&dom, &container));
        assert!(is_output_element(&dom, &container));
        assert!(is_self_authored(&dom, &outer));

        let button = dom.elements_by_tag("button")[0];
        let label = dom.children(&button)[0];
        assert!(is_inside_output(&dom, &label));

        let p = dom.elements_by_tag("p")[0];
        assert!(!is_self_authored(&dom, &p));
    }

    #[test]
    fn test_checked_flag() {
        let dom = MemoryDom::from_html(r#"<p data-netdisk-checked="true">a</p><p>b</p>"#);
        let ps = dom.elements_by_tag("p");
        assert!(is_checked(&dom, &ps[0]));
        assert!(is_marker_element(&dom, &ps[0]));
        assert!(!is_output_element(&dom, &ps[0]));
        assert!(!is_checked(&dom, &ps[1]));
    }
}
