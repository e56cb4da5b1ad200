//! MutationWatcher: Decide what a batch of DOM mutations needs
//!
//! Mutations caused by the scanner's own writes are ignored. Added nodes
//! that may carry a link get a targeted scan; character-data edits and
//! oversized or bursty batches collapse into one debounced full rescan.

use instant::Instant;
use std::time::Duration;
use tracing::debug;

use crate::config::ScannerConfig;
use crate::dom::{MutationRecord, PageDom};

use super::markers::{self, CHECKED_ATTR, PROCESSED_ATTR, PROCESSED_CLASS};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum WatchDecision<N> {
    /// Nothing worth scanning.
    Ignore,
    /// Scan these subtrees now.
    Targeted(Vec<N>),
    /// A full rescan is pending on the debouncer.
    RescanScheduled,
}

// =============================================================================
// Debouncer
// =============================================================================

/// Single pending deadline; scheduling again replaces it.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// (Re)arm the deadline at `now + window`. Returns `true` if a pending
    /// deadline was replaced.
    pub fn schedule(&mut self, now: Instant) -> bool {
        self.deadline.replace(now + self.window).is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fires at most once per schedule.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct BurstWindow {
    started: Option<Instant>,
    count: usize,
}

impl BurstWindow {
    /// Count one targeted scan; returns the count inside the current window.
    fn hit(&mut self, now: Instant, window: Duration) -> usize {
        match self.started {
            Some(started) if now.duration_since(started) < window => self.count += 1,
            _ => {
                self.started = Some(now);
                self.count = 1;
            }
        }
        self.count
    }
}

// =============================================================================
// MutationWatcher
// =============================================================================

#[derive(Debug, Clone)]
pub struct MutationWatcher {
    config: ScannerConfig,
    debouncer: Debouncer,
    burst: BurstWindow,
}

impl Default for MutationWatcher {
    fn default() -> Self {
        Self::new(&ScannerConfig::default())
    }
}

impl MutationWatcher {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            config: config.clone(),
            debouncer: Debouncer::new(Duration::from_millis(config.debounce_ms)),
            burst: BurstWindow::default(),
        }
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Classify a batch and arm the debouncer when a full rescan is needed.
    pub fn observe<D: PageDom>(
        &mut self,
        dom: &D,
        records: &[MutationRecord<D::Node>],
        now: Instant,
    ) -> WatchDecision<D::Node> {
        let (targets, full_rescan) = self.classify(dom, records);

        if full_rescan || targets.len() > self.config.max_targeted_nodes {
            self.schedule_rescan(now);
            return WatchDecision::RescanScheduled;
        }
        if targets.is_empty() {
            return WatchDecision::Ignore;
        }
        if self.burst.hit(now, self.debouncer.window) > self.config.burst_limit {
            debug!("targeted scan burst exceeded; collapsing into full rescan");
            self.schedule_rescan(now);
            return WatchDecision::RescanScheduled;
        }
        WatchDecision::Targeted(targets)
    }

    /// Arm (or re-arm) the debounced full rescan.
    pub fn schedule_rescan(&mut self, now: Instant) {
        if self.debouncer.schedule(now) {
            debug!("pending full rescan replaced");
        }
    }

    /// `true` once when the pending full rescan is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.debouncer.poll(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    pub fn cancel(&mut self) {
        self.debouncer.cancel();
    }

    /// Plausible link carriers in the batch, and whether a full rescan is needed.
    pub fn classify<D: PageDom>(
        &self,
        dom: &D,
        records: &[MutationRecord<D::Node>],
    ) -> (Vec<D::Node>, bool) {
        let mut targets: Vec<D::Node> = Vec::new();
        let mut full_rescan = false;

        for record in records {
            if self.is_self_authored(dom, record) {
                continue;
            }
            match record {
                MutationRecord::Attributes { target, name } => {
                    if name == "href"
                        && dom.has_tag(target, "a")
                        && !dom.has_class(target, PROCESSED_CLASS)
                        && dom.is_connected(target)
                    {
                        targets.push(target.clone());
                    }
                }
                MutationRecord::ChildList { added, .. } => {
                    for node in added {
                        if !dom.is_connected(node) || markers::is_self_authored(dom, node) {
                            continue;
                        }
                        let plausible = if dom.is_text(node) {
                            dom.text(node).map_or(false, |t| self.plausible_text(&t))
                        } else {
                            self.plausible_element(dom, node)
                        };
                        if plausible {
                            targets.push(node.clone());
                        }
                    }
                }
                MutationRecord::CharacterData { target } => {
                    if dom.text(target).map_or(false, |t| self.plausible_text(&t)) {
                        full_rescan = true;
                    }
                }
            }
        }

        (outermost(dom, targets), full_rescan)
    }

    /// Mutation caused by the scanner's own writes.
    pub fn is_self_authored<D: PageDom>(&self, dom: &D, record: &MutationRecord<D::Node>) -> bool {
        match record {
            MutationRecord::Attributes { target, name } => {
                name == CHECKED_ATTR
                    || name == PROCESSED_ATTR
                    || ((name == "class" || name == "style")
                        && dom.has_class(target, PROCESSED_CLASS))
                    || markers::is_inside_output(dom, target)
            }
            MutationRecord::ChildList { target, added } => {
                markers::is_inside_output(dom, target)
                    || (!added.is_empty()
                        && added.iter().all(|node| markers::is_self_authored(dom, node)))
            }
            MutationRecord::CharacterData { target } => match dom.parent(target) {
                Some(parent) => {
                    markers::is_checked(dom, &parent)
                        || dom.has_class(&parent, PROCESSED_CLASS)
                        || markers::is_inside_output(dom, &parent)
                }
                None => false,
            },
        }
    }

    /// Text long enough and link-looking enough to be worth a scan.
    pub fn plausible_text(&self, text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.chars().count() > self.config.min_text_len
            && (trimmed.contains("http")
                || trimmed.contains("pan.baidu.com")
                || trimmed.to_lowercase().contains("网盘"))
    }

    fn plausible_element<D: PageDom>(&self, dom: &D, node: &D::Node) -> bool {
        if dom.has_tag(node, "a") {
            return true;
        }
        let carrier = dom.descendants(node).iter().any(|d| {
            dom.tag_name(d).map_or(false, |tag| {
                (tag == "a" && !dom.has_class(d, PROCESSED_CLASS))
                    || (self.config.is_container(&tag) && !markers::is_checked(dom, d))
            })
        });
        carrier || !dom.text_content(node).trim().is_empty()
    }
}

/// Drop duplicates and nodes already covered by an ancestor in the list.
fn outermost<D: PageDom>(dom: &D, nodes: Vec<D::Node>) -> Vec<D::Node> {
    let mut kept: Vec<D::Node> = Vec::new();
    for node in &nodes {
        let covered = nodes.iter().any(|other| {
            other != node
                && dom
                    .closest(node, |_, ancestor| ancestor == other)
                    .is_some()
        });
        if !covered && !kept.contains(node) {
            kept.push(node.clone());
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_debouncer_cancel_and_replace() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(500));
        assert!(!debouncer.schedule(start));
        assert!(debouncer.schedule(start + ms(300)));
        assert!(!debouncer.poll(start + ms(600)));
        assert!(debouncer.poll(start + ms(800)));
        assert!(!debouncer.poll(start + ms(900)));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_plausible_text_rules() {
        let watcher = MutationWatcher::default();
        assert!(watcher.plausible_text("看这里 https://pan.quark.cn/s/abc"));
        assert!(watcher.plausible_text("我分享了百度网盘里的文件给你"));
        assert!(!watcher.plausible_text("http://x"));
        assert!(!watcher.plausible_text("a long sentence without any link"));
    }

    #[test]
    fn test_added_paragraph_is_targeted() {
        let mut dom = MemoryDom::new();
        dom.observe();
        let p = dom.create_element("p").unwrap();
        let text = dom.create_text("资源 https://pan.quark.cn/s/abc");
        dom.append_child(&p, &text).unwrap();
        let body = dom.body();
        dom.append_child(&body, &p).unwrap();
        let records = dom.take_records();

        let mut watcher = MutationWatcher::default();
        let decision = watcher.observe(&dom, &records, Instant::now());
        assert_eq!(decision, WatchDecision::Targeted(vec![p]));
    }

    #[test]
    fn test_checked_attribute_ignored() {
        let mut dom = MemoryDom::from_html("<p>hello</p>");
        let p = dom.elements_by_tag("p")[0];
        dom.observe();
        dom.set_attribute(&p, CHECKED_ATTR, "true").unwrap();
        let records = dom.take_records();

        let mut watcher = MutationWatcher::default();
        assert_eq!(watcher.observe(&dom, &records, Instant::now()), WatchDecision::Ignore);
    }

    #[test]
    fn test_character_data_schedules_rescan() {
        let mut dom = MemoryDom::from_html("<section>old text here</section>");
        let section = dom.elements_by_tag("section")[0];
        let text = dom.children(&section)[0];
        dom.observe();
        dom.set_text(&text, "新链接 https://pan.quark.cn/s/abc").unwrap();
        let records = dom.take_records();

        let mut watcher = MutationWatcher::default();
        let now = Instant::now();
        assert_eq!(watcher.observe(&dom, &records, now), WatchDecision::RescanScheduled);
        assert!(!watcher.poll(now + ms(100)));
        assert!(watcher.poll(now + ms(500)));
    }

    #[test]
    fn test_nested_targets_collapse_to_outermost() {
        let dom = MemoryDom::from_html("<div><p>资源 https://pan.quark.cn/s/abc</p></div>");
        let div = dom.elements_by_tag("div")[0];
        let p = dom.elements_by_tag("p")[0];
        let records = vec![
            MutationRecord::ChildList {
                target: dom.body(),
                added: vec![div],
            },
            MutationRecord::ChildList {
                target: div,
                added: vec![p],
            },
        ];
        let mut watcher = MutationWatcher::default();
        assert_eq!(
            watcher.observe(&dom, &records, Instant::now()),
            WatchDecision::Targeted(vec![div])
        );
    }

    #[test]
    fn test_oversized_batch_collapses() {
        let config = ScannerConfig {
            max_targeted_nodes: 1,
            ..ScannerConfig::default()
        };
        let dom = MemoryDom::from_html("<a href=\"x\">a</a><a href=\"y\">b</a>");
        let anchors = dom.elements_by_tag("a");
        let records = vec![MutationRecord::ChildList {
            target: dom.body(),
            added: anchors,
        }];
        let mut watcher = MutationWatcher::new(&config);
        assert_eq!(
            watcher.observe(&dom, &records, Instant::now()),
            WatchDecision::RescanScheduled
        );
    }
}
