//! DocumentScanner: Idempotent link replacement over a page
//!
//! One pass:
//! 1. Walk the subtree, collecting page text and link occurrences in document order
//! 2. Extract password candidates from the collected text once
//! 3. Process occurrences: the first occurrence of a canonical URL is rendered,
//!    later ones are collapsed, disabled platforms are only recorded
//!
//! Writes that fail are logged and skipped; the pass always completes.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ScannerConfig, Settings};
use crate::dom::{NodeKind, PageDom};
use crate::error::CoreError;

use super::detector::{LinkDetector, LinkMatch};
use super::markers::{self, CHECKED_ATTR, POINTS_CLASS};
use super::normalize::normalize;
use super::password::{PasswordCandidate, PasswordInference};
use super::patterns::PlatformKind;
use super::registry::{LinkDescriptor, LinkRegistry};
use super::replacer::{self, points_label, Affordance, Segment};

/// Subtrees whose text is never page content.
const SKIPPED_TAGS: [&str; 5] = ["script", "style", "noscript", "textarea", "template"];

// =============================================================================
// Types
// =============================================================================

/// Per-pass statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub occurrences: usize,
    pub rendered: usize,
    pub superseded: usize,
    pub disabled: usize,
    pub failed: usize,
    pub submissions: usize,
    /// Pass skipped (auto-replace off, or page unchanged since the last pass).
    pub was_skipped: bool,
    /// Page fingerprint hash as hex (u64 would overflow a JS number)
    pub content_hash: String,
    pub elapsed_us: u64,
}

impl ScanReport {
    pub fn skipped() -> Self {
        Self {
            was_skipped: true,
            ..Self::default()
        }
    }
}

/// A link handed to the backend submission collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub url: String,
    pub platform: PlatformKind,
    /// Empty when no password is known.
    pub password: String,
}

#[derive(Debug)]
enum Occurrence<N> {
    Anchor {
        node: N,
        link: LinkDescriptor,
    },
    Text {
        node: N,
        /// Value at collection time; the node is skipped if it changed since.
        value: String,
        matches: Vec<LinkMatch>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Scan,
    /// Contributes page text only (anchor labels, checked containers).
    TextOnly,
}

#[derive(Debug)]
struct Collected<N> {
    detect: bool,
    texts: Vec<String>,
    hrefs: Vec<String>,
    occurrences: Vec<Occurrence<N>>,
    to_flag: Vec<N>,
}

impl<N> Collected<N> {
    fn new(detect: bool) -> Self {
        Self {
            detect,
            texts: Vec::new(),
            hrefs: Vec::new(),
            occurrences: Vec::new(),
            to_flag: Vec::new(),
        }
    }
}

/// Text and candidates shared by every occurrence of one pass.
struct PassContext<'a> {
    page_text: &'a str,
    candidates: &'a [PasswordCandidate],
}

// =============================================================================
// DocumentScanner
// =============================================================================

pub struct DocumentScanner<D: PageDom> {
    dom: D,
    detector: LinkDetector,
    inference: PasswordInference,
    registry: LinkRegistry,
    settings: Settings,
    config: ScannerConfig,
    points: u32,
    outbox: Vec<SubmitRequest>,
}

impl<D: PageDom> DocumentScanner<D> {
    pub fn new(dom: D, config: ScannerConfig) -> Self {
        Self {
            dom,
            detector: LinkDetector::new(config.proximity_window),
            inference: PasswordInference::new(config.proximity_window),
            registry: LinkRegistry::new(),
            settings: Settings::default(),
            config,
            points: 0,
            outbox: Vec::new(),
        }
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    // -------------------------------------------------------------------------
    // Scan passes
    // -------------------------------------------------------------------------

    /// Scan the whole document.
    pub fn scan_full(&mut self) -> ScanReport {
        if !self.settings.auto_replace {
            debug!("auto replace disabled; full scan skipped");
            return ScanReport::skipped();
        }
        let body = self.dom.body();
        self.scan_roots(&[body])
    }

    /// Scan only the given subtrees (nodes added by a mutation batch).
    pub fn scan_nodes(&mut self, nodes: &[D::Node]) -> ScanReport {
        if !self.settings.auto_replace {
            return ScanReport::skipped();
        }
        let roots: Vec<D::Node> = nodes
            .iter()
            .filter(|node| self.dom.is_connected(node))
            .cloned()
            .collect();
        self.scan_roots(&roots)
    }

    fn scan_roots(&mut self, roots: &[D::Node]) -> ScanReport {
        let started = instant::Instant::now();

        let mut collected = Collected::new(true);
        for root in roots {
            self.collect(root, &mut collected);
        }

        let page_text = collected.texts.join(" ");
        let candidates = self.inference.extract_candidates(&page_text);
        let ctx = PassContext {
            page_text: &page_text,
            candidates: &candidates,
        };

        let mut report = ScanReport::default();
        for occurrence in collected.occurrences {
            match occurrence {
                Occurrence::Anchor { node, link } => {
                    self.process_anchor(&node, link, &ctx, &mut report)
                }
                Occurrence::Text {
                    node,
                    value,
                    matches,
                } => self.process_text(&node, &value, matches, &ctx, &mut report),
            }
        }
        for container in collected.to_flag {
            self.flag_checked(&container);
        }

        report.elapsed_us = started.elapsed().as_micros() as u64;
        debug!(
            roots = roots.len(),
            occurrences = report.occurrences,
            rendered = report.rendered,
            superseded = report.superseded,
            failed = report.failed,
            "scan pass complete"
        );
        report
    }

    // -------------------------------------------------------------------------
    // Collection
    // -------------------------------------------------------------------------

    /// Mode for a scan root, `None` when the root must be skipped.
    fn root_mode(&self, root: &D::Node) -> Option<Mode> {
        if !self.dom.is_connected(root) {
            return None;
        }
        let mut mode = Mode::Scan;
        let mut current = self.dom.parent(root);
        if self.dom.is_text(root) {
            if let Some(parent) = &current {
                if self.is_container(parent) && markers::is_checked(&self.dom, parent) {
                    mode = Mode::TextOnly;
                }
            }
        }
        while let Some(ancestor) = current {
            if markers::is_output_element(&self.dom, &ancestor) {
                return None;
            }
            match self.dom.tag_name(&ancestor).as_deref() {
                Some(tag) if SKIPPED_TAGS.contains(&tag) => return None,
                Some("a") | Some("button") => mode = Mode::TextOnly,
                _ => {}
            }
            current = self.dom.parent(&ancestor);
        }
        Some(mode)
    }

    fn collect(&self, root: &D::Node, out: &mut Collected<D::Node>) {
        let Some(mode) = self.root_mode(root) else {
            return;
        };

        let mut stack = vec![(root.clone(), mode)];
        while let Some((node, mode)) = stack.pop() {
            match self.dom.node_kind(&node) {
                NodeKind::Text => self.collect_text(node, mode, out),
                NodeKind::Element => {
                    let Some(tag) = self.dom.tag_name(&node) else {
                        continue;
                    };
                    if SKIPPED_TAGS.contains(&tag.as_str())
                        || markers::is_output_element(&self.dom, &node)
                    {
                        continue;
                    }

                    let mut child_mode = mode;
                    let mut text_mode = mode;
                    if mode == Mode::Scan {
                        if tag == "a" || tag == "button" {
                            if tag == "a" {
                                self.collect_anchor(&node, out);
                            }
                            child_mode = Mode::TextOnly;
                            text_mode = Mode::TextOnly;
                        } else if self.config.is_container(&tag) {
                            if markers::is_checked(&self.dom, &node) {
                                text_mode = Mode::TextOnly;
                            } else if self.holds_output(&node) {
                                out.to_flag.push(node.clone());
                                text_mode = Mode::TextOnly;
                            }
                        }
                    }

                    for child in self.dom.children(&node).into_iter().rev() {
                        let child_mode = if self.dom.is_text(&child) {
                            text_mode
                        } else {
                            child_mode
                        };
                        stack.push((child, child_mode));
                    }
                }
                NodeKind::Other => {}
            }
        }
    }

    fn collect_anchor(&self, node: &D::Node, out: &mut Collected<D::Node>) {
        let Some(href) = self.dom.attribute(node, "href") else {
            return;
        };
        if out.detect {
            if let Some(link) = self.detector.detect_single(&href) {
                out.occurrences.push(Occurrence::Anchor {
                    node: node.clone(),
                    link,
                });
            }
        }
        out.hrefs.push(href);
    }

    fn collect_text(&self, node: D::Node, mode: Mode, out: &mut Collected<D::Node>) {
        let Some(value) = self.dom.text(&node) else {
            return;
        };
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        out.texts.push(trimmed.to_string());

        if !out.detect
            || mode == Mode::TextOnly
            || trimmed.chars().count() < self.config.min_text_len
        {
            return;
        }
        let matches: Vec<LinkMatch> = self.detector.extract_all(&value).collect();
        if !matches.is_empty() {
            out.occurrences.push(Occurrence::Text {
                node,
                value,
                matches,
            });
        }
    }

    /// An affordance or processed anchor sits directly inside `node`.
    fn holds_output(&self, node: &D::Node) -> bool {
        self.dom
            .children(node)
            .iter()
            .any(|child| markers::is_output_element(&self.dom, child))
    }

    fn is_container(&self, node: &D::Node) -> bool {
        self.dom
            .tag_name(node)
            .map_or(false, |tag| self.config.is_container(&tag))
    }

    /// Visible page text, values joined by a single space.
    pub fn page_text(&self) -> String {
        let mut collected = Collected::new(false);
        self.collect(&self.dom.body(), &mut collected);
        collected.texts.join(" ")
    }

    /// Page text plus unprocessed anchor targets; equal fingerprints mean a
    /// full pass would find nothing new.
    pub fn fingerprint(&self) -> String {
        let mut collected = Collected::new(false);
        self.collect(&self.dom.body(), &mut collected);
        let mut fingerprint = collected.texts.join(" ");
        for href in collected.hrefs {
            fingerprint.push('\n');
            fingerprint.push_str(&href);
        }
        fingerprint
    }

    // -------------------------------------------------------------------------
    // Processing
    // -------------------------------------------------------------------------

    fn is_enabled(&self, platform: PlatformKind) -> bool {
        self.settings.is_type_enabled(platform.as_str())
    }

    /// Known password > inline > platform label nearby > page inference.
    fn resolve_password(
        &self,
        canonical: &str,
        raw: &str,
        explicit: Option<&str>,
        ctx: &PassContext<'_>,
    ) -> Option<String> {
        if let Some(known) = self.registry.get(canonical).and_then(|l| l.password.clone()) {
            return Some(known);
        }
        self.inference
            .choose(explicit, canonical, raw, ctx.page_text, ctx.candidates)
    }

    fn process_anchor(
        &mut self,
        node: &D::Node,
        link: LinkDescriptor,
        ctx: &PassContext<'_>,
        report: &mut ScanReport,
    ) {
        report.occurrences += 1;
        let canonical = link.canonical_url.clone();

        if !self.is_enabled(link.platform) {
            self.registry.discover(link);
            report.disabled += 1;
            return;
        }

        if self.registry.is_rendered(&canonical) {
            match replacer::supersede_anchor(&mut self.dom, node) {
                Ok(()) => {
                    self.registry.mark_superseded(&canonical);
                    report.superseded += 1;
                    self.flag_container_of(node);
                }
                Err(err) => self.write_failed("supersede_anchor", &canonical, &err, report),
            }
            return;
        }

        let password =
            self.resolve_password(&canonical, &link.raw_url, link.password.as_deref(), ctx);
        let platform = link.platform;
        let raw_url = link.raw_url.clone();
        self.registry.discover(link);
        if let Some(password) = &password {
            self.registry.set_password_if_absent(&canonical, password);
        }

        let params = Affordance {
            platform,
            url: &raw_url,
            password: password.as_deref(),
            points: self.points,
            inline: false,
        };
        let result = replacer::build_affordance(&mut self.dom, &params)
            .and_then(|affordance| replacer::replace_anchor(&mut self.dom, node, &affordance));

        match result {
            Ok(()) => {
                self.on_rendered(&canonical, report);
                self.flag_container_of(node);
            }
            Err(err) => self.write_failed("replace_anchor", &canonical, &err, report),
        }
    }

    fn process_text(
        &mut self,
        node: &D::Node,
        value: &str,
        matches: Vec<LinkMatch>,
        ctx: &PassContext<'_>,
        report: &mut ScanReport,
    ) {
        report.occurrences += matches.len();

        if !self.dom.is_connected(node) || self.dom.text(node).as_deref() != Some(value) {
            warn!(links = matches.len(), "text node changed before replacement; skipped");
            report.failed += matches.len();
            return;
        }

        let mut prefix: Option<String> = None;
        let mut segments = Vec::new();
        let mut rendered: Vec<String> = Vec::new();
        let mut superseded: Vec<String> = Vec::new();
        let mut cursor = 0;

        for m in &matches {
            if !self.is_enabled(m.platform) {
                self.registry.discover(m.to_descriptor());
                report.disabled += 1;
                continue;
            }

            let canonical = m.canonical_url.as_str();
            let duplicate =
                self.registry.is_rendered(canonical) || rendered.iter().any(|c| c == canonical);
            let built = if duplicate {
                replacer::build_superseded(&mut self.dom, &m.raw_url)
            } else {
                let explicit = m.inline_password.as_deref().or(m.nearby_password.as_deref());
                let password = self.resolve_password(canonical, &m.raw_url, explicit, ctx);
                self.registry.discover(m.to_descriptor());
                if let Some(password) = &password {
                    self.registry.set_password_if_absent(canonical, password);
                }
                let params = Affordance {
                    platform: m.platform,
                    url: &m.raw_url,
                    password: password.as_deref(),
                    points: self.points,
                    inline: true,
                };
                replacer::build_affordance(&mut self.dom, &params)
            };

            match built {
                Ok(new_node) => {
                    let before = value[cursor..m.start].to_string();
                    if prefix.is_none() {
                        prefix = Some(before);
                    } else {
                        segments.push(Segment::Text(before));
                    }
                    segments.push(Segment::Node(new_node));
                    cursor = m.end;
                    if duplicate {
                        superseded.push(m.canonical_url.clone());
                    } else {
                        rendered.push(m.canonical_url.clone());
                    }
                }
                Err(err) => self.write_failed("build_affordance", canonical, &err, report),
            }
        }

        let Some(prefix) = prefix else {
            return;
        };
        segments.push(Segment::Text(value[cursor..].to_string()));

        match replacer::splice_text(&mut self.dom, node, &prefix, segments) {
            Ok(()) => {
                for canonical in &rendered {
                    self.on_rendered(canonical, report);
                }
                for canonical in &superseded {
                    self.registry.mark_superseded(canonical);
                    report.superseded += 1;
                }
                self.flag_container_of(node);
            }
            Err(err) => {
                for canonical in rendered.iter().chain(superseded.iter()) {
                    self.write_failed("splice_text", canonical, &err, report);
                }
            }
        }
    }

    fn on_rendered(&mut self, canonical: &str, report: &mut ScanReport) {
        if self.registry.mark_rendered(canonical) {
            report.rendered += 1;
        }
        self.queue_submission(canonical, report);
    }

    /// Queue a submission once per canonical URL when auto-submit is on.
    fn queue_submission(&mut self, canonical: &str, report: &mut ScanReport) {
        if !self.settings.auto_submit {
            return;
        }
        let Some(link) = self.registry.get(canonical) else {
            return;
        };
        if link.is_submitted() {
            return;
        }
        let request = SubmitRequest {
            url: link.raw_url.clone(),
            platform: link.platform,
            password: link.password.clone().unwrap_or_default(),
        };
        self.registry.mark_submitted(canonical);
        info!(url = %request.url, platform = %request.platform, "link queued for submission");
        self.outbox.push(request);
        report.submissions += 1;
    }

    /// Flag the nearest container around rewritten content.
    fn flag_container_of(&mut self, node: &D::Node) {
        let container = self.dom.closest(node, |dom, n| {
            dom.tag_name(n)
                .map_or(false, |tag| self.config.is_container(&tag))
        });
        if let Some(container) = container {
            if !markers::is_checked(&self.dom, &container) {
                self.flag_checked(&container);
            }
        }
    }

    fn flag_checked(&mut self, container: &D::Node) {
        if let Err(err) = self.dom.set_attribute(container, CHECKED_ATTR, "true") {
            warn!(error = %err, "could not flag container as checked");
        }
    }

    fn write_failed(&self, op: &str, canonical: &str, err: &CoreError, report: &mut ScanReport) {
        warn!(op, url = %canonical, error = %err, "DOM write failed; occurrence left unreplaced");
        report.failed += 1;
    }

    // -------------------------------------------------------------------------
    // Session operations
    // -------------------------------------------------------------------------

    /// Rewrite every points indicator. Returns how many were updated.
    pub fn update_points(&mut self, points: u32) -> usize {
        self.points = points;
        let label = points_label(points);
        let body = self.dom.body();
        let indicators: Vec<D::Node> = self
            .dom
            .descendants(&body)
            .into_iter()
            .filter(|node| self.dom.has_class(node, POINTS_CLASS))
            .collect();

        let mut updated = 0;
        for indicator in indicators {
            match self.dom.set_text(&indicator, &label) {
                Ok(()) => updated += 1,
                Err(err) => warn!(error = %err, "could not update points indicator"),
            }
        }
        updated
    }

    /// Register the page's own URL when the page itself is a share page.
    pub fn check_page_url(&mut self, url: &str) -> Option<LinkDescriptor> {
        let link = self.detector.detect_single(url)?;
        let canonical = link.canonical_url.clone();
        let enabled = self.is_enabled(link.platform);

        let password = link.password.clone().or_else(|| {
            self.inference
                .extract_passwords(&self.page_text())
                .into_iter()
                .next()
        });

        self.registry.discover(link);
        if let Some(password) = &password {
            self.registry.set_password_if_absent(&canonical, password);
        }
        if enabled {
            let mut report = ScanReport::default();
            self.queue_submission(&canonical, &mut report);
        }
        self.registry.get(&canonical).cloned()
    }

    /// Record a password fetched from the backend for a link without one.
    pub fn apply_remote_password(&mut self, url: &str, password: &str) -> bool {
        self.registry.set_password_if_absent(&normalize(url), password)
    }

    pub fn discovered_links(&self) -> Vec<LinkDescriptor> {
        self.registry.snapshot()
    }

    pub fn pending_submissions(&self) -> usize {
        self.outbox.len()
    }

    pub fn drain_submissions(&mut self) -> Vec<SubmitRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Outcome of a submission made by the glue. Failures are not retried.
    pub fn report_submission(&self, url: &str, success: bool, message: Option<&str>) {
        if success {
            info!(url, "link submitted");
        } else {
            warn!(url, reason = message.unwrap_or("unknown"), "link submission failed");
        }
    }
}
