//! ScanConductor: Session coordinator for one page
//!
//! # Design Principles
//! 1. State machine: Uninitialized → Ready → Observing
//! 2. Settings are hydrated before any scan; scans before that are rejected
//! 3. Owns the scanner, the mutation watcher and the change detector, so the
//!    glue layer only forwards mutation batches and timer ticks
//!
//! # Usage
//! ```rust
//! use netdisk_core::config::{ScannerConfig, Settings};
//! use netdisk_core::dom::MemoryDom;
//! use netdisk_core::scanner::ScanConductor;
//!
//! let dom = MemoryDom::from_html("<p>资源 https://pan.quark.cn/s/3f9c 快存</p>");
//! let mut conductor = ScanConductor::new(dom, ScannerConfig::default());
//! conductor.hydrate_settings(Settings::default());
//! let report = conductor.start().unwrap();
//! assert_eq!(report.rendered, 1);
//! ```

use instant::Instant;
use tracing::debug;

use crate::config::{ScannerConfig, Settings};
use crate::dom::{MutationRecord, PageDom};
use crate::error::{CoreError, CoreResult};

use super::access::{self, ClickAction, PasswordResponse};
use super::change::ChangeDetector;
use super::document::{DocumentScanner, ScanReport, SubmitRequest};
use super::registry::LinkDescriptor;
use super::watcher::{MutationWatcher, WatchDecision};

// =============================================================================
// State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Settings not yet loaded
    Uninitialized,
    /// Settings hydrated, initial scan not run
    Ready,
    /// Initial scan done; mutations are being handled
    Observing,
}

/// What a mutation batch led to.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Ignored,
    Scanned(ScanReport),
    RescanScheduled,
}

// =============================================================================
// ScanConductor
// =============================================================================

pub struct ScanConductor<D: PageDom> {
    scanner: DocumentScanner<D>,
    watcher: MutationWatcher,
    change_detector: ChangeDetector,
    state: State,
}

impl<D: PageDom> ScanConductor<D> {
    pub fn new(dom: D, config: ScannerConfig) -> Self {
        Self {
            watcher: MutationWatcher::new(&config),
            scanner: DocumentScanner::new(dom, config),
            change_detector: ChangeDetector::new(),
            state: State::Uninitialized,
        }
    }

    /// Load settings and mark the session ready.
    pub fn hydrate_settings(&mut self, settings: Settings) {
        self.scanner.update_settings(settings);
        self.change_detector.reset();
        if self.state == State::Uninitialized {
            self.state = State::Ready;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state != State::Uninitialized
    }

    /// Current state name (for debugging)
    pub fn state_name(&self) -> &'static str {
        match self.state {
            State::Uninitialized => "uninitialized",
            State::Ready => "ready",
            State::Observing => "observing",
        }
    }

    pub fn scanner(&self) -> &DocumentScanner<D> {
        &self.scanner
    }

    pub fn scanner_mut(&mut self) -> &mut DocumentScanner<D> {
        &mut self.scanner
    }

    /// Initial full scan; afterwards mutation batches are handled.
    pub fn start(&mut self) -> CoreResult<ScanReport> {
        if self.state == State::Uninitialized {
            return Err(CoreError::NotReady);
        }
        let report = self.full_pass(true);
        self.state = State::Observing;
        Ok(report)
    }

    /// Full rescan; unless `force`d it is skipped when the page is unchanged
    /// since the last pass.
    pub fn rescan(&mut self, force: bool) -> CoreResult<ScanReport> {
        if self.state == State::Uninitialized {
            return Err(CoreError::NotReady);
        }
        Ok(self.full_pass(force))
    }

    fn full_pass(&mut self, force: bool) -> ScanReport {
        if !self.scanner.settings().auto_replace {
            return ScanReport::skipped();
        }

        let check = self.change_detector.check(&self.scanner.fingerprint());
        if !force && !check.has_changed {
            debug!(
                hash = %format!("{:x}", check.content_hash),
                "page unchanged; full rescan skipped"
            );
            let mut report = ScanReport::skipped();
            report.content_hash = format!("{:x}", check.content_hash);
            return report;
        }

        let mut report = self.scanner.scan_full();
        // Remember the page as this pass left it
        let hash = self.change_detector.record(&self.scanner.fingerprint());
        report.content_hash = format!("{:x}", hash);
        report
    }

    /// Feed one `MutationObserver` batch.
    pub fn handle_mutations(
        &mut self,
        records: &[MutationRecord<D::Node>],
        now: Instant,
    ) -> WatchOutcome {
        if self.state != State::Observing || !self.scanner.settings().auto_replace {
            return WatchOutcome::Ignored;
        }
        match self.watcher.observe(self.scanner.dom(), records, now) {
            WatchDecision::Ignore => WatchOutcome::Ignored,
            WatchDecision::Targeted(nodes) => {
                WatchOutcome::Scanned(self.scanner.scan_nodes(&nodes))
            }
            WatchDecision::RescanScheduled => WatchOutcome::RescanScheduled,
        }
    }

    /// Run the debounced full rescan if it is due.
    pub fn tick(&mut self, now: Instant) -> Option<ScanReport> {
        if self.state != State::Observing || !self.watcher.poll(now) {
            return None;
        }
        Some(self.full_pass(false))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.watcher.next_deadline()
    }

    /// Apply new settings; a forced full rescan follows when auto-replace is on.
    pub fn update_settings(&mut self, settings: Settings) -> CoreResult<Option<ScanReport>> {
        let was_ready = self.is_ready();
        self.hydrate_settings(settings);
        if !was_ready || !self.scanner.settings().auto_replace {
            return Ok(None);
        }
        self.watcher.cancel();
        let report = self.full_pass(true);
        if self.state == State::Ready {
            self.state = State::Observing;
        }
        Ok(Some(report))
    }

    pub fn update_points(&mut self, points: u32) -> usize {
        self.scanner.update_points(points)
    }

    pub fn check_page_url(&mut self, url: &str) -> CoreResult<Option<LinkDescriptor>> {
        if self.state == State::Uninitialized {
            return Err(CoreError::NotReady);
        }
        Ok(self.scanner.check_page_url(url))
    }

    pub fn discovered_links(&self) -> Vec<LinkDescriptor> {
        self.scanner.discovered_links()
    }

    pub fn drain_submissions(&mut self) -> Vec<SubmitRequest> {
        self.scanner.drain_submissions()
    }

    pub fn report_submission(&self, url: &str, success: bool, message: Option<&str>) {
        self.scanner.report_submission(url, success, message);
    }

    /// Decide what a click on the affordance for `url` does.
    pub fn resolve_click(&self, url: &str, password: Option<&str>) -> ClickAction {
        access::resolve_click(url, password, self.scanner.settings().offline_mode)
    }

    /// Finish a `RequestPassword` round trip; a returned password is remembered.
    pub fn resolve_password_response(
        &mut self,
        url: &str,
        response: &PasswordResponse,
    ) -> ClickAction {
        if response.success {
            if let Some(password) = response.password.as_deref().filter(|p| !p.is_empty()) {
                self.scanner.apply_remote_password(url, password);
            }
        }
        access::resolve_password_response(url, response)
    }
}
