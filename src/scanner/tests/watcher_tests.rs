//! Mutation handling through a running ScanConductor

use std::time::Duration;

use instant::Instant;

use crate::config::{ScannerConfig, Settings};
use crate::dom::{MemoryDom, MutationRecord, PageDom};
use crate::scanner::{MutationWatcher, ScanConductor, WatchDecision, WatchOutcome};

fn running(html: &str) -> ScanConductor<MemoryDom> {
    let mut conductor = ScanConductor::new(MemoryDom::from_html(html), ScannerConfig::default());
    conductor.hydrate_settings(Settings::default());
    conductor.start().unwrap();
    conductor.scanner_mut().dom_mut().observe();
    conductor
}

/// Append `<p>{text}</p>` to the first `<div>`, as page script would.
fn append_paragraph(dom: &mut MemoryDom, text: &str) {
    let feed = dom.elements_by_tag("div")[0];
    let p = dom.create_element("p").unwrap();
    let content = dom.create_text(text);
    dom.append_child(&p, &content).unwrap();
    dom.append_child(&feed, &p).unwrap();
}

// ============================================================================
// Targeted scans
// ============================================================================

#[test]
fn test_appended_paragraph_scanned() {
    let mut conductor = running("<div>旧内容，没有任何链接的一段文字</div>");
    let dom = conductor.scanner_mut().dom_mut();
    append_paragraph(dom, "新资源 https://pan.quark.cn/s/7a7b 快存");
    let records = dom.take_records();

    match conductor.handle_mutations(&records, Instant::now()) {
        WatchOutcome::Scanned(report) => assert_eq!(report.rendered, 1),
        other => panic!("expected a targeted scan, got {:?}", other),
    }
    assert_eq!(
        conductor.scanner().dom().elements_with_class("netdisk-link-button").len(),
        1
    );
}

#[test]
fn test_own_writes_do_not_retrigger() {
    let mut conductor = running("<div>旧内容，没有任何链接的一段文字</div>");
    let dom = conductor.scanner_mut().dom_mut();
    append_paragraph(dom, "新资源 https://pan.quark.cn/s/7a7b 快存");
    let records = dom.take_records();
    conductor.handle_mutations(&records, Instant::now());

    let own = conductor.scanner_mut().dom_mut().take_records();
    assert!(!own.is_empty());
    assert_eq!(
        conductor.handle_mutations(&own, Instant::now()),
        WatchOutcome::Ignored
    );
    assert!(conductor.next_deadline().is_none());
}

#[test]
fn test_href_change_rescans_anchor() {
    let mut conductor = running(r#"<div><a href="/about">关于</a></div>"#);
    let dom = conductor.scanner_mut().dom_mut();
    let anchor = dom.elements_by_tag("a")[0];
    dom.set_attribute(&anchor, "href", "https://pan.quark.cn/s/3f9c").unwrap();
    let records = dom.take_records();

    match conductor.handle_mutations(&records, Instant::now()) {
        WatchOutcome::Scanned(report) => assert_eq!(report.rendered, 1),
        other => panic!("expected a targeted scan, got {:?}", other),
    }
}

#[test]
fn test_auto_replace_off_ignores_mutations() {
    let mut conductor = running("<div>旧内容，没有任何链接的一段文字</div>");
    let mut settings = Settings::default();
    settings.auto_replace = false;
    assert_eq!(conductor.update_settings(settings).unwrap(), None);

    let dom = conductor.scanner_mut().dom_mut();
    append_paragraph(dom, "新资源 https://pan.quark.cn/s/7a7b 快存");
    let records = dom.take_records();
    assert_eq!(
        conductor.handle_mutations(&records, Instant::now()),
        WatchOutcome::Ignored
    );
}

// ============================================================================
// Debounced full rescans
// ============================================================================

#[test]
fn test_text_edits_coalesce_into_one_rescan() {
    let mut conductor = running("<section>占位文字</section>");
    let section = conductor.scanner().dom().elements_by_tag("section")[0];
    let text = conductor.scanner().dom().children(&section)[0];
    let t0 = Instant::now();

    for step in 0..3u64 {
        let dom = conductor.scanner_mut().dom_mut();
        dom.set_text(&text, &format!("更新{} https://pan.quark.cn/s/9d9e 资源", step))
            .unwrap();
        let records = dom.take_records();
        let outcome = conductor.handle_mutations(&records, t0 + Duration::from_millis(step * 100));
        assert_eq!(outcome, WatchOutcome::RescanScheduled);
    }

    assert_eq!(conductor.next_deadline(), Some(t0 + Duration::from_millis(700)));
    assert!(conductor.tick(t0 + Duration::from_millis(300)).is_none());

    let report = conductor.tick(t0 + Duration::from_millis(700)).unwrap();
    assert!(!report.was_skipped);
    assert_eq!(report.rendered, 1);
    assert!(conductor.tick(t0 + Duration::from_millis(1500)).is_none());
}

#[test]
fn test_targeted_burst_collapses() {
    let config = ScannerConfig {
        burst_limit: 2,
        ..ScannerConfig::default()
    };
    let mut watcher = MutationWatcher::new(&config);
    let mut dom = MemoryDom::from_html("<div></div>");
    dom.observe();
    let now = Instant::now();

    let mut decisions = Vec::new();
    for i in 0..3 {
        append_paragraph(&mut dom, &format!("第{}条 https://pan.quark.cn/s/a{}b 资源", i, i));
        let records = dom.take_records();
        decisions.push(watcher.observe(&dom, &records, now));
    }

    assert!(matches!(decisions[0], WatchDecision::Targeted(_)));
    assert!(matches!(decisions[1], WatchDecision::Targeted(_)));
    assert_eq!(decisions[2], WatchDecision::RescanScheduled);
    assert!(watcher.poll(now + Duration::from_millis(500)));
    assert!(!watcher.poll(now + Duration::from_millis(600)));
}

#[test]
fn test_scanner_output_is_self_authored() {
    let conductor = running(r#"<div><p>说明文字 https://pan.quark.cn/s/3f9c 快存</p></div>"#);
    let watcher = MutationWatcher::default();
    let dom = conductor.scanner().dom();
    let affordance = dom.elements_with_class("netdisk-container")[0];
    let p = dom.elements_by_tag("p")[0];

    let insert = MutationRecord::ChildList {
        target: p,
        added: vec![affordance],
    };
    let flag = MutationRecord::Attributes {
        target: p,
        name: "data-netdisk-checked".to_string(),
    };
    assert!(watcher.is_self_authored(dom, &insert));
    assert!(watcher.is_self_authored(dom, &flag));
}
