//! Live-page backend (feature `browser`)
//!
//! `WebDom` implements [`PageDom`] over `web_sys::Node`. `ContentSession`
//! wires a `ScanConductor<WebDom>` to a `MutationObserver` on `document.body`
//! and a `setTimeout` that fires the debounced full rescan.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use instant::Instant;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlElement, MutationObserver, MutationObserverInit, Node};

use crate::config::ScannerConfig;
use crate::dom::{MutationRecord, NodeKind, PageDom};
use crate::error::{CoreError, CoreResult};
use crate::scanner::{PasswordResponse, ScanConductor, WatchOutcome};
use crate::wasm::settings_from_js;

fn js_error(op: &'static str) -> impl Fn(JsValue) -> CoreError {
    move |err| CoreError::dom_write(op, format!("{:?}", err))
}

// =============================================================================
// WebDom
// =============================================================================

pub struct WebDom {
    document: Document,
    body: Node,
}

impl WebDom {
    /// DOM of the current window; fails before `document.body` exists.
    pub fn from_window() -> CoreResult<Self> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or(CoreError::NotReady)?;
        let body = document.body().ok_or(CoreError::NotReady)?;
        Ok(Self {
            document,
            body: body.into(),
        })
    }

    fn element<'a>(&self, node: &'a Node, op: &'static str) -> CoreResult<&'a Element> {
        node.dyn_ref::<Element>()
            .ok_or_else(|| CoreError::dom_write(op, "not an element"))
    }
}

impl PageDom for WebDom {
    type Node = Node;

    fn body(&self) -> Node {
        self.body.clone()
    }

    fn node_kind(&self, node: &Node) -> NodeKind {
        match node.node_type() {
            Node::ELEMENT_NODE => NodeKind::Element,
            Node::TEXT_NODE => NodeKind::Text,
            _ => NodeKind::Other,
        }
    }

    fn tag_name(&self, node: &Node) -> Option<String> {
        node.dyn_ref::<Element>()
            .map(|e| e.tag_name().to_ascii_lowercase())
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        node.parent_node()
    }

    fn children(&self, node: &Node) -> Vec<Node> {
        let list = node.child_nodes();
        (0..list.length()).filter_map(|i| list.get(i)).collect()
    }

    fn next_sibling(&self, node: &Node) -> Option<Node> {
        node.next_sibling()
    }

    fn text(&self, node: &Node) -> Option<String> {
        if node.node_type() == Node::TEXT_NODE {
            node.node_value()
        } else {
            None
        }
    }

    fn text_content(&self, node: &Node) -> String {
        node.text_content().unwrap_or_default()
    }

    fn attribute(&self, node: &Node, name: &str) -> Option<String> {
        node.dyn_ref::<Element>()?.get_attribute(name)
    }

    fn has_class(&self, node: &Node, class: &str) -> bool {
        node.dyn_ref::<Element>()
            .map_or(false, |e| e.class_list().contains(class))
    }

    fn inner_html(&self, node: &Node) -> String {
        node.dyn_ref::<Element>()
            .map(|e| e.inner_html())
            .unwrap_or_default()
    }

    fn is_connected(&self, node: &Node) -> bool {
        node.is_connected()
    }

    fn create_element(&mut self, tag: &str) -> CoreResult<Node> {
        self.document
            .create_element(tag)
            .map(Node::from)
            .map_err(js_error("create_element"))
    }

    fn create_text(&mut self, text: &str) -> Node {
        self.document.create_text_node(text).into()
    }

    fn set_attribute(&mut self, node: &Node, name: &str, value: &str) -> CoreResult<()> {
        self.element(node, "set_attribute")?
            .set_attribute(name, value)
            .map_err(js_error("set_attribute"))
    }

    fn add_class(&mut self, node: &Node, class: &str) -> CoreResult<()> {
        self.element(node, "add_class")?
            .class_list()
            .add_1(class)
            .map_err(js_error("add_class"))
    }

    fn hide(&mut self, node: &Node) -> CoreResult<()> {
        node.dyn_ref::<HtmlElement>()
            .ok_or_else(|| CoreError::dom_write("hide", "not an HTML element"))?
            .style()
            .set_property("display", "none")
            .map_err(js_error("hide"))
    }

    fn set_text(&mut self, node: &Node, text: &str) -> CoreResult<()> {
        if node.node_type() == Node::TEXT_NODE {
            node.set_node_value(Some(text));
        } else {
            node.set_text_content(Some(text));
        }
        Ok(())
    }

    fn append_child(&mut self, parent: &Node, child: &Node) -> CoreResult<()> {
        parent
            .append_child(child)
            .map(|_| ())
            .map_err(js_error("append_child"))
    }

    fn insert_before(
        &mut self,
        parent: &Node,
        child: &Node,
        reference: Option<&Node>,
    ) -> CoreResult<()> {
        parent
            .insert_before(child, reference)
            .map(|_| ())
            .map_err(js_error("insert_before"))
    }

    fn remove_child(&mut self, parent: &Node, child: &Node) -> CoreResult<()> {
        parent
            .remove_child(child)
            .map(|_| ())
            .map_err(js_error("remove_child"))
    }
}

/// Convert one observer record; unknown record types are dropped.
fn convert_record(record: &web_sys::MutationRecord) -> Option<MutationRecord<Node>> {
    let target = record.target()?;
    match record.type_().as_str() {
        "childList" => {
            let list = record.added_nodes();
            let added = (0..list.length()).filter_map(|i| list.get(i)).collect();
            Some(MutationRecord::ChildList { target, added })
        }
        "characterData" => Some(MutationRecord::CharacterData { target }),
        "attributes" => Some(MutationRecord::Attributes {
            target,
            name: record.attribute_name()?.to_ascii_lowercase(),
        }),
        _ => None,
    }
}

// =============================================================================
// ContentSession
// =============================================================================

struct SessionState {
    conductor: ScanConductor<WebDom>,
    timer: Option<i32>,
}

type Shared = Rc<RefCell<SessionState>>;

/// Re-arm the page timer to the conductor's pending deadline.
fn arm_timer(state: &mut SessionState, callback: &js_sys::Function) {
    let Some(window) = web_sys::window() else {
        return;
    };
    if let Some(handle) = state.timer.take() {
        window.clear_timeout_with_handle(handle);
    }
    let Some(deadline) = state.conductor.next_deadline() else {
        return;
    };
    let now = Instant::now();
    let delay = if deadline > now { (deadline - now).as_millis() as i32 } else { 0 };
    match window.set_timeout_with_callback_and_timeout_and_arguments_0(callback, delay) {
        Ok(handle) => state.timer = Some(handle),
        Err(err) => warn!(error = ?err, "could not schedule rescan timer"),
    }
}

fn on_timer(shared: &Weak<RefCell<SessionState>>) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let Ok(mut state) = shared.try_borrow_mut() else {
        return;
    };
    state.timer = None;
    if let Some(report) = state.conductor.tick(Instant::now()) {
        debug!(rendered = report.rendered, skipped = report.was_skipped, "debounced rescan done");
    }
}

fn on_mutations(
    shared: &Weak<RefCell<SessionState>>,
    records: js_sys::Array,
    timer: &js_sys::Function,
) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let Ok(mut state) = shared.try_borrow_mut() else {
        warn!("mutation batch arrived during a scan; dropped");
        return;
    };
    let records: Vec<MutationRecord<Node>> = records
        .iter()
        .filter_map(|value| value.dyn_into::<web_sys::MutationRecord>().ok())
        .filter_map(|record| convert_record(&record))
        .collect();

    if state.conductor.handle_mutations(&records, Instant::now()) == WatchOutcome::RescanScheduled {
        arm_timer(&mut state, timer);
    }
}

/// One content-script session over the live page.
#[wasm_bindgen]
pub struct ContentSession {
    shared: Shared,
    observer: MutationObserver,
    _mutation_callback: Closure<dyn FnMut(js_sys::Array, MutationObserver)>,
    _timer_callback: Closure<dyn FnMut()>,
}

#[wasm_bindgen]
impl ContentSession {
    #[wasm_bindgen(constructor)]
    pub fn new(settings: JsValue) -> Result<ContentSession, JsValue> {
        let settings = settings_from_js(settings)?;
        let dom = WebDom::from_window()?;
        let mut conductor = ScanConductor::new(dom, ScannerConfig::default());
        conductor.hydrate_settings(settings);

        let shared: Shared = Rc::new(RefCell::new(SessionState {
            conductor,
            timer: None,
        }));

        let weak = Rc::downgrade(&shared);
        let timer_callback = Closure::<dyn FnMut()>::new(move || on_timer(&weak));
        let timer_fn: js_sys::Function = timer_callback
            .as_ref()
            .unchecked_ref::<js_sys::Function>()
            .clone();

        let weak = Rc::downgrade(&shared);
        let mutation_callback = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |records: js_sys::Array, _observer: MutationObserver| {
                on_mutations(&weak, records, &timer_fn)
            },
        );
        let observer = MutationObserver::new(mutation_callback.as_ref().unchecked_ref())?;

        Ok(ContentSession {
            shared,
            observer,
            _mutation_callback: mutation_callback,
            _timer_callback: timer_callback,
        })
    }

    /// Initial full scan, then start observing `document.body`.
    #[wasm_bindgen(js_name = "start")]
    pub fn start(&self) -> Result<JsValue, JsValue> {
        let (report, body) = {
            let mut state = self.shared.borrow_mut();
            let report = state.conductor.start()?;
            (report, state.conductor.scanner().dom().body())
        };

        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_character_data(true);
        init.set_attribute_filter(&js_sys::Array::of1(&JsValue::from_str("href")));
        self.observer.observe_with_options(&body, &init)?;

        Ok(serde_wasm_bindgen::to_value(&report).unwrap_or(JsValue::NULL))
    }

    /// Disconnect the observer and drop any pending rescan.
    #[wasm_bindgen(js_name = "stop")]
    pub fn stop(&self) {
        self.observer.disconnect();
        if let Some(window) = web_sys::window() {
            if let Some(handle) = self.shared.borrow_mut().timer.take() {
                window.clear_timeout_with_handle(handle);
            }
        }
    }

    #[wasm_bindgen(js_name = "stateName")]
    pub fn state_name(&self) -> String {
        self.shared.borrow().conductor.state_name().to_string()
    }

    #[wasm_bindgen(js_name = "updateSettings")]
    pub fn update_settings(&self, settings: JsValue) -> Result<JsValue, JsValue> {
        let settings = settings_from_js(settings)?;
        let report = self.shared.borrow_mut().conductor.update_settings(settings)?;
        Ok(serde_wasm_bindgen::to_value(&report).unwrap_or(JsValue::NULL))
    }

    #[wasm_bindgen(js_name = "updatePoints")]
    pub fn update_points(&self, points: u32) -> usize {
        self.shared.borrow_mut().conductor.update_points(points)
    }

    /// Register `location.href` when the page itself is a share page.
    #[wasm_bindgen(js_name = "checkPageUrl")]
    pub fn check_page_url(&self) -> Result<JsValue, JsValue> {
        let href = web_sys::window()
            .ok_or_else(|| JsValue::from_str("no window"))?
            .location()
            .href()?;
        let link = self.shared.borrow_mut().conductor.check_page_url(&href)?;
        Ok(serde_wasm_bindgen::to_value(&link).unwrap_or(JsValue::NULL))
    }

    #[wasm_bindgen(js_name = "discoveredLinks")]
    pub fn discovered_links(&self) -> JsValue {
        let links = self.shared.borrow().conductor.discovered_links();
        serde_wasm_bindgen::to_value(&links).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = "drainSubmissions")]
    pub fn drain_submissions(&self) -> JsValue {
        let requests = self.shared.borrow_mut().conductor.drain_submissions();
        serde_wasm_bindgen::to_value(&requests).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = "reportSubmission")]
    pub fn report_submission(&self, url: &str, success: bool, message: Option<String>) {
        self.shared
            .borrow()
            .conductor
            .report_submission(url, success, message.as_deref());
    }

    #[wasm_bindgen(js_name = "resolveClick")]
    pub fn resolve_click(&self, url: &str, password: Option<String>) -> JsValue {
        let action = self
            .shared
            .borrow()
            .conductor
            .resolve_click(url, password.as_deref());
        serde_wasm_bindgen::to_value(&action).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = "resolvePasswordResponse")]
    pub fn resolve_password_response(
        &self,
        url: &str,
        response: JsValue,
    ) -> Result<JsValue, JsValue> {
        let response: PasswordResponse = serde_wasm_bindgen::from_value(response)
            .map_err(|e| JsValue::from_str(&format!("Failed to parse password response: {}", e)))?;
        let action = self
            .shared
            .borrow_mut()
            .conductor
            .resolve_password_response(url, &response);
        Ok(serde_wasm_bindgen::to_value(&action).unwrap_or(JsValue::NULL))
    }

    /// Run the pending debounced rescan now if it is due.
    #[wasm_bindgen(js_name = "tick")]
    pub fn tick(&self) -> JsValue {
        let report = self.shared.borrow_mut().conductor.tick(Instant::now());
        serde_wasm_bindgen::to_value(&report).unwrap_or(JsValue::NULL)
    }
}

impl Drop for ContentSession {
    fn drop(&mut self) {
        self.stop();
    }
}
