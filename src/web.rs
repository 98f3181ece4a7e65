//! WASM bindings: wiring the scan session and worker agent to a JS host
//!
//! Two entry points:
//! - `SessionHandle` lives in the content script. The host hands it a hooks
//!   object of callbacks (timers, snapshots, settings, reporting, worker
//!   transport, highlight surface) and routes its own events back in
//!   (`onDeferFired`, `onWorkerMessage`, `onMutation`, ...).
//! - `WorkerGate` lives in the worker script: one `handleMessage` call per
//!   request message, returns the response message to post back.
//!
//! Console diagnostics happen here, never in the core, so the engine stays
//! testable off-browser.

use js_sys::{Function, Reflect};
use serde::Deserialize;
use std::collections::HashMap;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::scanner::chunker::NodeChunk;
use crate::scanner::compiler::compile_keywords;
use crate::scanner::matcher::{position_scan, presence_scan};
use crate::session::executor::OffloadExecutor;
use crate::session::ports::{
    DeferId, DeferKind, DeferPort, HighlightSurface, PageSnapshot, RangeSpec, ReportPort,
    ScanSettings, SessionPortsBundle, SettingsPort, TextPort, WorkerPort, WorkerSpawner,
};
use crate::session::protocol::{ScanRequest, ScanResponse};
use crate::session::scheduler::{ScanSession, ScanTrigger};
use crate::session::worker::WorkerAgent;

// =============================================================================
// Hook plumbing
// =============================================================================

fn hook(hooks: &JsValue, name: &str) -> Result<Function, JsValue> {
    let value = Reflect::get(hooks, &JsValue::from_str(name))?;
    value
        .dyn_into::<Function>()
        .map_err(|_| JsValue::from_str(&format!("hooks.{name} must be a function")))
}

fn optional_hook(hooks: &JsValue, name: &str) -> Option<Function> {
    Reflect::get(hooks, &JsValue::from_str(name))
        .ok()
        .and_then(|v| v.dyn_into::<Function>().ok())
}

fn warn(message: &str) {
    web_sys::console::warn_1(&JsValue::from_str(message));
}

// =============================================================================
// Port implementations over JS callbacks
// =============================================================================

struct JsDefer {
    schedule: Function,
    cancel: Function,
    now: Function,
    next: DeferId,
    /// Our id → the host's timer/idle handle, for cancellation.
    live: HashMap<DeferId, JsValue>,
}

impl DeferPort for JsDefer {
    fn defer(&mut self, kind: DeferKind) -> DeferId {
        self.next += 1;
        let id = self.next;
        let (label, ms) = match kind {
            DeferKind::Idle { timeout_ms } => ("idle", timeout_ms),
            DeferKind::Delay { delay_ms } => ("timeout", delay_ms),
        };
        match self.schedule.call3(
            &JsValue::NULL,
            &JsValue::from_str(label),
            &JsValue::from_f64(ms as f64),
            &JsValue::from_f64(id as f64),
        ) {
            Ok(handle) => {
                self.live.insert(id, handle);
            }
            Err(_) => warn("[watchcore] schedule hook threw; deferral lost"),
        }
        id
    }

    fn cancel(&mut self, id: DeferId) {
        if let Some(handle) = self.live.remove(&id) {
            let _ = self.cancel.call1(&JsValue::NULL, &handle);
        }
    }

    fn fired(&mut self, id: DeferId) {
        self.live.remove(&id);
    }

    fn now_ms(&self) -> f64 {
        self.now
            .call0(&JsValue::NULL)
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }
}

/// Snapshot payload as the host provides it.
#[derive(Deserialize)]
struct JsSnapshot {
    #[serde(default)]
    text: String,
    #[serde(default)]
    nodes: Vec<NodeChunk>,
}

struct JsText {
    snapshot: Function,
}

impl TextPort for JsText {
    fn snapshot(&mut self, want_nodes: bool) -> PageSnapshot {
        let raw = match self
            .snapshot
            .call1(&JsValue::NULL, &JsValue::from_bool(want_nodes))
        {
            Ok(v) => v,
            Err(_) => {
                warn("[watchcore] snapshot hook threw");
                return PageSnapshot::default();
            }
        };
        match serde_wasm_bindgen::from_value::<JsSnapshot>(raw) {
            Ok(s) => PageSnapshot { text: s.text, nodes: s.nodes },
            Err(e) => {
                warn(&format!("[watchcore] bad snapshot payload: {e}"));
                PageSnapshot::default()
            }
        }
    }
}

struct JsSettings {
    get: Function,
}

impl SettingsPort for JsSettings {
    fn get(&mut self) -> ScanSettings {
        self.get
            .call0(&JsValue::NULL)
            .ok()
            .and_then(|v| serde_wasm_bindgen::from_value(v).ok())
            .unwrap_or_default()
    }
}

struct JsReport {
    report: Function,
}

impl ReportPort for JsReport {
    fn report_scan_result(&mut self, found_count: u32) {
        if self
            .report
            .call1(&JsValue::NULL, &JsValue::from_f64(found_count as f64))
            .is_err()
        {
            warn("[watchcore] report hook threw");
        }
    }
}

struct JsSurface {
    supports: Option<Function>,
    set_style: Option<Function>,
    apply: Option<Function>,
}

impl HighlightSurface for JsSurface {
    fn supports_highlighting(&self) -> bool {
        match (&self.supports, &self.apply) {
            (Some(supports), Some(_)) => supports
                .call0(&JsValue::NULL)
                .map(|v| v.is_truthy())
                .unwrap_or(false),
            _ => false,
        }
    }

    fn set_style(&mut self, name: &str, css: &str) {
        if let Some(set_style) = &self.set_style {
            let _ = set_style.call2(
                &JsValue::NULL,
                &JsValue::from_str(name),
                &JsValue::from_str(css),
            );
        }
    }

    fn apply(&mut self, name: &str, ranges: &[RangeSpec]) -> Vec<bool> {
        let Some(apply) = &self.apply else {
            return Vec::new();
        };
        let payload = match serde_wasm_bindgen::to_value(ranges) {
            Ok(v) => v,
            Err(_) => return vec![false; ranges.len()],
        };
        apply
            .call2(&JsValue::NULL, &JsValue::from_str(name), &payload)
            .ok()
            .and_then(|v| serde_wasm_bindgen::from_value::<Vec<bool>>(v).ok())
            .unwrap_or_else(|| vec![false; ranges.len()])
    }
}

struct JsWorker {
    post: Function,
    terminate: Option<Function>,
}

impl WorkerPort for JsWorker {
    fn post(&mut self, request: &ScanRequest) -> Result<(), String> {
        let payload = serde_wasm_bindgen::to_value(request)
            .map_err(|e| format!("serialize request: {e}"))?;
        self.post
            .call1(&JsValue::NULL, &payload)
            .map(|_| ())
            .map_err(|_| "post hook threw".to_string())
    }

    fn terminate(&mut self) {
        if let Some(terminate) = &self.terminate {
            let _ = terminate.call0(&JsValue::NULL);
        }
    }
}

struct JsSpawner {
    spawn: Option<Function>,
    post: Option<Function>,
    terminate: Option<Function>,
}

impl WorkerSpawner for JsSpawner {
    fn spawn(&mut self) -> Result<Box<dyn WorkerPort>, String> {
        let (Some(spawn), Some(post)) = (&self.spawn, &self.post) else {
            return Err("worker hooks not provided".to_string());
        };
        let ok = spawn
            .call0(&JsValue::NULL)
            .map_err(|_| "spawnWorker hook threw".to_string())?;
        if !ok.is_truthy() {
            return Err("spawnWorker declined".to_string());
        }
        Ok(Box::new(JsWorker {
            post: post.clone(),
            terminate: self.terminate.clone(),
        }))
    }
}

// =============================================================================
// SessionHandle
// =============================================================================

/// Content-script binding around `ScanSession`.
#[wasm_bindgen]
pub struct SessionHandle {
    session: ScanSession,
}

#[wasm_bindgen]
impl SessionHandle {
    /// `hooks` is an object of callbacks:
    /// `schedule(kind, ms, id) -> handle`, `cancel(handle)`, `now()`,
    /// `snapshot(wantNodes) -> {text, nodes}`, `getSettings()`,
    /// `report(count)`; optionally `spawnWorker()`, `postToWorker(msg)`,
    /// `terminateWorker()`, `supportsHighlighting()`,
    /// `setStyle(name, css)`, `applyRanges(name, ranges) -> bool[]`.
    #[wasm_bindgen(constructor)]
    pub fn new(hooks: JsValue) -> Result<SessionHandle, JsValue> {
        let ports = SessionPortsBundle {
            defer: Box::new(JsDefer {
                schedule: hook(&hooks, "schedule")?,
                cancel: hook(&hooks, "cancel")?,
                now: hook(&hooks, "now")?,
                next: 0,
                live: HashMap::new(),
            }),
            text: Box::new(JsText { snapshot: hook(&hooks, "snapshot")? }),
            settings: Box::new(JsSettings { get: hook(&hooks, "getSettings")? }),
            report: Box::new(JsReport { report: hook(&hooks, "report")? }),
            surface: Box::new(JsSurface {
                supports: optional_hook(&hooks, "supportsHighlighting"),
                set_style: optional_hook(&hooks, "setStyle"),
                apply: optional_hook(&hooks, "applyRanges"),
            }),
        };
        let executor = OffloadExecutor::new(Box::new(JsSpawner {
            spawn: optional_hook(&hooks, "spawnWorker"),
            post: optional_hook(&hooks, "postToWorker"),
            terminate: optional_hook(&hooks, "terminateWorker"),
        }));
        Ok(Self { session: ScanSession::new(ports, executor) })
    }

    /// Begin watching; schedules the initial scan.
    pub fn start(&mut self) {
        self.session.start();
    }

    /// Raw MutationObserver notification (debounced internally).
    #[wasm_bindgen(js_name = onMutation)]
    pub fn on_mutation(&mut self) {
        self.session.on_mutation();
    }

    /// Settings storage changed.
    #[wasm_bindgen(js_name = onSettingsChanged)]
    pub fn on_settings_changed(&mut self) {
        self.session.on_trigger(ScanTrigger::SettingsChanged);
    }

    /// `document.visibilityState` flipped.
    #[wasm_bindgen(js_name = onVisibility)]
    pub fn on_visibility(&mut self, hidden: bool) {
        self.session.on_visibility(hidden);
    }

    /// A deferral scheduled through the `schedule` hook fired.
    #[wasm_bindgen(js_name = onDeferFired)]
    pub fn on_defer_fired(&mut self, id: f64) {
        self.session.on_defer_fired(id as DeferId);
    }

    /// A message event from the scan worker.
    #[wasm_bindgen(js_name = onWorkerMessage)]
    pub fn on_worker_message(&mut self, message: JsValue) {
        match serde_wasm_bindgen::from_value::<ScanResponse>(message) {
            Ok(response) => self.session.on_worker_message(response),
            Err(e) => warn(&format!("[watchcore] unrecognized worker message: {e}")),
        }
    }

    /// Page teardown (pagehide/navigation).
    pub fn teardown(&mut self) {
        self.session.teardown();
    }

    /// Diagnostic status blob.
    #[wasm_bindgen(js_name = getStatus)]
    pub fn get_status(&self) -> JsValue {
        let status = serde_json::json!({
            "state": self.session.state_name(),
            "stats": self.session.stats(),
            "skip_rate": self.session.change_detector().skip_rate(),
            "worker": self.session.executor().worker_state_name(),
            "executor": self.session.executor().stats(),
        });
        JsValue::from_str(&status.to_string())
    }
}

// =============================================================================
// WorkerGate
// =============================================================================

/// Worker-script binding around `WorkerAgent`.
#[wasm_bindgen]
pub struct WorkerGate {
    agent: WorkerAgent,
}

impl Default for WorkerGate {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl WorkerGate {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WorkerGate {
        WorkerGate { agent: WorkerAgent::new() }
    }

    /// Handle one request message; returns the response message to post
    /// back. A message that does not parse yields a `scan_error` with id 0,
    /// which no pending entry ever matches.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&mut self, message: JsValue) -> JsValue {
        let response = match serde_wasm_bindgen::from_value::<ScanRequest>(message) {
            Ok(request) => self.agent.handle(request),
            Err(e) => ScanResponse::Error { id: 0, error: format!("bad request: {e}") },
        };
        serde_wasm_bindgen::to_value(&response).unwrap_or_else(|e| {
            web_sys::console::error_1(
                &format!("[watchcore] response serialization failed: {e:?}").into(),
            );
            JsValue::NULL
        })
    }

    /// Agent statistics for diagnostics.
    #[wasm_bindgen(js_name = getStats)]
    pub fn get_stats(&self) -> JsValue {
        serde_wasm_bindgen::to_value(self.agent.stats()).unwrap_or(JsValue::NULL)
    }
}

// =============================================================================
// Direct engine access (debugging / host-side unit checks)
// =============================================================================

/// One-shot presence scan: keywords array + text → distinct matched words.
#[wasm_bindgen(js_name = scanText)]
pub fn scan_text(keywords: JsValue, text: &str) -> Result<JsValue, JsValue> {
    let keywords: Vec<String> = serde_wasm_bindgen::from_value(keywords)
        .map_err(|e| JsValue::from_str(&format!("bad keywords: {e}")))?;
    let words = match compile_keywords(&keywords) {
        Some(set) => presence_scan(&set, text),
        None => Vec::new(),
    };
    serde_wasm_bindgen::to_value(&words).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// One-shot positional scan: keywords array + text → every occurrence.
#[wasm_bindgen(js_name = scanPositions)]
pub fn scan_positions(keywords: JsValue, text: &str) -> Result<JsValue, JsValue> {
    let keywords: Vec<String> = serde_wasm_bindgen::from_value(keywords)
        .map_err(|e| JsValue::from_str(&format!("bad keywords: {e}")))?;
    let matches = match compile_keywords(&keywords) {
        Some(set) => position_scan(&set, text),
        None => Vec::new(),
    };
    serde_wasm_bindgen::to_value(&matches).map_err(|e| JsValue::from_str(&e.to_string()))
}
