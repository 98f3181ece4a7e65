//! Boundary contracts between the scan session and its host
//!
//! Everything the core needs from the outside world - timers, page text,
//! settings, the reporting sink, the worker transport, the highlight
//! capability - enters through one of these narrow traits. The web glue
//! implements them over JS callbacks; tests implement them over plain
//! structs. The core never reaches for ambient platform state.

use serde::{Deserialize, Serialize};

use crate::scanner::chunker::NodeChunk;
use crate::session::protocol::ScanRequest;

// =============================================================================
// Settings
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_color() -> String {
    "#ffff00".to_string()
}

/// User settings, read fresh from the host at the start of every scan
/// episode - never cached across episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, rename = "highlightEnabled")]
    pub highlight_enabled: bool,
    #[serde(default = "default_color", rename = "highlightColor")]
    pub highlight_color: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            enabled: true,
            highlight_enabled: false,
            highlight_color: default_color(),
        }
    }
}

// =============================================================================
// Deferral
// =============================================================================

/// Handle to one queued deferral, session-scoped and unique.
pub type DeferId = u64;

/// How a deferral should wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferKind {
    /// Idle-time callback bounded by a timeout so scanning still happens
    /// under sustained load. Ports without idle scheduling fall back to a
    /// fixed short delay.
    Idle { timeout_ms: u32 },
    /// Plain timeout.
    Delay { delay_ms: u32 },
}

/// Timer/idle scheduling. The host fires queued deferrals back into
/// `ScanSession::on_defer_fired` with the same id.
pub trait DeferPort {
    fn defer(&mut self, kind: DeferKind) -> DeferId;
    fn cancel(&mut self, id: DeferId);
    /// Housekeeping notification that a deferral has fired (ports that map
    /// ids to platform handles drop the mapping here).
    fn fired(&mut self, _id: DeferId) {}
    /// Monotonic milliseconds; drives the snapshot memo.
    fn now_ms(&self) -> f64;
}

// =============================================================================
// Page text
// =============================================================================

/// One snapshot of the page's visible text. `nodes` is populated only when
/// the snapshot was taken for a highlight scan.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub text: String,
    pub nodes: Vec<NodeChunk>,
}

pub trait TextPort {
    fn snapshot(&mut self, want_nodes: bool) -> PageSnapshot;
}

// =============================================================================
// Settings / reporting sinks
// =============================================================================

pub trait SettingsPort {
    fn get(&mut self) -> ScanSettings;
}

/// Outbound notification, once per completed non-skipped episode. The sink
/// owns badge text, rising-edge notifications and cross-tab bookkeeping.
pub trait ReportPort {
    fn report_scan_result(&mut self, found_count: u32);
}

// =============================================================================
// Highlight capability
// =============================================================================

/// A single range to register under the named highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    /// Snapshot node index the offsets refer to.
    #[serde(rename = "nodeId")]
    pub node_id: u32,
    pub start: usize,
    pub end: usize,
    /// Keyword this range represents; drives the distinct found count.
    pub keyword: String,
}

/// Optional native-highlight capability. Absence is a feature gap, not an
/// error: the session falls back to plain presence counting.
pub trait HighlightSurface {
    fn supports_highlighting(&self) -> bool;
    /// Replace the style rule for the named highlight. The surface owns one
    /// style element, created once, content rewritten on color change.
    fn set_style(&mut self, name: &str, css: &str);
    /// Replace the named highlight set wholesale. Returns one success flag
    /// per range; a failed range (node mutated/detached since snapshot) is
    /// skipped, the rest proceed.
    fn apply(&mut self, name: &str, ranges: &[RangeSpec]) -> Vec<bool>;
}

/// Surface for hosts without the highlight capability.
#[derive(Debug, Default)]
pub struct NoopSurface;

impl HighlightSurface for NoopSurface {
    fn supports_highlighting(&self) -> bool {
        false
    }
    fn set_style(&mut self, _name: &str, _css: &str) {}
    fn apply(&mut self, _name: &str, _ranges: &[RangeSpec]) -> Vec<bool> {
        Vec::new()
    }
}

// =============================================================================
// Worker transport
// =============================================================================

/// A live worker connection. Responses and errors come back through the
/// host into `ScanSession::on_worker_message`.
pub trait WorkerPort {
    fn post(&mut self, request: &ScanRequest) -> Result<(), String>;
    fn terminate(&mut self);
}

/// Lazy worker creation; called at most once per session unless the worker
/// has been torn down and the off-thread path disabled.
pub trait WorkerSpawner {
    fn spawn(&mut self) -> Result<Box<dyn WorkerPort>, String>;
}

// =============================================================================
// Bundle
// =============================================================================

/// All the ports one `ScanSession` owns. The web glue builds these from JS
/// callbacks; tests build them from plain mocks.
pub struct SessionPortsBundle {
    pub defer: Box<dyn DeferPort>,
    pub text: Box<dyn TextPort>,
    pub settings: Box<dyn SettingsPort>,
    pub report: Box<dyn ReportPort>,
    pub surface: Box<dyn HighlightSurface>,
}

// =============================================================================
// Tests
// =============================================================================
