//! ScanSession: per-page scan state machine
//!
//! Single owner of all scan state for one page: the episode counter (which
//! doubles as the supersede token), the change detector, the snapshot memo,
//! the off-thread executor and the debounce handle. Explicit lifecycle:
//! `start` on injection, `teardown` on navigation away. Everything external
//! arrives as an event - trigger, deferral firing, worker message,
//! visibility flip - and is dispatched from here.
//!
//! # State machine
//! `Idle → Pending → Running → (Idle | superseded)`. Any trigger cancels
//! the pending deferral and invalidates the running episode before
//! scheduling a new one; at most one episode is live at a time. A
//! superseded episode's results are dropped before reporting, so results
//! can never be reported out of order.

use serde::{Deserialize, Serialize};

use crate::highlight::{project, HIGHLIGHT_NAME};
use crate::scanner::change::{ChangeDetector, ScanSignature};
use crate::scanner::chunker::{NodeChunk, WindowPlan, SINGLE_CHUNK_MAX};
use crate::session::executor::{
    ExecError, ExecEvent, OffloadExecutor, ScanOutcome, SubmitOutcome,
};
use crate::session::ports::{
    DeferId, DeferKind, PageSnapshot, ScanSettings, SessionPortsBundle,
};
use crate::session::protocol::{ScanRequest, ScanResponse};

// =============================================================================
// Constants
// =============================================================================

/// Idle deferral bound: under sustained load the scan still runs within
/// this window.
pub const IDLE_TIMEOUT_MS: u32 = 2_000;

/// Mutation bursts coalesce into one scheduled scan per window.
pub const MUTATION_DEBOUNCE_MS: u32 = 500;

/// Body-text snapshots are memoized this long.
const SNAPSHOT_TTL_MS: f64 = 500.0;

// =============================================================================
// Types
// =============================================================================

/// What woke the scheduler up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    /// Initial page load complete.
    Load,
    /// Settings storage changed; also resets the change detector so a
    /// keyword-list update is never masked by an unchanged page.
    SettingsChanged,
    /// Debounced DOM mutation notification.
    Mutation,
    /// Page became visible again.
    VisibilityRegained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Pending { defer: DeferId },
    Running,
}

/// Everything the completion path needs, captured at dispatch time.
struct EpisodeCtx {
    sig: ScanSignature,
    highlight: Option<HighlightCtx>,
}

struct HighlightCtx {
    nodes: Vec<NodeChunk>,
    color: String,
}

/// One dispatched-to-worker episode waiting for resolution.
struct Awaited {
    episode: u64,
    request: u64,
    ctx: EpisodeCtx,
}

struct SnapshotMemo {
    at: f64,
    with_nodes: bool,
    snap: PageSnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub triggers: u64,
    pub episodes_started: u64,
    pub completed: u64,
    pub skipped: u64,
    pub superseded: u64,
    pub failed: u64,
}

// =============================================================================
// ScanSession
// =============================================================================

pub struct ScanSession {
    ports: SessionPortsBundle,
    executor: OffloadExecutor,
    change: ChangeDetector,
    state: SessionState,
    /// Monotonic episode counter; bumping it is the cancellation signal.
    episode: u64,
    awaited: Option<Awaited>,
    debounce: Option<DeferId>,
    memo: Option<SnapshotMemo>,
    hidden: bool,
    started: bool,
    torn_down: bool,
    stats: SessionStats,
}

impl ScanSession {
    pub fn new(ports: SessionPortsBundle, executor: OffloadExecutor) -> Self {
        Self {
            ports,
            executor,
            change: ChangeDetector::new(),
            state: SessionState::Idle,
            episode: 0,
            awaited: None,
            debounce: None,
            memo: None,
            hidden: false,
            started: false,
            torn_down: false,
            stats: SessionStats::default(),
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Begin watching: schedules the initial scan. Idempotent.
    pub fn start(&mut self) {
        if self.started || self.torn_down {
            return;
        }
        self.started = true;
        self.on_trigger(ScanTrigger::Load);
    }

    /// Page teardown: cancel everything and release the worker.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.cancel_all();
        self.executor.teardown_worker(self.ports.defer.as_mut());
        self.torn_down = true;
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// A trigger supersedes whatever was pending or running and schedules
    /// exactly one new deferred episode.
    pub fn on_trigger(&mut self, trigger: ScanTrigger) {
        if self.torn_down || self.hidden || !self.started {
            return;
        }
        self.stats.triggers += 1;
        self.supersede();
        if trigger == ScanTrigger::SettingsChanged {
            self.change.reset();
        }
        let defer = self
            .ports
            .defer
            .defer(DeferKind::Idle { timeout_ms: IDLE_TIMEOUT_MS });
        self.state = SessionState::Pending { defer };
    }

    /// Raw mutation notification; bursts coalesce through a trailing-edge
    /// debounce window.
    pub fn on_mutation(&mut self) {
        if self.torn_down || self.hidden || !self.started {
            return;
        }
        if let Some(d) = self.debounce.take() {
            self.ports.defer.cancel(d);
        }
        self.debounce = Some(self.ports.defer.defer(DeferKind::Delay {
            delay_ms: MUTATION_DEBOUNCE_MS,
        }));
    }

    /// A deferral queued by this session (or its executor) fired.
    pub fn on_defer_fired(&mut self, id: DeferId) {
        if self.torn_down {
            return;
        }
        self.ports.defer.fired(id);

        if self.debounce == Some(id) {
            self.debounce = None;
            self.on_trigger(ScanTrigger::Mutation);
            return;
        }
        if let SessionState::Pending { defer } = self.state {
            if defer == id {
                self.run_episode();
                return;
            }
        }
        if self.executor.owns_timer(id) {
            let events = self.executor.on_timer_fired(self.ports.defer.as_mut(), id);
            self.resolve_events(events);
        }
    }

    /// A message from the worker arrived.
    pub fn on_worker_message(&mut self, response: ScanResponse) {
        if self.torn_down {
            return;
        }
        if let Some(event) = self.executor.on_message(self.ports.defer.as_mut(), response) {
            self.resolve_events(vec![event]);
        }
    }

    /// Visibility loss pauses (the host also disconnects its mutation
    /// watcher); regain is a fresh trigger, not a resume.
    pub fn on_visibility(&mut self, hidden: bool) {
        if self.torn_down || hidden == self.hidden {
            return;
        }
        self.hidden = hidden;
        if hidden {
            self.cancel_all();
        } else {
            self.on_trigger(ScanTrigger::VisibilityRegained);
        }
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub fn state_name(&self) -> &'static str {
        match self.state {
            SessionState::Idle => "idle",
            SessionState::Pending { .. } => "pending",
            SessionState::Running => "running",
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn change_detector(&self) -> &ChangeDetector {
        &self.change
    }

    pub fn executor(&self) -> &OffloadExecutor {
        &self.executor
    }

    // -------------------------------------------------------------------------
    // Episode body
    // -------------------------------------------------------------------------

    fn run_episode(&mut self) {
        self.state = SessionState::Running;
        self.stats.episodes_started += 1;
        let episode = self.episode;

        // Settings are read fresh every episode, never cached across them.
        let settings = self.ports.settings.get();
        if !settings.enabled {
            self.finish_zero(None, true);
            return;
        }

        let highlight_mode =
            settings.highlight_enabled && self.ports.surface.supports_highlighting();

        let snap = self.take_snapshot(highlight_mode);
        if self.episode != episode {
            // Superseded while snapshotting: exit silently, no report.
            return;
        }

        let sig = ScanSignature::of(highlight_mode, &snap.text);
        if !self.change.check(sig).has_changed {
            self.state = SessionState::Idle;
            self.stats.skipped += 1;
            return;
        }

        if settings.keywords.iter().all(|k| k.trim().is_empty()) {
            // Nothing to match: skip matcher construction entirely.
            self.finish_zero(Some(sig), highlight_mode);
            return;
        }

        let request = build_request(&settings, &snap, highlight_mode);
        let ctx = EpisodeCtx {
            sig,
            highlight: highlight_mode.then(|| HighlightCtx {
                nodes: snap.nodes,
                color: settings.highlight_color,
            }),
        };

        match self.executor.submit(self.ports.defer.as_mut(), request) {
            SubmitOutcome::Completed(outcome) => self.finish(episode, ctx, Ok(outcome)),
            SubmitOutcome::Dispatched(request) => {
                self.awaited = Some(Awaited { episode, request, ctx });
            }
        }
    }

    /// Route executor resolutions to the awaited episode; resolutions for
    /// superseded episodes are dropped here.
    fn resolve_events(&mut self, events: Vec<ExecEvent>) {
        for (request, result) in events {
            match self.awaited.take() {
                Some(a) if a.request == request => self.finish(a.episode, a.ctx, result),
                other => self.awaited = other,
            }
        }
    }

    fn finish(&mut self, episode: u64, ctx: EpisodeCtx, result: Result<ScanOutcome, ExecError>) {
        if self.torn_down || self.episode != episode {
            return; // stale: never report a superseded episode
        }
        self.state = SessionState::Idle;

        match result {
            Err(_) => {
                // Worker fault already disabled the off-thread path; the
                // episode ends without a report and the next trigger scans
                // inline.
                self.stats.failed += 1;
            }
            Ok(ScanOutcome::Presence(words)) => {
                self.change.commit(ctx.sig);
                self.stats.completed += 1;
                self.ports.report.report_scan_result(words.len() as u32);
            }
            Ok(ScanOutcome::Highlights(results)) => {
                let count = match &ctx.highlight {
                    Some(h) => {
                        let plan = project(&results, &h.nodes, &h.color);
                        self.ports.surface.set_style(plan.name, &plan.css);
                        let flags = self.ports.surface.apply(plan.name, &plan.ranges);
                        plan.distinct_applied(&flags)
                    }
                    None => 0,
                };
                self.change.commit(ctx.sig);
                self.stats.completed += 1;
                self.ports.report.report_scan_result(count);
            }
        }
    }

    /// Complete an episode that had nothing to scan (disabled, or no
    /// usable keyword). Clears any highlight leftovers and reports zero so
    /// the badge resets.
    fn finish_zero(&mut self, sig: Option<ScanSignature>, clear_highlight: bool) {
        self.state = SessionState::Idle;
        if clear_highlight && self.ports.surface.supports_highlighting() {
            self.ports.surface.apply(HIGHLIGHT_NAME, &[]);
        }
        if let Some(sig) = sig {
            self.change.commit(sig);
        }
        self.stats.completed += 1;
        self.ports.report.report_scan_result(0);
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Invalidate whatever episode is pending or in flight.
    fn supersede(&mut self) {
        self.episode += 1;
        if let SessionState::Pending { defer } = self.state {
            self.ports.defer.cancel(defer);
        }
        if self.awaited.take().is_some() {
            self.stats.superseded += 1;
        }
        self.state = SessionState::Idle;
    }

    fn cancel_all(&mut self) {
        self.supersede();
        if let Some(d) = self.debounce.take() {
            self.ports.defer.cancel(d);
        }
    }

    /// Snapshot the page text, memoized within a short window so a settings
    /// burst does not re-walk the DOM.
    fn take_snapshot(&mut self, want_nodes: bool) -> PageSnapshot {
        let now = self.ports.defer.now_ms();
        if let Some(memo) = &self.memo {
            if now - memo.at < SNAPSHOT_TTL_MS && (!want_nodes || memo.with_nodes) {
                return memo.snap.clone();
            }
        }
        let snap = self.ports.text.snapshot(want_nodes);
        self.memo = Some(SnapshotMemo {
            at: now,
            with_nodes: want_nodes,
            snap: snap.clone(),
        });
        snap
    }
}

/// Assemble the wire request for one episode. The executor assigns the id.
fn build_request(
    settings: &ScanSettings,
    snap: &PageSnapshot,
    highlight_mode: bool,
) -> ScanRequest {
    if highlight_mode {
        ScanRequest::ScanForHighlights {
            id: 0,
            keywords: settings.keywords.clone(),
            chunks: snap.nodes.clone(),
        }
    } else {
        let longest = settings.keywords.iter().map(|k| k.len()).max().unwrap_or(0);
        let plan = WindowPlan::for_len(snap.text.len(), longest);
        let chunked = snap.text.len() > SINGLE_CHUNK_MAX;
        ScanRequest::Scan {
            id: 0,
            keywords: settings.keywords.clone(),
            text: snap.text.clone(),
            chunk_size: chunked.then_some(plan.window),
            overlap: chunked.then_some(plan.overlap),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
