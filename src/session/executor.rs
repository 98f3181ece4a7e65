//! Off-main-thread executor
//!
//! Runs the compile+scan pass in a worker context when one is available,
//! degrading to inline execution (an embedded `WorkerAgent`) when it is
//! not. Requests and responses correlate strictly by id through a pending
//! table; each request carries its own bounded wait, orthogonal to
//! scan-level cancellation, so a hung worker cannot strand a caller.
//!
//! Failure semantics: spawn failure, post failure, a `scan_error` response
//! or a request timeout each disable the off-thread path for the rest of
//! the page's lifetime - no retry storms - and every still-pending request
//! on a dead worker is rejected immediately.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::session::ports::{DeferId, DeferKind, DeferPort, WorkerPort, WorkerSpawner};
use crate::session::protocol::{ChunkMatches, ScanRequest, ScanResponse};
use crate::session::worker::WorkerAgent;

// =============================================================================
// Constants
// =============================================================================

/// Bounded wait per worker request, independent of any scan timeout.
pub const REQUEST_TIMEOUT_MS: u32 = 10_000;

/// Texts below this size always scan inline; a worker round-trip costs
/// more than the scan itself.
pub const OFFLOAD_MIN_BYTES: usize = 32 * 1024;

// =============================================================================
// Types
// =============================================================================

/// Completed scan payload, either path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Presence(Vec<String>),
    Highlights(Vec<ChunkMatches>),
}

/// Why a dispatched request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// No response within `REQUEST_TIMEOUT_MS`.
    Timeout,
    /// The worker answered with `scan_error`.
    WorkerFailed(String),
    /// The worker was torn down while this request was pending.
    WorkerGone,
}

/// What `submit` did with the job.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Ran inline; the result is already here.
    Completed(ScanOutcome),
    /// Posted to the worker; resolution arrives later through
    /// `on_message` or `on_timer_fired`, keyed by this request id.
    Dispatched(u64),
}

/// A resolution event for a dispatched request.
pub type ExecEvent = (u64, Result<ScanOutcome, ExecError>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub dispatched: u64,
    pub inline_runs: u64,
    pub timeouts: u64,
    pub worker_errors: u64,
    pub ignored_responses: u64,
}

enum WorkerState {
    /// Not spawned yet; first offloadable job spawns lazily.
    Untried,
    Live(Box<dyn WorkerPort>),
    /// Off-thread path disabled for the rest of the session.
    Disabled,
}

struct PendingRequest {
    timer: DeferId,
}

// =============================================================================
// OffloadExecutor
// =============================================================================

pub struct OffloadExecutor {
    spawner: Box<dyn WorkerSpawner>,
    worker: WorkerState,
    inline_agent: WorkerAgent,
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
    timers: HashMap<DeferId, u64>,
    stats: ExecutorStats,
}

impl OffloadExecutor {
    pub fn new(spawner: Box<dyn WorkerSpawner>) -> Self {
        Self {
            spawner,
            worker: WorkerState::Untried,
            inline_agent: WorkerAgent::new(),
            next_id: 0,
            pending: HashMap::new(),
            timers: HashMap::new(),
            stats: ExecutorStats::default(),
        }
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    pub fn offload_disabled(&self) -> bool {
        matches!(self.worker, WorkerState::Disabled)
    }

    /// Next request id: locally unique, increasing, never zero.
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Run a scan, off-thread when the payload is large enough and the
    /// worker path is healthy, inline otherwise.
    pub fn submit(
        &mut self,
        defer: &mut dyn DeferPort,
        mut request: ScanRequest,
    ) -> SubmitOutcome {
        let id = self.fresh_id();
        set_request_id(&mut request, id);

        if request.payload_len() >= OFFLOAD_MIN_BYTES && self.ensure_worker() {
            if let WorkerState::Live(port) = &mut self.worker {
                match port.post(&request) {
                    Ok(()) => {
                        let timer = defer.defer(DeferKind::Delay {
                            delay_ms: REQUEST_TIMEOUT_MS,
                        });
                        self.pending.insert(id, PendingRequest { timer });
                        self.timers.insert(timer, id);
                        self.stats.dispatched += 1;
                        return SubmitOutcome::Dispatched(id);
                    }
                    Err(_) => {
                        // Post failure counts as a worker fault.
                        self.teardown_worker(defer);
                    }
                }
            }
        }

        self.stats.inline_runs += 1;
        SubmitOutcome::Completed(outcome_of(self.inline_agent.handle(request)))
    }

    /// Route a worker message. Returns the resolution for the caller whose
    /// request this answers, or `None` for an unknown id (already timed
    /// out or superseded - ignored by design).
    pub fn on_message(
        &mut self,
        defer: &mut dyn DeferPort,
        response: ScanResponse,
    ) -> Option<ExecEvent> {
        let id = response.id();
        let Some(entry) = self.pending.remove(&id) else {
            self.stats.ignored_responses += 1;
            return None;
        };
        self.timers.remove(&entry.timer);
        defer.cancel(entry.timer);

        match response {
            ScanResponse::Result { words, .. } => Some((id, Ok(ScanOutcome::Presence(words)))),
            ScanResponse::Highlights { results, .. } => {
                Some((id, Ok(ScanOutcome::Highlights(results))))
            }
            ScanResponse::Error { error, .. } => {
                // A worker that errors once is not trusted again.
                self.stats.worker_errors += 1;
                self.teardown_worker(defer);
                Some((id, Err(ExecError::WorkerFailed(error))))
            }
        }
    }

    /// A deferral owned by this executor fired. Returns every resolution
    /// it produced: the timed-out request plus, since timeout means the
    /// worker is dead, rejections for all other pending requests.
    pub fn on_timer_fired(
        &mut self,
        defer: &mut dyn DeferPort,
        timer: DeferId,
    ) -> Vec<ExecEvent> {
        let Some(id) = self.timers.remove(&timer) else {
            return Vec::new();
        };
        self.pending.remove(&id);
        self.stats.timeouts += 1;

        let mut events = vec![(id, Err(ExecError::Timeout))];
        events.extend(self.teardown_worker(defer));
        events
    }

    /// Owns a given deferral?
    pub fn owns_timer(&self, timer: DeferId) -> bool {
        self.timers.contains_key(&timer)
    }

    /// Release the worker and reject everything still pending. Used on
    /// worker fault and on page teardown.
    pub fn teardown_worker(&mut self, defer: &mut dyn DeferPort) -> Vec<ExecEvent> {
        if let WorkerState::Live(port) = &mut self.worker {
            port.terminate();
        }
        self.worker = WorkerState::Disabled;

        let mut events = Vec::new();
        for (id, entry) in self.pending.drain() {
            self.timers.remove(&entry.timer);
            defer.cancel(entry.timer);
            events.push((id, Err(ExecError::WorkerGone)));
        }
        events
    }

    /// Worker state label for diagnostics.
    pub fn worker_state_name(&self) -> &'static str {
        match self.worker {
            WorkerState::Untried => "untried",
            WorkerState::Live(_) => "live",
            WorkerState::Disabled => "disabled",
        }
    }

    /// Lazily spawn the worker. A spawn failure disables the off-thread
    /// path for the session.
    fn ensure_worker(&mut self) -> bool {
        match self.worker {
            WorkerState::Live(_) => true,
            WorkerState::Disabled => false,
            WorkerState::Untried => match self.spawner.spawn() {
                Ok(port) => {
                    self.worker = WorkerState::Live(port);
                    true
                }
                Err(_) => {
                    self.worker = WorkerState::Disabled;
                    false
                }
            },
        }
    }
}

fn set_request_id(request: &mut ScanRequest, new_id: u64) {
    match request {
        ScanRequest::Scan { id, .. } => *id = new_id,
        ScanRequest::ScanForHighlights { id, .. } => *id = new_id,
    }
}

fn outcome_of(response: ScanResponse) -> ScanOutcome {
    match response {
        ScanResponse::Result { words, .. } => ScanOutcome::Presence(words),
        ScanResponse::Highlights { results, .. } => ScanOutcome::Highlights(results),
        // The embedded agent is total; it never produces scan_error.
        ScanResponse::Error { .. } => ScanOutcome::Presence(Vec::new()),
    }
}

// =============================================================================
// Tests
// =============================================================================
