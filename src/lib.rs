//! WatchCore: incremental keyword scan engine for live pages
//!
//! A Rust/WASM implementation of the keyword-watcher scanning pipeline.
//!
//! # Architecture
//!
//! ## Scanner Components (pure engine)
//! - `scanner/compiler.rs` - Pattern compiler: user keyword strings → one combined regex
//! - `scanner/matcher.rs` - Presence + positional scanning over a compiled set
//! - `scanner/literal.rs` - Aho-Corasick fast path for all-literal keyword lists
//! - `scanner/change.rs` - ChangeDetector: signature-based skip detection
//! - `scanner/chunker.rs` - Window planning and gap-free chunk splitting
//!
//! ## Session Components (episode machinery)
//! - `session/ports.rs` - Boundary contracts to the host (timers, text, settings, reporting)
//! - `session/protocol.rs` - Worker wire protocol (tagged request/response unions)
//! - `session/worker.rs` - WorkerAgent: worker-side request handler
//! - `session/executor.rs` - Off-main-thread executor with inline fallback
//! - `session/scheduler.rs` - ScanSession: per-page scan state machine
//!
//! ## Highlight Projection
//! - `highlight.rs` - Maps positional matches onto node ranges + style rule
//!
//! # Usage (JavaScript, content script)
//! ```javascript,ignore
//! import init, { SessionHandle } from 'watchcore';
//!
//! await init();
//!
//! const session = new SessionHandle({
//!   schedule: (kind, ms, id) => kind === 'idle' && window.requestIdleCallback
//!     ? requestIdleCallback(() => session.onDeferFired(id), { timeout: ms })
//!     : setTimeout(() => session.onDeferFired(id), ms),
//!   cancel: (handle) => { clearTimeout(handle); cancelIdleCallback?.(handle); },
//!   now: () => performance.now(),
//!   snapshot: (wantNodes) => collectPageText(wantNodes),
//!   getSettings: () => cachedSettings,
//!   report: (count) => chrome.runtime.sendMessage({ found: count }),
//!   // worker + highlight hooks, see web.rs
//! });
//!
//! session.start();
//! observer.observe(document.body, { childList: true, subtree: true,
//!   characterData: true });
//! // observer callback: session.onMutation()
//! ```

pub mod highlight;
pub mod scanner;
pub mod session;
pub mod web;

// Public exports - engine
pub use scanner::*;

// Public exports - session machinery
pub use session::*;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("watchcore v{}", env!("CARGO_PKG_VERSION"))
}
