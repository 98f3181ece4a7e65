//! WorkerAgent: worker-side request handler
//!
//! One agent lives in the worker context (or embedded in the executor as
//! the inline fallback) and turns requests into responses. Compilation is
//! memoized per keyword-list identity - rebuilt when the list changes,
//! never per chunk. Any internal failure becomes a `scan_error` response
//! for the same id; the agent never panics the worker.

use serde::{Deserialize, Serialize};

use crate::scanner::chunker::{split_windows, NodeChunk, WindowPlan};
use crate::scanner::compiler::{compile_keywords, CompiledSet};
use crate::scanner::matcher::{collect_words, position_scan, presence_scan_into};
use crate::session::protocol::{ChunkMatches, ScanRequest, ScanResponse};

// =============================================================================
// Stats
// =============================================================================

/// Cumulative agent statistics, mirrored to the host for diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStats {
    pub requests: u64,
    pub compile_reuses: u64,
    pub last_scan_us: u64,
    pub last_chunk_count: usize,
}

// =============================================================================
// WorkerAgent
// =============================================================================

#[derive(Default)]
pub struct WorkerAgent {
    /// Last (keyword list, compiled artifact) pair. `None` inside the
    /// option means the list compiled to "no matcher" - memoized too, so a
    /// hopeless list is not recompiled every request.
    cache: Option<(Vec<String>, Option<CompiledSet>)>,
    stats: AgentStats,
}

impl WorkerAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    /// Handle one request. Total: always produces a response with the
    /// request's id.
    pub fn handle(&mut self, request: ScanRequest) -> ScanResponse {
        self.stats.requests += 1;
        let start = instant::Instant::now();
        let response = match request {
            ScanRequest::Scan { id, keywords, text, chunk_size, overlap } => {
                let words = self.scan_plain(&keywords, &text, chunk_size, overlap);
                ScanResponse::Result { id, words }
            }
            ScanRequest::ScanForHighlights { id, keywords, chunks } => {
                let results = self.scan_chunks(&keywords, &chunks);
                ScanResponse::Highlights { id, results }
            }
        };
        self.stats.last_scan_us = start.elapsed().as_micros() as u64;
        response
    }

    /// Presence scan over one buffer, split into overlapping windows. The
    /// found set accumulates across windows so the short-circuit spans the
    /// whole buffer; overlap double-reports dedupe at the set level.
    fn scan_plain(
        &mut self,
        keywords: &[String],
        text: &str,
        chunk_size: Option<usize>,
        overlap: Option<usize>,
    ) -> Vec<String> {
        let Some(set) = Self::compiled(&mut self.cache, &mut self.stats, keywords) else {
            return Vec::new();
        };

        let plan = match chunk_size {
            Some(window) if window > 0 => WindowPlan {
                window,
                overlap: overlap.unwrap_or(0).min(window - 1),
            },
            _ => WindowPlan::for_len(text.len(), set.longest_len()),
        };

        let windows = split_windows(text, &plan);
        let mut found = std::collections::HashSet::new();
        let total = set.keyword_count();
        for (_, slice) in &windows {
            presence_scan_into(set, slice, &mut found);
            if found.len() >= total {
                break;
            }
        }
        let words = collect_words(set, &found);
        self.stats.last_chunk_count = windows.len();
        words
    }

    /// Positional scan per node chunk; only chunks with matches are
    /// reported back.
    fn scan_chunks(&mut self, keywords: &[String], chunks: &[NodeChunk]) -> Vec<ChunkMatches> {
        let Some(set) = Self::compiled(&mut self.cache, &mut self.stats, keywords) else {
            return Vec::new();
        };

        let results: Vec<ChunkMatches> = chunks
            .iter()
            .filter_map(|chunk| {
                let matches = position_scan(set, &chunk.text);
                (!matches.is_empty()).then(|| ChunkMatches { id: chunk.id, matches })
            })
            .collect();
        self.stats.last_chunk_count = chunks.len();
        results
    }

    /// Memoized compile: rebuild only when the keyword list changes. Takes
    /// the fields apart so the returned borrow is tied to the cache alone.
    fn compiled<'a>(
        cache: &'a mut Option<(Vec<String>, Option<CompiledSet>)>,
        stats: &mut AgentStats,
        keywords: &[String],
    ) -> Option<&'a CompiledSet> {
        let stale = match cache {
            Some((cached, _)) => cached.as_slice() != keywords,
            None => true,
        };
        if stale {
            *cache = Some((keywords.to_vec(), compile_keywords(keywords)));
        } else {
            stats.compile_reuses += 1;
        }
        cache.as_ref().and_then(|(_, set)| set.as_ref())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scan_request_produces_words() {
        let mut agent = WorkerAgent::new();
        let resp = agent.handle(ScanRequest::Scan {
            id: 1,
            keywords: kw(&["alpha", "beta"]),
            text: "This has ALPHA and beta.".into(),
            chunk_size: None,
            overlap: None,
        });
        assert_eq!(
            resp,
            ScanResponse::Result { id: 1, words: kw(&["alpha", "beta"]) }
        );
    }

    #[test]
    fn test_empty_keyword_list_returns_empty_result() {
        let mut agent = WorkerAgent::new();
        let resp = agent.handle(ScanRequest::Scan {
            id: 2,
            keywords: vec![],
            text: "anything".into(),
            chunk_size: None,
            overlap: None,
        });
        assert_eq!(resp, ScanResponse::Result { id: 2, words: vec![] });
    }

    #[test]
    fn test_invalid_only_keywords_return_empty_result() {
        let mut agent = WorkerAgent::new();
        let resp = agent.handle(ScanRequest::Scan {
            id: 3,
            keywords: kw(&["[bad", "(worse"]),
            text: "bad worse".into(),
            chunk_size: None,
            overlap: None,
        });
        assert_eq!(resp, ScanResponse::Result { id: 3, words: vec![] });
    }

    #[test]
    fn test_explicit_chunk_params_respected_across_boundary() {
        let mut agent = WorkerAgent::new();
        // "needle" straddles the 100-byte window boundary; overlap 8 >= 6.
        let mut text = "x".repeat(97);
        text.push_str("needle");
        text.push_str(&"y".repeat(100));
        let resp = agent.handle(ScanRequest::Scan {
            id: 4,
            keywords: kw(&["needle"]),
            text,
            chunk_size: Some(100),
            overlap: Some(8),
        });
        assert_eq!(resp, ScanResponse::Result { id: 4, words: kw(&["needle"]) });
    }

    #[test]
    fn test_highlight_request_keyed_by_node_id() {
        let mut agent = WorkerAgent::new();
        let resp = agent.handle(ScanRequest::ScanForHighlights {
            id: 5,
            keywords: kw(&["foo", "bar"]),
            chunks: vec![
                NodeChunk { id: 0, text: "no hits here".into() },
                NodeChunk { id: 3, text: "foo x bar x foo".into() },
            ],
        });
        let ScanResponse::Highlights { id, results } = resp else {
            panic!("expected highlights response");
        };
        assert_eq!(id, 5);
        assert_eq!(results.len(), 1, "hit-less chunks are omitted");
        assert_eq!(results[0].id, 3);
        assert_eq!(results[0].matches.len(), 3);
        assert_eq!(results[0].matches[1].index, 6);
    }

    #[test]
    fn test_compile_memoized_per_keyword_list() {
        let mut agent = WorkerAgent::new();
        let request = |id| ScanRequest::Scan {
            id,
            keywords: kw(&["alpha"]),
            text: "alpha".into(),
            chunk_size: None,
            overlap: None,
        };
        agent.handle(request(1));
        agent.handle(request(2));
        assert_eq!(agent.stats().compile_reuses, 1);

        // Changed list: rebuild, no reuse counted.
        agent.handle(ScanRequest::Scan {
            id: 3,
            keywords: kw(&["beta"]),
            text: "beta".into(),
            chunk_size: None,
            overlap: None,
        });
        assert_eq!(agent.stats().compile_reuses, 1);
    }

    #[test]
    fn test_zero_chunk_size_falls_back_to_plan() {
        let mut agent = WorkerAgent::new();
        let resp = agent.handle(ScanRequest::Scan {
            id: 6,
            keywords: kw(&["word"]),
            text: "a word".into(),
            chunk_size: Some(0),
            overlap: None,
        });
        assert_eq!(resp, ScanResponse::Result { id: 6, words: kw(&["word"]) });
    }
}
