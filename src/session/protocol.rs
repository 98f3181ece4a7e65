//! Worker wire protocol
//!
//! The request/response shapes exchanged between the main context and the
//! scan worker. This shape is a compatibility contract with any worker
//! implementation and is preserved exactly; both unions are tagged on
//! `type` and matched exhaustively so an unrecognized message shape is a
//! parse error, never silently swallowed.

use serde::{Deserialize, Serialize};

use crate::scanner::chunker::NodeChunk;
use crate::scanner::matcher::KeywordMatch;

// =============================================================================
// Requests
// =============================================================================

/// Main context → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanRequest {
    /// Presence scan over one text buffer, split worker-side into
    /// overlapping windows when chunk parameters are present.
    #[serde(rename = "scan")]
    Scan {
        id: u64,
        keywords: Vec<String>,
        text: String,
        #[serde(rename = "chunkSize", skip_serializing_if = "Option::is_none", default)]
        chunk_size: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        overlap: Option<usize>,
    },
    /// Positional scan, one chunk per text node, offsets node-local.
    #[serde(rename = "scan_for_highlights")]
    ScanForHighlights {
        id: u64,
        keywords: Vec<String>,
        chunks: Vec<NodeChunk>,
    },
}

impl ScanRequest {
    pub fn id(&self) -> u64 {
        match self {
            ScanRequest::Scan { id, .. } => *id,
            ScanRequest::ScanForHighlights { id, .. } => *id,
        }
    }

    /// Payload size, drives the offload threshold.
    pub fn payload_len(&self) -> usize {
        match self {
            ScanRequest::Scan { text, .. } => text.len(),
            ScanRequest::ScanForHighlights { chunks, .. } => {
                chunks.iter().map(|c| c.text.len()).sum()
            }
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Positional matches for one chunk, keyed by the client-assigned chunk id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMatches {
    pub id: u32,
    pub matches: Vec<KeywordMatch>,
}

/// Worker → main context. Matched to the caller strictly by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanResponse {
    #[serde(rename = "scan_result")]
    Result { id: u64, words: Vec<String> },
    #[serde(rename = "scan_highlights_result")]
    Highlights { id: u64, results: Vec<ChunkMatches> },
    #[serde(rename = "scan_error")]
    Error { id: u64, error: String },
}

impl ScanResponse {
    pub fn id(&self) -> u64 {
        match self {
            ScanResponse::Result { id, .. } => *id,
            ScanResponse::Highlights { id, .. } => *id,
            ScanResponse::Error { id, .. } => *id,
        }
    }
}

// =============================================================================
// Tests - the wire shape is pinned against literal JSON
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_request_wire_shape() {
        let req = ScanRequest::Scan {
            id: 7,
            keywords: vec!["alpha".into()],
            text: "body".into(),
            chunk_size: Some(32768),
            overlap: Some(64),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "scan",
                "id": 7,
                "keywords": ["alpha"],
                "text": "body",
                "chunkSize": 32768,
                "overlap": 64
            })
        );
    }

    #[test]
    fn test_scan_request_omits_absent_chunk_params() {
        let req = ScanRequest::Scan {
            id: 1,
            keywords: vec![],
            text: String::new(),
            chunk_size: None,
            overlap: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("chunkSize").is_none());
        assert!(json.get("overlap").is_none());
    }

    #[test]
    fn test_highlight_request_wire_shape() {
        let req = ScanRequest::ScanForHighlights {
            id: 3,
            keywords: vec!["k".into()],
            chunks: vec![NodeChunk { id: 0, text: "node text".into() }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "scan_for_highlights");
        assert_eq!(json["chunks"][0]["id"], 0);
        assert_eq!(json["chunks"][0]["text"], "node text");
    }

    #[test]
    fn test_result_response_wire_shape() {
        let resp = ScanResponse::Result { id: 7, words: vec!["alpha".into()] };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "scan_result", "id": 7, "words": ["alpha"] })
        );
    }

    #[test]
    fn test_highlights_response_wire_shape() {
        let resp = ScanResponse::Highlights {
            id: 2,
            results: vec![ChunkMatches {
                id: 4,
                matches: vec![KeywordMatch { keyword: "foo".into(), index: 0, length: 3 }],
            }],
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "scan_highlights_result");
        assert_eq!(
            json["results"][0]["matches"][0],
            serde_json::json!({ "keyword": "foo", "index": 0, "length": 3 })
        );
    }

    #[test]
    fn test_error_response_round_trip() {
        let resp = ScanResponse::Error { id: 9, error: "boom".into() };
        let json = serde_json::to_string(&resp).unwrap();
        let back: ScanResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
        assert_eq!(back.id(), 9);
    }

    #[test]
    fn test_unknown_message_type_is_a_parse_error() {
        let err = serde_json::from_str::<ScanResponse>(r#"{"type":"mystery","id":1}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_request_parses_from_worker_side_json() {
        let req: ScanRequest = serde_json::from_str(
            r#"{"type":"scan","id":12,"keywords":["a","b"],"text":"t","chunkSize":100,"overlap":10}"#,
        )
        .unwrap();
        assert_eq!(req.id(), 12);
        assert_eq!(req.payload_len(), 1);
    }
}
