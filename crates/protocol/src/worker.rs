//! Messages emitted by the content hasher.
//!
//! ```text
//! progress:  {"percentage": 40.0}
//! done:      {"percentage": 100.0, "fileHash": "...", "fileChunkList": [...]}
//! failure:   {"name": "error", "data": "..."}
//! ```

use serde::{Deserialize, Serialize};

/// Tag carried by failure events.
pub const ERROR_EVENT_NAME: &str = "error";

/// A byte range `[start, end)` of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub index: u64,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Event stream produced while hashing a file.
///
/// Exactly one terminal event (`Done` or `Failed`) ends the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HashEvent {
    Failed {
        name: String,
        data: String,
    },
    Done {
        percentage: f64,
        #[serde(rename = "fileHash")]
        file_hash: String,
        #[serde(rename = "fileChunkList")]
        chunks: Vec<ChunkRange>,
    },
    Progress {
        percentage: f64,
    },
}

impl HashEvent {
    pub fn failed(error: impl ToString) -> Self {
        HashEvent::Failed {
            name: ERROR_EVENT_NAME.into(),
            data: error.to_string(),
        }
    }

    pub fn done(file_hash: String, chunks: Vec<ChunkRange>) -> Self {
        HashEvent::Done {
            percentage: 100.0,
            file_hash,
            chunks,
        }
    }

    /// Returns `true` for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HashEvent::Progress { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_shape() {
        let json = serde_json::to_string(&HashEvent::Progress { percentage: 25.0 }).unwrap();
        assert_eq!(json, r#"{"percentage":25.0}"#);
    }

    #[test]
    fn done_shape() {
        let evt = HashEvent::done(
            "abc".into(),
            vec![ChunkRange {
                index: 0,
                start: 0,
                end: 4,
            }],
        );
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["percentage"], 100.0);
        assert_eq!(json["fileHash"], "abc");
        assert_eq!(json["fileChunkList"][0]["end"], 4);
        assert!(evt.is_terminal());
    }

    #[test]
    fn failed_shape() {
        let json = serde_json::to_value(HashEvent::failed("read error")).unwrap();
        assert_eq!(json["name"], "error");
        assert_eq!(json["data"], "read error");
    }

    #[test]
    fn untagged_decode_picks_most_specific_variant() {
        let done: HashEvent =
            serde_json::from_str(r#"{"percentage":100,"fileHash":"x","fileChunkList":[]}"#)
                .unwrap();
        assert!(matches!(done, HashEvent::Done { .. }));

        let progress: HashEvent = serde_json::from_str(r#"{"percentage":50}"#).unwrap();
        assert!(matches!(progress, HashEvent::Progress { .. }));
        assert!(!progress.is_terminal());

        let failed: HashEvent =
            serde_json::from_str(r#"{"name":"error","data":"boom"}"#).unwrap();
        assert!(matches!(failed, HashEvent::Failed { .. }));
    }

    #[test]
    fn range_len() {
        let r = ChunkRange {
            index: 3,
            start: 30,
            end: 35,
        };
        assert_eq!(r.len(), 5);
        assert!(!r.is_empty());
    }
}
