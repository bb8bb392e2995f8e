//! Wire batch format shared with the opposite-direction replicator.
//!
//! One `SyncBatch` per transport emission. Batches are bounded by an entry
//! count and a cumulative encoded-content size; `BatchBuilder` enforces
//! both caps and seals a batch the moment either one is reached.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What a wire entry asks the receiver to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Write,
    Delete,
}

/// A single file entry in a batch.
///
/// `content_base64` and `mode` are present only on `write` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFile {
    pub relative_path: String,
    pub action: FileAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl WireFile {
    /// A write entry carrying encoded content and POSIX mode bits.
    pub fn write(relative_path: String, content_base64: String, mode: String) -> Self {
        Self {
            relative_path,
            action: FileAction::Write,
            content_base64: Some(content_base64),
            mode: Some(mode),
        }
    }

    /// A delete entry; path only.
    pub fn delete(relative_path: String) -> Self {
        Self {
            relative_path,
            action: FileAction::Delete,
            content_base64: None,
            mode: None,
        }
    }

    /// Encoded payload size counted against the batch byte cap.
    fn payload_len(&self) -> usize {
        self.content_base64.as_ref().map_or(0, String::len)
    }
}

/// One transport emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatch {
    pub session_id: String,
    pub files: Vec<WireFile>,
    /// Milliseconds since the Unix epoch, stamped at emission.
    pub timestamp: i64,
}

/// Accumulates wire entries into size-bounded batches.
pub struct BatchBuilder {
    session_id: String,
    max_files: usize,
    max_bytes: usize,
    files: Vec<WireFile>,
    bytes: usize,
}

impl BatchBuilder {
    pub fn new(session_id: &str, max_files: usize, max_bytes: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            max_files,
            max_bytes,
            files: Vec::new(),
            bytes: 0,
        }
    }

    /// Append an entry. Returns a sealed batch when the entry fills either
    /// cap; the caller must emit it before pushing more.
    pub fn push(&mut self, file: WireFile) -> Option<SyncBatch> {
        self.bytes += file.payload_len();
        self.files.push(file);

        if self.files.len() >= self.max_files || self.bytes >= self.max_bytes {
            Some(self.seal())
        } else {
            None
        }
    }

    /// Seal whatever remains, if anything.
    pub fn finish(mut self) -> Option<SyncBatch> {
        if self.files.is_empty() {
            None
        } else {
            Some(self.seal())
        }
    }

    fn seal(&mut self) -> SyncBatch {
        self.bytes = 0;
        SyncBatch {
            session_id: self.session_id.clone(),
            files: std::mem::take(&mut self.files),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_json_shape() {
        let write = WireFile::write("src/lib.rs".to_string(), "aGk=".to_string(), "644".to_string());
        let json = serde_json::to_value(&write).unwrap();

        assert_eq!(json["relativePath"], "src/lib.rs");
        assert_eq!(json["action"], "write");
        assert_eq!(json["contentBase64"], "aGk=");
        assert_eq!(json["mode"], "644");
    }

    #[test]
    fn test_delete_entry_omits_content_fields() {
        let delete = WireFile::delete("old.txt".to_string());
        let json = serde_json::to_value(&delete).unwrap();

        assert_eq!(json["action"], "delete");
        assert!(json.get("contentBase64").is_none());
        assert!(json.get("mode").is_none());
    }

    #[test]
    fn test_batch_json_shape() {
        let batch = SyncBatch {
            session_id: "ws-1".to_string(),
            files: vec![WireFile::delete("a.txt".to_string())],
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&batch).unwrap();

        assert_eq!(json["sessionId"], "ws-1");
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
        assert_eq!(json["files"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_entry_count_cap() {
        let mut builder = BatchBuilder::new("ws-1", 200, usize::MAX);
        let mut sealed = Vec::new();

        for i in 0..250 {
            if let Some(batch) = builder.push(WireFile::delete(format!("f{i}"))) {
                sealed.push(batch);
            }
        }
        if let Some(batch) = builder.finish() {
            sealed.push(batch);
        }

        assert_eq!(sealed.len(), 2);
        assert_eq!(sealed[0].files.len(), 200);
        assert_eq!(sealed[1].files.len(), 50);
    }

    #[test]
    fn test_byte_cap() {
        let mut builder = BatchBuilder::new("ws-1", usize::MAX, 10);

        let first = builder.push(WireFile::write(
            "a".to_string(),
            "x".repeat(4),
            "644".to_string(),
        ));
        assert!(first.is_none());

        // Crosses the 10-byte cap; sealed immediately
        let second = builder.push(WireFile::write(
            "b".to_string(),
            "y".repeat(8),
            "644".to_string(),
        ));
        let batch = second.unwrap();
        assert_eq!(batch.files.len(), 2);

        assert!(builder.finish().is_none());
    }

    #[test]
    fn test_empty_builder_finishes_to_nothing() {
        let builder = BatchBuilder::new("ws-1", 200, 1024);

        assert!(builder.finish().is_none());
    }
}
