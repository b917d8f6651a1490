//! Chunk Decoding
//!
//! Normalizes every [`Chunk`] shape into a plain text fragment. Decoding is
//! total: a malformed or unrecognized chunk is recovered locally, counted as
//! an anomaly, and never aborts the streaming loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::Chunk;

/// Field carrying the text in backend event objects
pub const DEFAULT_TEXT_FIELD: &str = "response";

/// Turns backend chunks into text fragments
///
/// Clones share one anomaly counter, so the coordinator can keep a handle
/// while a worker task decodes.
#[derive(Clone, Debug)]
pub struct ChunkDecoder {
    text_field: Arc<str>,
    anomalies: Arc<AtomicU64>,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_FIELD)
    }
}

impl ChunkDecoder {
    /// Create a decoder reading `text_field` from event objects
    pub fn new(text_field: impl Into<String>) -> Self {
        Self {
            text_field: Arc::from(text_field.into()),
            anomalies: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Field read from event objects
    #[must_use]
    pub fn text_field(&self) -> &str {
        &self.text_field
    }

    /// Number of chunks that needed recovery so far
    #[must_use]
    pub fn anomalies(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }

    /// Decode one chunk into a fragment (possibly empty)
    #[must_use]
    pub fn decode(&self, chunk: Chunk) -> String {
        match chunk {
            Chunk::Text(text) => text,
            Chunk::Json(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) if value.is_object() => self.field_of(&value),
                Ok(_) => {
                    self.record_anomaly("encoded event is not an object", &raw);
                    raw
                }
                Err(e) => {
                    self.record_anomaly(&format!("failed to parse encoded event: {e}"), &raw);
                    raw
                }
            },
            Chunk::Event(value) => {
                if value.is_object() {
                    self.field_of(&value)
                } else {
                    self.record_anomaly("event is not an object", &value.to_string());
                    String::new()
                }
            }
            Chunk::Bytes(bytes) => {
                self.record_anomaly(
                    "unrecognized chunk shape",
                    &format!("{} raw bytes", bytes.len()),
                );
                String::new()
            }
        }
    }

    fn field_of(&self, value: &serde_json::Value) -> String {
        value
            .get(&*self.text_field)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn record_anomaly(&self, reason: &str, chunk: &str) {
        let total = self.anomalies.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(reason = reason, chunk = chunk, anomalies = total, "Chunk decode anomaly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        let decoder = ChunkDecoder::default();
        assert_eq!(decoder.decode(Chunk::Text("Hello".to_string())), "Hello");
        assert_eq!(decoder.anomalies(), 0);
    }

    #[test]
    fn test_encoded_event_extracts_field() {
        let decoder = ChunkDecoder::default();
        let chunk = Chunk::Json(r#"{"model":"llama2","response":"Hi","done":false}"#.to_string());
        assert_eq!(decoder.decode(chunk), "Hi");
        assert_eq!(decoder.anomalies(), 0);
    }

    #[test]
    fn test_encoded_event_without_field_is_empty() {
        let decoder = ChunkDecoder::default();
        let chunk = Chunk::Json(r#"{"done":true}"#.to_string());
        assert_eq!(decoder.decode(chunk), "");
        assert_eq!(decoder.anomalies(), 0);
    }

    #[test]
    fn test_malformed_encoding_falls_back_to_raw() {
        let decoder = ChunkDecoder::default();
        assert_eq!(decoder.decode(Chunk::Json("not json {".to_string())), "not json {");
        assert_eq!(decoder.anomalies(), 1);
    }

    #[test]
    fn test_encoded_non_object_falls_back_to_raw() {
        let decoder = ChunkDecoder::default();
        assert_eq!(decoder.decode(Chunk::Json("42".to_string())), "42");
        assert_eq!(decoder.anomalies(), 1);
    }

    #[test]
    fn test_structured_event() {
        let decoder = ChunkDecoder::default();
        let event = serde_json::json!({ "response": " world" });
        assert_eq!(decoder.decode(Chunk::Event(event)), " world");

        let event = serde_json::json!({ "done": true });
        assert_eq!(decoder.decode(Chunk::Event(event)), "");
        assert_eq!(decoder.anomalies(), 0);
    }

    #[test]
    fn test_unrecognized_shapes_are_empty_anomalies() {
        let decoder = ChunkDecoder::default();
        assert_eq!(decoder.decode(Chunk::Bytes(vec![0xff, 0xfe])), "");
        assert_eq!(decoder.decode(Chunk::Event(serde_json::json!([1, 2]))), "");
        assert_eq!(decoder.anomalies(), 2);
    }

    #[test]
    fn test_custom_field_and_shared_counter() {
        let decoder = ChunkDecoder::new("text");
        let handle = decoder.clone();

        let chunk = Chunk::Json(r#"{"text":"abc","response":"xyz"}"#.to_string());
        assert_eq!(decoder.decode(chunk), "abc");

        let _ = decoder.decode(Chunk::Bytes(Vec::new()));
        assert_eq!(handle.anomalies(), 1);
        assert_eq!(handle.text_field(), "text");
    }
}
