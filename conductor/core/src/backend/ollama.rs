//! Ollama Backend Implementation
//!
//! Backend client for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/generate` - Generate completions (streaming or batch)
//! - `/api/tags` - List available models
//!
//! Streaming responses are newline-delimited JSON; each line is handed to
//! the session as a [`Chunk::Json`] so decoding stays in one place. Batch
//! responses are unwrapped here and yielded as a single [`Chunk::Text`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::traits::{BackendClient, BackendConfig, Chunk, ChunkStream};

/// Ollama backend client
#[derive(Clone)]
pub struct OllamaBackend {
    /// Connection settings
    config: BackendConfig,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(config: BackendConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }

        Ok(Self {
            config,
            http_client: builder.build()?,
        })
    }

    /// Connection settings in use
    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Get generate endpoint URL
    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.config.base_url())
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.config.base_url())
    }

    async fn post_generate(
        &self,
        model: &str,
        prompt: &str,
        stream: bool,
    ) -> anyhow::Result<reqwest::Response> {
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": stream,
        });

        let response = self
            .http_client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }

        Ok(response)
    }

    async fn generate_streaming(&self, model: &str, prompt: &str) -> anyhow::Result<ChunkStream> {
        let response = self.post_generate(model, prompt, true).await?;
        let mut body = response.bytes_stream();
        let (tx, rx) = mpsc::channel(100);

        // Split the body into lines. Dropping the receiver ends the task even
        // while the body is idle, which releases the connection.
        tokio::spawn(async move {
            let mut lines = LineBuffer::default();

            loop {
                let bytes = tokio::select! {
                    biased;
                    () = tx.closed() => return,
                    bytes = body.next() => bytes,
                };

                match bytes {
                    Some(Ok(bytes)) => {
                        for chunk in lines.push(&bytes) {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(Err(anyhow::Error::new(e))).await;
                        return;
                    }
                    None => break,
                }
            }

            if let Some(chunk) = lines.finish() {
                let _ = tx.send(Ok(chunk)).await;
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn generate_batch(&self, model: &str, prompt: &str) -> anyhow::Result<ChunkStream> {
        let response = self.post_generate(model, prompt, false).await?;
        let data: serde_json::Value = response.json().await?;

        let content = data
            .get(self.config.text_field.as_str())
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(futures::stream::once(async move { Ok(Chunk::Text(content)) }).boxed())
    }
}

#[async_trait]
impl BackendClient for OllamaBackend {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn generate(&self, model: &str, prompt: &str) -> anyhow::Result<ChunkStream> {
        tracing::debug!(model = model, stream = self.config.stream, "Sending generate request");
        if self.config.stream {
            self.generate_streaming(model, prompt).await
        } else {
            self.generate_batch(model, prompt).await
        }
    }

    async fn list_models(&self) -> anyhow::Result<Vec<String>> {
        let response = self
            .http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }

        let data: serde_json::Value = response.json().await?;
        Ok(model_names(&data))
    }
}

/// Reassembles newline-delimited lines from arbitrary network reads
///
/// Bytes are buffered until a whole line is present, so a multi-byte
/// character split across reads is decoded intact. Lines that are not valid
/// UTF-8 are passed on as [`Chunk::Bytes`] for the decoder to flag.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a read and return every line it completed
    fn push(&mut self, bytes: &[u8]) -> Vec<Chunk> {
        self.pending.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(chunk) = to_chunk(line) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// Whatever followed the last newline
    fn finish(&mut self) -> Option<Chunk> {
        to_chunk(std::mem::take(&mut self.pending))
    }
}

fn to_chunk(line: Vec<u8>) -> Option<Chunk> {
    match String::from_utf8(line) {
        Ok(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| Chunk::Json(text.to_string()))
        }
        Err(e) => {
            let raw = e.into_bytes();
            let trimmed = raw.trim_ascii();
            (!trimmed.is_empty()).then(|| Chunk::Bytes(trimmed.to_vec()))
        }
    }
}

/// Extract `models[].name` from a tags response, keeping order
fn model_names(data: &serde_json::Value) -> Vec<String> {
    data.get("models")
        .and_then(|m| m.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|m| m.get("name")?.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    use crate::config::ConductorConfig;
    use crate::messages::ChatEvent;
    use crate::streaming::ChunkDecoder;
    use crate::Conductor;

    /// Read one request, headers and body, off `socket`
    async fn read_request(socket: &mut TcpStream) {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            data.extend_from_slice(&buf[..n]);

            if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Serve one generate request with a chunked body, one frame per write
    ///
    /// With `hold_open` the body never ends. The receiver fires once the
    /// client hangs up.
    async fn serve_chunked(
        frames: Vec<Vec<u8>>,
        gap: Duration,
        hold_open: bool,
    ) -> (BackendConfig, oneshot::Receiver<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();

            for frame in frames {
                tokio::time::sleep(gap).await;
                let mut out = format!("{:x}\r\n", frame.len()).into_bytes();
                out.extend_from_slice(&frame);
                out.extend_from_slice(b"\r\n");
                socket.write_all(&out).await.unwrap();
                socket.flush().await.unwrap();
            }
            if !hold_open {
                socket.write_all(b"0\r\n\r\n").await.unwrap();
            }

            // EOF or reset once the client lets go
            let mut buf = [0u8; 64];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            let _ = closed_tx.send(());
        });

        (BackendConfig::new("127.0.0.1", port), closed_rx)
    }

    #[test]
    fn test_ollama_backend_creation() {
        let backend = OllamaBackend::new(BackendConfig::default()).unwrap();
        assert_eq!(backend.generate_url(), "http://localhost:11434/api/generate");
        assert_eq!(backend.tags_url(), "http://localhost:11434/api/tags");
        assert_eq!(backend.name(), "Ollama");
    }

    #[test]
    fn test_model_names_keep_order() {
        let data = serde_json::json!({
            "models": [
                { "name": "llama2:latest", "size": 1 },
                { "size": 2 },
                { "name": "mistral:7b" }
            ]
        });
        assert_eq!(model_names(&data), vec!["llama2:latest", "mistral:7b"]);
    }

    #[test]
    fn test_model_names_missing_list() {
        assert!(model_names(&serde_json::json!({})).is_empty());
    }

    #[test]
    fn test_unreachable_server_fails_at_call_time() {
        // Nothing listens on the discard port
        let backend = OllamaBackend::new(BackendConfig::new("127.0.0.1", 9).with_timeout_secs(5))
            .unwrap();

        assert!(tokio_test::block_on(backend.generate("llama2", "hi")).is_err());
        assert!(tokio_test::block_on(backend.list_models()).is_err());
        assert!(!tokio_test::block_on(backend.health_check()));
    }

    #[test]
    fn test_line_buffer_joins_split_character() {
        let line = "{\"response\":\"café\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut lines = LineBuffer::default();
        assert!(lines.push(&line[..split]).is_empty());
        assert_eq!(
            lines.push(&line[split..]),
            vec![Chunk::Json(r#"{"response":"café"}"#.to_string())]
        );
        assert!(lines.finish().is_none());
    }

    #[test]
    fn test_line_buffer_edges() {
        let mut lines = LineBuffer::default();
        assert_eq!(
            lines.push(b"\n  \n{\"a\":1}\r\n\xff\xfe\n{\"b\""),
            vec![
                Chunk::Json(r#"{"a":1}"#.to_string()),
                Chunk::Bytes(vec![0xff, 0xfe]),
            ]
        );
        assert_eq!(lines.finish(), Some(Chunk::Json(r#"{"b""#.to_string())));
        assert!(lines.finish().is_none());
    }

    #[tokio::test]
    async fn test_streaming_keeps_characters_split_across_reads() {
        let line = "{\"response\":\"café\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let frames = vec![
            line[..split].to_vec(),
            line[split..].to_vec(),
            b"{\"response\":\"\",\"done\":true}\n".to_vec(),
        ];
        let (config, _closed) = serve_chunked(frames, Duration::from_millis(100), false).await;

        let backend = OllamaBackend::new(config).unwrap();
        let chunks: Vec<Chunk> = backend
            .generate("llama2", "User: hi\nAssistant: ")
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;

        let decoder = ChunkDecoder::default();
        let text: String = chunks.into_iter().map(|c| decoder.decode(c)).collect();
        assert_eq!(text, "café");
        assert_eq!(decoder.anomalies(), 0);
    }

    #[tokio::test]
    async fn test_cancel_releases_idle_connection() {
        let frames = vec![b"{\"response\":\"a\"}\n".to_vec()];
        let (config, closed) = serve_chunked(frames, Duration::ZERO, true).await;

        let backend = OllamaBackend::new(config.clone()).unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let settings = ConductorConfig {
            backend: config,
            ..Default::default()
        };
        let mut conductor = Conductor::new(backend, settings, tx);

        conductor.send_message("hi").await.unwrap();
        assert!(matches!(
            conductor.next_event().await,
            Some(ChatEvent::Fragment { ref text, .. }) if text == "a"
        ));
        assert!(conductor.cancel_generation().await);

        tokio::time::timeout(Duration::from_secs(2), closed)
            .await
            .expect("connection still open after cancel")
            .unwrap();
    }
}
