//! Synthesis backends as uniform descriptors.
//!
//! Each backend is one `TtsBackend` impl: name, availability precondition,
//! per-attempt timeout, and an async `synthesize` producing playable audio
//! bytes (WAV/MP3). The chain is a plain ordered list — adding a backend
//! means adding one descriptor, not new branching logic.

use crate::config::{ElevenLabsConfig, OpenAiTtsConfig, PiperConfig, TtsConfig};
use crate::error::{TtsError, TtsResult};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

/// One pluggable speech-synthesis backend.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Short stable name, used for logs and throughput tracking.
    fn name(&self) -> &str;

    /// Availability precondition (credentials present, paths exist).
    /// Checked once when the chain is built.
    fn available(&self) -> bool;

    /// Whether this backend needs network access (offline mode drops it).
    fn requires_network(&self) -> bool {
        false
    }

    /// Per-attempt timeout; exceeding it counts as a failure.
    fn timeout(&self) -> Duration;

    /// Synthesize `text` to audio bytes. Empty bytes mean "nothing to play"
    /// and are treated as success.
    async fn synthesize(&self, text: &str) -> TtsResult<Vec<u8>>;
}

/// ElevenLabs text-to-speech over HTTP.
pub struct ElevenLabsBackend {
    config: ElevenLabsConfig,
    client: reqwest::Client,
}

impl ElevenLabsBackend {
    pub fn new(config: ElevenLabsConfig) -> TtsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TtsError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TtsBackend for ElevenLabsBackend {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn available(&self) -> bool {
        !self.config.api_key.is_empty() && !self.config.voice.is_empty()
    }

    fn requires_network(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn synthesize(&self, text: &str) -> TtsResult<Vec<u8>> {
        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.config.voice
        );
        let body = serde_json::json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": {"stability": 0.5, "similarity_boost": 0.8},
        });
        let res = self
            .client
            .post(&url)
            .header("xi-api-key", &self.config.api_key)
            .header("accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::Synthesis(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let detail = res.text().await.unwrap_or_default();
            return Err(TtsError::Synthesis(format!(
                "ElevenLabs API error {}: {}",
                status, detail
            )));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| TtsError::Synthesis(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

static PIPER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Local Piper subprocess backend: text on stdin, WAV to a temp file.
pub struct PiperBackend {
    config: PiperConfig,
}

impl PiperBackend {
    pub fn new(config: PiperConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TtsBackend for PiperBackend {
    fn name(&self) -> &str {
        "piper"
    }

    fn available(&self) -> bool {
        self.config.exe.exists() && self.config.model.exists()
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn synthesize(&self, text: &str) -> TtsResult<Vec<u8>> {
        let out_path = std::env::temp_dir().join(format!(
            "veil-piper-{}-{}.wav",
            std::process::id(),
            PIPER_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let mut child = Command::new(&self.config.exe)
            .arg("-m")
            .arg(&self.config.model)
            .arg("-f")
            .arg(&out_path)
            .arg("-q")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let _ = tokio::fs::remove_file(&out_path).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TtsError::Synthesis(format!(
                "piper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let bytes = tokio::fs::read(&out_path).await?;
        let _ = tokio::fs::remove_file(&out_path).await;
        if bytes.len() < 1024 {
            return Err(TtsError::Synthesis(format!(
                "piper produced a tiny WAV ({} bytes)",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

/// OpenAI-compatible `/audio/speech` backend (OpenAI, OpenRouter, etc.).
pub struct OpenAiTtsBackend {
    config: OpenAiTtsConfig,
    client: reqwest::Client,
}

impl OpenAiTtsBackend {
    pub fn new(config: OpenAiTtsConfig) -> TtsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TtsError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TtsBackend for OpenAiTtsBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn requires_network(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn synthesize(&self, text: &str) -> TtsResult<Vec<u8>> {
        let url = format!(
            "{}/audio/speech",
            self.config.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.config.model,
            "input": text,
            "voice": self.config.voice,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::Synthesis(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let detail = res.text().await.unwrap_or_default();
            return Err(TtsError::Synthesis(format!(
                "TTS API error {}: {}",
                status, detail
            )));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| TtsError::Synthesis(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Placeholder backend: instant empty audio. Useful for wiring tests and
/// headless runs.
#[derive(Debug, Default)]
pub struct PlaceholderBackend;

#[async_trait]
impl TtsBackend for PlaceholderBackend {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn available(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn synthesize(&self, _text: &str) -> TtsResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Build the ordered backend chain from config. Preconditions are checked
/// once here; unavailable backends and (in offline mode) network backends
/// never enter the chain.
pub fn build_chain(config: &TtsConfig) -> Vec<Arc<dyn TtsBackend>> {
    let mut chain: Vec<Arc<dyn TtsBackend>> = Vec::new();
    for name in &config.priority {
        let backend: Option<Arc<dyn TtsBackend>> = match name.as_str() {
            "elevenlabs" => match ElevenLabsBackend::new(config.elevenlabs.clone()) {
                Ok(b) => Some(Arc::new(b)),
                Err(e) => {
                    warn!("TTS: elevenlabs init failed: {}", e);
                    None
                }
            },
            "piper" => Some(Arc::new(PiperBackend::new(config.piper.clone()))),
            "openai" => match OpenAiTtsBackend::new(config.openai.clone()) {
                Ok(b) => Some(Arc::new(b)),
                Err(e) => {
                    warn!("TTS: openai init failed: {}", e);
                    None
                }
            },
            "placeholder" => Some(Arc::new(PlaceholderBackend)),
            other => {
                warn!("TTS: unknown backend '{}' in priority chain", other);
                None
            }
        };
        let Some(backend) = backend else { continue };
        if config.offline && backend.requires_network() {
            info!("TTS: offline mode, skipping {}", backend.name());
            continue;
        }
        if !backend.available() {
            info!(
                "TTS: {} unavailable (missing credentials or paths)",
                backend.name()
            );
            continue;
        }
        chain.push(backend);
    }
    chain
}
