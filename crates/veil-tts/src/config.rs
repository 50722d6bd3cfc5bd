//! Configuration for the synthesis chain.
//!
//! Plain structs with defaults, plus `from_env()` reading the same surface
//! the daemon has always used: `TTS_PRIORITY` (csv), `ELEVENLABS_*`,
//! `PIPER_EXE`/`PIPER_MODEL`, `TTS_API_URL`/`TTS_API_KEY`, and
//! `VEIL_MODE=offline` to keep network backends out of the chain.

use crate::budget::BudgetConfig;
use std::path::PathBuf;
use std::time::Duration;

/// ElevenLabs backend settings.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    /// API key (`ELEVENLABS_API_KEY`). Empty = backend unavailable.
    pub api_key: String,
    /// Voice id (`ELEVENLABS_VOICE`). Empty = backend unavailable.
    pub voice: String,
    /// Model id (default `eleven_multilingual_v2`).
    pub model_id: String,
    /// Per-attempt timeout (default 25s).
    pub timeout: Duration,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice: String::new(),
            model_id: "eleven_multilingual_v2".to_string(),
            timeout: Duration::from_secs(25),
        }
    }
}

/// Piper subprocess backend settings.
#[derive(Debug, Clone)]
pub struct PiperConfig {
    /// Path to the piper executable (`PIPER_EXE`).
    pub exe: PathBuf,
    /// Path to the voice model (`PIPER_MODEL`).
    pub model: PathBuf,
    /// Per-attempt timeout (default 20s).
    pub timeout: Duration,
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            exe: PathBuf::new(),
            model: PathBuf::new(),
            timeout: Duration::from_secs(20),
        }
    }
}

/// OpenAI-compatible `/audio/speech` backend settings.
#[derive(Debug, Clone)]
pub struct OpenAiTtsConfig {
    /// Base URL without trailing slash (default `https://api.openai.com/v1`).
    pub base_url: String,
    /// Bearer API key (`TTS_API_KEY`). Empty = backend unavailable.
    pub api_key: String,
    /// Model (default `tts-1`).
    pub model: String,
    /// Voice name (default `shimmer`).
    pub voice: String,
    /// Per-attempt timeout (default 30s).
    pub timeout: Duration,
}

impl Default for OpenAiTtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "tts-1".to_string(),
            voice: "shimmer".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Top-level synthesis configuration.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Ordered backend chain (default `elevenlabs, piper, openai`).
    pub priority: Vec<String>,
    /// When true, network backends are dropped from the chain.
    pub offline: bool,
    pub elevenlabs: ElevenLabsConfig,
    pub piper: PiperConfig,
    pub openai: OpenAiTtsConfig,
    pub budget: BudgetConfig,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            priority: vec![
                "elevenlabs".to_string(),
                "piper".to_string(),
                "openai".to_string(),
            ],
            offline: false,
            elevenlabs: ElevenLabsConfig::default(),
            piper: PiperConfig::default(),
            openai: OpenAiTtsConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

impl TtsConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(priority) = std::env::var("TTS_PRIORITY") {
            let names: Vec<String> = priority
                .split(',')
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect();
            if !names.is_empty() {
                config.priority = names;
            }
        }
        config.offline = std::env::var("VEIL_MODE")
            .map(|m| m.trim().eq_ignore_ascii_case("offline"))
            .unwrap_or(false);

        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            config.elevenlabs.api_key = key.trim().to_string();
        }
        if let Ok(voice) = std::env::var("ELEVENLABS_VOICE") {
            config.elevenlabs.voice = voice.trim().to_string();
        }
        if let Ok(model) = std::env::var("ELEVENLABS_MODEL_ID") {
            config.elevenlabs.model_id = model.trim().to_string();
        }

        if let Ok(exe) = std::env::var("PIPER_EXE") {
            config.piper.exe = PathBuf::from(exe.trim());
        }
        if let Ok(model) = std::env::var("PIPER_MODEL") {
            config.piper.model = PathBuf::from(model.trim());
        }

        if let Ok(url) = std::env::var("TTS_API_URL") {
            config.openai.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Ok(key) = std::env::var("TTS_API_KEY") {
            config.openai.api_key = key.trim().to_string();
        }
        if let Ok(model) = std::env::var("TTS_MODEL") {
            config.openai.model = model.trim().to_string();
        }
        if let Ok(voice) = std::env::var("TTS_VOICE") {
            config.openai.voice = voice.trim().to_string();
        }

        config
    }
}
