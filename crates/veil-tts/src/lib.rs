//! # veil-tts — synthesis orchestration for the VeilDaemon speech core
//!
//! Turns a winning utterance into audible speech via an ordered chain of
//! interchangeable backends, with per-backend timeouts, adaptive time
//! budgets, and cooperative cancellation for barge-in.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        TtsManager                          │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐      │
//! │  │ ElevenLabs  │ → │   Piper     │ → │  OpenAI TTS │      │
//! │  │ (reqwest)   │   │ (subprocess)│   │ (reqwest)   │      │
//! │  └─────────────┘   └─────────────┘   └─────────────┘      │
//! │        ↓ ordered fallback, per-backend timeout             │
//! │  ┌──────────────┐            ┌────────────────────┐       │
//! │  │   AudioOut   │ ← budget ← │  BudgetEstimator   │       │
//! │  │   (rodio)    │    cap     │  (EMA wps/backend) │       │
//! │  └──────────────┘            └────────────────────┘       │
//! │        ↑ stop()                                            │
//! │  ┌──────────────────┐                                      │
//! │  │  HandleRegistry  │ ← cancel(utterance_id)               │
//! │  └──────────────────┘                                      │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod budget;
pub mod config;
pub mod error;
pub mod handles;
pub mod manager;
pub mod playback;

pub use backend::{
    build_chain, ElevenLabsBackend, OpenAiTtsBackend, PiperBackend, PlaceholderBackend,
    TtsBackend,
};
pub use budget::{scene_bounds, BudgetConfig, BudgetEstimator, WpsMeter};
pub use config::{ElevenLabsConfig, OpenAiTtsConfig, PiperConfig, TtsConfig};
pub use error::{TtsError, TtsResult};
pub use handles::{HandleRegistry, PlaybackHandle, StopHook};
pub use manager::{PlaybackTicket, SpeakRequest, TtsManager};
#[cfg(feature = "audio")]
pub use playback::RodioOut;
pub use playback::{AudioOut, SilentOut};
