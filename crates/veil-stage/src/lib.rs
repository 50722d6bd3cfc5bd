//! # veil-stage — speech arbitration for the VeilDaemon companion
//!
//! The always-on core that decides which candidate utterance is actually
//! spoken, when, and at whose expense. Candidates and risk telemetry flow
//! in over the [`bus`]; the [`director`] validates, orders, gates, and
//! preempts; winning decisions flow out on the bus and into `veil-tts`.
//!
//! ## Architecture
//!
//! ```text
//!  "utterance" ──┐                      ┌──→ "speak" (decision out)
//!                ▼                      │
//!         ┌──────────────┐      ┌───────────────┐
//!         │  EventBus    │ ───→ │ StageDirector │
//!         │ (latest+sub) │      │  validate     │
//!         └──────────────┘      │  stale/expiry │
//!                ▲              │  hysteresis   │
//!  "beats" ──────┘              │  barge-in ────┼──→ TtsManager.cancel
//!   (risk snapshots)            └───────────────┘        │
//!                                       │                ▼
//!                                       └──── speak ──→ audio
//! ```

pub mod bus;
pub mod config;
pub mod director;
pub mod error;
pub mod plan;

pub use bus::{EventBus, Subscription, DEFAULT_INBOX_CAPACITY};
pub use config::DirectorConfig;
pub use director::StageDirector;
pub use error::{StageError, StageResult};
pub use plan::{
    beat_floor, infer_priority, monotonic_now, validate_plan, RiskSnapshot, UtterancePlan,
};
