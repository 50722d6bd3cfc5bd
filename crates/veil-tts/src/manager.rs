//! **TtsManager** — orchestrates synthesis with ordered fallback.
//!
//! `speak` registers a playback handle and spawns one unit of work that
//! walks the backend chain in order under per-backend timeouts. Attempts
//! are serialized through a single ordering lock so two utterances never
//! overlap on the speaker, even though everything around the manager is
//! concurrent. Success feeds the budget estimator; total failure is one
//! terminal warning — silence is the only externally visible symptom, and
//! nothing propagates back into arbitration.

use crate::backend::TtsBackend;
use crate::budget::{BudgetConfig, BudgetEstimator};
use crate::error::TtsResult;
use crate::handles::{HandleRegistry, StopHook};
use crate::playback::AudioOut;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How often the unit of work polls the sink while audio drains.
const PLAYBACK_POLL: Duration = Duration::from_millis(20);

static UTT_SEQ: AtomicU64 = AtomicU64::new(0);

/// One request to speak.
#[derive(Debug, Clone)]
pub struct SpeakRequest {
    pub utterance_id: String,
    pub text: String,
    /// Scene tag for budget clamping (e.g. "karaoke", "game", "boss").
    pub scene: String,
    /// Current risk level, for the high-risk budget cap.
    pub risk: f64,
    /// Beat tags (e.g. "dead_air") consulted by the budget estimator.
    pub beats: Vec<String>,
    /// Requested budget ceiling in ms from the plan; 0 = no request.
    pub budget_ms: u64,
}

impl SpeakRequest {
    /// Minimal request: just an id and text.
    pub fn text(utterance_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            utterance_id: utterance_id.into(),
            text: text.into(),
            scene: String::new(),
            risk: 0.0,
            beats: Vec::new(),
            budget_ms: 0,
        }
    }
}

/// Receipt for an accepted speak request.
#[derive(Debug, Clone)]
pub struct PlaybackTicket {
    pub utterance_id: String,
    pub started_at: Instant,
}

/// Synthesis orchestrator: ordered backend chain, handle registry,
/// budget estimator, one speaker.
pub struct TtsManager {
    chain: Vec<Arc<dyn TtsBackend>>,
    out: Arc<dyn AudioOut>,
    registry: Arc<HandleRegistry>,
    estimator: Arc<BudgetEstimator>,
    // Serializes speaks so utterances never overlap on the speaker.
    order: Arc<Mutex<()>>,
    // Which utterance is actually on the speaker right now; stop hooks for
    // anything else (registered but still queued) must not touch the sink.
    now_playing: Arc<StdMutex<Option<String>>>,
}

impl TtsManager {
    pub fn new(
        chain: Vec<Arc<dyn TtsBackend>>,
        out: Arc<dyn AudioOut>,
        budget: BudgetConfig,
    ) -> Self {
        info!(
            "🗣️ TtsManager: chain [{}]",
            chain
                .iter()
                .map(|b| b.name().to_string())
                .collect::<Vec<_>>()
                .join(" → ")
        );
        Self {
            chain,
            out,
            registry: Arc::new(HandleRegistry::new()),
            estimator: Arc::new(BudgetEstimator::new(budget)),
            order: Arc::new(Mutex::new(())),
            now_playing: Arc::new(StdMutex::new(None)),
        }
    }

    pub fn estimator(&self) -> Arc<BudgetEstimator> {
        self.estimator.clone()
    }

    /// Speak `req.text`, trying each backend in order. Returns `None` for
    /// empty/whitespace-only text (nothing to track); otherwise registers a
    /// handle and returns a ticket immediately — the work runs detached.
    pub async fn speak(&self, req: SpeakRequest) -> Option<PlaybackTicket> {
        let text = req.text.trim().to_string();
        if text.is_empty() {
            return None;
        }
        let utterance_id = if req.utterance_id.is_empty() {
            format!("utt-{}", UTT_SEQ.fetch_add(1, Ordering::Relaxed))
        } else {
            req.utterance_id.clone()
        };

        let stop: StopHook = {
            let out = self.out.clone();
            let now_playing = self.now_playing.clone();
            let id = utterance_id.clone();
            Arc::new(move || {
                // Silence the sink only when it is not occupied by a
                // different utterance; cancelling a still-queued job has
                // nothing on the speaker to stop.
                let playing = now_playing.lock().unwrap_or_else(PoisonError::into_inner);
                let other_on_speaker = playing.as_deref().is_some_and(|cur| cur != id);
                if !other_on_speaker {
                    out.stop();
                }
            })
        };
        let generation = self.registry.register(&utterance_id, Some(stop)).await;
        let started_at = Instant::now();

        let job = SpeakJob {
            chain: self.chain.clone(),
            out: self.out.clone(),
            registry: self.registry.clone(),
            estimator: self.estimator.clone(),
            order: self.order.clone(),
            now_playing: self.now_playing.clone(),
            utterance_id: utterance_id.clone(),
            generation,
            text,
            scene: req.scene,
            risk: req.risk,
            beats: req.beats,
            budget_hint_ms: req.budget_ms,
        };
        let task = tokio::spawn(job.run());
        self.registry
            .attach_task(&utterance_id, generation, task)
            .await;

        Some(PlaybackTicket {
            utterance_id,
            started_at,
        })
    }

    /// Cancel an in-flight utterance: stop audio, abort the pending work.
    /// Returns `false` when there was nothing to cancel (already finished
    /// or never started) — a safe no-op.
    pub async fn cancel(&self, utterance_id: &str) -> bool {
        self.registry.cancel(utterance_id).await
    }

    /// Whether `utterance_id` is currently registered as in flight.
    pub async fn is_active(&self, utterance_id: &str) -> bool {
        self.registry.contains(utterance_id).await
    }
}

/// The detached unit of work for one utterance.
struct SpeakJob {
    chain: Vec<Arc<dyn TtsBackend>>,
    out: Arc<dyn AudioOut>,
    registry: Arc<HandleRegistry>,
    estimator: Arc<BudgetEstimator>,
    order: Arc<Mutex<()>>,
    now_playing: Arc<StdMutex<Option<String>>>,
    utterance_id: String,
    generation: u64,
    text: String,
    scene: String,
    risk: f64,
    beats: Vec<String>,
    budget_hint_ms: u64,
}

impl SpeakJob {
    async fn run(self) {
        // One utterance on the speaker at a time.
        let _turn = self.order.lock().await;
        let words = self.text.split_whitespace().count();

        for backend in &self.chain {
            debug!(
                "TTS: backend={} utterance={}",
                backend.name(),
                self.utterance_id
            );
            let t0 = Instant::now();
            match timeout(backend.timeout(), backend.synthesize(&self.text)).await {
                Err(_) => {
                    warn!(
                        "TTS: {} timed out after {:?}",
                        backend.name(),
                        backend.timeout()
                    );
                }
                Ok(Err(e)) => {
                    warn!("TTS: {} failed: {}", backend.name(), e);
                }
                Ok(Ok(bytes)) => {
                    if let Err(e) = self.play(backend.name(), &bytes).await {
                        warn!("TTS: playback failed on {}: {}", backend.name(), e);
                        continue;
                    }
                    let elapsed = t0.elapsed().as_secs_f64().max(0.001);
                    self.estimator
                        .update(backend.name(), words, elapsed)
                        .await;
                    info!(
                        "TTS: spoke {} via {} ({} words, {:.0}ms)",
                        self.utterance_id,
                        backend.name(),
                        words,
                        elapsed * 1000.0
                    );
                    self.registry
                        .remove_if(&self.utterance_id, self.generation)
                        .await;
                    return;
                }
            }
        }

        warn!("TTS: all backends failed for {}", self.utterance_id);
        self.registry
            .remove_if(&self.utterance_id, self.generation)
            .await;
    }

    /// Play the synthesized audio under the clamped time budget, then wait
    /// for it to drain (or cut it off at the budget deadline).
    async fn play(&self, backend: &str, bytes: &[u8]) -> TtsResult<()> {
        if bytes.is_empty() {
            debug!("TTS: {} produced no audio for {}", backend, self.utterance_id);
            return Ok(());
        }
        let words = self.text.split_whitespace().count();
        let mut budget_ms = self
            .estimator
            .estimate_budget_ms(words, backend, &self.scene, self.risk, &self.beats)
            .await;
        if self.budget_hint_ms > 0 {
            budget_ms = budget_ms.min(self.budget_hint_ms);
        }
        let cap = Duration::from_millis(budget_ms);
        self.mark_playing(true);
        if let Err(e) = self.out.play(bytes, Some(cap)) {
            self.mark_playing(false);
            return Err(e);
        }

        let deadline = Instant::now() + cap;
        while self.out.is_playing() {
            if Instant::now() >= deadline {
                self.out.stop();
                break;
            }
            tokio::time::sleep(PLAYBACK_POLL).await;
        }
        self.mark_playing(false);
        Ok(())
    }

    fn mark_playing(&self, on: bool) {
        let mut playing = self
            .now_playing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if on {
            *playing = Some(self.utterance_id.clone());
        } else if playing.as_deref() == Some(self.utterance_id.as_str()) {
            *playing = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PlaceholderBackend;
    use crate::playback::SilentOut;

    fn manager_with_placeholder() -> TtsManager {
        TtsManager::new(
            vec![Arc::new(PlaceholderBackend)],
            Arc::new(SilentOut::new()),
            BudgetConfig::default(),
        )
    }

    #[tokio::test]
    async fn empty_text_is_a_noop() {
        let m = manager_with_placeholder();
        assert!(m.speak(SpeakRequest::text("u1", "   ")).await.is_none());
        assert!(!m.is_active("u1").await);
    }

    #[tokio::test]
    async fn speak_returns_a_ticket_and_finishes() {
        let m = manager_with_placeholder();
        let ticket = m
            .speak(SpeakRequest::text("u1", "hello there"))
            .await
            .expect("non-empty text should be accepted");
        assert_eq!(ticket.utterance_id, "u1");

        // The placeholder backend completes almost immediately; the handle
        // self-removes on natural completion.
        for _ in 0..100 {
            if !m.is_active("u1").await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!m.is_active("u1").await);
        assert!(m.estimator().observed("placeholder").await);
    }

    #[tokio::test]
    async fn cancel_after_finish_reports_nothing_to_cancel() {
        let m = manager_with_placeholder();
        m.speak(SpeakRequest::text("u1", "hi")).await;
        for _ in 0..100 {
            if !m.is_active("u1").await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!m.cancel("u1").await);
    }
}
