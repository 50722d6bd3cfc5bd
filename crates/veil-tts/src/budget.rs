//! **Budget Estimator** — adaptive per-backend throughput and scene pacing caps.
//!
//! Backends have wildly different real-world throughput; a smoothed
//! words-per-second estimate per backend keeps a slow backend from blowing
//! through pacing budgets tuned for a fast one. The estimate feeds
//! `estimate_budget_ms`, which clamps the raw projection against scene
//! bounds, a high-risk cap, a `dead_air` beat cap, and a global hard cap.
//! The tightest applicable cap always wins.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Exponential moving average of words-per-second for one backend.
#[derive(Debug, Clone)]
pub struct WpsMeter {
    alpha: f64,
    ema: Option<f64>,
}

impl WpsMeter {
    /// Create a meter. `alpha` is clamped to [0.01, 1.0]; higher = more reactive.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.01, 1.0),
            ema: None,
        }
    }

    /// Fold one completed attempt into the average. No-op when `seconds <= 0`.
    pub fn update(&mut self, words: usize, seconds: f64) -> f64 {
        if seconds <= 0.0 {
            return self.ema.unwrap_or(0.0);
        }
        let wps = words as f64 / seconds;
        let next = match self.ema {
            None => wps,
            Some(prev) => self.alpha * wps + (1.0 - self.alpha) * prev,
        };
        self.ema = Some(next);
        next
    }

    /// Current average, if any sample has landed.
    pub fn value(&self) -> Option<f64> {
        self.ema
    }
}

/// Tunable constants for budget estimation.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// EMA smoothing factor (default 0.3).
    pub alpha: f64,
    /// Seed words-per-second for backends with no history yet (default 3.5).
    pub default_wps: f64,
    /// Global hard ceiling in milliseconds (default 2000).
    pub hard_cap_ms: u64,
    /// Ceiling applied once `risk >= risk_cap_threshold` (default 500).
    pub risk_cap_ms: u64,
    /// Risk level at which the risk ceiling kicks in (default 0.6).
    pub risk_cap_threshold: f64,
    /// Ceiling applied when a `dead_air` beat is present (default 2000).
    pub dead_air_cap_ms: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            default_wps: 3.5,
            hard_cap_ms: 2000,
            risk_cap_ms: 500,
            risk_cap_threshold: 0.6,
            dead_air_cap_ms: 2000,
        }
    }
}

/// (min_ms, max_ms) pacing bounds for a scene tag.
pub fn scene_bounds(scene: &str) -> (u64, u64) {
    match scene.to_ascii_lowercase().as_str() {
        "karaoke" => (400, 700),
        "game" => (600, 1200),
        "react" | "chat" => (1200, 2000),
        "boss" | "high-risk" | "high_risk" => (300, 500),
        _ => (800, 1500),
    }
}

/// Per-backend throughput meters plus the clamp policy.
pub struct BudgetEstimator {
    config: BudgetConfig,
    meters: Mutex<HashMap<String, WpsMeter>>,
}

impl BudgetEstimator {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            meters: Mutex::new(HashMap::new()),
        }
    }

    /// Fold one completed attempt into `backend`'s estimate.
    pub async fn update(&self, backend: &str, words: usize, seconds: f64) {
        if seconds <= 0.0 {
            return;
        }
        let mut meters = self.meters.lock().await;
        let alpha = self.config.alpha;
        let meter = meters
            .entry(backend.to_string())
            .or_insert_with(|| WpsMeter::new(alpha));
        let wps = meter.update(words, seconds);
        debug!("budget: {} now at {:.2} wps", backend, wps);
    }

    /// Smoothed words-per-second for `backend`, seeded with the default.
    pub async fn wps(&self, backend: &str) -> f64 {
        let meters = self.meters.lock().await;
        meters
            .get(backend)
            .and_then(|m| m.value())
            .filter(|w| *w > 0.0)
            .unwrap_or(self.config.default_wps)
    }

    /// Whether `backend` has at least one recorded sample.
    pub async fn observed(&self, backend: &str) -> bool {
        let meters = self.meters.lock().await;
        meters.get(backend).and_then(|m| m.value()).is_some()
    }

    /// Milliseconds an utterance of `words` words may occupy on `backend`
    /// in `scene`, given current risk and beat tags.
    pub async fn estimate_budget_ms(
        &self,
        words: usize,
        backend: &str,
        scene: &str,
        risk: f64,
        beats: &[String],
    ) -> u64 {
        let wps = self.wps(backend).await;
        let raw = ((words as f64 / wps) * 1000.0).round() as u64;
        let (scene_min, scene_max) = scene_bounds(scene);

        let mut cap = scene_max;
        if risk >= self.config.risk_cap_threshold {
            cap = cap.min(self.config.risk_cap_ms);
        }
        if beats.iter().any(|b| b == "dead_air") {
            cap = cap.min(self.config.dead_air_cap_ms);
        }
        cap = cap.min(self.config.hard_cap_ms);

        // The floor yields to the cap when they cross.
        raw.clamp(scene_min.min(cap), cap)
    }
}

impl Default for BudgetEstimator {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}
