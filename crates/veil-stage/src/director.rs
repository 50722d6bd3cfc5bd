//! **Stage Director** — arbitrates candidate utterances into one spoken decision.
//!
//! Consumes candidates from the bus and risk snapshots from the latest-value
//! cache, then runs a fixed policy pipeline: validate, drop stale and
//! expired chunks, raise priority from beat tags, gate on risk hysteresis
//! and boss phase (both must pass; priority ≥ force floor bypasses both),
//! barge in on anything lower-priority already in flight, and commit. One
//! candidate is processed fully — including its preemption side effect —
//! before the next is read, which gives a total order over decisions with
//! no external locking.

use crate::bus::{EventBus, Subscription};
use crate::config::DirectorConfig;
use crate::plan::{infer_priority, monotonic_now, validate_plan, RiskSnapshot, UtterancePlan};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use veil_tts::{SpeakRequest, TtsManager};

/// The arbitration loop. Owns its state exclusively; nothing here is shared.
pub struct StageDirector {
    bus: Arc<EventBus<Value>>,
    config: DirectorConfig,
    tts: Option<Arc<TtsManager>>,
    inbox: Subscription<Value>,
    current: Option<UtterancePlan>,
    latest_seq: HashMap<String, u64>,
    speaking_blocked: bool,
}

impl StageDirector {
    /// Create a director and subscribe to the candidate topic. Candidates
    /// published after this call are guaranteed to be seen.
    pub fn new(
        bus: Arc<EventBus<Value>>,
        config: DirectorConfig,
        tts: Option<Arc<TtsManager>>,
    ) -> Self {
        let inbox = bus.subscribe(&config.candidate_topic);
        info!(
            "🎭 StageDirector: arbitrating '{}' → '{}'",
            config.candidate_topic, config.decision_topic
        );
        Self {
            bus,
            config,
            tts,
            inbox,
            current: None,
            latest_seq: HashMap::new(),
            speaking_blocked: false,
        }
    }

    /// Process candidates until the candidate topic closes. Idle (awaiting
    /// the next candidate) whenever there is nothing to arbitrate.
    pub async fn run(&mut self) {
        while let Some(value) = self.inbox.recv().await {
            self.process(value).await;
        }
        info!("StageDirector: candidate topic closed, stopping");
    }

    /// Run one candidate through the policy pipeline. Returns `true` when
    /// it was committed as the new decision. Every rejection is silent by
    /// design — stale, expired, and malformed input are normal traffic.
    pub async fn process(&mut self, mut value: Value) -> bool {
        // 1. Schema validation at the boundary.
        let mut plan = match validate_plan(&value) {
            Ok(plan) => plan,
            Err(e) => {
                debug!("director: rejected candidate: {}", e);
                return false;
            }
        };

        // 2. Staleness: per-id seq must strictly increase. An empty id is
        //    exempt from tracking.
        if !plan.utterance_id.is_empty() {
            if let Some(&last) = self.latest_seq.get(&plan.utterance_id) {
                if plan.seq <= last {
                    debug!(
                        "director: stale chunk {}#{} (have {})",
                        plan.utterance_id, plan.seq, last
                    );
                    return false;
                }
            }
            self.latest_seq
                .insert(plan.utterance_id.clone(), plan.seq);
        }

        // 3. Expiry on the monotonic clock; <= 0 means no expiry.
        if plan.expiry_ts > 0.0 && monotonic_now() > plan.expiry_ts {
            debug!("director: expired {}#{}", plan.utterance_id, plan.seq);
            return false;
        }

        // 4. Raise priority from beat tags before any gating.
        infer_priority(&mut plan);

        // 5/6. Risk hysteresis and boss gate, read from the latest snapshot.
        let snapshot = self
            .bus
            .latest(&self.config.risk_topic)
            .and_then(|v| serde_json::from_value::<RiskSnapshot>(v).ok())
            .unwrap_or_default();
        self.update_block_latch(snapshot.risk);

        let mut allow = true;
        if self.speaking_blocked && plan.priority < self.config.gate_floor {
            allow = false;
        }
        if snapshot.phase.eq_ignore_ascii_case("boss") && plan.priority < self.config.gate_floor {
            allow = false;
        }

        // 7. Gated candidates are dropped unless forceful enough to bypass.
        if !allow && plan.priority < self.config.force_floor {
            debug!(
                "director: gated {}#{} (prio {}, risk {:.2}, phase '{}')",
                plan.utterance_id, plan.seq, plan.priority, snapshot.risk, snapshot.phase
            );
            return false;
        }

        // 8. Barge-in: strictly higher priority cancels the in-flight
        //    utterance. Best-effort — a missing handle means it already
        //    finished.
        if let Some(current) = &self.current {
            if plan.priority > current.priority {
                info!(
                    "⚡ director: barge-in, {} (prio {}) preempts {} (prio {})",
                    plan.utterance_id, plan.priority, current.utterance_id, current.priority
                );
                if let Some(tts) = &self.tts {
                    if !current.utterance_id.is_empty()
                        && !tts.cancel(&current.utterance_id).await
                    {
                        debug!(
                            "director: nothing to cancel for {}",
                            current.utterance_id
                        );
                    }
                }
            }
        }

        // 9. Commit. The decision is the incoming object itself with only
        //    the recomputed priority written back, so keys the schema does
        //    not know about (anim, overlay) ride through to consumers.
        self.current = Some(plan.clone());
        value["priority"] = Value::from(plan.priority);
        self.bus.publish(&self.config.decision_topic, value);
        if let Some(tts) = &self.tts {
            tts.speak(SpeakRequest {
                utterance_id: plan.utterance_id.clone(),
                text: plan.text.clone(),
                scene: plan.scene.clone(),
                risk: snapshot.risk,
                beats: plan.beats.clone(),
                budget_ms: plan.budget_ms,
            })
            .await;
        }
        debug!(
            "director: committed {}#{} (prio {})",
            plan.utterance_id, plan.seq, plan.priority
        );
        true
    }

    /// Two-threshold latch: block above `risk_block_on`, unblock only once
    /// risk falls below `risk_block_off`.
    fn update_block_latch(&mut self, risk: f64) {
        if self.speaking_blocked {
            if risk < self.config.risk_block_off {
                self.speaking_blocked = false;
                info!(
                    "director: risk {:.2} below {:.2}, speech unblocked",
                    risk, self.config.risk_block_off
                );
            }
        } else if risk > self.config.risk_block_on {
            self.speaking_blocked = true;
            info!(
                "director: risk {:.2} above {:.2}, speech blocked",
                risk, self.config.risk_block_on
            );
        }
    }

    /// Current hysteresis latch state.
    pub fn speaking_blocked(&self) -> bool {
        self.speaking_blocked
    }

    /// The last committed decision, if any.
    pub fn current_decision(&self) -> Option<&UtterancePlan> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(id: &str, seq: u64, priority: i32) -> Value {
        json!({
            "utterance_id": id,
            "seq": seq,
            "final": true,
            "priority": priority,
            "scene": "game",
            "budget_ms": 900,
            "expiry_ts": 0.0,
            "safe_mode": "clean",
            "beats": [],
            "text": "line"
        })
    }

    fn director(bus: &Arc<EventBus<Value>>) -> StageDirector {
        StageDirector::new(bus.clone(), DirectorConfig::default(), None)
    }

    #[tokio::test]
    async fn malformed_candidates_are_dropped() {
        let bus = Arc::new(EventBus::new());
        let mut d = director(&bus);
        assert!(!d.process(json!("garbage")).await);
        assert!(!d.process(json!({"utterance_id": "u1"})).await);
        assert!(d.current_decision().is_none());
    }

    #[tokio::test]
    async fn stale_sequences_are_dropped() {
        let bus = Arc::new(EventBus::new());
        let mut d = director(&bus);
        assert!(d.process(candidate("u1", 2, 1)).await);
        assert!(!d.process(candidate("u1", 2, 1)).await, "equal seq is stale");
        assert!(!d.process(candidate("u1", 1, 9)).await, "lower seq is stale");
        assert!(d.process(candidate("u1", 3, 1)).await);
    }

    #[tokio::test]
    async fn expired_candidates_are_dropped_regardless_of_priority() {
        let bus = Arc::new(EventBus::new());
        let mut d = director(&bus);
        let mut v = candidate("u1", 0, 9);
        // Anchor the clock, then expire in the past.
        let now = monotonic_now();
        v["expiry_ts"] = json!(now - 1.0);
        assert!(!d.process(v).await);

        let mut fresh = candidate("u2", 0, 1);
        fresh["expiry_ts"] = json!(monotonic_now() + 10.0);
        assert!(d.process(fresh).await);
    }

    #[tokio::test]
    async fn hysteresis_blocks_between_thresholds() {
        let bus = Arc::new(EventBus::new());
        let mut d = director(&bus);

        bus.publish("beats", json!({"risk": 0.5, "phase": "game"}));
        assert!(!d.process(candidate("u1", 0, 1)).await);
        assert!(d.speaking_blocked());

        // Between off (0.35) and on (0.45): the latch holds.
        bus.publish("beats", json!({"risk": 0.40, "phase": "game"}));
        assert!(!d.process(candidate("u1", 1, 1)).await);
        assert!(d.speaking_blocked());

        // Below off: unblocked, candidate goes through.
        bus.publish("beats", json!({"risk": 0.30, "phase": "game"}));
        assert!(d.process(candidate("u1", 2, 1)).await);
        assert!(!d.speaking_blocked());
    }

    #[tokio::test]
    async fn boss_phase_gates_low_priority() {
        let bus = Arc::new(EventBus::new());
        let mut d = director(&bus);
        bus.publish("beats", json!({"risk": 0.0, "phase": "boss"}));
        assert!(!d.process(candidate("u1", 0, 2)).await);
        assert!(d.process(candidate("u2", 0, 3)).await, "floor 3 passes");
    }

    #[tokio::test]
    async fn forced_priority_bypasses_both_gates() {
        let bus = Arc::new(EventBus::new());
        let mut d = director(&bus);
        bus.publish("beats", json!({"risk": 0.9, "phase": "boss"}));
        // Blocked AND boss: priority 4 still goes through.
        assert!(d.process(candidate("u1", 0, 4)).await);
        assert!(d.speaking_blocked());
    }

    #[tokio::test]
    async fn beat_floor_applies_before_the_gates() {
        let bus = Arc::new(EventBus::new());
        let mut d = director(&bus);
        bus.publish("beats", json!({"risk": 0.0, "phase": "boss"}));
        let mut v = candidate("u1", 0, 1);
        v["beats"] = json!(["raid"]);
        assert!(d.process(v).await, "raid floors priority to 5");
        assert_eq!(d.current_decision().map(|p| p.priority), Some(5));
    }

    #[tokio::test]
    async fn equal_priority_does_not_displace_current() {
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe("speak");
        let mut d = director(&bus);
        assert!(d.process(candidate("u1", 0, 3)).await);
        // A later equal-priority arrival still commits (supersedes) but
        // must not be treated as preemption; with no TTS wired this is
        // observable through both decisions appearing in order.
        assert!(d.process(candidate("u2", 0, 3)).await);
        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(first["utterance_id"], "u1");
        assert_eq!(second["utterance_id"], "u2");
    }

    #[tokio::test]
    async fn decision_carries_extra_keys_through() {
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe("speak");
        let mut d = director(&bus);
        let mut v = candidate("u1", 0, 1);
        v["anim"] = json!("wave");
        v["overlay"] = json!("confetti");
        v["beats"] = json!(["raid"]);
        assert!(d.process(v).await);
        // Overlay consumers read fields the schema never modeled; the
        // decision must be the candidate object, not a re-serialization.
        let decision = sub.recv().await.unwrap();
        assert_eq!(decision["anim"], "wave");
        assert_eq!(decision["overlay"], "confetti");
        assert_eq!(decision["priority"], 5, "only priority is rewritten");
    }

    #[tokio::test]
    async fn decision_is_published_with_inferred_priority_only() {
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe("speak");
        let mut d = director(&bus);
        let mut v = candidate("u1", 0, 1);
        v["beats"] = json!(["banter"]);
        v["expiry_ts"] = json!(monotonic_now() + 10.0);
        assert!(d.process(v).await);
        let decision = sub.recv().await.unwrap();
        assert_eq!(decision["utterance_id"], "u1");
        assert_eq!(decision["priority"], 1, "banter floors at 1, no raise");
        assert_eq!(decision["text"], "line");
    }
}
