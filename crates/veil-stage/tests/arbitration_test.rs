//! End-to-end arbitration: bus in, decision out, barge-in through the
//! synthesis side.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use veil_stage::{monotonic_now, DirectorConfig, EventBus, StageDirector};
use veil_tts::{
    BudgetConfig, SilentOut, SpeakRequest, TtsBackend, TtsManager, TtsResult,
};

/// Synthesizes forever (until cancelled); keeps an utterance in flight.
struct SlowBackend;

#[async_trait]
impl TtsBackend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }
    fn available(&self) -> bool {
        true
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }
    async fn synthesize(&self, _text: &str) -> TtsResult<Vec<u8>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

fn candidate(id: &str, seq: u64, priority: i32, beats: Vec<&str>) -> Value {
    json!({
        "utterance_id": id,
        "seq": seq,
        "final": true,
        "priority": priority,
        "scene": "game",
        "budget_ms": 900,
        "expiry_ts": monotonic_now() + 10.0,
        "safe_mode": "clean",
        "beats": beats,
        "text": "hi"
    })
}

#[tokio::test]
async fn candidate_flows_to_decision_unmodified() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let bus = Arc::new(EventBus::new());
    let mut decisions = bus.subscribe("speak");
    let mut director = StageDirector::new(bus.clone(), DirectorConfig::default(), None);
    tokio::spawn(async move { director.run().await });

    // No prior risk publication: risk defaults to 0, unblocked.
    let mut v = candidate("u1", 0, 1, vec!["banter"]);
    v["anim"] = json!("wave");
    bus.publish("utterance", v);

    let decision = timeout(Duration::from_secs(1), decisions.recv())
        .await
        .expect("decision within one processing step")
        .expect("decision present");
    assert_eq!(decision["utterance_id"], "u1");
    assert_eq!(decision["priority"], 1, "banter does not raise priority 1");
    assert_eq!(decision["text"], "hi");
    assert_eq!(decision["anim"], "wave", "unmodeled keys ride along");
}

#[tokio::test]
async fn barge_in_cancels_the_lower_priority_handle() {
    let bus = Arc::new(EventBus::new());
    let out = Arc::new(SilentOut::new());
    let manager = Arc::new(TtsManager::new(
        vec![Arc::new(SlowBackend)],
        out.clone(),
        BudgetConfig::default(),
    ));
    let mut director =
        StageDirector::new(bus.clone(), DirectorConfig::default(), Some(manager.clone()));

    // Priority 2 becomes the current decision and starts (slow) synthesis.
    assert!(director.process(candidate("low", 0, 2, vec![])).await);
    assert!(manager.is_active("low").await);

    // Priority 5 preempts: the low handle is cancelled before commit.
    assert!(director.process(candidate("high", 0, 5, vec![])).await);
    assert!(!manager.is_active("low").await, "low handle cancelled");
    assert!(manager.is_active("high").await);
    assert!(out.stops() >= 1, "kill-switch fired for the preempted audio");

    manager.cancel("high").await;
}

#[tokio::test]
async fn equal_priority_does_not_barge_in() {
    let bus = Arc::new(EventBus::new());
    let manager = Arc::new(TtsManager::new(
        vec![Arc::new(SlowBackend)],
        Arc::new(SilentOut::new()),
        BudgetConfig::default(),
    ));
    let mut director =
        StageDirector::new(bus.clone(), DirectorConfig::default(), Some(manager.clone()));

    assert!(director.process(candidate("a", 0, 5, vec![])).await);
    assert!(director.process(candidate("b", 0, 5, vec![])).await);
    // First-arriving equal-priority work is not displaced.
    assert!(manager.is_active("a").await);

    manager.cancel("a").await;
    manager.cancel("b").await;
}

#[tokio::test]
async fn risk_gate_drops_low_priority_entirely() {
    let bus = Arc::new(EventBus::new());
    let mut decisions = bus.subscribe("speak");
    let mut director = StageDirector::new(bus.clone(), DirectorConfig::default(), None);

    bus.publish("beats", json!({"risk": 0.9, "phase": "game"}));
    assert!(!director.process(candidate("quip", 0, 1, vec![])).await);
    assert!(decisions.try_recv().is_none(), "no decision published");

    // A raid beat floors priority to 5 and punches through.
    assert!(director.process(candidate("raid1", 0, 1, vec!["raid"])).await);
    let decision = decisions.recv().await.unwrap();
    assert_eq!(decision["utterance_id"], "raid1");
    assert_eq!(decision["priority"], 5);
}

#[tokio::test]
async fn whitespace_text_tracks_nothing_on_the_tts_side() {
    let manager = TtsManager::new(
        vec![Arc::new(SlowBackend)],
        Arc::new(SilentOut::new()),
        BudgetConfig::default(),
    );
    assert!(manager
        .speak(SpeakRequest::text("empty", "   \n"))
        .await
        .is_none());
    assert!(!manager.is_active("empty").await);
}
