//! Minimal wiring demo: bus → director → synthesis chain.
//!
//! Publishes a risk snapshot and a few candidates, then prints what the
//! director decided. Uses the placeholder backend and the silent sink so
//! it runs anywhere.
//!
//! Run: cargo run --example stage_demo -p veil-stage

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use veil_stage::{monotonic_now, DirectorConfig, EventBus, StageDirector};
use veil_tts::{BudgetConfig, PlaceholderBackend, SilentOut, TtsManager};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bus = Arc::new(EventBus::new());
    let manager = Arc::new(TtsManager::new(
        vec![Arc::new(PlaceholderBackend)],
        Arc::new(SilentOut::new()),
        BudgetConfig::default(),
    ));

    let mut decisions = bus.subscribe("speak");
    let mut director = StageDirector::new(bus.clone(), DirectorConfig::default(), Some(manager));
    tokio::spawn(async move { director.run().await });

    bus.publish("beats", json!({"risk": 0.1, "phase": "game"}));
    bus.publish(
        "utterance",
        json!({
            "utterance_id": "demo-1", "seq": 0, "final": true, "priority": 1,
            "scene": "game", "budget_ms": 900, "expiry_ts": monotonic_now() + 3.0,
            "safe_mode": "clean", "beats": ["banter"], "text": "setup line"
        }),
    );
    bus.publish(
        "utterance",
        json!({
            "utterance_id": "demo-2", "seq": 0, "final": true, "priority": 1,
            "scene": "game", "budget_ms": 900, "expiry_ts": monotonic_now() + 3.0,
            "safe_mode": "clean", "beats": ["raid"], "text": "RAID!"
        }),
    );

    while let Ok(Some(decision)) = timeout(Duration::from_millis(500), decisions.recv()).await {
        println!(
            "decision: {} (prio {}) -> {:?}",
            decision["utterance_id"], decision["priority"], decision["text"]
        );
    }
}
