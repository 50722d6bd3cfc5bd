//! Speak one line through the configured backend chain.
//!
//! Configure via env (TTS_PRIORITY, ELEVENLABS_*, PIPER_EXE/PIPER_MODEL,
//! TTS_API_URL/TTS_API_KEY). Falls back to the silent sink when no audio
//! device is present.
//!
//! Run: cargo run --example speak_demo -p veil-tts

use std::sync::Arc;
use std::time::Duration;
use veil_tts::{build_chain, AudioOut, RodioOut, SilentOut, SpeakRequest, TtsConfig, TtsManager};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = TtsConfig::from_env();
    let mut chain = build_chain(&config);
    if chain.is_empty() {
        println!("No configured backend is available; using the placeholder.");
        chain = vec![Arc::new(veil_tts::PlaceholderBackend)];
    }

    let out: Arc<dyn AudioOut> = match RodioOut::new() {
        Ok(out) => Arc::new(out),
        Err(e) => {
            println!("No audio device ({}); running silent.", e);
            Arc::new(SilentOut::new())
        }
    };

    let manager = TtsManager::new(chain, out, config.budget.clone());
    let ticket = manager
        .speak(SpeakRequest::text("demo-1", "The stage is yours."))
        .await;
    println!("ticket: {:?}", ticket);

    // Give the detached unit of work time to walk the chain.
    for _ in 0..200 {
        if !manager.is_active("demo-1").await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    println!("done");
}
