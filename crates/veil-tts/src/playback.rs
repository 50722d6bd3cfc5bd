//! Audio output and the interruption kill-switch.
//!
//! `RodioOut` owns a `rodio::Sink`; the `OutputStream` is not `Send`, so it
//! lives on a dedicated thread that parks forever to keep the device open.
//! `stop()` clears the queue immediately — that is the barge-in kill-switch.
//! `SilentOut` is the headless stand-in used by tests and audio-less runs.

use crate::error::TtsResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[cfg(feature = "audio")]
use crate::error::TtsError;
#[cfg(feature = "audio")]
use rodio::{OutputStream, Sink, Source};
#[cfg(feature = "audio")]
use std::io::Cursor;
#[cfg(feature = "audio")]
use std::sync::Arc;
#[cfg(feature = "audio")]
use tracing::info;

/// Something that can play synthesized audio and be silenced mid-flight.
pub trait AudioOut: Send + Sync {
    /// Queue `bytes` (WAV/MP3) for playback, truncated to `cap` when given.
    /// Empty bytes are a no-op.
    fn play(&self, bytes: &[u8], cap: Option<Duration>) -> TtsResult<()>;

    /// Stop playback immediately and clear the queue.
    fn stop(&self);

    /// Whether audio is queued or playing.
    fn is_playing(&self) -> bool;
}

/// Speaker output backed by rodio.
#[cfg(feature = "audio")]
pub struct RodioOut {
    sink: Arc<Sink>,
}

#[cfg(feature = "audio")]
impl RodioOut {
    /// Open the default output device. The stream handle is parked on its
    /// own thread because it is not `Send`.
    pub fn new() -> TtsResult<Self> {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .name("veil-audio-out".to_string())
            .spawn(move || {
                let (stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = tx.send(Err(TtsError::Playback(e.to_string())));
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => Arc::new(sink),
                    Err(e) => {
                        let _ = tx.send(Err(TtsError::Playback(e.to_string())));
                        return;
                    }
                };
                let _ = tx.send(Ok(sink));
                // Keep the stream alive for the life of the process.
                let _keep = stream;
                loop {
                    std::thread::park();
                }
            })?;
        let sink = rx
            .recv()
            .map_err(|e| TtsError::Playback(e.to_string()))??;
        info!("audio: sink ready for TTS playback");
        Ok(Self { sink })
    }
}

#[cfg(feature = "audio")]
impl AudioOut for RodioOut {
    fn play(&self, bytes: &[u8], cap: Option<Duration>) -> TtsResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let cursor = Cursor::new(bytes.to_vec());
        let source = rodio::Decoder::new(cursor)
            .map_err(|e| TtsError::Playback(format!("decode failed: {}", e)))?;
        match cap {
            Some(cap) => self
                .sink
                .append(source.take_duration(cap).convert_samples::<f32>()),
            None => self.sink.append(source.convert_samples::<f32>()),
        }
        self.sink.play();
        Ok(())
    }

    fn stop(&self) {
        self.sink.stop();
        info!("audio: stopped (barge-in or budget cutoff)");
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty()
    }
}

/// Headless output: succeeds instantly, counts calls.
#[derive(Debug, Default)]
pub struct SilentOut {
    plays: AtomicUsize,
    stops: AtomicUsize,
}

impl SilentOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AudioOut for SilentOut {
    fn play(&self, bytes: &[u8], _cap: Option<Duration>) -> TtsResult<()> {
        if !bytes.is_empty() {
            self.plays.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_out_counts_plays_and_stops() {
        let out = SilentOut::new();
        out.play(b"audio", None).unwrap();
        out.play(&[], None).unwrap();
        out.stop();
        assert_eq!(out.plays(), 1);
        assert_eq!(out.stops(), 1);
        assert!(!out.is_playing());
    }
}
