//! **Playback Handle Registry** — the single source of truth for what
//! utterance is in flight and how to stop it.
//!
//! Every `speak` registers a handle keyed by utterance id; a handle carries
//! the abortable unit of work plus a stop hook that silences audio already
//! in the sink. Cancelling is idempotent and best-effort: a missing handle
//! means the utterance already finished, which is not an error. A unit of
//! work removes its own entry as its final step, so the registry never
//! accumulates stale entries.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Hook that stops audio output for an in-flight utterance.
pub type StopHook = Arc<dyn Fn() + Send + Sync>;

/// One in-flight synthesis + playback operation.
pub struct PlaybackHandle {
    pub utterance_id: String,
    pub started_at: Instant,
    generation: u64,
    task: Option<JoinHandle<()>>,
    stop: Option<StopHook>,
}

impl PlaybackHandle {
    fn cancel(&self) {
        if let Some(stop) = &self.stop {
            stop();
        }
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("utterance_id", &self.utterance_id)
            .field("started_at", &self.started_at)
            .field("generation", &self.generation)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

/// Registry of in-flight playback handles, keyed by utterance id.
#[derive(Default)]
pub struct HandleRegistry {
    by_id: Mutex<HashMap<String, PlaybackHandle>>,
    next_gen: AtomicU64,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle for `utterance_id` and return its generation. A
    /// re-register of the same id replaces the old handle; the generation
    /// tells the replaced job's cleanup apart from the live one. The unit
    /// of work is attached separately via
    /// [`attach_task`](Self::attach_task) once spawned, so the handle
    /// exists before the task can possibly run.
    pub async fn register(&self, utterance_id: &str, stop: Option<StopHook>) -> u64 {
        let generation = self.next_gen.fetch_add(1, Ordering::Relaxed);
        let handle = PlaybackHandle {
            utterance_id: utterance_id.to_string(),
            started_at: Instant::now(),
            generation,
            task: None,
            stop,
        };
        self.by_id
            .lock()
            .await
            .insert(utterance_id.to_string(), handle);
        generation
    }

    /// Attach the spawned unit of work to the handle it was registered
    /// under. When that handle is gone or already replaced by a newer
    /// registration for the same id, the superseded task is aborted
    /// instead of left running without an owner.
    pub async fn attach_task(&self, utterance_id: &str, generation: u64, task: JoinHandle<()>) {
        let mut by_id = self.by_id.lock().await;
        match by_id.get_mut(utterance_id) {
            Some(handle) if handle.generation == generation => {
                handle.task = Some(task);
            }
            _ => {
                debug!("handles: {} superseded before attach", utterance_id);
                task.abort();
            }
        }
    }

    /// Drop the entry for `utterance_id` only while it still belongs to
    /// `generation`. A finished job uses this for its own cleanup so it
    /// never deletes a replacement registered under the same id.
    pub async fn remove_if(&self, utterance_id: &str, generation: u64) -> bool {
        let mut by_id = self.by_id.lock().await;
        if by_id.get(utterance_id).map(|h| h.generation) == Some(generation) {
            by_id.remove(utterance_id);
            true
        } else {
            false
        }
    }

    /// Cancel the in-flight operation for `utterance_id`. Returns `false`
    /// when there was nothing to cancel.
    pub async fn cancel(&self, utterance_id: &str) -> bool {
        let handle = self.by_id.lock().await.remove(utterance_id);
        match handle {
            Some(handle) => {
                handle.cancel();
                debug!("handles: cancelled {}", utterance_id);
                true
            }
            None => false,
        }
    }

    /// Whether `utterance_id` is currently in flight.
    pub async fn contains(&self, utterance_id: &str) -> bool {
        self.by_id.lock().await.contains_key(utterance_id)
    }

    pub async fn len(&self) -> usize {
        self.by_id.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.by_id.lock().await.is_empty()
    }
}
