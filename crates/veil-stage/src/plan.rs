//! Candidate utterance schema and the beat priority ladder.
//!
//! Payloads arrive on the bus as loose JSON; `validate_plan` is the one
//! place they become typed. Extra keys are allowed, missing or mistyped
//! keys fail validation, and nothing downstream ever probes raw JSON again.

use crate::error::{StageError, StageResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Instant;

/// A proposed thing to say, with identity, ordering, and gating metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtterancePlan {
    /// Stable identity across re-sends of the same logical utterance.
    pub utterance_id: String,
    /// Monotonically increasing per `utterance_id`; lower or equal = stale.
    pub seq: u64,
    /// Whether this is the last chunk for the id.
    #[serde(rename = "final")]
    pub is_final: bool,
    /// Higher = more urgent. May be raised (never lowered) by beat tags.
    pub priority: i32,
    /// Scene tag (e.g. "karaoke", "game", "boss").
    pub scene: String,
    /// Requested time-budget ceiling in milliseconds.
    pub budget_ms: u64,
    /// Monotonic expiry in seconds; `<= 0` means no expiry.
    pub expiry_ts: f64,
    /// Safety mode tag, carried as opaque metadata.
    pub safe_mode: String,
    /// Beat labels (e.g. "raid", "banter") consulted for priority floors.
    pub beats: Vec<String>,
    /// The payload to speak.
    pub text: String,
}

/// Latest risk/context telemetry. Read as a snapshot, never queued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    #[serde(default)]
    pub risk: f64,
    #[serde(default)]
    pub phase: String,
}

/// Validate a bus payload into a typed plan. This is the boundary's only
/// defense against malformed input; callers drop failures silently.
pub fn validate_plan(value: &Value) -> StageResult<UtterancePlan> {
    if !value.is_object() {
        return Err(StageError::Schema("candidate is not an object".to_string()));
    }
    serde_json::from_value(value.clone()).map_err(|e| StageError::Schema(e.to_string()))
}

/// Priority floor for a known beat label.
pub fn beat_floor(beat: &str) -> Option<i32> {
    match beat {
        "raid" => Some(5),
        "donation" => Some(4),
        "near_miss" => Some(3),
        "killstreak" => Some(2),
        "banter" => Some(1),
        _ => None,
    }
}

/// Raise the plan's priority to the highest floor among its beats.
/// Upstream may under-specify priority; tags only ever raise it, never
/// lower it.
pub fn infer_priority(plan: &mut UtterancePlan) {
    for beat in &plan.beats {
        if let Some(floor) = beat_floor(beat) {
            plan.priority = plan.priority.max(floor);
        }
    }
}

static MONO_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Seconds on the process-local monotonic clock. `expiry_ts` values are
/// produced and compared on this clock only.
pub fn monotonic_now() -> f64 {
    MONO_EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn good_plan() -> Value {
        json!({
            "utterance_id": "u1",
            "seq": 0,
            "final": true,
            "priority": 1,
            "scene": "game",
            "budget_ms": 900,
            "expiry_ts": 0.0,
            "safe_mode": "clean",
            "beats": ["banter"],
            "text": "hi"
        })
    }

    #[test]
    fn valid_plan_passes() {
        let plan = validate_plan(&good_plan()).unwrap();
        assert_eq!(plan.utterance_id, "u1");
        assert!(plan.is_final);
        assert_eq!(plan.beats, vec!["banter"]);
    }

    #[test]
    fn missing_field_fails() {
        let mut v = good_plan();
        v.as_object_mut().unwrap().remove("text");
        assert!(validate_plan(&v).is_err());
    }

    #[test]
    fn wrong_type_fails() {
        let mut v = good_plan();
        v["priority"] = json!("high");
        assert!(validate_plan(&v).is_err());
    }

    #[test]
    fn negative_seq_fails() {
        let mut v = good_plan();
        v["seq"] = json!(-1);
        assert!(validate_plan(&v).is_err());
    }

    #[test]
    fn extra_keys_are_allowed() {
        let mut v = good_plan();
        v["anim"] = json!("wave");
        assert!(validate_plan(&v).is_ok());
    }

    #[test]
    fn non_object_fails() {
        assert!(validate_plan(&json!("nope")).is_err());
    }

    #[test]
    fn integer_expiry_is_accepted() {
        let mut v = good_plan();
        v["expiry_ts"] = json!(12);
        assert!(validate_plan(&v).is_ok());
    }

    #[test]
    fn ladder_raises_but_never_lowers() {
        let mut plan = validate_plan(&good_plan()).unwrap();
        plan.priority = 1;
        plan.beats = vec!["raid".to_string()];
        infer_priority(&mut plan);
        assert_eq!(plan.priority, 5);

        // A low-floor beat does not demote a high stated priority.
        plan.priority = 4;
        plan.beats = vec!["banter".to_string()];
        infer_priority(&mut plan);
        assert_eq!(plan.priority, 4);
    }

    #[test]
    fn unknown_beats_are_ignored() {
        let mut plan = validate_plan(&good_plan()).unwrap();
        plan.priority = 2;
        plan.beats = vec!["mystery".to_string()];
        infer_priority(&mut plan);
        assert_eq!(plan.priority, 2);
    }

    #[test]
    fn risk_snapshot_defaults() {
        let snap: RiskSnapshot = serde_json::from_value(json!({})).unwrap();
        assert_eq!(snap.risk, 0.0);
        assert_eq!(snap.phase, "");
    }

    #[test]
    fn monotonic_clock_advances() {
        let a = monotonic_now();
        let b = monotonic_now();
        assert!(b >= a);
    }
}
