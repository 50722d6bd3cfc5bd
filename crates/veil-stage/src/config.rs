//! Configuration for the Stage Director.

/// Arbitration policy knobs. Defaults match long-observed daemon behavior.
#[derive(Debug, Clone)]
pub struct DirectorConfig {
    /// Risk level above which speech becomes blocked (default 0.45).
    pub risk_block_on: f64,
    /// Risk level below which a blocked stage unblocks (default 0.35).
    /// Strictly lower than `risk_block_on` to avoid flapping.
    pub risk_block_off: f64,
    /// Minimum priority allowed through while blocked or in boss phase
    /// (default 3).
    pub gate_floor: i32,
    /// Priority at or above which a candidate bypasses both gates
    /// (default 4).
    pub force_floor: i32,
    /// Topic carrying candidate utterances (default "utterance").
    pub candidate_topic: String,
    /// Topic carrying risk telemetry snapshots (default "beats").
    pub risk_topic: String,
    /// Topic winning decisions are published on (default "speak").
    pub decision_topic: String,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            risk_block_on: 0.45,
            risk_block_off: 0.35,
            gate_floor: 3,
            force_floor: 4,
            candidate_topic: "utterance".to_string(),
            risk_topic: "beats".to_string(),
            decision_topic: "speak".to_string(),
        }
    }
}
