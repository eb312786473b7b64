use serde::Serialize;

/// Outcome of a single call to the generation service
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransportError,
    ParseError,
}

/// One attempt made by the model invoker, kept only for the lifetime of a request
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GenerationAttempt {
    /// 1-based attempt counter
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
    /// Delay slept after this attempt before the next one (0 when none)
    pub backoff_applied_ms: u64,
}
