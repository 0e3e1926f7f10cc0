use thiserror::Error;

/// Errors the engine surfaces to its caller.
///
/// Candidate failures are never errors: a crash, a denied import, a
/// timeout or a syntax error inside the sandbox becomes a failing
/// `ExecutionOutcome`. What remains is small: a broken policy source is
/// the one condition allowed to abort a run, and a malformed test
/// record means the task should be dropped with a diagnostic, not run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("capability policy unavailable: {0}")]
    PolicyConfig(String),

    #[error("malformed test spec: {0}")]
    MalformedTestSpec(String),
}
