//! Verification engine for machine-generated candidate programs.
//!
//! A benchmark loop hands the engine one candidate program and a test
//! suite; the engine runs the candidate under a capability policy and a
//! hard timeout, classifies every test outcome, and renders bounded
//! feedback for the next attempt.
//!
//! Layering mirrors the split between execution and judgement:
//! - `sandbox` knows HOW to run untrusted code (isolated worker
//!   processes, forced kill on timeout, captured stdio)
//! - `evaluator` knows what the raw outputs MEAN (pass, wrong answer,
//!   runtime error or timeout, compile error)
//! - `feedback` turns classified outcomes into truncated diagnostics
//! - `stats` scores whole benchmark runs (pass@k)

pub mod error;
pub mod evaluator;
pub mod feedback;
pub mod policy;
pub mod protocol;
pub mod sandbox;
pub mod stats;
pub mod types;

pub use error::EngineError;
pub use evaluator::{evaluate, evaluate_batch, ProbeExecution};
pub use feedback::{render, FeedbackReport};
pub use policy::CapabilityPolicy;
pub use sandbox::Sandbox;
pub use stats::{accuracy, pass_at_k, pass_at_k_aggregate, TaskAttempts};
pub use types::{
    CandidateProgram, DisplayLimits, EvalMode, EvalOptions, EvalRequest, EvalResponse,
    EvaluationResult, ExecutionOutcome, OutcomeStatus, TestCase, TestSuite,
};
