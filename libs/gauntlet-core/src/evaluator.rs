//! Outcome classification and per-candidate aggregation.
//!
//! The sandbox hands over raw probe output; this module decides what it
//! means. Classification priority: compile error, then runtime error,
//! then timeout, then output comparison. Aggregation drives the
//! per-candidate loop and derives `overall_pass` as the conjunction of
//! individual passes.
//!
//! Two operating modes: scored runs execute every test (an incomplete
//! outcome set would bias the score); feedback runs may stop once
//! enough display examples exist on both sides, recording the untested
//! remainder as undetermined rather than pretending it ran.

use crate::error::EngineError;
use crate::policy::CapabilityPolicy;
use crate::protocol::{self, Probe, MAX_SOURCE_CODE_BYTES};
use crate::sandbox::Sandbox;
use crate::types::{
    CandidateProgram, DisplayLimits, EvalMode, EvalOptions, EvaluationResult, ExecutionOutcome,
    OutcomeStatus, TestSuite,
};
use futures_util::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Recorded actual output for a test that hit the wall clock.
pub const TIMEOUT_MARKER: &str = "TIMEOUT";

/// Raw output of one sandboxed probe.
/// Produced by the sandbox, consumed by the evaluator.
#[derive(Debug, Clone, Default)]
pub struct ProbeExecution {
    pub stdout: String,
    pub stderr: String,
    /// Native equality verdict for call probes, computed in-worker.
    pub verdict: Option<bool>,
    /// Value repr or error message, ready for display.
    pub actual: String,
    pub execution_time_ms: u64,
    pub timed_out: bool,
    pub runtime_error: bool,
    pub compile_error: bool,
    /// Internal flag only; the outward classification folds a denied
    /// capability into `RuntimeErrorOrTimeout`.
    pub policy_violation: bool,
}

/// Normalize captured stdout for comparison: trim the ends, strip
/// trailing whitespace per line. Internal spacing and case are
/// preserved.
pub fn normalize_output(output: &str) -> String {
    output
        .trim()
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classify one probe execution into an outcome record.
pub fn classify(exec: &ProbeExecution, probe: &Probe) -> ExecutionOutcome {
    let (status, actual) = if exec.compile_error {
        (OutcomeStatus::CompileError, exec.actual.clone())
    } else if exec.runtime_error {
        (OutcomeStatus::RuntimeErrorOrTimeout, exec.actual.clone())
    } else if exec.timed_out {
        (OutcomeStatus::RuntimeErrorOrTimeout, TIMEOUT_MARKER.to_string())
    } else {
        match probe {
            Probe::Call { .. } => {
                let status = if exec.verdict == Some(true) {
                    OutcomeStatus::Pass
                } else {
                    OutcomeStatus::WrongAnswer
                };
                (status, exec.actual.clone())
            }
            Probe::Stdin { expected, .. } => {
                let status = if normalize_output(&exec.stdout) == normalize_output(expected) {
                    OutcomeStatus::Pass
                } else {
                    OutcomeStatus::WrongAnswer
                };
                (status, exec.stdout.clone())
            }
        }
    };

    ExecutionOutcome {
        status,
        input: probe.display_input().to_string(),
        expected: probe.expected().to_string(),
        actual,
        time_ms: exec.execution_time_ms,
    }
}

/// Evaluate one candidate against one suite.
///
/// Candidate failures of every kind come back inside the result; the
/// only error is a malformed suite, which the caller should drop with a
/// diagnostic instead of scoring.
pub async fn evaluate(
    sandbox: &Sandbox,
    candidate: &CandidateProgram,
    suite: &TestSuite,
    policy: &CapabilityPolicy,
    options: &EvalOptions,
) -> Result<EvaluationResult, EngineError> {
    let started = Instant::now();
    let plan = protocol::build_plan(candidate, suite)?;

    debug!(
        candidate_id = %candidate.id,
        tests = plan.probes.len(),
        mode = ?options.mode,
        timeout_ms = options.timeout_ms,
        "Starting evaluation"
    );

    if candidate.source.len() > MAX_SOURCE_CODE_BYTES {
        warn!(
            candidate_id = %candidate.id,
            source_size = candidate.source.len(),
            "Candidate source exceeds size limit; all tests marked as compile errors"
        );
        let message = format!(
            "source exceeds maximum size of {} bytes",
            MAX_SOURCE_CODE_BYTES
        );
        return Ok(seal(candidate.id, compile_error_outcomes(&plan.probes, &message), started));
    }

    // One parse failure fails every test uniformly, without execution.
    let compile = sandbox
        .check_compile(&plan.source, policy, options.timeout_ms)
        .await;
    if compile.compile_error {
        warn!(
            candidate_id = %candidate.id,
            "Compilation failed; all tests marked as compile errors"
        );
        return Ok(seal(
            candidate.id,
            compile_error_outcomes(&plan.probes, &compile.actual),
            started,
        ));
    }
    if compile.timed_out {
        // Parsing alone ate the budget; running tests would only repeat it.
        let outcomes = plan
            .probes
            .iter()
            .map(|probe| ExecutionOutcome {
                status: OutcomeStatus::RuntimeErrorOrTimeout,
                input: probe.display_input().to_string(),
                expected: probe.expected().to_string(),
                actual: TIMEOUT_MARKER.to_string(),
                time_ms: compile.execution_time_ms,
            })
            .collect();
        return Ok(seal(candidate.id, outcomes, started));
    }

    // Aggregate deadline: per-test budget for each probe plus one slot
    // for the compile pre-check already spent.
    let deadline = started
        + Duration::from_millis(options.timeout_ms.saturating_mul(plan.probes.len() as u64 + 1));

    let mut outcomes = Vec::with_capacity(plan.probes.len());
    let mut pass_count = 0usize;
    let mut fail_count = 0usize;
    let mut skipping = false;

    for probe in &plan.probes {
        if skipping
            || (options.mode == EvalMode::Feedback
                && reached_display_caps(pass_count, fail_count, &options.limits))
        {
            outcomes.push(ExecutionOutcome::undetermined(
                probe.display_input(),
                probe.expected(),
            ));
            continue;
        }
        if Instant::now() >= deadline {
            warn!(
                candidate_id = %candidate.id,
                executed = outcomes.len(),
                total = plan.probes.len(),
                "Aggregate deadline reached; remaining tests undetermined"
            );
            skipping = true;
            outcomes.push(ExecutionOutcome::undetermined(
                probe.display_input(),
                probe.expected(),
            ));
            continue;
        }

        let exec = sandbox
            .run_probe(&plan.source, probe, policy, options.timeout_ms)
            .await;
        let outcome = classify(&exec, probe);
        if outcome.status.is_pass() {
            pass_count += 1;
        } else {
            fail_count += 1;
        }
        outcomes.push(outcome);
    }

    Ok(seal(candidate.id, outcomes, started))
}

/// Evaluate several candidates against the same suite with bounded
/// concurrency. Results come back in input order.
pub async fn evaluate_batch(
    sandbox: &Sandbox,
    candidates: &[CandidateProgram],
    suite: &TestSuite,
    policy: &CapabilityPolicy,
    options: &EvalOptions,
    concurrency: usize,
) -> Vec<Result<EvaluationResult, EngineError>> {
    stream::iter(candidates)
        .map(|candidate| evaluate(sandbox, candidate, suite, policy, options))
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Feedback-mode early stop: enough examples collected on both sides.
fn reached_display_caps(pass_count: usize, fail_count: usize, limits: &DisplayLimits) -> bool {
    match limits.max_tests {
        Some(cap) => pass_count >= cap && fail_count >= cap,
        None => false,
    }
}

fn compile_error_outcomes(probes: &[Probe], message: &str) -> Vec<ExecutionOutcome> {
    probes
        .iter()
        .map(|probe| ExecutionOutcome {
            status: OutcomeStatus::CompileError,
            input: probe.display_input().to_string(),
            expected: probe.expected().to_string(),
            actual: message.to_string(),
            time_ms: 0,
        })
        .collect()
}

fn seal(candidate_id: Uuid, outcomes: Vec<ExecutionOutcome>, started: Instant) -> EvaluationResult {
    let result = EvaluationResult::from_outcomes(
        candidate_id,
        outcomes,
        started.elapsed().as_millis() as u64,
    );
    info!(
        candidate_id = %candidate_id,
        overall_pass = result.overall_pass,
        tests = result.outcomes.len(),
        duration_ms = result.duration_ms,
        "Evaluation completed"
    );
    result
}
