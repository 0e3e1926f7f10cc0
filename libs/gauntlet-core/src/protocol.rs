//! Test protocol adapter.
//!
//! Turns heterogeneous test records into uniform executable probes so
//! the sandbox and evaluator never branch on dataset shape. Assertion
//! cases become entry-point calls judged by the candidate language's
//! own structural equality; IO cases become stdin payloads judged by
//! captured stdout. Malformed records are rejected here, before
//! anything executes.

use crate::error::EngineError;
use crate::types::{CandidateProgram, TestCase, TestSuite};

/// Safety limits applied before any candidate reaches a worker process.
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Import made available to every candidate; generated code leans on
/// type annotations without declaring the import itself.
const TYPING_PRELUDE: &str = "from typing import *";

/// Executable form of one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Evaluate `call` against the candidate and compare the returned
    /// value with `expected` using native equality, inside the worker.
    Call { call: String, expected: String },
    /// Feed `input` on stdin; the evaluator compares captured stdout
    /// with `expected` under output normalization.
    Stdin { input: String, expected: String },
}

impl Probe {
    /// Display form of the probe input for outcome records and feedback.
    pub fn display_input(&self) -> &str {
        match self {
            Probe::Call { call, .. } => call,
            Probe::Stdin { input, .. } => input,
        }
    }

    pub fn expected(&self) -> &str {
        match self {
            Probe::Call { expected, .. } => expected,
            Probe::Stdin { expected, .. } => expected,
        }
    }
}

/// A candidate prepared for execution: the composed source plus the
/// ordered probes to run against it.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    pub source: String,
    pub probes: Vec<Probe>,
}

/// Normalize a suite into an executable plan.
///
/// The composed source stitches the typing import, the suite prelude
/// (dataset setup code) and the candidate, in that order. Each case is
/// validated structurally; the first malformed record fails the whole
/// suite so the caller can drop the task with a diagnostic instead of
/// scoring garbage.
pub fn build_plan(candidate: &CandidateProgram, suite: &TestSuite) -> Result<ProbePlan, EngineError> {
    let mut probes = Vec::with_capacity(suite.cases.len());

    for (index, case) in suite.cases.iter().enumerate() {
        match case {
            TestCase::Assertion { call, expected } => {
                if call.trim().is_empty() {
                    return Err(EngineError::MalformedTestSpec(format!(
                        "test {} has an empty call expression",
                        index
                    )));
                }
                if expected.trim().is_empty() {
                    return Err(EngineError::MalformedTestSpec(format!(
                        "test {} has an empty expected expression",
                        index
                    )));
                }
                probes.push(Probe::Call {
                    call: call.clone(),
                    expected: expected.clone(),
                });
            }
            TestCase::Io { input, expected } => {
                if input.len() > MAX_TEST_INPUT_BYTES {
                    return Err(EngineError::MalformedTestSpec(format!(
                        "test {} input exceeds maximum size of {} bytes",
                        index, MAX_TEST_INPUT_BYTES
                    )));
                }
                probes.push(Probe::Stdin {
                    input: input.clone(),
                    expected: expected.clone(),
                });
            }
        }
    }

    Ok(ProbePlan {
        source: compose_source(candidate, suite),
        probes,
    })
}

fn compose_source(candidate: &CandidateProgram, suite: &TestSuite) -> String {
    let mut source = String::from(TYPING_PRELUDE);
    source.push('\n');
    if let Some(prelude) = &suite.prelude {
        source.push_str(prelude);
        source.push('\n');
    }
    source.push_str(&candidate.source);
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candidate(source: &str) -> CandidateProgram {
        CandidateProgram::new(source)
    }

    #[test]
    fn test_assertion_case_becomes_call_probe() {
        let suite = TestSuite::new(vec![TestCase::assertion("add(1, 2)", "3")]);
        let plan = build_plan(&make_candidate("def add(a, b):\n    return a + b"), &suite)
            .expect("plan should build");

        assert_eq!(
            plan.probes,
            vec![Probe::Call {
                call: "add(1, 2)".to_string(),
                expected: "3".to_string(),
            }]
        );
    }

    #[test]
    fn test_io_case_becomes_stdin_probe() {
        let suite = TestSuite::new(vec![TestCase::io("1 2\n", "3\n")]);
        let plan = build_plan(&make_candidate("print(3)"), &suite).expect("plan should build");

        assert_eq!(
            plan.probes,
            vec![Probe::Stdin {
                input: "1 2\n".to_string(),
                expected: "3\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_composed_source_order() {
        let suite = TestSuite::new(vec![TestCase::assertion("f()", "1")])
            .with_prelude("import math");
        let plan = build_plan(&make_candidate("def f():\n    return 1"), &suite)
            .expect("plan should build");

        let lines: Vec<&str> = plan.source.lines().collect();
        assert_eq!(lines[0], "from typing import *");
        assert_eq!(lines[1], "import math");
        assert_eq!(lines[2], "def f():");
    }

    #[test]
    fn test_empty_call_is_malformed() {
        let suite = TestSuite::new(vec![TestCase::assertion("   ", "3")]);
        let result = build_plan(&make_candidate("x = 1"), &suite);

        match result {
            Err(EngineError::MalformedTestSpec(msg)) => {
                assert!(msg.contains("empty call"));
            }
            other => panic!("expected MalformedTestSpec, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_expected_is_malformed() {
        let suite = TestSuite::new(vec![TestCase::assertion("f()", "")]);
        let result = build_plan(&make_candidate("x = 1"), &suite);

        assert!(matches!(result, Err(EngineError::MalformedTestSpec(_))));
    }

    #[test]
    fn test_oversized_input_is_malformed() {
        let huge = "x".repeat(MAX_TEST_INPUT_BYTES + 1);
        let suite = TestSuite::new(vec![TestCase::io(huge, "ok")]);
        let result = build_plan(&make_candidate("pass"), &suite);

        match result {
            Err(EngineError::MalformedTestSpec(msg)) => {
                assert!(msg.contains("exceeds maximum size"));
            }
            other => panic!("expected MalformedTestSpec, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_record_reports_position() {
        let suite = TestSuite::new(vec![
            TestCase::assertion("f()", "1"),
            TestCase::assertion("", "2"),
        ]);
        let result = build_plan(&make_candidate("pass"), &suite);

        match result {
            Err(EngineError::MalformedTestSpec(msg)) => assert!(msg.contains("test 1")),
            other => panic!("expected MalformedTestSpec, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_suite_builds_empty_plan() {
        let suite = TestSuite::new(Vec::new());
        let plan = build_plan(&make_candidate("pass"), &suite).expect("plan should build");

        assert!(plan.probes.is_empty());
    }

    #[test]
    fn test_probe_display_accessors() {
        let call = Probe::Call {
            call: "f(1)".to_string(),
            expected: "2".to_string(),
        };
        let stdin = Probe::Stdin {
            input: "5\n".to_string(),
            expected: "25\n".to_string(),
        };

        assert_eq!(call.display_input(), "f(1)");
        assert_eq!(call.expected(), "2");
        assert_eq!(stdin.display_input(), "5\n");
        assert_eq!(stdin.expected(), "25\n");
    }
}
