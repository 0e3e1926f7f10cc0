use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One attempt produced by the agent. Immutable once built; a fresh
/// candidate is created per attempt and discarded after evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProgram {
    pub id: Uuid,
    pub source: String,
}

impl CandidateProgram {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
        }
    }

    pub fn with_id(id: Uuid, source: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into(),
        }
    }
}

/// A single verification unit. Identity is positional within the suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestCase {
    /// Call the candidate's entry point and compare the returned value
    /// against an expected-value expression.
    Assertion { call: String, expected: String },
    /// Feed the payload on stdin and compare captured stdout against
    /// the expected text.
    Io { input: String, expected: String },
}

impl TestCase {
    pub fn assertion(call: impl Into<String>, expected: impl Into<String>) -> Self {
        TestCase::Assertion {
            call: call.into(),
            expected: expected.into(),
        }
    }

    pub fn io(input: impl Into<String>, expected: impl Into<String>) -> Self {
        TestCase::Io {
            input: input.into(),
            expected: expected.into(),
        }
    }
}

/// Ordered test cases plus the dataset metadata that travels with them.
///
/// Order matters twice: feedback displays tests in suite order, and
/// feedback-mode early stop walks the suite front to back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    pub cases: Vec<TestCase>,
    /// Setup source (imports, helper definitions) prepended to the
    /// candidate before execution.
    #[serde(default)]
    pub prelude: Option<String>,
    /// Machine-generated public tests; only affects the feedback banner.
    #[serde(default)]
    pub public: bool,
}

impl TestSuite {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self {
            cases,
            prelude: None,
            public: false,
        }
    }

    /// Build a suite from raw input/output pairs.
    ///
    /// The shape of the dataset decides the variant once, at
    /// construction: with a declared entry point each pair becomes an
    /// assertion on `entry(args)`, without one each pair becomes a
    /// stdin/stdout test.
    pub fn from_io_pairs<I>(pairs: I, entry_point: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let cases = pairs
            .into_iter()
            .map(|(input, expected)| match entry_point {
                Some(entry) => TestCase::Assertion {
                    call: format!("{}({})", entry, input),
                    expected,
                },
                None => TestCase::Io { input, expected },
            })
            .collect();
        Self::new(cases)
    }

    pub fn with_prelude(mut self, prelude: impl Into<String>) -> Self {
        self.prelude = Some(prelude.into());
        self
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// Classified result of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pass,
    WrongAnswer,
    /// The candidate crashed, was denied a capability, or exceeded the
    /// time limit. The distinction stays in internal logs.
    RuntimeErrorOrTimeout,
    CompileError,
    /// Never executed: feedback-mode early stop or the aggregate
    /// deadline skipped it. Counts against `overall_pass`.
    Undetermined,
}

impl OutcomeStatus {
    pub fn is_pass(self) -> bool {
        self == OutcomeStatus::Pass
    }
}

/// Per-test record inside an `EvaluationResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    /// Display form of the probe: the call expression for assertions,
    /// the stdin payload for IO tests.
    pub input: String,
    pub expected: String,
    /// Captured output: a value repr, captured stdout, an error
    /// message, or the `TIMEOUT` marker.
    pub actual: String,
    pub time_ms: u64,
}

impl ExecutionOutcome {
    pub fn undetermined(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Undetermined,
            input: input.into(),
            expected: expected.into(),
            actual: String::new(),
            time_ms: 0,
        }
    }
}

/// Aggregated verdict for one candidate against one suite. Immutable
/// after construction; one record per attempt goes to the result sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub candidate_id: Uuid,
    pub outcomes: Vec<ExecutionOutcome>,
    pub overall_pass: bool,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl EvaluationResult {
    /// `overall_pass` is derived, never set: true iff every outcome
    /// passed. An `Undetermined` entry therefore fails the candidate.
    pub fn from_outcomes(candidate_id: Uuid, outcomes: Vec<ExecutionOutcome>, duration_ms: u64) -> Self {
        let overall_pass = outcomes.iter().all(|o| o.status.is_pass());
        Self {
            candidate_id,
            outcomes,
            overall_pass,
            duration_ms,
            created_at: Utc::now(),
        }
    }
}

/// Scored runs execute everything; feedback runs may stop early once
/// enough display examples exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    #[default]
    Scored,
    Feedback,
}

/// Caps on rendered feedback. `None` means uncapped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayLimits {
    #[serde(default)]
    pub max_tests: Option<usize>,
    #[serde(default)]
    pub max_chars: Option<usize>,
    /// Append the stdin-handling hint when a failing test produced no
    /// output at all.
    #[serde(default)]
    pub io_hints: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOptions {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub mode: EvalMode,
    #[serde(default)]
    pub limits: DisplayLimits,
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            mode: EvalMode::Scored,
            limits: DisplayLimits::default(),
        }
    }
}

/// One-shot request the worker binary consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub source: String,
    pub suite: TestSuite,
    #[serde(default)]
    pub options: EvalOptions,
}

/// Worker response: the persisted result plus the rendered feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResponse {
    pub result: EvaluationResult,
    /// Present for feedback-mode requests only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}
