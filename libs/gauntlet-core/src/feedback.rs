//! Agent-facing feedback rendering.
//!
//! Turns an outcome set into bounded diagnostic text with a fixed
//! section layout: an optional public-tests banner, a passed section,
//! a failed section. Sections that collected nothing carry an explicit
//! `None` marker so consumers can always find them. Display caps bound
//! the number of examples per section and the characters per field;
//! capped-out examples are acknowledged with a count instead of being
//! dropped silently. Output is a pure function of the inputs.

use crate::types::{DisplayLimits, EvaluationResult, ExecutionOutcome, OutcomeStatus, TestCase, TestSuite};

const PUBLIC_TESTS_BANNER: &str = "Note: Tests are automatically generated and can be wrong.\n\n";
const IO_FORMATTING_NOTE: &str =
    "Note: Inputs/outputs here are automatically extracted/truncated so formatting may be a bit off.\n";
const INPUT_HINT: &str = "\nNo output detected. You might want to check the reading from / writing to standard IO.\nA common mistake is to put the IO inside a function, but the function is not called.\n";

/// Rendered feedback plus the display accounting behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackReport {
    pub text: String,
    pub passed_shown: usize,
    pub failed_shown: usize,
    pub passed_hidden: usize,
    pub failed_hidden: usize,
}

/// Render feedback for one evaluation. Outcomes are paired with suite
/// cases by position; undetermined outcomes are omitted from both
/// sections.
pub fn render(result: &EvaluationResult, suite: &TestSuite, limits: &DisplayLimits) -> FeedbackReport {
    let mut passed_body = String::new();
    let mut failed_body = String::new();
    let mut passed_shown = 0usize;
    let mut failed_shown = 0usize;
    let mut passed_hidden = 0usize;
    let mut failed_hidden = 0usize;

    for (outcome, case) in result.outcomes.iter().zip(suite.cases.iter()) {
        match outcome.status {
            OutcomeStatus::Undetermined => continue,
            OutcomeStatus::Pass => {
                if slot_open(passed_shown, limits) {
                    passed_body.push_str(&passed_item(outcome, case, limits));
                    passed_shown += 1;
                } else {
                    passed_hidden += 1;
                }
            }
            _ => {
                if slot_open(failed_shown, limits) {
                    failed_body.push_str(&failed_item(outcome, case, limits));
                    failed_shown += 1;
                } else {
                    failed_hidden += 1;
                }
            }
        }
    }

    let mut text = String::new();
    if suite.public {
        text.push_str(PUBLIC_TESTS_BANNER);
    }
    if suite.cases.iter().any(|c| matches!(c, TestCase::Io { .. })) {
        text.push_str(IO_FORMATTING_NOTE);
    }
    text.push_str("Tests passed:");
    text.push_str(&passed_body);
    if passed_shown == 0 {
        text.push_str("\nNone");
    }
    if passed_hidden > 0 {
        text.push_str(&format!("\n... ({} more passing tests not shown)", passed_hidden));
    }
    text.push_str("\n\nTests failed:");
    text.push_str(&failed_body);
    if failed_shown == 0 {
        text.push_str("\nNone");
    }
    if failed_hidden > 0 {
        text.push_str(&format!("\n... ({} more failing tests not shown)", failed_hidden));
    }

    FeedbackReport {
        text,
        passed_shown,
        failed_shown,
        passed_hidden,
        failed_hidden,
    }
}

fn slot_open(shown: usize, limits: &DisplayLimits) -> bool {
    limits.max_tests.map_or(true, |cap| shown < cap)
}

fn passed_item(outcome: &ExecutionOutcome, case: &TestCase, limits: &DisplayLimits) -> String {
    match case {
        TestCase::Assertion { .. } => {
            let test_str = clip(
                &format!("assert {} == {}", outcome.input, outcome.expected),
                limits.max_chars,
            );
            format!("\n{}", test_str)
        }
        TestCase::Io { .. } => {
            let budget = limits.max_chars.map(|c| c / 2);
            format!(
                "\n Input: {} Output: {}",
                clip(&outcome.input, budget),
                clip(&outcome.expected, budget)
            )
        }
    }
}

fn failed_item(outcome: &ExecutionOutcome, case: &TestCase, limits: &DisplayLimits) -> String {
    let mut item = match case {
        TestCase::Assertion { .. } => {
            let test_str = clip(
                &format!("assert {} == {}", outcome.input, outcome.expected),
                limits.max_chars,
            );
            let output_str = clip(&outcome.actual, limits.max_chars);
            format!("\n{} # output: {}", test_str, output_str)
        }
        TestCase::Io { .. } => {
            let budget = limits.max_chars.map(|c| c / 3);
            format!(
                "\n Input: {} Expected output: {} # Execution output: {}",
                clip(&outcome.input, budget),
                clip(&outcome.expected, budget),
                clip(&outcome.actual, budget)
            )
        }
    };
    match outcome.status {
        OutcomeStatus::RuntimeErrorOrTimeout => {
            item.push_str(" # Runtime error or time limit exceeded error");
        }
        OutcomeStatus::CompileError => {
            item.push_str(" # Compile Error");
        }
        _ => {}
    }
    if limits.io_hints
        && matches!(case, TestCase::Io { .. })
        && outcome.actual.trim().is_empty()
    {
        item.push_str(INPUT_HINT);
    }
    item
}

/// Clip to a character budget, marking the cut. Counts chars, not
/// bytes, so multibyte input cannot split a code point.
fn clip(text: &str, budget: Option<usize>) -> String {
    match budget {
        Some(max) if text.chars().count() > max => {
            let mut clipped: String = text.chars().take(max).collect();
            clipped.push_str("...");
            clipped
        }
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EvaluationResult, TestSuite};
    use uuid::Uuid;

    fn outcome(status: OutcomeStatus, input: &str, expected: &str, actual: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            status,
            input: input.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            time_ms: 1,
        }
    }

    fn result_of(outcomes: Vec<ExecutionOutcome>) -> EvaluationResult {
        EvaluationResult::from_outcomes(Uuid::new_v4(), outcomes, 10)
    }

    #[test]
    fn test_assertion_sections_and_items() {
        let suite = TestSuite::new(vec![
            TestCase::assertion("add(1, 2)", "3"),
            TestCase::assertion("add(2, 2)", "5"),
        ]);
        let result = result_of(vec![
            outcome(OutcomeStatus::Pass, "add(1, 2)", "3", "3"),
            outcome(OutcomeStatus::WrongAnswer, "add(2, 2)", "5", "4"),
        ]);

        let report = render(&result, &suite, &DisplayLimits::default());

        assert!(report.text.contains("Tests passed:\nassert add(1, 2) == 3"));
        assert!(report
            .text
            .contains("Tests failed:\nassert add(2, 2) == 5 # output: 4"));
        assert_eq!(report.passed_shown, 1);
        assert_eq!(report.failed_shown, 1);
    }

    #[test]
    fn test_empty_sections_get_none_marker() {
        let suite = TestSuite::new(vec![TestCase::assertion("f(1)", "1")]);
        let all_pass = result_of(vec![outcome(OutcomeStatus::Pass, "f(1)", "1", "1")]);
        let report = render(&all_pass, &suite, &DisplayLimits::default());
        assert!(report.text.contains("Tests failed:\nNone"));

        let all_fail = result_of(vec![outcome(OutcomeStatus::WrongAnswer, "f(1)", "1", "2")]);
        let report = render(&all_fail, &suite, &DisplayLimits::default());
        assert!(report.text.contains("Tests passed:\nNone"));
    }

    #[test]
    fn test_failing_display_cap_emits_indicator() {
        let cases: Vec<TestCase> = (0..5).map(|i| TestCase::assertion(&format!("f({})", i), "0")).collect();
        let suite = TestSuite::new(cases);
        let outcomes: Vec<ExecutionOutcome> = (0..5)
            .map(|i| outcome(OutcomeStatus::WrongAnswer, &format!("f({})", i), "0", "1"))
            .collect();
        let limits = DisplayLimits {
            max_tests: Some(2),
            ..DisplayLimits::default()
        };

        let report = render(&result_of(outcomes), &suite, &limits);

        assert_eq!(report.failed_shown, 2);
        assert_eq!(report.failed_hidden, 3);
        assert!(report.text.contains("f(0)"));
        assert!(report.text.contains("f(1)"));
        assert!(!report.text.contains("f(2)"));
        assert!(report.text.contains("(3 more failing tests not shown)"));
    }

    #[test]
    fn test_failure_reason_suffixes() {
        let suite = TestSuite::new(vec![
            TestCase::assertion("f(1)", "1"),
            TestCase::assertion("f(2)", "2"),
            TestCase::assertion("f(3)", "3"),
        ]);
        let result = result_of(vec![
            outcome(OutcomeStatus::WrongAnswer, "f(1)", "1", "0"),
            outcome(OutcomeStatus::RuntimeErrorOrTimeout, "f(2)", "2", "TIMEOUT"),
            outcome(OutcomeStatus::CompileError, "f(3)", "3", "SyntaxError: bad"),
        ]);

        let report = render(&result, &suite, &DisplayLimits::default());

        assert!(report
            .text
            .contains("f(2) == 2 # output: TIMEOUT # Runtime error or time limit exceeded error"));
        assert!(report
            .text
            .contains("f(3) == 3 # output: SyntaxError: bad # Compile Error"));
        // Plain wrong answers carry no reason suffix.
        assert!(report.text.contains("f(1) == 1 # output: 0\n"));
    }

    #[test]
    fn test_char_budget_clips_with_marker() {
        let long_call = "f(".to_string() + &"9, ".repeat(50) + "9)";
        let suite = TestSuite::new(vec![TestCase::assertion(&long_call, "0")]);
        let result = result_of(vec![outcome(OutcomeStatus::Pass, &long_call, "0", "0")]);
        let limits = DisplayLimits {
            max_chars: Some(20),
            ..DisplayLimits::default()
        };

        let report = render(&result, &suite, &limits);

        let line = report
            .text
            .lines()
            .find(|l| l.starts_with("assert"))
            .expect("passed item");
        assert!(line.ends_with("..."));
        assert_eq!(line.chars().count(), 20 + 3);
    }

    #[test]
    fn test_io_item_layout_and_budgets() {
        let suite = TestSuite::new(vec![
            TestCase::io("1 2", "3"),
            TestCase::io("4 5", "9"),
        ]);
        let result = result_of(vec![
            outcome(OutcomeStatus::Pass, "1 2", "3", "3"),
            outcome(OutcomeStatus::WrongAnswer, "4 5", "9", "8"),
        ]);

        let report = render(&result, &suite, &DisplayLimits::default());

        assert!(report.text.starts_with(IO_FORMATTING_NOTE));
        assert!(report.text.contains("\n Input: 1 2 Output: 3"));
        assert!(report
            .text
            .contains("\n Input: 4 5 Expected output: 9 # Execution output: 8"));
    }

    #[test]
    fn test_io_disclaimer_absent_for_assertion_suites() {
        let suite = TestSuite::new(vec![TestCase::assertion("f(1)", "1")]);
        let result = result_of(vec![outcome(OutcomeStatus::Pass, "f(1)", "1", "1")]);

        let report = render(&result, &suite, &DisplayLimits::default());

        assert!(!report.text.contains("automatically extracted"));
        assert!(report.text.starts_with("Tests passed:"));
    }

    #[test]
    fn test_public_suite_gets_banner() {
        let suite = TestSuite::new(vec![TestCase::assertion("f(1)", "1")]).with_public(true);
        let result = result_of(vec![outcome(OutcomeStatus::Pass, "f(1)", "1", "1")]);

        let report = render(&result, &suite, &DisplayLimits::default());

        assert!(report
            .text
            .starts_with("Note: Tests are automatically generated and can be wrong.\n\n"));
    }

    #[test]
    fn test_input_hint_requires_flag_io_case_and_empty_output() {
        let suite = TestSuite::new(vec![TestCase::io("1 2", "3")]);
        let silent = result_of(vec![outcome(OutcomeStatus::WrongAnswer, "1 2", "3", "")]);

        let hints_on = DisplayLimits {
            io_hints: true,
            ..DisplayLimits::default()
        };
        let report = render(&silent, &suite, &hints_on);
        assert!(report.text.contains("No output detected."));
        assert!(report.text.contains("the function is not called."));

        let report = render(&silent, &suite, &DisplayLimits::default());
        assert!(!report.text.contains("No output detected."));

        let spoke = result_of(vec![outcome(OutcomeStatus::WrongAnswer, "1 2", "3", "4")]);
        let report = render(&spoke, &suite, &hints_on);
        assert!(!report.text.contains("No output detected."));

        // Assertion cases never get the stdin hint.
        let assert_suite = TestSuite::new(vec![TestCase::assertion("f(1)", "3")]);
        let assert_fail = result_of(vec![outcome(OutcomeStatus::WrongAnswer, "f(1)", "3", "")]);
        let report = render(&assert_fail, &assert_suite, &hints_on);
        assert!(!report.text.contains("No output detected."));
    }

    #[test]
    fn test_undetermined_outcomes_are_omitted() {
        let suite = TestSuite::new(vec![
            TestCase::assertion("f(1)", "1"),
            TestCase::assertion("f(2)", "2"),
        ]);
        let result = result_of(vec![
            outcome(OutcomeStatus::Pass, "f(1)", "1", "1"),
            ExecutionOutcome::undetermined("f(2)", "2"),
        ]);

        let report = render(&result, &suite, &DisplayLimits::default());

        assert!(!report.text.contains("f(2)"));
        assert_eq!(report.failed_shown, 0);
        assert_eq!(report.failed_hidden, 0);
        assert!(report.text.contains("Tests failed:\nNone"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let suite = TestSuite::new(vec![
            TestCase::io("1 2", "3"),
            TestCase::assertion("f(1)", "1"),
        ]);
        let result = result_of(vec![
            outcome(OutcomeStatus::WrongAnswer, "1 2", "3", "4"),
            outcome(OutcomeStatus::Pass, "f(1)", "1", "1"),
        ]);
        let limits = DisplayLimits {
            max_tests: Some(3),
            max_chars: Some(100),
            io_hints: true,
        };

        let first = render(&result, &suite, &limits);
        let second = render(&result, &suite, &limits);

        assert_eq!(first, second);
    }
}
