//! Sandboxed execution of candidate probes.
//!
//! One probe, one worker: every execution spawns a fresh interpreter
//! process with a cleared environment, a scoped scratch directory as
//! its working directory, and the capability policy injected through
//! the harness. A hang or crash dies with its process. The sandbox
//! knows HOW to execute; classification of what the raw output means
//! belongs to the evaluator.
//!
//! Defense layers, outermost first: the worker is a separate OS process
//! killed on timeout; the interpreter runs isolated (`-I -E -S`) with
//! no inherited environment; inside the worker the harness exposes only
//! policy-listed builtins and guards every import. The process boundary
//! is the one that counts; the in-worker restrictions keep honest
//! candidates honest.

use crate::evaluator::ProbeExecution;
use crate::policy::CapabilityPolicy;
use crate::protocol::Probe;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Worker-side harness; shipped inside the binary so the sandbox has no
/// runtime file dependencies.
const HARNESS: &str = include_str!("sandbox/harness.py");

/// Exit codes the harness pairs with each envelope status. A parsed
/// envelope is only trusted when the observed exit code corroborates
/// the status it claims.
const EXIT_OK: i32 = 0;
const EXIT_INTERNAL: i32 = 1;
const EXIT_COMPILE: i32 = 3;
const EXIT_POLICY: i32 = 4;

/// Grace period for draining worker stdio once the child is gone. A
/// pipe write end leaked to a descendant process must not stall the
/// evaluation waiting for EOF.
const DRAIN_GRACE_MS: u64 = 2_000;

/// Result envelope the harness prints as its final stdout line.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    verdict: Option<bool>,
    #[serde(default)]
    actual: String,
    #[serde(default)]
    error: String,
}

enum HarnessMode<'a> {
    Compile,
    Call { call: &'a str, expected: &'a str },
    Stdin { input: &'a str },
}

impl HarnessMode<'_> {
    fn name(&self) -> &'static str {
        match self {
            HarnessMode::Compile => "compile",
            HarnessMode::Call { .. } => "call",
            HarnessMode::Stdin { .. } => "stdin",
        }
    }
}

/// Process-per-probe execution engine.
#[derive(Debug, Clone)]
pub struct Sandbox {
    interpreter: String,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            interpreter: "python3".to_string(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Whether the configured interpreter can be spawned at all.
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.interpreter)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    /// Parse the candidate without executing it. A failure here means
    /// every test of the candidate is a compile error.
    pub async fn check_compile(
        &self,
        source: &str,
        policy: &CapabilityPolicy,
        timeout_ms: u64,
    ) -> ProbeExecution {
        self.execute(source, HarnessMode::Compile, policy, timeout_ms)
            .await
    }

    /// Run one probe in a fresh worker process.
    pub async fn run_probe(
        &self,
        source: &str,
        probe: &Probe,
        policy: &CapabilityPolicy,
        timeout_ms: u64,
    ) -> ProbeExecution {
        match probe {
            Probe::Call { call, expected } => {
                self.execute(source, HarnessMode::Call { call, expected }, policy, timeout_ms)
                    .await
            }
            Probe::Stdin { input, .. } => {
                self.execute(source, HarnessMode::Stdin { input }, policy, timeout_ms)
                    .await
            }
        }
    }

    async fn execute(
        &self,
        source: &str,
        mode: HarnessMode<'_>,
        policy: &CapabilityPolicy,
        timeout_ms: u64,
    ) -> ProbeExecution {
        let started = Instant::now();

        // Scratch directory doubles as the worker's cwd, so relative
        // writes land here and vanish when the guard drops, on every
        // exit path including timeout-kill.
        let scratch = match tempfile::TempDir::new() {
            Ok(dir) => dir,
            Err(e) => {
                return infra_failure(started, format!("failed to create scratch dir: {}", e))
            }
        };
        let harness_path = scratch.path().join("harness.py");
        if let Err(e) = tokio::fs::write(&harness_path, HARNESS).await {
            return infra_failure(started, format!("failed to write harness: {}", e));
        }

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-I")
            .arg("-E")
            .arg("-S")
            .arg("-u")
            .arg(&harness_path)
            .current_dir(scratch.path())
            .env_clear()
            .env("GAUNTLET_MODE", mode.name())
            .env("GAUNTLET_SOURCE", encode(source))
            .env("GAUNTLET_MODULES", encode(&to_json_list(&policy.modules)))
            .env("GAUNTLET_BUILTINS", encode(&to_json_list(&policy.builtins)))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &mode {
            HarnessMode::Call { call, expected } => {
                cmd.env("GAUNTLET_CALL", encode(call))
                    .env("GAUNTLET_EXPECTED", encode(expected))
                    .stdin(Stdio::null());
            }
            HarnessMode::Stdin { .. } => {
                cmd.stdin(Stdio::piped());
            }
            HarnessMode::Compile => {
                cmd.stdin(Stdio::null());
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return infra_failure(
                    started,
                    format!("failed to spawn sandbox worker '{}': {}", self.interpreter, e),
                )
            }
        };

        if let HarnessMode::Stdin { input } = &mode {
            if let Some(mut stdin) = child.stdin.take() {
                let payload = input.as_bytes().to_vec();
                tokio::spawn(async move {
                    let _ = stdin.write_all(&payload).await;
                    let _ = stdin.shutdown().await;
                });
            }
        }

        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        // Hard timeout: the worker cannot be asked to stop cooperatively,
        // so expiry force-kills it and the pipes close behind it.
        let mut timed_out = false;
        let exit_code = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            child.wait(),
        )
        .await
        {
            Ok(Ok(status)) => status.code(),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to reap sandbox worker");
                None
            }
            Err(_) => {
                timed_out = true;
                debug!(timeout_ms, "sandbox worker timed out, killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
                None
            }
        };

        let grace = Duration::from_millis(DRAIN_GRACE_MS);
        let stdout_text = drain_with_grace(stdout_task, grace, "stdout").await;
        let stderr_text = drain_with_grace(stderr_task, grace, "stderr").await;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        if timed_out {
            return ProbeExecution {
                stdout: String::new(),
                stderr: stderr_text,
                verdict: None,
                actual: String::new(),
                execution_time_ms,
                timed_out: true,
                runtime_error: false,
                compile_error: false,
                policy_violation: false,
            };
        }

        // Anything on stdout before the final line is candidate text,
        // and the final line itself could be candidate text too. Only
        // an envelope whose claimed status matches the exit code the
        // harness pairs with it can have come from the harness.
        let envelope = parse_envelope(&stdout_text).filter(|envelope| {
            let agrees = envelope_exit_agrees(&envelope.status, exit_code);
            if !agrees {
                warn!(
                    status = %envelope.status,
                    exit_code = ?exit_code,
                    "sandbox envelope disagrees with worker exit code, discarding"
                );
            }
            agrees
        });

        match envelope {
            Some(envelope) => classify_envelope(envelope, stderr_text, execution_time_ms),
            None => {
                // No envelope the harness can be credited with: it died
                // before reporting, or the final line was not its own.
                // Fall back to the exit code; an interpreter-level abort
                // (OOM kill, stack exhaustion in C) lands here as a
                // runtime error.
                if exit_code == Some(EXIT_COMPILE) {
                    return ProbeExecution {
                        stdout: String::new(),
                        stderr: stderr_text.clone(),
                        verdict: None,
                        actual: first_line(&stderr_text).to_string(),
                        execution_time_ms,
                        timed_out: false,
                        runtime_error: false,
                        compile_error: true,
                        policy_violation: false,
                    };
                }
                warn!(
                    exit_code = ?exit_code,
                    stderr = first_line(&stderr_text),
                    "sandbox worker produced no result envelope"
                );
                ProbeExecution {
                    stdout: String::new(),
                    stderr: stderr_text.clone(),
                    verdict: None,
                    actual: first_line(&stderr_text).to_string(),
                    execution_time_ms,
                    timed_out: false,
                    runtime_error: true,
                    compile_error: false,
                    policy_violation: exit_code == Some(EXIT_POLICY),
                }
            }
        }
    }
}

fn classify_envelope(
    envelope: Envelope,
    stderr_text: String,
    execution_time_ms: u64,
) -> ProbeExecution {
    let mut exec = ProbeExecution {
        stdout: envelope.stdout,
        stderr: stderr_text,
        verdict: envelope.verdict,
        actual: envelope.actual,
        execution_time_ms,
        timed_out: false,
        runtime_error: false,
        compile_error: false,
        policy_violation: false,
    };

    match envelope.status.as_str() {
        "ok" => {}
        "compile_error" => {
            exec.compile_error = true;
            exec.actual = envelope.error.clone();
            exec.stderr = envelope.error;
        }
        "policy_violation" => {
            // Outward record carries a plain ImportError; which
            // capability was denied goes to operator logs only.
            exec.runtime_error = true;
            exec.policy_violation = true;
            warn!(denied = %envelope.error, "candidate import denied by policy");
        }
        "runtime_error" => {
            exec.runtime_error = true;
            if !envelope.error.is_empty() {
                exec.stderr = envelope.error;
            }
        }
        other => {
            warn!(status = other, "unknown sandbox envelope status");
            exec.runtime_error = true;
        }
    }

    exec
}

fn parse_envelope(stdout_text: &str) -> Option<Envelope> {
    let line = stdout_text.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(line).ok()
}

/// The harness exits with the code paired to the status it reported,
/// so an envelope whose status disagrees with the exit code did not
/// come from the harness.
fn envelope_exit_agrees(status: &str, exit_code: Option<i32>) -> bool {
    match status {
        "ok" => exit_code == Some(EXIT_OK),
        "runtime_error" => exit_code == Some(EXIT_INTERNAL),
        "compile_error" => exit_code == Some(EXIT_COMPILE),
        "policy_violation" => exit_code == Some(EXIT_POLICY),
        _ => false,
    }
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buffer).await;
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

async fn drain_with_grace(
    mut task: tokio::task::JoinHandle<String>,
    grace: Duration,
    stream: &'static str,
) -> String {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            task.abort();
            warn!(stream, "sandbox output drain exceeded grace period, discarding");
            String::new()
        }
    }
}

fn infra_failure(started: Instant, message: String) -> ProbeExecution {
    warn!(error = %message, "sandbox infrastructure failure treated as runtime error");
    ProbeExecution {
        stdout: String::new(),
        stderr: message,
        verdict: None,
        actual: String::new(),
        execution_time_ms: started.elapsed().as_millis() as u64,
        timed_out: false,
        runtime_error: true,
        compile_error: false,
        policy_violation: false,
    }
}

fn encode(value: &str) -> String {
    general_purpose::STANDARD.encode(value)
}

fn to_json_list(values: &std::collections::BTreeSet<String>) -> String {
    // Serializing a set of strings cannot realistically fail; the
    // empty-list fallback denies everything rather than allowing it.
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
