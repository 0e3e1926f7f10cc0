//! One-shot evaluation worker.
//!
//! Reads a JSON `EvalRequest` from the path in `GAUNTLET_REQUEST_PATH`
//! (or stdin when unset), evaluates the candidate, and writes a JSON
//! `EvalResponse` to stdout. Logs go to stderr so stdout stays a clean
//! response channel for the calling orchestrator.

use anyhow::Context;
use gauntlet_core::{
    evaluate, render, CandidateProgram, CapabilityPolicy, EvalMode, EvalRequest, EvalResponse,
    Sandbox,
};
use tokio::io::AsyncReadExt;
use tracing::{error, info, instrument};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Gauntlet worker booting...");

    let policy = CapabilityPolicy::from_env().map_err(|e| {
        error!("Failed to load capability policy: {}", e);
        error!("Check GAUNTLET_POLICY_PATH");
        e
    })?;

    let interpreter =
        std::env::var("GAUNTLET_INTERPRETER").unwrap_or_else(|_| "python3".to_string());
    let sandbox = Sandbox::new().with_interpreter(interpreter.clone());
    if !sandbox.is_available() {
        error!("Interpreter '{}' cannot be spawned", interpreter);
        error!("Install it or point GAUNTLET_INTERPRETER at a working binary");
        std::process::exit(1);
    }

    info!(
        interpreter = %interpreter,
        modules = policy.modules.len(),
        builtins = policy.builtins.len(),
        "Worker configured"
    );

    let raw = read_request_source().await?;
    let request: EvalRequest =
        serde_json::from_str(&raw).context("parsing eval request JSON")?;

    let response = process(&sandbox, &policy, request).await?;

    let body = serde_json::to_string(&response).context("serializing eval response")?;
    println!("{}", body);

    Ok(())
}

async fn read_request_source() -> anyhow::Result<String> {
    match std::env::var("GAUNTLET_REQUEST_PATH") {
        Ok(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading eval request from {}", path)),
        Err(_) => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("reading eval request from stdin")?;
            Ok(buffer)
        }
    }
}

#[instrument(skip_all, fields(request_id = ?request.id))]
async fn process(
    sandbox: &Sandbox,
    policy: &CapabilityPolicy,
    request: EvalRequest,
) -> anyhow::Result<EvalResponse> {
    let candidate = match request.id {
        Some(id) => CandidateProgram::with_id(id, request.source),
        None => CandidateProgram::new(request.source),
    };

    info!(
        candidate_id = %candidate.id,
        tests = request.suite.len(),
        source_size = candidate.source.len(),
        mode = ?request.options.mode,
        timeout_ms = request.options.timeout_ms,
        "Received eval request"
    );

    let result = evaluate(sandbox, &candidate, &request.suite, policy, &request.options)
        .await
        .context("evaluating candidate")?;

    let feedback = match request.options.mode {
        EvalMode::Feedback => {
            Some(render(&result, &request.suite, &request.options.limits).text)
        }
        EvalMode::Scored => None,
    };

    Ok(EvalResponse { result, feedback })
}
