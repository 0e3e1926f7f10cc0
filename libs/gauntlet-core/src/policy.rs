//! Capability policy for sandboxed execution.
//!
//! The policy is a whitelist: module names the candidate may import and
//! builtin bindings its execution environment exposes. It is loaded
//! once at process start and never mutated afterwards; evaluations
//! share it by reference.
//!
//! A policy source that is configured but missing or unparseable is the
//! one fatal condition in the engine. An unconfigured policy falls back
//! to a conservative built-in set, never to unrestricted access.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Environment variable naming the policy document to load.
pub const POLICY_PATH_ENV: &str = "GAUNTLET_POLICY_PATH";

/// Modules a candidate may import when no policy file is configured.
/// Computation-only stdlib; `sys` is included because stdin-driven
/// candidates conventionally read through `sys.stdin`.
const DEFAULT_MODULES: &[&str] = &[
    "array",
    "bisect",
    "cmath",
    "collections",
    "copy",
    "datetime",
    "decimal",
    "fractions",
    "functools",
    "heapq",
    "itertools",
    "json",
    "math",
    "operator",
    "queue",
    "random",
    "re",
    "statistics",
    "string",
    "sys",
    "typing",
];

/// Builtin bindings exposed to candidates by default: ordinary
/// computation and container builtins, class machinery, stdin access,
/// and the exception types everyday code raises or catches. Nothing
/// that opens files, spawns processes, or re-enters the compiler.
const DEFAULT_BUILTINS: &[&str] = &[
    "__build_class__",
    "abs",
    "all",
    "any",
    "bin",
    "bool",
    "bytearray",
    "bytes",
    "callable",
    "chr",
    "classmethod",
    "complex",
    "dict",
    "divmod",
    "enumerate",
    "filter",
    "float",
    "format",
    "frozenset",
    "getattr",
    "hasattr",
    "hash",
    "hex",
    "id",
    "input",
    "int",
    "isinstance",
    "issubclass",
    "iter",
    "len",
    "list",
    "map",
    "max",
    "min",
    "next",
    "object",
    "oct",
    "ord",
    "pow",
    "print",
    "property",
    "range",
    "repr",
    "reversed",
    "round",
    "set",
    "setattr",
    "slice",
    "sorted",
    "staticmethod",
    "str",
    "sum",
    "super",
    "tuple",
    "type",
    "zip",
    // Exception hierarchy candidates legitimately touch.
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "BaseException",
    "EOFError",
    "Exception",
    "ImportError",
    "IndexError",
    "KeyError",
    "LookupError",
    "NameError",
    "NotImplementedError",
    "OverflowError",
    "RecursionError",
    "RuntimeError",
    "StopIteration",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

/// Whitelist of capabilities granted to candidate code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityPolicy {
    pub modules: BTreeSet<String>,
    pub builtins: BTreeSet<String>,
}

impl CapabilityPolicy {
    /// Load a policy document from disk.
    ///
    /// The document is JSON with two arrays:
    /// `{"modules": [...], "builtins": [...]}`. A missing or malformed
    /// file is fatal; running with a half-loaded whitelist would be
    /// indistinguishable from running with the wrong one.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Err(EngineError::PolicyConfig(format!(
                "policy file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::PolicyConfig(format!("failed to read {}: {}", path.display(), e))
        })?;

        let policy: CapabilityPolicy = serde_json::from_str(&content).map_err(|e| {
            EngineError::PolicyConfig(format!("failed to parse {}: {}", path.display(), e))
        })?;

        info!(
            modules = policy.modules.len(),
            builtins = policy.builtins.len(),
            path = %path.display(),
            "Loaded capability policy"
        );

        Ok(policy)
    }

    /// Conservative default used when no policy source is configured.
    pub fn builtin_minimal() -> Self {
        Self {
            modules: DEFAULT_MODULES.iter().map(|s| s.to_string()).collect(),
            builtins: DEFAULT_BUILTINS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Resolve the policy at worker startup.
    ///
    /// An explicitly configured path that fails to load is fatal. No
    /// configuration at all falls back to `builtin_minimal`, with a
    /// warning so the fallback is visible in operator logs.
    pub fn from_env() -> Result<Self, EngineError> {
        match std::env::var(POLICY_PATH_ENV) {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => {
                warn!(
                    "{} not set; using the built-in minimal policy",
                    POLICY_PATH_ENV
                );
                Ok(Self::builtin_minimal())
            }
        }
    }

    /// Whether a module may be imported. Dotted submodule names are
    /// judged by their root segment, so allowing `collections` also
    /// allows `collections.abc`.
    pub fn allows_module(&self, name: &str) -> bool {
        let root = name.split('.').next().unwrap_or(name);
        self.modules.contains(root)
    }
}
