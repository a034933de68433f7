//! External collaborator interfaces.
//!
//! The engine never talks to a model endpoint or a cluster directly; it
//! consumes two narrow async traits. Implementations live with the caller
//! (an HTTP client against a chat completion service, a command runner
//! against a cluster) — tests use in-memory stubs.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

/// The reasoning oracle: one rendered prompt in, one raw completion out.
///
/// No delivery guarantees are assumed beyond "eventually returns or
/// errors"; the engine imposes no timeout of its own.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Runs an opaque inspection command and returns its textual output.
///
/// Actions are not exactly-once: the memory refresher re-invokes them
/// periodically, so implementations must tolerate repetition.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &str) -> Result<String, ActionError>;
}

/// Failure reported by the reasoning oracle.
#[derive(Debug, Error, Diagnostic)]
#[error("oracle request failed: {message}")]
#[diagnostic(code(triagegraph::oracle::request_failed))]
pub struct OracleError {
    pub message: String,
}

impl OracleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by the action executor.
#[derive(Debug, Error, Diagnostic)]
#[error("action {action:?} failed: {message}")]
#[diagnostic(code(triagegraph::oracle::action_failed))]
pub struct ActionError {
    pub action: String,
    pub message: String,
}

impl ActionError {
    pub fn new(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            message: message.into(),
        }
    }
}
