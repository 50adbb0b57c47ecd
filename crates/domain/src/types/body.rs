//! Body specifications, invocations and outcomes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{Result, RetryFlowError};
use crate::types::failure::StepError;

/// Identifier of a retry construct instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstructId(Uuid);

impl ConstructId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConstructId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConstructId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConstructId {
    type Err = RetryFlowError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| RetryFlowError::InvalidInput(format!("invalid construct id '{s}': {e}")))
    }
}

/// Opaque continuation token issued when a body invocation suspends
///
/// The host scheduler hands the same token back together with the outcome.
/// Only the token recorded on the in-flight attempt is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeToken(String);

impl ResumeToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Time-ordered random token for hosts that do not mint their own
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Re-invocable description of the nested block
///
/// The retry machinery never looks inside `payload`; it hands the same spec
/// to the body invoker on every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySpec {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl BodySpec {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self { kind: kind.into(), payload }
    }

    /// # Errors
    /// Returns `RetryFlowError::InvalidInput` when `kind` is blank.
    pub fn validate(&self) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(RetryFlowError::InvalidInput("body kind must not be empty".into()));
        }
        Ok(())
    }
}

/// Everything the body invoker needs to start one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyInvocation {
    pub construct_id: ConstructId,
    pub attempt: u32,
    pub body: BodySpec,
}

/// Result reported by the body for one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BodyOutcome {
    Succeeded {
        #[serde(default)]
        output: Value,
    },
    Failed {
        error: StepError,
    },
}

impl BodyOutcome {
    pub fn success(output: Value) -> Self {
        Self::Succeeded { output }
    }

    pub fn failure(error: StepError) -> Self {
        Self::Failed { error }
    }
}
