//! Execution strategies for bound requests.
//!
//! The strategy is chosen once at startup. Both implementations return the same
//! [`ExecutionResult`] shape so the response shaper never needs to know which one ran.

pub mod domains;
pub mod mock;
pub mod real;

use crate::binder::BoundRequest;
use crate::error::InvocationError;
use crate::model::Operation;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Which executor produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Mock,
    Real,
}

/// Successful execution: HTTP-like status plus a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    pub status: u16,
    pub payload: Value,
    pub mode: ExecutionMode,
}

pub type ExecutionResult = Result<ExecutionOutput, InvocationError>;

#[async_trait]
pub trait Executor: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    async fn execute(&self, operation: &Operation, request: &BoundRequest) -> ExecutionResult;
}
