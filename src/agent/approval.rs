//! Tool approval gate.
//!
//! A batch of tool requests is worked through strictly in arrival order. Calls that need
//! approval block the batch until the user decides; everything before them has already run and
//! nothing after them runs early. Execution is sequential.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::agent::events::{ToolRequest, ToolResult};
use crate::tools::ToolExecutor;

/// Error recorded on a call the user declined.
pub const REJECTED_MESSAGE: &str = "Rejected by user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Pending,
    Running,
    Complete,
    Error,
}

impl ToolStatus {
    pub fn is_resolved(self) -> bool {
        matches!(self, ToolStatus::Complete | ToolStatus::Error)
    }
}

/// One requested tool call and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub args: Map<String, Value>,
    pub needs_approval: bool,
    pub status: ToolStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    approved: bool,
}

impl ToolInvocation {
    fn from_request(request: ToolRequest, needs_approval: bool) -> Self {
        Self {
            id: request.id,
            name: request.name,
            args: request.args,
            needs_approval,
            status: ToolStatus::Pending,
            result: None,
            error: None,
            approved: false,
        }
    }

    fn is_runnable(&self) -> bool {
        self.status == ToolStatus::Pending && (!self.needs_approval || self.approved)
    }

    fn awaits_decision(&self) -> bool {
        self.status == ToolStatus::Pending && self.needs_approval && !self.approved
    }

    pub fn to_result(&self) -> ToolResult {
        ToolResult {
            id: self.id.clone(),
            name: self.name.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("no tool call is waiting for approval")]
    NothingPending,

    #[error("tool call {requested} is not the one awaiting approval ({pending})")]
    OutOfOrder { requested: String, pending: String },
}

/// Holds the current tool batch and runs it through the executor.
pub struct ToolGate {
    executor: Arc<dyn ToolExecutor>,
    batch: Vec<ToolInvocation>,
}

impl ToolGate {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            executor,
            batch: Vec::new(),
        }
    }

    pub fn executor(&self) -> &Arc<dyn ToolExecutor> {
        &self.executor
    }

    /// Append requests to the batch, classifying each with the executor's policy.
    /// Returns whether any of them needs approval.
    pub fn submit(&mut self, requests: Vec<ToolRequest>) -> bool {
        let mut gated = false;
        for request in requests {
            let needs_approval = self.executor.needs_approval(&request.name);
            gated |= needs_approval;
            tracing::debug!(tool = %request.name, id = %request.id, needs_approval, "Tool call queued");
            self.batch.push(ToolInvocation::from_request(request, needs_approval));
        }
        gated
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        &self.batch
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Every call in the batch has completed or failed.
    pub fn is_resolved(&self) -> bool {
        self.batch.iter().all(|call| call.status.is_resolved())
    }

    fn first_unresolved(&self) -> Option<usize> {
        self.batch.iter().position(|call| !call.status.is_resolved())
    }

    /// The earliest unresolved call, if it is blocked on a user decision.
    pub fn pending_approval(&self) -> Option<&ToolInvocation> {
        self.first_unresolved()
            .map(|index| &self.batch[index])
            .filter(|call| call.awaits_decision())
    }

    /// Record the user's decision for the call returned by [`pending_approval`](Self::pending_approval).
    ///
    /// A rejection resolves the call immediately and returns it. An approval only unblocks it;
    /// it runs on the next [`run_next`](Self::run_next).
    pub fn resolve(&mut self, id: &str, approved: bool) -> Result<Option<ToolInvocation>, GateError> {
        let index = self
            .first_unresolved()
            .filter(|index| self.batch[*index].awaits_decision())
            .ok_or(GateError::NothingPending)?;

        let call = &mut self.batch[index];
        if call.id != id {
            return Err(GateError::OutOfOrder {
                requested: id.to_string(),
                pending: call.id.clone(),
            });
        }

        if approved {
            tracing::info!(tool = %call.name, id = %call.id, "Tool call approved");
            call.approved = true;
            return Ok(None);
        }

        tracing::info!(tool = %call.name, id = %call.id, "Tool call rejected");
        call.status = ToolStatus::Error;
        call.error = Some(REJECTED_MESSAGE.to_string());
        Ok(Some(call.clone()))
    }

    /// Run the earliest unresolved call if nothing blocks it. Returns the finished call.
    pub async fn run_next(&mut self) -> Option<ToolInvocation> {
        let index = self.first_unresolved()?;
        if !self.batch[index].is_runnable() {
            return None;
        }

        self.batch[index].status = ToolStatus::Running;
        let (name, args) = {
            let call = &self.batch[index];
            (call.name.clone(), call.args.clone())
        };

        let outcome = self.executor.execute(&name, &args).await;

        let call = &mut self.batch[index];
        match outcome {
            Ok(output) => {
                call.status = ToolStatus::Complete;
                call.result = Some(output);
            }
            Err(err) => {
                call.status = ToolStatus::Error;
                call.error = Some(err.to_string());
            }
        }
        Some(call.clone())
    }

    /// Clear a fully resolved batch and return its results in order.
    pub fn take_results(&mut self) -> Vec<ToolResult> {
        std::mem::take(&mut self.batch)
            .iter()
            .map(ToolInvocation::to_result)
            .collect()
    }

    /// Drop the batch without reporting it.
    pub fn clear(&mut self) {
        if !self.batch.is_empty() {
            tracing::debug!(discarded = self.batch.len(), "Discarding tool batch");
        }
        self.batch.clear();
    }
}
