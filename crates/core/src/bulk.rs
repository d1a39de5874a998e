//! Bulk job operations: status machine, pre-flight validation and the
//! derived job status.
//!
//! A bulk job has no status column of its own; whether it is finished is
//! always computed from its operations (see [`BulkSummary`]).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::request::{check_params, TemplateRequest};
use crate::template::TemplateParameter;

/// Rejection message when two requests target the same project/workflow.
pub const DUPLICATE_REQUEST_MESSAGE: &str =
    "request should be unique for a given project key and workflow name";

/// Cause recorded on operations found in `Processing` after a restart.
pub const INTERRUPTED_CAUSE: &str = "interrupted before completion; retry required";

// ---------------------------------------------------------------------------
// Status machine
// ---------------------------------------------------------------------------

/// Lifecycle of one operation: `Pending -> Processing -> Done | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Processing => "processing",
            OperationStatus::Done => "done",
            OperationStatus::Error => "error",
        }
    }

    /// Statuses reachable from `self` in one step.
    pub fn valid_transitions(self) -> &'static [OperationStatus] {
        match self {
            OperationStatus::Pending => &[OperationStatus::Processing],
            OperationStatus::Processing => &[OperationStatus::Done, OperationStatus::Error],
            OperationStatus::Done | OperationStatus::Error => &[],
        }
    }

    pub fn can_transition_to(self, next: OperationStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Done | OperationStatus::Error)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// One apply request inside a bulk job, with its progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOperation {
    pub request: TemplateRequest,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkOperation {
    pub fn pending(request: TemplateRequest) -> Self {
        Self {
            request,
            status: OperationStatus::Pending,
            error: None,
        }
    }

    fn transition(&mut self, next: OperationStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Validation(format!(
                "Cannot transition operation for {}/{} from '{}' to '{}'",
                self.request.project_key, self.request.workflow_name, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(OperationStatus::Processing)
    }

    pub fn complete(&mut self) -> Result<(), CoreError> {
        self.transition(OperationStatus::Done)?;
        self.error = None;
        Ok(())
    }

    pub fn fail(&mut self, cause: impl Into<String>) -> Result<(), CoreError> {
        self.transition(OperationStatus::Error)?;
        self.error = Some(cause.into());
        Ok(())
    }
}

/// Wrap every request as a `Pending` operation, keeping request order.
pub fn pending_operations(requests: Vec<TemplateRequest>) -> Vec<BulkOperation> {
    requests.into_iter().map(BulkOperation::pending).collect()
}

// ---------------------------------------------------------------------------
// Pre-flight validation
// ---------------------------------------------------------------------------

/// Reject the whole batch on the first duplicate or invalid request.
pub fn validate_bulk_requests(
    parameters: &[TemplateParameter],
    requests: &[TemplateRequest],
) -> Result<(), CoreError> {
    if requests.is_empty() {
        return Err(CoreError::Validation(
            "Bulk request must contain at least one operation".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(requests.len());
    for request in requests {
        if !seen.insert(request.bulk_key()) {
            return Err(CoreError::Validation(DUPLICATE_REQUEST_MESSAGE.to_string()));
        }
        check_params(parameters, request)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Derived job status
// ---------------------------------------------------------------------------

/// Move every `Processing` operation to `Error`. Returns how many changed.
pub fn recover_interrupted(operations: &mut [BulkOperation]) -> usize {
    let mut recovered = 0;
    for op in operations
        .iter_mut()
        .filter(|op| op.status == OperationStatus::Processing)
    {
        op.status = OperationStatus::Error;
        op.error = Some(INTERRUPTED_CAUSE.to_string());
        recovered += 1;
    }
    recovered
}

/// A job is finished when every operation reached a terminal status.
pub fn is_finished(operations: &[BulkOperation]) -> bool {
    operations.iter().all(|op| op.status.is_terminal())
}

pub fn has_pending(operations: &[BulkOperation]) -> bool {
    operations
        .iter()
        .any(|op| op.status == OperationStatus::Pending)
}

/// Requests of the operations that ended in `Error`, in job order.
pub fn failed_requests(operations: &[BulkOperation]) -> Vec<TemplateRequest> {
    operations
        .iter()
        .filter(|op| op.status == OperationStatus::Error)
        .map(|op| op.request.clone())
        .collect()
}

/// Per-status counts of a bulk job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
    pub finished: bool,
}

impl BulkSummary {
    pub fn from_operations(operations: &[BulkOperation]) -> Self {
        let mut summary = BulkSummary {
            total: operations.len(),
            ..Default::default()
        };
        for op in operations {
            match op.status {
                OperationStatus::Pending => summary.pending += 1,
                OperationStatus::Processing => summary.processing += 1,
                OperationStatus::Done => summary.done += 1,
                OperationStatus::Error => summary.error += 1,
            }
        }
        summary.finished = summary.pending == 0 && summary.processing == 0;
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
