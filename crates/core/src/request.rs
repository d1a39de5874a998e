//! Apply requests and their validation against a template's parameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::template::{ParameterType, TemplateParameter};

/// A request to generate a workflow from a template for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRequest {
    pub project_key: String,
    /// Desired name of the generated workflow.
    pub workflow_name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Preview only: the instance is never persisted.
    #[serde(default)]
    pub detached: bool,
}

impl TemplateRequest {
    /// Key that must be unique across the operations of one bulk job.
    pub fn bulk_key(&self) -> (&str, &str) {
        (&self.project_key, &self.workflow_name)
    }
}

/// Check a request against the parameters declared by a template.
pub fn check_params(
    parameters: &[TemplateParameter],
    request: &TemplateRequest,
) -> Result<(), CoreError> {
    if request.project_key.is_empty() {
        return Err(CoreError::Validation(
            "Project key is required".to_string(),
        ));
    }
    if request.workflow_name.is_empty() {
        return Err(CoreError::Validation(
            "Workflow name is required".to_string(),
        ));
    }

    for p in parameters {
        let value = request.parameters.get(&p.key).map(String::as_str);
        match value {
            None | Some("") if p.required => {
                return Err(CoreError::Validation(format!(
                    "Param {} is required",
                    p.key
                )));
            }
            None | Some("") => continue,
            Some(v) => check_value(p, v)?,
        }
    }
    Ok(())
}

fn check_value(p: &TemplateParameter, value: &str) -> Result<(), CoreError> {
    match p.param_type {
        ParameterType::Boolean => {
            if value != "true" && value != "false" {
                return Err(CoreError::Validation(format!(
                    "Param {} should be a boolean, got '{value}'",
                    p.key
                )));
            }
        }
        ParameterType::Repository => {
            let segments: Vec<&str> = value.split('/').collect();
            if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
                return Err(CoreError::Validation(format!(
                    "Param {} should be a repository like 'vcs-server/owner/name', got '{value}'",
                    p.key
                )));
            }
        }
        ParameterType::Json => {
            if let Err(e) = serde_json::from_str::<serde_json::Value>(value) {
                return Err(CoreError::Validation(format!(
                    "Param {} should be valid JSON: {e}",
                    p.key
                )));
            }
        }
        ParameterType::String | ParameterType::SshKey | ParameterType::PgpKey => {}
    }
    Ok(())
}
