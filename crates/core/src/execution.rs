//! Template execution: substitute instance values into a template definition.
//!
//! The engine only depends on the [`TemplateExecutor`] contract. The
//! [`PlaceholderExecutor`] shipped here understands `{{ .name }}`,
//! `{{ .id }}` and `{{ .params.<key> }}` actions.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::request::TemplateRequest;
use crate::template::TemplateDefinition;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Values available to a template while it is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub instance_id: DbId,
    pub workflow_name: String,
    pub parameters: BTreeMap<String, String>,
}

impl ExecutionContext {
    pub fn new(instance_id: DbId, request: &TemplateRequest) -> Self {
        Self {
            instance_id,
            workflow_name: request.workflow_name.clone(),
            parameters: request.parameters.clone(),
        }
    }
}

/// Generated workflow text plus the generated supporting artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub workflow: String,
    #[serde(default)]
    pub pipelines: Vec<String>,
    #[serde(default)]
    pub applications: Vec<String>,
    #[serde(default)]
    pub environments: Vec<String>,
}

/// Turns a template definition into a concrete workflow bundle.
///
/// Called with `context = None` to check that a definition is well formed
/// before any instance exists (template create/update).
pub trait TemplateExecutor: Send + Sync {
    fn execute(
        &self,
        definition: &TemplateDefinition,
        context: Option<&ExecutionContext>,
    ) -> Result<ExecutionResult, CoreError>;
}

// ---------------------------------------------------------------------------
// Placeholder executor
// ---------------------------------------------------------------------------

const ACTION_OPEN: &str = "{{";
const ACTION_CLOSE: &str = "}}";

/// Accepted action bodies: `.name`, `.id`, `.params.<key>`.
static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.(name|id|params\.([a-zA-Z0-9._-]+))$").expect("valid regex")
});

/// Default executor based on `{{ .variable }}` substitution.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderExecutor;

impl TemplateExecutor for PlaceholderExecutor {
    fn execute(
        &self,
        definition: &TemplateDefinition,
        context: Option<&ExecutionContext>,
    ) -> Result<ExecutionResult, CoreError> {
        let render_all = |kind: &str, sources: &[String]| -> Result<Vec<String>, CoreError> {
            sources
                .iter()
                .enumerate()
                .map(|(i, src)| render(&format!("{kind} {}", i + 1), src, context))
                .collect()
        };

        Ok(ExecutionResult {
            workflow: render("workflow", &definition.workflow, context)?,
            pipelines: render_all("pipeline", &definition.pipelines)?,
            applications: render_all("application", &definition.applications)?,
            environments: render_all("environment", &definition.environments)?,
        })
    }
}

fn render(
    location: &str,
    source: &str,
    context: Option<&ExecutionContext>,
) -> Result<String, CoreError> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find(ACTION_OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + ACTION_OPEN.len()..];
        let end = after_open.find(ACTION_CLOSE).ok_or_else(|| {
            CoreError::Validation(format!("Invalid template {location}: unclosed action"))
        })?;
        let body = after_open[..end].trim();
        out.push_str(&resolve(location, body, context)?);
        rest = &after_open[end + ACTION_CLOSE.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve(
    location: &str,
    body: &str,
    context: Option<&ExecutionContext>,
) -> Result<String, CoreError> {
    let caps = ACTION_RE.captures(body).ok_or_else(|| {
        CoreError::Validation(format!(
            "Invalid template {location}: unknown action '{{{{ {body} }}}}'"
        ))
    })?;

    let Some(ctx) = context else {
        return Ok(String::new());
    };

    let value = match (&caps[1], caps.get(2)) {
        ("name", _) => ctx.workflow_name.clone(),
        ("id", _) => ctx.instance_id.to_string(),
        (_, Some(key)) => ctx
            .parameters
            .get(key.as_str())
            .cloned()
            .unwrap_or_default(),
        _ => String::new(),
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
