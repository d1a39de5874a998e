//! Inspection and annotation of generated workflow text.
//!
//! After execution the engine needs the workflow's canonical name (it may
//! differ from the requested one) and stamps the text with a `template`
//! back-reference so the imported workflow can be traced to its source.

use serde_yaml::{Mapping, Value};

use crate::error::CoreError;

/// Key holding the `group/slug` back-reference in a generated workflow.
pub const TEMPLATE_KEY: &str = "template";

/// Key holding the workflow name.
pub const NAME_KEY: &str = "name";

/// A generated workflow after annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedWorkflow {
    pub name: String,
    pub text: String,
}

/// Path identifying a template across groups.
pub fn template_path(group: &str, slug: &str) -> String {
    format!("{group}/{slug}")
}

/// Recover the generated workflow's name and stamp it with `group/slug`.
pub fn annotate(text: &str, group: &str, slug: &str) -> Result<AnnotatedWorkflow, CoreError> {
    let mut doc = parse(text)?;
    let name = read_name(&doc)?;

    doc.insert(
        Value::String(TEMPLATE_KEY.to_string()),
        Value::String(template_path(group, slug)),
    );
    let text = serde_yaml::to_string(&doc).map_err(|e| {
        CoreError::Validation(format!("Cannot add template info to generated workflow: {e}"))
    })?;

    Ok(AnnotatedWorkflow { name, text })
}

/// Name of a generated workflow, without modifying it.
pub fn workflow_name(text: &str) -> Result<String, CoreError> {
    read_name(&parse(text)?)
}

/// The `group/slug` back-reference, if the workflow carries one.
pub fn template_ref(text: &str) -> Option<String> {
    let doc = parse(text).ok()?;
    doc.get(TEMPLATE_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse(text: &str) -> Result<Mapping, CoreError> {
    serde_yaml::from_str::<Mapping>(text)
        .map_err(|e| CoreError::Validation(format!("Cannot parse generated workflow: {e}")))
}

fn read_name(doc: &Mapping) -> Result<String, CoreError> {
    match doc.get(NAME_KEY).and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => Ok(name.to_string()),
        _ => Err(CoreError::Validation(
            "Cannot parse generated workflow: missing workflow name".to_string(),
        )),
    }
}
