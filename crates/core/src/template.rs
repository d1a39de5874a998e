//! Workflow template data model and validation.
//!
//! A [`TemplateSpec`] is the portable form of a template: what an archive
//! carries and what callers submit on create/update. The persisted row
//! (with id, group id and version) lives in the db crate.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Pattern shared by template slugs and parameter keys.
pub const SLUG_PATTERN: &str = r"^[a-zA-Z0-9._-]+$";

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SLUG_PATTERN).expect("valid regex"));

/// Maximum length of a template name.
pub const MAX_TEMPLATE_NAME_LENGTH: usize = 200;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Type of a template parameter, checked when a request is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParameterType {
    #[default]
    String,
    Boolean,
    Repository,
    Json,
    SshKey,
    PgpKey,
}

/// A parameter declared by a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub key: String,
    #[serde(rename = "type", default)]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// Raw definition content: a workflow template plus its sub-templates.
///
/// Sub-template order is significant; it is preserved through storage and
/// archive round trips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub workflow: String,
    #[serde(default)]
    pub pipelines: Vec<String>,
    #[serde(default)]
    pub applications: Vec<String>,
    #[serde(default)]
    pub environments: Vec<String>,
}

impl TemplateDefinition {
    /// Number of pipeline/application/environment sub-templates.
    pub fn sub_definition_count(&self) -> usize {
        self.pipelines.len() + self.applications.len() + self.environments.len()
    }
}

// ---------------------------------------------------------------------------
// Spec
// ---------------------------------------------------------------------------

/// Portable template content, independent of persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Owning group name. Required for archive pushes; API callers may
    /// reference the group by id instead.
    #[serde(default)]
    pub group: Option<String>,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
    #[serde(default)]
    pub definition: TemplateDefinition,
    /// URL the template content is downloaded from, if any.
    #[serde(default)]
    pub import_url: Option<String>,
}

impl TemplateSpec {
    /// Fill an empty slug from the template name.
    pub fn ensure_slug(&mut self) {
        if self.slug.is_empty() {
            self.slug = slugify(&self.name);
        }
    }

    /// Check name, slug and parameter declarations.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "Template name must not be empty".to_string(),
            ));
        }
        if self.name.len() > MAX_TEMPLATE_NAME_LENGTH {
            return Err(CoreError::Validation(format!(
                "Template name exceeds maximum length of {MAX_TEMPLATE_NAME_LENGTH} characters (got {})",
                self.name.len()
            )));
        }
        if !SLUG_RE.is_match(&self.slug) {
            return Err(CoreError::Validation(format!(
                "Invalid template slug '{}', must match {SLUG_PATTERN}",
                self.slug
            )));
        }
        validate_parameters(&self.parameters)
    }

    /// Overwrite the editable fields with those of `other`.
    ///
    /// Used on update: the stored template keeps its identity while
    /// every content field comes from the request.
    pub fn merge_from(&mut self, other: TemplateSpec) {
        self.name = other.name;
        if !other.slug.is_empty() {
            self.slug = other.slug;
        }
        if other.group.is_some() {
            self.group = other.group;
        }
        self.description = other.description;
        self.parameters = other.parameters;
        self.definition = other.definition;
        self.import_url = other.import_url;
    }
}

/// Parameter keys must be non-empty, unique and slug-shaped.
pub fn validate_parameters(parameters: &[TemplateParameter]) -> Result<(), CoreError> {
    let mut seen = HashSet::with_capacity(parameters.len());
    for p in parameters {
        if !SLUG_RE.is_match(&p.key) {
            return Err(CoreError::Validation(format!(
                "Invalid parameter key '{}', must match {SLUG_PATTERN}",
                p.key
            )));
        }
        if !seen.insert(p.key.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate parameter key '{}'",
                p.key
            )));
        }
    }
    Ok(())
}

/// Lowercase, replace runs of non-alphanumerics with a single dash, trim dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
