//! Tar transport format for templates and generated workflow bundles.
//!
//! Entries are classified by name (see [`classify`]), never by position:
//!
//! ```text
//! *.application.*   application definition   (any number, archive order)
//! *.pipeline.*      pipeline definition      (any number, archive order)
//! *.environment.*   environment definition   (any number, archive order)
//! workflow.yml      workflow definition      (at most one)
//! anything else     template descriptor      (at most one, YAML)
//! ```
//!
//! Encoding always writes the descriptor first, then pipelines,
//! applications and environments in template order, then the workflow.
//! Headers carry fixed metadata so re-encoding the same template is
//! byte-identical.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveErrors, CoreError};
use crate::execution::ExecutionResult;
use crate::template::{TemplateDefinition, TemplateParameter, TemplateSpec};

// ---------------------------------------------------------------------------
// Entry names
// ---------------------------------------------------------------------------

/// Exact name of the workflow definition entry.
pub const WORKFLOW_ENTRY_NAME: &str = "workflow.yml";

/// Name used for the descriptor when encoding.
pub const DESCRIPTOR_ENTRY_NAME: &str = "template.yml";

const APPLICATION_MARKER: &str = ".application.";
const PIPELINE_MARKER: &str = ".pipeline.";
const ENVIRONMENT_MARKER: &str = ".environment.";

/// File mode written on every entry.
const ENTRY_MODE: u32 = 0o644;

/// What an archive entry holds, decided from its name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Application,
    Pipeline,
    Environment,
    Workflow,
    Descriptor,
}

/// Map an entry name to its kind. Marker checks run before the exact
/// workflow name so `x.pipeline.yml` is never mistaken for anything else.
pub fn classify(name: &str) -> EntryKind {
    if name.contains(APPLICATION_MARKER) {
        EntryKind::Application
    } else if name.contains(PIPELINE_MARKER) {
        EntryKind::Pipeline
    } else if name.contains(ENVIRONMENT_MARKER) {
        EntryKind::Environment
    } else if name == WORKFLOW_ENTRY_NAME {
        EntryKind::Workflow
    } else {
        EntryKind::Descriptor
    }
}

fn entry_name(kind: EntryKind, index: usize) -> String {
    match kind {
        EntryKind::Application => format!("{index}{APPLICATION_MARKER}yml"),
        EntryKind::Pipeline => format!("{index}{PIPELINE_MARKER}yml"),
        EntryKind::Environment => format!("{index}{ENVIRONMENT_MARKER}yml"),
        EntryKind::Workflow => WORKFLOW_ENTRY_NAME.to_string(),
        EntryKind::Descriptor => DESCRIPTOR_ENTRY_NAME.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Human-editable template metadata carried in the descriptor entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<TemplateParameter>,
}

impl TemplateDescriptor {
    fn from_spec(spec: &TemplateSpec) -> Self {
        Self {
            name: spec.name.clone(),
            slug: spec.slug.clone(),
            group: spec.group.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
        }
    }

    fn into_spec(self, definition: TemplateDefinition) -> TemplateSpec {
        TemplateSpec {
            group: self.group,
            name: self.name,
            slug: self.slug,
            description: self.description,
            parameters: self.parameters,
            definition,
            import_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Read a template (or generated bundle) from a tar stream.
///
/// Structural problems are collected across the whole archive and reported
/// together as [`CoreError::InvalidArchive`]. I/O failures abort at once.
pub fn decode<R: Read>(reader: R) -> Result<TemplateSpec, CoreError> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive.entries().map_err(read_error)?;

    let mut definition = TemplateDefinition::default();
    let mut workflow_found = false;
    let mut descriptor: Option<(String, TemplateDescriptor)> = None;
    let mut errors = ArchiveErrors::new();

    for entry in entries {
        let mut entry = entry.map_err(read_error)?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let name = entry.path().map_err(read_error)?.to_string_lossy().into_owned();

        let mut raw = Vec::new();
        entry.read_to_end(&mut raw).map_err(read_error)?;
        let content = match String::from_utf8(raw) {
            Ok(content) => content,
            Err(_) => {
                errors.push(format!("Entry {name} is not valid UTF-8"));
                continue;
            }
        };

        match classify(&name) {
            EntryKind::Application => definition.applications.push(content),
            EntryKind::Pipeline => definition.pipelines.push(content),
            EntryKind::Environment => definition.environments.push(content),
            EntryKind::Workflow => {
                if workflow_found {
                    errors.push("Two workflow files found");
                    continue;
                }
                workflow_found = true;
                definition.workflow = content;
            }
            EntryKind::Descriptor => {
                if let Some((first, _)) = &descriptor {
                    errors.push(format!("Two template files found: {first} and {name}"));
                    continue;
                }
                match serde_yaml::from_str::<TemplateDescriptor>(&content) {
                    Ok(parsed) => descriptor = Some((name, parsed)),
                    Err(e) => {
                        tracing::debug!(entry = %name, error = %e, "Malformed template descriptor");
                        errors.push(format!("Unable to unmarshal template {name}: {e}"));
                    }
                }
            }
        }
    }

    if descriptor.is_none() && errors.is_empty() {
        errors.push("No template file found");
    }
    errors.into_result()?;

    let (_, descriptor) = descriptor.ok_or_else(|| {
        CoreError::Internal("descriptor missing after successful scan".to_string())
    })?;
    Ok(descriptor.into_spec(definition))
}

/// [`decode`] over an in-memory archive.
pub fn decode_bytes(bytes: &[u8]) -> Result<TemplateSpec, CoreError> {
    decode(bytes)
}

fn read_error(e: std::io::Error) -> CoreError {
    CoreError::Validation(format!("Unable to read tar file: {e}"))
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Write `spec` as a tar stream.
///
/// Without a `result` the template's own definition is written. With one,
/// the generated artifacts replace it: this is the bundle handed to the
/// workflow importer.
pub fn encode<W: Write>(
    spec: &TemplateSpec,
    result: Option<&ExecutionResult>,
    writer: W,
) -> Result<(), CoreError> {
    let descriptor = serde_yaml::to_string(&TemplateDescriptor::from_spec(spec))
        .map_err(|e| CoreError::Internal(format!("Unable to serialize template: {e}")))?;

    let (workflow, pipelines, applications, environments) = match result {
        Some(r) => (&r.workflow, &r.pipelines, &r.applications, &r.environments),
        None => {
            let d = &spec.definition;
            (&d.workflow, &d.pipelines, &d.applications, &d.environments)
        }
    };

    let mut builder = tar::Builder::new(writer);
    append(&mut builder, DESCRIPTOR_ENTRY_NAME, &descriptor)?;
    for (kind, items) in [
        (EntryKind::Pipeline, pipelines),
        (EntryKind::Application, applications),
        (EntryKind::Environment, environments),
    ] {
        for (i, content) in items.iter().enumerate() {
            append(&mut builder, &entry_name(kind, i + 1), content)?;
        }
    }
    if !workflow.is_empty() {
        append(&mut builder, &entry_name(EntryKind::Workflow, 0), workflow)?;
    }
    builder.finish().map_err(write_error)
}

/// [`encode`] into a new buffer.
pub fn encode_to_vec(
    spec: &TemplateSpec,
    result: Option<&ExecutionResult>,
) -> Result<Vec<u8>, CoreError> {
    let mut buffer = Vec::new();
    encode(spec, result, &mut buffer)?;
    Ok(buffer)
}

fn append<W: Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    content: &str,
) -> Result<(), CoreError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(ENTRY_MODE);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    builder
        .append_data(&mut header, name, content.as_bytes())
        .map_err(write_error)
}

fn write_error(e: std::io::Error) -> CoreError {
    CoreError::Internal(format!("Unable to write tar file: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
