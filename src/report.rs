//! Report document types and text rendering.
//!
//! A [`Report`] is built incrementally during a run, serialized exactly
//! once as pretty-printed JSON, and immutable thereafter. The same types
//! deserialize an existing report so it can be re-rendered as indented
//! human-readable text.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::container::CommandResult;
use crate::error::{Error, Result};

/// Definition keys rendered first, in this order. Remaining keys follow
/// in their natural document order.
const PREFERRED_KEY_ORDER: [&str; 5] = [
    "base_image",
    "prepare",
    "target_dirs",
    "exclude_paths",
    "omit_diff_paths",
];

// =============================================================================
// Report Types
// =============================================================================

/// Metadata block of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Local timestamp of report generation (`%Y-%m-%d %H:%M:%S`).
    pub generated_on: String,
    /// Name of the container tool that drove the run.
    pub container_tool: String,
    /// Optional run title, single line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional run description, may span lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One before/after command-output comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDiff {
    /// The captured command.
    pub command: String,
    /// Outfile name from the configuration.
    pub diff_file: String,
    /// Diff text, or an explicit skip reason when a capture was missing.
    pub diff_content: Option<String>,
}

/// The synthesized diff sections of the report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffReports {
    /// Terse per-path status lines.
    #[serde(default)]
    pub filesystem_rq: Option<Vec<String>>,
    /// Full unified diff, one block per path.
    #[serde(rename = "filesystem_urN", default)]
    pub filesystem_urn: Option<Vec<String>>,
    /// Before/after command-output diffs.
    #[serde(default)]
    pub command_outputs: Vec<CommandDiff>,
}

/// The final output document of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub report_metadata: ReportMetadata,
    /// The effective configuration, minus the metadata fields promoted
    /// into [`ReportMetadata`].
    pub definitions: Mapping,
    pub main_operation_results: Vec<CommandResult>,
    pub diff_reports: DiffReports,
}

impl Report {
    /// Assembles a report from its parts. Purely structural; the
    /// `definitions` document is stored as given.
    pub fn assemble(
        metadata: ReportMetadata,
        definitions: Mapping,
        main_operation_results: Vec<CommandResult>,
        diff_reports: DiffReports,
    ) -> Self {
        Self {
            report_metadata: metadata,
            definitions,
            main_operation_results,
            diff_reports,
        }
    }

    /// Writes the report as pretty-printed JSON, creating parent
    /// directories as needed.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut json =
            serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        json.push('\n');
        fs::write(path, json)?;
        Ok(())
    }

    /// Loads a report previously written with [`Report::write_json`].
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Renders the report as indented human-readable text.
    ///
    /// Pure function of the report value: rendering the same report twice
    /// yields byte-identical output.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        let meta = &self.report_metadata;
        lines.push(format!("Report generated on: {}", meta.generated_on));
        lines.push(format!("Container tool: {}", meta.container_tool));
        if let Some(title) = &meta.title {
            lines.push(format!("Title: {title}"));
        }
        if let Some(description) = &meta.description {
            lines.push("Description:".to_string());
            push_indented(&mut lines, description, 2);
        }
        lines.push(String::new());

        if !self.definitions.is_empty() {
            lines.push("Definitions:".to_string());
            for (key, value) in ordered_definitions(&self.definitions) {
                render_definition(&mut lines, key, value);
            }
            lines.push(String::new());
        }

        lines.push("Main operation results:".to_string());
        for entry in &self.main_operation_results {
            lines.push(format!(
                "- {} (exit code {})",
                entry.command, entry.return_code
            ));
            if !entry.stdout.is_empty() {
                lines.push("  stdout:".to_string());
                push_indented(&mut lines, &entry.stdout, 4);
            }
            if !entry.stderr.is_empty() {
                lines.push("  stderr:".to_string());
                push_indented(&mut lines, &entry.stderr, 4);
            }
        }
        lines.push(String::new());

        lines.push("Filesystem diff (rq):".to_string());
        for item in self.diff_reports.filesystem_rq.iter().flatten() {
            lines.push(format!("  - {item}"));
        }
        lines.push(String::new());

        lines.push("Filesystem diff (urN):".to_string());
        for block in self.diff_reports.filesystem_urn.iter().flatten() {
            let mut parts = block.lines();
            if let Some(head) = parts.next() {
                lines.push(format!("  - {head}"));
            }
            for rest in parts {
                lines.push(format!("    {rest}"));
            }
        }
        lines.push(String::new());

        for entry in &self.diff_reports.command_outputs {
            lines.push(format!(
                "Command diff for: {} (file: {})",
                entry.command, entry.diff_file
            ));
            match entry.diff_content.as_deref().filter(|c| !c.is_empty()) {
                Some(content) => push_indented(&mut lines, content, 2),
                None => lines.push("  No diff content available.".to_string()),
            }
            lines.push(String::new());
        }

        let joined = lines.join("\n");
        format!("{}\n", joined.trim_end())
    }
}

/// Loads the JSON report at `path` and renders it to text.
pub fn render_report_file(path: &Path) -> Result<String> {
    Ok(Report::load_json(path)?.render())
}

// =============================================================================
// Definitions Rendering
// =============================================================================

fn ordered_definitions(definitions: &Mapping) -> Vec<(&str, &Value)> {
    let mut ordered = Vec::new();
    for key in PREFERRED_KEY_ORDER {
        if let Some(value) = definitions.get(key) {
            ordered.push((key, value));
        }
    }
    for (key, value) in definitions {
        let Some(name) = key.as_str() else { continue };
        if name == "command_diff" || PREFERRED_KEY_ORDER.contains(&name) {
            continue;
        }
        ordered.push((name, value));
    }
    ordered
}

fn render_definition(lines: &mut Vec<String>, key: &str, value: &Value) {
    // main_operation.commands duplicates the results block; drop it, and
    // drop the whole key when nothing else remains.
    if key == "main_operation" {
        if let Value::Mapping(map) = value {
            let remaining: Mapping = map
                .iter()
                .filter(|(k, _)| k.as_str() != Some("commands"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if remaining.is_empty() {
                return;
            }
            lines.push(format!("- {key}:"));
            render_value(lines, &Value::Mapping(remaining), 2);
            return;
        }
    }
    if key == "prepare" {
        if let Value::Mapping(map) = value {
            render_prepare(lines, map);
            return;
        }
    }
    lines.push(format!("- {key}:"));
    render_value(lines, value, 2);
}

fn render_prepare(lines: &mut Vec<String>, prepare: &Mapping) {
    lines.push("- prepare:".to_string());
    for (key, value) in prepare {
        let Some(name) = key.as_str() else { continue };
        match name {
            "copy_files" => {
                lines.push("  copy_files:".to_string());
                for entry in value.as_sequence().into_iter().flatten() {
                    let src = entry.get("src").and_then(Value::as_str).unwrap_or("?");
                    let dest = entry.get("dest").and_then(Value::as_str).unwrap_or("?");
                    lines.push(format!("    - {src} -> {dest}"));
                }
            }
            "commands" => {
                lines.push("  commands:".to_string());
                for item in value.as_sequence().into_iter().flatten() {
                    lines.push(format!("    - {}", scalar_text(item)));
                }
            }
            _ => {
                lines.push(format!("  {name}:"));
                render_value(lines, value, 4);
            }
        }
    }
}

fn render_value(lines: &mut Vec<String>, value: &Value, indent: usize) {
    let pad = " ".repeat(indent);
    match value {
        Value::Sequence(items) => {
            for item in items {
                lines.push(format!("{pad}- {}", scalar_text(item)));
            }
        }
        Value::Mapping(map) => {
            for (key, nested) in map {
                let name = key.as_str().map(String::from).unwrap_or_else(|| scalar_text(key));
                match nested {
                    Value::Sequence(_) | Value::Mapping(_) => {
                        lines.push(format!("{pad}{name}:"));
                        render_value(lines, nested, indent + 2);
                    }
                    scalar => lines.push(format!("{pad}{name}: {}", scalar_text(scalar))),
                }
            }
        }
        scalar => lines.push(format!("{pad}{}", scalar_text(scalar))),
    }
}

/// Renders a scalar as plain text; nested values fall back to one-line
/// JSON.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}

fn push_indented(lines: &mut Vec<String>, text: &str, indent: usize) {
    let pad = " ".repeat(indent);
    for line in text.lines() {
        lines.push(format!("{pad}{line}"));
    }
}
