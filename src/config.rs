//! Layered configuration resolution.
//!
//! A run is described by a YAML document that may name zero or more base
//! documents in its `extends` field. Resolution parses each document,
//! re-anchors relative `prepare.copy_files[].src` entries at the root
//! document's directory, recursively merges the extends chain (later
//! documents win), and normalizes the merged result.
//!
//! ## Merge Rules
//!
//! When merging a document over an accumulator:
//!
//! - sequences are concatenated (accumulator first, document appended)
//! - mappings are merged recursively
//! - any other value replaces whatever was at that key
//!
//! Lists are never de-duplicated at merge time. Only the final
//! normalization step removes duplicates, and only for `target_dirs`,
//! `exclude_paths`, and `omit_diff_paths`, preserving first-seen order.
//!
//! ## Path Anchoring
//!
//! A relative `copy_files[].src` in a document reached via `extends` is
//! resolved against that document's own directory, then re-expressed
//! relative to the root document's directory. After full resolution every
//! source path is anchored consistently regardless of how deep in the
//! chain it originated. Paths outside the root tree come out with `..`
//! components rather than as absolute host paths.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::constants::MAX_CONFIG_SIZE;
use crate::error::{Error, Result};

/// Keys whose list values are de-duplicated after the merge completes.
const DEDUP_KEYS: [&str; 3] = ["target_dirs", "exclude_paths", "omit_diff_paths"];

// =============================================================================
// Effective Configuration
// =============================================================================

/// One `prepare.copy_files` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFile {
    /// Host source path, anchored at the root configuration directory.
    pub src: String,
    /// Destination path inside the container.
    pub dest: String,
}

/// One `command_diff` entry: a command captured before and after the main
/// operation, and the basename under which its stdout is staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDiffSpec {
    pub command: String,
    pub outfile: String,
}

/// The fully merged, extends-resolved, path-rewritten configuration.
///
/// Contains no `extends` key. Accessors pull typed views out of the
/// underlying document; unknown keys are preserved and end up verbatim in
/// the report's definitions block.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    doc: Mapping,
}

impl EffectiveConfig {
    /// Returns the underlying document.
    pub fn document(&self) -> &Mapping {
        &self.doc
    }

    /// Consumes the config, returning the underlying document.
    pub fn into_document(self) -> Mapping {
        self.doc
    }

    /// Returns the container image to instantiate.
    ///
    /// # Errors
    /// Returns [`Error::MissingBaseImage`] when the key is absent or not a
    /// string.
    pub fn base_image(&self) -> Result<&str> {
        self.doc
            .get("base_image")
            .and_then(Value::as_str)
            .ok_or(Error::MissingBaseImage)
    }

    /// Returns the host-to-container copies performed before start.
    ///
    /// Entries missing `src` or `dest` are skipped.
    pub fn copy_files(&self) -> Vec<CopyFile> {
        let Some(seq) = self
            .doc
            .get("prepare")
            .and_then(|p| p.get("copy_files"))
            .and_then(Value::as_sequence)
        else {
            return Vec::new();
        };
        seq.iter()
            .filter_map(|entry| {
                let src = entry.get("src").and_then(Value::as_str)?;
                let dest = entry.get("dest").and_then(Value::as_str)?;
                Some(CopyFile {
                    src: src.to_string(),
                    dest: dest.to_string(),
                })
            })
            .collect()
    }

    /// Returns the shell commands run once after start, before the
    /// baseline capture.
    pub fn prepare_commands(&self) -> Vec<String> {
        string_list(self.doc.get("prepare").and_then(|p| p.get("commands")))
    }

    /// Returns the in-container paths exported for filesystem diffing.
    pub fn target_dirs(&self) -> Vec<String> {
        string_list(self.doc.get("target_dirs"))
    }

    /// Returns the path patterns dropped entirely from filesystem diffs.
    pub fn exclude_paths(&self) -> Vec<String> {
        string_list(self.doc.get("exclude_paths"))
    }

    /// Returns the path patterns whose full-diff bodies are redacted.
    pub fn omit_diff_paths(&self) -> Vec<String> {
        string_list(self.doc.get("omit_diff_paths"))
    }

    /// Returns the commands captured before/after for text diffing.
    pub fn command_diffs(&self) -> Vec<CommandDiffSpec> {
        let Some(seq) = self.doc.get("command_diff").and_then(Value::as_sequence) else {
            return Vec::new();
        };
        seq.iter()
            .filter_map(|entry| {
                let command = entry.get("command").and_then(Value::as_str)?;
                let outfile = entry.get("outfile").and_then(Value::as_str)?;
                Some(CommandDiffSpec {
                    command: command.to_string(),
                    outfile: outfile.to_string(),
                })
            })
            .collect()
    }

    /// Returns the commands under analysis.
    pub fn main_operation_commands(&self) -> Vec<String> {
        string_list(
            self.doc
                .get("main_operation")
                .and_then(|m| m.get("commands")),
        )
    }

    /// Removes and returns the report title, if any.
    pub fn take_title(&mut self) -> Option<String> {
        take_string(&mut self.doc, "title")
    }

    /// Removes and returns the report description, if any.
    pub fn take_description(&mut self) -> Option<String> {
        take_string(&mut self.doc, "description")
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(seq) = value.and_then(Value::as_sequence) else {
        return Vec::new();
    };
    seq.iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect()
}

fn take_string(doc: &mut Mapping, key: &str) -> Option<String> {
    match doc.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            // Non-string metadata is dropped rather than rendered raw.
            debug!("Ignoring non-string '{key}' value: {other:?}");
            None
        }
        None => None,
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolves the configuration document at `path`, processing `extends`.
///
/// All relative paths in the result are anchored at `path`'s directory,
/// which is treated as the root directory for the whole chain.
///
/// # Errors
///
/// - [`Error::ConfigNotFound`] when a document in the chain is missing
/// - [`Error::YamlParse`] on malformed input (propagated, not retried)
/// - [`Error::ConfigTooLarge`] when a document exceeds [`MAX_CONFIG_SIZE`]
/// - [`Error::CyclicExtends`] when a document reappears in its own chain
pub fn resolve(path: &Path) -> Result<EffectiveConfig> {
    let root_dir = normalize_path(&absolutize(parent_dir(path)));
    let mut chain: Vec<PathBuf> = Vec::new();
    let doc = resolve_document(path, &root_dir, &mut chain)?;
    info!("Configuration loaded successfully.");
    Ok(EffectiveConfig { doc })
}

fn resolve_document(path: &Path, root_dir: &Path, chain: &mut Vec<PathBuf>) -> Result<Mapping> {
    let canonical = normalize_path(&absolutize(path));
    if chain.contains(&canonical) {
        return Err(Error::CyclicExtends { path: canonical });
    }
    chain.push(canonical);
    let resolved = resolve_document_inner(path, root_dir, chain);
    chain.pop();
    resolved
}

fn resolve_document_inner(
    path: &Path,
    root_dir: &Path,
    chain: &mut Vec<PathBuf>,
) -> Result<Mapping> {
    info!("Loading configuration from '{}'...", path.display());
    let mut doc = parse_document(path)?;

    // Anchor relative copy sources before this document is merged with its
    // ancestors; the anchoring depends on which file they were written in.
    let doc_dir = parent_dir(path);
    rewrite_copy_sources(&mut doc, doc_dir, root_dir);

    let extends = take_extends(&mut doc)?;

    let mut combined = Mapping::new();
    for ext in extends {
        let mut ext_path = PathBuf::from(&ext);
        if ext_path.is_relative() {
            ext_path = doc_dir.join(ext_path);
        }
        let extended = resolve_document(&ext_path, root_dir, chain)?;
        merge_mapping(&mut combined, extended);
    }
    merge_mapping(&mut combined, doc);

    collapse_title(&mut combined);
    for key in DEDUP_KEYS {
        dedup_list(&mut combined, key);
    }
    Ok(combined)
}

fn parse_document(path: &Path) -> Result<Mapping> {
    if !path.is_file() {
        return Err(Error::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let size = fs::metadata(path)?.len();
    if size > MAX_CONFIG_SIZE {
        return Err(Error::ConfigTooLarge {
            path: path.to_path_buf(),
            size,
            limit: MAX_CONFIG_SIZE,
        });
    }
    let raw = fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&raw).map_err(|e| Error::YamlParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(doc) => Ok(doc),
        _ => Err(Error::YamlParse {
            path: path.to_path_buf(),
            reason: "top-level value must be a mapping".to_string(),
        }),
    }
}

fn take_extends(doc: &mut Mapping) -> Result<Vec<String>> {
    match doc.remove("extends") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s]),
        Some(Value::Sequence(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(Error::InvalidConfig(format!(
                    "'extends' entries must be strings, got: {other:?}"
                ))),
            })
            .collect(),
        Some(other) => Err(Error::InvalidConfig(format!(
            "'extends' must be a string or a sequence of strings, got: {other:?}"
        ))),
    }
}

/// Merges `new` into `base`: sequences append, mappings recurse, anything
/// else replaces. Merged keys keep their original position.
fn merge_mapping(base: &mut Mapping, new: Mapping) {
    use serde_yaml::mapping::Entry;

    for (key, value) in new {
        match base.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => merge_into_slot(slot.get_mut(), value),
        }
    }
}

fn merge_into_slot(existing: &mut Value, value: Value) {
    match value {
        Value::Sequence(items) => {
            if let Value::Sequence(seq) = existing {
                seq.extend(items);
            } else {
                *existing = Value::Sequence(items);
            }
        }
        Value::Mapping(map) => {
            if let Value::Mapping(inner) = existing {
                merge_mapping(inner, map);
            } else {
                let mut fresh = Mapping::new();
                merge_mapping(&mut fresh, map);
                *existing = Value::Mapping(fresh);
            }
        }
        other => *existing = other,
    }
}

fn rewrite_copy_sources(doc: &mut Mapping, doc_dir: &Path, root_dir: &Path) {
    let Some(entries) = doc
        .get_mut("prepare")
        .and_then(|p| p.get_mut("copy_files"))
        .and_then(Value::as_sequence_mut)
    else {
        return;
    };
    for entry in entries {
        let Some(mapping) = entry.as_mapping_mut() else {
            continue;
        };
        let Some(src) = mapping.get("src").and_then(Value::as_str) else {
            continue;
        };
        let src_path = Path::new(src);
        if src_path.is_absolute() {
            continue;
        }
        let resolved = normalize_path(&absolutize(&doc_dir.join(src_path)));
        let rewritten = relative_to(&resolved, root_dir);
        mapping.insert(
            Value::from("src"),
            Value::from(rewritten.to_string_lossy().into_owned()),
        );
    }
}

fn collapse_title(doc: &mut Mapping) {
    let collapsed = match doc.get("title") {
        Some(Value::String(title)) => title.lines().collect::<Vec<_>>().join(" "),
        _ => return,
    };
    doc.insert(Value::from("title"), Value::from(collapsed));
}

fn dedup_list(doc: &mut Mapping, key: &str) {
    let Some(Value::Sequence(items)) = doc.get_mut(key) else {
        return;
    };
    let mut seen: Vec<Value> = Vec::new();
    items.retain(|item| {
        if seen.contains(item) {
            false
        } else {
            seen.push(item.clone());
            true
        }
    });
}

// =============================================================================
// Path Helpers
// =============================================================================

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Lexically normalizes a path: strips `.` components and resolves `..`
/// against preceding normal components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Re-expresses `path` relative to `base`. Both must be absolute and
/// normalized. Paths outside `base`'s tree come out with `..` components.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path_comps: Vec<Component> = path.components().collect();
    let base_comps: Vec<Component> = base.components().collect();
    let mut shared = 0;
    while shared < path_comps.len()
        && shared < base_comps.len()
        && path_comps[shared] == base_comps[shared]
    {
        shared += 1;
    }
    let mut out = PathBuf::new();
    for _ in shared..base_comps.len() {
        out.push("..");
    }
    for comp in &path_comps[shared..] {
        out.push(comp.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
