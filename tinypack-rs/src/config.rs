//! Bundler configuration.
//!
//! Options are plain serde structs so they can be read from a camelCase JSON
//! file (`tinypack.config.json`) or assembled in code.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BundleError, BundleResult};
use crate::paths::{normalize_path, DEFAULT_EXTENSION};

/// Chunk name given to an entry configured as a bare path.
pub const DEFAULT_ENTRY_NAME: &str = "main";

/// Directory, relative to the context, that assets are written to by default.
pub const DEFAULT_OUTPUT_PATH: &str = "dist";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerOptions {
    /// Root directory that entries and module ids are relative to.
    #[serde(default)]
    pub context: PathBuf,
    pub entry: EntryConfig,
    #[serde(default)]
    pub output: OutputOptions,
    #[serde(default)]
    pub resolve: ResolveOptions,
}

/// Either a single entry path or a map from chunk name to entry path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryConfig {
    Single(String),
    Named(BTreeMap<String, String>),
}

impl Default for EntryConfig {
    fn default() -> Self {
        EntryConfig::Named(BTreeMap::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    /// Custom chunk template file. The built-in template is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            template: None,
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    /// Appended to request file names that carry no extension.
    #[serde(default = "default_extension")]
    pub default_extension: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            default_extension: default_extension(),
        }
    }
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

impl BundlerOptions {
    pub fn new(context: impl Into<PathBuf>, entry: EntryConfig) -> Self {
        Self {
            context: context.into(),
            entry,
            output: OutputOptions::default(),
            resolve: ResolveOptions::default(),
        }
    }

    /// Parses options from JSON text. Relative paths stay unresolved until
    /// [`BundlerOptions::normalize`].
    pub fn from_json(text: &str) -> BundleResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a JSON config file. A missing or relative `context` is taken
    /// relative to the file's directory.
    pub fn from_file(path: &Path) -> BundleResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| BundleError::Config(format!("failed to read {}: {}", path.display(), err)))?;
        let mut options: Self = serde_json::from_str(&text)
            .map_err(|err| BundleError::Config(format!("{}: {}", path.display(), err)))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        options.context = base.join(&options.context);
        Ok(options)
    }

    /// Makes every path absolute and validates the entry table.
    ///
    /// `cwd` anchors a relative `context`; the output path and template are
    /// anchored at the context.
    pub fn normalize(mut self, cwd: &Path) -> BundleResult<Self> {
        self.context = normalize_path(&cwd.join(&self.context));
        self.output.path = normalize_path(&self.context.join(&self.output.path));
        if let Some(template) = self.output.template.take() {
            self.output.template = Some(normalize_path(&self.context.join(template)));
        }
        if !self.resolve.default_extension.starts_with('.') {
            self.resolve.default_extension.insert(0, '.');
        }
        if self.entry_points().is_empty() {
            return Err(BundleError::Config("no entry configured".to_string()));
        }
        Ok(self)
    }

    /// `(chunk name, entry path)` pairs, in name order for named entries.
    pub fn entry_points(&self) -> Vec<(String, String)> {
        match &self.entry {
            EntryConfig::Single(path) => vec![(DEFAULT_ENTRY_NAME.to_string(), path.clone())],
            EntryConfig::Named(entries) => entries
                .iter()
                .map(|(name, path)| (name.clone(), path.clone()))
                .collect(),
        }
    }

    /// Adds or replaces a named entry, turning a single entry into a map.
    pub fn insert_entry(&mut self, name: impl Into<String>, path: impl Into<String>) {
        let mut entries = match std::mem::take(&mut self.entry) {
            EntryConfig::Single(existing) => BTreeMap::from([(DEFAULT_ENTRY_NAME.to_string(), existing)]),
            EntryConfig::Named(entries) => entries,
        };
        entries.insert(name.into(), path.into());
        self.entry = EntryConfig::Named(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_entry_defaults() {
        let options = BundlerOptions::from_json(r#"{"entry": "./src/index.js"}"#).unwrap();
        assert_eq!(options.entry, EntryConfig::Single("./src/index.js".to_string()));
        assert_eq!(options.output.path, PathBuf::from("dist"));
        assert_eq!(options.output.template, None);
        assert_eq!(options.resolve.default_extension, ".js");
        assert_eq!(
            options.entry_points(),
            vec![("main".to_string(), "./src/index.js".to_string())]
        );
    }

    #[test]
    fn test_named_entries_camel_case() {
        let options = BundlerOptions::from_json(
            r#"{
                "context": "app",
                "entry": {"vendor": "./src/vendor.js", "main": "./src/index.js"},
                "output": {"path": "build", "template": "tpl/main.js"},
                "resolve": {"defaultExtension": "mjs"}
            }"#,
        )
        .unwrap()
        .normalize(Path::new("/work"))
        .unwrap();

        assert_eq!(options.context, PathBuf::from("/work/app"));
        assert_eq!(options.output.path, PathBuf::from("/work/app/build"));
        assert_eq!(options.output.template, Some(PathBuf::from("/work/app/tpl/main.js")));
        assert_eq!(options.resolve.default_extension, ".mjs");
        let names: Vec<_> = options.entry_points().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["main", "vendor"]);
    }

    #[test]
    fn test_normalize_rejects_missing_entries() {
        let options = BundlerOptions::new("/work", EntryConfig::default());
        let err = options.normalize(Path::new("/")).unwrap_err();
        assert!(matches!(err, BundleError::Config(_)));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = BundlerOptions::from_json(r#"{"entry": 42}"#).unwrap_err();
        assert!(matches!(err, BundleError::Config(_)));
    }

    #[test]
    fn test_insert_entry_promotes_single() {
        let mut options = BundlerOptions::new("/work", EntryConfig::Single("./a.js".to_string()));
        options.insert_entry("vendor", "./v.js");
        assert_eq!(
            options.entry_points(),
            vec![
                ("main".to_string(), "./a.js".to_string()),
                ("vendor".to_string(), "./v.js".to_string()),
            ]
        );
    }

    #[test]
    fn test_from_file_anchors_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tinypack.config.json");
        std::fs::write(&path, r#"{"entry": "./src/index.js"}"#).unwrap();

        let options = BundlerOptions::from_file(&path)
            .unwrap()
            .normalize(Path::new("/elsewhere"))
            .unwrap();
        assert_eq!(options.context, normalize_path(dir.path()));
        assert_eq!(options.output.path, normalize_path(&dir.path().join("dist")));
    }

    #[test]
    fn test_invalid_config_file_names_the_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tinypack.config.json");
        std::fs::write(&path, r#"{"entry": "#).unwrap();

        let err = BundlerOptions::from_file(&path).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, BundleError::Config(_)));
        assert!(message.starts_with(&format!("Invalid configuration: {}: ", path.display())), "{message}");
        assert_eq!(message.matches("Invalid configuration").count(), 1, "{message}");
    }
}
