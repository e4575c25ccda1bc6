//! Snapshot of a finished compilation.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::compilation::Compilation;
use crate::error::BundleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStats {
    pub id: String,
    pub name: String,
    pub resource: PathBuf,
    /// Module ids of the dependencies, in call-site order.
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStats {
    pub name: String,
    /// Id of the chunk's entry module.
    pub entry: String,
    pub modules: Vec<String>,
    pub files: Vec<String>,
}

/// What a build produced and what went wrong, detached from the
/// compilation it was taken from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub entries: Vec<String>,
    pub modules: Vec<ModuleStats>,
    pub chunks: Vec<ChunkStats>,
    pub files: Vec<String>,
    /// Error messages, in entry order.
    #[serde(rename = "errors")]
    error_messages: Vec<String>,
    #[serde(skip)]
    errors: Vec<BundleError>,
}

impl Stats {
    pub fn from_compilation(compilation: &Compilation<'_>) -> Self {
        let modules = compilation.modules();
        let module_id = |idx: usize| modules.get(idx).map(|module| module.id.clone()).unwrap_or_default();

        let errors: Vec<BundleError> = compilation.errors().to_vec();
        Stats {
            entries: compilation.entries().iter().map(|&idx| module_id(idx)).collect(),
            modules: modules
                .iter()
                .filter(|module| module.is_built())
                .map(|module| ModuleStats {
                    id: module.id.clone(),
                    name: module.name.clone(),
                    resource: module.resource.clone(),
                    dependencies: module
                        .dependencies
                        .iter()
                        .map(|dependency| dependency.module_id.clone())
                        .collect(),
                })
                .collect(),
            chunks: compilation
                .chunks()
                .iter()
                .map(|chunk| ChunkStats {
                    name: chunk.name.clone(),
                    entry: module_id(chunk.entry_module),
                    modules: chunk.modules.iter().map(|&idx| module_id(idx)).collect(),
                    files: chunk.files.clone(),
                })
                .collect(),
            files: compilation.files().to_vec(),
            error_messages: errors.iter().map(ToString::to_string).collect(),
            errors,
        }
    }

    pub fn errors(&self) -> &[BundleError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in &self.chunks {
            writeln!(
                f,
                "chunk {} [entry {}] {} module(s) -> {}",
                chunk.name,
                chunk.entry,
                chunk.modules.len(),
                chunk.files.join(", ")
            )?;
            for module in &chunk.modules {
                writeln!(f, "  {module}")?;
            }
        }
        for error in &self.errors {
            writeln!(f, "ERROR {error}")?;
        }
        Ok(())
    }
}
