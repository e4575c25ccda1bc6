//! Modules and the factory that creates them.

use std::path::PathBuf;

use deno_ast::swc::ast;
use deno_ast::swc::ecma_visit::VisitMutWith;
use serde::Serialize;

use crate::compilation::Compilation;
use crate::error::{BundleError, BundleResult};
use crate::rewrite::RequireRewriter;
use crate::text::strip_bom;

/// Index of a module in its compilation's registry.
pub type ModuleIdx = usize;

/// Addressing record needed to create a module: produced for entries by
/// the compilation and for dependencies by the `require` rewriter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// Chunk name the module is built for.
    pub name: String,
    /// Root directory that module ids are relative to.
    pub context: PathBuf,
    /// Request as written at the call site (last segment, extension completed).
    pub raw_request: String,
    pub module_id: String,
    /// Absolute path of the module file.
    pub resource: PathBuf,
}

/// Registry key of a module. Modules are shared within a chunk, never
/// across chunks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    pub name: String,
    pub id: String,
}

/// One source file, its syntax tree and the dependencies found in it.
#[derive(Debug, Clone)]
pub struct Module {
    pub id: String,
    pub name: String,
    pub context: PathBuf,
    pub resource: PathBuf,
    pub raw_request: String,
    /// Raw file contents after reading, rewritten code after build.
    pub source: Option<String>,
    pub ast: Option<ast::Script>,
    pub dependencies: Vec<ModuleDescriptor>,
}

impl Module {
    pub fn key(&self) -> ModuleKey {
        ModuleKey {
            name: self.name.clone(),
            id: self.id.clone(),
        }
    }

    pub fn is_built(&self) -> bool {
        self.ast.is_some()
    }

    /// Reads, parses and rewrites this module.
    ///
    /// On success `source` holds the regenerated code in which every
    /// `require` call addresses its dependency by module id, and
    /// `dependencies` lists those dependencies in call-site order.
    pub async fn build(&mut self, compilation: &Compilation<'_>) -> BundleResult<()> {
        let text = compilation
            .input_fs()
            .read_file(&self.resource)
            .await
            .map_err(|err| BundleError::read(&self.resource, err))?;
        self.source = Some(strip_bom(&text).to_string());
        let source = self.source.as_deref().unwrap_or_default();

        let parser = compilation.parser();
        let mut parsed = parser.parse(&self.resource, source)?;

        let mut rewriter = RequireRewriter::new(
            &self.name,
            &self.context,
            &self.resource,
            &compilation.resolve_options().default_extension,
        );
        parsed.script.visit_mut_with(&mut rewriter);
        let dependencies = rewriter.into_dependencies();

        let code = parser.generate(&parsed)?;
        self.dependencies = dependencies;
        self.source = Some(code);
        self.ast = Some(parsed.into_script());
        Ok(())
    }
}

/// Stateless constructor of [`Module`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleFactory;

impl ModuleFactory {
    pub fn create(&self, descriptor: ModuleDescriptor) -> Module {
        Module {
            id: descriptor.module_id,
            name: descriptor.name,
            context: descriptor.context,
            resource: descriptor.resource,
            raw_request: descriptor.raw_request,
            source: None,
            ast: None,
            dependencies: Vec::new(),
        }
    }
}
