//! Build lifecycle: compile, seal, emit.

use std::rc::Rc;

use crate::compilation::{Compilation, CompilationParams};
use crate::config::BundlerOptions;
use crate::error::{BundleError, BundleResult};
use crate::fs::{InputFileSystem, NativeFileSystem, OutputFileSystem};
use crate::hooks::{HookEvent, HookFlow, Hooks};
use crate::module::ModuleFactory;
use crate::parser::JavaScriptParser;
use crate::stats::Stats;
use crate::template::Template;

/// Owns the options, the file systems and the hooks, and drives one
/// [`Compilation`] per run.
pub struct Compiler {
    options: BundlerOptions,
    input_fs: Rc<dyn InputFileSystem>,
    output_fs: Rc<dyn OutputFileSystem>,
    hooks: Hooks,
}

impl Compiler {
    /// Creates a compiler that reads and writes the local disk.
    pub fn new(options: BundlerOptions) -> Self {
        let fs = Rc::new(NativeFileSystem);
        Self::with_file_systems(options, fs.clone(), fs)
    }

    pub fn with_file_systems(
        options: BundlerOptions,
        input_fs: Rc<dyn InputFileSystem>,
        output_fs: Rc<dyn OutputFileSystem>,
    ) -> Self {
        Self {
            options,
            input_fs,
            output_fs,
            hooks: Hooks::new(),
        }
    }

    pub fn options(&self) -> &BundlerOptions {
        &self.options
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    /// Runs a full build and writes its assets.
    ///
    /// Entries that fail to build are reported in [`Stats::errors`]; the
    /// other entries are still sealed and emitted. `Err` is returned only
    /// for errors that stop the whole run.
    pub async fn run(&self) -> BundleResult<Stats> {
        self.hooks.call_async(&HookEvent::BeforeRun(&self.options)).await?;
        self.hooks.call_async(&HookEvent::Run(&self.options)).await?;

        let compilation = self.compile().await?;
        self.emit_assets(&compilation).await?;

        let stats = Stats::from_compilation(&compilation);
        self.hooks.call_async(&HookEvent::Done(&stats)).await?;
        log::debug!(
            target: "tinypack",
            "run finished: {} file(s), {} error(s)",
            stats.files.len(),
            stats.errors().len()
        );
        Ok(stats)
    }

    /// Builds every configured entry and seals the result, without writing.
    pub async fn compile(&self) -> BundleResult<Compilation<'_>> {
        self.hooks.call_async(&HookEvent::BeforeCompile).await?;
        let params = self.compilation_params()?;
        self.hooks.call(&HookEvent::Compile)?;

        let compilation = Compilation::new(
            self.options.context.clone(),
            self.input_fs.as_ref(),
            &self.hooks,
            params,
        );
        self.hooks.call_async(&HookEvent::Make(&compilation)).await?;
        compilation.make(&self.options.entry_points()).await;

        compilation.seal()?;
        self.hooks.call_async(&HookEvent::AfterCompile(&compilation)).await?;
        Ok(compilation)
    }

    fn compilation_params(&self) -> BundleResult<CompilationParams> {
        let template = match &self.options.output.template {
            Some(path) => Template::load(self.input_fs.as_ref(), path)?,
            None => Template::default(),
        };
        Ok(CompilationParams {
            module_factory: ModuleFactory,
            parser: JavaScriptParser::new(),
            template: Box::new(template),
            resolve: self.options.resolve.clone(),
        })
    }

    /// Writes the compilation's assets below `output.path`, unless a
    /// `should_emit` tap bails.
    pub async fn emit_assets(&self, compilation: &Compilation<'_>) -> BundleResult<()> {
        if self.hooks.call(&HookEvent::ShouldEmit(compilation))? == HookFlow::Bail {
            log::info!(target: "tinypack", "Emit skipped");
            return Ok(());
        }
        self.hooks.call_async(&HookEvent::Emit(compilation)).await?;

        let output_path = &self.options.output.path;
        self.output_fs
            .create_dir_all(output_path)
            .map_err(|err| BundleError::write(output_path, err))?;

        let assets = compilation.assets().clone();
        for file in compilation.files().iter() {
            let Some(source) = assets.get(file) else {
                continue;
            };
            let target = output_path.join(file);
            self.output_fs
                .write_file(&target, source)
                .map_err(|err| BundleError::write(&target, err))?;
            log::info!(target: "tinypack", "Emitted {} ({} bytes)", target.display(), source.len());
        }
        Ok(())
    }
}
