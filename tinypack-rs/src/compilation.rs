//! A single build run: dependency closure, sealing and asset generation.

use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use futures::future::{join_all, LocalBoxFuture};
use futures::FutureExt;
use tokio::sync::watch;

use crate::chunk::Chunk;
use crate::config::ResolveOptions;
use crate::error::{BundleError, BundleResult};
use crate::fs::InputFileSystem;
use crate::hooks::{HookEvent, Hooks};
use crate::module::{Module, ModuleDescriptor, ModuleFactory, ModuleIdx, ModuleKey};
use crate::parser::JavaScriptParser;
use crate::paths::{module_id, normalize_path};
use crate::template::{ChunkRenderContext, ChunkTemplate, RenderModule, Template};

/// Collaborators handed to a new [`Compilation`].
pub struct CompilationParams {
    pub module_factory: ModuleFactory,
    pub parser: JavaScriptParser,
    pub template: Box<dyn ChunkTemplate>,
    pub resolve: ResolveOptions,
}

impl Default for CompilationParams {
    fn default() -> Self {
        Self {
            module_factory: ModuleFactory,
            parser: JavaScriptParser::default(),
            template: Box::new(Template::default()),
            resolve: ResolveOptions::default(),
        }
    }
}

type BuildOutcome = Option<BundleResult<()>>;

#[derive(Clone)]
enum BuildStatus {
    /// The receiver resolves once the module's own build has finished.
    Building(watch::Receiver<BuildOutcome>),
    Built,
    Failed(BundleError),
}

/// Shared failure state of one entry's build group.
///
/// The first error recorded wins. Once set, no new module builds start in
/// the group, while builds already in flight run to completion.
#[derive(Debug, Default)]
pub struct BuildToken {
    failure: RefCell<Option<BundleError>>,
}

impl BuildToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, err: &BundleError) {
        let mut failure = self.failure.borrow_mut();
        if failure.is_none() {
            *failure = Some(err.clone());
        }
    }

    pub fn first_error(&self) -> Option<BundleError> {
        self.failure.borrow().clone()
    }
}

#[derive(Default)]
struct CompilationState {
    entries: Vec<ModuleIdx>,
    entry_names: HashSet<String>,
    modules: Vec<Module>,
    index: HashMap<ModuleKey, ModuleIdx>,
    status: Vec<BuildStatus>,
    chunks: Vec<Chunk>,
    assets: BTreeMap<String, String>,
    files: Vec<String>,
    errors: Vec<BundleError>,
}

pub struct Compilation<'c> {
    context: PathBuf,
    input_fs: &'c dyn InputFileSystem,
    hooks: &'c Hooks,
    module_factory: ModuleFactory,
    parser: JavaScriptParser,
    template: Box<dyn ChunkTemplate>,
    resolve: ResolveOptions,
    state: RefCell<CompilationState>,
}

impl<'c> Compilation<'c> {
    pub fn new(
        context: impl Into<PathBuf>,
        input_fs: &'c dyn InputFileSystem,
        hooks: &'c Hooks,
        params: CompilationParams,
    ) -> Self {
        Self {
            context: context.into(),
            input_fs,
            hooks,
            module_factory: params.module_factory,
            parser: params.parser,
            template: params.template,
            resolve: params.resolve,
            state: RefCell::new(CompilationState::default()),
        }
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    pub fn input_fs(&self) -> &dyn InputFileSystem {
        self.input_fs
    }

    pub fn parser(&self) -> &JavaScriptParser {
        &self.parser
    }

    pub fn resolve_options(&self) -> &ResolveOptions {
        &self.resolve
    }

    /// Registry indices of the entries whose closure built successfully.
    pub fn entries(&self) -> Ref<'_, [ModuleIdx]> {
        Ref::map(self.state.borrow(), |state| state.entries.as_slice())
    }

    /// Every module created during the run, in creation order.
    pub fn modules(&self) -> Ref<'_, [Module]> {
        Ref::map(self.state.borrow(), |state| state.modules.as_slice())
    }

    pub fn chunks(&self) -> Ref<'_, [Chunk]> {
        Ref::map(self.state.borrow(), |state| state.chunks.as_slice())
    }

    pub fn assets(&self) -> Ref<'_, BTreeMap<String, String>> {
        Ref::map(self.state.borrow(), |state| &state.assets)
    }

    pub fn files(&self) -> Ref<'_, [String]> {
        Ref::map(self.state.borrow(), |state| state.files.as_slice())
    }

    pub fn errors(&self) -> Ref<'_, [BundleError]> {
        Ref::map(self.state.borrow(), |state| state.errors.as_slice())
    }

    /// Looks up the module registered for `id` in chunk `name`.
    pub fn find_module(&self, name: &str, id: &str) -> Option<ModuleIdx> {
        let key = ModuleKey {
            name: name.to_string(),
            id: id.to_string(),
        };
        self.state.borrow().index.get(&key).copied()
    }

    /// Builds the closure of every entry concurrently. Failed entries are
    /// recorded in [`Compilation::errors`] and never stop the others.
    pub async fn make(&self, entry_points: &[(String, String)]) {
        let context = self.context.clone();
        let results = join_all(
            entry_points
                .iter()
                .map(|(name, path)| self.build_entry(&context, path, name)),
        )
        .await;

        let mut state = self.state.borrow_mut();
        for ((name, _), result) in entry_points.iter().zip(results) {
            match result {
                Ok(idx) => state.entries.push(idx),
                Err(err) => {
                    log::debug!(target: "tinypack", "entry {} failed: {}", name, err);
                    state.errors.push(err);
                }
            }
        }
    }

    /// Builds one entry and its closure, then registers it as an entry.
    pub async fn add_entry(&self, context: &Path, entry: &str, name: &str) -> BundleResult<ModuleIdx> {
        let idx = self.build_entry(context, entry, name).await?;
        self.state.borrow_mut().entries.push(idx);
        Ok(idx)
    }

    async fn build_entry(&self, context: &Path, entry: &str, name: &str) -> BundleResult<ModuleIdx> {
        if !self.state.borrow_mut().entry_names.insert(name.to_string()) {
            return Err(BundleError::DuplicateEntry {
                name: name.to_string(),
            });
        }
        let resource = normalize_path(&context.join(entry));
        let descriptor = ModuleDescriptor {
            name: name.to_string(),
            context: context.to_path_buf(),
            raw_request: entry.to_string(),
            module_id: module_id(context, &resource),
            resource,
        };
        log::debug!(target: "tinypack", "entry {} -> {}", name, descriptor.module_id);

        let token = BuildToken::new();
        self.create_module(descriptor, Vec::new(), &token).await
    }

    /// Creates, builds and recursively resolves one module.
    ///
    /// `ancestors` is the chain of modules that led here; meeting one of
    /// them again is an import cycle and resolves to the existing module.
    /// A module already registered in the same chunk is reused, waiting for
    /// its build if it is still in flight.
    pub fn create_module<'s>(
        &'s self,
        descriptor: ModuleDescriptor,
        ancestors: Vec<ModuleKey>,
        token: &'s BuildToken,
    ) -> LocalBoxFuture<'s, BundleResult<ModuleIdx>> {
        async move {
            let key = ModuleKey {
                name: descriptor.name.clone(),
                id: descriptor.module_id.clone(),
            };

            let existing = {
                let state = self.state.borrow();
                state
                    .index
                    .get(&key)
                    .map(|&idx| (idx, state.status[idx].clone()))
            };
            if let Some((idx, status)) = existing {
                if ancestors.contains(&key) {
                    log::debug!(target: "tinypack", "cycle back to {} in {}", key.id, key.name);
                    return Ok(idx);
                }
                log::debug!(target: "tinypack", "reusing {} in {}", key.id, key.name);
                return match status {
                    BuildStatus::Built => Ok(idx),
                    BuildStatus::Failed(err) => Err(err),
                    BuildStatus::Building(mut rx) => {
                        let outcome = match rx.wait_for(Option::is_some).await {
                            Ok(outcome) => outcome.clone(),
                            Err(_) => None,
                        };
                        match outcome {
                            Some(Ok(())) => Ok(idx),
                            Some(Err(err)) => Err(err),
                            None => Err(BundleError::Interrupted { id: key.id }),
                        }
                    }
                };
            }

            if let Some(err) = token.first_error() {
                return Err(err);
            }

            // Register before the first suspension point so concurrent
            // requests for the same key find this module.
            let (tx, rx) = watch::channel(None);
            let (idx, mut module) = {
                let mut state = self.state.borrow_mut();
                let module = self.module_factory.create(descriptor);
                let idx = state.modules.len();
                state.modules.push(module.clone());
                state.index.insert(key.clone(), idx);
                state.status.push(BuildStatus::Building(rx));
                (idx, module)
            };

            log::debug!(target: "tinypack", "building {} ({})", module.id, module.resource.display());
            let outcome = match module.build(self).await {
                Ok(()) => self.hooks.call(&HookEvent::SucceedModule(&module)).map(|_| ()),
                Err(err) => Err(err),
            };
            let dependencies = module.dependencies.clone();
            {
                let mut state = self.state.borrow_mut();
                state.status[idx] = match &outcome {
                    Ok(()) => BuildStatus::Built,
                    Err(err) => BuildStatus::Failed(err.clone()),
                };
                state.modules[idx] = module;
            }
            tx.send_replace(Some(outcome.clone()));
            if let Err(err) = outcome {
                token.fail(&err);
                return Err(err);
            }

            if dependencies.is_empty() {
                return Ok(idx);
            }
            let mut chain = ancestors;
            chain.push(key);
            let results = join_all(
                dependencies
                    .into_iter()
                    .map(|dependency| self.create_module(dependency, chain.clone(), token)),
            )
            .await;
            if let Some(err) = results.into_iter().find_map(Result::err) {
                token.fail(&err);
            }
            match token.first_error() {
                Some(err) => Err(err),
                None => Ok(idx),
            }
        }
        .boxed_local()
    }

    /// Groups the built modules into one chunk per entry and renders the
    /// chunk assets.
    pub fn seal(&self) -> BundleResult<()> {
        self.hooks.call(&HookEvent::Seal)?;
        self.hooks.call(&HookEvent::BeforeChunks)?;

        let chunks: Vec<Chunk> = {
            let state = self.state.borrow();
            state
                .entries
                .iter()
                .map(|&idx| {
                    let mut chunk = Chunk::new(idx, &state.modules[idx]);
                    chunk.collect_modules(&state.modules);
                    chunk
                })
                .collect()
        };
        self.hooks.call(&HookEvent::AfterChunks(&chunks))?;
        self.state.borrow_mut().chunks = chunks;

        self.create_chunk_assets()
    }

    fn create_chunk_assets(&self) -> BundleResult<()> {
        let rendered = {
            let state = self.state.borrow();
            state
                .chunks
                .iter()
                .map(|chunk| Ok((chunk.file_name(), self.render_chunk(chunk)?)))
                .collect::<BundleResult<Vec<_>>>()?
        };

        let mut state = self.state.borrow_mut();
        for (chunk_idx, (file, source)) in rendered.into_iter().enumerate() {
            state.chunks[chunk_idx].add_file(&file);
            if !state.files.contains(&file) {
                state.files.push(file.clone());
            }
            state.assets.insert(file, source);
        }
        Ok(())
    }

    /// Renders a chunk through the template. Does not touch compilation
    /// state, so rendering twice gives identical text.
    pub fn render_chunk(&self, chunk: &Chunk) -> BundleResult<String> {
        let state = self.state.borrow();
        let lookup = |idx: ModuleIdx| {
            state.modules.get(idx).ok_or_else(|| {
                BundleError::Template(format!("chunk `{}` refers to unknown module {}", chunk.name, idx))
            })
        };

        let entry = lookup(chunk.entry_module)?;
        let modules = chunk
            .modules
            .iter()
            .map(|&idx| {
                let module = lookup(idx)?;
                Ok(RenderModule {
                    id: &module.id,
                    source: module.source.as_deref().unwrap_or_default(),
                })
            })
            .collect::<BundleResult<Vec<_>>>()?;

        self.template.render(&ChunkRenderContext {
            entry_module_id: &entry.id,
            modules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{MemoryFileSystem, ReadFuture};
    use crate::hooks::{HookFlow, HookPoint};
    use futures::executor::block_on;
    use std::cell::Cell;
    use std::io;
    use std::rc::Rc;

    /// Suspends once on every read, so a module is still building when a
    /// sibling requests it.
    struct YieldingFileSystem {
        inner: MemoryFileSystem,
        reads: Rc<Cell<usize>>,
    }

    impl InputFileSystem for YieldingFileSystem {
        fn read_file(&self, path: &Path) -> ReadFuture {
            self.reads.set(self.reads.get() + 1);
            let result = self.inner.read_file_sync(path);
            async move {
                tokio::task::yield_now().await;
                result
            }
            .boxed_local()
        }

        fn read_file_sync(&self, path: &Path) -> io::Result<String> {
            self.inner.read_file_sync(path)
        }
    }

    fn entry(name: &str, path: &str) -> (String, String) {
        (name.to_string(), path.to_string())
    }

    fn built_ids(hooks: &mut Hooks) -> Rc<RefCell<Vec<String>>> {
        let built = Rc::new(RefCell::new(Vec::new()));
        let sink = built.clone();
        hooks.tap(HookPoint::SucceedModule, "record", move |event| {
            if let HookEvent::SucceedModule(module) = event {
                sink.borrow_mut().push(module.id.clone());
            }
            Ok(HookFlow::Continue)
        });
        built
    }

    #[test]
    fn test_cycle_terminates() {
        let fs = MemoryFileSystem::new()
            .with_file("/p/a.js", "require('./b'); module.exports = 'a';")
            .with_file("/p/b.js", "require('./a'); module.exports = 'b';");
        let hooks = Hooks::new();
        let compilation = Compilation::new("/p", &fs, &hooks, CompilationParams::default());

        block_on(compilation.make(&[entry("main", "./a.js")]));

        assert!(compilation.errors().is_empty());
        let ids: Vec<_> = compilation.modules().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, ["./a.js", "./b.js"]);
        let b = &compilation.modules()[1];
        assert_eq!(b.dependencies[0].module_id, "./a.js");
    }

    #[test]
    fn test_add_entry_registers_entry_module() {
        let fs = MemoryFileSystem::new()
            .with_file("/p/src/index.js", "require('./dep');")
            .with_file("/p/src/dep.js", "module.exports = 1;");
        let hooks = Hooks::new();
        let compilation = Compilation::new("/p", &fs, &hooks, CompilationParams::default());

        let idx = block_on(compilation.add_entry(Path::new("/p"), "./src/index.js", "main")).unwrap();

        assert_eq!(&*compilation.entries(), [idx]);
        let modules = compilation.modules();
        assert_eq!(modules[idx].raw_request, "./src/index.js");
        assert_eq!(modules[idx].id, "./src/index.js");
        let matching = modules
            .iter()
            .filter(|module| module.raw_request == "./src/index.js")
            .count();
        assert_eq!(matching, 1);
        assert_eq!(modules.len(), 2);
    }

    #[test]
    fn test_add_entry_rejects_reused_name() {
        let fs = MemoryFileSystem::new().with_file("/p/a.js", "1;");
        let hooks = Hooks::new();
        let compilation = Compilation::new("/p", &fs, &hooks, CompilationParams::default());

        block_on(compilation.add_entry(Path::new("/p"), "./a.js", "main")).unwrap();
        let err = block_on(compilation.add_entry(Path::new("/p"), "./a.js", "main")).unwrap_err();

        assert!(matches!(err, BundleError::DuplicateEntry { ref name } if name == "main"));
        assert_eq!(compilation.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_waits_for_module_still_building() {
        let reads = Rc::new(Cell::new(0));
        let fs = YieldingFileSystem {
            inner: MemoryFileSystem::new()
                .with_file("/p/index.js", "require('./a'); require('./b');")
                .with_file("/p/a.js", "require('./b'); module.exports = 'a';")
                .with_file("/p/b.js", "require('./a'); require('./c'); module.exports = 'b';")
                .with_file("/p/c.js", "module.exports = 'c';"),
            reads: reads.clone(),
        };
        let mut hooks = Hooks::new();
        let built = built_ids(&mut hooks);
        let compilation = Compilation::new("/p", &fs, &hooks, CompilationParams::default());

        compilation.make(&[entry("main", "./index.js")]).await;

        assert!(compilation.errors().is_empty(), "{:?}", compilation.errors());
        assert_eq!(*built.borrow(), ["./index.js", "./a.js", "./b.js", "./c.js"]);
        assert_eq!(compilation.modules().len(), 4);
        assert_eq!(reads.get(), 4);
        assert_eq!(&*compilation.entries(), [0]);
    }

    #[tokio::test]
    async fn test_waiter_sees_failure_of_module_still_building() {
        let fs = YieldingFileSystem {
            inner: MemoryFileSystem::new()
                .with_file("/p/index.js", "require('./a'); require('./b');")
                .with_file("/p/a.js", "require('./b');")
                .with_file("/p/b.js", "let = ;"),
            reads: Rc::new(Cell::new(0)),
        };
        let hooks = Hooks::new();
        let compilation = Compilation::new("/p", &fs, &hooks, CompilationParams::default());

        compilation.make(&[entry("main", "./index.js")]).await;

        assert!(compilation.entries().is_empty());
        assert_eq!(compilation.errors().len(), 1);
        assert!(matches!(compilation.errors()[0], BundleError::Parse { .. }));
    }

    #[test]
    fn test_diamond_builds_shared_module_once() {
        let fs = MemoryFileSystem::new()
            .with_file("/p/index.js", "require('./left'); require('./right');")
            .with_file("/p/left.js", "require('./shared');")
            .with_file("/p/right.js", "require('./shared');")
            .with_file("/p/shared.js", "module.exports = 1;");
        let mut hooks = Hooks::new();
        let built = built_ids(&mut hooks);
        let compilation = Compilation::new("/p", &fs, &hooks, CompilationParams::default());

        block_on(compilation.make(&[entry("main", "./index.js")]));

        assert!(compilation.errors().is_empty());
        let shared = built.borrow().iter().filter(|id| *id == "./shared.js").count();
        assert_eq!(shared, 1);
        assert_eq!(compilation.modules().len(), 4);
        assert!(compilation.find_module("main", "./shared.js").is_some());
    }

    #[test]
    fn test_shared_module_is_duplicated_per_chunk() {
        let fs = MemoryFileSystem::new()
            .with_file("/p/a.js", "require('./util');")
            .with_file("/p/b.js", "require('./util');")
            .with_file("/p/util.js", "module.exports = 1;");
        let hooks = Hooks::new();
        let compilation = Compilation::new("/p", &fs, &hooks, CompilationParams::default());

        block_on(compilation.make(&[entry("a", "./a.js"), entry("b", "./b.js")]));
        compilation.seal().unwrap();

        assert!(compilation.find_module("a", "./util.js").is_some());
        assert!(compilation.find_module("b", "./util.js").is_some());
        for chunk in compilation.chunks().iter() {
            assert_eq!(chunk.modules.len(), 2, "{}", chunk.name);
        }
    }

    #[test]
    fn test_duplicate_entry_name_rejected() {
        let fs = MemoryFileSystem::new().with_file("/p/a.js", "1;");
        let hooks = Hooks::new();
        let compilation = Compilation::new("/p", &fs, &hooks, CompilationParams::default());

        block_on(compilation.make(&[entry("main", "./a.js"), entry("main", "./a.js")]));

        assert_eq!(compilation.entries().len(), 1);
        assert!(matches!(
            compilation.errors()[0],
            BundleError::DuplicateEntry { ref name } if name == "main"
        ));
    }

    #[test]
    fn test_failure_stops_new_work_in_group() {
        let fs = MemoryFileSystem::new()
            .with_file("/p/index.js", "require('./broken'); require('./fine');")
            .with_file("/p/broken.js", "let = ;")
            .with_file("/p/fine.js", "require('./deep');")
            .with_file("/p/deep.js", "1;");
        let hooks = Hooks::new();
        let compilation = Compilation::new("/p", &fs, &hooks, CompilationParams::default());

        block_on(compilation.make(&[entry("main", "./index.js")]));

        assert!(compilation.entries().is_empty());
        assert!(matches!(compilation.errors()[0], BundleError::Parse { .. }));
        // `broken` fails before its sibling is first polled, so no new work starts.
        assert!(compilation.find_module("main", "./broken.js").is_some());
        assert!(compilation.find_module("main", "./fine.js").is_none());
        assert!(compilation.find_module("main", "./deep.js").is_none());
    }

    #[test]
    fn test_render_chunk_is_pure() {
        let fs = MemoryFileSystem::new()
            .with_file("/p/index.js", "const dep = require('./dep');")
            .with_file("/p/dep.js", "module.exports = 2;");
        let hooks = Hooks::new();
        let compilation = Compilation::new("/p", &fs, &hooks, CompilationParams::default());
        block_on(compilation.make(&[entry("main", "./index.js")]));
        compilation.seal().unwrap();

        let chunk = compilation.chunks()[0].clone();
        let first = compilation.render_chunk(&chunk).unwrap();
        let second = compilation.render_chunk(&chunk).unwrap();
        assert_eq!(first, second);
        assert_eq!(compilation.assets().get("main.js"), Some(&first));
        assert_eq!(&*compilation.files(), ["main.js".to_string()]);
        assert_eq!(chunk.files, ["main.js".to_string()]);
    }
}
