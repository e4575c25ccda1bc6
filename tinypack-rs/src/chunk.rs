use crate::module::{Module, ModuleIdx};

/// The modules of one entry point, destined for one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub name: String,
    pub entry_module: ModuleIdx,
    /// Registry indices of the chunk's modules, in creation order.
    pub modules: Vec<ModuleIdx>,
    /// Output files generated for this chunk.
    pub files: Vec<String>,
}

impl Chunk {
    pub fn new(entry_module: ModuleIdx, entry: &Module) -> Self {
        Self {
            name: entry.name.clone(),
            entry_module,
            modules: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Selects every registry module built under this chunk's name.
    pub fn collect_modules(&mut self, registry: &[Module]) {
        self.modules = registry
            .iter()
            .enumerate()
            .filter(|(_, module)| module.name == self.name)
            .map(|(idx, _)| idx)
            .collect();
    }

    pub fn file_name(&self) -> String {
        format!("{}.js", self.name)
    }

    /// Records an output file, once.
    pub fn add_file(&mut self, file: &str) {
        if !self.files.iter().any(|existing| existing == file) {
            self.files.push(file.to_string());
        }
    }
}
