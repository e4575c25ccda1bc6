//! Chunk templates.
//!
//! A template turns a chunk's entry id and its rewritten module sources into
//! the text of one self-contained output file. The built-in template emits a
//! module registry keyed by module id, a caching `__tinypack_require__`
//! loader and a call of the entry module.

use std::fmt::Write;
use std::path::Path;

use crate::error::{BundleError, BundleResult};
use crate::fs::InputFileSystem;

/// Placeholder replaced by the JSON-quoted entry module id.
pub const ENTRY_MODULE_ID_PLACEHOLDER: &str = "{{entryModuleId}}";

/// Placeholder replaced by the module registry object literal.
pub const MODULES_PLACEHOLDER: &str = "{{modules}}";

const DEFAULT_TEMPLATE: &str = include_str!("../templates/main.js");

/// One module as seen by a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderModule<'a> {
    pub id: &'a str,
    pub source: &'a str,
}

/// Everything a template receives for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRenderContext<'a> {
    pub entry_module_id: &'a str,
    pub modules: Vec<RenderModule<'a>>,
}

/// Renders chunks into output file text.
pub trait ChunkTemplate {
    fn render(&self, ctx: &ChunkRenderContext<'_>) -> BundleResult<String>;
}

/// Placeholder-based template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl Template {
    /// Compiles template text, which must contain both placeholders.
    pub fn compile(text: impl Into<String>) -> BundleResult<Self> {
        let text = text.into();
        for placeholder in [ENTRY_MODULE_ID_PLACEHOLDER, MODULES_PLACEHOLDER] {
            if !text.contains(placeholder) {
                return Err(BundleError::Template(format!(
                    "template is missing the `{placeholder}` placeholder"
                )));
            }
        }
        Ok(Self { text })
    }

    /// Loads and compiles a template file.
    pub fn load(fs: &dyn InputFileSystem, path: &Path) -> BundleResult<Self> {
        let text = fs.read_file_sync(path).map_err(|err| {
            BundleError::Template(format!("failed to read {}: {}", path.display(), err))
        })?;
        Self::compile(text)
    }
}

impl ChunkTemplate for Template {
    fn render(&self, ctx: &ChunkRenderContext<'_>) -> BundleResult<String> {
        let entry_module_id = json_string(ctx.entry_module_id)?;
        let modules = render_registry(&ctx.modules)?;
        // Module sources go in last so their text is never scanned for placeholders.
        Ok(self
            .text
            .replace(ENTRY_MODULE_ID_PLACEHOLDER, &entry_module_id)
            .replace(MODULES_PLACEHOLDER, &modules))
    }
}

/// Renders the registry object literal mapping each module id to a factory
/// function wrapping the module's source.
fn render_registry(modules: &[RenderModule<'_>]) -> BundleResult<String> {
    let mut out = String::from("{\n");
    for module in modules {
        let id = json_string(module.id)?;
        let source = module.source.trim_end();
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "\n{id}: (function (module, exports, __tinypack_require__) {{\n{source}\n}}),\n"
        );
    }
    out.push('}');
    Ok(out)
}

fn json_string(value: &str) -> BundleResult<String> {
    serde_json::to_string(value).map_err(|err| BundleError::Template(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    fn context<'a>() -> ChunkRenderContext<'a> {
        ChunkRenderContext {
            entry_module_id: "./src/index.js",
            modules: vec![
                RenderModule {
                    id: "./src/index.js",
                    source: "const login = __tinypack_require__(\"./src/login.js\");\n",
                },
                RenderModule {
                    id: "./src/login.js",
                    source: "module.exports = \"{{modules}}\";",
                },
            ],
        }
    }

    #[test]
    fn test_default_template_renders_registry() {
        let out = Template::default().render(&context()).unwrap();

        assert!(out.contains("__tinypack_require__.s = \"./src/index.js\""));
        assert!(out.contains("\"./src/index.js\": (function (module, exports, __tinypack_require__) {"));
        assert!(out.contains("\"./src/login.js\": (function (module, exports, __tinypack_require__) {"));
        assert!(!out.contains(ENTRY_MODULE_ID_PLACEHOLDER));
        // Placeholders inside module sources are left alone.
        assert!(out.contains("module.exports = \"{{modules}}\";"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = Template::default();
        assert_eq!(
            template.render(&context()).unwrap(),
            template.render(&context()).unwrap()
        );
    }

    #[test]
    fn test_compile_requires_placeholders() {
        let err = Template::compile("{{modules}}").unwrap_err();
        assert!(matches!(err, BundleError::Template(_)));
        assert!(Template::compile("run({{entryModuleId}}, {{modules}})").is_ok());
    }

    #[test]
    fn test_load_custom_template() {
        let fs = MemoryFileSystem::new().with_file("/tpl/main.js", "start({{entryModuleId}}, {{modules}});");
        let template = Template::load(&fs, Path::new("/tpl/main.js")).unwrap();
        let out = template
            .render(&ChunkRenderContext {
                entry_module_id: "./a.js",
                modules: vec![RenderModule {
                    id: "./a.js",
                    source: "1;",
                }],
            })
            .unwrap();
        assert_eq!(
            out,
            "start(\"./a.js\", {\n\n\"./a.js\": (function (module, exports, __tinypack_require__) {\n1;\n}),\n});"
        );

        let missing = Template::load(&fs, Path::new("/tpl/none.js")).unwrap_err();
        assert!(matches!(missing, BundleError::Template(_)));
    }
}
