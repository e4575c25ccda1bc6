//! JavaScript syntax collaborator.
//!
//! Parses module sources into an SWC syntax tree and regenerates source
//! text from a (possibly rewritten) tree. One [`JavaScriptParser`] is handed
//! to each compilation; it holds configuration only, every parse gets its
//! own source map and comment store.

use std::path::{Path, PathBuf};

use deno_ast::swc::ast::{EsVersion, Script};
use deno_ast::swc::codegen::text_writer::JsWriter;
use deno_ast::swc::codegen::{Config as CodegenConfig, Emitter};
use deno_ast::swc::common::comments::SingleThreadedComments;
use deno_ast::swc::common::sync::Lrc;
use deno_ast::swc::common::{FileName, Globals, SourceMap, Spanned, GLOBALS};
use deno_ast::swc::parser::error::Error as SyntaxError;
use deno_ast::swc::parser::lexer::Lexer;
use deno_ast::swc::parser::{EsSyntax, Parser, StringInput, Syntax};

use crate::error::{BundleError, BundleResult};

/// A parsed module together with the state needed to print it again.
pub struct ParsedModule {
    pub script: Script,
    path: PathBuf,
    source_map: Lrc<SourceMap>,
    comments: SingleThreadedComments,
}

impl ParsedModule {
    pub fn into_script(self) -> Script {
        self.script
    }
}

/// Parser and code generator for module sources.
#[derive(Debug, Clone, Default)]
pub struct JavaScriptParser {
    /// Accept JSX syntax in module sources.
    pub jsx: bool,
    /// Emit minified code.
    pub minify: bool,
}

impl JavaScriptParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn syntax(&self) -> Syntax {
        Syntax::Es(EsSyntax {
            jsx: self.jsx,
            ..Default::default()
        })
    }

    /// Parses `source` as a script, the goal CommonJS modules are evaluated
    /// with. Sloppy-mode syntax is accepted unless the source opts into
    /// strict mode with a `"use strict"` directive.
    ///
    /// Recoverable diagnostics reported by the parser are treated as errors
    /// too, since the regenerated code would silently differ from the input.
    pub fn parse(&self, path: &Path, source: &str) -> BundleResult<ParsedModule> {
        let globals = Globals::new();
        GLOBALS.set(&globals, || {
            let source_map = Lrc::new(SourceMap::default());
            let source_file = source_map.new_source_file(
                FileName::Real(path.to_path_buf()).into(),
                source.to_string(),
            );

            let comments = SingleThreadedComments::default();
            let input = StringInput::from(&*source_file);
            let lexer = Lexer::new(self.syntax(), EsVersion::EsNext, input, Some(&comments));
            let mut parser = Parser::new_from(lexer);

            let script = parser
                .parse_script()
                .map_err(|err| parse_error(path, &source_map, err))?;
            if let Some(err) = parser.take_errors().into_iter().next() {
                return Err(parse_error(path, &source_map, err));
            }

            Ok(ParsedModule {
                script,
                path: path.to_path_buf(),
                source_map,
                comments,
            })
        })
    }

    /// Prints the syntax tree of `parsed` back to source text.
    pub fn generate(&self, parsed: &ParsedModule) -> BundleResult<String> {
        let codegen_error = |message: String| BundleError::Codegen {
            path: parsed.path.clone(),
            message,
        };

        let mut buf = Vec::new();
        {
            let cfg = CodegenConfig::default()
                .with_minify(self.minify)
                .with_target(EsVersion::EsNext)
                .with_omit_last_semi(false);

            let mut emitter = Emitter {
                cfg,
                cm: parsed.source_map.clone(),
                comments: Some(&parsed.comments),
                wr: Box::new(JsWriter::new(
                    parsed.source_map.clone(),
                    "\n",
                    &mut buf,
                    None,
                )),
            };

            emitter
                .emit_script(&parsed.script)
                .map_err(|err| codegen_error(err.to_string()))?;
        }

        String::from_utf8(buf).map_err(|err| codegen_error(err.to_string()))
    }
}

fn parse_error(path: &Path, source_map: &SourceMap, err: SyntaxError) -> BundleError {
    let span = err.span();
    let message = err.into_kind().msg().to_string();
    let message = if span.is_dummy() {
        message
    } else {
        let loc = source_map.lookup_char_pos(span.lo);
        format!("{}:{}: {}", loc.line, loc.col_display + 1, message)
    };
    BundleError::Parse {
        path: path.to_path_buf(),
        message,
    }
}
