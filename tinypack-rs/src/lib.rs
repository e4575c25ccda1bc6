#![allow(clippy::uninlined_format_args)]
#![doc = include_str!("../README.md")]

pub mod chunk;
pub mod compilation;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fs;
pub mod hooks;
pub mod module;
pub mod parser;
pub mod paths;
mod rewrite;
pub mod stats;
pub mod template;
pub mod text;

pub use compilation::{Compilation, CompilationParams};
pub use compiler::Compiler;
pub use config::{BundlerOptions, EntryConfig};
pub use error::{BundleError, BundleResult};
pub use rewrite::{REQUIRE_IDENT, RUNTIME_REQUIRE_IDENT};
pub use serde_json;
pub use stats::Stats;
