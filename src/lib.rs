//! Weft template compiler and reactive runtime
//!
//! Compiles an HTML-like template language into create/update/destroy
//! procedure triples over numbered node slots. The pipeline is
//! parse ([`parser`]), lower ([`codegen`]) and then either serialize the
//! program to source text ([`emit`]) or interpret it directly against a
//! node adapter ([`runtime`]). The [`instance`] layer adds components
//! with state, methods and batched updates on top.
//!
//! ```
//! let compiled = weft::compile("<h1>{title}</h1>");
//! assert!(compiled.diagnostics.is_empty());
//! assert_eq!(compiled.stats.dynamic_bindings, 1);
//! ```

pub mod ast;
pub mod cli;
pub mod codegen;
pub mod directives;
pub mod dom;
pub mod emit;
pub mod error;
pub mod eval;
pub mod expr;
pub mod instance;
pub mod ir;
pub mod parser;
pub mod runtime;

use std::path::Path;

use serde::Serialize;

pub use ast::{Attribute, Node, NodeKind};
pub use dom::{MemoryDom, NodeAdapter};
pub use error::{Diagnostic, Error, Result};
pub use instance::{Component, Instance};
pub use ir::Program;
pub use runtime::{Runtime, View};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    /// Collect parse diagnostics without logging them.
    pub silent: bool,
    /// Log per-compilation statistics.
    pub debug_mode: bool,
}

/// Counters describing one compilation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompileStats {
    pub source_bytes: usize,
    pub node_count: usize,
    pub slot_count: usize,
    pub dynamic_bindings: usize,
    pub diagnostic_count: usize,
    pub compile_time_us: u64,
}

/// The result of compiling one template. Diagnostics never abort a
/// compilation; a program is always produced.
#[derive(Debug)]
pub struct Compiled {
    pub program: Program,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: CompileStats,
}

impl Compiled {
    /// Wrap the program in a component definition, ready for state and
    /// methods.
    pub fn into_component(self) -> Component {
        Component::new(self.program)
    }
}

pub fn compile(source: &str) -> Compiled {
    compile_with_options(source, &CompilerOptions::default())
}

pub fn compile_with_options(source: &str, options: &CompilerOptions) -> Compiled {
    let started = std::time::Instant::now();
    let parsed = if options.silent {
        parser::parse_silent(source)
    } else {
        parser::parse(source)
    };
    let program = codegen::generate(&parsed.root);

    let stats = CompileStats {
        source_bytes: source.len(),
        node_count: parsed.root.descendant_count(),
        slot_count: program.slot_count(),
        dynamic_bindings: program.dynamic_count(),
        diagnostic_count: parsed.diagnostics.len(),
        compile_time_us: started.elapsed().as_micros() as u64,
    };
    if options.debug_mode {
        log::debug!(
            "compiled {} bytes: {} nodes, {} slots, {} dynamic bindings",
            stats.source_bytes,
            stats.node_count,
            stats.slot_count,
            stats.dynamic_bindings
        );
    }

    Compiled {
        program,
        diagnostics: parsed.diagnostics,
        stats,
    }
}

/// Compile a template read from disk.
pub fn compile_file(path: &Path, options: &CompilerOptions) -> Result<Compiled> {
    let source = std::fs::read_to_string(path)?;
    Ok(compile_with_options(&source, options))
}

/// Compile straight to generated source text.
pub fn compile_to_source(source: &str) -> String {
    emit::emit(&compile(source).program)
}
