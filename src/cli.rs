//! Command-line interface
//!
//! `compile` turns a template into generated source, `check` reports
//! parse diagnostics, and `render` runs a template headlessly against
//! the in-memory adapter and prints the resulting tree.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};

use crate::dom::{MemoryDom, NodeAdapter};
use crate::error::{Error, Result};
use crate::runtime::{Runtime, View};
use crate::{compile_file, emit, CompilerOptions};

#[derive(Parser)]
#[command(name = "weft", version, about = crate::DESCRIPTION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a template to generated source
    Compile {
        /// Template file to compile
        input: PathBuf,

        /// Write output here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print compilation statistics to stderr
        #[arg(long)]
        stats: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Source)]
        format: OutputFormat,
    },

    /// Parse a template and report diagnostics
    Check {
        /// Template file to check
        input: PathBuf,
    },

    /// Render a template against the in-memory adapter
    Render {
        /// Template file to render
        input: PathBuf,

        /// Initial state as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Generated source text
    Source,
    /// JSON with source, statistics and diagnostics
    Json,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Compile {
            input,
            output,
            stats,
            format,
        } => run_compile(&input, output.as_deref(), stats, format),
        Command::Check { input } => run_check(&input),
        Command::Render { input, data } => run_render(&input, &data),
    }
}

fn run_compile(
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    stats: bool,
    format: OutputFormat,
) -> Result<()> {
    let compiled = compile_file(input, &CompilerOptions::default())?;
    let source = emit::emit(&compiled.program);

    let text = match format {
        OutputFormat::Source => source,
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "source": source,
            "stats": compiled.stats,
            "diagnostics": compiled.diagnostics,
        }))?,
    };

    match output {
        Some(path) => fs::write(path, text)?,
        None => println!("{text}"),
    }

    if stats {
        eprintln!(
            "{} nodes, {} slots, {} dynamic bindings, {} diagnostics",
            compiled.stats.node_count,
            compiled.stats.slot_count,
            compiled.stats.dynamic_bindings,
            compiled.stats.diagnostic_count
        );
    }

    Ok(())
}

fn run_check(input: &std::path::Path) -> Result<()> {
    let options = CompilerOptions {
        silent: true,
        ..Default::default()
    };
    let compiled = compile_file(input, &options)?;

    for diagnostic in &compiled.diagnostics {
        eprintln!("{}: {diagnostic}", input.display());
    }

    if compiled.diagnostics.is_empty() {
        println!("{}: ok", input.display());
        Ok(())
    } else {
        Err(Error::InvalidFormat {
            message: format!("{} diagnostic(s) in template", compiled.diagnostics.len()),
        })
    }
}

fn run_render(input: &std::path::Path, data: &str) -> Result<()> {
    let state: Value = serde_json::from_str(data)?;
    let state = match state {
        Value::Object(map) => map,
        _ => {
            return Err(Error::InvalidFormat {
                message: "--data must be a JSON object".to_string(),
            })
        }
    };

    let compiled = compile_file(input, &CompilerOptions::default())?;

    let mut rt = Runtime::new(MemoryDom::new());
    *rt.state.borrow_mut() = state;
    let root = rt.dom.create_element("root");

    let mut view = View::new(compiled.program);
    view.create(&mut rt, root)?;
    view.update(&mut rt)?;
    println!("{}", rt.dom.inner_html(root));

    Ok(())
}
