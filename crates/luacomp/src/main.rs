//! Command line front end for the Lua completion engine.
//!
//! `complete` answers one completion request against a file, printing
//! suggestion records as JSON. `analyze` prints what a file returns as a
//! module and what it writes to the global scope. Project configuration is
//! picked up from the nearest `.luacompleterc` above the target file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use luacomp_core::{load_project_config, Engine, Options};

#[derive(Parser)]
#[command(name = "luacomp", version, about = "Static type inference and code completion for Lua")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Complete at a byte offset in a Lua file
    Complete {
        /// Path to the Lua file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Byte offset of the cursor; defaults to the end of the file
        #[arg(short, long)]
        offset: Option<usize>,

        /// Answer even with no typed prefix, as if invoked by a keybinding
        #[arg(short, long)]
        manual: bool,
    },

    /// Report a file's module returns and global writes
    Analyze {
        /// Path to the Lua file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Complete {
            file,
            offset,
            manual,
        } => complete(&file, offset, manual),
        Command::Analyze { file } => analyze(&file),
    }
}

fn engine_for(file: &Path) -> Result<Engine> {
    let options = match load_project_config(file)? {
        Some((config, root)) => {
            debug!(root = %root.display(), "using project configuration");
            Options::from_config(config, Some(root))
        }
        None => {
            let cwd = file.parent().map(Path::to_path_buf);
            Options::from_config(Default::default(), cwd)
        }
    };
    Ok(Engine::new(options)?)
}

fn complete(file: &Path, offset: Option<usize>, manual: bool) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let offset = offset.unwrap_or(source.len());
    anyhow::ensure!(
        offset <= source.len(),
        "offset {offset} is past the end of {} ({} bytes)",
        file.display(),
        source.len()
    );

    let mut engine = engine_for(file)?;
    let suggestions = engine.complete(&source, offset, manual)?;
    println!("{}", serde_json::to_string_pretty(&suggestions)?);
    Ok(())
}

fn analyze(file: &Path) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut engine = engine_for(file)?;
    let result = engine.analyze_source(&source)?;

    let returns: Vec<&str> = result
        .return_types
        .iter()
        .map(|typedef| typedef.kind_name())
        .collect();
    let report = serde_json::json!({
        "returns": returns,
        "globalWrites": result.global_diff.len(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
