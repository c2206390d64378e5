use std::{
    fs,
    io::{self, BufWriter},
    path::{Path, PathBuf},
    process::exit,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use skein::{
    compiler::{self, CompileOptions, CompileResult},
    runtime,
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Log compiler and VM internals to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile scripts to `.sknb` bytecode and write the symbol table.
    Compile {
        paths: Vec<PathBuf>,
        /// Emit line and variable tracking instructions.
        #[arg(long)]
        debug: bool,
        #[arg(long, default_value = "symbols")]
        symbols_prefix: String,
        /// Where to write the symbol table. Defaults to `<out-dir>/<prefix>.rs`.
        #[arg(long)]
        symbols_file: Option<PathBuf>,
        /// Defaults to each script's own directory.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Compile a script and run it against the console API.
    Run {
        path: PathBuf,
        /// Print line and variable events while running.
        #[arg(long)]
        debug: bool,
    },
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("reading the working directory")?;
    Ok(cwd.join(path))
}

fn compile_or_exit(paths: &[PathBuf], options: &CompileOptions) -> anyhow::Result<CompileResult> {
    let paths = paths
        .iter()
        .map(|p| absolute(p))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let result = compiler::compile(&paths, options);
    if !result.is_success() {
        for error in &result.errors {
            eprintln!("{error}");
        }
        eprintln!("Compilation failed with {} error(s).", result.errors.len());
        exit(1);
    }
    Ok(result)
}

fn compile(
    paths: Vec<PathBuf>,
    debug: bool,
    symbols_prefix: String,
    symbols_file: Option<PathBuf>,
    out_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    anyhow::ensure!(!paths.is_empty(), "no scripts given");
    let options = CompileOptions {
        include_debug_bytes: debug,
        symbols_prefix,
    };
    let result = compile_or_exit(&paths, &options)?;

    for (path, bytes) in &result.compiled_files {
        let directory = match &out_dir {
            Some(dir) => dir.clone(),
            None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let mut output = directory.join(path.file_name().unwrap_or_default());
        output.set_extension("sknb");
        fs::write(&output, bytes).with_context(|| format!("writing {}", output.display()))?;
        info!(path = %output.display(), bytes = bytes.len(), "wrote bytecode");
    }

    let symbols_file = match symbols_file {
        Some(file) => file,
        None => {
            let directory = match out_dir {
                Some(dir) => dir,
                None => absolute(&paths[0])?
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
            };
            directory.join(format!("{}.rs", options.symbols_prefix))
        }
    };
    fs::write(&symbols_file, &result.symbol_table)
        .with_context(|| format!("writing {}", symbols_file.display()))?;
    info!(path = %symbols_file.display(), symbols = result.symbols.len(), "wrote symbol table");
    Ok(())
}

fn run(path: PathBuf, debug: bool) -> anyhow::Result<()> {
    let options = CompileOptions {
        include_debug_bytes: debug,
        ..CompileOptions::default()
    };
    let result = compile_or_exit(std::slice::from_ref(&path), &options)?;
    let Some(bytecode) = result.compiled_files.values().next() else {
        anyhow::bail!("{} produced no bytecode", path.display());
    };
    debug!(bytes = bytecode.len(), "running");

    let stdin = io::stdin().lock();
    let stdout = BufWriter::new(io::stdout().lock());
    if let Err(error) = runtime::run(bytecode, &result.symbols, debug, stdin, stdout) {
        eprintln!("Error: {error}");
        exit(1);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "skein=debug" } else { "skein=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    match args.command {
        Commands::Compile {
            paths,
            debug,
            symbols_prefix,
            symbols_file,
            out_dir,
        } => compile(paths, debug, symbols_prefix, symbols_file, out_dir),
        Commands::Run { path, debug } => run(path, debug),
    }
}
