//! xcc command-line interface
//!
//! `xcc [-o OUTPUT] [--target linux|xv6] [INPUT...]` compiles preprocessed
//! C sources straight to a statically-linked executable; with no inputs it
//! reads standard input. Exit code 0 on success, 1 on any diagnostic.

use clap::{Parser, ValueEnum};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use xcc_backend::{write_elf_file, Target};
use xcc_cli::Compiler;

#[derive(Parser)]
#[command(name = "xcc")]
#[command(about = "A self-contained C compiler producing x86-64 executables")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Output executable path
    #[arg(short, long, default_value = "a.out")]
    output: PathBuf,

    /// Code generation target
    #[arg(long, value_enum, default_value_t = TargetOpt::Linux)]
    target: TargetOpt,

    /// Input files; standard input when empty
    inputs: Vec<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetOpt {
    Linux,
    Xv6,
}

impl From<TargetOpt> for Target {
    fn from(opt: TargetOpt) -> Target {
        match opt {
            TargetOpt::Linux => Target::Linux,
            TargetOpt::Xv6 => Target::Xv6,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut compiler = Compiler::new();
    match run(&cli, &mut compiler) {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Compile(err)) => {
            eprintln!("{}", compiler.sources().render(&err));
            ExitCode::FAILURE
        }
        Err(RunError::Driver(err)) => {
            eprintln!("xcc: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

enum RunError {
    Compile(xcc_common::CompileError),
    Driver(anyhow::Error),
}

impl From<xcc_common::CompileError> for RunError {
    fn from(err: xcc_common::CompileError) -> Self {
        RunError::Compile(err)
    }
}

fn run(cli: &Cli, compiler: &mut Compiler) -> Result<(), RunError> {
    use anyhow::Context;

    if cli.inputs.is_empty() {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("cannot read standard input")
            .map_err(RunError::Driver)?;
        compiler.add_source("*stdin*", &text)?;
    } else {
        for path in &cli.inputs {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot open file: {}", path.display()))
                .map_err(RunError::Driver)?;
            compiler.add_source(&path.display().to_string(), &text)?;
        }
    }

    let target = Target::from(cli.target);
    let image = compiler.finish(target)?;
    write_elf_file(&cli.output, &image, target)?;
    log::info!(
        "wrote {} ({} bytes of code and data)",
        cli.output.display(),
        image.filesz
    );
    Ok(())
}
