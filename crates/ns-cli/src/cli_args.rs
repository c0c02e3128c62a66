use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "nss")]
#[command(about = "Compile, inspect and run NSS scripts")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Compile every .nss file under a directory into .nsx modules.
    Compile(CompileArgs),
    /// Disassemble a compiled .nsx module.
    Dump(DumpArgs),
    /// Run a script project headlessly for a number of ticks.
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub(crate) struct CompileArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    #[arg(long = "out-dir")]
    pub(crate) out_dir: String,
}

#[derive(Debug, Args)]
pub(crate) struct DumpArgs {
    #[arg(long = "module")]
    pub(crate) module: String,
    #[arg(long = "json")]
    pub(crate) json: bool,
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    /// Entry module path relative to the scripts directory.
    #[arg(long = "module")]
    pub(crate) module: Option<String>,
    /// Subroutine to start; defaults to the first chapter.
    #[arg(long = "entry")]
    pub(crate) entry: Option<String>,
    #[arg(long = "ticks", default_value_t = 1000)]
    pub(crate) ticks: usize,
    #[arg(long = "tick-ms", default_value_t = 16)]
    pub(crate) tick_ms: u64,
    #[arg(long = "seed")]
    pub(crate) seed: Option<u32>,
}
