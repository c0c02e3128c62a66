use std::ffi::OsString;

use clap::Parser;
use ns_core::NsError;

mod cli_args;
mod compile;
mod dump;
mod error_map;
mod headless_host;
mod models;
mod player;
mod source_loader;

pub(crate) use cli_args::{Cli, CompileArgs, DumpArgs, Mode, RunArgs};
pub(crate) use error_map::{
    emit_error, json_string, map_cli_json, map_cli_output_write, map_cli_source_path,
    map_cli_source_read, map_cli_source_scan,
};
pub(crate) use headless_host::HeadlessHost;
pub(crate) use models::ModuleDump;
pub(crate) use source_loader::load_sources;

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, NsError> {
    match cli.command {
        Mode::Compile(args) => compile::run_compile(args),
        Mode::Dump(args) => dump::run_dump(args),
        Mode::Run(args) => player::run_player(args),
    }
}

#[cfg(test)]
mod cli_test_support;
#[cfg(test)]
mod tests;
