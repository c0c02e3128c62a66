use std::fs;
use std::path::{Path, PathBuf};

use ns_api::compile_project;
use ns_compiler::CompileOptions;
use ns_core::NsError;
use tracing::info;

use crate::{load_sources, map_cli_output_write, CompileArgs};

pub(crate) const MODULE_EXTENSION: &str = "nsx";

/// Maps a module name such as `scenes/intro.nss` to its file under `out_dir`.
pub(crate) fn module_output_path(out_dir: &Path, module_name: &str) -> PathBuf {
    out_dir.join(module_name).with_extension(MODULE_EXTENSION)
}

pub(crate) fn run_compile(args: CompileArgs) -> Result<i32, NsError> {
    let sources = load_sources(&args.scripts_dir)?;
    let compiled = compile_project(&sources, &CompileOptions::default())?;

    for diagnostic in &compiled.diagnostics {
        println!("DIAGNOSTIC:{}", diagnostic);
    }
    if let Some(first) = compiled.errors().next() {
        let count = compiled.errors().count();
        return Err(NsError::new(
            "CLI_COMPILE_FAILED",
            format!("{} error(s); first: {}", count, first),
        ));
    }

    let out_dir = PathBuf::from(&args.out_dir);
    let mut written = Vec::with_capacity(compiled.modules.len());
    for (name, module) in &compiled.modules {
        let path = module_output_path(&out_dir, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(map_cli_output_write)?;
        }
        fs::write(&path, &module.bytes).map_err(map_cli_output_write)?;
        info!(module = %name, bytes = module.bytes.len(), "wrote module");
        written.push(path);
    }

    println!("RESULT:OK");
    for path in written {
        println!("MODULE:{}", path.display());
    }
    Ok(0)
}
