use std::path::Path;

use ns_core::{disassemble, NsError, NsxModule};

use crate::{map_cli_json, DumpArgs, ModuleDump};

fn module_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn render_dump(module: &NsxModule, json: bool) -> Result<String, NsError> {
    if json {
        let dump = ModuleDump::from_module(module)?;
        serde_json::to_string_pretty(&dump).map_err(map_cli_json)
    } else {
        disassemble(module)
    }
}

pub(crate) fn run_dump(args: DumpArgs) -> Result<i32, NsError> {
    let path = Path::new(&args.module);
    let module = NsxModule::open(path, module_name(path))?;
    print!("{}", render_dump(&module, args.json)?);
    Ok(0)
}
