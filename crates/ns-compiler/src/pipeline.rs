use std::collections::BTreeMap;

use ns_core::{NsError, StaticSymbolTable};
use tracing::info;

use crate::binder::Binder;
use crate::emitter::emit_module;
use crate::include_graph::{merged_file_order, validate_include_graph};
use crate::source_parse::parse_sources;
use crate::symbol_table_builder::SymbolTableBuilder;
use crate::{CompileOptions, CompileProjectResult, CompiledModule, SourceEncoding};

pub fn compile_project_from_source_map(
    source_by_path: &BTreeMap<String, String>,
    options: &CompileOptions,
) -> Result<CompileProjectResult, NsError> {
    if options.encoding != SourceEncoding::Utf8 {
        return Err(NsError::new(
            "COMPILER_ENCODING_UNSUPPORTED",
            format!("Source encoding {:?} is not supported; use UTF-8.", options.encoding),
        ));
    }

    let mut diagnostics = Vec::new();
    let sources = parse_sources(source_by_path, &mut diagnostics)?;
    validate_include_graph(&sources)?;

    let (tables, table_diagnostics) = SymbolTableBuilder::new().build(&sources);
    diagnostics.extend(table_diagnostics);

    let statics = StaticSymbolTable::new();
    let mut binder = Binder::new(&statics, &tables);
    let mut bindings = BTreeMap::new();
    for (path, source) in &sources {
        let merged = merged_file_order(path, &sources);
        bindings.insert(path.clone(), binder.bind_file(&source.file, merged));
    }
    diagnostics.extend(binder.into_diagnostics());

    let mut modules = BTreeMap::new();
    for (path, source) in &sources {
        let (Some(table), Some(bound)) = (tables.get(path), bindings.get(path)) else {
            continue;
        };
        let module = emit_module(&source.file, table, bound, &mut diagnostics)?;
        modules.insert(path.clone(), module);
    }

    info!(
        modules = modules.len(),
        diagnostics = diagnostics.len(),
        "compiled project"
    );
    Ok(CompileProjectResult {
        modules,
        diagnostics,
    })
}

/// Compiles a single self-contained source file.
pub fn compile_source(path: &str, source: &str) -> Result<CompiledModule, NsError> {
    let map = BTreeMap::from([(path.to_string(), source.to_string())]);
    let mut result = compile_project_from_source_map(&map, &CompileOptions::default())?;
    let name = crate::normalize_virtual_path(path);
    result.modules.remove(&name).ok_or_else(|| {
        NsError::new(
            "COMPILER_MODULE_MISSING",
            format!("No module was produced for \"{}\".", path),
        )
    })
}
